//! Generative-AI image generation and editing runner
//!
//! Sends a prompt (and optionally an input image) to an image-capable model,
//! normalizes the provider response into text and image segments, prints the
//! text and saves each image as a timestamped PNG.

pub mod ai;
pub mod app;
pub mod artifact;
pub mod error;
pub mod models;
pub mod normalize;
pub mod prompts;

pub use error::{Error, Result};
