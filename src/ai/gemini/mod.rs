pub mod client;
pub mod image;
pub mod message;
pub mod types;

pub use client::GeminiAuth;
pub use image::GeminiImageClient;
pub use message::MessageContentClient;
