//! Generative-AI provider clients
//!
//! Each client sends one generation request and hands back the raw response
//! envelope, tagged with the layout the normalizer should expect.

pub mod gemini;
pub mod mime;
pub mod mock;
pub mod openrouter;

pub use gemini::{GeminiAuth, GeminiImageClient, MessageContentClient};
pub use mock::MockGenerationClient;
pub use openrouter::OpenRouterClient;

use crate::models::{Envelope, GenerationRequest, ResponseShape};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Layout of the envelopes this client returns.
    fn shape(&self) -> ResponseShape;

    async fn generate(&self, request: &GenerationRequest) -> Result<Envelope>;
}
