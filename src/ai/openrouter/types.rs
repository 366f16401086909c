//! OpenRouter request payloads.
//!
//! Responses are kept as raw JSON and handed to the normalizer.

use serde::Serialize;

/// Request body for OpenRouter chat completions.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Output modalities; image generation needs `"image"` here.
    pub modalities: Vec<String>,
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChatMessageContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

/// One content segment in a multipart user message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image URL wrapper; carries a `data:` URI for inline uploads.
#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: ChatMessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: ChatMessageContent::Text(text.into()),
        }
    }

    pub fn user(parts: Vec<MessagePart>) -> Self {
        Self {
            role: "user".to_string(),
            content: ChatMessageContent::Parts(parts),
        }
    }
}
