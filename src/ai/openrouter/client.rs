use super::types::{ChatCompletionRequest, ChatMessage, ImageUrl, MessagePart};
use crate::ai::GenerationService;
use crate::models::{Envelope, GenerationRequest, ResponseShape, DEFAULT_OPENROUTER_BASE_URL};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenRouter chat-completions client with image output enabled.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_OPENROUTER_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to OpenRouter: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("OpenRouter API error (status {}): {}", status, error_text);
            return Err(Error::Transport(format!(
                "OpenRouter API error (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse OpenRouter response: {}\nBody: {}", e, body);
            Error::Transport(format!("Failed to parse OpenRouter response: {}", e))
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        let mut parts = vec![MessagePart::Text {
            text: request.query.clone(),
        }];
        if let Some(image) = &request.input_image {
            parts.push(MessagePart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_uri(),
                },
            });
        }

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(request.system_instruction.clone()),
                ChatMessage::user(parts),
            ],
            temperature: request.temperature,
            modalities: vec!["image".to_string(), "text".to_string()],
        }
    }
}

fn log_usage(response: &Value) {
    let Some(usage) = response.get("usage") else {
        return;
    };

    let tokens = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    tracing::info!(
        "Token usage: prompt={}, completion={}",
        tokens("prompt_tokens"),
        tokens("completion_tokens")
    );

    if let Some(image_tokens) = usage
        .pointer("/completion_tokens_details/image_tokens")
        .and_then(Value::as_u64)
    {
        tracing::info!("Image tokens: {}", image_tokens);
    }
}

#[async_trait]
impl GenerationService for OpenRouterClient {
    fn shape(&self) -> ResponseShape {
        ResponseShape::ChatCompletion
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Envelope> {
        let payload = self.build_request(request);
        let body: Value = self.post("/chat/completions", &payload).await?;

        tracing::info!("OpenRouter request succeeded (model: {})", self.model);
        log_usage(&body);

        Ok(Envelope::new(self.shape(), body))
    }
}
