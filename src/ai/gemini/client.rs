use crate::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Credentials and routing for a `generateContent` endpoint.
#[derive(Debug, Clone)]
pub enum GeminiAuth {
    /// Gemini API, authenticated with `x-goog-api-key`.
    ApiKey(String),
    /// Vertex AI publisher model, authenticated with an OAuth access token.
    Vertex {
        project: String,
        location: String,
        access_token: String,
    },
}

impl GeminiAuth {
    fn default_base_url(&self) -> String {
        match self {
            GeminiAuth::ApiKey(_) => GEMINI_API_BASE_URL.to_string(),
            GeminiAuth::Vertex { location, .. } if location == "global" => {
                "https://aiplatform.googleapis.com".to_string()
            }
            GeminiAuth::Vertex { location, .. } => {
                format!("https://{}-aiplatform.googleapis.com", location)
            }
        }
    }
}

/// Lightweight REST client shared by the Gemini-backed generation clients.
pub struct GeminiHttpClient {
    client: Client,
    auth: GeminiAuth,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    /// `model` should be the bare model ID (for example
    /// `gemini-2.5-flash-image-preview`); a `models/` prefix is stripped.
    pub fn new_with_client(
        auth: GeminiAuth,
        model: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();
        let base_url = auth.default_base_url();

        Self {
            client,
            auth,
            model,
            base_url,
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        match self.auth {
            GeminiAuth::ApiKey(_) => "Gemini",
            GeminiAuth::Vertex { .. } => "Vertex AI",
        }
    }

    pub fn generate_content_url(&self) -> String {
        match &self.auth {
            GeminiAuth::ApiKey(_) => format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ),
            GeminiAuth::Vertex {
                project, location, ..
            } => format!(
                "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
                self.base_url, project, location, self.model
            ),
        }
    }

    async fn post_to_url<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: String,
        request: &Req,
    ) -> Result<Resp> {
        let builder = self.client.post(&url).timeout(self.timeout);
        let builder = match &self.auth {
            GeminiAuth::ApiKey(api_key) => builder.header("x-goog-api-key", api_key),
            GeminiAuth::Vertex { access_token, .. } => {
                builder.header("Authorization", format!("Bearer {}", access_token))
            }
        };

        let provider = self.provider_name();
        let response = builder
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to {}: {}", provider, e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("{} API error (status {}): {}", provider, status, error_text);
            return Err(Error::Transport(format!(
                "{} API error (status {}): {}",
                provider, status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse {} response: {}\nBody: {}", provider, e, body);
            Error::Transport(format!("Failed to parse {} response: {}", provider, e))
        })
    }

    /// Calls the `generateContent` endpoint.
    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        self.post_to_url(self.generate_content_url(), request).await
    }
}
