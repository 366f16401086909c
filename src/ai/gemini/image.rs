use super::client::{GeminiAuth, GeminiHttpClient};
use super::types::{Content, GenerateContentRequest, GenerationConfig, InlineData, Part};
use crate::ai::GenerationService;
use crate::models::{Envelope, GenerationRequest, ResponseShape};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Image generation/editing through `generateContent`, returning the raw
/// `candidates` envelope.
pub struct GeminiImageClient {
    http: GeminiHttpClient,
}

impl GeminiImageClient {
    pub fn new(auth: GeminiAuth, model: String) -> Self {
        Self::new_with_client(auth, model, reqwest::Client::new())
    }

    pub fn new_with_client(auth: GeminiAuth, model: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(
                auth,
                model,
                Duration::from_secs(120),
                client,
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    pub fn model(&self) -> &str {
        self.http.model()
    }

    pub(crate) fn build_request(request: &GenerationRequest) -> GenerateContentRequest {
        let mut parts = vec![Part::Text {
            text: request.query.clone(),
        }];
        if let Some(image) = &request.input_image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.to_string(),
                    data: image.base64.clone(),
                },
            });
        }

        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: request.system_instruction.clone(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
                candidate_count: 1,
            },
        }
    }
}

#[async_trait]
impl GenerationService for GeminiImageClient {
    fn shape(&self) -> ResponseShape {
        ResponseShape::GenerateContent
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Envelope> {
        let payload = Self::build_request(request);
        let body: Value = self.http.generate_content(&payload).await?;

        if let Some(reason) = body
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
        {
            tracing::debug!("Gemini finish reason: {}", reason);
        }

        Ok(Envelope::new(self.shape(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::gemini::test_support;
    use crate::models::{InputImage, Segment};
    use crate::normalize::normalize;
    use crate::Error;
    use std::path::Path;
    use wiremock::matchers::{body_partial_json, header};
    use wiremock::{MockServer, ResponseTemplate};

    const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";

    fn make_client(server: &MockServer) -> GeminiImageClient {
        GeminiImageClient::new(GeminiAuth::ApiKey("key".to_string()), DEFAULT_MODEL.to_string())
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_generate_returns_candidates_envelope() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(header("x-goog-api-key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            { "text": "Here you go" },
                            { "inlineData": { "mimeType": "image/png", "data": "QUJD" } }
                        ]
                    },
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let envelope = make_client(&server)
            .generate(&GenerationRequest::new("system", "a desk"))
            .await
            .unwrap();

        assert_eq!(envelope.shape, ResponseShape::GenerateContent);
        assert_eq!(
            normalize(&envelope).unwrap(),
            vec![
                Segment::Text("Here you go".to_string()),
                Segment::Image("QUJD".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_request_carries_generation_config_and_inline_image() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .and(body_partial_json(serde_json::json!({
                "systemInstruction": { "parts": [{ "text": "edit images" }] },
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "make it sunset" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "/9j/4A==" } }
                    ]
                }],
                "generationConfig": {
                    "responseModalities": ["TEXT", "IMAGE"],
                    "candidateCount": 1
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let image = InputImage::from_bytes(Path::new("bench.jpg"), &[0xFF, 0xD8, 0xFF, 0xE0]);
        let request = GenerationRequest::new("edit images", "make it sunset").with_input_image(image);

        make_client(&server).generate(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_returns_transport_error() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .generate(&GenerationRequest::new("system", "a desk"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_vertex_uses_bearer_token() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::VERTEX_GENERATE_CONTENT_PATH_REGEX)
            .and(header("Authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = GeminiAuth::Vertex {
            project: "proj".to_string(),
            location: "global".to_string(),
            access_token: "ya29.token".to_string(),
        };
        let client = GeminiImageClient::new(auth, DEFAULT_MODEL.to_string())
            .with_base_url(server.uri());

        let envelope = client
            .generate(&GenerationRequest::new("system", "a desk"))
            .await
            .unwrap();
        assert_eq!(
            normalize(&envelope).unwrap(),
            vec![Segment::Text("ok".to_string())]
        );
    }
}
