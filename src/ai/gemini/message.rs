//! Chat-message view of Gemini output.
//!
//! Chat orchestration layers flatten a candidate into a single message whose
//! `content` is a plain string when only text came back, or a list of strings
//! and `image_url` entries once any image is present.

use super::client::GeminiAuth;
use super::image::GeminiImageClient;
use crate::ai::GenerationService;
use crate::models::{Envelope, GenerationRequest, ResponseShape};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct MessageContentClient {
    inner: GeminiImageClient,
}

impl MessageContentClient {
    pub fn new(auth: GeminiAuth, model: String) -> Self {
        Self::from_client(GeminiImageClient::new(auth, model))
    }

    pub fn from_client(inner: GeminiImageClient) -> Self {
        Self { inner }
    }
}

/// Re-express a `generateContent` response as `{"content": ...}`.
pub fn to_message_content(body: &Value) -> Value {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut items = Vec::with_capacity(parts.len());
    let mut has_image = false;

    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            items.push(Value::String(text.to_string()));
            continue;
        }

        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let Some(data) = inline.get("data").and_then(Value::as_str) else {
            continue;
        };
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");

        has_image = true;
        items.push(json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{};base64,{}", mime_type, data) }
        }));
    }

    let content = if has_image {
        Value::Array(items)
    } else {
        let text: String = items.iter().filter_map(Value::as_str).collect();
        Value::String(text)
    };

    json!({ "content": content })
}

#[async_trait]
impl GenerationService for MessageContentClient {
    fn shape(&self) -> ResponseShape {
        ResponseShape::MessageContent
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Envelope> {
        let envelope = self.inner.generate(request).await?;
        Ok(Envelope::new(self.shape(), to_message_content(&envelope.body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::gemini::test_support;
    use crate::models::Segment;
    use crate::normalize::normalize;
    use crate::Error;
    use pretty_assertions::assert_eq;
    use wiremock::{MockServer, ResponseTemplate};

    #[test]
    fn test_mixed_parts_become_list() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Sure!" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "QUJD" } }
                    ]
                }
            }]
        });

        assert_eq!(
            to_message_content(&body),
            json!({
                "content": [
                    "Sure!",
                    { "type": "image_url", "image_url": { "url": "data:image/jpeg;base64,QUJD" } }
                ]
            })
        );
    }

    #[test]
    fn test_text_only_parts_collapse_to_string() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't " }, { "text": "do that." }] } }]
        });

        assert_eq!(
            to_message_content(&body),
            json!({ "content": "I can't do that." })
        );
    }

    #[test]
    fn test_missing_candidates_yield_empty_string() {
        assert_eq!(
            to_message_content(&json!({ "promptFeedback": {} })),
            json!({ "content": "" })
        );
    }

    #[tokio::test]
    async fn test_generate_normalizes_through_message_shape() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            { "inlineData": { "mimeType": "image/png", "data": "QUJD" } },
                            { "text": "done" }
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let inner = GeminiImageClient::new(
            GeminiAuth::ApiKey("key".to_string()),
            "gemini-2.5-flash-image-preview".to_string(),
        )
        .with_base_url(server.uri());
        let client = MessageContentClient::from_client(inner);

        let envelope = client
            .generate(&GenerationRequest::new("system", "a cat"))
            .await
            .unwrap();

        assert_eq!(envelope.shape, ResponseShape::MessageContent);
        assert_eq!(
            normalize(&envelope).unwrap(),
            vec![
                Segment::Image("QUJD".to_string()),
                Segment::Text("done".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_text_only_reply_is_shape_error() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "no image for you" }] } }]
            })))
            .mount(&server)
            .await;

        let inner = GeminiImageClient::new(
            GeminiAuth::ApiKey("key".to_string()),
            "gemini-2.5-flash-image-preview".to_string(),
        )
        .with_base_url(server.uri());

        let envelope = MessageContentClient::from_client(inner)
            .generate(&GenerationRequest::new("system", "a cat"))
            .await
            .unwrap();

        assert!(matches!(normalize(&envelope), Err(Error::Shape(_))));
    }
}
