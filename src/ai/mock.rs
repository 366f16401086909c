use super::GenerationService;
use crate::models::{Envelope, GenerationRequest, ResponseShape};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum MockResponse {
    Body(serde_json::Value),
    TransportFailure(String),
}

/// Replays canned envelopes in order, cycling once exhausted.
#[derive(Clone)]
pub struct MockGenerationClient {
    shape: ResponseShape,
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockGenerationClient {
    pub fn new(shape: ResponseShape) -> Self {
        Self {
            shape,
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(self, body: serde_json::Value) -> Self {
        self.responses.lock().unwrap().push(MockResponse::Body(body));
        self
    }

    pub fn with_transport_failure(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(MockResponse::TransportFailure(message.to_string()));
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerationService for MockGenerationClient {
    fn shape(&self) -> ResponseShape {
        self.shape
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Envelope> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(Envelope::new(self.shape, serde_json::json!({})));
        }

        match &responses[(call - 1) % responses.len()] {
            MockResponse::Body(body) => Ok(Envelope::new(self.shape, body.clone())),
            MockResponse::TransportFailure(message) => Err(Error::Transport(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let client = MockGenerationClient::new(ResponseShape::MessageContent)
            .with_response(json!(["first"]))
            .with_transport_failure("boom");
        let request = GenerationRequest::new("sys", "query");

        let first = client.generate(&request).await.unwrap();
        assert_eq!(first.body, json!(["first"]));
        assert_eq!(first.shape, ResponseShape::MessageContent);

        let second = client.generate(&request).await.unwrap_err();
        assert!(matches!(second, Error::Transport(_)));

        let third = client.generate(&request).await.unwrap();
        assert_eq!(third.body, json!(["first"]));
        assert_eq!(client.get_call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let client = MockGenerationClient::new(ResponseShape::ChatCompletion);
        assert!(client.last_request().is_none());

        client
            .generate(&GenerationRequest::new("sys", "a red bench"))
            .await
            .unwrap();
        assert_eq!(client.last_request().unwrap().query, "a red bench");
    }
}
