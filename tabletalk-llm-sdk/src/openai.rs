use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::{
    client::Planner,
    error::PlannerError,
    types::{ChatMessage, Role},
};

/// OpenAI-compatible chat completions client
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl OpenAiClient {
    /// Create a new client with the given API key and model
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, PlannerError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(PlannerError::authentication("API key cannot be empty"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| PlannerError::Network { source: e })?;

        Ok(Self {
            api_key,
            base_url: "https://api.openai.com".to_string(),
            model: model.into(),
            http_client,
        })
    }

    /// Set a custom base URL for the API
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap, PlannerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| PlannerError::authentication("Invalid API key format"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl Planner for OpenAiClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, PlannerError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let wire_messages = messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                },
                content: &m.content,
            })
            .collect();

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: wire_messages,
        };

        tracing::debug!(model = %self.model, messages = request.messages.len(), "Planner request");

        let response = self
            .http_client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| PlannerError::Network { source: e })?;

        let status = response.status();

        if status.is_success() {
            let completion: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| PlannerError::internal(format!("Failed to parse response: {}", e)))?;

            completion
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| PlannerError::internal("Response contained no choices"))
        } else {
            // Extract retry-after header before consuming the response
            let retry_after = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
            } else {
                None
            };

            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);

            match status {
                reqwest::StatusCode::BAD_REQUEST => Err(PlannerError::invalid_request(message)),
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    Err(PlannerError::authentication(message))
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    Err(PlannerError::rate_limit(message, retry_after))
                }
                _ => Err(PlannerError::api_error(status.as_u16(), message)),
            }
        }
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are a planner."),
            ChatMessage::user("list products"),
        ]
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"{\"intent\":\"read\"}"}}]}"#,
            )
            .create_async()
            .await;

        let client = OpenAiClient::new("test-key", "gpt-4o-mini")
            .unwrap()
            .with_base_url(server.url());

        let out = client.complete(messages()).await.unwrap();
        assert_eq!(out, r#"{"intent":"read"}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"bad key"}}"#)
            .create_async()
            .await;

        let client = OpenAiClient::new("test-key", "gpt-4o-mini")
            .unwrap()
            .with_base_url(server.url());

        match client.complete(messages()).await {
            Err(PlannerError::Authentication { message }) => assert_eq!(message, "bad key"),
            other => panic!("Expected Authentication error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_header("retry-after", "7")
            .with_body(r#"{"error":{"message":"slow down"}}"#)
            .create_async()
            .await;

        let client = OpenAiClient::new("test-key", "gpt-4o-mini")
            .unwrap()
            .with_base_url(server.url());

        match client.complete(messages()).await {
            Err(PlannerError::RateLimit { retry_after, .. }) => {
                assert_eq!(retry_after, Some(7));
            }
            other => panic!("Expected RateLimit error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let client = OpenAiClient::new("test-key", "gpt-4o-mini")
            .unwrap()
            .with_base_url(server.url());

        match client.complete(messages()).await {
            Err(PlannerError::Api { status, .. }) => assert_eq!(status, 500),
            other => panic!("Expected Api error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_client_creation_empty_key() {
        assert!(OpenAiClient::new("", "gpt-4o-mini").is_err());
    }
}
