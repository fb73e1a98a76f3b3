//! Chat-completions HTTP client.
//!
//! Speaks the OpenAI-compatible wire format used by OpenRouter and most
//! hosted providers: bearer auth, `messages`, optional `response_format`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::LlmError;

/// Default chat completions endpoint.
pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Chat-completions client bound to one endpoint and key.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ChatClient {
    /// Create a client. `timeout` bounds each HTTP request.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Endpoint this client posts to.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Send a chat completion request.
    ///
    /// # Errors
    /// Returns an error on transport failure, a non-success status, or an
    /// unreadable response envelope.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        trace!(model = %request.model, messages = request.messages.len(), "Sending chat request");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "Catalog Router")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParse(e.to_string()))?;

        debug!(
            tokens = response.usage.as_ref().map_or(0, |u| u.total_tokens),
            "Chat response received"
        );
        Ok(response)
    }
}

/// Chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Output format constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    /// Ask the provider for a single JSON object.
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object".to_string(),
        }
    }
}

/// A message in the chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    /// Text content of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// A choice in the completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

/// Message in a completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "openai/gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::system("Classify."), ChatMessage::user("pizza")],
            max_tokens: Some(500),
            temperature: Some(0.1),
            response_format: Some(ResponseFormat::json_object()),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "pizza");
    }

    #[test]
    fn test_request_omits_unset_fields() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            max_tokens: None,
            temperature: None,
            response_format: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("response_format").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "id": "gen-123",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "  {\"intent\": \"food\"}  "},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;

        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id, "gen-123");
        assert_eq!(response.content(), Some("{\"intent\": \"food\"}"));
    }

    #[test]
    fn test_response_without_content() {
        let json =
            r#"{"choices": [{"message": {"role": "assistant", "content": null}}], "usage": null}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.content(), None);

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(empty.content(), None);
    }

    #[test]
    fn test_debug_redacts_key() {
        let client =
            ChatClient::new(OPENROUTER_API_URL, "sk-secret", Duration::from_secs(1)).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-secret"));
        assert_eq!(client.api_url(), OPENROUTER_API_URL);
    }
}
