//! Anthropic Claude provider implementation.

use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;
use crate::retry::{self, preview};
use crate::{AiError, ModelClient, ModelConfig};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic Claude API provider.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    max_tokens: u32,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Config`] if no API key is configured.
    pub fn new(config: &ModelConfig) -> Result<Self, AiError> {
        let api_key = super::api_key(config).ok_or_else(|| AiError::Config {
            message: "Anthropic provider requires an API key".to_string(),
        })?;

        Ok(Self {
            api_key,
            model: config.model_id.clone(),
            max_tokens: config.max_tokens,
            retry: config.retry.clone(),
            client: super::http_client(config)?,
        })
    }
}

/// Anthropic API request body.
#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [AnthropicMessage<'a>; 1],
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Anthropic API response body.
#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Anthropic API error response.
#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

/// Concatenates the text blocks of a successful response body.
fn parse_response(body: &str) -> Result<String, AiError> {
    let response: AnthropicResponse = serde_json::from_str(body)?;

    if response.stop_reason.as_deref() == Some("max_tokens") {
        log::warn!("Anthropic response hit the max_tokens limit; output is truncated");
    }

    Ok(response
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text),
            AnthropicContentBlock::Other => None,
        })
        .collect())
}

#[async_trait::async_trait]
impl ModelClient for AnthropicProvider {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let (status, body) = retry::send_with_retry(&self.retry, || {
            self.client
                .post(MESSAGES_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&request)
        })
        .await?;

        if !status.is_success() {
            let err: AnthropicError =
                serde_json::from_str(&body).unwrap_or_else(|_| AnthropicError {
                    error: AnthropicErrorDetail {
                        message: format!("HTTP {status}: {}", preview(&body)),
                    },
                });
            return Err(AiError::Provider {
                message: err.error.message,
            });
        }

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let body = r#"{
            "content": [
                {"type": "text", "text": "MEDICAL_SERVICE_PROVIDER=A\n"},
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "DATE_OF_SERVICE=2024-01-01"}
            ],
            "stop_reason": "end_turn"
        }"#;
        assert_eq!(
            parse_response(body).unwrap(),
            "MEDICAL_SERVICE_PROVIDER=A\nDATE_OF_SERVICE=2024-01-01"
        );
    }

    #[test]
    fn empty_content_is_empty_text() {
        let body = r#"{"content": [], "stop_reason": "end_turn"}"#;
        assert_eq!(parse_response(body).unwrap(), "");
    }

    #[test]
    fn request_serializes_single_user_turn() {
        let request = AnthropicRequest {
            model: "claude",
            max_tokens: 10,
            messages: [AnthropicMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["max_tokens"], 10);
    }
}
