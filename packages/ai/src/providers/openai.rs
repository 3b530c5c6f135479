//! `OpenAI` GPT provider implementation.
//!
//! Also works with `OpenAI`-compatible servers (Ollama, vLLM, llama.cpp,
//! LM Studio) when `base_url` is set.

use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;
use crate::retry::{self, preview};
use crate::{AiError, ModelClient, ModelConfig};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `OpenAI` API provider.
pub struct OpenAiProvider {
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    url: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new `OpenAI` provider.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ModelConfig) -> Result<Self, AiError> {
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        Ok(Self {
            api_key: super::api_key(config),
            model: config.model_id.clone(),
            max_tokens: config.max_tokens,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            retry: config.retry.clone(),
            client: super::http_client(config)?,
        })
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: [OpenAiMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

/// Extracts the first choice's text from a successful response body.
fn parse_response(body: &str) -> Result<String, AiError> {
    let response: OpenAiResponse = serde_json::from_str(body)?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AiError::Provider {
            message: "No choices in OpenAI response".to_string(),
        })?;

    if choice.finish_reason.as_deref() == Some("length") {
        log::warn!("OpenAI response hit the max_tokens limit; output is truncated");
    }

    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait::async_trait]
impl ModelClient for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let request = OpenAiRequest {
            model: &self.model,
            messages: [OpenAiMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let (status, body) = retry::send_with_retry(&self.retry, || {
            let builder = self.client.post(&self.url).json(&request);
            match &self.api_key {
                Some(key) => builder.bearer_auth(key),
                None => builder,
            }
        })
        .await?;

        if !status.is_success() {
            let err: OpenAiError = serde_json::from_str(&body).unwrap_or_else(|_| OpenAiError {
                error: OpenAiErrorDetail {
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
    use crate::ProviderKind;

    use super::*;

    #[test]
    fn reads_first_choice_content() {
        let body = r#"{"choices": [{"message": {"content": "A=1\nB=2"}, "finish_reason": "stop"}]}"#;
        assert_eq!(parse_response(body).unwrap(), "A=1\nB=2");
    }

    #[test]
    fn null_content_is_empty_text() {
        let body = r#"{"choices": [{"message": {"content": null}, "finish_reason": "stop"}]}"#;
        assert_eq!(parse_response(body).unwrap(), "");
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(matches!(
            parse_response(r#"{"choices": []}"#),
            Err(AiError::Provider { .. })
        ));
    }

    #[test]
    fn base_url_override_builds_completions_url() {
        let mut config = ModelConfig::new(ProviderKind::OpenAi, "llama3");
        config.base_url = Some("http://localhost:11434/v1/".to_string());
        let provider = OpenAiProvider::new(&config).unwrap();
        assert_eq!(provider.url, "http://localhost:11434/v1/chat/completions");
        assert!(provider.api_key.is_none());
    }
}
