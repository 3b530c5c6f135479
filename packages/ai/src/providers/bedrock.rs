//! AWS Bedrock provider implementation using the Converse API.

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::types::{
    self as bedrock, ContentBlock as BedrockContent, ConversationRole, Message as BedrockMessage,
    StopReason as BedrockStopReason,
};

use crate::config::BackoffMode;
use crate::{AiError, Credentials, ModelClient, ModelConfig};

/// AWS Bedrock provider using the Converse API.
///
/// Works with any text model available on Bedrock (Claude, Llama,
/// Mistral, etc.). Authentication uses static credentials from the
/// [`ModelConfig`] when present, otherwise the standard AWS credential
/// chain (env vars, IAM role, `~/.aws/credentials`). Retries are handled by
/// the SDK according to the configured [`crate::RetryPolicy`].
pub struct BedrockProvider {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
    max_tokens: i32,
}

impl BedrockProvider {
    /// Creates a new Bedrock provider.
    ///
    /// Loads the remaining AWS configuration (credentials chain, profile)
    /// from the environment.
    pub async fn new(config: &ModelConfig) -> Self {
        let retry_config = match config.retry.mode {
            BackoffMode::Standard => RetryConfig::standard(),
            BackoffMode::Adaptive => RetryConfig::adaptive(),
        }
        .with_max_attempts(config.retry.max_attempts.max(1))
        .with_initial_backoff(config.retry.initial_backoff)
        .with_max_backoff(config.retry.max_backoff);

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .retry_config(retry_config)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(config.timeout)
                    .build(),
            );

        if let Some(region) = &config.region {
            config_loader = config_loader.region(aws_config::Region::new(region.clone()));
        }

        if let Some(Credentials::Aws {
            access_key_id,
            secret_access_key,
            session_token,
        }) = &config.credentials
        {
            config_loader =
                config_loader.credentials_provider(aws_sdk_bedrockruntime::config::Credentials::new(
                    access_key_id,
                    secret_access_key,
                    session_token.clone(),
                    None,
                    "medbill-config",
                ));
        }

        let sdk_config = config_loader.load().await;
        let client = aws_sdk_bedrockruntime::Client::new(&sdk_config);

        Self {
            client,
            model_id: config.model_id.clone(),
            max_tokens: i32::try_from(config.max_tokens).unwrap_or(i32::MAX),
        }
    }
}

#[async_trait::async_trait]
impl ModelClient for BedrockProvider {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let message = BedrockMessage::builder()
            .role(ConversationRole::User)
            .content(BedrockContent::Text(prompt.to_string()))
            .build()
            .map_err(|e| AiError::Provider {
                message: format!("Failed to build Bedrock Message: {e}"),
            })?;

        let response = self
            .client
            .converse()
            .model_id(&self.model_id)
            .messages(message)
            .inference_config(
                bedrock::InferenceConfiguration::builder()
                    .max_tokens(self.max_tokens)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| AiError::Provider {
                message: format!("Bedrock Converse error: {}", DisplayErrorContext(&e)),
            })?;

        let output = response.output().ok_or_else(|| AiError::Provider {
            message: "No output in Bedrock response".to_string(),
        })?;

        let bedrock::ConverseOutput::Message(response_msg) = output else {
            return Err(AiError::Provider {
                message: "Unexpected Bedrock output variant".to_string(),
            });
        };

        if matches!(response.stop_reason(), BedrockStopReason::MaxTokens) {
            log::warn!("Bedrock response hit the max_tokens limit; output is truncated");
        }

        // Non-text blocks (reasoning, images, tool use) are ignored.
        let text = response_msg
            .content()
            .iter()
            .filter_map(|block| match block {
                BedrockContent::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<String>();

        Ok(text)
    }
}
