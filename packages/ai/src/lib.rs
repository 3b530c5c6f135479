#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Text-generation model client with provider abstraction.
//!
//! Supports AWS Bedrock (feature-gated, Converse API), Anthropic Claude,
//! and `OpenAI` or any `OpenAI`-compatible local/self-hosted server
//! (Ollama, vLLM, llama.cpp, LM Studio) via `AI_BASE_URL`.
//!
//! A client is built once from an explicit [`ModelConfig`] with
//! [`create_client`] and then used as a plain prompt-in, text-out
//! function through the [`ModelClient`] trait. Transient transport
//! failures are retried inside the client according to the configured
//! [`RetryPolicy`]; callers only ever see the final outcome.

pub mod config;
pub mod providers;
pub mod retry;

use thiserror::Error;

pub use config::{BackoffMode, Credentials, ModelConfig, ProviderKind, RetryPolicy};

/// Errors that can occur during model calls.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request to the model provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider-specific error.
    #[error("Provider error: {message}")]
    Provider {
        /// Description of what went wrong.
        message: String,
    },

    /// Every allowed attempt failed with a transient error.
    #[error("Model call failed after {attempts} attempt(s): {message}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last transient failure.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}

/// A hosted text-generation model, treated as a function from prompt to
/// text.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends `prompt` as a single user turn and returns the generated text.
    ///
    /// An empty string is a valid response.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the call fails after all transport retries.
    async fn complete(&self, prompt: &str) -> Result<String, AiError>;
}

/// Creates the model client described by `config`.
///
/// # Errors
///
/// Returns [`AiError::Config`] if the provider is missing required
/// credentials or was not compiled in, and [`AiError::Http`] if the HTTP
/// client cannot be built.
#[allow(clippy::unused_async)] // async is needed when bedrock feature is enabled
pub async fn create_client(config: &ModelConfig) -> Result<Box<dyn ModelClient>, AiError> {
    log::info!(
        "Using {} model {} (max attempts: {}, retry mode: {})",
        config.provider,
        config.model_id,
        config.retry.max_attempts,
        config.retry.mode,
    );

    match config.provider {
        ProviderKind::Anthropic => Ok(Box::new(providers::anthropic::AnthropicProvider::new(
            config,
        )?)),
        ProviderKind::OpenAi => Ok(Box::new(providers::openai::OpenAiProvider::new(config)?)),
        #[cfg(feature = "bedrock")]
        ProviderKind::Bedrock => Ok(Box::new(
            providers::bedrock::BedrockProvider::new(config).await,
        )),
        #[cfg(not(feature = "bedrock"))]
        ProviderKind::Bedrock => Err(AiError::Config {
            message: "Bedrock support not compiled. Rebuild with --features bedrock".to_string(),
        }),
    }
}
