//! Model provider implementations.
//!
//! Supports AWS Bedrock, Anthropic Claude, and `OpenAI` behind the common
//! [`crate::ModelClient`] trait.

pub mod anthropic;
#[cfg(feature = "bedrock")]
pub mod bedrock;
pub mod openai;

use crate::{AiError, Credentials, ModelConfig};

/// Builds the shared HTTP client for the HTTP-based providers.
fn http_client(config: &ModelConfig) -> Result<reqwest::Client, AiError> {
    Ok(reqwest::Client::builder().timeout(config.timeout).build()?)
}

/// Returns the API key from `config`, if one was supplied.
fn api_key(config: &ModelConfig) -> Option<String> {
    match &config.credentials {
        Some(Credentials::ApiKey(key)) => Some(key.clone()),
        _ => None,
    }
}
