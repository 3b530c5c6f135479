//! Model client configuration.
//!
//! Everything a client needs (provider, model, credentials, region, retry
//! policy) lives in one [`ModelConfig`] value. [`ModelConfig::from_env`]
//! fills it from environment variables; nothing is hardcoded.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use strum_macros::{Display, EnumString};

use crate::AiError;

/// Default number of attempts (first try included) for a model call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default generation limit per model call.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default per-request timeout for HTTP providers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Which hosted model service to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ProviderKind {
    /// AWS Bedrock Converse API.
    #[strum(to_string = "bedrock", serialize = "aws")]
    Bedrock,
    /// Anthropic Messages API.
    #[strum(to_string = "anthropic", serialize = "claude")]
    Anthropic,
    /// `OpenAI` chat completions (or a compatible server).
    #[strum(to_string = "openai", serialize = "gpt")]
    OpenAi,
}

impl ProviderKind {
    /// Model used when `AI_MODEL` is not set.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Bedrock => "us.anthropic.claude-sonnet-4-20250514-v1:0",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o",
        }
    }
}

/// How the wait between attempts is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackoffMode {
    /// Exponential back-off from the initial delay.
    #[default]
    Standard,
    /// Exponential back-off that also honors server `Retry-After` hints
    /// (client-side rate limiting on Bedrock).
    Adaptive,
}

/// Transport-level retry policy for model calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Back-off mode.
    pub mode: BackoffMode,
    /// Wait before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            mode: BackoffMode::Standard,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): `initial * 2^(retry-1)`,
    /// capped at `max_backoff`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Credentials for the selected provider.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Static AWS credentials.
    Aws {
        /// Access key ID.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
        /// Optional session token for temporary credentials.
        session_token: Option<String>,
    },
    /// Bearer/API key for Anthropic or `OpenAI`.
    ApiKey(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws { access_key_id, .. } => f
                .debug_struct("Aws")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish_non_exhaustive(),
            Self::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<redacted>").finish(),
        }
    }
}

/// Explicit configuration for a model client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Provider to call.
    pub provider: ProviderKind,
    /// Provider-specific model identifier.
    pub model_id: String,
    /// Static credentials. `None` means the provider's default chain
    /// (Bedrock) or an unauthenticated local server (`OpenAI`-compatible).
    pub credentials: Option<Credentials>,
    /// AWS region (Bedrock only).
    pub region: Option<String>,
    /// Transport retry policy.
    pub retry: RetryPolicy,
    /// Generation limit per call.
    pub max_tokens: u32,
    /// Override for the `OpenAI`-compatible endpoint base URL.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ModelConfig {
    /// Creates a configuration with defaults for everything but the
    /// provider and model.
    #[must_use]
    pub fn new(provider: ProviderKind, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            credentials: None,
            region: None,
            retry: RetryPolicy::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets static credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the AWS region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds a configuration from process environment variables.
    ///
    /// See [`ModelConfig::from_lookup`] for the variables read.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Config`] if a variable is malformed or required
    /// credentials are missing.
    pub fn from_env() -> Result<Self, AiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from a variable lookup function.
    ///
    /// If `AI_PROVIDER` is set it selects the provider (`bedrock`/`aws`,
    /// `anthropic`/`claude`, `openai`/`gpt`). Otherwise the provider is
    /// detected from available credentials:
    ///
    /// 1. `AWS_BEARER_TOKEN_BEDROCK` -> Bedrock
    /// 2. `ANTHROPIC_API_KEY` -> Anthropic
    /// 3. `OPENAI_API_KEY` -> `OpenAI`
    /// 4. anything else -> Bedrock with the default AWS credential chain
    ///
    /// Other variables: `AI_MODEL` (or `BEDROCK_MODEL`), `AWS_REGION` (or
    /// `AWS_DEFAULT_REGION`), `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// `AWS_SESSION_TOKEN`, `AI_BASE_URL`, `AI_MAX_ATTEMPTS`,
    /// `AI_RETRY_MODE` (`standard`/`adaptive`), `AI_MAX_TOKENS`,
    /// `AI_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Config`] if a variable is malformed or required
    /// credentials are missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match lookup("AI_PROVIDER") {
            Some(name) => ProviderKind::from_str(name.trim()).map_err(|_| AiError::Config {
                message: format!(
                    "Unknown AI provider: {name}. Use 'bedrock', 'anthropic', or 'openai'."
                ),
            })?,
            None => detect_provider(&lookup),
        };

        let model_id = lookup("AI_MODEL")
            .or_else(|| lookup("BEDROCK_MODEL"))
            .unwrap_or_else(|| provider.default_model().to_string());

        let mut config = Self::new(provider, model_id);
        config.base_url = lookup("AI_BASE_URL");

        match provider {
            ProviderKind::Bedrock => {
                config.region = lookup("AWS_REGION")
                    .or_else(|| lookup("AWS_DEFAULT_REGION"))
                    .or_else(|| {
                        // Bearer token auth needs a region for endpoint resolution.
                        lookup("AWS_BEARER_TOKEN_BEDROCK").map(|_| {
                            log::info!(
                                "No AWS_REGION set; defaulting to us-east-1 for Bedrock bearer token auth"
                            );
                            "us-east-1".to_string()
                        })
                    });

                if let (Some(access_key_id), Some(secret_access_key)) = (
                    lookup("AWS_ACCESS_KEY_ID"),
                    lookup("AWS_SECRET_ACCESS_KEY"),
                ) {
                    config.credentials = Some(Credentials::Aws {
                        access_key_id,
                        secret_access_key,
                        session_token: lookup("AWS_SESSION_TOKEN"),
                    });
                }
            }
            ProviderKind::Anthropic => {
                let api_key = lookup("ANTHROPIC_API_KEY").ok_or_else(|| AiError::Config {
                    message: "ANTHROPIC_API_KEY environment variable not set".to_string(),
                })?;
                config.credentials = Some(Credentials::ApiKey(api_key));
            }
            ProviderKind::OpenAi => match lookup("OPENAI_API_KEY") {
                Some(api_key) => config.credentials = Some(Credentials::ApiKey(api_key)),
                // Local OpenAI-compatible servers usually run without a key.
                None if config.base_url.is_some() => {}
                None => {
                    return Err(AiError::Config {
                        message: "OPENAI_API_KEY environment variable not set".to_string(),
                    });
                }
            },
        }

        if let Some(max_attempts) = parse_var::<u32>(&lookup, "AI_MAX_ATTEMPTS")? {
            if max_attempts == 0 {
                return Err(AiError::Config {
                    message: "AI_MAX_ATTEMPTS must be at least 1".to_string(),
                });
            }
            config.retry.max_attempts = max_attempts;
        }
        if let Some(mode) = parse_var::<BackoffMode>(&lookup, "AI_RETRY_MODE")? {
            config.retry.mode = mode;
        }
        if let Some(max_tokens) = parse_var::<u32>(&lookup, "AI_MAX_TOKENS")? {
            config.max_tokens = max_tokens;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "AI_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Picks a provider from whichever credentials are available.
fn detect_provider(lookup: &impl Fn(&str) -> Option<String>) -> ProviderKind {
    if lookup("AWS_BEARER_TOKEN_BEDROCK").is_some() {
        log::info!("Auto-detected AI provider: Bedrock (AWS_BEARER_TOKEN_BEDROCK found)");
        return ProviderKind::Bedrock;
    }

    if lookup("ANTHROPIC_API_KEY").is_some() {
        log::info!("Auto-detected AI provider: Anthropic (ANTHROPIC_API_KEY found)");
        return ProviderKind::Anthropic;
    }

    if lookup("OPENAI_API_KEY").is_some() {
        log::info!("Auto-detected AI provider: OpenAI (OPENAI_API_KEY found)");
        return ProviderKind::OpenAi;
    }

    log::info!("Defaulting AI provider to Bedrock (standard AWS credential chain)");
    ProviderKind::Bedrock
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, AiError> {
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| AiError::Config {
                message: format!("Invalid value for {key}: {raw}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ModelConfig, AiError> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ModelConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn explicit_bedrock_config() {
        let config = config_from(&[
            ("AI_PROVIDER", "Bedrock"),
            ("BEDROCK_MODEL", "anthropic.claude-3-haiku"),
            ("AWS_REGION", "us-west-2"),
            ("AWS_ACCESS_KEY_ID", "AKIA123"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AI_MAX_ATTEMPTS", "4"),
            ("AI_RETRY_MODE", "adaptive"),
        ])
        .unwrap();

        assert_eq!(config.provider, ProviderKind::Bedrock);
        assert_eq!(config.model_id, "anthropic.claude-3-haiku");
        assert_eq!(config.region.as_deref(), Some("us-west-2"));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.mode, BackoffMode::Adaptive);
        assert_eq!(
            config.credentials,
            Some(Credentials::Aws {
                access_key_id: "AKIA123".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            })
        );
    }

    #[test]
    fn defaults_to_bedrock_with_credential_chain() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.provider, ProviderKind::Bedrock);
        assert_eq!(config.model_id, ProviderKind::Bedrock.default_model());
        assert_eq!(config.credentials, None);
        assert_eq!(config.region, None);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn bearer_token_defaults_region() {
        let config = config_from(&[("AWS_BEARER_TOKEN_BEDROCK", "token")]).unwrap();
        assert_eq!(config.provider, ProviderKind::Bedrock);
        assert_eq!(config.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn detects_anthropic_from_key() {
        let config = config_from(&[("ANTHROPIC_API_KEY", "sk-ant")]).unwrap();
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.model_id, "claude-sonnet-4-20250514");
        assert_eq!(
            config.credentials,
            Some(Credentials::ApiKey("sk-ant".to_string()))
        );
    }

    #[test]
    fn provider_aliases_are_case_insensitive() {
        assert_eq!(ProviderKind::from_str("CLAUDE").unwrap(), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::from_str("gpt").unwrap(), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_str("aws").unwrap(), ProviderKind::Bedrock);
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
    }

    #[test]
    fn openai_without_key_needs_base_url() {
        assert!(matches!(
            config_from(&[("AI_PROVIDER", "openai")]),
            Err(AiError::Config { .. })
        ));

        let config = config_from(&[
            ("AI_PROVIDER", "openai"),
            ("AI_BASE_URL", "http://localhost:11434/v1"),
            ("AI_MODEL", "llama3"),
        ])
        .unwrap();
        assert_eq!(config.credentials, None);
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            config_from(&[("AI_PROVIDER", "palm")]),
            Err(AiError::Config { .. })
        ));
        assert!(matches!(
            config_from(&[("AI_MAX_ATTEMPTS", "lots")]),
            Err(AiError::Config { .. })
        ));
        assert!(matches!(
            config_from(&[("AI_MAX_ATTEMPTS", "0")]),
            Err(AiError::Config { .. })
        ));
        assert!(matches!(
            config_from(&[("AI_RETRY_MODE", "legacy")]),
            Err(AiError::Config { .. })
        ));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let creds = Credentials::Aws {
            access_key_id: "AKIA123".to_string(),
            secret_access_key: "super-secret".to_string(),
            session_token: Some("tok".to_string()),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("AKIA123"));
        assert!(!shown.contains("super-secret"));
        assert!(!format!("{:?}", Credentials::ApiKey("sk-1".to_string())).contains("sk-1"));
    }
}
