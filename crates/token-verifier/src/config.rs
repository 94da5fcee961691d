//! Token verifier configuration.
//!
//! Configuration is loaded from environment variables. Nothing here is
//! secret, so the derived Debug output is safe to log.

use crate::auth::authority::Authority;
use crate::auth::jwks::{KeySetStore, DEFAULT_FETCH_TIMEOUT_SECONDS};
use crate::auth::verifier::TokenVerifier;
use crate::hosted_ui::{HostedUiRequest, ResponseType};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for `JWKS_FETCH_TIMEOUT_SECONDS`.
pub const MAX_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Provider region (e.g., "eu-west-1").
    pub region: String,

    /// User pool whose keys are trusted.
    pub user_pool_id: String,

    /// Required audience. `None` disables the audience check.
    pub client_id: Option<String>,

    /// Bound on a single key document fetch (default: 10s).
    pub jwks_fetch_timeout: Duration,

    /// Replaces `https://cognito-idp.{region}.amazonaws.com` when set.
    pub jwks_base_url: Option<String>,

    /// Hosted UI login link settings, if configured.
    pub hosted_ui: Option<HostedUiRequest>,

    /// Emit logs as JSON lines.
    pub json_logs: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid hosted UI configuration: {0}")]
    InvalidHostedUi(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let region = required(vars, "COGNITO_REGION")?;
        let user_pool_id = required(vars, "USERPOOL_ID")?;
        let client_id = optional(vars, "COGNITO_CLIENT_ID");

        let jwks_fetch_timeout = if let Some(value_str) = vars.get("JWKS_FETCH_TIMEOUT_SECONDS") {
            let value: u64 = value_str.trim().parse().map_err(|e| {
                ConfigError::InvalidFetchTimeout(format!(
                    "JWKS_FETCH_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 || value > MAX_FETCH_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidFetchTimeout(format!(
                    "JWKS_FETCH_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                    MAX_FETCH_TIMEOUT_SECONDS, value
                )));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS)
        };

        let jwks_base_url = optional(vars, "COGNITO_JWKS_BASE_URL");

        let hosted_ui = match optional(vars, "COGNITO_DOMAIN_PREFIX") {
            Some(domain_prefix) => {
                let client_id = client_id.clone().ok_or_else(|| {
                    ConfigError::InvalidHostedUi(
                        "COGNITO_DOMAIN_PREFIX requires COGNITO_CLIENT_ID".to_string(),
                    )
                })?;
                let redirect_uri = optional(vars, "COGNITO_REDIRECT_URI").ok_or_else(|| {
                    ConfigError::InvalidHostedUi(
                        "COGNITO_DOMAIN_PREFIX requires COGNITO_REDIRECT_URI".to_string(),
                    )
                })?;
                let response_type = match optional(vars, "COGNITO_RESPONSE_TYPE") {
                    Some(value) => value
                        .parse::<ResponseType>()
                        .map_err(|e| ConfigError::InvalidHostedUi(e.to_string()))?,
                    None => ResponseType::default(),
                };

                Some(HostedUiRequest {
                    domain_prefix,
                    region: region.clone(),
                    client_id,
                    redirect_uri,
                    response_type,
                })
            }
            None => None,
        };

        let json_logs = match optional(vars, "LOG_FORMAT").as_deref() {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(ConfigError::InvalidLogFormat(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{}'",
                    other
                )))
            }
        };

        Ok(Config {
            region,
            user_pool_id,
            client_id,
            jwks_fetch_timeout,
            jwks_base_url,
            hosted_ui,
            json_logs,
        })
    }

    pub fn authority(&self) -> Authority {
        Authority::new(self.region.clone(), self.user_pool_id.clone())
    }

    /// Key store honouring the configured base URL and fetch timeout.
    pub fn key_store(&self) -> KeySetStore {
        KeySetStore::with_options(self.jwks_base_url.clone(), self.jwks_fetch_timeout)
    }

    /// Verifier for the configured authority and audience, backed by `key_store`.
    pub fn verifier(&self, key_store: Arc<KeySetStore>) -> TokenVerifier {
        TokenVerifier::new(key_store, self.authority(), self.client_id.clone())
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    optional(vars, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Set and non-blank, trimmed.
fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
