//! Login URL for the identity provider's hosted sign-in page.
//!
//! Clients are sent here to obtain the tokens this crate verifies. The URL is
//! `https://{domain_prefix}.auth.{region}.amazoncognito.com/login` with the
//! client id, redirect URI and response type as form-encoded query values.

use reqwest::Url;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostedUiError {
    #[error("Invalid hosted UI {field}: {value:?}")]
    InvalidComponent { field: &'static str, value: String },

    #[error("Invalid response type {0:?}, expected \"token\" or \"code\"")]
    InvalidResponseType(String),

    #[error("Failed to build hosted UI URL: {0}")]
    InvalidUrl(String),
}

/// What the hosted UI hands back after sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Implicit grant: tokens in the redirect fragment.
    #[default]
    Token,
    /// Authorization code grant.
    Code,
}

impl ResponseType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseType::Token => "token",
            ResponseType::Code => "code",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = HostedUiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token" => Ok(ResponseType::Token),
            "code" => Ok(ResponseType::Code),
            other => Err(HostedUiError::InvalidResponseType(other.to_string())),
        }
    }
}

/// Parameters of a hosted UI login link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedUiRequest {
    pub domain_prefix: String,
    pub region: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: ResponseType,
}

impl HostedUiRequest {
    /// Build the login URL.
    ///
    /// # Errors
    ///
    /// Returns `HostedUiError::InvalidComponent` if the domain prefix or
    /// region is not a DNS label, or the client id or redirect URI is empty.
    pub fn login_url(&self) -> Result<Url, HostedUiError> {
        check_dns_label("domain_prefix", &self.domain_prefix)?;
        check_dns_label("region", &self.region)?;
        for (field, value) in [
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if value.is_empty() {
                return Err(HostedUiError::InvalidComponent {
                    field,
                    value: value.clone(),
                });
            }
        }

        let base = format!(
            "https://{}.auth.{}.amazoncognito.com/login",
            self.domain_prefix, self.region
        );
        Url::parse_with_params(
            &base,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", self.response_type.as_str()),
            ],
        )
        .map_err(|e| HostedUiError::InvalidUrl(e.to_string()))
    }
}

fn check_dns_label(field: &'static str, value: &str) -> Result<(), HostedUiError> {
    let valid = !value.is_empty()
        && !value.starts_with('-')
        && !value.ends_with('-')
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(HostedUiError::InvalidComponent {
            field,
            value: value.to_string(),
        })
    }
}
