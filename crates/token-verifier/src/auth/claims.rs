//! Token claims and the expiry/audience checks applied to them.
//!
//! [`Claims`] is decoded from the payload before the signature is trusted.
//! [`VerifiedClaims`] can only be produced by [`validate_claims`] and is the
//! only form handed to calling code.

use crate::errors::VerifyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

/// Decoded token payload.
///
/// Named fields are the ones this crate checks or that every provider token
/// carries; everything else lands in `extra`. The `sub` and `username` fields
/// are redacted in Debug output.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Issuer URL.
    pub iss: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// `access` or `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,

    /// Client application the token was issued to (access tokens).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Audience (ID tokens carry the client id here).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Username - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Provider-specific claims not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// The `aud` claim: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == client_id,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }

    pub fn first(&self) -> Option<&str> {
        match self {
            Audience::Single(aud) => Some(aud),
            Audience::Multiple(auds) => auds.first().map(String::as_str),
        }
    }
}

impl From<&str> for Audience {
    fn from(aud: &str) -> Self {
        Audience::Single(aud.to_string())
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("token_use", &self.token_use)
            .field("client_id", &self.client_id)
            .field("aud", &self.aud)
            .field("username", &self.username.as_ref().map(|_| "[REDACTED]"))
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl Claims {
    /// The client application this token was issued to.
    ///
    /// Access tokens carry `client_id`; ID tokens carry it in `aud`. For an
    /// array `aud` this is the first entry.
    pub fn audience(&self) -> Option<&str> {
        self.client_id
            .as_deref()
            .or_else(|| self.aud.as_ref().and_then(Audience::first))
    }

    /// Whether the token was issued to `client_id`.
    ///
    /// `client_id` wins when present; otherwise any `aud` entry may match.
    pub fn is_issued_to(&self, client_id: &str) -> bool {
        match (&self.client_id, &self.aud) {
            (Some(own), _) => own == client_id,
            (None, Some(aud)) => aud.contains(client_id),
            (None, None) => false,
        }
    }

    /// Space-separated `scope` claim as a list, empty when absent.
    pub fn scopes(&self) -> Vec<&str> {
        self.extra
            .get("scope")
            .and_then(|v| v.as_str())
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// Claims whose signature, expiry and audience have been checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VerifiedClaims(Claims);

impl VerifiedClaims {
    pub fn into_inner(self) -> Claims {
        self.0
    }
}

impl Deref for VerifiedClaims {
    type Target = Claims;

    fn deref(&self) -> &Claims {
        &self.0
    }
}

/// Check expiry and intended audience.
///
/// 1. Fails with `ExpiredToken` if `now > exp`; a token is still valid in the
///    second it expires.
/// 2. If `expected_client_id` is set and non-empty, fails with
///    `AudienceMismatch` unless [`Claims::is_issued_to`] it. The error cites
///    [`Claims::audience`] as the actual value.
///
/// # Errors
///
/// `VerifyError::ExpiredToken` or `VerifyError::AudienceMismatch`.
pub fn validate_claims(
    claims: Claims,
    expected_client_id: Option<&str>,
    now: i64,
) -> Result<VerifiedClaims, VerifyError> {
    if now > claims.exp {
        tracing::debug!(
            target: "verifier.jwt",
            exp = claims.exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(VerifyError::ExpiredToken {
            expired_at: claims.exp,
            checked_at: now,
        });
    }

    if let Some(expected) = expected_client_id.filter(|id| !id.is_empty()) {
        if !claims.is_issued_to(expected) {
            let actual = claims.audience().unwrap_or_default();
            tracing::debug!(
                target: "verifier.jwt",
                expected = %expected,
                actual = %actual,
                "Token rejected: audience mismatch"
            );
            return Err(VerifyError::AudienceMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    Ok(VerifiedClaims(claims))
}
