//! Token verification error types.
//!
//! Every pipeline stage fails with exactly one of these variants and the
//! pipeline returns it unchanged. Callers match on the variant (or on
//! [`VerifyError::kind`]) to decide between re-authentication, retry, or
//! treating the request as hostile.

use common::jwt::JwtDecodeError;
use thiserror::Error;

/// Why a token could not be verified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Token is not a well-formed compact token, or its header/claims JSON
    /// could not be decoded.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The key document could not be fetched or parsed.
    #[error("Key fetch failed: {0}")]
    KeyFetch(String),

    /// The token's `kid` is not in the authority's key set.
    #[error("Unknown signing key: {kid}")]
    UnknownKey { kid: String },

    /// The matched key record cannot be turned into a usable public key.
    #[error("Key construction failed: {0}")]
    KeyConstruction(String),

    /// The signature does not match the header and payload.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// The token expired before the check time.
    #[error("Token expired at {expired_at}, checked at {checked_at}")]
    ExpiredToken { expired_at: i64, checked_at: i64 },

    /// The token was issued for a different client application.
    #[error("Token audience {actual:?} was not issued for this audience {expected:?}")]
    AudienceMismatch { expected: String, actual: String },

    /// The caller cancelled verification before it completed.
    #[error("Verification cancelled")]
    Cancelled,
}

impl VerifyError {
    /// Stable discriminant suitable for metrics labels and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::MalformedToken(_) => "malformed_token",
            VerifyError::KeyFetch(_) => "key_fetch",
            VerifyError::UnknownKey { .. } => "unknown_key",
            VerifyError::KeyConstruction(_) => "key_construction",
            VerifyError::SignatureVerification => "signature_verification",
            VerifyError::ExpiredToken { .. } => "expired_token",
            VerifyError::AudienceMismatch { .. } => "audience_mismatch",
            VerifyError::Cancelled => "cancelled",
        }
    }

    /// Whether re-invoking the pipeline may succeed with the same token.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerifyError::KeyFetch(_))
    }
}

impl From<JwtDecodeError> for VerifyError {
    fn from(err: JwtDecodeError) -> Self {
        VerifyError::MalformedToken(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_distinct_per_variant() {
        let errors = [
            VerifyError::MalformedToken("x".to_string()),
            VerifyError::KeyFetch("x".to_string()),
            VerifyError::UnknownKey {
                kid: "k".to_string(),
            },
            VerifyError::KeyConstruction("x".to_string()),
            VerifyError::SignatureVerification,
            VerifyError::ExpiredToken {
                expired_at: 1,
                checked_at: 2,
            },
            VerifyError::AudienceMismatch {
                expected: "a".to_string(),
                actual: "b".to_string(),
            },
            VerifyError::Cancelled,
        ];

        let mut kinds: Vec<&str> = errors.iter().map(VerifyError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_only_key_fetch_is_retryable() {
        assert!(VerifyError::KeyFetch("timeout".to_string()).is_retryable());
        assert!(!VerifyError::SignatureVerification.is_retryable());
        assert!(!VerifyError::Cancelled.is_retryable());
        assert!(!VerifyError::ExpiredToken {
            expired_at: 1,
            checked_at: 2
        }
        .is_retryable());
    }

    #[test]
    fn test_decode_error_maps_to_malformed_token() {
        let err: VerifyError = JwtDecodeError::WrongSegmentCount(2).into();
        assert!(
            matches!(&err, VerifyError::MalformedToken(msg) if msg.contains("found 2")),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_display_cites_both_audiences() {
        let err = VerifyError::AudienceMismatch {
            expected: "client-a".to_string(),
            actual: "client-b".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("client-a"));
        assert!(msg.contains("client-b"));
    }

    #[test]
    fn test_display_expired_includes_timestamps() {
        let err = VerifyError::ExpiredToken {
            expired_at: 1_549_340_271,
            checked_at: 1_549_340_272,
        };
        assert_eq!(
            err.to_string(),
            "Token expired at 1549340271, checked at 1549340272"
        );
    }
}
