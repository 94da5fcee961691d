//! Secret types for protecting bearer tokens from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for raw tokens before they have been
//! verified. `SecretString` implements `Debug` with redaction, so any struct
//! that derives `Debug` and holds a token stays safe to log.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct VerifyRequest {
//!     client_id: String,
//!     token: SecretString,
//! }
//!
//! let req = VerifyRequest {
//!     client_id: "app-client".to_string(),
//!     token: SecretString::from("eyJraWQiOi..."),
//! };
//!
//! assert!(!format!("{req:?}").contains("eyJraWQiOi"));
//! let raw: &str = req.token.expose_secret();
//! assert!(raw.starts_with("eyJ"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Wrap a raw bearer token, trimming surrounding whitespace and an optional
/// `Bearer ` scheme prefix as found in `Authorization` headers.
#[must_use]
pub fn bearer_token(raw: &str) -> SecretString {
    let trimmed = raw.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .unwrap_or(trimmed)
        .trim();
    SecretString::from(token.to_string())
}
