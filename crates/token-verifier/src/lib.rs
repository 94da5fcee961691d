//! Token Verifier Library
//!
//! Verifies bearer tokens issued by a hosted identity provider user pool:
//!
//! - Fetches the pool's published RSA signing keys (JWKS) once per process
//!   and caches them by authority
//! - Checks the token signature against the key named by the header `kid`
//! - Checks expiry and, when configured, the intended client application
//!
//! # Pipeline
//!
//! ```text
//! common::jwt (decode) -> auth::jwks (key lookup) -> auth::signature -> auth::claims
//! ```
//!
//! # Modules
//!
//! - `auth` - Key cache, signature verification, claim validation
//! - `config` - Configuration from environment
//! - `errors` - Verification error type
//! - `hosted_ui` - Hosted sign-in page URL
//! - `observability` - Tracing setup and metrics

pub mod auth;
pub mod config;
pub mod errors;
pub mod hosted_ui;
pub mod observability;

pub use auth::{Authority, KeySet, KeySetStore, TokenVerifier, VerifiedClaims};
pub use errors::VerifyError;
