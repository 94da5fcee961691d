//! Bearer token verification.
//!
//! - `authority` - Issuer identity and key document location
//! - `jwks` - Key set fetching and process-lifetime caching
//! - `signature` - RSA public key reconstruction and signature checks
//! - `claims` - Claims model, expiry and audience validation
//! - `verifier` - The ordered verification pipeline

pub mod authority;
pub mod claims;
pub mod jwks;
pub mod signature;
pub mod verifier;

pub use authority::Authority;
pub use claims::{validate_claims, Audience, Claims, VerifiedClaims};
pub use jwks::{KeyRecord, KeySet, KeySetStore};
pub use signature::{verify_signature, RsaVerifyingKey};
pub use verifier::{verify_with_key_set, Stage, TokenVerifier};
