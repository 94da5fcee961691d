//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed test tokens shaped like the
//! identity provider's access tokens.

use crate::crypto_fixtures::TestKeyPair;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde_json::{json, Map, Value};

/// Issuer placed in tokens unless overridden.
pub const TEST_ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_test";

/// Builder for creating test tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .for_client("app-client")
///     .expires_in(3600)
///     .sign(&TestKeyPair::primary());
/// ```
pub struct TestTokenBuilder {
    sub: String,
    iss: String,
    client_id: Option<String>,
    exp: i64,
    iat: i64,
    kid: Option<String>,
    alg: Algorithm,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            iss: TEST_ISSUER.to_string(),
            client_id: None,
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            kid: None,
            alg: Algorithm::RS256,
            extra: Map::new(),
        }
    }

    /// Set the subject (user id)
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the `client_id` claim
    pub fn for_client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set expiration in seconds from now
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set the expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Put `kid` in the header instead of the signing key's own id
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Sign with the named algorithm and declare it in the header
    pub fn with_alg_header(mut self, alg: &str) -> Self {
        self.alg = alg
            .parse()
            .unwrap_or_else(|_| panic!("unsupported test algorithm {alg}"));
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(&self) -> Value {
        let mut claims = json!({
            "sub": self.sub,
            "iss": self.iss,
            "exp": self.exp,
            "iat": self.iat,
            "token_use": "access",
            "scope": "aws.cognito.signin.user.admin",
            "username": self.sub,
        });
        if let Some(obj) = claims.as_object_mut() {
            if let Some(client_id) = &self.client_id {
                obj.insert("client_id".to_string(), json!(client_id));
            }
            for (name, value) in &self.extra {
                obj.insert(name.clone(), value.clone());
            }
        }
        claims
    }

    /// Sign the claims with `keypair` and return the compact token
    pub fn sign(self, keypair: &TestKeyPair) -> String {
        let mut header = Header::new(self.alg);
        header.kid = Some(
            self.kid
                .clone()
                .unwrap_or_else(|| keypair.kid().to_string()),
        );
        let key = keypair.encoding_key().expect("test key should load");
        encode(&header, &self.build(), &key).expect("test token should sign")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_valid_claims() {
        let claims = TestTokenBuilder::new()
            .for_user("alice")
            .for_client("app-client")
            .with_claim("custom:tenant", json!("acme"))
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["client_id"], "app-client");
        assert_eq!(claims["custom:tenant"], "acme");
        assert!(claims["exp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_builder_default() {
        let claims = TestTokenBuilder::default().build();
        assert_eq!(claims["sub"], "test-subject");
        assert_eq!(claims["iss"], TEST_ISSUER);
        assert!(claims.get("client_id").is_none());
    }

    #[test]
    fn test_signed_token_header() {
        let keypair = TestKeyPair::primary();
        let token = TestTokenBuilder::new().sign(&keypair);

        assert_eq!(token.split('.').count(), 3);
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(keypair.kid()));
    }

    #[test]
    fn test_kid_and_alg_overrides() {
        let token = TestTokenBuilder::new()
            .with_kid("other-kid")
            .with_alg_header("RS384")
            .sign(&TestKeyPair::primary());

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS384);
        assert_eq!(header.kid.as_deref(), Some("other-kid"));
    }
}
