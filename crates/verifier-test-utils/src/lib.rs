//! # Verifier Test Utilities
//!
//! Shared test utilities for the token verifier.
//!
//! This crate provides:
//! - Deterministic RSA fixtures (fixed keys for reproducible tests)
//! - Token builders (TestTokenBuilder)
//! - A mock key document endpoint (TestJwksServer)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use verifier_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = TestJwksServer::start().await;
//!     server.serve_keys("us-east-1_test", &[TestKeyPair::primary()], Some(1)).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_client("app-client")
//!         .sign(&TestKeyPair::primary());
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
