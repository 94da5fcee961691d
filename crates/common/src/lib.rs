//! Common utilities shared across the token verifier crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for compact JWT decoding (untrusted header and claims)
pub mod jwt;
