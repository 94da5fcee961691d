//! Compact JWT decoding shared by token verifier components.
//!
//! This module splits a compact token into its three segments and decodes the
//! header and payload JSON. Nothing here checks authenticity:
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header is only used to select a verification key
//! - Claims returned by [`decode_claims_unverified`] MUST NOT be trusted until
//!   the signature over [`RawToken::signing_input`] has been verified
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{RawToken, decode_header};
//!
//! let header = decode_header(token)?;
//! let key = key_set.get(&header.kid)?;
//!
//! let raw = RawToken::parse(token)?;
//! verify(raw.signing_input(), &raw.signature_bytes()?, key)?;
//! let claims: MyClaims = raw.claims()?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Identity provider access and ID tokens are typically 800-1500 bytes.
/// Larger tokens are rejected before any base64 decoding or JSON parsing.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Separator between the segments of a compact token.
pub const SEGMENT_SEPARATOR: char = '.';

// =============================================================================
// Error Types
// =============================================================================

/// Which segment of a compact token a decode failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Payload,
    Signature,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Header => f.write_str("header"),
            Segment::Payload => f.write_str("payload"),
            Segment::Signature => f.write_str("signature"),
        }
    }
}

/// Errors produced while decoding an untrusted compact token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtDecodeError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("token is {size} bytes, larger than the {max} byte limit")]
    TokenTooLarge { size: usize, max: usize },

    /// Token does not have exactly three segments.
    #[error("expected 3 dot-separated segments, found {0}")]
    WrongSegmentCount(usize),

    /// A segment is empty or not valid base64url.
    #[error("{0} segment is not valid base64url")]
    InvalidEncoding(Segment),

    /// A segment decoded to bytes that are not the expected JSON document.
    #[error("{segment} segment is not valid JSON: {reason}")]
    InvalidJson { segment: Segment, reason: String },

    /// Header has no `kid`, or `kid` is not a non-empty string.
    #[error("header is missing a key id")]
    MissingKid,

    /// Header has no `alg`, or `alg` is not a string.
    #[error("header is missing an algorithm")]
    MissingAlg,
}

// =============================================================================
// Types
// =============================================================================

/// Protected header of a compact token, read without verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Key id selecting the published key that signed the token.
    pub kid: String,

    /// Signing algorithm name (e.g. `RS256`).
    pub alg: String,

    /// Optional media type, usually `JWT`.
    pub typ: Option<String>,
}

/// The three segments of a compact token, borrowed from the wire string.
///
/// Construction only checks the shape of the token. Every accessor decodes
/// lazily so that callers pay for exactly the stages they reach.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawToken<'a> {
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
    signing_input: &'a str,
}

impl fmt::Debug for RawToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawToken")
            .field("header", &self.header)
            .field("payload", &"[REDACTED]")
            .field("signature", &"[REDACTED]")
            .finish()
    }
}

impl<'a> RawToken<'a> {
    /// Split a compact token into header, payload and signature segments.
    ///
    /// # Errors
    ///
    /// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
    /// - `WrongSegmentCount` if there are not exactly three segments
    /// - `InvalidEncoding` if any segment is empty
    pub fn parse(token: &'a str) -> Result<Self, JwtDecodeError> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(
                target: "common.jwt",
                token_size = token.len(),
                max_size = MAX_JWT_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(JwtDecodeError::TokenTooLarge {
                size: token.len(),
                max: MAX_JWT_SIZE_BYTES,
            });
        }

        let segment_count = token.split(SEGMENT_SEPARATOR).count();
        let mut parts = token.split(SEGMENT_SEPARATOR);
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            tracing::debug!(
                target: "common.jwt",
                parts = segment_count,
                "Token rejected: invalid JWT format"
            );
            return Err(JwtDecodeError::WrongSegmentCount(segment_count));
        };

        for (segment, value) in [
            (Segment::Header, header),
            (Segment::Payload, payload),
            (Segment::Signature, signature),
        ] {
            if value.is_empty() {
                return Err(JwtDecodeError::InvalidEncoding(segment));
            }
        }

        // Exactly three segments, so the last separator ends the signing input.
        let signing_input = token
            .rsplit_once(SEGMENT_SEPARATOR)
            .map(|(input, _)| input)
            .ok_or(JwtDecodeError::WrongSegmentCount(segment_count))?;

        Ok(Self {
            header,
            payload,
            signature,
            signing_input,
        })
    }

    /// The exact wire bytes covered by the signature: `header.payload`.
    #[must_use]
    pub fn signing_input(&self) -> &'a [u8] {
        self.signing_input.as_bytes()
    }

    /// Decode the signature segment into raw signature bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding(Signature)` if the segment is not base64url.
    pub fn signature_bytes(&self) -> Result<Vec<u8>, JwtDecodeError> {
        decode_segment(self.signature, Segment::Signature)
    }

    /// Decode the protected header without verifying anything.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding`/`InvalidJson` for a corrupt header segment,
    /// `MissingKid` or `MissingAlg` when those members are absent.
    pub fn header(&self) -> Result<Header, JwtDecodeError> {
        let bytes = decode_segment(self.header, Segment::Header)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
            JwtDecodeError::InvalidJson {
                segment: Segment::Header,
                reason: e.to_string(),
            }
        })?;

        // Reject empty values for kid; an empty id can never select a key.
        let kid = value
            .get("kid")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .ok_or(JwtDecodeError::MissingKid)?;

        let alg = value
            .get("alg")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or(JwtDecodeError::MissingAlg)?;

        let typ = value
            .get("typ")
            .and_then(|v| v.as_str())
            .map(ToString::to_string);

        Ok(Header { kid, alg, typ })
    }

    /// Decode the payload into `T` without verifying the signature.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding`/`InvalidJson` if the payload segment cannot
    /// be decoded into `T`.
    pub fn claims<T: DeserializeOwned>(&self) -> Result<T, JwtDecodeError> {
        let bytes = decode_segment(self.payload, Segment::Payload)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
            JwtDecodeError::InvalidJson {
                segment: Segment::Payload,
                reason: e.to_string(),
            }
        })
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Decode the header of a compact token without verifying the signature.
///
/// # Errors
///
/// Any [`JwtDecodeError`] from [`RawToken::parse`] or [`RawToken::header`].
pub fn decode_header(token: &str) -> Result<Header, JwtDecodeError> {
    RawToken::parse(token)?.header()
}

/// Decode the claims of a compact token without verifying the signature.
///
/// The result is attacker-controlled until the signature has been checked.
///
/// # Errors
///
/// Any [`JwtDecodeError`] from [`RawToken::parse`] or [`RawToken::claims`].
pub fn decode_claims_unverified<T: DeserializeOwned>(token: &str) -> Result<T, JwtDecodeError> {
    RawToken::parse(token)?.claims()
}

/// Decode one base64url segment, tolerating trailing `=` padding.
fn decode_segment(segment: &str, which: Segment) -> Result<Vec<u8>, JwtDecodeError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", segment = %which, error = %e, "Failed to decode JWT segment base64");
            JwtDecodeError::InvalidEncoding(which)
        })
}

// =============================================================================
// Tests
// =============================================================================
