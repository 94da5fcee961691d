//! RSA signature verification against a published key record.
//!
//! Only the RSA PKCS#1 v1.5 family (`RS256`, `RS384`, `RS512`) is accepted.
//! The key record's `alg` selects the digest; a record without `alg` is
//! treated as `RS256`, the provider default.
//!
//! # Security
//!
//! - The signature covers the exact wire bytes `header.payload`, never the
//!   re-serialized JSON
//! - Moduli outside 2048..=8192 bits are rejected when the key is built
//! - A token whose header names a different algorithm than its key is
//!   rejected without attempting verification

use crate::auth::jwks::KeyRecord;
use crate::errors::VerifyError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use ring::signature::{self, RsaParameters, RsaPublicKeyComponents};

const MIN_MODULUS_BITS: usize = 2048;
const MAX_MODULUS_BITS: usize = 8192;

/// Largest public exponent accepted by the verifier (33 bits).
const MAX_EXPONENT_BYTES: usize = 5;

/// A public key rebuilt from a [`KeyRecord`], ready to verify signatures.
#[derive(Debug, Clone)]
pub struct RsaVerifyingKey {
    kid: String,
    algorithm: Algorithm,
    n: Vec<u8>,
    e: Vec<u8>,
}

impl RsaVerifyingKey {
    /// Reconstruct the public key from the record's modulus and exponent.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::KeyConstruction` if the record is not an RSA
    /// signing key of a supported algorithm, or its components are invalid.
    pub fn from_record(record: &KeyRecord) -> Result<Self, VerifyError> {
        if record.kty != "RSA" {
            tracing::warn!(target: "verifier.jwt", kid = %record.kid, kty = %record.kty, "Unexpected key type");
            return Err(VerifyError::KeyConstruction(format!(
                "key {} has unsupported key type {:?}",
                record.kid, record.kty
            )));
        }

        if let Some(key_use) = &record.key_use {
            if key_use != "sig" {
                tracing::warn!(target: "verifier.jwt", kid = %record.kid, key_use = %key_use, "Key is not a signing key");
                return Err(VerifyError::KeyConstruction(format!(
                    "key {} has use {:?}, expected \"sig\"",
                    record.kid, key_use
                )));
            }
        }

        let algorithm = match record.alg.as_deref() {
            None => Algorithm::RS256,
            Some(alg) => parse_rsa_algorithm(alg).ok_or_else(|| {
                tracing::warn!(target: "verifier.jwt", kid = %record.kid, alg = %alg, "Unsupported key algorithm");
                VerifyError::KeyConstruction(format!(
                    "key {} has unsupported algorithm {:?}",
                    record.kid, alg
                ))
            })?,
        };

        let n = decode_component(&record.kid, "n", &record.n)?;
        let bits = bit_length(&n);
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) {
            return Err(VerifyError::KeyConstruction(format!(
                "key {} modulus is {} bits, expected {}..={}",
                record.kid, bits, MIN_MODULUS_BITS, MAX_MODULUS_BITS
            )));
        }

        let e = decode_component(&record.kid, "e", &record.e)?;
        let e_is_odd = e.last().is_some_and(|b| b & 1 == 1);
        if e.len() > MAX_EXPONENT_BYTES || bit_length(&e) < 2 || !e_is_odd {
            return Err(VerifyError::KeyConstruction(format!(
                "key {} has an invalid public exponent",
                record.kid
            )));
        }

        Ok(Self {
            kid: record.kid.clone(),
            algorithm,
            n,
            e,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Check `signature` over `signing_input`.
    ///
    /// Returns `false` for any signature that does not verify; a bad
    /// signature is an expected outcome, not an error.
    pub fn verify(&self, signing_input: &[u8], signature: &[u8]) -> bool {
        let components = RsaPublicKeyComponents {
            n: self.n.as_slice(),
            e: self.e.as_slice(),
        };
        components
            .verify(rsa_parameters(self.algorithm), signing_input, signature)
            .is_ok()
    }
}

/// Verify a signature with the public key described by `record`.
///
/// # Errors
///
/// Returns `VerifyError::KeyConstruction` if `record` cannot be turned into a
/// public key. An invalid signature is `Ok(false)`.
pub fn verify_signature(
    signing_input: &[u8],
    signature: &[u8],
    record: &KeyRecord,
) -> Result<bool, VerifyError> {
    let key = RsaVerifyingKey::from_record(record)?;
    Ok(key.verify(signing_input, signature))
}

/// Parse an algorithm name, keeping only the RSA PKCS#1 v1.5 family.
pub(crate) fn parse_rsa_algorithm(name: &str) -> Option<Algorithm> {
    match name.parse::<Algorithm>() {
        Ok(alg @ (Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512)) => Some(alg),
        _ => None,
    }
}

fn rsa_parameters(algorithm: Algorithm) -> &'static RsaParameters {
    match algorithm {
        Algorithm::RS384 => &signature::RSA_PKCS1_2048_8192_SHA384,
        Algorithm::RS512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        // from_record only admits the RS* family
        _ => &signature::RSA_PKCS1_2048_8192_SHA256,
    }
}

/// Decode a big-endian base64url component and strip leading zero bytes.
fn decode_component(kid: &str, name: &str, value: &str) -> Result<Vec<u8>, VerifyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| {
            tracing::error!(target: "verifier.jwt", kid = %kid, component = name, error = %e, "Invalid key component encoding");
            VerifyError::KeyConstruction(format!("key {} has invalid {} encoding", kid, name))
        })?;

    let stripped: Vec<u8> = bytes.into_iter().skip_while(|b| *b == 0).collect();
    if stripped.is_empty() {
        return Err(VerifyError::KeyConstruction(format!(
            "key {} has an empty {} component",
            kid, name
        )));
    }
    Ok(stripped)
}

/// Number of significant bits in a big-endian integer without leading zeros.
fn bit_length(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(first) => (bytes.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    }
}
