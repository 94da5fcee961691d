//! Token verification pipeline.
//!
//! Runs the stages in a fixed order and stops at the first failure:
//!
//! ```text
//! Start -> HeaderDecoded -> KeyResolved -> SignatureChecked -> ClaimsDecoded -> Validated
//! ```
//!
//! Any stage may fail with one [`VerifyError`], which is returned unchanged.
//! Nothing decoded before a failure is returned, and nothing is retried.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The `kid` is resolved only against the configured authority's key set
//! - Claims are decoded only after the signature has verified

use crate::auth::authority::Authority;
use crate::auth::claims::{validate_claims, Claims, VerifiedClaims};
use crate::auth::jwks::{KeySet, KeySetStore};
use crate::auth::signature::{parse_rsa_algorithm, RsaVerifyingKey};
use crate::errors::VerifyError;
use crate::observability::metrics;
use common::jwt::{Header, RawToken};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Last pipeline stage a verification completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    HeaderDecoded,
    KeyResolved,
    SignatureChecked,
    ClaimsDecoded,
    Validated,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::HeaderDecoded => "header_decoded",
            Stage::KeyResolved => "key_resolved",
            Stage::SignatureChecked => "signature_checked",
            Stage::ClaimsDecoded => "claims_decoded",
            Stage::Validated => "validated",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verifies tokens issued by one authority for one client application.
///
/// Cheap to clone; clones share the same [`KeySetStore`].
#[derive(Clone)]
pub struct TokenVerifier {
    /// Shared key cache.
    key_store: Arc<KeySetStore>,

    /// Issuer whose keys are trusted.
    authority: Authority,

    /// Required audience; `None` skips the audience check.
    expected_client_id: Option<String>,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("authority", &self.authority)
            .field("expected_client_id", &self.expected_client_id)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Create a verifier.
    ///
    /// # Arguments
    ///
    /// * `key_store` - Key cache, usually shared process-wide
    /// * `authority` - Issuer whose keys are trusted
    /// * `expected_client_id` - Required audience; `None` or `""` disables
    ///   the audience check
    pub fn new(
        key_store: Arc<KeySetStore>,
        authority: Authority,
        expected_client_id: Option<String>,
    ) -> Self {
        Self {
            key_store,
            authority,
            expected_client_id: expected_client_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn key_store(&self) -> &Arc<KeySetStore> {
        &self.key_store
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    ///
    /// Returns the [`VerifyError`] of the first stage that fails.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, VerifyError> {
        self.verify_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Verify a token as of `now` (Unix epoch seconds).
    ///
    /// # Errors
    ///
    /// Returns the [`VerifyError`] of the first stage that fails.
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedClaims, VerifyError> {
        self.run(token, now, None).await
    }

    /// Verify a token against the current time, abandoning any key fetch
    /// when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Cancelled` on cancellation, otherwise the
    /// [`VerifyError`] of the first stage that fails.
    pub async fn verify_cancellable(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<VerifiedClaims, VerifyError> {
        self.run(token, chrono::Utc::now().timestamp(), Some(cancel))
            .await
    }

    #[instrument(skip_all, fields(authority = %self.authority))]
    async fn run(
        &self,
        token: &str,
        now: i64,
        cancel: Option<&CancellationToken>,
    ) -> Result<VerifiedClaims, VerifyError> {
        let start = Instant::now();
        let mut stage = Stage::Start;

        let result = self.run_stages(token, now, cancel, &mut stage).await;

        match &result {
            Ok(_) => {
                tracing::debug!(target: "verifier.jwt", "Token validated successfully");
                metrics::record_token_validation("success", None, start.elapsed());
            }
            Err(e) => {
                tracing::debug!(
                    target: "verifier.jwt",
                    error_type = e.kind(),
                    last_stage = %stage,
                    "Token verification failed"
                );
                metrics::record_token_validation("error", Some(e.kind()), start.elapsed());
            }
        }

        result
    }

    async fn run_stages(
        &self,
        token: &str,
        now: i64,
        cancel: Option<&CancellationToken>,
        stage: &mut Stage,
    ) -> Result<VerifiedClaims, VerifyError> {
        let raw = RawToken::parse(token)?;
        let header = raw.header()?;
        *stage = Stage::HeaderDecoded;

        let key_set = match cancel {
            Some(cancel) => {
                self.key_store
                    .get_cancellable(&self.authority, cancel)
                    .await?
            }
            None => self.key_store.get(&self.authority).await?,
        };

        verify_decoded(
            &raw,
            &header,
            &key_set,
            self.expected_client_id.as_deref(),
            now,
            stage,
        )
    }
}

/// Verify a token against a key set the caller already holds.
///
/// Runs the same stages as [`TokenVerifier`] without any network access.
///
/// # Errors
///
/// Returns the [`VerifyError`] of the first stage that fails.
pub fn verify_with_key_set(
    token: &str,
    key_set: &KeySet,
    expected_client_id: Option<&str>,
    now: i64,
) -> Result<VerifiedClaims, VerifyError> {
    let raw = RawToken::parse(token)?;
    let header = raw.header()?;
    let mut stage = Stage::HeaderDecoded;
    verify_decoded(&raw, &header, key_set, expected_client_id, now, &mut stage)
}

/// Stages after the header has been decoded and the key set resolved.
fn verify_decoded(
    raw: &RawToken<'_>,
    header: &Header,
    key_set: &KeySet,
    expected_client_id: Option<&str>,
    now: i64,
    stage: &mut Stage,
) -> Result<VerifiedClaims, VerifyError> {
    let record = key_set.find(&header.kid).map_err(|e| {
        tracing::debug!(target: "verifier.jwt", kid = %header.kid, "Key id not in key set");
        e
    })?;
    let key = RsaVerifyingKey::from_record(record)?;
    *stage = Stage::KeyResolved;

    if parse_rsa_algorithm(&header.alg) != Some(key.algorithm()) {
        tracing::warn!(
            target: "verifier.jwt",
            kid = %header.kid,
            header_alg = %header.alg,
            key_alg = ?key.algorithm(),
            "Token algorithm does not match key algorithm"
        );
        return Err(VerifyError::SignatureVerification);
    }

    let signature = raw.signature_bytes()?;
    if !key.verify(raw.signing_input(), &signature) {
        tracing::debug!(target: "verifier.jwt", kid = %header.kid, "Token signature did not verify");
        return Err(VerifyError::SignatureVerification);
    }
    *stage = Stage::SignatureChecked;

    let claims: Claims = raw.claims()?;
    *stage = Stage::ClaimsDecoded;

    let verified = validate_claims(claims, expected_client_id, now)?;
    *stage = Stage::Validated;

    Ok(verified)
}
