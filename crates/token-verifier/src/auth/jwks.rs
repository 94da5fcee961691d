//! Key set store: fetches and caches an authority's published signing keys.
//!
//! The first lookup for an [`Authority`] fetches its `/.well-known/jwks.json`
//! document and caches the parsed [`KeySet`] for the rest of the process
//! lifetime. There is no TTL and no background refresh; operators can drop an
//! entry with [`KeySetStore::invalidate`].
//!
//! # Concurrency
//!
//! - The cache lock is never held across a network call, so lookups for
//!   different authorities never wait on each other's fetches
//! - Concurrent misses for the same authority may each fetch; the first
//!   completed fetch is published and every caller receives that same entry
//! - Entries are immutable `Arc<KeySet>` values, published whole under the
//!   write lock, so readers never observe a partially built key set
//! - A failed fetch leaves the cache untouched, so the next call retries

use crate::auth::authority::Authority;
use crate::errors::VerifyError;
use crate::observability::metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default bound on a single key document fetch, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// One published signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Key type (always "RSA" for supported keys).
    pub kty: String,

    /// RSA modulus (base64url, big-endian).
    pub n: String,

    /// RSA public exponent (base64url, big-endian).
    pub e: String,

    /// Algorithm (e.g. "RS256").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
}

/// Raw key document; individual keys are validated one by one.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

/// All signing keys published by one authority, indexed by key id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    authority: Authority,
    keys: HashMap<String, KeyRecord>,
}

impl KeySet {
    /// Build a key set from records the caller already holds.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::KeyFetch` if two records share a key id.
    pub fn from_records(
        authority: Authority,
        records: impl IntoIterator<Item = KeyRecord>,
    ) -> Result<Self, VerifyError> {
        let mut keys = HashMap::new();
        for record in records {
            let kid = record.kid.clone();
            if keys.insert(kid.clone(), record).is_some() {
                return Err(VerifyError::KeyFetch(format!(
                    "key document for {} contains duplicate kid {:?}",
                    authority, kid
                )));
            }
        }
        Ok(Self { authority, keys })
    }

    /// Parse a `{"keys": [...]}` key document.
    ///
    /// Entries missing `kid`, `kty`, `n` or `e` are skipped with a warning. A
    /// body that is not a key document at all, or one whose keys are all
    /// skipped, fails the whole fetch.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::KeyFetch` for unparseable documents, documents
    /// with no usable keys, and duplicate key ids.
    pub fn from_document(authority: Authority, body: &[u8]) -> Result<Self, VerifyError> {
        let document: JwksDocument = serde_json::from_slice(body).map_err(|e| {
            tracing::error!(target: "verifier.jwks", authority = %authority, error = %e, "Failed to parse key document");
            VerifyError::KeyFetch(format!("invalid key document for {}: {}", authority, e))
        })?;

        let listed = document.keys.len();
        let records = document
            .keys
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<KeyRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(target: "verifier.jwks", authority = %authority, error = %e, "Skipping incomplete key record");
                    None
                }
            })
            .collect::<Vec<_>>();

        // Every listed key unusable: treat as a failed fetch so it is retried.
        if listed > 0 && records.is_empty() {
            tracing::error!(target: "verifier.jwks", authority = %authority, listed, "Key document has no usable keys");
            return Err(VerifyError::KeyFetch(format!(
                "key document for {} lists {} keys, none usable",
                authority, listed
            )));
        }

        Self::from_records(authority, records)
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn get(&self, kid: &str) -> Option<&KeyRecord> {
        self.keys.get(kid)
    }

    /// Look up a key, failing with `UnknownKey` when it is not published.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::UnknownKey` if `kid` is not in this key set.
    pub fn find(&self, kid: &str) -> Result<&KeyRecord, VerifyError> {
        self.get(kid).ok_or_else(|| VerifyError::UnknownKey {
            kid: kid.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids in this set, in no particular order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// Process-wide cache of key sets, one per authority.
pub struct KeySetStore {
    /// HTTP client for fetching key documents.
    http_client: reqwest::Client,

    /// Replacement for the regional key host, if any.
    base_url: Option<String>,

    /// Upper bound on one fetch, connection through body.
    fetch_timeout: Duration,

    /// Published key sets.
    cache: RwLock<HashMap<Authority, Arc<KeySet>>>,
}

impl Default for KeySetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySetStore {
    /// Create a store that fetches from the provider's regional hosts.
    pub fn new() -> Self {
        Self::with_options(None, Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS))
    }

    /// Create a store with a custom key host and fetch timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Replaces `https://cognito-idp.{region}.amazonaws.com`
    /// * `fetch_timeout` - Bound on each key document fetch
    pub fn with_options(base_url: Option<String>, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "verifier.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            http_client,
            base_url,
            fetch_timeout,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get the key set for an authority, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::KeyFetch` if the document cannot be fetched
    /// within the timeout or cannot be parsed. Nothing is cached on failure.
    #[instrument(skip_all, fields(authority = %authority))]
    pub async fn get(&self, authority: &Authority) -> Result<Arc<KeySet>, VerifyError> {
        if let Some(key_set) = self.cache.read().await.get(authority) {
            tracing::debug!(target: "verifier.jwks", "Key set cache hit");
            metrics::record_jwks_cache("hit");
            return Ok(Arc::clone(key_set));
        }
        metrics::record_jwks_cache("miss");

        let fetched = Arc::new(self.fetch(authority).await?);

        // A concurrent miss may have published first; keep its entry so all
        // callers converge on one key set.
        let mut cache = self.cache.write().await;
        let key_set = cache
            .entry(authority.clone())
            .or_insert_with(|| Arc::clone(&fetched));

        if Arc::ptr_eq(key_set, &fetched) {
            tracing::info!(
                target: "verifier.jwks",
                key_count = key_set.len(),
                "Key set cached"
            );
        } else {
            tracing::debug!(
                target: "verifier.jwks",
                key_count = key_set.len(),
                "Adopted key set published by a concurrent fetch"
            );
        }

        Ok(Arc::clone(key_set))
    }

    /// Like [`get`](Self::get), but abandons an in-flight fetch when `cancel`
    /// fires.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Cancelled` on cancellation, otherwise the errors
    /// of [`get`](Self::get).
    pub async fn get_cancellable(
        &self,
        authority: &Authority,
        cancel: &CancellationToken,
    ) -> Result<Arc<KeySet>, VerifyError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(target: "verifier.jwks", authority = %authority, "Key set lookup cancelled");
                Err(VerifyError::Cancelled)
            }
            result = self.get(authority) => result,
        }
    }

    /// Drop the cached key set for an authority so the next lookup refetches.
    ///
    /// Returns whether an entry was present.
    pub async fn invalidate(&self, authority: &Authority) -> bool {
        let removed = self.cache.write().await.remove(authority).is_some();
        if removed {
            tracing::info!(target: "verifier.jwks", authority = %authority, "Key set invalidated");
        }
        removed
    }

    /// Drop every cached key set.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub async fn is_cached(&self, authority: &Authority) -> bool {
        self.cache.read().await.contains_key(authority)
    }

    /// Fetch and parse the key document, bounded by `fetch_timeout`.
    async fn fetch(&self, authority: &Authority) -> Result<KeySet, VerifyError> {
        let url = authority.jwks_url(self.base_url.as_deref());
        tracing::debug!(target: "verifier.jwks", url = %url, "Fetching key document");

        let start = Instant::now();
        let result = match tokio::time::timeout(self.fetch_timeout, self.fetch_document(&url)).await
        {
            Ok(body) => body.and_then(|body| KeySet::from_document(authority.clone(), &body)),
            Err(_) => {
                tracing::error!(target: "verifier.jwks", url = %url, timeout = ?self.fetch_timeout, "Key document fetch timed out");
                Err(VerifyError::KeyFetch(format!(
                    "fetching {} timed out after {:?}",
                    url, self.fetch_timeout
                )))
            }
        };

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_jwks_fetch(status, start.elapsed());

        result
    }

    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, VerifyError> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "verifier.jwks", error = %e, "Failed to fetch key document");
            VerifyError::KeyFetch(format!("request to {} failed: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "verifier.jwks",
                status = %status,
                "Key document endpoint returned error"
            );
            return Err(VerifyError::KeyFetch(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(target: "verifier.jwks", error = %e, "Failed to read key document body");
            VerifyError::KeyFetch(format!("reading {} failed: {}", url, e))
        })?;

        Ok(body.to_vec())
    }
}
