//! Token verification integration tests.
//!
//! Runs the full pipeline against a mocked key document endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use token_verifier::auth::{Claims, KeySetStore, TokenVerifier};
use token_verifier::config::Config;
use token_verifier::{Authority, VerifyError};
use verifier_test_utils::{TestJwksServer, TestKeyPair, TestTokenBuilder};

const REGION: &str = "us-east-1";
const POOL_ID: &str = "us-east-1_test";
const CLIENT_ID: &str = "3h4pi1cc4dd84u4uutedgsquni";

const ISSUED_AT: i64 = 1_700_000_000;
const EXPIRES_AT: i64 = ISSUED_AT + 3600;
const NOW: i64 = ISSUED_AT + 60;

/// Verifier whose key store fetches from `server`.
fn verifier_for(server: &TestJwksServer, expected_client_id: Option<&str>) -> TokenVerifier {
    let store = KeySetStore::with_options(Some(server.base_url()), Duration::from_secs(5));
    TokenVerifier::new(
        Arc::new(store),
        Authority::new(REGION, POOL_ID),
        expected_client_id.map(str::to_string),
    )
}

fn valid_token() -> String {
    TestTokenBuilder::new()
        .issued_at(ISSUED_AT)
        .expires_at(EXPIRES_AT)
        .for_client(CLIENT_ID)
        .sign(&TestKeyPair::primary())
}

/// Flip every bit of one byte inside the signature.
fn flip_signature_byte(token: &str) -> String {
    let (signing_input, signature) = token.rsplit_once('.').unwrap();
    let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
    let middle = bytes.len() / 2;
    if let Some(byte) = bytes.get_mut(middle) {
        *byte ^= 0xff;
    }
    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(bytes))
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn test_valid_token_returns_decoded_payload() -> Result<()> {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], Some(1))
        .await;
    let verifier = verifier_for(&server, Some(CLIENT_ID));
    let token = valid_token();

    let verified = verifier.verify_at(&token, NOW).await?;

    let payload: Claims = common::jwt::decode_claims_unverified(&token)?;
    assert_eq!(verified.into_inner(), payload);
    Ok(())
}

#[tokio::test]
async fn test_flipped_signature_byte_fails_verification() {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;
    let verifier = verifier_for(&server, Some(CLIENT_ID));

    let result = verifier
        .verify_at(&flip_signature_byte(&valid_token()), NOW)
        .await;

    assert_eq!(result.unwrap_err(), VerifyError::SignatureVerification);
}

#[tokio::test]
async fn test_one_second_past_expiry_is_expired() {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;
    let verifier = verifier_for(&server, Some(CLIENT_ID));

    let result = verifier.verify_at(&valid_token(), EXPIRES_AT + 1).await;

    assert_eq!(
        result.unwrap_err(),
        VerifyError::ExpiredToken {
            expired_at: EXPIRES_AT,
            checked_at: EXPIRES_AT + 1,
        }
    );
}

#[tokio::test]
async fn test_different_expected_client_is_audience_mismatch() {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;
    let verifier = verifier_for(&server, Some("some-other-client"));

    let result = verifier.verify_at(&valid_token(), NOW).await;

    assert_eq!(
        result.unwrap_err(),
        VerifyError::AudienceMismatch {
            expected: "some-other-client".to_string(),
            actual: CLIENT_ID.to_string(),
        }
    );
}

#[tokio::test]
async fn test_key_fetch_failure_is_not_cached() -> Result<()> {
    let server = TestJwksServer::start().await;
    // First request fails, later ones fall through to the healthy document.
    server.serve_status(POOL_ID, 500, Some(1)).await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;
    let verifier = verifier_for(&server, Some(CLIENT_ID));
    let authority = Authority::new(REGION, POOL_ID);

    let result = verifier.verify_at(&valid_token(), NOW).await;
    assert!(matches!(result, Err(VerifyError::KeyFetch(msg)) if msg.contains("500")));
    assert!(!verifier.key_store().is_cached(&authority).await);

    verifier.verify_at(&valid_token(), NOW).await?;
    assert!(verifier.key_store().is_cached(&authority).await);
    assert_eq!(server.fetch_count(POOL_ID).await, 2);
    Ok(())
}

// ============================================================================
// Pipeline behavior
// ============================================================================

#[tokio::test]
async fn test_unknown_kid_does_not_refetch_cached_key_set() -> Result<()> {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], Some(1))
        .await;
    let verifier = verifier_for(&server, None);

    verifier.verify_at(&valid_token(), NOW).await?;

    let foreign = TestTokenBuilder::new()
        .issued_at(ISSUED_AT)
        .expires_at(EXPIRES_AT)
        .sign(&TestKeyPair::secondary());
    let result = verifier.verify_at(&foreign, NOW).await;

    assert_eq!(
        result.unwrap_err(),
        VerifyError::UnknownKey {
            kid: TestKeyPair::secondary().kid().to_string()
        }
    );
    assert_eq!(server.fetch_count(POOL_ID).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_expired_token_with_bad_signature_reports_signature() {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;
    let verifier = verifier_for(&server, Some(CLIENT_ID));

    let token = flip_signature_byte(&valid_token());
    let result = verifier.verify_at(&token, EXPIRES_AT + 100).await;

    assert_eq!(result.unwrap_err(), VerifyError::SignatureVerification);
}

#[tokio::test]
async fn test_malformed_token_fails_before_fetching_keys() {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], Some(0))
        .await;
    let verifier = verifier_for(&server, None);

    for token in ["", "not-a-token", "a.b", "e30.e30.sig"] {
        let result = verifier.verify_at(token, NOW).await;
        assert!(
            matches!(result, Err(VerifyError::MalformedToken(_))),
            "token {:?} should be malformed, got {:?}",
            token,
            result
        );
    }
}

#[tokio::test]
async fn test_empty_expected_client_id_accepts_any_audience() -> Result<()> {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;
    let verifier = verifier_for(&server, Some(""));

    let token = TestTokenBuilder::new()
        .issued_at(ISSUED_AT)
        .expires_at(EXPIRES_AT)
        .for_client("whatever-client")
        .sign(&TestKeyPair::primary());

    let verified = verifier.verify_at(&token, NOW).await?;
    assert_eq!(verified.client_id.as_deref(), Some("whatever-client"));
    Ok(())
}

#[tokio::test]
async fn test_id_token_with_array_audience() -> Result<()> {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;

    let token = TestTokenBuilder::new()
        .issued_at(ISSUED_AT)
        .expires_at(EXPIRES_AT)
        .with_claim("token_use", serde_json::json!("id"))
        .with_claim("aud", serde_json::json!(["other-client", CLIENT_ID]))
        .sign(&TestKeyPair::primary());

    let verified = verifier_for(&server, Some(CLIENT_ID))
        .verify_at(&token, NOW)
        .await?;
    assert_eq!(verified.token_use.as_deref(), Some("id"));
    assert!(verified.is_issued_to(CLIENT_ID));

    let result = verifier_for(&server, Some("third-client"))
        .verify_at(&token, NOW)
        .await;
    assert_eq!(
        result.unwrap_err(),
        VerifyError::AudienceMismatch {
            expected: "third-client".to_string(),
            actual: "other-client".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_verifies_against_rotated_key_set() -> Result<()> {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(
            POOL_ID,
            &[TestKeyPair::primary(), TestKeyPair::secondary()],
            Some(1),
        )
        .await;
    let verifier = verifier_for(&server, None);

    for keypair in [TestKeyPair::primary(), TestKeyPair::secondary()] {
        let token = TestTokenBuilder::new()
            .issued_at(ISSUED_AT)
            .expires_at(EXPIRES_AT)
            .sign(&keypair);
        verifier.verify_at(&token, NOW).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_incomplete_keys_in_document_are_skipped() -> Result<()> {
    let server = TestJwksServer::start().await;
    let primary = TestKeyPair::primary().jwk_json();
    let body = serde_json::json!({
        "keys": [
            { "kid": "half-a-key", "kty": "RSA", "alg": "RS256" },
            primary,
        ]
    });
    server.serve_raw(POOL_ID, &body.to_string()).await;
    let verifier = verifier_for(&server, None);

    verifier.verify_at(&valid_token(), NOW).await?;

    let key_set = verifier
        .key_store()
        .get(&Authority::new(REGION, POOL_ID))
        .await?;
    assert_eq!(key_set.len(), 1);
    assert!(key_set.get("half-a-key").is_none());
    Ok(())
}

#[tokio::test]
async fn test_unparseable_key_document_is_key_fetch_error() {
    let server = TestJwksServer::start().await;
    server.serve_raw(POOL_ID, "<html>maintenance</html>").await;
    let verifier = verifier_for(&server, None);

    let result = verifier.verify_at(&valid_token(), NOW).await;

    assert!(matches!(result, Err(VerifyError::KeyFetch(_))));
    assert!(result.unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_concurrent_verifications_share_one_key_set() -> Result<()> {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;
    let verifier = verifier_for(&server, Some(CLIENT_ID));
    let token = valid_token();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let verifier = verifier.clone();
            let token = token.clone();
            tokio::spawn(async move { verifier.verify_at(&token, NOW).await })
        })
        .collect();

    for handle in handles {
        let verified = handle.await??;
        assert_eq!(verified.client_id.as_deref(), Some(CLIENT_ID));
    }

    // Racing misses may each fetch, but never more than once per caller.
    let fetches = server.fetch_count(POOL_ID).await;
    assert!((1..=16).contains(&fetches), "unexpected fetch count {fetches}");

    // Everything after the race is served from the cache.
    verifier.verify_at(&token, NOW).await?;
    assert_eq!(server.fetch_count(POOL_ID).await, fetches);
    Ok(())
}

#[tokio::test]
async fn test_cancellation_during_fetch() {
    let server = TestJwksServer::start().await;
    server
        .serve_keys_delayed(POOL_ID, &[TestKeyPair::primary()], Duration::from_secs(3))
        .await;
    let verifier = verifier_for(&server, None);
    let cancel = tokio_util::sync::CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let token = TestTokenBuilder::new().sign(&TestKeyPair::primary());
    let result = verifier.verify_cancellable(&token, &cancel).await;

    assert_eq!(result.unwrap_err(), VerifyError::Cancelled);
    assert!(
        !verifier
            .key_store()
            .is_cached(&Authority::new(REGION, POOL_ID))
            .await
    );
}

#[tokio::test]
async fn test_verify_uses_current_time() -> Result<()> {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
        .await;
    let verifier = verifier_for(&server, Some(CLIENT_ID));

    let fresh = TestTokenBuilder::new()
        .for_client(CLIENT_ID)
        .expires_in(300)
        .sign(&TestKeyPair::primary());
    verifier.verify(&fresh).await?;

    let stale = TestTokenBuilder::new()
        .for_client(CLIENT_ID)
        .expires_in(-300)
        .sign(&TestKeyPair::primary());
    assert!(matches!(
        verifier.verify(&stale).await,
        Err(VerifyError::ExpiredToken { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_verifier_from_config() -> Result<()> {
    let server = TestJwksServer::start().await;
    server
        .serve_keys(POOL_ID, &[TestKeyPair::primary()], Some(1))
        .await;

    let vars = HashMap::from([
        ("COGNITO_REGION".to_string(), REGION.to_string()),
        ("USERPOOL_ID".to_string(), POOL_ID.to_string()),
        ("COGNITO_CLIENT_ID".to_string(), CLIENT_ID.to_string()),
        ("COGNITO_JWKS_BASE_URL".to_string(), server.base_url()),
        ("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "5".to_string()),
    ]);
    let config = Config::from_vars(&vars)?;
    let verifier = config.verifier(Arc::new(config.key_store()));

    let verified = verifier.verify_at(&valid_token(), NOW).await?;
    assert_eq!(verified.scopes(), vec!["aws.cognito.signin.user.admin"]);
    Ok(())
}

// ============================================================================
// Metrics
// ============================================================================

#[test]
fn test_verification_records_metrics() {
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let server = TestJwksServer::start().await;
            server
                .serve_keys(POOL_ID, &[TestKeyPair::primary()], None)
                .await;
            let verifier = verifier_for(&server, Some(CLIENT_ID));

            verifier.verify_at(&valid_token(), NOW).await.unwrap();
            let expired = verifier.verify_at(&valid_token(), EXPIRES_AT + 1).await;
            assert!(expired.is_err());
        });
    });

    let snapshot = snapshotter.snapshot().into_vec();
    let counter = |name: &str, label: (&str, &str)| -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| {
                key.key().name() == name
                    && key
                        .key()
                        .labels()
                        .any(|l| l.key() == label.0 && l.value() == label.1)
            })
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => *v,
                _ => 0,
            })
            .sum()
    };

    assert_eq!(
        counter("verifier_token_validations_total", ("status", "success")),
        1
    );
    assert_eq!(
        counter(
            "verifier_token_validations_total",
            ("error_type", "expired_token")
        ),
        1
    );
    assert_eq!(counter("verifier_jwks_fetch_total", ("status", "success")), 1);
    assert_eq!(counter("verifier_jwks_cache_total", ("result", "miss")), 1);
    assert_eq!(counter("verifier_jwks_cache_total", ("result", "hit")), 1);
}
