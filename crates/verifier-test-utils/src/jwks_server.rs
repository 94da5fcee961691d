//! Mock key document endpoint
//!
//! Wraps a `wiremock::MockServer` that serves JWKS documents at the same path
//! the identity provider uses: `/{user_pool_id}/.well-known/jwks.json`.

use crate::crypto_fixtures::{jwks_document, TestKeyPair};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock key document server for integration tests.
///
/// Expectations set with `expected_fetches` are verified when the server is
/// dropped.
pub struct TestJwksServer {
    server: MockServer,
}

impl TestJwksServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Value for the key store's base URL override.
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    pub fn jwks_path(user_pool_id: &str) -> String {
        format!("/{}/.well-known/jwks.json", user_pool_id)
    }

    /// Serve `keypairs` for `user_pool_id`, optionally asserting the number of
    /// fetches.
    pub async fn serve_keys(
        &self,
        user_pool_id: &str,
        keypairs: &[TestKeyPair],
        expected_fetches: Option<u64>,
    ) {
        let response = ResponseTemplate::new(200).set_body_json(jwks_document(keypairs));
        self.mount(user_pool_id, response, expected_fetches, None)
            .await;
    }

    /// Serve `keypairs` after `delay`.
    pub async fn serve_keys_delayed(
        &self,
        user_pool_id: &str,
        keypairs: &[TestKeyPair],
        delay: Duration,
    ) {
        let response = ResponseTemplate::new(200)
            .set_body_json(jwks_document(keypairs))
            .set_delay(delay);
        self.mount(user_pool_id, response, None, None).await;
    }

    /// Respond with `status` and no body.
    ///
    /// With `times` set, the failure is only served that many times and later
    /// requests fall through to mocks mounted after it.
    pub async fn serve_status(&self, user_pool_id: &str, status: u16, times: Option<u64>) {
        self.mount(user_pool_id, ResponseTemplate::new(status), None, times)
            .await;
    }

    /// Respond with a 200 carrying `body` verbatim.
    pub async fn serve_raw(&self, user_pool_id: &str, body: &str) {
        let response = ResponseTemplate::new(200).set_body_string(body);
        self.mount(user_pool_id, response, None, None).await;
    }

    /// Number of key document requests received for `user_pool_id`.
    pub async fn fetch_count(&self, user_pool_id: &str) -> usize {
        let wanted = Self::jwks_path(user_pool_id);
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == wanted)
                    .count()
            })
            .unwrap_or(0)
    }

    async fn mount(
        &self,
        user_pool_id: &str,
        response: ResponseTemplate,
        expected_fetches: Option<u64>,
        times: Option<u64>,
    ) {
        let mut mock = Mock::given(method("GET"))
            .and(path(Self::jwks_path(user_pool_id)))
            .respond_with(response);
        if let Some(n) = times {
            mock = mock.up_to_n_times(n);
        }
        if let Some(n) = expected_fetches {
            mock = mock.expect(n);
        }
        mock.mount(&self.server).await;
    }
}
