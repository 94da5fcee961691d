//! Metrics definitions for the token verifier.
//!
//! All metrics follow Prometheus naming conventions:
//! - `verifier_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `status`: `success` or `error`
//! - `error_type`: one value per [`VerifyError`](crate::errors::VerifyError) variant
//! - `result`: `hit` or `miss`

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a completed token verification.
///
/// Metric: `verifier_token_validations_total`, `verifier_token_validation_duration_seconds`
/// Labels: `status`, `error_type`
pub fn record_token_validation(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("verifier_token_validation_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("verifier_token_validations_total",
        "status" => status.to_string(),
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record a key document fetch.
///
/// Metric: `verifier_jwks_fetch_total`, `verifier_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &str, duration: Duration) {
    histogram!("verifier_jwks_fetch_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("verifier_jwks_fetch_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a key set cache lookup.
///
/// Metric: `verifier_jwks_cache_total`
/// Labels: `result`
pub fn record_jwks_cache(result: &str) {
    counter!("verifier_jwks_cache_total",
        "result" => result.to_string()
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    type Snapshot = [(
        metrics_util::CompositeKey,
        Option<metrics::Unit>,
        Option<metrics::SharedString>,
        DebugValue,
    )];

    fn counter_value(snapshot: &Snapshot, name: &str) -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => *v,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_record_token_validation() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_token_validation("success", None, Duration::from_millis(2));
            record_token_validation("error", Some("expired_token"), Duration::from_millis(1));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&snapshot, "verifier_token_validations_total"),
            2
        );
    }

    #[test]
    fn test_record_jwks_metrics() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_jwks_fetch("success", Duration::from_millis(40));
            record_jwks_cache("miss");
            record_jwks_cache("hit");
            record_jwks_cache("hit");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(counter_value(&snapshot, "verifier_jwks_fetch_total"), 1);
        assert_eq!(counter_value(&snapshot, "verifier_jwks_cache_total"), 3);
    }
}
