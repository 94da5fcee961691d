//! Token Verifier CLI
//!
//! Verifies one bearer token and prints its claims as JSON on stdout.
//!
//! ```text
//! token-verifier <token>        # or set COGNITO_TOKEN
//! ```
//!
//! Exits 0 on success, 1 when verification fails (the error kind is printed
//! on stderr) and 2 when no token was supplied.

use anyhow::Context;
use common::secret::{bearer_token, ExposeSecret, SecretString};
use std::process::ExitCode;
use std::sync::Arc;
use token_verifier::config::Config;
use token_verifier::observability::init_tracing;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(config.json_logs);

    info!(
        region = %config.region,
        user_pool_id = %config.user_pool_id,
        audience_check = config.client_id.is_some(),
        fetch_timeout = ?config.jwks_fetch_timeout,
        "Starting token verifier"
    );

    if let Some(hosted_ui) = &config.hosted_ui {
        let url = hosted_ui
            .login_url()
            .context("Failed to build hosted UI login URL")?;
        eprintln!("Login URL: {url}");
    }

    let Some(token) = token_from_args_or_env() else {
        eprintln!("usage: token-verifier <token>  (or set COGNITO_TOKEN)");
        return Ok(ExitCode::from(2));
    };

    let verifier = config.verifier(Arc::new(config.key_store()));

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = verifier
        .verify_cancellable(token.expose_secret(), &cancel)
        .await;
    signal_task.abort();

    match result {
        Ok(claims) => {
            let json =
                serde_json::to_string_pretty(&claims).context("Failed to serialize claims")?;
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error_type = e.kind(), error = %e, "Token verification failed");
            eprintln!("{}: {}", e.kind(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// First positional argument, falling back to `COGNITO_TOKEN`.
fn token_from_args_or_env() -> Option<SecretString> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("COGNITO_TOKEN").ok())
        .map(|raw| bearer_token(&raw))
        .filter(|token| !token.expose_secret().is_empty())
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, cancelling verification"),
            Err(e) => {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, cancelling verification");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    cancel.cancel();
}
