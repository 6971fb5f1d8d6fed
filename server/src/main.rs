mod config;
mod metrics;
mod protocol;
mod routes;
mod services;
mod state;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::services::auth::AuthGate;
use crate::services::ingest::OpenSkyClient;
use crate::services::store::Store;
use crate::state::AppState;

/// How long draining connections may take after the shutdown notice.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let default_filter = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    metrics::init_metrics();

    // Auth first so the WS path can validate immediately.
    let auth = match AuthGate::from_config(config.jwt_secret.as_deref(), &config.jwt_file) {
        Ok(auth) => auth,
        Err(e) => {
            error!(error = %e, "session secret setup failed");
            return ExitCode::FAILURE;
        }
    };

    // A storage failure is not fatal: the server runs with an empty view
    // and store-backed endpoints report it.
    let store = match Store::open(&config.db, config.retention()).await {
        Ok(store) => Some(store),
        Err(e) => {
            error!(error = %e, db = %config.db.display(), "failed to open storage");
            None
        }
    };

    let otel_collector = routes::otel::normalize_collector_endpoint(config.tracing.as_deref());
    let state = AppState::new(store.clone(), auth, otel_collector);

    let upstream = match OpenSkyClient::new(
        config.proxy.as_deref(),
        config.opensky_credentials(),
        config.poll_interval(),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "upstream client setup failed");
            return ExitCode::FAILURE;
        }
    };

    let stop = CancellationToken::new();
    tokio::spawn(services::ingest::run_ingest_loop(
        Arc::clone(&upstream),
        store.clone(),
        state.updates.clone(),
        stop.clone(),
    ));
    if let Some(store) = store.clone() {
        services::store::spawn_sweeper(store, stop.clone());
    }

    let addr = config.listen_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %addr, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %addr, "server listening");

    let drain = CancellationToken::new();
    let mut server = tokio::spawn({
        let app = routes::app(state.clone());
        let drain = drain.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain.cancelled().await })
                .await
        }
    });

    let exit = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received, shutting down");
            ExitCode::SUCCESS
        }
        result = &mut server => {
            match result {
                Ok(Ok(())) => ExitCode::SUCCESS,
                Ok(Err(e)) => {
                    error!(error = %e, "server failed");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!(error = %e, "server task panicked");
                    ExitCode::FAILURE
                }
            }
        }
    };

    // Notify live WS sessions, stop background work, then drain with a
    // bounded grace period and close storage last.
    let _ = state.shutdown.send(());
    stop.cancel();
    drain.cancel();
    if !server.is_finished()
        && tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err()
    {
        warn!("grace period expired before all connections drained");
        server.abort();
    }
    if let Some(store) = &store {
        store.close().await;
    }
    info!("shutdown complete");
    exit
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("signal handler installation");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
