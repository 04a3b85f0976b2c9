// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth credential lifecycle manager: logs tenants in with an external
//! identity provider, provisions their namespaces, stores their tokens in the
//! cluster, and keeps those tokens fresh.

pub mod cluster;
pub mod config;
pub mod credential;
pub mod error;
pub mod kubeconfig;
pub mod oauth;
pub mod provision;
pub mod scheduler;
pub mod state;
pub mod tenant;
pub mod test_support;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RefresherConfig;
use crate::state::{connect_cluster, AppState};
use crate::transport::build_router;

/// How often expired login sessions are dropped.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Run the server and refresh scheduler until SIGTERM or SIGINT.
pub async fn run(config: RefresherConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let cluster = connect_cluster(&config)?;
    let state = Arc::new(AppState::new(config, cluster, shutdown.clone())?);

    let scheduler = Arc::clone(&state.scheduler).spawn(shutdown.clone());
    let purge = Arc::clone(&state.sessions).spawn_purge(SESSION_PURGE_INTERVAL, shutdown.clone());
    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&addr).await?;
    info!("oauth-refresher listening on {addr}");
    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    // The server can also stop on its own; make sure background tasks follow.
    shutdown.cancel();
    if let Err(e) = scheduler.await {
        tracing::warn!(err = %e, "refresh scheduler task failed");
    }
    purge.abort();
    info!("shutdown complete");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
                shutdown.cancel();
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
                shutdown.cancel();
            }
        }
    });
}
