/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! HTTP server for delegated document signing.
//!
//! Exposes the delegation workflow and signature records of the
//! `countersign` library over a small JSON API. See [`routes`] for the
//! endpoint table and [`config`] for the configuration file format.

pub mod config;
pub mod documents;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ConfigLoader, ServerConfig};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

use anyhow::Context;
use countersign::workflow::spawn_expiry_sweeper;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Runs the server until Ctrl-C or SIGTERM.
pub async fn serve(config: ServerConfig, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let state = AppState::from_config(&config, shutdown.clone()).await?;

    let sweeper = config.signing_config().expiry_sweep_interval().map(|interval| {
        spawn_expiry_sweeper(state.service.engine().clone(), interval, shutdown.clone())
    });

    let addr = bind.unwrap_or(config.http.bind);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "countersign-server listening");

    let app = router(state, config.http.max_body_bytes);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            tracing::warn!("Expiry sweeper did not stop cleanly: {}", e);
        }
    }
    tracing::info!("countersign-server stopped");

    result.context("serving HTTP")
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
        () = shutdown.cancelled() => {}
    }
    tracing::info!("Shutdown requested; cancelling in-flight signing");
    shutdown.cancel();
}
