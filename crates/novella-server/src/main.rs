//! # novella-server
//!
//! Reference backend for the Novella sync layer: the remote store that
//! `novella-sync` talks to over HTTP.
//!
//! This binary provides:
//! - **REST API** (axum) for stories and user profiles, including the
//!   id-preserving import route used by the migration runner
//! - **JSON snapshot persistence** rewritten after every mutation
//! - **Optional write token** guarding every mutating route

mod api;
mod backend;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::backend::Backend;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,novella_server=debug")),
        )
        .init();

    info!("Starting Novella server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        data_path = %config.data_path.display(),
        write_protected = config.write_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Load the record store
    // -----------------------------------------------------------------------
    let backend = Arc::new(Backend::open(config.data_path.clone()).await?);

    let http_addr = config.http_addr;
    let app_state = AppState {
        backend,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
