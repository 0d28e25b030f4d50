//! # novella-sync
//!
//! Offline-tolerant synchronization between the on-device cache
//! ([`novella_store::LocalCache`]) and the authoritative remote store.
//!
//! - [`SyncOrchestrator`] is the only entry point the app uses. Every write
//!   succeeds even when the remote is down: the result is cached with
//!   `pendingSync = true` and pushed later by
//!   [`SyncOrchestrator::sync_pending`].
//! - [`remote::RemoteStore`] abstracts the backend; [`remote::HttpRemote`]
//!   speaks to `novella-server`.
//! - [`connectivity`] decides whether the remote is worth trying.
//! - [`migration::MigrationRunner`] imports records written by older,
//!   local-only builds.

pub mod config;
pub mod connectivity;
pub mod identity;
pub mod migration;
pub mod orchestrator;
pub mod remote;

mod error;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use orchestrator::{SessionReport, SyncOrchestrator, SyncReport};

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `tracing` subscriber for apps embedding the sync layer.
///
/// Respects `RUST_LOG`. Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("novella_sync=debug,novella_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}
