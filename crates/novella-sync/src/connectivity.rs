//! Reachability of the remote store.
//!
//! The orchestrator consults a [`ConnectivityOracle`] before every operation
//! to decide whether to try the remote tier at all. A failed remote call
//! still falls back to the cache, so a stale "reachable" answer costs one
//! timeout, never data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

pub trait ConnectivityOracle: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// A reachability flag flipped by the host (or by a [`HealthProbe`]).
#[derive(Debug)]
pub struct ManualConnectivity {
    reachable: AtomicBool,
}

impl ManualConnectivity {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    /// Returns the previous value.
    pub fn set_reachable(&self, reachable: bool) -> bool {
        self.reachable.swap(reachable, Ordering::SeqCst)
    }
}

impl ConnectivityOracle for ManualConnectivity {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Periodically pings `<remote>/health` and records the outcome.
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
    state: Arc<ManualConnectivity>,
}

impl HealthProbe {
    pub fn new(
        remote_url: &str,
        timeout: Duration,
        state: Arc<ManualConnectivity>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/health", remote_url.trim_end_matches('/')),
            state,
        })
    }

    /// Ping once and update the shared flag. Returns the new reachability.
    pub async fn check_once(&self) -> bool {
        let reachable = match self.client.get(&self.url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, url = %self.url, "Health probe failed");
                false
            }
        };

        let was = self.state.set_reachable(reachable);
        if was != reachable {
            info!(reachable, "Remote reachability changed");
        }
        reachable
    }

    /// Run the probe on a tokio interval until the handle is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.check_once().await;
            }
        })
    }
}
