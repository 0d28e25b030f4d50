//! Client-side sync configuration loaded from environment variables.
//!
//! Every setting has a default so an app can construct the orchestrator with
//! zero configuration against a local development backend.

use std::path::PathBuf;
use std::time::Duration;

use novella_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_LIST_LIMIT};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote REST API, without trailing slash.
    /// Env: `REMOTE_URL`
    /// Default: `http://localhost:3001/api`
    pub remote_url: String,

    /// Bearer token attached to every remote request.
    /// Env: `REMOTE_TOKEN`
    /// Default: none.
    pub remote_token: Option<String>,

    /// SQLite file backing the local cache. `None` uses the platform data dir.
    /// Env: `CACHE_DB_PATH`
    pub cache_db_path: Option<PathBuf>,

    /// Env: `REQUEST_TIMEOUT_SECS`
    /// Default: 10 seconds.
    pub request_timeout: Duration,

    /// How often the background probe pings `/health`. `None` disables the
    /// probe and the remote is assumed reachable.
    /// Env: `HEALTH_PROBE_SECS` (`0` disables)
    /// Default: 15 seconds.
    pub health_probe_interval: Option<Duration>,

    /// Run the legacy migration and push pending records on the first
    /// reachable read of a session.
    /// Env: `SYNC_ON_START` (true/false)
    /// Default: `true`
    pub sync_on_start: bool,

    /// Limit applied to `popular` and `recent` when the caller passes none.
    /// Env: `DEFAULT_LIST_LIMIT`
    /// Default: 10.
    pub default_list_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: format!("http://localhost:{DEFAULT_HTTP_PORT}/api"),
            remote_token: None,
            cache_db_path: None,
            request_timeout: Duration::from_secs(10),
            health_probe_interval: Some(Duration::from_secs(15)),
            sync_on_start: true,
            default_list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults for
    /// missing or malformed values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("REMOTE_URL") {
            config.remote_url = url.trim_end_matches('/').to_string();
        }

        if let Some(token) = lookup("REMOTE_TOKEN") {
            if !token.is_empty() {
                config.remote_token = Some(token);
            }
        }

        if let Some(path) = lookup("CACHE_DB_PATH") {
            config.cache_db_path = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("REQUEST_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid REQUEST_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(val) = lookup("HEALTH_PROBE_SECS") {
            match val.parse::<u64>() {
                Ok(0) => config.health_probe_interval = None,
                Ok(secs) => config.health_probe_interval = Some(Duration::from_secs(secs)),
                Err(_) => tracing::warn!(value = %val, "Invalid HEALTH_PROBE_SECS, using default"),
            }
        }

        if let Some(val) = lookup("SYNC_ON_START") {
            config.sync_on_start = val != "false" && val != "0";
        }

        if let Some(val) = lookup("DEFAULT_LIST_LIMIT") {
            if let Ok(n) = val.parse::<usize>() {
                config.default_list_limit = n;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[]));
        assert_eq!(config.remote_url, "http://localhost:3001/api");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.health_probe_interval, Some(Duration::from_secs(15)));
        assert!(config.sync_on_start);
        assert_eq!(config.default_list_limit, 10);
        assert!(config.remote_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("REMOTE_URL", "https://novella.example/api/"),
            ("REMOTE_TOKEN", "s3cret"),
            ("CACHE_DB_PATH", "/tmp/cache.db"),
            ("HEALTH_PROBE_SECS", "0"),
            ("SYNC_ON_START", "false"),
            ("DEFAULT_LIST_LIMIT", "25"),
        ]));
        assert_eq!(config.remote_url, "https://novella.example/api");
        assert_eq!(config.remote_token.as_deref(), Some("s3cret"));
        assert_eq!(config.cache_db_path, Some(PathBuf::from("/tmp/cache.db")));
        assert_eq!(config.health_probe_interval, None);
        assert!(!config.sync_on_start);
        assert_eq!(config.default_list_limit, 25);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("REQUEST_TIMEOUT_SECS", "soon"),
            ("DEFAULT_LIST_LIMIT", "-3"),
        ]));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.default_list_limit, 10);
    }
}
