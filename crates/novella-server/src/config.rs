//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use novella_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3001`
    pub http_addr: SocketAddr,

    /// JSON snapshot holding every story and profile.
    /// Env: `DATA_PATH`
    /// Default: `./data/novella.json`
    pub data_path: PathBuf,

    /// Bearer token required on mutating routes.
    /// Env: `WRITE_TOKEN`
    /// Default: empty (writes are open).
    pub write_token: Option<String>,

    /// Human-readable name reported by `/info`.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            data_path: PathBuf::from("./data/novella.json"),
            write_token: None,
            instance_name: format!("{APP_NAME} Node"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATA_PATH") {
            config.data_path = PathBuf::from(path);
        }

        if let Ok(token) = std::env::var("WRITE_TOKEN") {
            if !token.is_empty() {
                config.write_token = Some(token);
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3001).into());
        assert!(config.write_token.is_none());
        assert_eq!(config.instance_name, "Novella Node");
    }
}
