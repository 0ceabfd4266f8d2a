//! Relay configuration.
//!
//! Values come from an optional TOML file; front ends layer command-line
//! flags and environment variables on top.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const SIMULATION_PATH: &str = "ws/simulation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base websocket URL of the simulation server.
    pub server_url: String,
    /// Base HTTP URL of the scenario/agent lookup service.
    pub lookup_url: String,
    /// Auth token passed as the `token` query parameter.
    pub token: String,
    /// Render loop redraw cadence.
    pub poll_interval_ms: u64,
    /// How long `stop()` waits for the background context to close.
    pub shutdown_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8800".to_string(),
            lookup_url: "http://localhost:8800".to_string(),
            token: "demo-token".to_string(),
            poll_interval_ms: 100,
            shutdown_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl RelayConfig {
    /// Load from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Load `path` if given, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// The simulation endpoint, e.g. `ws://host/ws/simulation?token=...`.
    pub fn endpoint_url(&self) -> Result<String, ConfigError> {
        let base = self.server_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{SIMULATION_PATH}"))
            .map_err(|e| ConfigError::InvalidUrl(self.server_url.clone(), e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUrl(
                self.server_url.clone(),
                format!("unsupported scheme {}", url.scheme()),
            ));
        }
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url.into())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Error loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid url {0}: {1}")]
    InvalidUrl(String, String),
}
