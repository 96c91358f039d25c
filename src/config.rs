//! Runtime configuration.

use crate::http::fields::DEFAULT_PORT;
use crate::http::request::DEFAULT_MAX_HEAD_BYTES;
use serde::Deserialize;

/// Server configuration, with defaults suitable for embedding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host/interface to bind.
    pub host: String,
    /// TCP port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    /// Graceful-shutdown drain bound, in seconds.
    pub grace_period_secs: u64,
    /// Upper bound on a request head before answering 431.
    pub max_head_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            grace_period_secs: 30,
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `HEARTH_HOST`, `HEARTH_PORT` and
    /// `HEARTH_GRACE_SECS` environment variables.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("HEARTH_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("HEARTH_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(grace) = std::env::var("HEARTH_GRACE_SECS") {
            if let Ok(grace) = grace.parse() {
                config.grace_period_secs = grace;
            }
        }
        config
    }

    /// Parses a YAML document; absent keys fall back to defaults.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
