//! Measurement settings.
//!
//! Everything has a default, so an empty JSON object is a valid config.
//!
//! # Example config
//!
//! ```json
//! {
//!   "dial_timeout_ms": 5000,
//!   "read_timeout_ms": 3000,
//!   "close_timeout_ms": 1000,
//!   "accept_invalid_certs": true,
//!   "headers": { "Authorization": "Bearer abc" }
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadlines, TLS policy and default handshake headers for one measurement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WsStatConfig {
    /// Deadline for DNS + TCP + TLS + upgrade, in milliseconds. `0` disables it.
    pub dial_timeout_ms: u64,

    /// Deadline for each blocking read, in milliseconds. `0` disables it.
    pub read_timeout_ms: u64,

    /// Deadline for the close handshake, in milliseconds. `0` disables it.
    pub close_timeout_ms: u64,

    /// Skip certificate and hostname validation (self-signed endpoints).
    pub accept_invalid_certs: bool,

    /// Extra HTTP headers sent with every upgrade request. Per-call headers
    /// override entries with the same name.
    pub headers: HashMap<String, String>,
}

impl Default for WsStatConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 10_000,
            read_timeout_ms: 10_000,
            close_timeout_ms: 5_000,
            accept_invalid_certs: false,
            headers: HashMap::new(),
        }
    }
}

fn deadline(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl WsStatConfig {
    pub fn dial_timeout(&self) -> Option<Duration> {
        deadline(self.dial_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        deadline(self.read_timeout_ms)
    }

    pub fn close_timeout(&self) -> Option<Duration> {
        deadline(self.close_timeout_ms)
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<WsStatConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: WsStatConfig = serde_json::from_str(&content)?;
    Ok(config)
}
