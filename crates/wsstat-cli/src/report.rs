//! Rendering of a finished (or failed) measurement.

use std::fmt;

use serde_json::json;
use wsstat_core::{Failure, WsResult, WsStatError};

pub struct Report {
    result: WsResult,
    response: Option<String>,
    error: Option<WsStatError>,
}

impl Report {
    pub fn ok(result: WsResult, response: Option<String>) -> Self {
        Self { result, response, error: None }
    }

    pub fn failed(failure: Failure) -> Self {
        Self { result: failure.result, response: None, error: Some(failure.error) }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "response": self.response,
            "error": self.error.as_ref().map(|e| e.to_string()),
            "timings": self.result.summary(),
        })
    }

    /// Non-zero exit for failed measurements, after the partial breakdown was printed.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.error {
            Some(e) => Err(anyhow::Error::new(e).context("measurement failed")),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(addr) = self.result.remote_addr() {
            writeln!(f, "Connected to {addr}{}", if self.result.is_tls() { " (TLS)" } else { "" })?;
        }
        if let Some(response) = &self.response {
            writeln!(f, "Response: {response}")?;
        }
        if let Some(e) = &self.error {
            writeln!(f, "Error: {e}")?;
        }
        writeln!(f)?;
        write!(f, "{}", self.result)
    }
}
