//! # wsstat
//!
//! Measure the latency breakdown of a single WebSocket session.
//!
//! # Usage
//!
//! ```bash
//! wsstat wss://echo.example.com/ -t "Hello, WebSocket!"
//! wsstat ws://localhost:8080/echo -j '{"op":"ping"}' --format json
//! wsstat wss://stream.example.com/ -p -H 'Authorization: Bearer abc'
//! ```

mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use wsstat_core::{HeaderMap, JsonCodec, TextCodec, WsStatConfig, dial::parse_header, measure_ping_with, measure_with};

use crate::report::Report;

const DEFAULT_MESSAGE: &str = "Hello, WebSocket!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// WebSocket connection latency breakdown.
#[derive(Debug, Parser)]
#[command(name = "wsstat", version, about = "WebSocket connection latency breakdown")]
struct Cli {
    /// Endpoint to measure (ws:// or wss://).
    url: String,

    /// Text message to send.
    #[arg(short, long, value_name = "TEXT", conflicts_with_all = ["json", "ping"])]
    text: Option<String>,

    /// JSON document to send; the reply is decoded as JSON.
    #[arg(short, long, value_name = "JSON", conflicts_with = "ping")]
    json: Option<String>,

    /// Send a ping frame instead of a data message.
    #[arg(short, long)]
    ping: bool,

    /// Extra handshake header, `Name: value`. Repeatable.
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Accept invalid TLS certificates and host names.
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Configuration file path (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for line in &self.headers {
            let (name, value) = parse_header(line)?;
            map.append(name, value);
        }
        Ok(map)
    }

    fn load_config(&self) -> Result<WsStatConfig> {
        let mut config = match &self.config {
            Some(path) => wsstat_core::config::load_config(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => WsStatConfig::default(),
        };
        if self.insecure {
            config.accept_invalid_certs = true;
        }
        Ok(config)
    }
}

async fn run(cli: &Cli) -> Result<Report> {
    let config = cli.load_config()?;
    let headers = cli.header_map()?;
    debug!("config: {config:?}");

    let report = if cli.ping {
        match measure_ping_with(config, &cli.url, &headers).await {
            Ok(result) => Report::ok(result, None),
            Err(failure) => Report::failed(failure),
        }
    } else if let Some(raw) = &cli.json {
        let value: serde_json::Value = serde_json::from_str(raw).context("--json is not valid JSON")?;
        match measure_with(config, &cli.url, &JsonCodec, &value, &headers).await {
            Ok(m) => Report::ok(m.result, Some(m.response.to_string())),
            Err(failure) => Report::failed(failure),
        }
    } else {
        let text = cli.text.as_deref().unwrap_or(DEFAULT_MESSAGE);
        match measure_with(config, &cli.url, &TextCodec, text, &headers).await {
            Ok(m) => Report::ok(m.result, Some(String::from_utf8_lossy(&m.response).into_owned())),
            Err(failure) => Report::failed(failure),
        }
    };
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = wsstat_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "wsstat");
    info!("wsstat starting, url={}", cli.url);

    let report = run(&cli).await?;
    match cli.format {
        Format::Text => print!("{report}"),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report.to_json())?),
    }
    report.into_result()
}
