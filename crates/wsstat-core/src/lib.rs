//! # wsstat-core
//!
//! Latency breakdown for a single WebSocket session: DNS lookup, TCP connect,
//! TLS handshake, WebSocket upgrade, first message round trip and total
//! session time.
//!
//! - **Trace hooks** (`trace`): write-once timestamp record fed by the dial path
//! - **Dial** (`dial`): DNS → TCP → TLS → upgrade, one hook per phase boundary
//! - **Connection** (`conn`): wrapper that times message exchanges and close
//! - **Controller** (`stat`): `WsStat`, the per-attempt lifecycle state machine
//! - **Result** (`result`): derived durations and cumulative offsets
//! - **Codecs** (`codec`): text, binary and JSON payload encodings
//! - **One-shot** (`measure`): connect, exchange once, close
//! - **Configuration** (`config`), **errors** (`error`), **logging** (`logging`)
//!
//! ```no_run
//! # async fn run() -> Result<(), wsstat_core::Failure> {
//! use wsstat_core::{HeaderMap, measure_latency};
//!
//! let m = measure_latency("wss://echo.example.com/", "Hello, world!", &HeaderMap::new()).await?;
//! println!("{}", m.result);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod conn;
pub mod dial;
pub mod error;
pub mod logging;
pub mod measure;
pub mod result;
pub mod stat;
pub mod trace;

pub use codec::{BinaryCodec, Decode, Encode, JsonCodec, MessageCodec, TextCodec};
pub use config::WsStatConfig;
pub use error::{Failure, Phase, WsStatError};
pub use measure::{
    Measurement, measure_latency, measure_latency_json, measure_latency_ping, measure_ping_with, measure_with,
};
pub use result::{Summary, WsResult};
pub use stat::{State, WsStat};
pub use trace::{Event, Timestamps};
pub use tokio_tungstenite::tungstenite::Message;
pub use tokio_tungstenite::tungstenite::http::HeaderMap;
