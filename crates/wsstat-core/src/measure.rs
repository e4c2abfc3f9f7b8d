//! One-shot measurements: dial, exchange one message (or ping), close.
//!
//! The connection is closed on every path out, including after a failed
//! exchange; the exchange error is what the caller sees, together with the
//! timings captured up to that point.

use serde::Serialize;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tracing::{debug, warn};

use crate::codec::{JsonCodec, MessageCodec, TextCodec};
use crate::config::WsStatConfig;
use crate::error::{Failure, Result};
use crate::result::WsResult;
use crate::stat::WsStat;

/// Finalised timings plus the decoded reply.
#[derive(Debug, Clone)]
pub struct Measurement<T> {
    /// Timings of the whole session, close included.
    pub result: WsResult,
    /// The decoded reply to the measured message.
    pub response: T,
}

async fn open(config: WsStatConfig, url: &str, headers: &HeaderMap) -> std::result::Result<WsStat, Failure> {
    let mut ws = WsStat::with_config(config);
    match ws.dial(url, headers).await {
        Ok(()) => Ok(ws),
        Err(error) => {
            debug!("[wsstat] one-shot dial failed: {error}");
            Err(Failure { error, result: ws.result() })
        }
    }
}

/// Close `ws`, then report `outcome` with the finalised result.
///
/// After a successful exchange a failed close handshake is only logged: the
/// close events are stamped either way, so the result is complete.
async fn finish<T>(mut ws: WsStat, outcome: Result<T>) -> std::result::Result<Measurement<T>, Failure> {
    let closed = ws.close().await;
    match outcome {
        Ok(response) => {
            if let Err(e) = closed {
                warn!("[wsstat] close after exchange failed: {e}");
            }
            Ok(Measurement { result: ws.result(), response })
        }
        Err(error) => {
            if let Err(e) = closed {
                debug!("[wsstat] close after failed exchange also failed: {e}");
            }
            Err(Failure { error, result: ws.result() })
        }
    }
}

/// Measure one exchange of `value` encoded with `codec`.
pub async fn measure_with<C, T>(
    config: WsStatConfig,
    url: &str,
    codec: &C,
    value: &T,
    headers: &HeaderMap,
) -> std::result::Result<Measurement<C::Output>, Failure>
where
    C: MessageCodec<T>,
    T: ?Sized,
{
    let mut ws = open(config, url, headers).await?;
    let outcome = ws.exchange(codec, value).await;
    finish(ws, outcome).await
}

/// Measure one ping/pong exchange.
pub async fn measure_ping_with(
    config: WsStatConfig,
    url: &str,
    headers: &HeaderMap,
) -> std::result::Result<WsResult, Failure> {
    let mut ws = open(config, url, headers).await?;
    let outcome = ws.ping_pong().await.map(|_| ());
    finish(ws, outcome).await.map(|m| m.result)
}

/// Send `msg` as a text frame and return the reply's raw bytes.
pub async fn measure_latency(
    url: &str,
    msg: &str,
    headers: &HeaderMap,
) -> std::result::Result<Measurement<Vec<u8>>, Failure> {
    measure_with(WsStatConfig::default(), url, &TextCodec, msg, headers).await
}

/// Send `value` as JSON and return the reply decoded as a generic JSON value.
pub async fn measure_latency_json<T: Serialize + ?Sized>(
    url: &str,
    value: &T,
    headers: &HeaderMap,
) -> std::result::Result<Measurement<serde_json::Value>, Failure> {
    measure_with(WsStatConfig::default(), url, &JsonCodec, value, headers).await
}

/// Ping, wait for the pong, close.
pub async fn measure_latency_ping(url: &str, headers: &HeaderMap) -> std::result::Result<WsResult, Failure> {
    measure_ping_with(WsStatConfig::default(), url, headers).await
}
