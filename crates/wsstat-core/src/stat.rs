//! Lifecycle controller.
//!
//! A [`WsStat`] drives exactly one connection attempt through
//! `Idle → Dialing → Connected → Closed`, with `Error` absorbing a failed
//! dial. Timing lives in a shared [`TraceRecorder`]; [`WsStat::result`] can be
//! read at any point, including after a failure, to see how far the attempt
//! got and how long each phase took.
//!
//! Nothing here retries or closes on its own: every failure is reported once
//! and the caller decides what happens next.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tracing::{debug, info, warn};

use crate::codec::{Decode, Encode, JsonCodec, MessageCodec, TextCodec};
use crate::config::WsStatConfig;
use crate::conn::TimedConnection;
use crate::dial::{self, Target};
use crate::error::{Phase, Result, WsStatError};
use crate::result::WsResult;
use crate::trace::{Timestamps, TraceRecorder};

/// Where a [`WsStat`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed, not dialed yet.
    Idle,
    /// Resolve, connect, TLS or upgrade in progress.
    Dialing,
    /// Upgrade done; messages can be exchanged.
    Connected,
    /// Closed by the caller or by the peer. The result is final.
    Closed,
    /// The dial failed. Partial timings are kept.
    Error,
}

/// Phase in progress when a dial is interrupted, judged by the last "start"
/// event on record.
fn in_flight(ts: &Timestamps) -> Phase {
    if ts.handshake_start.is_some() {
        Phase::Handshake
    } else if ts.tls_start.is_some() {
        Phase::Tls
    } else if ts.connect_start.is_some() {
        Phase::Connect
    } else {
        Phase::Dns
    }
}

async fn expire(deadline: Option<Duration>) {
    match deadline {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

/// Drives one WebSocket connection attempt and records its timings.
///
/// Create one per measurement: a `WsStat` dials once, and its
/// [`result`](Self::result) describes that attempt only.
pub struct WsStat {
    config: WsStatConfig,
    trace: TraceRecorder,
    state: State,
    conn: Option<TimedConnection>,
    ping_seq: u64,
    pending_ping: Option<Vec<u8>>,
}

impl Default for WsStat {
    fn default() -> Self {
        Self::new()
    }
}

impl WsStat {
    /// Controller with the default [`WsStatConfig`].
    pub fn new() -> Self {
        Self::with_config(WsStatConfig::default())
    }

    pub fn with_config(config: WsStatConfig) -> Self {
        Self { config, trace: TraceRecorder::new(), state: State::Idle, conn: None, ping_seq: 0, pending_ping: None }
    }

    pub fn config(&self) -> &WsStatConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Snapshot of everything recorded so far.
    pub fn result(&self) -> WsResult {
        let (timestamps, info) = self.trace.snapshot();
        WsResult::new(timestamps, info)
    }

    /// Resolve, connect, secure (for `wss://`) and upgrade, bounded by the
    /// configured dial timeout.
    pub async fn dial(&mut self, url: &str, headers: &HeaderMap) -> Result<()> {
        self.dial_cancellable(url, headers, std::future::pending::<()>()).await
    }

    /// Like [`dial`](Self::dial), but gives up with
    /// [`WsStatError::Cancelled`] as soon as `cancel` completes.
    pub async fn dial_cancellable<C>(&mut self, url: &str, headers: &HeaderMap, cancel: C) -> Result<()>
    where
        C: Future<Output = ()>,
    {
        if self.state != State::Idle {
            return Err(WsStatError::InvalidState("a WsStat dials only once"));
        }
        let target = Target::parse(url)?;
        let request = target.request(&self.config.headers, headers)?;

        self.state = State::Dialing;
        info!("[wsstat] dialing {}", target.url);

        let trace = self.trace.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel => Err(WsStatError::Cancelled { phase: in_flight(&trace.timestamps()) }),
            _ = expire(self.config.dial_timeout()) => Err(WsStatError::Timeout { phase: in_flight(&trace.timestamps()) }),
            dialed = dial::dial(&target, request, self.config.accept_invalid_certs, &trace) => dialed,
        };

        match outcome {
            Ok((ws, _response)) => {
                self.conn = Some(TimedConnection::new(ws, trace));
                self.state = State::Connected;
                Ok(())
            }
            Err(e) => {
                warn!("[wsstat] dial {} failed: {e}", target.url);
                self.state = State::Error;
                Err(e)
            }
        }
    }

    fn conn_mut(&mut self) -> Result<&mut TimedConnection> {
        match self.state {
            State::Connected => self.conn.as_mut().ok_or(WsStatError::InvalidState("connected without a connection")),
            State::Closed => Err(WsStatError::ConnectionClosed),
            State::Idle | State::Dialing => Err(WsStatError::InvalidState("not connected")),
            State::Error => Err(WsStatError::InvalidState("dial failed")),
        }
    }

    /// Follow the wrapper into `Closed` after a terminal I/O error.
    fn settle<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if self.conn.as_ref().is_some_and(TimedConnection::is_closed) && self.state == State::Connected {
            debug!("[wsstat] connection terminated: {:?}", outcome.as_ref().err());
            self.state = State::Closed;
        }
        outcome
    }

    /// Send a raw frame. Returns the instant it was handed to the socket.
    pub async fn send_message(&mut self, message: Message) -> Result<Instant> {
        let outcome = self.conn_mut()?.send(message).await;
        self.settle(outcome)
    }

    /// Send `text` as a text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<Instant> {
        self.send_message(TextCodec.encode(text)?).await
    }

    /// Serialize `value` and send it as a text frame.
    pub async fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<Instant> {
        self.send_message(JsonCodec.encode(value)?).await
    }

    /// Next text or binary message, bounded by the configured read timeout.
    pub async fn read_message(&mut self) -> Result<Message> {
        let deadline = self.config.read_timeout();
        self.read_message_timeout(deadline).await
    }

    /// Next text or binary message, bounded by `deadline` (`None` waits forever).
    pub async fn read_message_timeout(&mut self, deadline: Option<Duration>) -> Result<Message> {
        let outcome = self.conn_mut()?.receive_timeout(deadline).await;
        self.settle(outcome)
    }

    /// Read the next message and parse it as JSON.
    pub async fn read_json(&mut self) -> Result<serde_json::Value> {
        let message = self.read_message().await?;
        JsonCodec.decode(message)
    }

    /// Send `value` through `codec`, wait for the reply and decode it.
    pub async fn exchange<C, T>(&mut self, codec: &C, value: &T) -> Result<C::Output>
    where
        C: MessageCodec<T>,
        T: ?Sized,
    {
        self.send_message(codec.encode(value)?).await?;
        let reply = self.read_message().await?;
        codec.decode(reply)
    }

    /// Send one message and return the reply.
    pub async fn one_hit_message(&mut self, message: Message) -> Result<Message> {
        self.send_message(message).await?;
        self.read_message().await
    }

    /// Send one JSON value and return the decoded reply.
    pub async fn one_hit_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<serde_json::Value> {
        self.exchange(&JsonCodec, value).await
    }

    /// Send a ping frame with a fresh payload; its pong is awaited with
    /// [`wait_pong`](Self::wait_pong).
    pub async fn send_ping(&mut self) -> Result<Instant> {
        self.ping_seq += 1;
        let payload = self.ping_seq.to_be_bytes().to_vec();
        let outcome = self.conn_mut()?.ping(&payload).await;
        let outcome = self.settle(outcome);
        if outcome.is_ok() {
            self.pending_ping = Some(payload);
        }
        outcome
    }

    /// Wait for the pong answering the last [`send_ping`](Self::send_ping),
    /// bounded by the configured read timeout.
    pub async fn wait_pong(&mut self) -> Result<Instant> {
        let payload = self.pending_ping.clone().ok_or(WsStatError::InvalidState("no ping outstanding"))?;
        let deadline = self.config.read_timeout();
        let conn = self.conn_mut()?;
        let outcome = crate::conn::with_deadline(deadline, Phase::Message, conn.wait_pong(&payload)).await;
        if outcome.is_ok() {
            self.pending_ping = None;
        }
        self.settle(outcome)
    }

    /// Ping and wait for the pong. Returns this ping's round trip.
    pub async fn ping_pong(&mut self) -> Result<Duration> {
        let sent = self.send_ping().await?;
        let received = self.wait_pong().await?;
        Ok(received.saturating_duration_since(sent))
    }

    /// Close the connection and finalise the result.
    ///
    /// Closing twice is a no-op, and so is closing after a failed dial.
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            State::Connected => {
                let deadline = self.config.close_timeout();
                let outcome = match self.conn.as_mut() {
                    Some(conn) => conn.close(deadline).await,
                    None => Ok(()),
                };
                self.state = State::Closed;
                debug!("[wsstat] closed after {:?}", self.result().total_time());
                outcome
            }
            State::Closed | State::Error => Ok(()),
            State::Idle | State::Dialing => Err(WsStatError::InvalidState("not connected")),
        }
    }
}
