//! Instrumented connection wrapper.
//!
//! [`TimedConnection`] passes sends, reads, pings and close straight through
//! to the framed stream and stamps the trace at message boundaries. Transport
//! errors are returned as they come; the wrapper only adds timing.
//!
//! Only the first exchange on a connection feeds the round-trip metric. A
//! data message and a ping compete for it: whichever is sent first owns the
//! slot, and only its own reply completes it.
//!
//! Data frames that arrive while a pong is awaited are kept and handed out
//! by the next [`TimedConnection::receive`], so a message sent before a ping
//! still gets its reply and its round trip.
//!
//! One task at a time: overlapping calls on the same connection are not
//! supported and the `&mut self` receivers enforce it.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::dial::WsStream;
use crate::error::{Phase, Result, WsStatError};
use crate::trace::{Event, Exchange, TraceRecorder};

/// Await `fut`, failing with [`WsStatError::Timeout`] once `deadline` passes.
pub(crate) async fn with_deadline<T, F>(deadline: Option<Duration>, phase: Phase, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| WsStatError::Timeout { phase })?,
        None => fut.await,
    }
}

/// An upgraded connection that stamps the shared trace as frames cross it.
pub struct TimedConnection {
    ws: WsStream,
    trace: TraceRecorder,
    /// Data frames read while waiting for a pong, oldest first.
    pending: VecDeque<Message>,
    closed: bool,
}

impl TimedConnection {
    pub(crate) fn new(ws: WsStream, trace: TraceRecorder) -> Self {
        Self { ws, trace, pending: VecDeque::new(), closed: false }
    }

    /// True after a close or a terminal transport error.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send a message. Stamps `first_message_sent` if this is the first
    /// exchange on the connection; returns this send's own instant.
    pub async fn send(&mut self, message: Message) -> Result<Instant> {
        self.ensure_open()?;
        let sent = self.trace.begin_exchange(Exchange::Message);
        match self.ws.send(message).await {
            Ok(()) => Ok(sent),
            Err(e) => Err(self.fail(WsStatError::from_transport(e))),
        }
    }

    /// Block until the next text or binary message arrives.
    ///
    /// Messages queued by [`wait_pong`](Self::wait_pong) come first. Control
    /// frames are consumed along the way; a pong still completes an
    /// outstanding first-exchange ping.
    pub async fn receive(&mut self) -> Result<Message> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        self.ensure_open()?;
        loop {
            let message = self.next_frame().await?;
            match message {
                Message::Text(_) | Message::Binary(_) => {
                    self.trace.complete_exchange(Exchange::Message);
                    return Ok(message);
                }
                Message::Pong(_) => {
                    self.trace.complete_exchange(Exchange::Ping);
                }
                Message::Close(frame) => {
                    debug!("[wsstat] peer sent close: {frame:?}");
                    return Err(self.fail(WsStatError::ConnectionClosed));
                }
                _ => trace!("[wsstat] skipping control frame"),
            }
        }
    }

    /// [`receive`](Self::receive) bounded by `deadline`. A timeout leaves the
    /// connection open.
    pub async fn receive_timeout(&mut self, deadline: Option<Duration>) -> Result<Message> {
        with_deadline(deadline, Phase::Message, self.receive()).await
    }

    /// Send a ping control frame carrying `payload`.
    pub async fn ping(&mut self, payload: &[u8]) -> Result<Instant> {
        self.ensure_open()?;
        let sent = self.trace.begin_exchange(Exchange::Ping);
        match self.ws.send(Message::Ping(payload.to_vec().into())).await {
            Ok(()) => Ok(sent),
            Err(e) => Err(self.fail(WsStatError::from_transport(e))),
        }
    }

    /// Block until the pong echoing `payload` arrives. Data messages read in
    /// the meantime complete a message exchange and are queued for
    /// [`receive`](Self::receive).
    pub async fn wait_pong(&mut self, payload: &[u8]) -> Result<Instant> {
        self.ensure_open()?;
        loop {
            match self.next_frame().await? {
                Message::Pong(data) if data[..] == payload[..] => {
                    let at = Instant::now();
                    self.trace.complete_exchange(Exchange::Ping);
                    return Ok(at);
                }
                message @ (Message::Text(_) | Message::Binary(_)) => {
                    self.trace.complete_exchange(Exchange::Message);
                    trace!("[wsstat] queued {} byte message while awaiting pong", message.len());
                    self.pending.push_back(message);
                }
                Message::Close(frame) => {
                    debug!("[wsstat] peer sent close while awaiting pong: {frame:?}");
                    return Err(self.fail(WsStatError::ConnectionClosed));
                }
                _ => trace!("[wsstat] skipping control frame while awaiting pong"),
            }
        }
    }

    /// Run the close handshake. `close_start` is stamped immediately and
    /// `close_done` once the handshake ends, whether it succeeded or not.
    /// Closing an already closed connection does nothing.
    pub async fn close(&mut self, deadline: Option<Duration>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.trace.mark(Event::CloseStart);
        let outcome = with_deadline(deadline, Phase::Close, close_handshake(&mut self.ws)).await;
        self.trace.mark(Event::CloseDone);
        if let Err(e) = &outcome {
            warn!("[wsstat] close handshake failed: {e}");
        }
        outcome
    }

    async fn next_frame(&mut self) -> Result<Message> {
        match self.ws.next().await {
            Some(Ok(message)) => Ok(message),
            Some(Err(e)) => Err(self.fail(WsStatError::from_transport(e))),
            None => Err(self.fail(WsStatError::ConnectionClosed)),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed { Err(WsStatError::ConnectionClosed) } else { Ok(()) }
    }

    /// Terminal errors end the session: stamp the close events so the result
    /// has a total time, then hand the error back.
    fn fail(&mut self, err: WsStatError) -> WsStatError {
        if err.is_terminal() && !self.closed {
            self.closed = true;
            self.trace.mark(Event::CloseStart);
            self.trace.mark(Event::CloseDone);
        }
        err
    }
}

/// Send our close frame, then read until the peer's close frame ends the stream.
async fn close_handshake(ws: &mut WsStream) -> Result<()> {
    if let Err(e) = ws.close(None).await {
        return match WsStatError::from_transport(e) {
            WsStatError::ConnectionClosed => Ok(()),
            other => Err(other),
        };
    }
    while let Some(frame) = ws.next().await {
        if let Err(e) = frame {
            return match WsStatError::from_transport(e) {
                WsStatError::ConnectionClosed => Ok(()),
                other => Err(other),
            };
        }
    }
    Ok(())
}
