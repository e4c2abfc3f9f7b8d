//! Timestamp capture hooks.
//!
//! The dial path reports each lifecycle event through the [`ConnectTrace`]
//! trait. [`TraceRecorder`] is the implementation used by the controller: it
//! stamps `Instant::now()` into a mutex-guarded [`Timestamps`] record, at most
//! once per event, so a hook can fire from whichever task observes the event
//! first and later readers still see a consistent record.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio_tungstenite::tungstenite::handshake::client::Response;
use tracing::error;

/// A point in the connection lifecycle, in the order it normally occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    DnsStart,
    DnsDone,
    ConnectStart,
    ConnectDone,
    TlsStart,
    TlsDone,
    HandshakeStart,
    HandshakeDone,
    FirstMessageSent,
    FirstMessageReceived,
    CloseStart,
    CloseDone,
}

impl Event {
    pub const ALL: [Event; 12] = [
        Event::DnsStart,
        Event::DnsDone,
        Event::ConnectStart,
        Event::ConnectDone,
        Event::TlsStart,
        Event::TlsDone,
        Event::HandshakeStart,
        Event::HandshakeDone,
        Event::FirstMessageSent,
        Event::FirstMessageReceived,
        Event::CloseStart,
        Event::CloseDone,
    ];

    /// The event that must already be recorded before this one may be.
    pub fn start_of(self) -> Option<Event> {
        match self {
            Event::DnsDone => Some(Event::DnsStart),
            Event::ConnectDone => Some(Event::ConnectStart),
            Event::TlsDone => Some(Event::TlsStart),
            Event::HandshakeDone => Some(Event::HandshakeStart),
            Event::FirstMessageReceived => Some(Event::FirstMessageSent),
            Event::CloseDone => Some(Event::CloseStart),
            _ => None,
        }
    }
}

/// Raw monotonic instants for one connection attempt. `None` means the event
/// never happened (a skipped phase, or a phase that failed before finishing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    /// Resolution of the host began.
    pub dns_start: Option<Instant>,
    pub dns_done: Option<Instant>,
    /// First TCP connect attempt began.
    pub connect_start: Option<Instant>,
    pub connect_done: Option<Instant>,
    /// ClientHello about to be sent. Absent for `ws://`.
    pub tls_start: Option<Instant>,
    pub tls_done: Option<Instant>,
    /// HTTP upgrade request about to be written.
    pub handshake_start: Option<Instant>,
    pub handshake_done: Option<Instant>,
    /// First message or ping handed to the socket.
    pub first_message_sent: Option<Instant>,
    /// Reply to the first message, or the matching pong.
    pub first_message_received: Option<Instant>,
    pub close_start: Option<Instant>,
    /// Close handshake ended, successfully or not. Final.
    pub close_done: Option<Instant>,
}

impl Timestamps {
    /// Instant recorded for `event`, if any.
    pub fn get(&self, event: Event) -> Option<Instant> {
        *self.slot(event)
    }

    fn slot(&self, event: Event) -> &Option<Instant> {
        match event {
            Event::DnsStart => &self.dns_start,
            Event::DnsDone => &self.dns_done,
            Event::ConnectStart => &self.connect_start,
            Event::ConnectDone => &self.connect_done,
            Event::TlsStart => &self.tls_start,
            Event::TlsDone => &self.tls_done,
            Event::HandshakeStart => &self.handshake_start,
            Event::HandshakeDone => &self.handshake_done,
            Event::FirstMessageSent => &self.first_message_sent,
            Event::FirstMessageReceived => &self.first_message_received,
            Event::CloseStart => &self.close_start,
            Event::CloseDone => &self.close_done,
        }
    }

    fn slot_mut(&mut self, event: Event) -> &mut Option<Instant> {
        match event {
            Event::DnsStart => &mut self.dns_start,
            Event::DnsDone => &mut self.dns_done,
            Event::ConnectStart => &mut self.connect_start,
            Event::ConnectDone => &mut self.connect_done,
            Event::TlsStart => &mut self.tls_start,
            Event::TlsDone => &mut self.tls_done,
            Event::HandshakeStart => &mut self.handshake_start,
            Event::HandshakeDone => &mut self.handshake_done,
            Event::FirstMessageSent => &mut self.first_message_sent,
            Event::FirstMessageReceived => &mut self.first_message_received,
            Event::CloseStart => &mut self.close_start,
            Event::CloseDone => &mut self.close_done,
        }
    }

    /// Record `at` for `event` unless it is already set. Returns the stored
    /// instant, or `None` if the event's start was never recorded.
    pub fn set_once(&mut self, event: Event, at: Instant) -> Option<Instant> {
        if let Some(existing) = self.get(event) {
            return Some(existing);
        }
        if let Some(start) = event.start_of() {
            if self.get(start).is_none() {
                return None;
            }
        }
        *self.slot_mut(event) = Some(at);
        Some(at)
    }

    /// True once `close_done` is set; the record no longer changes after that.
    pub fn is_finalized(&self) -> bool {
        self.close_done.is_some()
    }
}

/// Connection metadata gathered by the hooks alongside the instants.
#[derive(Debug, Clone, Default)]
pub struct ConnInfo {
    pub host: Option<String>,
    /// Every address DNS returned, in the order tried.
    pub resolved: Vec<SocketAddr>,
    /// The address the TCP connection succeeded on.
    pub remote_addr: Option<SocketAddr>,
    pub tls: bool,
    pub status: Option<u16>,
    /// Headers of the upgrade response.
    pub response_headers: Vec<(String, String)>,
}

/// Which exchange path owns the "first message" slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Message,
    Ping,
}

/// Callbacks fired synchronously by the dial path at each lifecycle event.
///
/// Implementations must not block; they run inline with network I/O.
pub trait ConnectTrace: Send + Sync {
    fn dns_start(&self, host: &str);
    fn dns_done(&self, addrs: &[SocketAddr]);
    fn connect_start(&self, addr: SocketAddr);
    fn connect_done(&self, addr: SocketAddr);
    fn tls_handshake_start(&self);
    fn tls_handshake_done(&self);
    fn ws_handshake_start(&self);
    fn ws_handshake_done(&self, response: &Response);
}

#[derive(Debug, Default)]
struct TraceState {
    timestamps: Timestamps,
    info: ConnInfo,
    first_exchange: Option<Exchange>,
}

/// Shared, write-once timing record. Cloning shares the same record.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    inner: Arc<Mutex<TraceState>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TraceState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stamp `event` with the current instant if it has not been stamped yet.
    ///
    /// Returns the instant on record for `event`. Marking a "done" event whose
    /// "start" is missing is a caller bug: it is logged, nothing is stored and
    /// `None` comes back.
    pub fn mark(&self, event: Event) -> Option<Instant> {
        let mut state = self.lock();
        let stored = state.timestamps.set_once(event, Instant::now());
        if stored.is_none() {
            error!("[wsstat] {event:?} recorded before {:?}", event.start_of());
        }
        stored
    }

    /// Stamp `first_message_sent` if no exchange has claimed the slot yet.
    ///
    /// Returns the send instant of this exchange (the current instant when
    /// the slot was already owned).
    pub fn begin_exchange(&self, kind: Exchange) -> Instant {
        let mut state = self.lock();
        let now = Instant::now();
        if state.first_exchange.is_none() {
            state.first_exchange = Some(kind);
            state.timestamps.first_message_sent = Some(now);
        }
        now
    }

    /// Stamp `first_message_received` if `kind` owns the first-message slot
    /// and it has not been completed yet.
    pub fn complete_exchange(&self, kind: Exchange) -> Option<Instant> {
        let mut state = self.lock();
        if state.first_exchange != Some(kind) {
            return None;
        }
        state.timestamps.set_once(Event::FirstMessageReceived, Instant::now())
    }

    pub fn timestamps(&self) -> Timestamps {
        self.lock().timestamps
    }

    pub fn info(&self) -> ConnInfo {
        self.lock().info.clone()
    }

    /// Timestamps and metadata read under one lock.
    pub fn snapshot(&self) -> (Timestamps, ConnInfo) {
        let state = self.lock();
        (state.timestamps, state.info.clone())
    }
}

impl ConnectTrace for TraceRecorder {
    fn dns_start(&self, host: &str) {
        self.mark(Event::DnsStart);
        self.lock().info.host = Some(host.to_string());
    }

    fn dns_done(&self, addrs: &[SocketAddr]) {
        self.mark(Event::DnsDone);
        self.lock().info.resolved = addrs.to_vec();
    }

    fn connect_start(&self, _addr: SocketAddr) {
        self.mark(Event::ConnectStart);
    }

    fn connect_done(&self, addr: SocketAddr) {
        self.mark(Event::ConnectDone);
        self.lock().info.remote_addr = Some(addr);
    }

    fn tls_handshake_start(&self) {
        self.mark(Event::TlsStart);
        self.lock().info.tls = true;
    }

    fn tls_handshake_done(&self) {
        self.mark(Event::TlsDone);
    }

    fn ws_handshake_start(&self) {
        self.mark(Event::HandshakeStart);
    }

    fn ws_handshake_done(&self, response: &Response) {
        self.mark(Event::HandshakeDone);
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let mut state = self.lock();
        state.info.status = Some(response.status().as_u16());
        state.info.response_headers = headers;
    }
}
