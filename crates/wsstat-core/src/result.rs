//! Derived durations over a captured [`Timestamps`] record.
//!
//! `WsResult` is a read-only snapshot. Per-phase accessors return the phase
//! length; the `*_done` accessors return the cumulative offset from
//! `dns_start`, suitable for drawing a waterfall. Phases that never happened
//! (TLS on `ws://`, anything after a failed dial) read as `Duration::ZERO`;
//! the `Option` forms ([`WsResult::phase`], [`WsResult::offset`]) keep
//! "did not occur" distinguishable from "took no time".

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;

use crate::trace::{ConnInfo, Event, Timestamps};

#[derive(Debug, Clone, Default)]
pub struct WsResult {
    timestamps: Timestamps,
    info: ConnInfo,
}

impl WsResult {
    pub fn new(timestamps: Timestamps, info: ConnInfo) -> Self {
        Self { timestamps, info }
    }

    /// Raw instants behind every accessor.
    pub fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    /// Resolved addresses, peer and upgrade response details.
    pub fn info(&self) -> &ConnInfo {
        &self.info
    }

    /// True when a TLS handshake was started (`wss://`).
    pub fn is_tls(&self) -> bool {
        self.info.tls
    }

    /// Address the TCP connection was made to.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.info.remote_addr
    }

    /// True once the connection has been closed and the record is final.
    pub fn is_finalized(&self) -> bool {
        self.timestamps.is_finalized()
    }

    /// Elapsed time between two recorded events.
    pub fn phase(&self, start: Event, done: Event) -> Option<Duration> {
        let start = self.timestamps.get(start)?;
        let done = self.timestamps.get(done)?;
        Some(done.saturating_duration_since(start))
    }

    /// Offset of `event` from the start of the session (`dns_start`).
    pub fn offset(&self, event: Event) -> Option<Duration> {
        self.phase(Event::DnsStart, event)
    }

    /// Time spent resolving the host.
    pub fn dns_lookup(&self) -> Duration {
        self.phase(Event::DnsStart, Event::DnsDone).unwrap_or_default()
    }

    /// TCP connect only; the TLS handshake is measured separately.
    pub fn tcp_connection(&self) -> Duration {
        self.phase(Event::ConnectStart, Event::ConnectDone).unwrap_or_default()
    }

    /// Zero for `ws://` endpoints.
    pub fn tls_handshake(&self) -> Duration {
        self.phase(Event::TlsStart, Event::TlsDone).unwrap_or_default()
    }

    /// HTTP upgrade request to `101 Switching Protocols`.
    pub fn ws_handshake(&self) -> Duration {
        self.phase(Event::HandshakeStart, Event::HandshakeDone).unwrap_or_default()
    }

    /// First message (or ping) sent to its reply (or pong) received.
    pub fn message_round_trip(&self) -> Duration {
        self.phase(Event::FirstMessageSent, Event::FirstMessageReceived).unwrap_or_default()
    }

    /// Length of the close handshake.
    pub fn close(&self) -> Duration {
        self.phase(Event::CloseStart, Event::CloseDone).unwrap_or_default()
    }

    /// Offset of the end of DNS resolution.
    pub fn dns_lookup_done(&self) -> Duration {
        self.offset(Event::DnsDone).unwrap_or_default()
    }

    /// Offset at which the TCP connection was established.
    pub fn tcp_connected(&self) -> Duration {
        self.offset(Event::ConnectDone).unwrap_or_default()
    }

    /// Offset at which TLS was established; zero for `ws://`.
    pub fn tls_handshake_done(&self) -> Duration {
        self.offset(Event::TlsDone).unwrap_or_default()
    }

    /// Offset at which the connection was upgraded.
    pub fn ws_handshake_done(&self) -> Duration {
        self.offset(Event::HandshakeDone).unwrap_or_default()
    }

    /// Offset at which the first reply arrived.
    pub fn first_message_response(&self) -> Duration {
        self.offset(Event::FirstMessageReceived).unwrap_or_default()
    }

    /// Whole session, from the start of DNS resolution to the end of close.
    pub fn total_time(&self) -> Duration {
        self.offset(Event::CloseDone).unwrap_or_default()
    }

    /// Millisecond view for serialization. Absent phases are `None`.
    pub fn summary(&self) -> Summary {
        let ms = |d: Option<Duration>| d.map(as_millis_f64);
        Summary {
            host: self.info.host.clone(),
            remote_addr: self.info.remote_addr.map(|a| a.to_string()),
            tls: self.info.tls,
            status: self.info.status,
            dns_lookup_ms: ms(self.phase(Event::DnsStart, Event::DnsDone)),
            tcp_connection_ms: ms(self.phase(Event::ConnectStart, Event::ConnectDone)),
            tls_handshake_ms: ms(self.phase(Event::TlsStart, Event::TlsDone)),
            ws_handshake_ms: ms(self.phase(Event::HandshakeStart, Event::HandshakeDone)),
            message_round_trip_ms: ms(self.phase(Event::FirstMessageSent, Event::FirstMessageReceived)),
            dns_lookup_done_ms: ms(self.offset(Event::DnsDone)),
            tcp_connected_ms: ms(self.offset(Event::ConnectDone)),
            tls_handshake_done_ms: ms(self.offset(Event::TlsDone)),
            ws_handshake_done_ms: ms(self.offset(Event::HandshakeDone)),
            first_message_response_ms: ms(self.offset(Event::FirstMessageReceived)),
            total_time_ms: ms(self.offset(Event::CloseDone)),
        }
    }
}

/// Serializable view of a [`WsResult`], all values in fractional milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Host as written in the URL.
    pub host: Option<String>,
    pub remote_addr: Option<String>,
    pub tls: bool,
    /// HTTP status of the upgrade response.
    pub status: Option<u16>,
    pub dns_lookup_ms: Option<f64>,
    pub tcp_connection_ms: Option<f64>,
    pub tls_handshake_ms: Option<f64>,
    pub ws_handshake_ms: Option<f64>,
    pub message_round_trip_ms: Option<f64>,
    pub dns_lookup_done_ms: Option<f64>,
    pub tcp_connected_ms: Option<f64>,
    pub tls_handshake_done_ms: Option<f64>,
    pub ws_handshake_done_ms: Option<f64>,
    pub first_message_response_ms: Option<f64>,
    /// `dns_start` to `close_done`; `None` until the session is closed.
    pub total_time_ms: Option<f64>,
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

fn write_row(f: &mut fmt::Formatter<'_>, label: &str, phase: Option<Duration>, done: Option<Duration>) -> fmt::Result {
    match (phase, done) {
        (Some(phase), Some(done)) => writeln!(
            f,
            "  {label:<22}{:>10.3} ms  (at {:>10.3} ms)",
            as_millis_f64(phase),
            as_millis_f64(done)
        ),
        _ => writeln!(f, "  {label:<22}{:>10}", "N/A"),
    }
}

impl fmt::Display for WsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Time breakdown:")?;
        write_row(f, "DNS lookup:", self.phase(Event::DnsStart, Event::DnsDone), self.offset(Event::DnsDone))?;
        write_row(
            f,
            "TCP connect:",
            self.phase(Event::ConnectStart, Event::ConnectDone),
            self.offset(Event::ConnectDone),
        )?;
        write_row(f, "TLS handshake:", self.phase(Event::TlsStart, Event::TlsDone), self.offset(Event::TlsDone))?;
        write_row(
            f,
            "WS handshake:",
            self.phase(Event::HandshakeStart, Event::HandshakeDone),
            self.offset(Event::HandshakeDone),
        )?;
        write_row(
            f,
            "Message round trip:",
            self.phase(Event::FirstMessageSent, Event::FirstMessageReceived),
            self.offset(Event::FirstMessageReceived),
        )?;
        write_row(f, "Total:", self.offset(Event::CloseDone), self.offset(Event::CloseDone))
    }
}
