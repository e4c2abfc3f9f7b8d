//! Typed error definitions for wsstat.
//!
//! [`WsStatError`] follows the failure taxonomy of a WebSocket session:
//! resolution, TCP connect, TLS, protocol upgrade, message I/O, plus the
//! timeout and cancellation kinds that let callers tell "server rejected"
//! apart from "caller gave up".

use std::fmt;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::result::WsResult;

/// Lifecycle phase an error or deadline refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Name resolution.
    Dns,
    /// TCP connect to one of the resolved addresses.
    Connect,
    /// TLS negotiation, `wss://` only.
    Tls,
    /// HTTP upgrade to the WebSocket protocol.
    Handshake,
    /// Sending a message or waiting for a reply or pong.
    Message,
    /// Close handshake.
    Close,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Dns => "dns lookup",
            Phase::Connect => "tcp connect",
            Phase::Tls => "tls handshake",
            Phase::Handshake => "websocket handshake",
            Phase::Message => "message exchange",
            Phase::Close => "close",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the dial, message and close operations.
#[derive(Debug, Error)]
pub enum WsStatError {
    /// The target is not a usable `ws://` / `wss://` URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A handshake header name or value is malformed.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// DNS resolution failed or returned no addresses.
    #[error("dns lookup of {host} failed: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Every resolved address refused or failed the TCP connect.
    #[error("tcp connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Certificate validation or TLS negotiation failed.
    #[error("tls handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: native_tls::Error,
    },

    /// The server did not complete the WebSocket upgrade.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),

    /// Transport or framing error while sending, receiving or closing.
    #[error("websocket error: {0}")]
    Message(#[source] tungstenite::Error),

    /// The peer closed the connection, or it was already closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// A reply arrived as a frame kind the codec cannot decode.
    #[error("unexpected {0} frame, expected text or binary")]
    UnexpectedFrame(&'static str),

    /// A JSON payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A deadline expired before the phase completed.
    #[error("{phase} timed out")]
    Timeout { phase: Phase },

    /// The caller's cancellation signal fired before the phase completed.
    #[error("{phase} cancelled")]
    Cancelled { phase: Phase },

    /// The operation is not allowed in the controller's current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl WsStatError {
    /// Returns `true` for deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WsStatError::Timeout { .. })
    }

    /// Returns `true` when the caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WsStatError::Cancelled { .. })
    }

    /// Whether the error leaves the connection unusable.
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, WsStatError::Message(_) | WsStatError::ConnectionClosed)
    }

    /// Classify an error from the framed stream, folding the "closed" family
    /// into [`WsStatError::ConnectionClosed`].
    pub(crate) fn from_transport(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => WsStatError::ConnectionClosed,
            other => WsStatError::Message(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, WsStatError>;

/// Error returned by the one-shot operations: the failure plus every timing
/// captured before it happened.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Failure {
    #[source]
    pub error: WsStatError,
    pub result: WsResult,
}
