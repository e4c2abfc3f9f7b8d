//! Payload encodings for message exchanges.
//!
//! The controller runs one lifecycle for every payload kind; a
//! codec supplies the two steps that differ: turning the caller's
//! value into a frame, and turning the reply frame into a value.

use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Result, WsStatError};

/// Turns a caller value into an outgoing frame.
pub trait Encode<T: ?Sized> {
    fn encode(&self, value: &T) -> Result<Message>;
}

/// Turns a reply frame into a caller value.
pub trait Decode {
    type Output;

    fn decode(&self, message: Message) -> Result<Self::Output>;
}

/// An encode/decode pair usable for a full exchange.
pub trait MessageCodec<T: ?Sized>: Encode<T> + Decode {}

impl<C, T: ?Sized> MessageCodec<T> for C where C: Encode<T> + Decode {}

/// Sends a text frame; replies come back as raw payload bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

/// Sends a binary frame; replies come back as raw payload bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

/// Sends any `Serialize` value as a JSON text frame; replies are parsed into
/// a generic [`serde_json::Value`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

fn data_bytes(message: Message) -> Result<Vec<u8>> {
    match message {
        Message::Text(_) | Message::Binary(_) => Ok(message.into_data().to_vec()),
        Message::Ping(_) => Err(WsStatError::UnexpectedFrame("ping")),
        Message::Pong(_) => Err(WsStatError::UnexpectedFrame("pong")),
        Message::Close(_) => Err(WsStatError::UnexpectedFrame("close")),
        Message::Frame(_) => Err(WsStatError::UnexpectedFrame("raw")),
    }
}

impl Encode<str> for TextCodec {
    fn encode(&self, value: &str) -> Result<Message> {
        Ok(Message::text(value))
    }
}

impl Decode for TextCodec {
    type Output = Vec<u8>;

    fn decode(&self, message: Message) -> Result<Vec<u8>> {
        data_bytes(message)
    }
}

impl Encode<[u8]> for BinaryCodec {
    fn encode(&self, value: &[u8]) -> Result<Message> {
        Ok(Message::binary(value.to_vec()))
    }
}

impl Decode for BinaryCodec {
    type Output = Vec<u8>;

    fn decode(&self, message: Message) -> Result<Vec<u8>> {
        data_bytes(message)
    }
}

impl<T: Serialize + ?Sized> Encode<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<Message> {
        Ok(Message::text(serde_json::to_string(value)?))
    }
}

impl Decode for JsonCodec {
    type Output = serde_json::Value;

    fn decode(&self, message: Message) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&data_bytes(message)?)?)
    }
}
