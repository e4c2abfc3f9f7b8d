mod common;

use std::time::{Duration, Instant};

use serde::Serialize;
use wsstat_core::codec::{Decode, Encode};
use wsstat_core::{
    Event, HeaderMap, JsonCodec, Message, Phase, State, TextCodec, Timestamps, WsStat, WsStatConfig, WsStatError,
    measure_latency, measure_latency_json, measure_latency_ping, measure_with,
};

/// Every recorded instant must be no earlier than the one recorded before it.
fn assert_ordered(ts: &Timestamps) {
    let recorded: Vec<(Event, Instant)> = Event::ALL.iter().filter_map(|&e| ts.get(e).map(|at| (e, at))).collect();
    for pair in recorded.windows(2) {
        assert!(pair[0].1 <= pair[1].1, "{:?} recorded after {:?}", pair[0].0, pair[1].0);
    }
}

#[derive(Serialize)]
struct Greeting {
    text: String,
}

#[tokio::test]
async fn text_round_trip() {
    let url = common::start_echo_server().await;
    let m = measure_latency(&url, "Hello, world!", &HeaderMap::new()).await.unwrap();

    assert_eq!(m.response, b"Hello, world!");
    assert!(m.result.total_time() > Duration::ZERO);
    assert!(m.result.is_finalized());
    assert!(m.result.message_round_trip() <= m.result.total_time());
    assert_ordered(m.result.timestamps());
}

#[tokio::test]
async fn json_round_trip() {
    let url = common::start_echo_server().await;
    let greeting = Greeting { text: "Hello, world!".into() };
    let m = measure_latency_json(&url, &greeting, &HeaderMap::new()).await.unwrap();

    assert_eq!(m.response["text"], "Hello, world!");
    assert!(m.result.total_time() > Duration::ZERO);
}

#[tokio::test]
async fn ping_fills_first_message_slot() {
    let url = common::start_echo_server().await;
    let result = measure_latency_ping(&url, &HeaderMap::new()).await.unwrap();

    let ts = result.timestamps();
    assert!(ts.first_message_sent.is_some());
    assert!(ts.first_message_received.is_some());
    assert!(result.is_finalized());
    assert_ordered(ts);
}

#[tokio::test]
async fn unreachable_host_fails_in_connect() {
    let url = common::unreachable_url().await;
    let failure = measure_latency(&url, "Hello, world!", &HeaderMap::new()).await.unwrap_err();

    assert!(matches!(failure.error, WsStatError::Connect { .. }), "got {:?}", failure.error);
    let ts = failure.result.timestamps();
    assert!(ts.dns_start.is_some() && ts.dns_done.is_some());
    // The attempt started, it just never finished.
    assert!(ts.connect_start.is_some());
    assert!(ts.connect_done.is_none());
    assert!(ts.handshake_start.is_none());
    assert!(ts.first_message_sent.is_none());
    assert_eq!(failure.result.tcp_connection(), Duration::ZERO);
    assert_eq!(failure.result.total_time(), Duration::ZERO);
}

#[tokio::test]
async fn plaintext_session_skips_tls() {
    let url = common::start_echo_server().await;
    let mut ws = WsStat::new();
    ws.dial(&url, &HeaderMap::new()).await.unwrap();
    assert_eq!(ws.state(), State::Connected);
    ws.one_hit_message(Message::text("hi")).await.unwrap();
    ws.close().await.unwrap();

    let result = ws.result();
    assert!(!result.is_tls());
    assert!(result.timestamps().tls_start.is_none() && result.timestamps().tls_done.is_none());
    assert_eq!(result.tls_handshake(), Duration::ZERO);
    assert!(result.remote_addr().is_some());
    assert_eq!(result.info().status, Some(101));
    assert_ordered(result.timestamps());
}

#[tokio::test]
async fn close_twice_keeps_result() {
    let url = common::start_echo_server().await;
    let mut ws = WsStat::new();
    ws.dial(&url, &HeaderMap::new()).await.unwrap();
    ws.close().await.unwrap();
    let first = *ws.result().timestamps();

    ws.close().await.unwrap();
    assert_eq!(*ws.result().timestamps(), first);
    assert_eq!(ws.state(), State::Closed);
    assert!(matches!(ws.send_text("late").await, Err(WsStatError::ConnectionClosed)));
}

#[tokio::test]
async fn only_first_exchange_counts() {
    let url = common::start_echo_server().await;
    let mut ws = WsStat::new();
    ws.dial(&url, &HeaderMap::new()).await.unwrap();

    ws.one_hit_message(Message::text("first")).await.unwrap();
    let rtt = ws.result().message_round_trip();
    let sent = ws.result().timestamps().first_message_sent;

    for i in 0..5 {
        let reply = ws.one_hit_message(Message::text(format!("msg {i}"))).await.unwrap();
        assert_eq!(reply.to_text().unwrap(), format!("msg {i}"));
    }
    ws.ping_pong().await.unwrap();

    assert_eq!(ws.result().message_round_trip(), rtt);
    assert_eq!(ws.result().timestamps().first_message_sent, sent);
    ws.close().await.unwrap();
}

#[tokio::test]
async fn json_exchange_on_controller() {
    let url = common::start_echo_server().await;
    let mut ws = WsStat::new();
    ws.dial(&url, &HeaderMap::new()).await.unwrap();

    let reply = ws.one_hit_json(&serde_json::json!({ "text": "Hello, world!", "n": 3 })).await.unwrap();
    assert_eq!(reply["text"], "Hello, world!");
    assert_eq!(reply["n"], 3);
    ws.close().await.unwrap();
}

#[tokio::test]
async fn read_timeout_is_not_terminal() {
    let url = common::start_echo_server().await;
    let mut ws = WsStat::new();
    ws.dial(&url, &HeaderMap::new()).await.unwrap();

    let err = ws.read_message_timeout(Some(Duration::from_millis(50))).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(ws.state(), State::Connected);

    let reply = ws.one_hit_message(Message::text("still here")).await.unwrap();
    assert_eq!(reply.to_text().unwrap(), "still here");
    ws.close().await.unwrap();
}

#[tokio::test]
async fn rejected_upgrade_keeps_partial_timings() {
    let url = common::start_rejecting_server().await;
    let mut ws = WsStat::new();
    let err = ws.dial(&url, &HeaderMap::new()).await.unwrap_err();

    assert!(matches!(err, WsStatError::Handshake(_)), "got {err:?}");
    assert_eq!(ws.state(), State::Error);
    let result = ws.result();
    assert!(result.timestamps().connect_done.is_some());
    assert!(result.timestamps().handshake_start.is_some());
    assert!(result.timestamps().handshake_done.is_none());
    assert_eq!(result.ws_handshake(), Duration::ZERO);
}

#[tokio::test]
async fn peer_close_finalizes_result() {
    let url = common::start_closing_server().await;
    let mut ws = WsStat::new();
    ws.dial(&url, &HeaderMap::new()).await.unwrap();

    let err = ws.read_message().await.unwrap_err();
    assert!(matches!(err, WsStatError::ConnectionClosed), "got {err:?}");
    assert_eq!(ws.state(), State::Closed);
    assert!(ws.result().is_finalized());
    assert!(ws.result().total_time() > Duration::ZERO);
    assert!(ws.close().await.is_ok());
}

#[tokio::test]
async fn custom_headers_reach_the_server() {
    let url = common::start_header_server().await;
    let mut headers = HeaderMap::new();
    headers.insert("x-probe", "from-call".parse().unwrap());

    let mut ws = WsStat::new();
    ws.dial(&url, &headers).await.unwrap();
    let greeting = ws.read_message().await.unwrap();
    assert_eq!(greeting.to_text().unwrap(), "from-call");
    ws.close().await.unwrap();
}

#[tokio::test]
async fn config_headers_apply_when_call_has_none() {
    let url = common::start_header_server().await;
    let mut config = WsStatConfig::default();
    config.headers.insert("X-Probe".into(), "from-config".into());

    let mut ws = WsStat::with_config(config);
    ws.dial(&url, &HeaderMap::new()).await.unwrap();
    let greeting = ws.read_message().await.unwrap();
    assert_eq!(greeting.to_text().unwrap(), "from-config");
    ws.close().await.unwrap();
}

/// Sends text but expects JSON back, so decoding an echo of non-JSON fails.
struct TextOutJsonIn;

impl Encode<str> for TextOutJsonIn {
    fn encode(&self, value: &str) -> wsstat_core::error::Result<Message> {
        TextCodec.encode(value)
    }
}

impl Decode for TextOutJsonIn {
    type Output = serde_json::Value;

    fn decode(&self, message: Message) -> wsstat_core::error::Result<serde_json::Value> {
        JsonCodec.decode(message)
    }
}

#[tokio::test]
async fn failed_exchange_still_closes() {
    let url = common::start_echo_server().await;
    let failure =
        measure_with(WsStatConfig::default(), &url, &TextOutJsonIn, "not json", &HeaderMap::new()).await.unwrap_err();

    assert!(matches!(failure.error, WsStatError::Codec(_)), "got {:?}", failure.error);
    assert!(failure.result.is_finalized());
    assert!(failure.result.timestamps().first_message_received.is_some());
    assert_ordered(failure.result.timestamps());
}

#[tokio::test]
async fn message_reply_survives_a_ping_wait() {
    let url = common::start_echo_server().await;
    let mut ws = WsStat::new();
    ws.dial(&url, &HeaderMap::new()).await.unwrap();

    ws.send_text("Hello, world!").await.unwrap();
    ws.ping_pong().await.unwrap();
    let reply = ws.read_message_timeout(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(reply.to_text().unwrap(), "Hello, world!");

    let ts = *ws.result().timestamps();
    assert!(ts.first_message_sent.is_some() && ts.first_message_received.is_some());
    assert!(ws.result().message_round_trip() > Duration::ZERO);
    ws.close().await.unwrap();
    assert!(ws.result().message_round_trip() > Duration::ZERO);
}

#[tokio::test]
async fn tls_against_plaintext_server_fails_in_tls() {
    let url = common::start_echo_server().await.replacen("ws://", "wss://", 1);
    let mut ws = WsStat::new();
    let err = ws.dial(&url, &HeaderMap::new()).await.unwrap_err();

    assert!(matches!(err, WsStatError::Tls { .. }), "got {err:?}");
    assert_eq!(ws.state(), State::Error);
    let result = ws.result();
    assert!(result.is_tls());
    assert!(result.timestamps().connect_done.is_some());
    assert!(result.timestamps().tls_start.is_some());
    assert!(result.timestamps().tls_done.is_none());
    assert!(result.timestamps().handshake_start.is_none());
    assert_eq!(result.tls_handshake(), Duration::ZERO);
}

#[tokio::test]
async fn stalled_upgrade_hits_dial_timeout() {
    let url = common::start_silent_server().await;
    let config = WsStatConfig { dial_timeout_ms: 200, ..WsStatConfig::default() };
    let mut ws = WsStat::with_config(config);
    let err = ws.dial(&url, &HeaderMap::new()).await.unwrap_err();

    assert!(matches!(err, WsStatError::Timeout { phase: Phase::Handshake }), "got {err:?}");
    assert!(err.is_timeout());
    assert_eq!(ws.state(), State::Error);
    let ts = *ws.result().timestamps();
    assert!(ts.connect_done.is_some());
    assert!(ts.handshake_start.is_some());
    assert!(ts.handshake_done.is_none());
}

#[tokio::test]
async fn close_timeout_still_finalizes() {
    let url = common::start_unresponsive_server().await;
    let config = WsStatConfig { close_timeout_ms: 200, ..WsStatConfig::default() };
    let mut ws = WsStat::with_config(config);
    ws.dial(&url, &HeaderMap::new()).await.unwrap();

    let err = ws.close().await.unwrap_err();
    assert!(matches!(err, WsStatError::Timeout { phase: Phase::Close }), "got {err:?}");
    assert_eq!(ws.state(), State::Closed);
    let result = ws.result();
    assert!(result.is_finalized());
    assert!(result.close() >= Duration::from_millis(200));
    assert!(ws.close().await.is_ok());
}
