//! Phase-by-phase dial: DNS → TCP → optional TLS → WebSocket upgrade.
//!
//! `tokio_tungstenite::connect_async` hides the lower phases, so the dial is
//! done by hand and only the upgrade is delegated to
//! [`tokio_tungstenite::client_async_with_config`]. Each phase reports its
//! start and end to a [`ConnectTrace`] as it happens.
//!
//! A phase that fails keeps its start event and never gets its done event:
//! a refused connect leaves `connect_start` set and `connect_done` empty, so
//! the phase reads as absent rather than as taking zero time.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::{Host, Url};

use crate::error::{Result, WsStatError};
use crate::trace::ConnectTrace;

/// The framed stream produced by a successful dial.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A validated `ws://` or `wss://` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: Url,
    /// Host without IPv6 brackets, used for DNS and TLS SNI.
    pub host: String,
    /// Explicit port, or 80/443 by scheme.
    pub port: u16,
    /// `wss://`.
    pub tls: bool,
}

impl Target {
    /// Parse and validate a `ws://` or `wss://` URL.
    pub fn parse(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| WsStatError::InvalidUrl(format!("{url}: {e}")))?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self> {
        let tls = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(WsStatError::InvalidUrl(format!("unsupported scheme '{other}', expected ws or wss"))),
        };
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(WsStatError::InvalidUrl(format!("{url}: missing host"))),
        };
        let port = url.port_or_known_default().unwrap_or(if tls { 443 } else { 80 });
        Ok(Self { url, host, port, tls })
    }

    /// Build the upgrade request: the URL, then `defaults`, then `headers`.
    /// Later entries replace earlier ones with the same name.
    pub fn request(&self, defaults: &HashMap<String, String>, headers: &HeaderMap) -> Result<Request> {
        let mut request = self.url.as_str().into_client_request().map_err(|e| WsStatError::InvalidUrl(e.to_string()))?;
        let map = request.headers_mut();
        for (name, value) in defaults {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WsStatError::InvalidHeader(format!("{name}: {e}")))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| WsStatError::InvalidHeader(format!("{name}: {e}")))?;
            map.insert(name, value);
        }
        for name in headers.keys() {
            map.remove(name);
        }
        for (name, value) in headers {
            map.append(name.clone(), value.clone());
        }
        Ok(request)
    }
}

/// Parse a `Name: value` header line, as given on a command line.
pub fn parse_header(line: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) =
        line.split_once(':').ok_or_else(|| WsStatError::InvalidHeader(format!("'{line}' is not 'Name: value'")))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| WsStatError::InvalidHeader(format!("{line}: {e}")))?;
    let value = HeaderValue::from_str(value.trim()).map_err(|e| WsStatError::InvalidHeader(format!("{line}: {e}")))?;
    Ok((name, value))
}

/// Run every dial phase in order, reporting each to `trace`.
///
/// On failure the trace holds every event recorded up to the failing phase.
pub(crate) async fn dial(
    target: &Target,
    request: Request,
    accept_invalid_certs: bool,
    trace: &dyn ConnectTrace,
) -> Result<(WsStream, Response)> {
    trace.dns_start(&target.host);
    let addrs = resolve(target).await?;
    trace.dns_done(&addrs);
    debug!("[wsstat] {} resolved to {addrs:?}", target.host);

    let tcp = connect_any(&addrs, trace).await?;

    let stream = if target.tls {
        trace.tls_handshake_start();
        let tls = tls_handshake(target, tcp, accept_invalid_certs).await?;
        trace.tls_handshake_done();
        MaybeTlsStream::NativeTls(tls)
    } else {
        MaybeTlsStream::Plain(tcp)
    };

    trace.ws_handshake_start();
    let (ws, response) =
        tokio_tungstenite::client_async_with_config(request, stream, None).await.map_err(WsStatError::Handshake)?;
    trace.ws_handshake_done(&response);
    debug!("[wsstat] upgraded {} ({})", target.url, response.status());

    Ok((ws, response))
}

async fn resolve(target: &Target) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|source| WsStatError::Resolve { host: target.host.clone(), source })?
        .collect();
    if addrs.is_empty() {
        return Err(WsStatError::Resolve {
            host: target.host.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
        });
    }
    Ok(addrs)
}

/// Try each resolved address in order; the first that accepts wins.
async fn connect_any(addrs: &[SocketAddr], trace: &dyn ConnectTrace) -> Result<TcpStream> {
    let mut last_err = None;
    for &addr in addrs {
        trace.connect_start(addr);
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                trace.connect_done(addr);
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("[wsstat] set_nodelay on {addr} failed: {e}");
                }
                return Ok(stream);
            }
            Err(e) => {
                debug!("[wsstat] connect to {addr} failed: {e}");
                last_err = Some((addr, e));
            }
        }
    }
    let (addr, source) = last_err.unwrap_or_else(|| {
        (SocketAddr::from(([0, 0, 0, 0], 0)), io::Error::new(io::ErrorKind::NotFound, "no address to connect to"))
    });
    Err(WsStatError::Connect { addr: addr.to_string(), source })
}

async fn tls_handshake(
    target: &Target,
    tcp: TcpStream,
    accept_invalid_certs: bool,
) -> Result<tokio_native_tls::TlsStream<TcpStream>> {
    let tls_err = |source| WsStatError::Tls { host: target.host.clone(), source };
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .danger_accept_invalid_hostnames(accept_invalid_certs)
        .build()
        .map_err(tls_err)?;
    tokio_native_tls::TlsConnector::from(connector).connect(&target.host, tcp).await.map_err(tls_err)
}
