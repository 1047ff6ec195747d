//! Live console feed over Moonraker's JSON-RPC websocket.

use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::http::HeaderValue;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{client, Message, WebSocket};
use url::Url;

use super::ConsoleFeed;
use crate::error::ApiError;
use crate::model::{ConsoleMessage, EventKind};

const SUBSCRIBE_ID: u64 = 1;

/// `http://host:7125` → `ws://host:7125/websocket`.
pub fn websocket_url(base_url: &str) -> Result<String, ApiError> {
    let mut url = Url::parse(base_url).map_err(|e| ApiError::protocol(format!("invalid URL {base_url}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ApiError::protocol(format!("unsupported scheme: {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| ApiError::protocol(format!("cannot use scheme {scheme}")))?;
    let path = format!("{}/websocket", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url.to_string())
}

fn map_ws_error(e: tungstenite::Error) -> ApiError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            ApiError::Disconnected
        }
        tungstenite::Error::Http(resp) => {
            let status = resp.status().as_u16();
            let message = format!("websocket handshake rejected ({status})");
            if status == 401 || status == 403 {
                ApiError::Auth { message }
            } else {
                ApiError::Remote {
                    status: Some(status),
                    message,
                }
            }
        }
        tungstenite::Error::Io(io) => ApiError::Connection {
            message: io.to_string(),
        },
        other => ApiError::protocol(other.to_string()),
    }
}

pub struct WebSocketFeed {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

/// Open the TCP connection with a bounded connect and handshake. Only plain
/// `ws://` is supported.
fn open_stream(url: &str, timeout: Duration) -> Result<TcpStream, ApiError> {
    let parsed = Url::parse(url).map_err(|e| ApiError::protocol(format!("invalid URL {url}: {e}")))?;
    if parsed.scheme() != "ws" {
        return Err(ApiError::protocol(format!(
            "unsupported websocket scheme: {}",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| ApiError::protocol(format!("no host in {url}")))?;
    let port = parsed.port_or_known_default().unwrap_or(80);

    let mut last = ApiError::Connection {
        message: format!("{host}:{port} did not resolve"),
    };
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                return Ok(stream);
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                last = ApiError::Timeout {
                    message: format!("connecting to {addr}: {e}"),
                };
            }
            Err(e) => {
                last = ApiError::Connection {
                    message: format!("connecting to {addr}: {e}"),
                };
            }
        }
    }
    Err(last)
}

impl WebSocketFeed {
    /// Connect within `connect_timeout`, bound later socket reads by `poll`,
    /// and subscribe to the objects Moonraker requires before it streams
    /// gcode responses.
    pub fn connect(
        base_url: &str,
        api_key: Option<&str>,
        connect_timeout: Duration,
        poll: Duration,
    ) -> Result<Self, ApiError> {
        let url = websocket_url(base_url)?;
        let mut request = url.as_str().into_client_request().map_err(map_ws_error)?;
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| ApiError::Auth { message: format!("invalid API key: {e}") })?;
            request.headers_mut().insert("X-Api-Key", value);
        }

        let stream = open_stream(&url, connect_timeout)?;
        let (mut socket, _response) =
            client(request, MaybeTlsStream::Plain(stream)).map_err(|e| match e {
                HandshakeError::Failure(e) => map_ws_error(e),
                HandshakeError::Interrupted(_) => ApiError::Timeout {
                    message: "websocket handshake timed out".into(),
                },
            })?;
        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            stream.set_read_timeout(Some(poll))?;
        }
        debug!(%url, "websocket connected");

        let subscribe = json!({
            "jsonrpc": "2.0",
            "method": "printer.objects.subscribe",
            "params": { "objects": { "gcode_move": null, "toolhead": null } },
            "id": SUBSCRIBE_ID,
        });
        socket
            .send(Message::Text(subscribe.to_string()))
            .map_err(map_ws_error)?;

        Ok(Self {
            socket,
            closed: false,
        })
    }
}

/// Interpret one JSON-RPC frame. Only `notify_gcode_response` yields a
/// message; an error reply to our subscription is fatal.
pub(crate) fn parse_frame(text: &str) -> Result<Option<ConsoleMessage>, ApiError> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Ok(None);
    };

    if let Some(error) = value.get("error") {
        let code = error.get("code").and_then(Value::as_u64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("subscription rejected")
            .to_string();
        return Err(match code {
            401 | 403 => ApiError::Auth { message },
            _ => ApiError::Remote {
                status: u16::try_from(code).ok(),
                message,
            },
        });
    }

    if value.get("method").and_then(Value::as_str) != Some("notify_gcode_response") {
        return Ok(None);
    }
    let Some(line) = value
        .get("params")
        .and_then(Value::as_array)
        .and_then(|p| p.first())
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    Ok(Some(ConsoleMessage {
        message: line.to_string(),
        time: value.get("time").and_then(Value::as_f64),
        kind: EventKind::classify(line),
    }))
}

impl ConsoleFeed for WebSocketFeed {
    fn next_event(&mut self) -> Result<Option<ConsoleMessage>, ApiError> {
        if self.closed {
            return Err(ApiError::Disconnected);
        }
        match self.socket.read() {
            Ok(Message::Text(text)) => parse_frame(&text),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "websocket closed by server");
                self.closed = true;
                Err(ApiError::Disconnected)
            }
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(e) => {
                self.closed = true;
                Err(map_ws_error(e))
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.socket.close(None) {
            warn!(error = %e, "websocket close failed");
        }
        // Best effort flush of the close frame; the peer's reply is not awaited.
        let _ = self.socket.flush();
    }
}

impl Drop for WebSocketFeed {
    fn drop(&mut self) {
        self.close();
    }
}
