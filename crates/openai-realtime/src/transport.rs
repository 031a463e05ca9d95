//! Socket ownership: connect/handshake, the serialized outbound lane, and the
//! inbound reader that reassembles framed messages into JSON event lines.

use crate::{
    error::{CloseReason, ConnectError, SendError},
    framing::{MessageAssembler, split_events},
    protocol::OutboundCommand,
};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, protocol::Message},
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Anything that can transmit an [`OutboundCommand`].
///
/// Implementations must serialize concurrent callers so that each caller's
/// own commands reach the wire in the order it issued them.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: OutboundCommand) -> Result<(), SendError>;
}

/// Builds the endpoint URL with the model query parameter appended.
pub fn endpoint_url(base: &str, model: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}model={}", base, separator, model)
}

/// Opens the WebSocket and returns the two halves of the connection.
///
/// Both halves share one `connected` flag; it is cleared as soon as either
/// side observes the socket going away.
pub async fn connect(
    base_url: &str,
    model: &str,
    token: &SecretString,
) -> Result<(RealtimeSender, RealtimeReceiver), ConnectError> {
    let url = endpoint_url(base_url, model);
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ConnectError::InvalidRequest(e.to_string()))?;
    let auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|e| ConnectError::InvalidRequest(e.to_string()))?;
    request.headers_mut().insert("Authorization", auth);
    request
        .headers_mut()
        .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (ws_stream, _) = connect_async(request).await?;
    info!(%url, "Connected to realtime endpoint.");

    let (sink, stream) = ws_stream.split();
    let connected = Arc::new(AtomicBool::new(true));
    Ok((
        RealtimeSender {
            sink: Mutex::new(sink),
            connected: connected.clone(),
        },
        RealtimeReceiver {
            stream,
            assembler: MessageAssembler::new(),
            connected,
        },
    ))
}

/// The outbound half. All writes go through one async mutex, which is the
/// single outbound lane for every caller.
pub struct RealtimeSender {
    sink: Mutex<SplitSink<WsStream, Message>>,
    connected: Arc<AtomicBool>,
}

impl RealtimeSender {
    /// The flag shared with the receiver.
    pub fn connection_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Marks the connection closed and sends a close frame, best effort.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::Release);
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Close frame was not delivered.");
        }
    }
}

#[async_trait]
impl CommandSink for RealtimeSender {
    async fn send(&self, command: OutboundCommand) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        let kind = command.kind();
        let json = command.to_json()?;

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            let err = SendError::from(e);
            if err.is_closed() {
                self.connected.store(false, Ordering::Release);
            }
            warn!(command = kind, error = %err, "Failed to send command.");
            return Err(err);
        }
        debug!(command = kind, "Sent command.");
        Ok(())
    }
}

/// One step of the inbound side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// JSON event lines from one logical message, in arrival order.
    Events(Vec<String>),
    /// The connection is gone; no further messages will arrive.
    Closed(CloseReason),
}

/// The inbound half.
pub struct RealtimeReceiver {
    stream: SplitStream<WsStream>,
    assembler: MessageAssembler,
    connected: Arc<AtomicBool>,
}

impl RealtimeReceiver {
    /// Waits for the next complete message that carries at least one event.
    ///
    /// Cancel-safe: partial fragments live in `self`, so dropping this future
    /// between reads loses nothing.
    pub async fn recv(&mut self) -> Inbound {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return self.closed(CloseReason::Error(e.to_string())),
                None => return self.closed(CloseReason::StreamEnded),
            };

            let text = match message {
                Message::Text(text) => text.as_str().to_owned(),
                Message::Binary(data) => match self.assembler.push(&data[..], true) {
                    Some(Ok(text)) => text,
                    Some(Err(e)) => {
                        warn!(error = %e, "Dropping binary message that is not UTF-8.");
                        continue;
                    }
                    None => continue,
                },
                // tungstenite reassembles continuation frames before yielding a
                // message, so raw frames are not expected on this path.
                Message::Frame(frame) => {
                    match self.assembler.push(&frame.payload()[..], frame.header().is_final) {
                        Some(Ok(text)) => text,
                        Some(Err(e)) => {
                            warn!(error = %e, "Dropping fragmented message that is not UTF-8.");
                            continue;
                        }
                        None => continue,
                    }
                }
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    return self.closed(CloseReason::ClosedByPeer(reason));
                }
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            let lines: Vec<String> = split_events(&text).map(str::to_owned).collect();
            if !lines.is_empty() {
                return Inbound::Events(lines);
            }
        }
    }

    fn closed(&self, reason: CloseReason) -> Inbound {
        self.connected.store(false, Ordering::Release);
        info!(%reason, "Realtime connection closed.");
        Inbound::Closed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_appends_model() {
        assert_eq!(
            endpoint_url("wss://api.openai.com/v1/realtime", "gpt-4o-realtime-preview"),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );
        assert_eq!(
            endpoint_url("wss://example.test/rt?region=eu", "m"),
            "wss://example.test/rt?region=eu&model=m"
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_endpoint() {
        let token = SecretString::from("sk-test".to_string());
        let err = connect("not a url", "m", &token).await.err().unwrap();
        assert!(matches!(err, ConnectError::InvalidRequest(_)));
    }
}
