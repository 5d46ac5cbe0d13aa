//! WebSocket transport for streaming recognition.
//!
//! # Session flow
//!
//! 1. `open()` - connect and split the socket into read/write halves
//! 2. `send_config()` - one JSON text frame with the session options
//! 3. `send()` - raw PCM audio as binary frames
//! 4. `recv()` - JSON text frames carrying partial/final events
//!
//! A close frame with a normal code (or the socket simply ending) is the
//! provider's way of finishing the exchange and maps to
//! [`SessionError::StreamEnded`]; everything else is a transport error.

use crate::stt::protocol::{StreamingRequest, StreamingResponse};
use crate::stt::session::{
    RecognitionConfig, RecognitionSession, Recognizer, SessionError, final_alternatives,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

/// Timeout for the WebSocket handshake.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens sessions against a WebSocket recognition endpoint.
pub struct WebSocketRecognizer {
    endpoint: String,
    api_key: Option<String>,
    config: RecognitionConfig,
}

impl WebSocketRecognizer {
    pub fn new(endpoint: impl Into<String>, config: RecognitionConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            config,
        }
    }

    /// Sends `Authorization: Api-Key <key>` with the handshake.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Recognizer for WebSocketRecognizer {
    async fn open(
        &self,
        cancel: CancellationToken,
    ) -> Result<Box<dyn RecognitionSession>, SessionError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::Transport(format!("invalid endpoint: {}", e)))?;

        if let Some(ref key) = self.api_key {
            request.headers_mut().insert(
                "Authorization",
                HeaderValue::from_str(&format!("Api-Key {}", key))
                    .map_err(|e| SessionError::Transport(format!("invalid api key: {}", e)))?,
            );
        }

        debug!("Connecting to recognition endpoint {}", self.endpoint);

        let connect = timeout(CONNECTION_TIMEOUT, connect_async(request));
        let (ws_stream, _response) = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(SessionError::Transport("cancelled while connecting".to_string()));
            }
            result = connect => result
                .map_err(|_| SessionError::Transport("connection timeout".to_string()))?
                .map_err(|e| SessionError::Transport(format!("failed to connect: {}", e)))?,
        };

        info!("Recognition session connected endpoint={}", self.endpoint);

        let (write, read) = ws_stream.split();
        Ok(Box::new(WebSocketSession {
            write: Mutex::new(write),
            read: Mutex::new(read),
            config: self.config.clone(),
            cancel,
        }))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

/// A live WebSocket recognition session.
pub struct WebSocketSession {
    write: Mutex<SplitSink<WsStream, Message>>,
    read: Mutex<SplitStream<WsStream>>,
    config: RecognitionConfig,
    cancel: CancellationToken,
}

impl WebSocketSession {
    async fn send_message(&self, message: Message) -> Result<(), SessionError> {
        let mut write = self.write.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionError::Transport("session closed".to_string())),
            result = write.send(message) => result.map_err(map_ws_error),
        }
    }
}

#[async_trait]
impl RecognitionSession for WebSocketSession {
    async fn send_config(&self) -> Result<(), SessionError> {
        let json = StreamingRequest::session_options(&self.config)
            .to_json()
            .map_err(|e| SessionError::Transport(format!("failed to encode config: {}", e)))?;
        self.send_message(Message::Text(json)).await
    }

    async fn send(&self, chunk: &[u8]) -> Result<(), SessionError> {
        self.send_message(Message::Binary(chunk.to_vec())).await
    }

    async fn recv(&self) -> Result<Vec<String>, SessionError> {
        let mut read = self.read.lock().await;
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(SessionError::Transport("session closed".to_string()));
                }
                next = read.next() => next,
            };

            match next {
                None => return Err(SessionError::StreamEnded),
                Some(Err(e)) => return Err(map_ws_error(e)),
                Some(Ok(Message::Text(text))) => {
                    return match StreamingResponse::from_json(&text) {
                        Ok(response) => Ok(response
                            .final_texts()
                            .map(final_alternatives)
                            .unwrap_or_default()),
                        Err(e) => {
                            warn!("Failed to parse recognition event: {}", e);
                            Ok(Vec::new())
                        }
                    };
                }
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        None => Err(SessionError::StreamEnded),
                        Some(frame) if frame.code == CloseCode::Normal => {
                            Err(SessionError::StreamEnded)
                        }
                        Some(frame) => Err(SessionError::Transport(format!(
                            "closed by provider ({}): {}",
                            frame.code, frame.reason
                        ))),
                    };
                }
                // Ping/pong/binary carry no recognition events.
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&self) {
        self.cancel.cancel();
        let mut write = self.write.lock().await;
        if let Err(e) = write.close().await {
            debug!("Error closing recognition socket: {}", e);
        }
    }
}

fn map_ws_error(error: tungstenite::Error) -> SessionError {
    match error {
        tungstenite::Error::ConnectionClosed => SessionError::StreamEnded,
        other => SessionError::Transport(other.to_string()),
    }
}
