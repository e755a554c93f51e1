//! Socket.IO client over `tokio-tungstenite`.

use super::frame::Frame;
use super::transport::{
    ConnectOptions, SocketConnection, SocketConnector, SocketHandle, Transport, TransportEvent,
};
use crate::ServiceError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub struct WsConnector {
    handshake_timeout: Duration,
}

impl WsConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }

    /// Engine.IO endpoint for the given options, e.g.
    /// `wss://host/socket.io/?EIO=4&transport=websocket&userId=..&streamId=..`.
    pub fn endpoint(options: &ConnectOptions) -> Result<String, ServiceError> {
        let mut url = Url::parse(&options.url)
            .map_err(|e| ServiceError::Config(format!("Invalid socket url {}: {}", options.url, e)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ServiceError::Config(format!(
                    "Unsupported socket url scheme {}",
                    other
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ServiceError::Config(format!("Cannot use scheme {}", scheme)))?;

        if url.path().is_empty() || url.path() == "/" {
            url.set_path("/socket.io/");
        }

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("EIO", "4");
            query.append_pair("transport", "websocket");
            if let Some(user_id) = &options.user_id {
                query.append_pair("userId", user_id);
            }
            query.append_pair("streamId", &options.stream_id);
        }

        Ok(url.to_string())
    }

    async fn open(&self, options: &ConnectOptions) -> Result<SocketConnection, ServiceError> {
        let endpoint = Self::endpoint(options)?;
        info!("Connecting to chat socket: {}", endpoint);

        let (mut ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| ServiceError::WebSocket(e.to_string()))?;

        timeout(self.handshake_timeout, handshake(&mut ws_stream, options))
            .await
            .map_err(|_| ServiceError::WebSocket("Socket.IO handshake timed out".to_string()))??;

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Handle incoming frames
        let pong_tx = tx.clone();
        let reader = tokio::spawn(async move {
            let mut read_stream = read;
            let reason = loop {
                let message = match read_stream.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        error!("WebSocket error: {:?}", e);
                        break e.to_string();
                    }
                    None => break "stream ended".to_string(),
                };

                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break "closed by server".to_string(),
                    _ => continue,
                };

                match Frame::parse(text.as_str()) {
                    Ok(Frame::Ping) => {
                        if pong_tx.send(Message::Text(Frame::Pong.encode().into())).is_err() {
                            break "writer gone".to_string();
                        }
                    }
                    Ok(Frame::Event { name, payload }) => {
                        if events_tx
                            .send(TransportEvent::Message {
                                event: name,
                                payload,
                            })
                            .is_err()
                        {
                            // Nobody is listening any more
                            return;
                        }
                    }
                    Ok(Frame::Disconnect) => break "namespace disconnect".to_string(),
                    Ok(Frame::Close) => break "transport close".to_string(),
                    Ok(other) => debug!("Ignoring frame {:?}", other),
                    Err(e) => warn!("Unreadable frame {:?}: {}", text.as_str(), e),
                }
            };

            let _ = events_tx.send(TransportEvent::Disconnected(reason));
        });

        // Handle outgoing frames
        let writer = tokio::spawn(async move {
            let mut write_stream = write;
            let mut rx_stream = rx;

            while let Some(message) = rx_stream.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write_stream.send(message).await {
                    error!("Error sending message: {:?}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        Ok(SocketConnection {
            handle: Box::new(WsHandle {
                sender: Some(tx),
                reader,
                writer: Some(writer),
            }),
            events: events_rx,
        })
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(
        &self,
        options: &ConnectOptions,
        transport: Transport,
    ) -> Result<SocketConnection, ServiceError> {
        match transport {
            Transport::Websocket => self.open(options).await,
            Transport::Polling => Err(ServiceError::WebSocket(
                "polling transport is not available".to_string(),
            )),
        }
    }
}

/// Waits for the Engine.IO open packet, connects the default namespace and
/// waits for its acknowledgement.
async fn handshake(ws: &mut WsStream, options: &ConnectOptions) -> Result<(), ServiceError> {
    while let Some(message) = ws.next().await {
        let message = message.map_err(|e| ServiceError::WebSocket(e.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match Frame::parse(text.as_str())? {
            Frame::Open(_) => {
                let connect = Frame::Connect(Some(options.auth_payload()));
                send_frame(ws, &connect).await?;
            }
            Frame::Ping => send_frame(ws, &Frame::Pong).await?,
            Frame::Connect(_) => {
                info!("Joined socket namespace for stream {}", options.stream_id);
                return Ok(());
            }
            Frame::ConnectError(message) => {
                return Err(ServiceError::WebSocket(format!(
                    "Connection refused: {}",
                    message
                )));
            }
            other => debug!("Ignoring frame during handshake {:?}", other),
        }
    }

    Err(ServiceError::WebSocket(
        "Socket closed during handshake".to_string(),
    ))
}

async fn send_frame(ws: &mut WsStream, frame: &Frame) -> Result<(), ServiceError> {
    ws.send(Message::Text(frame.encode().into()))
        .await
        .map_err(|e| ServiceError::WebSocket(e.to_string()))
}

struct WsHandle {
    sender: Option<mpsc::UnboundedSender<Message>>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl WsHandle {
    fn send(&self, frame: Frame) -> Result<(), ServiceError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ServiceError::WebSocket("Socket is closed".to_string()))?;
        sender
            .send(Message::Text(frame.encode().into()))
            .map_err(|e| ServiceError::WebSocket(e.to_string()))
    }
}

#[async_trait]
impl SocketHandle for WsHandle {
    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), ServiceError> {
        self.send(Frame::Event {
            name: event.to_string(),
            payload,
        })
    }

    async fn close(&mut self) -> Result<(), ServiceError> {
        let Some(sender) = self.sender.take() else {
            return Ok(());
        };

        let _ = sender.send(Message::Text(Frame::Disconnect.encode().into()));
        let _ = sender.send(Message::Close(None));
        drop(sender);

        if let Some(writer) = self.writer.take() {
            if timeout(CLOSE_GRACE, writer).await.is_err() {
                warn!("Socket writer did not finish within {:?}", CLOSE_GRACE);
            }
        }
        self.reader.abort();
        Ok(())
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = &self.writer {
            writer.abort();
        }
    }
}
