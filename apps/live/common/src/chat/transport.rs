use crate::ServiceError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Websocket,
    Polling,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Websocket => write!(f, "websocket"),
            Transport::Polling => write!(f, "polling"),
        }
    }
}

/// Handshake parameters for one chat room connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub stream_id: String,
    /// Tried in order until one connects.
    pub transports: Vec<Transport>,
}

impl ConnectOptions {
    pub fn new(url: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            user_id: None,
            stream_id: stream_id.into(),
            transports: vec![Transport::Websocket, Transport::Polling],
        }
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }

    pub fn with_user_id(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    /// `auth` object sent with the namespace connect packet.
    pub fn auth_payload(&self) -> Value {
        match &self.token {
            Some(token) => json!({ "token": token }),
            None => json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message { event: String, payload: Value },
    Disconnected(String),
}

/// Write half of an open socket.
#[async_trait]
pub trait SocketHandle: Send + Sync {
    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), ServiceError>;
    async fn close(&mut self) -> Result<(), ServiceError>;
}

pub struct SocketConnection {
    pub handle: Box<dyn SocketHandle>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(
        &self,
        options: &ConnectOptions,
        transport: Transport,
    ) -> Result<SocketConnection, ServiceError>;
}
