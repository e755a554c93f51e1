//! Socket session manager for one stream's chat room.
//!
//! A [`ChatSession`] owns the socket, the merged message list and the
//! connection state machine. Live events are pulled with
//! [`ChatSession::next_update`], which also drives automatic reconnection.

pub mod frame;
pub mod payload;
pub mod store;
pub mod transport;
pub mod ws;

use crate::recovery::ReconnectPolicy;
use crate::{ServiceError, SocketEvents};
use async_trait::async_trait;
use entity::ChatMessage;
use payload::{LikeUpdate, normalize_deleted, normalize_like, normalize_message};
use serde_json::{Value, json};
use store::MessageList;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use transport::{ConnectOptions, SocketConnection, SocketConnector, SocketHandle, TransportEvent};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// REST operations the chat room needs besides the socket.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn history(&self, stream_id: &str, limit: u32) -> Result<Vec<ChatMessage>, ServiceError>;
    async fn send_message(&self, stream_id: &str, text: &str) -> Result<ChatMessage, ServiceError>;
    async fn like_message(&self, stream_id: &str, message_id: &str)
    -> Result<LikeUpdate, ServiceError>;
    async fn delete_message(&self, stream_id: &str, message_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed { attempts: u32 },
}

/// Change applied to the message list by a live event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    Added(ChatMessage),
    Liked(LikeUpdate),
    Deleted(String),
    Reconnected,
    Failed { attempts: u32 },
}

pub struct ChatSession<B, C> {
    backend: B,
    connector: C,
    options: ConnectOptions,
    policy: ReconnectPolicy,
    history_limit: u32,
    state: ConnectionState,
    handle: Option<Box<dyn SocketHandle>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    messages: MessageList,
}

impl<B: ChatBackend, C: SocketConnector> ChatSession<B, C> {
    pub fn new(backend: B, connector: C, options: ConnectOptions, policy: ReconnectPolicy) -> Self {
        Self {
            backend,
            connector,
            options,
            policy,
            history_limit: DEFAULT_HISTORY_LIMIT,
            state: ConnectionState::Disconnected,
            handle: None,
            events: None,
            messages: MessageList::new(),
        }
    }

    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.messages.as_slice()
    }

    pub fn stream_id(&self) -> &str {
        &self.options.stream_id
    }

    pub fn current_user_id(&self) -> Option<&str> {
        self.options.user_id.as_deref()
    }

    /// Opens the socket, joins the stream room and loads history.
    ///
    /// A no-op while a connection is being established or is already open.
    pub async fn connect(&mut self) -> Result<(), ServiceError> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!("Chat for stream {} already connected", self.options.stream_id);
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        if let Err(e) = self.establish().await {
            self.state = ConnectionState::Failed {
                attempts: failed_attempts(&e),
            };
            return Err(e);
        }

        self.load_history().await;
        Ok(())
    }

    /// Drops the current connection and connects again with a fresh
    /// reconnection budget.
    pub async fn reconnect(&mut self) -> Result<(), ServiceError> {
        self.disconnect().await?;
        self.connect().await
    }

    /// Leaves the room and closes the socket. Listeners are unregistered
    /// first so no event is applied after this returns.
    pub async fn disconnect(&mut self) -> Result<(), ServiceError> {
        self.events = None;

        let Some(mut handle) = self.handle.take() else {
            self.state = ConnectionState::Disconnected;
            return Ok(());
        };

        let stream_id = self.options.stream_id.clone();
        if let Err(e) = handle
            .emit(SocketEvents::LEAVE_STREAM, Value::String(stream_id.clone()))
            .await
        {
            warn!("Failed to leave stream {}: {}", stream_id, e);
        }
        let result = handle.close().await;
        self.state = ConnectionState::Disconnected;
        info!("Disconnected from chat for stream {}", stream_id);

        result
    }

    /// Waits for the next live change. Transport loss triggers automatic
    /// reconnection; `None` means the session is not connected.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        loop {
            let event = self.events.as_mut()?.recv().await;

            let reason = match event {
                Some(TransportEvent::Message { event, payload }) => {
                    if let Some(update) = self.apply_event(&event, &payload) {
                        return Some(update);
                    }
                    continue;
                }
                Some(TransportEvent::Disconnected(reason)) => reason,
                None => "event channel closed".to_string(),
            };

            warn!(
                "Chat connection for stream {} lost: {}",
                self.options.stream_id, reason
            );
            self.events = None;
            self.handle = None;
            self.state = ConnectionState::Connecting;

            match self.establish().await {
                Ok(()) => {
                    self.load_history().await;
                    return Some(ChatUpdate::Reconnected);
                }
                Err(e) => {
                    let attempts = failed_attempts(&e);
                    error!("Giving up on chat for stream {}: {}", self.options.stream_id, e);
                    self.state = ConnectionState::Failed { attempts };
                    return Some(ChatUpdate::Failed { attempts });
                }
            }
        }
    }

    pub async fn send(&mut self, text: &str) -> Result<ChatMessage, ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::Validation("Message is empty".to_string()));
        }

        let message = self
            .backend
            .send_message(&self.options.stream_id, text)
            .await?;
        self.messages.merge(message.clone());
        Ok(message)
    }

    /// Toggles the current user's like. The change is shown immediately and
    /// reverted when the request fails.
    pub async fn like(&mut self, message_id: &str) -> Result<LikeUpdate, ServiceError> {
        let message = self
            .messages
            .get_mut(message_id)
            .ok_or_else(|| ServiceError::Validation(format!("Unknown message {}", message_id)))?;

        let previous = (message.likes, message.has_liked);
        if message.has_liked {
            message.has_liked = false;
            message.likes = message.likes.saturating_sub(1);
        } else {
            message.has_liked = true;
            message.likes = message.likes.saturating_add(1);
        }

        match self
            .backend
            .like_message(&self.options.stream_id, message_id)
            .await
        {
            Ok(update) => {
                let current_user_id = self.options.user_id.clone();
                self.messages
                    .apply_like(&update, current_user_id.as_deref());
                Ok(update)
            }
            Err(e) => {
                if let Some(message) = self.messages.get_mut(message_id) {
                    (message.likes, message.has_liked) = previous;
                }
                Err(e)
            }
        }
    }

    pub async fn delete(&mut self, message_id: &str) -> Result<(), ServiceError> {
        self.backend
            .delete_message(&self.options.stream_id, message_id)
            .await?;
        self.messages.remove(message_id);
        Ok(())
    }

    async fn establish(&mut self) -> Result<(), ServiceError> {
        let connector = &self.connector;
        let options = &self.options;
        let connection = self
            .policy
            .execute(|| open_any(connector, options))
            .await?;

        self.attach(connection).await
    }

    async fn attach(&mut self, connection: SocketConnection) -> Result<(), ServiceError> {
        let SocketConnection { mut handle, events } = connection;
        let stream_id = self.options.stream_id.clone();

        let joined = async {
            handle
                .emit(
                    SocketEvents::JOIN_STREAM_ROOM,
                    json!({ "room": SocketEvents::room(&stream_id) }),
                )
                .await?;
            handle
                .emit(SocketEvents::JOIN_STREAM, Value::String(stream_id.clone()))
                .await
        }
        .await;

        if let Err(e) = joined {
            let _ = handle.close().await;
            return Err(e);
        }

        self.handle = Some(handle);
        self.events = Some(events);
        self.state = ConnectionState::Connected;
        info!("Joined chat room {}", SocketEvents::room(&stream_id));
        Ok(())
    }

    async fn load_history(&mut self) {
        match self
            .backend
            .history(&self.options.stream_id, self.history_limit)
            .await
        {
            Ok(history) => {
                debug!("Loaded {} chat messages", history.len());
                self.messages.replace_with_history(history);
            }
            Err(e) => warn!(
                "Failed to load chat history for stream {}: {}",
                self.options.stream_id, e
            ),
        }
    }

    fn apply_event(&mut self, event: &str, payload: &Value) -> Option<ChatUpdate> {
        let result = match event {
            SocketEvents::NEW_MESSAGE => normalize_message(payload).map(|normalized| {
                let message = normalized.value;
                self.messages
                    .merge(message.clone())
                    .then_some(ChatUpdate::Added(message))
            }),
            SocketEvents::MESSAGE_LIKED => normalize_like(payload).map(|normalized| {
                let update = normalized.value;
                let current_user_id = self.options.user_id.as_deref();
                self.messages
                    .apply_like(&update, current_user_id)
                    .then_some(ChatUpdate::Liked(update))
            }),
            SocketEvents::MESSAGE_DELETED => normalize_deleted(payload).map(|normalized| {
                self.messages
                    .remove(&normalized.value)
                    .map(|_| ChatUpdate::Deleted(normalized.value))
            }),
            other => {
                debug!("Ignoring socket event {}", other);
                return None;
            }
        };

        match result {
            Ok(update) => update,
            Err(e) => {
                warn!("Dropping {} event: {}", event, e);
                None
            }
        }
    }
}

/// Tries each configured transport in order.
async fn open_any<C: SocketConnector>(
    connector: &C,
    options: &ConnectOptions,
) -> Result<SocketConnection, ServiceError> {
    let mut last_error = None;
    for transport in &options.transports {
        match connector.connect(options, *transport).await {
            Ok(connection) => return Ok(connection),
            Err(e) => {
                debug!("Transport {} failed: {}", transport, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| ServiceError::Config("No socket transports configured".to_string())))
}

fn failed_attempts(error: &ServiceError) -> u32 {
    match error {
        ServiceError::ConnectionFailed { attempts } => *attempts,
        _ => 1,
    }
}
