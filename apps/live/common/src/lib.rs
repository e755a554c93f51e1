pub mod api;
pub mod chat;
pub mod error;
pub mod lifecycle;
pub mod media;
pub mod recovery;
pub mod session;

#[cfg(test)]
pub(crate) mod testkit;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use error::MediaError;

/// Service health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Starting,
    ShuttingDown,
}

/// Custom error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Stream {0} is not live")]
    StreamNotLive(String),

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("Connection failed after {attempts} attempts")]
    ConnectionFailed { attempts: u32 },

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl ServiceError {
    /// True when the backend refused a stream start because it is already live.
    pub fn is_already_live(&self) -> bool {
        match self {
            ServiceError::Api { status, message } => {
                *status == 409 || message.to_lowercase().contains("already live")
            }
            _ => false,
        }
    }
}

/// Socket.IO event names and room keys
pub struct SocketEvents;

impl SocketEvents {
    pub const JOIN_STREAM_ROOM: &'static str = "join-stream-room";
    pub const JOIN_STREAM: &'static str = "join-stream";
    pub const LEAVE_STREAM: &'static str = "leave-stream";

    pub const NEW_MESSAGE: &'static str = "new-message";
    pub const MESSAGE_LIKED: &'static str = "message-liked";
    pub const MESSAGE_DELETED: &'static str = "message-deleted";

    pub const ROOM_PREFIX: &'static str = "stream:";

    pub fn room(stream_id: &str) -> String {
        format!("{}{}", Self::ROOM_PREFIX, stream_id)
    }
}

/// Utility functions
pub mod utils {
    use chrono::Utc;
    use entity::ChatMessage;

    /// Channel name for a newly created stream, unique per millisecond.
    pub fn generate_channel_name() -> String {
        format!("stream_{}", Utc::now().timestamp_millis())
    }

    /// Name shown next to a chat message: "You", the profile name, or a short user id.
    pub fn display_name(message: &ChatMessage, current_user_id: Option<&str>) -> String {
        if current_user_id == Some(message.user_id.as_str()) {
            return "You".to_string();
        }
        if !message.user_profile.name.is_empty() {
            return message.user_profile.name.clone();
        }
        message.user_id.chars().take(8).collect()
    }
}

pub mod config {
    use crate::recovery::ReconnectPolicy;
    use config::{Config, ConfigError, Environment};
    use dotenv::dotenv;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Clone, Deserialize)]
    pub struct ServiceConfig {
        pub api_base_url: String,
        pub ws_url: String,
        pub agora_app_id: String,
        pub stream_id: Option<String>,
        pub user_id: Option<String>,
        pub auth_token: Option<String>,
        pub cookies: Option<String>,
        pub storage_path: Option<String>,
        pub history_limit: u32,
        pub reconnection_attempts: u32,
        pub reconnection_delay_ms: u64,
        pub reconnection_delay_max_ms: u64,
        pub request_timeout_secs: u64,
        pub health_port: u16,
    }

    impl ServiceConfig {
        pub fn new() -> Result<Self, ConfigError> {
            // Load environment variables from .env file
            dotenv().ok();

            let mut s = Config::new();

            s.set_default("history_limit", 50i64)?;
            s.set_default("reconnection_attempts", 5i64)?;
            s.set_default("reconnection_delay_ms", 1000i64)?;
            s.set_default("reconnection_delay_max_ms", 5000i64)?;
            s.set_default("request_timeout_secs", 10i64)?;
            s.set_default("health_port", 8080i64)?;

            // Eg.. `APP_API_BASE_URL=https://... would set the `api_base_url` key
            s.merge(Environment::with_prefix("APP"))?;

            s.try_into()
        }

        pub fn reconnect_policy(&self) -> ReconnectPolicy {
            ReconnectPolicy::new(
                self.reconnection_attempts,
                Duration::from_millis(self.reconnection_delay_ms),
                Duration::from_millis(self.reconnection_delay_max_ms),
            )
        }

        pub fn request_timeout(&self) -> Duration {
            Duration::from_secs(self.request_timeout_secs)
        }
    }
}
