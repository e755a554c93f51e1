use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Scheduled,
    Starting,
    Live,
    Ended,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    #[default]
    Public,
    Private,
    Ticketed,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Streamer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A live stream. The backend sends the identifier as `id`, `_id` or both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<StreamEvent>,
    #[serde(default)]
    pub streamer: Streamer,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub stream_status: StreamStatus,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub current_viewers: u32,
    #[serde(default)]
    pub max_viewers: u32,
    #[serde(default)]
    pub stream_type: StreamType,
    #[serde(default)]
    pub scheduled_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub live_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_upcoming: bool,
    #[serde(default)]
    pub is_active: bool,
}

impl Stream {
    /// The identifier to use in REST paths, preferring `id` over `_id`.
    pub fn stream_id(&self) -> &str {
        if !self.id.is_empty() {
            return &self.id;
        }
        self.object_id.as_deref().unwrap_or_default()
    }
}

/// Body of the create-stream request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStreamRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub title: String,
    pub description: String,
    pub stream_type: StreamType,
    pub chat_enabled: bool,
    pub channel_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtcRole {
    Broadcaster,
    Viewer,
}

impl RtcRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RtcRole::Broadcaster => "broadcaster",
            RtcRole::Viewer => "viewer",
        }
    }
}

/// Short-lived RTC credentials issued per (stream, role).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcToken {
    pub token: String,
    pub channel_name: String,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub role: Option<RtcRole>,
}
