use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display profile attached to every chat message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A live chat message as stored by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_profile: UserProfile,
    pub message: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_time: Option<String>,
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub has_liked: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Body of the send-message request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChatMessage {
    pub message: String,
    pub message_type: String,
}

impl NewChatMessage {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            message_type: default_message_type(),
        }
    }
}

fn default_message_type() -> String {
    "text".to_string()
}
