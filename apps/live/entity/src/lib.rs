pub mod chat_message;
pub mod comment;
pub mod like;
pub mod post;
pub mod stream;
pub mod user;

use serde::{Deserialize, Serialize};

pub use chat_message::{ChatMessage, NewChatMessage, UserProfile};
pub use comment::{Comment, CommentPage};
pub use like::{Like, LikeStatus, LikeTarget};
pub use post::Post;
pub use stream::{RtcRole, RtcToken, Stream, StreamStatus, StreamType};
pub use user::{AuthSession, User};

/// Response envelope every REST endpoint wraps its payload in.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    pub total_pages: u32,
}

/// Paged list payload (`data: { meta, data: [...] }`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    #[serde(default)]
    pub meta: PageMeta,
    pub data: Vec<T>,
}
