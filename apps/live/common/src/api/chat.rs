use super::{ApiClient, Endpoint, Method, ResourceTag};
use crate::ServiceError;
use crate::chat::ChatBackend;
use crate::chat::payload::{LikeUpdate, normalize_like};
use async_trait::async_trait;
use entity::{ChatMessage, NewChatMessage};
use serde_json::Value;
use tracing::warn;

pub struct ChatMessageEndpoints;

impl ChatMessageEndpoints {
    pub const HISTORY: Endpoint =
        Endpoint::query("/chatmessage/{streamId}/messages", &[ResourceTag::ChatMessage]);
    pub const SEND: Endpoint = Endpoint::mutation(
        Method::Post,
        "/chatmessage/{streamId}/messages",
        &[ResourceTag::ChatMessage],
    );
    pub const LIKE: Endpoint = Endpoint::mutation(
        Method::Post,
        "/chatmessage/{streamId}/messages/{messageId}/like",
        &[ResourceTag::ChatMessage],
    );
    pub const DELETE: Endpoint = Endpoint::mutation(
        Method::Delete,
        "/chatmessage/{streamId}/messages/{messageId}",
        &[ResourceTag::ChatMessage],
    );
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn history(&self, stream_id: &str, limit: u32) -> Result<Vec<ChatMessage>, ServiceError> {
        let query = [("limit", limit.to_string())];
        let data: Value = self
            .call::<(), _>(&ChatMessageEndpoints::HISTORY, &[stream_id], &query, None)
            .await?;

        match data {
            Value::Array(_) => Ok(serde_json::from_value(data)?),
            other => {
                warn!("Chat history for {} is not a list: {}", stream_id, other);
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, stream_id: &str, text: &str) -> Result<ChatMessage, ServiceError> {
        let body = NewChatMessage::text(text);
        self.call(&ChatMessageEndpoints::SEND, &[stream_id], &[], Some(&body))
            .await
    }

    async fn like_message(
        &self,
        stream_id: &str,
        message_id: &str,
    ) -> Result<LikeUpdate, ServiceError> {
        let mut data: Value = self
            .call_empty(&ChatMessageEndpoints::LIKE, &[stream_id, message_id])
            .await?;

        // The like response may omit the id it refers to
        if let Value::Object(map) = &mut data {
            if !map.contains_key("messageId") && !map.contains_key("id") {
                map.insert("messageId".to_string(), Value::String(message_id.to_string()));
            }
        } else {
            data = serde_json::json!({ "messageId": message_id });
        }

        Ok(normalize_like(&data)?.value)
    }

    async fn delete_message(&self, stream_id: &str, message_id: &str) -> Result<(), ServiceError> {
        let _: Value = self
            .call_empty(&ChatMessageEndpoints::DELETE, &[stream_id, message_id])
            .await?;
        Ok(())
    }
}
