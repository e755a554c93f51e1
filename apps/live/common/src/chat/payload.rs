//! Normalisation of broadcast payloads.
//!
//! The backend wraps the same record differently depending on the code path
//! that emitted it: `{ data: {...} }`, `{ message: {...} }` or the record
//! itself. Each normaliser reports which wrapper it found so callers can log
//! it, and refuses anything else with [`ServiceError::MalformedPayload`].

use crate::ServiceError;
use entity::ChatMessage;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `{ data: record }`
    Data,
    /// `{ message: record }`
    Message,
    /// The record itself.
    Bare,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub shape: PayloadShape,
    pub value: T,
}

/// Like counters broadcast for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeUpdate {
    pub message_id: String,
    pub likes: Option<u32>,
    pub user_id: Option<String>,
    pub has_liked: Option<bool>,
}

/// Picks the first wrapper that holds an id-bearing record, falling back to
/// the payload itself.
fn unwrap_shape(payload: &Value) -> (PayloadShape, &Value) {
    if let Some(inner) = payload.get("data").filter(|v| id_of(v).is_some()) {
        return (PayloadShape::Data, inner);
    }
    // `message` is also the text field of a bare record
    if let Some(inner) = payload.get("message").filter(|v| id_of(v).is_some()) {
        return (PayloadShape::Message, inner);
    }
    (PayloadShape::Bare, payload)
}

fn id_of(record: &Value) -> Option<String> {
    record
        .get("messageId")
        .or_else(|| record.get("id"))
        .or_else(|| record.get("_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn normalize_message(payload: &Value) -> Result<Normalized<ChatMessage>, ServiceError> {
    let (shape, record) = unwrap_shape(payload);
    if !record.is_object() || record.get("id").and_then(Value::as_str).is_none() {
        return Err(ServiceError::MalformedPayload(format!(
            "new-message without an id: {}",
            preview(payload)
        )));
    }

    let value = serde_json::from_value(record.clone())
        .map_err(|e| ServiceError::MalformedPayload(format!("new-message: {}", e)))?;
    Ok(Normalized { shape, value })
}

pub fn normalize_like(payload: &Value) -> Result<Normalized<LikeUpdate>, ServiceError> {
    let (shape, record) = unwrap_shape(payload);
    let message_id = id_of(record).ok_or_else(|| {
        ServiceError::MalformedPayload(format!("message-liked without an id: {}", preview(payload)))
    })?;

    let likes = record
        .get("likes")
        .or_else(|| record.get("likeCount"))
        .and_then(Value::as_u64)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX));
    let user_id = record
        .get("userId")
        .and_then(Value::as_str)
        .map(str::to_string);
    let has_liked = record
        .get("hasLiked")
        .or_else(|| record.get("liked"))
        .and_then(Value::as_bool);

    Ok(Normalized {
        shape,
        value: LikeUpdate {
            message_id,
            likes,
            user_id,
            has_liked,
        },
    })
}

/// Deleted-message payloads may also be the bare id string.
pub fn normalize_deleted(payload: &Value) -> Result<Normalized<String>, ServiceError> {
    if let Some(id) = payload.as_str().filter(|id| !id.is_empty()) {
        return Ok(Normalized {
            shape: PayloadShape::Bare,
            value: id.to_string(),
        });
    }

    let (shape, record) = unwrap_shape(payload);
    let value = id_of(record).ok_or_else(|| {
        ServiceError::MalformedPayload(format!(
            "message-deleted without an id: {}",
            preview(payload)
        ))
    })?;
    Ok(Normalized { shape, value })
}

fn preview(payload: &Value) -> String {
    payload.to_string().chars().take(120).collect()
}
