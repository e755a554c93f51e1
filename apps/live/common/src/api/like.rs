//! Like endpoints.
//!
//! The backend answers these routes in more than one shape, so responses are
//! read as raw JSON and interpreted here rather than deserialized directly.

use super::{ApiClient, Endpoint, Method, ResourceTag};
use crate::ServiceError;
use entity::like::{Like, LikeStatus, LikeTarget, ToggleLikeRequest};
use serde_json::Value;
use tracing::warn;

pub struct LikeEndpoints;

impl LikeEndpoints {
    pub const TOGGLE: Endpoint =
        Endpoint::mutation(Method::Post, "/like/toggle", &[ResourceTag::Like]);
    pub const LIST: Endpoint = Endpoint::query("/like/{type}/{id}", &[ResourceTag::Like]);
    pub const STATUS: Endpoint =
        Endpoint::query("/like/status/{type}/{id}", &[ResourceTag::Like]);
}

impl ApiClient {
    pub async fn toggle_like(
        &self,
        target: LikeTarget,
        target_id: &str,
    ) -> Result<LikeStatus, ServiceError> {
        let request = ToggleLikeRequest {
            target_id: target_id.to_string(),
            target_type: target,
        };
        let data: Value = self
            .call(&LikeEndpoints::TOGGLE, &[], &[], Some(&request))
            .await?;
        Ok(like_status(&data, false))
    }

    pub async fn likes(&self, target: LikeTarget, target_id: &str) -> Result<Vec<Like>, ServiceError> {
        let data: Value = self
            .call_empty(&LikeEndpoints::LIST, &[target.as_str(), target_id])
            .await?;
        Ok(like_list(data))
    }

    pub async fn like_status(
        &self,
        target: LikeTarget,
        target_id: &str,
    ) -> Result<LikeStatus, ServiceError> {
        let data: Value = self
            .call_empty(&LikeEndpoints::STATUS, &[target.as_str(), target_id])
            .await?;
        Ok(like_status(&data, true))
    }

    pub async fn like_count(&self, target: LikeTarget, target_id: &str) -> Result<u64, ServiceError> {
        let data: Value = self
            .call_empty(&LikeEndpoints::LIST, &[target.as_str(), target_id])
            .await?;
        Ok(like_count(&data))
    }
}

/// `liked` comes from `liked`, then `isLiked`, then the presence of `like`.
/// Status lookups only trust the attached record when `isLiked` is set.
fn like_status(data: &Value, require_is_liked: bool) -> LikeStatus {
    let like_value = data.get("like").filter(|v| !v.is_null());

    let liked = data
        .get("liked")
        .and_then(Value::as_bool)
        .or_else(|| data.get("isLiked").and_then(Value::as_bool))
        .unwrap_or(like_value.is_some());

    let keep_record = !require_is_liked || data.get("isLiked").and_then(Value::as_bool) == Some(true);
    let like = like_value
        .filter(|_| keep_record)
        .and_then(|v| match serde_json::from_value::<Like>(v.clone()) {
            Ok(like) => Some(like),
            Err(e) => {
                warn!("Ignoring unreadable like record: {}", e);
                None
            }
        });

    LikeStatus { liked, like }
}

fn like_list(data: Value) -> Vec<Like> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("likes") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

fn like_count(data: &Value) -> u64 {
    if let Some(n) = data.as_u64() {
        return n;
    }
    if let Some(items) = data.as_array() {
        return items.len() as u64;
    }
    if let Some(n) = data.get("count").and_then(Value::as_u64) {
        return n;
    }
    if let Some(items) = data.get("likes").and_then(Value::as_array) {
        return items.len() as u64;
    }
    data.get("total").and_then(Value::as_u64).unwrap_or(0)
}
