use super::{ApiClient, Endpoint, Method, ResourceTag};
use crate::ServiceError;
use entity::comment::{Comment, CommentPage, CreateCommentRequest, UpdateCommentRequest};
use serde_json::Value;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

pub struct CommentEndpoints;

impl CommentEndpoints {
    pub const BY_POST: Endpoint = Endpoint::query("/comment/post/{postId}", &[ResourceTag::Comment]);
    pub const REPLIES: Endpoint =
        Endpoint::query("/comment/replies/{commentId}", &[ResourceTag::Comment]);
    pub const CREATE: Endpoint =
        Endpoint::mutation(Method::Post, "/comment/", &[ResourceTag::Comment]);
    pub const UPDATE: Endpoint =
        Endpoint::mutation(Method::Put, "/comment/{id}", &[ResourceTag::Comment]);
    pub const DELETE: Endpoint =
        Endpoint::mutation(Method::Delete, "/comment/{id}", &[ResourceTag::Comment]);
}

impl ApiClient {
    /// One page of a post's comments; `None` uses page 1 / limit 10.
    pub async fn comments_by_post(
        &self,
        post_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<CommentPage, ServiceError> {
        let query = [
            ("page", page.unwrap_or(DEFAULT_PAGE).to_string()),
            ("limit", limit.unwrap_or(DEFAULT_LIMIT).to_string()),
        ];
        self.call::<(), _>(&CommentEndpoints::BY_POST, &[post_id], &query, None)
            .await
    }

    pub async fn replies(&self, comment_id: &str) -> Result<Vec<Comment>, ServiceError> {
        self.call_empty(&CommentEndpoints::REPLIES, &[comment_id])
            .await
    }

    pub async fn create_comment(
        &self,
        request: &CreateCommentRequest,
    ) -> Result<Comment, ServiceError> {
        if request.content.trim().is_empty() {
            return Err(ServiceError::Validation("Comment is empty".to_string()));
        }
        self.call(&CommentEndpoints::CREATE, &[], &[], Some(request))
            .await
    }

    pub async fn update_comment(
        &self,
        id: &str,
        request: &UpdateCommentRequest,
    ) -> Result<Comment, ServiceError> {
        self.call(&CommentEndpoints::UPDATE, &[id], &[], Some(request))
            .await
    }

    pub async fn delete_comment(&self, id: &str) -> Result<(), ServiceError> {
        let _: Value = self.call_empty(&CommentEndpoints::DELETE, &[id]).await?;
        Ok(())
    }
}
