use super::{ApiClient, Endpoint, Method, ResourceTag};
use crate::ServiceError;
use entity::Paged;
use entity::post::{CreatePostRequest, Post, UpdatePostRequest};
use serde_json::Value;

pub struct PostEndpoints;

impl PostEndpoints {
    pub const LIST: Endpoint = Endpoint::query("/post/", &[ResourceTag::Post]);
    pub const MINE: Endpoint = Endpoint::query("/post/my-post", &[ResourceTag::Post]);
    pub const SINGLE: Endpoint = Endpoint::query("/post/{id}", &[ResourceTag::Post]);
    pub const CREATE: Endpoint = Endpoint::mutation(Method::Post, "/post/", &[ResourceTag::Post]);
    pub const UPDATE: Endpoint =
        Endpoint::mutation(Method::Patch, "/post/{id}", &[ResourceTag::Post]);
    pub const DELETE: Endpoint =
        Endpoint::mutation(Method::Delete, "/post/{id}", &[ResourceTag::Post]);
}

impl ApiClient {
    pub async fn all_posts(&self) -> Result<Vec<Post>, ServiceError> {
        let page: Paged<Post> = self.call_empty(&PostEndpoints::LIST, &[]).await?;
        Ok(page.data)
    }

    pub async fn my_posts(&self) -> Result<Vec<Post>, ServiceError> {
        let page: Paged<Post> = self.call_empty(&PostEndpoints::MINE, &[]).await?;
        Ok(page.data)
    }

    pub async fn post(&self, id: &str) -> Result<Post, ServiceError> {
        self.call_empty(&PostEndpoints::SINGLE, &[id]).await
    }

    pub async fn create_post(&self, request: &CreatePostRequest) -> Result<Post, ServiceError> {
        if request.content.trim().is_empty() && request.media_source.is_empty() {
            return Err(ServiceError::Validation(
                "A post needs content or media".to_string(),
            ));
        }
        self.call(&PostEndpoints::CREATE, &[], &[], Some(request))
            .await
    }

    pub async fn update_post(
        &self,
        id: &str,
        request: &UpdatePostRequest,
    ) -> Result<Post, ServiceError> {
        self.call(&PostEndpoints::UPDATE, &[id], &[], Some(request))
            .await
    }

    pub async fn delete_post(&self, id: &str) -> Result<(), ServiceError> {
        // Some deployments echo the deleted record
        let _: Value = self.call_empty(&PostEndpoints::DELETE, &[id]).await?;
        Ok(())
    }
}
