use super::{ApiClient, Endpoint, ResourceTag};
use crate::ServiceError;
use entity::User;

pub struct UserEndpoints;

impl UserEndpoints {
    pub const ME: Endpoint = Endpoint::query("/user/me", &[ResourceTag::User]);
    pub const SINGLE: Endpoint = Endpoint::query("/user/{id}", &[ResourceTag::User]);
}

impl ApiClient {
    pub async fn current_user(&self) -> Result<User, ServiceError> {
        self.call_empty(&UserEndpoints::ME, &[]).await
    }

    pub async fn user(&self, id: &str) -> Result<User, ServiceError> {
        self.call_empty(&UserEndpoints::SINGLE, &[id]).await
    }
}
