use super::{ApiClient, Endpoint, Method, ResourceTag};
use crate::ServiceError;
use crate::lifecycle::StreamBackend;
use async_trait::async_trait;
use entity::stream::CreateStreamRequest;
use entity::{RtcRole, RtcToken, Stream};
use serde_json::Value;

pub struct LivestreamEndpoints;

impl LivestreamEndpoints {
    pub const LIST: Endpoint = Endpoint::query("/livestream", &[ResourceTag::Stream]);
    pub const CREATE: Endpoint =
        Endpoint::mutation(Method::Post, "/livestream", &[ResourceTag::Stream]);
    pub const START: Endpoint =
        Endpoint::mutation(Method::Post, "/livestream/{id}/start", &[ResourceTag::Stream]);
    pub const END: Endpoint =
        Endpoint::mutation(Method::Post, "/livestream/{id}/end", &[ResourceTag::Stream]);
    pub const CANCEL: Endpoint =
        Endpoint::mutation(Method::Post, "/livestream/{id}/cancel", &[ResourceTag::Stream]);
    pub const TOKEN: Endpoint = Endpoint::query("/livestream/{id}/token", &[]);
}

#[async_trait]
impl StreamBackend for ApiClient {
    async fn list_streams(&self) -> Result<Vec<Stream>, ServiceError> {
        self.call_empty(&LivestreamEndpoints::LIST, &[]).await
    }

    async fn create_stream(&self, request: &CreateStreamRequest) -> Result<Stream, ServiceError> {
        self.call(&LivestreamEndpoints::CREATE, &[], &[], Some(request))
            .await
    }

    async fn start_stream(&self, stream_id: &str) -> Result<(), ServiceError> {
        let _: Value = self
            .call_empty(&LivestreamEndpoints::START, &[stream_id])
            .await?;
        Ok(())
    }

    async fn end_stream(&self, stream_id: &str) -> Result<(), ServiceError> {
        let _: Value = self
            .call_empty(&LivestreamEndpoints::END, &[stream_id])
            .await?;
        Ok(())
    }

    async fn cancel_stream(&self, stream_id: &str) -> Result<(), ServiceError> {
        let _: Value = self
            .call_empty(&LivestreamEndpoints::CANCEL, &[stream_id])
            .await?;
        Ok(())
    }

    async fn rtc_token(&self, stream_id: &str, role: RtcRole) -> Result<RtcToken, ServiceError> {
        let query = [("role", role.as_str().to_string())];
        let mut token: RtcToken = self
            .call::<(), _>(&LivestreamEndpoints::TOKEN, &[stream_id], &query, None)
            .await?;
        // Older backends omit the role; the one requested is the one issued.
        if token.role.is_none() {
            token.role = Some(role);
        }
        Ok(token)
    }
}
