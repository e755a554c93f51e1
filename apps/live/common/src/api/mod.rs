//! REST API clients.
//!
//! Every resource module declares its endpoints as [`Endpoint`] constants and
//! adds typed methods to [`ApiClient`].

pub mod auth;
pub mod chat;
pub mod comment;
pub mod like;
pub mod livestream;
pub mod post;
pub mod user;

use crate::ServiceError;
use crate::session::SessionContext;
use entity::ApiEnvelope;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Resource families used to signal which cached views a mutation made stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTag {
    Post,
    Comment,
    Like,
    User,
    Stream,
    ChatMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Declarative description of one REST endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub method: Method,
    /// Path template; `{name}` segments are filled positionally.
    pub path: &'static str,
    pub provides: &'static [ResourceTag],
    pub invalidates: &'static [ResourceTag],
    pub authenticated: bool,
}

impl Endpoint {
    pub const fn query(path: &'static str, provides: &'static [ResourceTag]) -> Self {
        Self {
            method: Method::Get,
            path,
            provides,
            invalidates: &[],
            authenticated: true,
        }
    }

    pub const fn mutation(
        method: Method,
        path: &'static str,
        invalidates: &'static [ResourceTag],
    ) -> Self {
        Self {
            method,
            path,
            provides: &[],
            invalidates,
            authenticated: true,
        }
    }

    /// Whether a cached response of this endpoint goes stale once `tag` is
    /// invalidated.
    pub fn is_stale_after(&self, tag: ResourceTag) -> bool {
        self.provides.contains(&tag)
    }

    pub const fn public(self) -> Self {
        Self {
            authenticated: false,
            ..self
        }
    }

    /// Fills the `{...}` placeholders of the path template in order.
    pub fn render(&self, params: &[&str]) -> Result<String, ServiceError> {
        let mut rendered = String::with_capacity(self.path.len());
        let mut params = params.iter();
        let mut rest = self.path;

        while let Some(start) = rest.find('{') {
            let end = rest[start..]
                .find('}')
                .map(|offset| start + offset)
                .ok_or_else(|| ServiceError::Config(format!("Unclosed placeholder in {}", self.path)))?;
            let value = params.next().ok_or_else(|| {
                ServiceError::Validation(format!("Missing path parameter for {}", self.path))
            })?;
            if value.is_empty() {
                return Err(ServiceError::Validation(format!(
                    "Empty path parameter for {}",
                    self.path
                )));
            }
            rendered.push_str(&rest[..start]);
            rendered.push_str(value);
            rest = &rest[end + 1..];
        }
        rendered.push_str(rest);

        Ok(rendered)
    }
}

/// HTTP client shared by every resource module.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionContext>,
    invalidations: broadcast::Sender<ResourceTag>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<SessionContext>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        let (invalidations, _) = broadcast::channel(64);

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            invalidations,
        })
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Tags made stale by successful mutations.
    pub fn invalidations(&self) -> broadcast::Receiver<ResourceTag> {
        self.invalidations.subscribe()
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, endpoint: &Endpoint, path: &str) -> Result<RequestBuilder, ServiceError> {
        let url = self.url(path);
        let builder = match endpoint.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };

        if endpoint.authenticated {
            Ok(builder.header(reqwest::header::AUTHORIZATION, self.session.require_bearer()?))
        } else {
            Ok(match self.session.bearer() {
                Some(bearer) => builder.header(reqwest::header::AUTHORIZATION, bearer),
                None => builder,
            })
        }
    }

    /// Sends a request and unwraps the `{ success, message, data }` envelope.
    pub(crate) async fn call<B, T>(
        &self,
        endpoint: &Endpoint,
        params: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = endpoint.render(params)?;
        let mut builder = self.request(endpoint, &path)?;
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!("{:?} {}", endpoint.method, path);
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let data = unwrap_envelope(status, &text)?;
        let value = serde_json::from_value(data)?;

        for tag in endpoint.invalidates {
            // No subscribers is fine
            let _ = self.invalidations.send(*tag);
        }

        Ok(value)
    }

    pub(crate) async fn call_empty<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        params: &[&str],
    ) -> Result<T, ServiceError> {
        self.call::<Value, T>(endpoint, params, &[], None).await
    }
}

fn unwrap_envelope(status: StatusCode, text: &str) -> Result<Value, ServiceError> {
    let envelope = match serde_json::from_str::<ApiEnvelope<Value>>(text) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => {
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }
    };

    if !status.is_success() || !envelope.success {
        let message = if envelope.message.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        } else {
            envelope.message
        };
        return Err(ServiceError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(envelope.data.unwrap_or(Value::Null))
}
