//! Token and session store.
//!
//! The bearer token is resolved once at startup and shared by reference with
//! every client. Resolution order:
//!
//! 1. explicit state (configuration or a fresh login),
//! 2. the persisted `buddiAuth` blob,
//! 3. cookie `token`, then cookie `authToken`,
//! 4. persisted `token`, then persisted `authToken`.

use crate::ServiceError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use entity::{AuthSession, User};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const AUTH_BLOB_KEY: &str = "buddiAuth";
pub const TOKEN_KEY: &str = "token";
pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const USER_DATA_KEY: &str = "userData";
pub const USER_ROLE_KEY: &str = "userRole";
pub const IS_AUTHENTICATED_KEY: &str = "isAuthenticated";

/// Key/value persistence for auth data, backed by a JSON file.
#[derive(Debug, Default)]
pub struct LocalStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, String>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the store at `path`. A missing file is an empty store; an
    /// unreadable one is discarded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable store {}: {}", path.display(), e);
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn save(&self) -> Result<(), ServiceError> {
        if let Some(path) = &self.path {
            fs::write(path, serde_json::to_string_pretty(&self.entries)?)?;
        }
        Ok(())
    }
}

/// Where the active token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    State,
    PersistedSession,
    Cookie(&'static str),
    Storage(&'static str),
}

/// Claims read from the token payload. The signature is not verified here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    #[serde(default)]
    pub auth_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Resolved credentials shared by all API and realtime clients.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    token: Option<String>,
    source: Option<TokenSource>,
    user: Option<User>,
    claims: Option<TokenClaims>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Session built from a freshly issued token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::build(Some((token.into(), TokenSource::State)), None)
    }

    /// Resolves the session from explicit state, a `Cookie` header value and the store.
    pub fn resolve(state: Option<&str>, cookies: Option<&str>, store: &mut LocalStore) -> Self {
        let persisted = restore_auth(store);

        let token = state
            .filter(|t| !t.is_empty())
            .map(|t| (t.to_string(), TokenSource::State))
            .or_else(|| {
                persisted
                    .as_ref()
                    .and_then(|p| p.token.clone())
                    .map(|t| (t, TokenSource::PersistedSession))
            })
            .or_else(|| {
                [TOKEN_KEY, AUTH_TOKEN_KEY].into_iter().find_map(|key| {
                    cookies
                        .and_then(|header| cookie_value(header, key))
                        .map(|t| (t, TokenSource::Cookie(key)))
                })
            })
            .or_else(|| {
                [TOKEN_KEY, AUTH_TOKEN_KEY].into_iter().find_map(|key| {
                    store
                        .get(key)
                        .map(|t| (t.to_string(), TokenSource::Storage(key)))
                })
            });

        match &token {
            Some((_, source)) => info!("Resolved auth token from {:?}", source),
            None => info!("No auth token found, continuing anonymously"),
        }

        Self::build(token, persisted.and_then(|p| p.user))
    }

    fn build(token: Option<(String, TokenSource)>, user: Option<User>) -> Self {
        let claims = token.as_ref().and_then(|(t, _)| match decode_claims(t) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!("Token payload not decodable: {}", e);
                None
            }
        });

        let (token, source) = match token {
            Some((t, s)) => (Some(t), Some(s)),
            None => (None, None),
        };

        Self {
            token,
            source,
            user,
            claims,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn source(&self) -> Option<TokenSource> {
        self.source
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn claims(&self) -> Option<&TokenClaims> {
        self.claims.as_ref()
    }

    /// The current user's id: the token's `authId`, else the stored profile id.
    pub fn user_id(&self) -> Option<&str> {
        self.claims
            .as_ref()
            .and_then(|c| c.auth_id.as_deref())
            .or_else(|| self.user.as_ref().map(|u| u.id.as_str()))
            .filter(|id| !id.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn bearer(&self) -> Option<String> {
        as_bearer(self.token.as_deref())
    }

    pub fn require_bearer(&self) -> Result<String, ServiceError> {
        self.bearer().ok_or(ServiceError::Unauthenticated)
    }
}

/// Formats a token as an `Authorization` value without double-prefixing.
pub fn as_bearer(token: Option<&str>) -> Option<String> {
    match token {
        Some(t) if t.starts_with("Bearer ") => Some(t.to_string()),
        Some(t) if !t.is_empty() => Some(format!("Bearer {}", t)),
        _ => None,
    }
}

/// Decodes the (unverified) JWT payload.
pub fn decode_claims(token: &str) -> Result<TokenClaims, ServiceError> {
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ServiceError::ParseError("Token is not a JWT".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ServiceError::ParseError(format!("Token payload: {}", e)))?;

    Ok(serde_json::from_slice(&bytes)?)
}

fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

struct PersistedAuth {
    token: Option<String>,
    user: Option<User>,
}

/// Restores the persisted auth blob, falling back to the separate
/// `token` + `userData` keys. Unparseable entries are removed.
fn restore_auth(store: &mut LocalStore) -> Option<PersistedAuth> {
    if let Some(raw) = store.get(AUTH_BLOB_KEY).map(str::to_string) {
        return match serde_json::from_str::<AuthSession>(&raw) {
            Ok(session) if !session.token.is_empty() && session.user.is_some() => {
                Some(PersistedAuth {
                    token: Some(session.token),
                    user: session.user,
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Clearing invalid {}: {}", AUTH_BLOB_KEY, e);
                store.remove(AUTH_BLOB_KEY);
                None
            }
        };
    }

    let token = store.get(TOKEN_KEY)?.to_string();
    let raw_user = store.get(USER_DATA_KEY)?.to_string();

    match serde_json::from_str::<User>(&raw_user) {
        Ok(user) => Some(PersistedAuth {
            token: Some(token),
            user: Some(user),
        }),
        Err(e) => {
            warn!("Clearing invalid {}: {}", USER_DATA_KEY, e);
            store.remove(USER_DATA_KEY);
            None
        }
    }
}

/// Persists a login result under every key the rest of the app reads.
pub fn persist_auth_data(store: &mut LocalStore, auth: &AuthSession) -> Result<(), ServiceError> {
    store.set(AUTH_BLOB_KEY, serde_json::to_string(auth)?);
    if !auth.token.is_empty() {
        store.set(TOKEN_KEY, auth.token.clone());
    }
    if let Some(user) = &auth.user {
        store.set(USER_DATA_KEY, serde_json::to_string(user)?);
        if let Some(role) = &user.role {
            store.set(USER_ROLE_KEY, role.clone());
        }
    }
    store.save()
}

pub fn clear_auth_data(store: &mut LocalStore) -> Result<(), ServiceError> {
    for key in [
        AUTH_BLOB_KEY,
        TOKEN_KEY,
        USER_DATA_KEY,
        USER_ROLE_KEY,
        IS_AUTHENTICATED_KEY,
    ] {
        store.remove(key);
    }
    store.save()
}
