use actix_web::{App, HttpResponse, HttpServer, web};
use chrono::Utc;
use common::api::ApiClient;
use common::chat::transport::ConnectOptions;
use common::chat::ws::WsConnector;
use common::chat::{ChatSession, ChatUpdate, ConnectionState};
use common::config::ServiceConfig;
use common::session::{LocalStore, SessionContext};
use common::{ServiceError, ServiceStatus, utils};
use entity::ChatMessage;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize)]
struct Snapshot {
    stream_id: String,
    connection: String,
    messages: Vec<ChatMessage>,
}

#[derive(Clone)]
struct AppState {
    service_status: Arc<RwLock<ServiceStatus>>,
    snapshot: Arc<RwLock<Snapshot>>,
}

struct ChatService {
    chat: ChatSession<ApiClient, WsConnector>,
    state: AppState,
}

impl ChatService {
    fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        info!("Initializing chat service");

        let stream_id = config
            .stream_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::Config("APP_STREAM_ID is required".to_string()))?;

        let mut store = match &config.storage_path {
            Some(path) => LocalStore::open(path)?,
            None => LocalStore::in_memory(),
        };
        let session = Arc::new(SessionContext::resolve(
            config.auth_token.as_deref(),
            config.cookies.as_deref(),
            &mut store,
        ));
        // Persist any invalid entries dropped during resolution
        store.save()?;

        let user_id = config
            .user_id
            .clone()
            .or_else(|| session.user_id().map(str::to_string));

        let api = ApiClient::new(
            config.api_base_url.clone(),
            session.clone(),
            config.request_timeout(),
        )?;
        let options = ConnectOptions::new(config.ws_url.clone(), stream_id.clone())
            .with_token(session.token())
            .with_user_id(user_id.as_deref());

        let chat = ChatSession::new(
            api,
            WsConnector::new(config.request_timeout()),
            options,
            config.reconnect_policy(),
        )
        .with_history_limit(config.history_limit);

        let state = AppState {
            service_status: Arc::new(RwLock::new(ServiceStatus::Starting)),
            snapshot: Arc::new(RwLock::new(Snapshot {
                stream_id,
                connection: connection_label(ConnectionState::Disconnected),
                messages: Vec::new(),
            })),
        };

        Ok(Self { chat, state })
    }

    async fn publish(&self) {
        let mut snapshot = self.state.snapshot.write().await;
        snapshot.connection = connection_label(self.chat.state());
        snapshot.messages = self.chat.messages().to_vec();
    }

    async fn run(&mut self) -> Result<(), ServiceError> {
        info!("Starting chat service for stream {}", self.chat.stream_id());

        self.chat.connect().await?;
        *self.state.service_status.write().await = ServiceStatus::Healthy;
        self.publish().await;
        info!(
            "Connected to chat with {} messages of history",
            self.chat.messages().len()
        );

        while let Some(update) = self.chat.next_update().await {
            match update {
                ChatUpdate::Added(message) => {
                    let name = utils::display_name(&message, self.chat.current_user_id());
                    info!("[{}] {}: {}", self.chat.stream_id(), name, message.message);
                }
                ChatUpdate::Liked(like) => {
                    info!(
                        "Message {} liked ({} likes)",
                        like.message_id,
                        like.likes.map_or("?".to_string(), |n| n.to_string())
                    );
                }
                ChatUpdate::Deleted(message_id) => {
                    info!("Message {} deleted", message_id);
                }
                ChatUpdate::Reconnected => {
                    info!("Chat reconnected");
                    *self.state.service_status.write().await = ServiceStatus::Healthy;
                }
                ChatUpdate::Failed { attempts } => {
                    error!("Chat connection lost after {} attempts", attempts);
                    *self.state.service_status.write().await = ServiceStatus::Degraded;
                }
            }
            self.publish().await;
        }

        match self.chat.state() {
            ConnectionState::Failed { attempts } => Err(ServiceError::ConnectionFailed { attempts }),
            _ => Ok(()),
        }
    }

    async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Initiating graceful shutdown");
        *self.state.service_status.write().await = ServiceStatus::ShuttingDown;

        self.chat.disconnect().await?;
        self.publish().await;

        info!("Cleanup completed, shutdown successful");
        Ok(())
    }
}

fn connection_label(state: ConnectionState) -> String {
    match state {
        ConnectionState::Disconnected => "disconnected".to_string(),
        ConnectionState::Connecting => "connecting".to_string(),
        ConnectionState::Connected => "connected".to_string(),
        ConnectionState::Failed { attempts } => format!("failed after {} attempts", attempts),
    }
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let status = state.service_status.read().await.clone();
    let snapshot = state.snapshot.read().await;
    let body = json!({
        "status": status,
        "stream": snapshot.stream_id,
        "connection": snapshot.connection,
        "timestamp": Utc::now()
    });

    match status {
        ServiceStatus::Healthy | ServiceStatus::Starting => HttpResponse::Ok().json(body),
        _ => HttpResponse::ServiceUnavailable().json(body),
    }
}

async fn messages(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.snapshot.read().await;
    HttpResponse::Ok().json(&*snapshot)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    // Load configuration
    let config = ServiceConfig::new().expect("Failed to load configuration");

    let mut service = ChatService::new(&config)?;

    let state = web::Data::new(service.state.clone());
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .route("/messages", web::get().to(messages))
    })
    .bind(("0.0.0.0", config.health_port))?
    .run();
    let server_handle = server.handle();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Health server error: {:?}", e);
            }
        }
        result = service.run() => {
            if let Err(e) = result {
                error!("Service error: {:?}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    if let Err(e) = service.shutdown().await {
        warn!("Shutdown error: {:?}", e);
    }
    server_handle.stop(true).await;

    Ok(())
}
