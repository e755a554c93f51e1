//! Stream lifecycle coordinator.
//!
//! Sequences the REST lifecycle calls of a stream with the media session:
//! `create → start → end` for the streamer, `watch → stop_watching` for a
//! viewer.

use crate::ServiceError;
use crate::media::{MediaMode, MediaSession};
use crate::media::rtc::{MediaConstraints, MediaDevices, RtcClient, RtcEvent};
use crate::session::SessionContext;
use crate::utils::generate_channel_name;
use async_trait::async_trait;
use entity::stream::CreateStreamRequest;
use entity::{RtcRole, RtcToken, Stream, StreamStatus, StreamType};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// REST operations of the live stream resource.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    async fn list_streams(&self) -> Result<Vec<Stream>, ServiceError>;
    async fn create_stream(&self, request: &CreateStreamRequest) -> Result<Stream, ServiceError>;
    async fn start_stream(&self, stream_id: &str) -> Result<(), ServiceError>;
    async fn end_stream(&self, stream_id: &str) -> Result<(), ServiceError>;
    async fn cancel_stream(&self, stream_id: &str) -> Result<(), ServiceError>;
    async fn rtc_token(&self, stream_id: &str, role: RtcRole) -> Result<RtcToken, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Creating,
    Created,
    Starting,
    Live,
    Ending,
    Ended,
    Cancelled,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Creating => "creating",
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Live => "live",
            LifecycleState::Ending => "ending",
            LifecycleState::Ended => "ended",
            LifecycleState::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

impl LifecycleState {
    fn is_broadcasting(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting | LifecycleState::Live | LifecycleState::Ending
        )
    }
}

/// Parameters for a new stream.
#[derive(Debug, Clone)]
pub struct NewStream {
    pub title: String,
    pub description: String,
    pub event_id: Option<String>,
    pub stream_type: StreamType,
    pub chat_enabled: bool,
    /// Generated as `stream_<millis>` when absent.
    pub channel_name: Option<String>,
}

impl NewStream {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            event_id: None,
            stream_type: StreamType::Public,
            chat_enabled: true,
            channel_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn into_request(self) -> CreateStreamRequest {
        CreateStreamRequest {
            event_id: self.event_id,
            title: self.title.trim().to_string(),
            description: self.description,
            stream_type: self.stream_type,
            chat_enabled: self.chat_enabled,
            channel_name: self.channel_name.unwrap_or_else(generate_channel_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOutcome {
    pub stream_id: String,
    /// False when the backend could not be told; the local session ended anyway.
    pub backend_confirmed: bool,
}

pub struct StreamCoordinator<B, C, D> {
    backend: B,
    media: MediaSession<C, D>,
    session: Arc<SessionContext>,
    constraints: MediaConstraints,
    state: LifecycleState,
    stream: Option<Stream>,
    watching: Option<Stream>,
    streams: Vec<Stream>,
}

impl<B, C, D> StreamCoordinator<B, C, D>
where
    B: StreamBackend,
    C: RtcClient,
    D: MediaDevices,
{
    pub fn new(backend: B, media: MediaSession<C, D>, session: Arc<SessionContext>) -> Self {
        Self {
            backend,
            media,
            session,
            constraints: MediaConstraints::default(),
            state: LifecycleState::Idle,
            stream: None,
            watching: None,
            streams: Vec::new(),
        }
    }

    pub fn with_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn current_stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    pub fn watching(&self) -> Option<&Stream> {
        self.watching.as_ref()
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn media(&self) -> &MediaSession<C, D> {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut MediaSession<C, D> {
        &mut self.media
    }

    pub fn is_streamer(&self, stream: &Stream) -> bool {
        !stream.streamer.id.is_empty() && self.session.user_id() == Some(stream.streamer.id.as_str())
    }

    pub async fn refresh_streams(&mut self) -> Result<&[Stream], ServiceError> {
        self.streams = self.backend.list_streams().await?;
        Ok(&self.streams)
    }

    pub async fn create(&mut self, new_stream: NewStream) -> Result<Stream, ServiceError> {
        if new_stream.title.trim().is_empty() {
            return Err(ServiceError::Validation("Please enter a stream title".to_string()));
        }
        self.ensure(
            !matches!(self.state, LifecycleState::Creating) && !self.state.is_broadcasting(),
            "create a stream",
        )?;

        let previous = self.state;
        self.state = LifecycleState::Creating;

        match self.backend.create_stream(&new_stream.into_request()).await {
            Ok(stream) => {
                info!("Created stream {} ({})", stream.stream_id(), stream.title);
                self.stream = Some(stream.clone());
                self.state = LifecycleState::Created;
                Ok(stream)
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    /// Picks an existing stream of the current user to start.
    pub fn select(&mut self, stream: Stream) -> Result<(), ServiceError> {
        self.ensure(
            !matches!(self.state, LifecycleState::Creating) && !self.state.is_broadcasting(),
            "select a stream",
        )?;
        self.stream = Some(stream);
        self.state = LifecycleState::Created;
        Ok(())
    }

    /// Creates a stream with a default title and goes live immediately.
    pub async fn quick_start(&mut self) -> Result<u32, ServiceError> {
        let new_stream = NewStream::titled("Live Broadcast").with_description("Started broadcasting now");
        self.create(new_stream).await?;
        self.start().await
    }

    /// Starts the selected stream and begins broadcasting. Returns the RTC uid.
    pub async fn start(&mut self) -> Result<u32, ServiceError> {
        self.ensure(self.state == LifecycleState::Created, "start")?;
        let stream_id = self.selected_id()?;

        // A viewer session stays attached until broadcasting replaces it
        self.state = LifecycleState::Starting;
        match self.go_live(&stream_id).await {
            Ok(uid) => {
                if let Some(watching) = self.watching.take() {
                    info!("Left stream {} to broadcast", watching.stream_id());
                }
                if let Some(stream) = self.stream.as_mut() {
                    stream.is_live = true;
                    stream.stream_status = StreamStatus::Live;
                }
                self.state = LifecycleState::Live;
                info!("Stream {} is live", stream_id);
                Ok(uid)
            }
            Err(e) => {
                if self.media.mode() != MediaMode::Viewing {
                    self.watching = None;
                }
                self.state = LifecycleState::Created;
                Err(e)
            }
        }
    }

    async fn go_live(&mut self, stream_id: &str) -> Result<u32, ServiceError> {
        match self.backend.start_stream(stream_id).await {
            Ok(()) => {}
            Err(e) if e.is_already_live() => {
                info!("Stream {} was already live, joining it", stream_id);
            }
            Err(e) => return Err(e),
        }

        let token = self
            .backend
            .rtc_token(stream_id, RtcRole::Broadcaster)
            .await?;
        let uid = self.media.start_broadcast(&token, &self.constraints).await?;
        Ok(uid)
    }

    /// Stops broadcasting and ends the stream. Media is released first; a
    /// failed REST call is reported in the outcome but never keeps the
    /// session live.
    pub async fn end(&mut self) -> Result<EndOutcome, ServiceError> {
        self.ensure(self.state == LifecycleState::Live, "end")?;
        let stream_id = self.selected_id()?;
        self.state = LifecycleState::Ending;

        if let Err(e) = self.media.teardown().await {
            warn!("Media teardown for stream {} reported: {}", stream_id, e);
        }

        let backend_confirmed = match self.backend.end_stream(&stream_id).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to end stream {} on the backend: {}", stream_id, e);
                false
            }
        };

        if let Some(stream) = self.stream.as_mut() {
            stream.is_live = false;
            stream.stream_status = StreamStatus::Ended;
        }
        self.state = LifecycleState::Ended;
        info!("Stream {} ended", stream_id);

        Ok(EndOutcome {
            stream_id,
            backend_confirmed,
        })
    }

    /// Cancels a created stream that never went live.
    pub async fn cancel(&mut self) -> Result<(), ServiceError> {
        self.ensure(self.state == LifecycleState::Created, "cancel")?;
        let stream_id = self.selected_id()?;

        self.backend.cancel_stream(&stream_id).await?;
        if let Some(stream) = self.stream.as_mut() {
            stream.stream_status = StreamStatus::Cancelled;
        }
        self.state = LifecycleState::Cancelled;
        info!("Stream {} cancelled", stream_id);
        Ok(())
    }

    /// Joins a live stream as a viewer. Streams that are not live are refused
    /// before any token is requested.
    pub async fn watch(&mut self, stream: &Stream) -> Result<u32, ServiceError> {
        if !stream.is_live {
            return Err(ServiceError::StreamNotLive(stream.stream_id().to_string()));
        }
        self.ensure(!self.state.is_broadcasting(), "watch a stream")?;

        let stream_id = stream.stream_id().to_string();
        let token = self.backend.rtc_token(&stream_id, RtcRole::Viewer).await?;
        let uid = self.media.join_as_viewer(&token).await?;

        self.watching = Some(stream.clone());
        info!("Watching stream {}", stream_id);
        Ok(uid)
    }

    pub async fn stop_watching(&mut self) -> Result<(), ServiceError> {
        if let Some(stream) = self.watching.take() {
            self.media.leave().await?;
            info!("Stopped watching stream {}", stream.stream_id());
        }
        Ok(())
    }

    pub async fn handle_rtc_event(&mut self, event: RtcEvent) -> Result<(), ServiceError> {
        Ok(self.media.handle_event(event).await?)
    }

    fn selected_id(&self) -> Result<String, ServiceError> {
        self.stream
            .as_ref()
            .map(|stream| stream.stream_id().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::Validation("No stream selected".to_string()))
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> Result<(), ServiceError> {
        if allowed {
            Ok(())
        } else {
            Err(ServiceError::InvalidTransition {
                from: self.state.to_string(),
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Device;
    use crate::media::MediaMode;
    use crate::testkit::{
        CallLog, FakeDevices, FakeRtcClient, FakeStreamBackend, StartBehavior, media_fakes, stream,
    };
    use crate::MediaError;

    type Coordinator = StreamCoordinator<FakeStreamBackend, FakeRtcClient, FakeDevices>;

    fn coordinator(backend: FakeStreamBackend) -> (Coordinator, CallLog) {
        let (client, devices, media_log) = media_fakes();
        let media = MediaSession::new(client, devices, "app-id");
        let session = Arc::new(SessionContext::with_token(crate::testkit::token_for("me")));
        (StreamCoordinator::new(backend, media, session), media_log)
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title_locally() {
        let backend = FakeStreamBackend::new();
        let log = backend.log();
        let (mut live, _) = coordinator(backend);

        let err = live.create(NewStream::titled("   ")).await.unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(log.entries().is_empty());
        assert_eq!(live.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_create_generates_channel_name() {
        let backend = FakeStreamBackend::new();
        let requests = backend.requests();
        let (mut live, _) = coordinator(backend);

        live.create(NewStream::titled("Morning show")).await.unwrap();

        let requests = requests.lock().unwrap();
        assert!(requests[0].channel_name.starts_with("stream_"));
        assert!(requests[0].chat_enabled);
        assert_eq!(live.state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn test_start_fetches_fresh_token_then_broadcasts() {
        let backend = FakeStreamBackend::new();
        let log = backend.log();
        let (mut live, media_log) = coordinator(backend);
        live.create(NewStream::titled("Show")).await.unwrap();

        live.start().await.unwrap();

        assert_eq!(live.state(), LifecycleState::Live);
        assert!(live.current_stream().unwrap().is_live);
        assert_eq!(
            log.entries(),
            vec!["create Show", "start s1", "token s1 broadcaster"]
        );
        assert!(media_log.entries().contains(&"publish video,audio".to_string()));
    }

    #[tokio::test]
    async fn test_already_live_is_treated_as_started() {
        let backend = FakeStreamBackend::new().start_behavior(StartBehavior::AlreadyLive);
        let (mut live, _) = coordinator(backend);
        live.create(NewStream::titled("Show")).await.unwrap();

        live.start().await.unwrap();

        assert_eq!(live.state(), LifecycleState::Live);
        assert_eq!(live.media().mode(), MediaMode::Broadcasting);
    }

    #[tokio::test]
    async fn test_failed_start_returns_to_created() {
        let backend = FakeStreamBackend::new().start_behavior(StartBehavior::Fail);
        let log = backend.log();
        let (mut live, media_log) = coordinator(backend);
        live.create(NewStream::titled("Show")).await.unwrap();

        assert!(matches!(
            live.start().await,
            Err(ServiceError::Api { status: 500, .. })
        ));
        assert_eq!(live.state(), LifecycleState::Created);
        assert!(!log.entries().iter().any(|e| e.starts_with("token")));
        assert!(media_log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_hardware_failure_allows_retry() {
        let backend = FakeStreamBackend::new();
        let (client, devices, _) = media_fakes();
        let devices = devices.fail_camera(MediaError::DeviceInUse(Device::Camera));
        let media = MediaSession::new(client, devices, "app-id");
        let mut live = StreamCoordinator::new(backend, media, Arc::new(SessionContext::anonymous()));
        live.create(NewStream::titled("Show")).await.unwrap();

        let err = live.start().await.unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Media(MediaError::DeviceInUse(Device::Camera))
        ));
        assert_eq!(live.state(), LifecycleState::Created);
    }

    #[tokio::test]
    async fn test_end_tears_down_media_before_rest() {
        let backend = FakeStreamBackend::new();
        let log = backend.log();
        let (mut live, media_log) = coordinator(backend);
        live.quick_start().await.unwrap();
        media_log.clear();
        log.clear();

        let outcome = live.end().await.unwrap();

        assert!(outcome.backend_confirmed);
        assert_eq!(log.entries(), vec!["end s1"]);
        assert_eq!(media_log.entries().last().map(String::as_str), Some("leave"));
        assert_eq!(live.state(), LifecycleState::Ended);
    }

    #[tokio::test]
    async fn test_end_reaches_ended_when_backend_fails() {
        let backend = FakeStreamBackend::new().fail_end();
        let (mut live, _) = coordinator(backend);
        live.quick_start().await.unwrap();

        let outcome = live.end().await.unwrap();

        assert!(!outcome.backend_confirmed);
        assert_eq!(live.state(), LifecycleState::Ended);
        assert!(!live.media().is_joined());
    }

    #[tokio::test]
    async fn test_illegal_transitions() {
        let (mut live, _) = coordinator(FakeStreamBackend::new());

        assert!(matches!(
            live.start().await,
            Err(ServiceError::InvalidTransition { action: "start", .. })
        ));
        assert!(matches!(
            live.end().await,
            Err(ServiceError::InvalidTransition { action: "end", .. })
        ));

        live.quick_start().await.unwrap();
        assert!(matches!(
            live.cancel().await,
            Err(ServiceError::InvalidTransition { action: "cancel", .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_created_stream() {
        let backend = FakeStreamBackend::new();
        let log = backend.log();
        let (mut live, _) = coordinator(backend);
        live.create(NewStream::titled("Later")).await.unwrap();

        live.cancel().await.unwrap();

        assert_eq!(live.state(), LifecycleState::Cancelled);
        assert_eq!(log.entries().last().map(String::as_str), Some("cancel s1"));
    }

    #[tokio::test]
    async fn test_watch_refuses_offline_stream_without_network() {
        let backend = FakeStreamBackend::new();
        let log = backend.log();
        let (mut live, media_log) = coordinator(backend);

        let err = live.watch(&stream("s9", false, "other")).await.unwrap_err();

        assert!(matches!(err, ServiceError::StreamNotLive(ref id) if id == "s9"));
        assert!(log.entries().is_empty());
        assert!(media_log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_watch_and_stop() {
        let backend = FakeStreamBackend::new();
        let log = backend.log();
        let (mut live, media_log) = coordinator(backend);

        live.watch(&stream("s9", true, "other")).await.unwrap();

        assert_eq!(log.entries(), vec!["token s9 viewer"]);
        assert_eq!(live.media().mode(), MediaMode::Viewing);
        assert!(!media_log.entries().iter().any(|e| e.starts_with("open")));

        live.stop_watching().await.unwrap();
        assert!(live.watching().is_none());
        assert_eq!(live.media().mode(), MediaMode::Idle);
    }

    #[tokio::test]
    async fn test_failed_start_keeps_viewer_session_leavable() {
        let backend = FakeStreamBackend::new().start_behavior(StartBehavior::Fail);
        let (mut live, media_log) = coordinator(backend);
        live.watch(&stream("s9", true, "other")).await.unwrap();
        live.create(NewStream::titled("Show")).await.unwrap();

        assert!(live.start().await.is_err());
        assert_eq!(live.state(), LifecycleState::Created);
        assert_eq!(live.watching().map(|s| s.stream_id()), Some("s9"));
        assert_eq!(live.media().mode(), MediaMode::Viewing);

        live.stop_watching().await.unwrap();
        assert!(live.watching().is_none());
        assert_eq!(live.media().mode(), MediaMode::Idle);
        assert!(!live.media().is_joined());
        assert!(media_log.entries().iter().any(|e| e == "leave"));
    }

    #[tokio::test]
    async fn test_start_replaces_viewer_session() {
        let (mut live, _) = coordinator(FakeStreamBackend::new());
        live.watch(&stream("s9", true, "other")).await.unwrap();
        live.create(NewStream::titled("Show")).await.unwrap();

        live.start().await.unwrap();

        assert!(live.watching().is_none());
        assert_eq!(live.media().mode(), MediaMode::Broadcasting);
    }

    #[tokio::test]
    async fn test_watch_refused_while_broadcasting() {
        let (mut live, _) = coordinator(FakeStreamBackend::new());
        live.quick_start().await.unwrap();

        assert!(matches!(
            live.watch(&stream("s9", true, "other")).await,
            Err(ServiceError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_is_streamer() {
        let (live, _) = coordinator(FakeStreamBackend::new());
        assert!(live.is_streamer(&stream("s1", true, "me")));
        assert!(!live.is_streamer(&stream("s1", true, "other")));
        assert!(!live.is_streamer(&stream("s1", true, "")));
    }
}
