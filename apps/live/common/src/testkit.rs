//! Hand-written fakes shared by the unit tests.

use crate::api::ApiClient;
use crate::chat::ChatBackend;
use crate::chat::payload::LikeUpdate;
use crate::chat::transport::{
    ConnectOptions, SocketConnection, SocketConnector, SocketHandle, Transport, TransportEvent,
};
use crate::lifecycle::StreamBackend;
use crate::media::rtc::{
    ClientRole, LocalTrack, MediaConstraints, MediaDevices, MediaKind, RemoteTrack, RtcClient,
    RtcConnectionState,
};
use crate::recovery::ReconnectPolicy;
use crate::session::SessionContext;
use crate::{MediaError, ServiceError};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use entity::stream::{CreateStreamRequest, Streamer};
use entity::{ChatMessage, RtcRole, RtcToken, Stream, StreamStatus, StreamType, UserProfile};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub type Log = Arc<Mutex<Vec<String>>>;

/// Ordered record of calls made on the fakes.
#[derive(Clone, Default)]
pub struct CallLog(Log);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub fn chat_message(id: &str, user_id: &str, text: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        user_id: user_id.to_string(),
        user_profile: UserProfile {
            name: "Test".to_string(),
            avatar: None,
        },
        message: text.to_string(),
        message_type: "text".to_string(),
        formatted_time: None,
        likes: 0,
        has_liked: false,
        created_at: Utc::now(),
    }
}

pub fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
        .with_randomization(0.0)
}

/// An unsigned JWT whose payload carries `authId`.
pub fn token_for(user_id: &str) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"authId":"{}"}}"#, user_id))
    )
}

pub fn rtc_token(role: RtcRole) -> RtcToken {
    RtcToken {
        token: format!("{}-token", role.as_str()),
        channel_name: "chan".to_string(),
        uid: None,
        role: Some(role),
    }
}

pub fn stream(id: &str, is_live: bool, streamer_id: &str) -> Stream {
    Stream {
        id: id.to_string(),
        object_id: None,
        event: None,
        streamer: Streamer {
            id: streamer_id.to_string(),
            ..Streamer::default()
        },
        title: "Test stream".to_string(),
        description: None,
        channel_name: "chan".to_string(),
        stream_status: if is_live {
            StreamStatus::Live
        } else {
            StreamStatus::Scheduled
        },
        is_live,
        current_viewers: 0,
        max_viewers: 0,
        stream_type: StreamType::Public,
        scheduled_start_time: None,
        live_started_at: None,
        is_upcoming: !is_live,
        is_active: is_live,
    }
}

// Chat

#[derive(Default)]
pub struct FakeChatBackend {
    history: Vec<ChatMessage>,
    calls: Log,
    sent: AtomicU32,
    fail_likes: Arc<AtomicBool>,
}

impl FakeChatBackend {
    pub fn with_history(history: Vec<ChatMessage>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Log {
        self.calls.clone()
    }

    pub fn fail_likes(&self) -> Arc<AtomicBool> {
        self.fail_likes.clone()
    }
}

#[async_trait]
impl ChatBackend for FakeChatBackend {
    async fn history(&self, stream_id: &str, limit: u32) -> Result<Vec<ChatMessage>, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("history {} {}", stream_id, limit));
        Ok(self.history.clone())
    }

    async fn send_message(&self, stream_id: &str, text: &str) -> Result<ChatMessage, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("send {} {}", stream_id, text));
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(chat_message(&format!("sent-{}", n), "me", text))
    }

    async fn like_message(
        &self,
        stream_id: &str,
        message_id: &str,
    ) -> Result<LikeUpdate, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("like {} {}", stream_id, message_id));
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(ServiceError::Api {
                status: 500,
                message: "like failed".to_string(),
            });
        }
        Ok(LikeUpdate {
            message_id: message_id.to_string(),
            likes: Some(1),
            user_id: Some("me".to_string()),
            has_liked: Some(true),
        })
    }

    async fn delete_message(&self, stream_id: &str, message_id: &str) -> Result<(), ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete {} {}", stream_id, message_id));
        Ok(())
    }
}

/// Pushes server events into whichever connection the fake opened last.
#[derive(Clone, Default)]
pub struct EventFeed(Arc<Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>);

impl EventFeed {
    pub fn send(&self, event: &str, payload: Value) {
        if let Some(sender) = self.0.lock().unwrap().as_ref() {
            let _ = sender.send(TransportEvent::Message {
                event: event.to_string(),
                payload,
            });
        }
    }

    pub fn disconnect(&self, reason: &str) {
        if let Some(sender) = self.0.lock().unwrap().as_ref() {
            let _ = sender.send(TransportEvent::Disconnected(reason.to_string()));
        }
    }
}

#[derive(Default)]
pub struct FakeConnector {
    attempts: Log,
    emitted: Log,
    events: EventFeed,
    refuse_websocket: bool,
    refuse: Arc<AtomicBool>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_websocket(mut self) -> Self {
        self.refuse_websocket = true;
        self
    }

    pub fn refuse_all(self) -> Self {
        self.refuse.store(true, Ordering::SeqCst);
        self
    }

    pub fn refuse_switch(&self) -> Arc<AtomicBool> {
        self.refuse.clone()
    }

    pub fn attempts(&self) -> Log {
        self.attempts.clone()
    }

    pub fn emitted(&self) -> Log {
        self.emitted.clone()
    }

    pub fn events(&self) -> EventFeed {
        self.events.clone()
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(
        &self,
        _options: &ConnectOptions,
        transport: Transport,
    ) -> Result<SocketConnection, ServiceError> {
        self.attempts.lock().unwrap().push(transport.to_string());

        let refused = self.refuse.load(Ordering::SeqCst)
            || (self.refuse_websocket && transport == Transport::Websocket);
        if refused {
            return Err(ServiceError::WebSocket(format!("{} refused", transport)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.0.lock().unwrap() = Some(tx);

        Ok(SocketConnection {
            handle: Box::new(FakeHandle {
                emitted: self.emitted.clone(),
            }),
            events: rx,
        })
    }
}

pub struct FakeHandle {
    emitted: Log,
}

#[async_trait]
impl SocketHandle for FakeHandle {
    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), ServiceError> {
        self.emitted
            .lock()
            .unwrap()
            .push(format!("{} {}", event, payload));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ServiceError> {
        self.emitted.lock().unwrap().push("close".to_string());
        Ok(())
    }
}

// Media

pub fn media_fakes() -> (FakeRtcClient, FakeDevices, CallLog) {
    let log = CallLog::default();
    let client = FakeRtcClient {
        log: log.clone(),
        fail_publish: false,
        fail_play: false,
        state: Mutex::new(RtcConnectionState::Disconnected),
    };
    let devices = FakeDevices {
        log: log.clone(),
        open: Arc::new(AtomicUsize::new(0)),
        fail_camera: None,
        fail_microphone: None,
    };
    (client, devices, log)
}

pub struct FakeRtcClient {
    log: CallLog,
    fail_publish: bool,
    fail_play: bool,
    state: Mutex<RtcConnectionState>,
}

impl FakeRtcClient {
    pub fn fail_publish(mut self) -> Self {
        self.fail_publish = true;
        self
    }

    /// Remote tracks handed out by `subscribe` refuse to play.
    pub fn fail_play(mut self) -> Self {
        self.fail_play = true;
        self
    }
}

#[async_trait]
impl RtcClient for FakeRtcClient {
    async fn set_client_role(&self, role: ClientRole) -> Result<(), MediaError> {
        let role = match role {
            ClientRole::Host => "host",
            ClientRole::Audience => "audience",
        };
        self.log.push(format!("role {}", role));
        Ok(())
    }

    async fn join(
        &self,
        _app_id: &str,
        channel: &str,
        _token: &str,
        uid: Option<u32>,
    ) -> Result<u32, MediaError> {
        self.log.push(format!("join {}", channel));
        *self.state.lock().unwrap() = RtcConnectionState::Connected;
        Ok(uid.unwrap_or(1))
    }

    async fn leave(&self) -> Result<(), MediaError> {
        self.log.push("leave");
        *self.state.lock().unwrap() = RtcConnectionState::Disconnected;
        Ok(())
    }

    async fn publish(&self, tracks: &[&dyn LocalTrack]) -> Result<(), MediaError> {
        if self.fail_publish {
            return Err(MediaError::Rtc("publish rejected".to_string()));
        }
        let kinds: Vec<String> = tracks.iter().map(|t| t.kind().to_string()).collect();
        self.log.push(format!("publish {}", kinds.join(",")));
        Ok(())
    }

    async fn unpublish(&self) -> Result<(), MediaError> {
        self.log.push("unpublish");
        Ok(())
    }

    async fn subscribe(&self, uid: u32, kind: MediaKind) -> Result<Box<dyn RemoteTrack>, MediaError> {
        self.log.push(format!("subscribe {} {}", uid, kind));
        Ok(Box::new(FakeRemoteTrack {
            kind,
            fail_play: self.fail_play,
            log: self.log.clone(),
        }))
    }

    fn connection_state(&self) -> RtcConnectionState {
        *self.state.lock().unwrap()
    }
}

pub struct FakeDevices {
    log: CallLog,
    open: Arc<AtomicUsize>,
    fail_camera: Option<MediaError>,
    fail_microphone: Option<MediaError>,
}

impl FakeDevices {
    pub fn fail_camera(mut self, error: MediaError) -> Self {
        self.fail_camera = Some(error);
        self
    }

    pub fn fail_microphone(mut self, error: MediaError) -> Self {
        self.fail_microphone = Some(error);
        self
    }

    /// Number of tracks opened and not yet closed.
    pub fn open_tracks(&self) -> Arc<AtomicUsize> {
        self.open.clone()
    }

    fn open_track(
        &self,
        name: &str,
        kind: MediaKind,
        failure: &Option<MediaError>,
    ) -> Result<Box<dyn LocalTrack>, MediaError> {
        if let Some(error) = failure {
            return Err(error.clone());
        }
        self.log.push(format!("open {}", name));
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTrack {
            id: name.to_string(),
            kind,
            enabled: AtomicBool::new(true),
            log: self.log.clone(),
            open: self.open.clone(),
        }))
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn create_camera_track(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<Box<dyn LocalTrack>, MediaError> {
        self.open_track("camera", MediaKind::Video, &self.fail_camera)
    }

    async fn create_microphone_track(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<Box<dyn LocalTrack>, MediaError> {
        self.open_track("microphone", MediaKind::Audio, &self.fail_microphone)
    }
}

pub struct FakeTrack {
    id: String,
    kind: MediaKind,
    enabled: AtomicBool,
    log: CallLog,
    open: Arc<AtomicUsize>,
}

impl LocalTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), MediaError> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn play(&self, container: &str) -> Result<(), MediaError> {
        self.log.push(format!("play {} {}", self.id, container));
        Ok(())
    }

    fn stop(&self) {
        self.log.push(format!("stop {}", self.id));
    }

    fn close(&self) {
        self.log.push(format!("close {}", self.id));
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeRemoteTrack {
    kind: MediaKind,
    fail_play: bool,
    log: CallLog,
}

impl RemoteTrack for FakeRemoteTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn play(&self, container: Option<&str>) -> Result<(), MediaError> {
        if self.fail_play {
            return Err(MediaError::Rtc("autoplay blocked".to_string()));
        }
        match container {
            Some(container) => self.log.push(format!("play remote {} {}", self.kind, container)),
            None => self.log.push(format!("play remote {}", self.kind)),
        }
        Ok(())
    }

    fn stop(&self) {
        self.log.push(format!("stop remote {}", self.kind));
    }
}

// Lifecycle

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBehavior {
    Ok,
    AlreadyLive,
    Fail,
}

pub struct FakeStreamBackend {
    log: CallLog,
    requests: Arc<Mutex<Vec<CreateStreamRequest>>>,
    start: StartBehavior,
    fail_end: bool,
}

impl FakeStreamBackend {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            requests: Arc::default(),
            start: StartBehavior::Ok,
            fail_end: false,
        }
    }

    pub fn start_behavior(mut self, behavior: StartBehavior) -> Self {
        self.start = behavior;
        self
    }

    pub fn fail_end(mut self) -> Self {
        self.fail_end = true;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<CreateStreamRequest>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl StreamBackend for FakeStreamBackend {
    async fn list_streams(&self) -> Result<Vec<Stream>, ServiceError> {
        self.log.push("list");
        Ok(vec![stream("s1", true, "me"), stream("s2", false, "other")])
    }

    async fn create_stream(&self, request: &CreateStreamRequest) -> Result<Stream, ServiceError> {
        self.log.push(format!("create {}", request.title));
        self.requests.lock().unwrap().push(request.clone());
        let mut created = stream("s1", false, "me");
        created.title = request.title.clone();
        created.channel_name = request.channel_name.clone();
        Ok(created)
    }

    async fn start_stream(&self, stream_id: &str) -> Result<(), ServiceError> {
        self.log.push(format!("start {}", stream_id));
        match self.start {
            StartBehavior::Ok => Ok(()),
            StartBehavior::AlreadyLive => Err(ServiceError::Api {
                status: 400,
                message: "Stream is already live".to_string(),
            }),
            StartBehavior::Fail => Err(ServiceError::Api {
                status: 500,
                message: "Internal server error".to_string(),
            }),
        }
    }

    async fn end_stream(&self, stream_id: &str) -> Result<(), ServiceError> {
        self.log.push(format!("end {}", stream_id));
        if self.fail_end {
            return Err(ServiceError::Api {
                status: 502,
                message: "Bad gateway".to_string(),
            });
        }
        Ok(())
    }

    async fn cancel_stream(&self, stream_id: &str) -> Result<(), ServiceError> {
        self.log.push(format!("cancel {}", stream_id));
        Ok(())
    }

    async fn rtc_token(&self, stream_id: &str, role: RtcRole) -> Result<RtcToken, ServiceError> {
        self.log.push(format!("token {} {}", stream_id, role.as_str()));
        Ok(rtc_token(role))
    }
}

// HTTP

/// Serves a single canned HTTP response on a loopback port and hands back the
/// raw request it received.
pub struct OneShotServer {
    pub base_url: String,
    request: tokio::task::JoinHandle<String>,
}

impl OneShotServer {
    pub async fn respond(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/api/v1", listener.local_addr().unwrap());
        let body = body.to_string();

        let request = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
                if request_complete(&received) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&received).into_owned()
        });

        Self { base_url, request }
    }

    /// The request as received, once the exchange is over.
    pub async fn request(self) -> String {
        self.request.await.unwrap()
    }
}

fn request_complete(received: &[u8]) -> bool {
    let Some(head_end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&received[..head_end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    received.len() >= head_end + 4 + length
}

/// Client pointed at `server`, authenticated with `token`.
pub fn api_client(server: &OneShotServer, token: &str) -> ApiClient {
    ApiClient::new(
        server.base_url.clone(),
        Arc::new(SessionContext::with_token(token)),
        Duration::from_secs(5),
    )
    .unwrap()
}

/// Header lookup on a raw request, case-insensitive on the name.
pub fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

pub fn request_line(request: &str) -> &str {
    request.lines().next().unwrap_or_default()
}
