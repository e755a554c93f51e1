//! Seams to the real-time media SDK and the device layer.

use crate::MediaError;
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    Host,
    Audience,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

/// Remote-participant notifications delivered by the RTC client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcEvent {
    UserJoined { uid: u32 },
    UserPublished { uid: u32, kind: MediaKind },
    UserUnpublished { uid: u32, kind: MediaKind },
    UserLeft { uid: u32 },
}

/// A captured camera or microphone track.
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> MediaKind;
    fn set_enabled(&self, enabled: bool) -> Result<(), MediaError>;
    fn is_enabled(&self) -> bool;
    /// Renders the track into a UI container. Audio tracks ignore the container.
    fn play(&self, container: &str) -> Result<(), MediaError>;
    fn stop(&self);
    /// Releases the underlying device.
    fn close(&self);
}

pub trait RemoteTrack: Send + Sync {
    fn kind(&self) -> MediaKind;
    /// `None` plays audio without a container.
    fn play(&self, container: Option<&str>) -> Result<(), MediaError>;
    fn stop(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn create_camera_track(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn LocalTrack>, MediaError>;
    async fn create_microphone_track(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn LocalTrack>, MediaError>;
}

#[async_trait]
pub trait RtcClient: Send + Sync {
    async fn set_client_role(&self, role: ClientRole) -> Result<(), MediaError>;
    /// Joins `channel` and returns the uid the SDK assigned.
    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        uid: Option<u32>,
    ) -> Result<u32, MediaError>;
    async fn leave(&self) -> Result<(), MediaError>;
    async fn publish(&self, tracks: &[&dyn LocalTrack]) -> Result<(), MediaError>;
    async fn unpublish(&self) -> Result<(), MediaError>;
    async fn subscribe(&self, uid: u32, kind: MediaKind) -> Result<Box<dyn RemoteTrack>, MediaError>;
    fn connection_state(&self) -> RtcConnectionState;
}
