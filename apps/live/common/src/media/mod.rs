//! Media session manager.
//!
//! One [`MediaSession`] wraps one RTC client. It either broadcasts the local
//! camera and microphone or views a channel, never both, and every new
//! session tears the previous one down first.

pub mod rtc;

use crate::MediaError;
use entity::{RtcRole, RtcToken};
use rtc::{
    ClientRole, LocalTrack, MediaConstraints, MediaDevices, MediaKind, RemoteTrack, RtcClient,
    RtcConnectionState, RtcEvent,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const LOCAL_CONTAINER: &str = "local-player";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMode {
    Idle,
    Broadcasting,
    Viewing,
}

/// A remote user in the channel and whatever tracks of theirs are rendered.
pub struct RemoteParticipant {
    pub uid: u32,
    video: Option<Box<dyn RemoteTrack>>,
    audio: Option<Box<dyn RemoteTrack>>,
}

impl RemoteParticipant {
    fn new(uid: u32) -> Self {
        Self {
            uid,
            video: None,
            audio: None,
        }
    }

    /// UI container the participant's video is rendered into.
    pub fn container(&self) -> String {
        format!("remote-{}", self.uid)
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    fn slot(&mut self, kind: MediaKind) -> &mut Option<Box<dyn RemoteTrack>> {
        match kind {
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
        }
    }

    fn stop_all(&mut self) {
        for track in [self.video.take(), self.audio.take()].into_iter().flatten() {
            track.stop();
        }
    }
}

pub struct MediaSession<C, D> {
    session_id: Uuid,
    client: C,
    devices: D,
    app_id: String,
    local_container: String,
    mode: MediaMode,
    video: Option<Box<dyn LocalTrack>>,
    audio: Option<Box<dyn LocalTrack>>,
    published: bool,
    joined: bool,
    uid: Option<u32>,
    participants: BTreeMap<u32, RemoteParticipant>,
}

impl<C: RtcClient, D: MediaDevices> MediaSession<C, D> {
    pub fn new(client: C, devices: D, app_id: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            client,
            devices,
            app_id: app_id.into(),
            local_container: LOCAL_CONTAINER.to_string(),
            mode: MediaMode::Idle,
            video: None,
            audio: None,
            published: false,
            joined: false,
            uid: None,
            participants: BTreeMap::new(),
        }
    }

    pub fn with_local_container(mut self, container: impl Into<String>) -> Self {
        self.local_container = container.into();
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn mode(&self) -> MediaMode {
        self.mode
    }

    pub fn uid(&self) -> Option<u32> {
        self.uid
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn has_local_tracks(&self) -> bool {
        self.video.is_some() || self.audio.is_some()
    }

    pub fn video_enabled(&self) -> Option<bool> {
        self.video.as_ref().map(|track| track.is_enabled())
    }

    pub fn audio_enabled(&self) -> Option<bool> {
        self.audio.as_ref().map(|track| track.is_enabled())
    }

    pub fn participants(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.participants.values()
    }

    pub fn participant(&self, uid: u32) -> Option<&RemoteParticipant> {
        self.participants.get(&uid)
    }

    pub fn connection_state(&self) -> RtcConnectionState {
        self.client.connection_state()
    }

    /// Opens camera and microphone. A microphone failure releases the camera.
    pub async fn acquire_hardware(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<(Box<dyn LocalTrack>, Box<dyn LocalTrack>), MediaError> {
        let camera = self.devices.create_camera_track(constraints).await?;
        match self.devices.create_microphone_track(constraints).await {
            Ok(microphone) => Ok((camera, microphone)),
            Err(e) => {
                camera.stop();
                camera.close();
                Err(e)
            }
        }
    }

    /// Publishes camera and microphone on the token's channel and plays the
    /// local preview. Returns the uid joined with.
    pub async fn start_broadcast(
        &mut self,
        token: &RtcToken,
        constraints: &MediaConstraints,
    ) -> Result<u32, MediaError> {
        check_role(token, RtcRole::Broadcaster)?;

        if let Err(e) = self.teardown().await {
            warn!("[{}] Previous session did not close cleanly: {}", self.session_id, e);
        }

        let (video, audio) = self.acquire_hardware(constraints).await?;

        if let Err(e) = self.client.set_client_role(ClientRole::Host).await {
            release(&[&*video, &*audio]);
            return Err(e);
        }

        let uid = match self
            .client
            .join(&self.app_id, &token.channel_name, &token.token, token.uid)
            .await
        {
            Ok(uid) => uid,
            Err(e) => {
                release(&[&*video, &*audio]);
                return Err(e);
            }
        };

        if let Err(e) = self.client.publish(&[&*video, &*audio]).await {
            release(&[&*video, &*audio]);
            if let Err(leave_error) = self.client.leave().await {
                warn!("[{}] Leave after failed publish: {}", self.session_id, leave_error);
            }
            return Err(e);
        }

        if let Err(e) = video.play(&self.local_container) {
            warn!("[{}] Local preview failed: {}", self.session_id, e);
        }

        self.video = Some(video);
        self.audio = Some(audio);
        self.joined = true;
        self.published = true;
        self.uid = Some(uid);
        self.mode = MediaMode::Broadcasting;
        info!(
            "[{}] Broadcasting on {} as uid {}",
            self.session_id, token.channel_name, uid
        );

        Ok(uid)
    }

    /// Flips the camera track. `None` when no camera is open.
    pub fn toggle_video(&mut self) -> Result<Option<bool>, MediaError> {
        toggle(self.video.as_deref())
    }

    /// Flips the microphone track. `None` when no microphone is open.
    pub fn toggle_audio(&mut self) -> Result<Option<bool>, MediaError> {
        toggle(self.audio.as_deref())
    }

    /// Joins the token's channel as audience without touching local devices.
    pub async fn join_as_viewer(&mut self, token: &RtcToken) -> Result<u32, MediaError> {
        check_role(token, RtcRole::Viewer)?;

        if let Err(e) = self.teardown().await {
            warn!("[{}] Previous session did not close cleanly: {}", self.session_id, e);
        }

        self.client.set_client_role(ClientRole::Audience).await?;
        let uid = self
            .client
            .join(&self.app_id, &token.channel_name, &token.token, token.uid)
            .await?;

        self.joined = true;
        self.uid = Some(uid);
        self.mode = MediaMode::Viewing;
        info!(
            "[{}] Watching {} as uid {}",
            self.session_id, token.channel_name, uid
        );

        Ok(uid)
    }

    pub async fn handle_event(&mut self, event: RtcEvent) -> Result<(), MediaError> {
        if self.mode == MediaMode::Idle {
            debug!("[{}] Ignoring {:?} outside a session", self.session_id, event);
            return Ok(());
        }

        match event {
            RtcEvent::UserJoined { uid } => {
                self.participants
                    .entry(uid)
                    .or_insert_with(|| RemoteParticipant::new(uid));
            }
            RtcEvent::UserPublished { uid, kind } => {
                let track = self.client.subscribe(uid, kind).await?;
                let known = self.participants.contains_key(&uid);
                let participant = self
                    .participants
                    .entry(uid)
                    .or_insert_with(|| RemoteParticipant::new(uid));

                let played = match kind {
                    MediaKind::Video => track.play(Some(&participant.container())),
                    MediaKind::Audio => track.play(None),
                };
                if let Err(e) = played {
                    warn!("[{}] Could not play {} of uid {}: {}", self.session_id, kind, uid, e);
                    track.stop();
                    if !known {
                        self.participants.remove(&uid);
                    }
                    return Err(e);
                }
                if let Some(previous) = participant.slot(kind).replace(track) {
                    previous.stop();
                }
                debug!("[{}] Rendering {} of uid {}", self.session_id, kind, uid);
            }
            RtcEvent::UserUnpublished { uid, kind } => {
                if let Some(track) = self
                    .participants
                    .get_mut(&uid)
                    .and_then(|participant| participant.slot(kind).take())
                {
                    track.stop();
                }
            }
            RtcEvent::UserLeft { uid } => {
                if let Some(mut participant) = self.participants.remove(&uid) {
                    participant.stop_all();
                }
            }
        }

        Ok(())
    }

    /// Leaves the channel and clears every rendered container.
    pub async fn leave(&mut self) -> Result<(), MediaError> {
        self.teardown().await
    }

    /// Unpublishes, stops and closes local tracks, then leaves the channel.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned. Calling this on an idle session does nothing.
    pub async fn teardown(&mut self) -> Result<(), MediaError> {
        let mut first_error = None;

        if self.published {
            if let Err(e) = self.client.unpublish().await {
                warn!("[{}] Unpublish failed: {}", self.session_id, e);
                first_error = first_error.or(Some(e));
            }
            self.published = false;
        }

        let tracks: Vec<Box<dyn LocalTrack>> = [self.video.take(), self.audio.take()]
            .into_iter()
            .flatten()
            .collect();
        for track in &tracks {
            track.stop();
        }
        for track in &tracks {
            track.close();
        }

        for participant in self.participants.values_mut() {
            participant.stop_all();
        }
        self.participants.clear();

        if self.joined {
            if let Err(e) = self.client.leave().await {
                warn!("[{}] Leave failed: {}", self.session_id, e);
                first_error = first_error.or(Some(e));
            }
            self.joined = false;
        }

        if self.mode != MediaMode::Idle {
            info!("[{}] Media session closed", self.session_id);
        }
        self.mode = MediaMode::Idle;
        self.uid = None;

        first_error.map_or(Ok(()), Err)
    }
}

fn check_role(token: &RtcToken, requested: RtcRole) -> Result<(), MediaError> {
    match token.role {
        Some(role) if role != requested => Err(MediaError::RoleMismatch {
            requested,
            token: role,
        }),
        _ => Ok(()),
    }
}

fn toggle(track: Option<&dyn LocalTrack>) -> Result<Option<bool>, MediaError> {
    let Some(track) = track else {
        return Ok(None);
    };
    let enabled = !track.is_enabled();
    track.set_enabled(enabled)?;
    Ok(Some(enabled))
}

fn release(tracks: &[&dyn LocalTrack]) {
    for track in tracks {
        track.stop();
        track.close();
    }
}
