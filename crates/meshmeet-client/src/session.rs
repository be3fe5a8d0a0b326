//! Meeting session
//!
//! `join` runs the entry sequence (join, chat history, local media, relay
//! credentials, optional probe, signaling channel) and then hands every piece
//! of state to one spawned task. That task owns the membership table, the
//! mesh and the local media, and processes signaling messages, mesh callbacks
//! and user commands one at a time, in arrival order.

use std::sync::Arc;

use meshmeet_media::{BitratePolicy, LocalTrack, TrackKind};
use meshmeet_protocol::{Envelope, IceServer, ParticipantId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::error::{CaptureError, ChannelError, LinkError, Result, SessionError};
use crate::media::{LocalMediaController, MediaConstraints, MediaDevices, PlaybackGate};
use crate::mesh::{MeshEvent, MeshEventReceiver, PeerConnector, PeerMesh};
use crate::network::{ChannelEvent, ChannelEvents, MeetingService, SignalingChannel, SignalingConnector};
use crate::router::{self, Route};
use crate::state::chat::parse_timestamp;
use crate::state::{ChatEntry, ChatLog, Membership, Participant};

/// User intent, sent from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetMic(bool),
    SetCamera(bool),
    StartPresenting,
    StopPresenting,
    /// The capture pipeline reports the screen source is gone
    ScreenEnded,
    SendChat(String),
    MarkChatRead,
    UnlockPlayback,
    EndMeeting,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Left,
    /// The host ended the meeting
    MeetingEnded,
    /// The server closed the channel normally
    Disconnected,
    Channel(ChannelError),
}

/// State changes for the presentation layer
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ParticipantsChanged(Vec<Participant>),
    Chat { entry: ChatEntry, unread: u32 },
    PresenterChanged(Option<ParticipantId>),
    /// Remote audio is waiting for a user interaction
    PlaybackBlocked(Vec<ParticipantId>),
    PlaybackUnlocked(Vec<ParticipantId>),
    PresentingStarted(LocalTrack),
    PresentingFailed(CaptureError),
    EndMeetingRejected(String),
    SessionEnded(EndReason),
}

/// External collaborators a session runs against
#[derive(Clone)]
pub struct Collaborators {
    pub meetings: Arc<dyn MeetingService>,
    pub signaling: Arc<dyn SignalingConnector>,
    pub peers: Arc<dyn PeerConnector>,
    pub devices: Arc<dyn MediaDevices>,
}

#[derive(Debug, Clone)]
pub struct JoinConfig {
    pub code: String,
    pub local_id: ParticipantId,
    pub display_name: String,
    pub constraints: MediaConstraints,
    pub mic_enabled: bool,
    pub camera_enabled: bool,
    pub policy: BitratePolicy,
    pub fallback_ice_servers: Vec<IceServer>,
    pub preflight: bool,
}

impl JoinConfig {
    pub fn from_settings(code: &str, settings: &Settings) -> Self {
        Self {
            code: code.to_string(),
            local_id: settings.user_id,
            display_name: settings.display_name.clone(),
            constraints: MediaConstraints::default(),
            mic_enabled: !settings.join_muted,
            camera_enabled: !settings.join_camera_off,
            policy: settings.bitrate_policy(),
            fallback_ice_servers: settings.fallback_ice_servers(),
            preflight: settings.preflight,
        }
    }
}

/// Handle to a running session
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
    is_host: bool,
    local_tracks: Vec<LocalTrack>,
}

impl SessionHandle {
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Microphone and camera tracks for the capture pipeline to feed
    pub fn local_tracks(&self) -> &[LocalTrack] {
        &self.local_tracks
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| SessionError::Ended)
    }

    pub fn set_mic(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetMic(enabled))
    }

    pub fn set_camera(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetCamera(enabled))
    }

    pub fn start_presenting(&self) -> Result<()> {
        self.send(Command::StartPresenting)
    }

    pub fn stop_presenting(&self) -> Result<()> {
        self.send(Command::StopPresenting)
    }

    pub fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SendChat(text.into()))
    }

    pub fn unlock_playback(&self) -> Result<()> {
        self.send(Command::UnlockPlayback)
    }

    pub fn end_meeting(&self) -> Result<()> {
        if !self.is_host {
            return Err(SessionError::NotHost);
        }
        self.send(Command::EndMeeting)
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Leave and wait for teardown. Returns the events not yet consumed.
    pub async fn leave(self) -> Vec<SessionEvent> {
        let _ = self.commands.send(Command::Leave);
        self.finished().await
    }

    /// Wait for the session to end on its own. Returns the events not yet
    /// consumed.
    pub async fn finished(mut self) -> Vec<SessionEvent> {
        if let Err(e) = (&mut self.task).await {
            tracing::error!("Session task failed: {}", e);
        }
        let mut rest = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            rest.push(event);
        }
        rest
    }
}

/// Enter a meeting. Device and channel failures are returned before any
/// session task exists.
pub async fn join(config: JoinConfig, collaborators: Collaborators) -> Result<SessionHandle> {
    let Collaborators {
        meetings,
        signaling,
        peers,
        devices,
    } = collaborators;
    let code = config.code.clone();

    tracing::info!("Joining meeting {}", code);
    let joined = meetings
        .join_meeting(&code)
        .await
        .map_err(SessionError::Join)?;
    let is_host = joined.host_id == Some(config.local_id);

    let mut chat = ChatLog::new();
    match meetings.chat_history(&code).await {
        Ok(history) => chat.seed(history),
        Err(e) => tracing::warn!("Chat history unavailable: {}", e),
    }

    let mut local = LocalMediaController::new(devices, config.policy);
    let local_handle = local
        .acquire(config.constraints, config.mic_enabled, config.camera_enabled)
        .await?;

    let ice_servers = match meetings.relay_servers().await {
        Ok(servers) if !servers.is_empty() => servers,
        Ok(_) => config.fallback_ice_servers.clone(),
        Err(e) => {
            tracing::warn!("Relay credentials unavailable, using fallback: {}", e);
            config.fallback_ice_servers.clone()
        }
    };

    let opened = async {
        if config.preflight {
            signaling.preflight(&code).await?;
        }
        signaling.connect(&code).await
    }
    .await;
    let (channel, channel_events) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            tracing::error!("Failed to open signaling channel: {}", e);
            local.stop_all();
            return Err(e.into());
        }
    };

    let mut membership = Membership::new(config.local_id, config.display_name.clone());
    membership.apply_snapshot(&joined.participants, None);
    membership.bind_local_handle(local_handle, local.mic_enabled(), local.camera_enabled());

    let (mesh_tx, mesh_rx) = mpsc::unbounded_channel();
    let mesh = PeerMesh::new(config.local_id, peers, ice_servers, mesh_tx);

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let local_tracks = local.outbound_tracks();

    let orchestrator = Orchestrator {
        code,
        local_id: config.local_id,
        is_host,
        meetings,
        channel,
        membership,
        chat,
        local,
        mesh,
        playback: PlaybackGate::new(),
        events: events_tx,
    };
    let task = tokio::spawn(orchestrator.run(channel_events, mesh_rx, commands_rx));

    Ok(SessionHandle {
        commands: commands_tx,
        events: events_rx,
        task,
        is_host,
        local_tracks,
    })
}

struct Orchestrator {
    code: String,
    local_id: ParticipantId,
    is_host: bool,
    meetings: Arc<dyn MeetingService>,
    channel: Box<dyn SignalingChannel>,
    membership: Membership,
    chat: ChatLog,
    local: LocalMediaController,
    mesh: PeerMesh,
    playback: PlaybackGate,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut channel_events: ChannelEvents,
        mut mesh_events: MeshEventReceiver,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        // Proactive offers toward everyone already in the roster
        self.initiate_all().await;
        self.publish_participants();

        let reason = loop {
            tokio::select! {
                event = channel_events.recv() => match event {
                    Some(ChannelEvent::Message(envelope)) => {
                        if let Some(reason) = self.on_envelope(envelope).await {
                            break reason;
                        }
                    }
                    Some(ChannelEvent::Closed { code, reason }) => {
                        break match ChannelError::from_close(code, &reason) {
                            Some(e) => {
                                tracing::error!("Signaling channel lost: {}", e);
                                EndReason::Channel(e)
                            }
                            None => EndReason::Disconnected,
                        };
                    }
                    None => break EndReason::Channel(ChannelError::Abnormal),
                },
                Some(event) = mesh_events.recv() => self.on_mesh_event(event).await,
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Some(reason) = self.on_command(command).await {
                            break reason;
                        }
                    }
                    // Every handle is gone, nobody is left to drive the session
                    None => break EndReason::Left,
                },
            }
        };

        self.shutdown(reason).await;
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn publish_participants(&self) {
        self.emit(SessionEvent::ParticipantsChanged(self.membership.get()));
    }

    fn send(&self, envelope: Envelope) {
        if let Err(e) = self.channel.send(envelope) {
            tracing::warn!("Failed to send envelope: {}", e);
        }
    }

    async fn initiate(&mut self, remote: ParticipantId) {
        let tracks = self.local.outbound_tracks();
        match self.mesh.initiate(remote, &tracks, self.local.encoding()).await {
            Ok(Some(offer)) => self.send(offer),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Failed to start negotiation with {}: {}", remote, e);
                self.membership.clear_media(remote);
            }
        }
    }

    async fn initiate_all(&mut self) {
        for remote in self.membership.remote_ids() {
            self.initiate(remote).await;
        }
    }

    async fn presenter_changed(&mut self) {
        self.mesh.apply_encoding(self.local.encoding()).await;
        self.emit(SessionEvent::PresenterChanged(self.membership.presenter()));
    }

    fn link_error(&mut self, remote: ParticipantId, error: LinkError) {
        match error {
            LinkError::Stale(e) => tracing::debug!("Ignoring stale event: {}", e),
            LinkError::Negotiation(e) => {
                tracing::warn!("Negotiation with {} failed, link closed: {}", remote, e);
                self.membership.clear_media(remote);
                self.publish_participants();
            }
        }
    }

    async fn on_envelope(&mut self, envelope: Envelope) -> Option<EndReason> {
        tracing::debug!("Envelope {:?} from {:?}", envelope.kind, envelope.sender_id());

        match router::classify(self.local_id, envelope) {
            Route::Offer { from, sdp } => {
                let tracks = self.local.outbound_tracks();
                match self
                    .mesh
                    .handle_offer(from, sdp, &tracks, self.local.encoding())
                    .await
                {
                    Ok(answer) => self.send(answer),
                    Err(e) => self.link_error(from, e.into()),
                }
            }
            Route::Answer { from, sdp } => {
                if let Err(e) = self.mesh.handle_answer(from, sdp).await {
                    self.link_error(from, e);
                }
            }
            Route::Candidate { from, candidate } => {
                if let Err(e) = self.mesh.handle_candidate(from, candidate).await {
                    self.link_error(from, e);
                }
            }
            Route::Chat {
                from,
                name,
                text,
                timestamp,
            } => {
                let entry = ChatEntry {
                    sender_id: from,
                    sender: name,
                    text,
                    timestamp: parse_timestamp(timestamp.as_deref()),
                    is_self: false,
                };
                self.chat.push_remote(entry.clone());
                self.emit(SessionEvent::Chat {
                    entry,
                    unread: self.chat.unread(),
                });
            }
            Route::Joined(participant) => {
                self.membership.apply_join(&participant);
                self.initiate(participant.id).await;
                self.publish_participants();
            }
            Route::Left(id) => {
                self.mesh.close_link(id).await;
                self.playback.forget(id);
                if let Some(departure) = self.membership.apply_leave(id) {
                    if departure.was_presenting {
                        self.presenter_changed().await;
                    }
                    if departure.participant.is_some() {
                        self.publish_participants();
                    }
                }
            }
            Route::Snapshot {
                participants,
                presenter,
            } => {
                let before = self.membership.presenter();
                self.membership.apply_snapshot(&participants, presenter);
                if self.membership.presenter() != before {
                    self.presenter_changed().await;
                }
                self.initiate_all().await;
                self.publish_participants();
            }
            Route::PresentingStarted(id) => {
                if self.membership.set_presenter(Some(id)) {
                    self.presenter_changed().await;
                }
            }
            Route::PresentingStopped(id) => {
                if self.membership.clear_presenter_if(id) {
                    self.presenter_changed().await;
                }
            }
            Route::MediaFlags { id, mic, cam } => match self.membership.apply_media_flags(id, mic, cam) {
                Ok(()) => self.publish_participants(),
                Err(e) => tracing::debug!("Ignoring stale event: {}", e),
            },
            Route::MeetingEnded => {
                tracing::info!("Meeting {} was ended by the host", self.code);
                return Some(EndReason::MeetingEnded);
            }
            Route::Discard(why) => tracing::debug!("Discarding envelope: {}", why),
        }
        None
    }

    async fn on_mesh_event(&mut self, event: MeshEvent) {
        tracing::debug!("Mesh event {:?}", event);

        match event {
            MeshEvent::LocalCandidate { remote, candidate } => {
                if self.mesh.contains(remote) {
                    self.send(Envelope::ice_candidate(remote, candidate));
                } else {
                    tracing::debug!("Dropping candidate for closed link {}", remote);
                }
            }
            MeshEvent::RemoteTrack { remote, track } => match self.mesh.on_remote_track(remote, track) {
                Ok(media) => {
                    self.membership.bind_remote_media(remote, media.handle, media.kind);
                    if media.kind == TrackKind::Audio && self.playback.on_remote_audio(remote) {
                        self.emit(SessionEvent::PlaybackBlocked(self.playback.pending()));
                    }
                    self.publish_participants();
                }
                Err(e) => tracing::debug!("Ignoring stale event: {}", e),
            },
            MeshEvent::RemoteVideoState { remote, live, .. } => {
                match self.membership.set_camera_flag(remote, live) {
                    Ok(()) => self.publish_participants(),
                    Err(e) => tracing::debug!("Ignoring stale event: {}", e),
                }
            }
            MeshEvent::RemoteTrackEnded { remote, track_id } => {
                match self.mesh.on_remote_track_ended(remote, &track_id) {
                    Ok(Some(TrackKind::Video)) => {
                        if self.membership.set_camera_flag(remote, false).is_ok() {
                            self.publish_participants();
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!("Ignoring stale event: {}", e),
                }
            }
            MeshEvent::LinkFailed { remote } => {
                if self.mesh.close_link(remote).await {
                    tracing::warn!("Peer link to {} failed", remote);
                    self.membership.clear_media(remote);
                    self.publish_participants();
                }
            }
        }
    }

    async fn on_command(&mut self, command: Command) -> Option<EndReason> {
        tracing::debug!("Command {:?}", command);

        match command {
            Command::SetMic(enabled) => {
                if self.local.set_mic_enabled(enabled) {
                    self.membership.set_local_flags(Some(enabled), None);
                    self.send(Envelope::mic(enabled));
                    self.publish_participants();
                }
            }
            Command::SetCamera(enabled) => {
                if self.local.set_camera_enabled(enabled) {
                    self.membership.set_local_flags(None, Some(enabled));
                    self.send(Envelope::camera(enabled));
                    self.mesh.apply_encoding(self.local.encoding()).await;
                    self.publish_participants();
                }
            }
            Command::StartPresenting => match self.local.start_presenting().await {
                Ok(screen) => {
                    let replaced = self
                        .mesh
                        .replace_video_all(Some(screen.clone()), self.local.encoding())
                        .await;
                    tracing::info!("Presenting on {} links", replaced);
                    self.send(Envelope::screen_share_start());
                    self.emit(SessionEvent::PresentingStarted(screen));
                    if self.membership.set_presenter(Some(self.local_id)) {
                        self.presenter_changed().await;
                    }
                }
                Err(e) => {
                    tracing::warn!("Could not start presenting: {}", e);
                    self.emit(SessionEvent::PresentingFailed(e));
                }
            },
            Command::StopPresenting | Command::ScreenEnded => {
                if self.local.stop_presenting() {
                    self.mesh
                        .replace_video_all(self.local.outbound_video(), self.local.encoding())
                        .await;
                    self.send(Envelope::screen_share_stop());
                    if self.membership.clear_presenter_if(self.local_id) {
                        self.presenter_changed().await;
                    }
                }
            }
            Command::SendChat(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    self.send(Envelope::chat(text));
                    let entry = self.chat.push_local(self.local_id, text);
                    self.emit(SessionEvent::Chat {
                        entry,
                        unread: self.chat.unread(),
                    });
                }
            }
            Command::MarkChatRead => self.chat.mark_read(),
            Command::UnlockPlayback => {
                let released = self.playback.unlock();
                self.emit(SessionEvent::PlaybackUnlocked(released));
            }
            Command::EndMeeting => {
                if !self.is_host {
                    self.emit(SessionEvent::EndMeetingRejected(SessionError::NotHost.to_string()));
                    return None;
                }
                return match self.meetings.end_meeting(&self.code).await {
                    Ok(()) => Some(EndReason::MeetingEnded),
                    // Leave anyway; the others stay until the server ends it
                    Err(e) => {
                        tracing::warn!("Failed to end meeting, leaving: {}", e);
                        Some(EndReason::Left)
                    }
                };
            }
            Command::Leave => return Some(EndReason::Left),
        }
        None
    }

    /// Close links, stop capture, close the channel once, report the end
    async fn shutdown(mut self, reason: EndReason) {
        tracing::info!("Leaving meeting {}: {:?}", self.code, reason);

        self.mesh.close_all().await;
        self.local.stop_all();
        self.channel.close();
        self.membership.clear_remotes();
        self.emit(SessionEvent::SessionEnded(reason));
    }
}
