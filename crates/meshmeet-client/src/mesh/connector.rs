//! Seams between the negotiation logic and the WebRTC stack
//!
//! The coordinator only talks to `PeerConnector` / `PeerConnection`; the
//! webrtc-rs implementation lives in `rtc`. Connection callbacks are turned
//! into `MeshEvent`s and queued to the session task, never handled inline.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use meshmeet_media::{EncodingParams, LocalTrack, TrackKind};
use meshmeet_protocol::{IceCandidate, IceServer, ParticipantId, SessionDescription};
use tokio::sync::{broadcast, mpsc};

use crate::error::NegotiationError;

pub use webrtc::rtp::packet::Packet as RtpPacket;

/// A media track as seen by the room view, local or remote
pub trait StreamTrack: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> TrackKind;

    /// Packets received on this track. Local tracks carry none.
    fn subscribe(&self) -> Option<broadcast::Receiver<RtpPacket>> {
        None
    }
}

impl StreamTrack for LocalTrack {
    fn id(&self) -> String {
        LocalTrack::id(self).to_string()
    }

    fn kind(&self) -> TrackKind {
        LocalTrack::kind(self)
    }
}

/// Aggregate of one audio and any number of video tracks for one participant.
/// Clones share the same track set.
#[derive(Clone, Default)]
pub struct MediaHandle {
    tracks: Arc<Mutex<Vec<Arc<dyn StreamTrack>>>>,
}

impl MediaHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn StreamTrack>>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge a track in. A second audio track replaces the first.
    /// Returns false if the track was already part of the handle.
    pub fn add_track(&self, track: Arc<dyn StreamTrack>) -> bool {
        let mut tracks = self.lock();
        let id = track.id();
        if tracks.iter().any(|t| t.id() == id) {
            return false;
        }
        if track.kind() == TrackKind::Audio {
            tracks.retain(|t| t.kind() != TrackKind::Audio);
        }
        tracks.push(track);
        true
    }

    /// Returns the kind of the removed track
    pub fn remove_track(&self, id: &str) -> Option<TrackKind> {
        let mut tracks = self.lock();
        let index = tracks.iter().position(|t| t.id() == id)?;
        Some(tracks.remove(index).kind())
    }

    /// Received packets of track `id`, from now on
    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<RtpPacket>> {
        self.lock().iter().find(|t| t.id() == id)?.subscribe()
    }

    pub fn subscribe_audio(&self) -> Option<broadcast::Receiver<RtpPacket>> {
        self.lock()
            .iter()
            .find(|t| t.kind() == TrackKind::Audio)?
            .subscribe()
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.lock().iter().map(|t| t.id()).collect()
    }

    pub fn has_audio(&self) -> bool {
        self.lock().iter().any(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn same_handle(&self, other: &MediaHandle) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("tracks", &self.track_ids())
            .finish()
    }
}

/// Callback output of a peer connection, delivered to the session task
pub enum MeshEvent {
    LocalCandidate {
        remote: ParticipantId,
        candidate: IceCandidate,
    },
    RemoteTrack {
        remote: ParticipantId,
        track: Arc<dyn StreamTrack>,
    },
    /// Remote video stopped or resumed flowing
    RemoteVideoState {
        remote: ParticipantId,
        track_id: String,
        live: bool,
    },
    RemoteTrackEnded {
        remote: ParticipantId,
        track_id: String,
    },
    LinkFailed {
        remote: ParticipantId,
    },
}

impl MeshEvent {
    pub fn remote(&self) -> ParticipantId {
        match self {
            Self::LocalCandidate { remote, .. }
            | Self::RemoteTrack { remote, .. }
            | Self::RemoteVideoState { remote, .. }
            | Self::RemoteTrackEnded { remote, .. }
            | Self::LinkFailed { remote } => *remote,
        }
    }
}

impl fmt::Debug for MeshEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalCandidate { remote, .. } => write!(f, "LocalCandidate({})", remote),
            Self::RemoteTrack { remote, track } => {
                write!(f, "RemoteTrack({}, {}, {:?})", remote, track.id(), track.kind())
            }
            Self::RemoteVideoState {
                remote,
                track_id,
                live,
            } => write!(f, "RemoteVideoState({}, {}, live={})", remote, track_id, live),
            Self::RemoteTrackEnded { remote, track_id } => {
                write!(f, "RemoteTrackEnded({}, {})", remote, track_id)
            }
            Self::LinkFailed { remote } => write!(f, "LinkFailed({})", remote),
        }
    }
}

pub type MeshEventSender = mpsc::UnboundedSender<MeshEvent>;
pub type MeshEventReceiver = mpsc::UnboundedReceiver<MeshEvent>;

/// One negotiated media connection to a remote participant
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Attach outbound tracks. Called once, before the first description.
    async fn add_local_tracks(&self, tracks: &[LocalTrack]) -> Result<(), NegotiationError>;

    /// Create an offer and install it as the local description
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    /// Create an answer and install it as the local description
    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError>;

    /// Swap the track feeding the outbound video sender without renegotiating
    async fn replace_video_track(&self, track: Option<LocalTrack>) -> Result<(), NegotiationError>;

    /// Apply a bitrate ceiling and content hint to the outbound video sender
    async fn set_video_encoding(&self, params: EncodingParams) -> Result<(), NegotiationError>;

    async fn close(&self);
}

/// Creates peer connections wired to the session's event queue
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        remote: ParticipantId,
        ice_servers: &[IceServer],
        events: MeshEventSender,
    ) -> Result<Box<dyn PeerConnection>, NegotiationError>;
}
