//! Peer connector that records every operation per remote

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meshmeet_client::error::NegotiationError;
use meshmeet_client::mesh::{
    MeshEvent, MeshEventSender, PeerConnection, PeerConnector, RtpPacket, StreamTrack,
};
use meshmeet_media::{EncodingParams, LocalTrack, TrackKind, TrackSource};
use meshmeet_protocol::{IceCandidate, IceServer, ParticipantId, SdpKind, SessionDescription};
use tokio::sync::broadcast;

/// What one fake peer connection went through
#[derive(Debug, Clone, Default)]
pub struct PeerRecord {
    pub ice_servers: Vec<IceServer>,
    pub attached: Vec<TrackSource>,
    pub offers: usize,
    pub answers: usize,
    pub remote_descriptions: Vec<SdpKind>,
    pub candidates: Vec<IceCandidate>,
    /// Source of every replacement, `None` when the sender was cleared
    pub replacements: Vec<Option<TrackSource>>,
    pub encodings: Vec<EncodingParams>,
    pub closed: bool,
}

impl PeerRecord {
    pub fn last_encoding(&self) -> Option<EncodingParams> {
        self.encodings.last().copied()
    }
}

/// Remote track stand-in. Packets pushed through `packets()` reach
/// subscribers of the participant's media handle.
pub struct FakeRemoteTrack {
    id: String,
    kind: TrackKind,
    packets: broadcast::Sender<RtpPacket>,
}

impl FakeRemoteTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        let (packets, _) = broadcast::channel(64);
        Self {
            id: id.into(),
            kind,
            packets,
        }
    }

    pub fn packets(&self) -> broadcast::Sender<RtpPacket> {
        self.packets.clone()
    }
}

impl StreamTrack for FakeRemoteTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<RtpPacket>> {
        Some(self.packets.subscribe())
    }
}

#[derive(Default)]
struct Registry {
    order: Vec<ParticipantId>,
    records: BTreeMap<ParticipantId, Arc<Mutex<PeerRecord>>>,
    events: BTreeMap<ParticipantId, MeshEventSender>,
    failing: BTreeSet<ParticipantId>,
}

#[derive(Default)]
pub struct FakeConnector {
    registry: Mutex<Registry>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make remote descriptions from `remote` fail to apply
    pub fn fail_descriptions_from(&self, remote: ParticipantId) {
        self.registry.lock().unwrap().failing.insert(remote);
    }

    /// Remotes in the order their connections were created
    pub fn connected(&self) -> Vec<ParticipantId> {
        self.registry.lock().unwrap().order.clone()
    }

    /// Latest connection made toward `remote`
    pub fn record(&self, remote: ParticipantId) -> Option<PeerRecord> {
        let registry = self.registry.lock().unwrap();
        registry
            .records
            .get(&remote)
            .map(|r| r.lock().unwrap().clone())
    }

    /// Raise a connection callback as the WebRTC stack would
    pub fn emit(&self, event: MeshEvent) {
        let registry = self.registry.lock().unwrap();
        let remote = event.remote();
        let events = registry
            .events
            .get(&remote)
            .unwrap_or_else(|| panic!("no connection to {}", remote));
        events.send(event).expect("session stopped reading mesh events");
    }

    /// Deliver a remote track; the returned sender feeds its packets
    pub fn remote_track(&self, remote: ParticipantId, id: &str, kind: TrackKind) -> broadcast::Sender<RtpPacket> {
        let track = FakeRemoteTrack::new(id, kind);
        let packets = track.packets();
        self.emit(MeshEvent::RemoteTrack {
            remote,
            track: Arc::new(track),
        });
        packets
    }

    pub fn local_candidate(&self, remote: ParticipantId, candidate: &str) {
        self.emit(MeshEvent::LocalCandidate {
            remote,
            candidate: IceCandidate {
                candidate: candidate.to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            },
        });
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(
        &self,
        remote: ParticipantId,
        ice_servers: &[IceServer],
        events: MeshEventSender,
    ) -> Result<Box<dyn PeerConnection>, NegotiationError> {
        let mut registry = self.registry.lock().unwrap();
        let record = Arc::new(Mutex::new(PeerRecord {
            ice_servers: ice_servers.to_vec(),
            ..Default::default()
        }));
        registry.order.push(remote);
        registry.records.insert(remote, record.clone());
        registry.events.insert(remote, events);

        Ok(Box::new(FakePeer {
            remote,
            record,
            fail_descriptions: registry.failing.contains(&remote),
        }))
    }
}

struct FakePeer {
    remote: ParticipantId,
    record: Arc<Mutex<PeerRecord>>,
    fail_descriptions: bool,
}

impl FakePeer {
    fn update<T>(&self, f: impl FnOnce(&mut PeerRecord) -> T) -> Result<T, NegotiationError> {
        let mut record = self.record.lock().unwrap();
        if record.closed {
            return Err(NegotiationError::Closed);
        }
        Ok(f(&mut record))
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_local_tracks(&self, tracks: &[LocalTrack]) -> Result<(), NegotiationError> {
        self.update(|r| r.attached.extend(tracks.iter().map(|t| t.source())))
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        self.update(|r| r.offers += 1)?;
        Ok(SessionDescription::offer(format!("fake-offer-to-{}", self.remote)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        self.update(|r| r.answers += 1)?;
        Ok(SessionDescription::answer(format!("fake-answer-to-{}", self.remote)))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if self.fail_descriptions {
            return Err(NegotiationError::UnexpectedDescription { expected: "valid sdp" });
        }
        self.update(|r| r.remote_descriptions.push(description.kind))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        self.update(|r| r.candidates.push(candidate))
    }

    async fn replace_video_track(&self, track: Option<LocalTrack>) -> Result<(), NegotiationError> {
        self.update(|r| r.replacements.push(track.map(|t| t.source())))
    }

    async fn set_video_encoding(&self, params: EncodingParams) -> Result<(), NegotiationError> {
        self.update(|r| r.encodings.push(params))
    }

    async fn close(&self) {
        self.record.lock().unwrap().closed = true;
    }
}
