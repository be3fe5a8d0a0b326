//! # Meshmeet Test Utilities
//!
//! In-memory stand-ins for every collaborator a session talks to, so the
//! orchestrator can be driven end to end without a server, a network or
//! capture hardware.
//!
//! - `meetings` - scripted REST service
//! - `signaling` - recording signaling channel with an injectable inbound side
//! - `peers` - peer connector that records every operation per remote
//! - `devices` - capture devices that can be told to fail
//! - `wait` - polling helpers for asynchronous assertions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meshmeet_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = Harness::new(2, vec![participant(1, "Ann"), participant(2, "Me")]);
//!     let mut session = harness.join().await.unwrap();
//!
//!     harness.signaling.inject(joined(3, "Cy"));
//!     wait_for_participants(&mut session, 3).await;
//! }
//! ```

pub mod devices;
pub mod meetings;
pub mod peers;
pub mod signaling;
pub mod wait;

pub use devices::FakeDevices;
pub use meetings::FakeMeetings;
pub use peers::{FakeConnector, FakeRemoteTrack, PeerRecord};
pub use signaling::FakeSignaling;
pub use wait::{eventually, wait_for_event, wait_for_participants};

use std::sync::Arc;

use meshmeet_client::media::MediaConstraints;
use meshmeet_client::{Collaborators, JoinConfig, SessionHandle, join};
use meshmeet_media::BitratePolicy;
use meshmeet_protocol::{Envelope, EnvelopeKind, IceServer, ParticipantData, ParticipantId, SenderData};

/// One local participant wired to a full set of fakes
pub struct Harness {
    pub config: JoinConfig,
    pub meetings: Arc<FakeMeetings>,
    pub signaling: Arc<FakeSignaling>,
    pub peers: Arc<FakeConnector>,
    pub devices: Arc<FakeDevices>,
}

impl Harness {
    /// `local_id` joins a meeting whose roster is `roster`
    pub fn new(local_id: ParticipantId, roster: Vec<ParticipantData>) -> Self {
        Self {
            config: JoinConfig {
                code: "abc-defg-hij".to_string(),
                local_id,
                display_name: format!("User {}", local_id),
                constraints: MediaConstraints::default(),
                mic_enabled: true,
                camera_enabled: true,
                policy: BitratePolicy::default(),
                fallback_ice_servers: vec![IceServer::stun("stun:stun.example.org:3478")],
                preflight: false,
            },
            meetings: Arc::new(FakeMeetings::new(roster)),
            signaling: Arc::new(FakeSignaling::new()),
            peers: Arc::new(FakeConnector::new()),
            devices: Arc::new(FakeDevices::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            meetings: self.meetings.clone(),
            signaling: self.signaling.clone(),
            peers: self.peers.clone(),
            devices: self.devices.clone(),
        }
    }

    pub async fn join(&self) -> meshmeet_client::error::Result<SessionHandle> {
        join(self.config.clone(), self.collaborators()).await
    }
}

pub fn participant(id: ParticipantId, name: &str) -> ParticipantData {
    ParticipantData::new(id, name)
}

fn sender(id: ParticipantId) -> SenderData {
    SenderData {
        id,
        name: format!("User {}", id),
    }
}

/// Envelope as relayed by the server: `sender` stamped on
pub fn relayed(from: ParticipantId, mut envelope: Envelope) -> Envelope {
    envelope.sender = Some(sender(from));
    envelope
}

pub fn joined(id: ParticipantId, name: &str) -> Envelope {
    let mut envelope = Envelope::new(EnvelopeKind::UserJoined);
    envelope.user = Some(SenderData {
        id,
        name: name.to_string(),
    });
    envelope
}

pub fn left(id: ParticipantId) -> Envelope {
    let mut envelope = Envelope::new(EnvelopeKind::UserLeft);
    envelope.user = Some(sender(id));
    envelope
}

pub fn room_state(participants: Vec<ParticipantData>, presenter: Option<ParticipantId>) -> Envelope {
    let mut envelope = Envelope::new(EnvelopeKind::RoomState);
    envelope.participants = Some(participants);
    envelope.presenter_id = presenter;
    envelope
}

pub fn meeting_ended() -> Envelope {
    Envelope::new(EnvelopeKind::MeetingEnded)
}
