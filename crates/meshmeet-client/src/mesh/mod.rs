//! Peer connection mesh and negotiation
//!
//! One `PeerLink` per remote participant, driven by the `PeerMesh`
//! coordinator from the session task.

pub mod connector;
pub mod coordinator;
pub mod link;
pub mod rtc;

pub use connector::{
    MediaHandle, MeshEvent, MeshEventReceiver, MeshEventSender, PeerConnection, PeerConnector,
    RtpPacket, StreamTrack,
};
pub use coordinator::{PeerMesh, RemoteMedia, should_initiate};
pub use link::{NegotiationState, PeerLink};
pub use rtc::WebRtcConnector;
