//! Meshmeet client library
//!
//! This crate provides the meeting orchestrator for the Meshmeet client:
//! signaling, the peer mesh, local media and the room state they feed.

pub mod config;
pub mod error;
pub mod media;
pub mod mesh;
pub mod network;
pub mod router;
pub mod session;
pub mod state;

pub use config::Settings;
pub use error::{
    CaptureError, ChannelError, DeviceError, LinkError, NegotiationError, SessionError, StaleEvent,
};
pub use session::{
    Collaborators, Command, EndReason, JoinConfig, SessionEvent, SessionHandle, join,
};
