//! Shared wire types for Meshmeet
//!
//! `messages` holds the signaling envelope relayed over the meeting WebSocket,
//! `types` holds the REST payloads and the session description / ICE candidate
//! shapes carried inside envelopes.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;
