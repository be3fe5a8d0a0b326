//! Media utilities for Meshmeet
//!
//! This crate provides the pieces of the media stack the mesh orchestrator
//! needs without owning any capture hardware:
//! - Codec capabilities shared by the media engine and local tracks
//! - `LocalTrack`, an outbound track with in-place enablement
//! - Per-role encoding policy (bitrate ceiling and content hint)

pub mod codec;
pub mod encoding;
pub mod track;

pub use codec::*;
pub use encoding::*;
pub use track::*;
