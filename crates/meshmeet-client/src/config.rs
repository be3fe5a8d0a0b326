//! Client settings
//!
//! Layered with the `config` crate: built-in defaults, then `meshmeet.toml` in
//! the working directory, then `<config dir>/meshmeet/settings.toml`, then
//! `MESHMEET_*` environment variables.

use anyhow::Result;
use meshmeet_media::{BitratePolicy, CAMERA_MAX_BITRATE_BPS, PRESENTING_MAX_BITRATE_BPS};
use meshmeet_protocol::{IceServer, ParticipantId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the meeting API, e.g. `https://meet.example.org`
    pub server_url: String,
    /// Bearer token issued by the auth service
    pub token: Option<String>,
    /// Local participant identity, as known to the server
    pub user_id: ParticipantId,
    pub display_name: String,
    /// Used when the relay credential fetch fails
    pub stun_servers: Vec<String>,
    pub camera_bitrate_bps: u64,
    pub presenting_bitrate_bps: u64,
    /// Probe the signaling endpoint before joining
    pub preflight: bool,
    pub join_muted: bool,
    pub join_camera_off: bool,
    /// Capture device inventory, first entry is the default
    pub microphones: Vec<String>,
    pub cameras: Vec<String>,
    pub displays: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            token: None,
            user_id: 0,
            display_name: "Me".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            camera_bitrate_bps: CAMERA_MAX_BITRATE_BPS,
            presenting_bitrate_bps: PRESENTING_MAX_BITRATE_BPS,
            preflight: false,
            join_muted: true,
            join_camera_off: false,
            microphones: vec!["default".to_string()],
            cameras: vec!["default".to_string()],
            displays: vec!["display-0".to_string()],
        }
    }
}

impl Settings {
    /// Get the per-user settings file path
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("meshmeet").join("settings.toml"))
    }

    /// Load settings from all layers
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("meshmeet").required(false));

        if let Some(path) = Self::settings_path() {
            tracing::debug!("Looking for settings in {:?}", path);
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix("MESHMEET")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("stun_servers")
                    .with_list_parse_key("microphones")
                    .with_list_parse_key("cameras")
                    .with_list_parse_key("displays"),
            )
            .build()?
            .try_deserialize()?;

        if settings.token.is_none() {
            tracing::warn!("MESHMEET_TOKEN not set, the meeting server will reject the join");
        }

        Ok(settings)
    }

    pub fn bitrate_policy(&self) -> BitratePolicy {
        BitratePolicy::new(self.camera_bitrate_bps, self.presenting_bitrate_bps)
    }

    /// ICE servers used when relay credentials are unavailable
    pub fn fallback_ice_servers(&self) -> Vec<IceServer> {
        self.stun_servers.iter().map(IceServer::stun).collect()
    }
}
