use async_trait::async_trait;
use meshmeet_media::{LocalTrack, TrackSource};

use crate::config::Settings;
use crate::error::{CaptureError, DeviceError};

/// Which kinds of user media to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Tracks returned by a user media request
#[derive(Debug, Clone, Default)]
pub struct LocalMedia {
    pub microphone: Option<LocalTrack>,
    pub camera: Option<LocalTrack>,
}

/// Capture device access
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_user_media(&self, constraints: MediaConstraints) -> Result<LocalMedia, DeviceError>;

    async fn open_display_media(&self) -> Result<LocalTrack, CaptureError>;
}

/// Devices taken from the configured inventory. Tracks start idle and are fed
/// by an external capture pipeline through `LocalTrack::write_sample`.
#[derive(Debug, Clone, Default)]
pub struct InventoryDevices {
    microphones: Vec<String>,
    cameras: Vec<String>,
    displays: Vec<String>,
}

impl InventoryDevices {
    pub fn new(microphones: Vec<String>, cameras: Vec<String>, displays: Vec<String>) -> Self {
        Self {
            microphones,
            cameras,
            displays,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.microphones.clone(),
            settings.cameras.clone(),
            settings.displays.clone(),
        )
    }
}

#[async_trait]
impl MediaDevices for InventoryDevices {
    async fn open_user_media(&self, constraints: MediaConstraints) -> Result<LocalMedia, DeviceError> {
        if !constraints.audio && !constraints.video {
            return Err(DeviceError::EmptyConstraints);
        }

        let microphone = if constraints.audio {
            let device = self
                .microphones
                .first()
                .ok_or(DeviceError::NoDevice("microphone"))?;
            Some(LocalTrack::new(TrackSource::Microphone, device.as_str()))
        } else {
            None
        };

        let camera = if constraints.video {
            let device = self.cameras.first().ok_or(DeviceError::NoDevice("camera"))?;
            Some(LocalTrack::new(TrackSource::Camera, device.as_str()))
        } else {
            None
        };

        tracing::info!(
            "Opened user media: microphone={:?} camera={:?}",
            microphone.as_ref().map(LocalTrack::device),
            camera.as_ref().map(LocalTrack::device)
        );
        Ok(LocalMedia { microphone, camera })
    }

    async fn open_display_media(&self) -> Result<LocalTrack, CaptureError> {
        let device = self
            .displays
            .first()
            .ok_or_else(|| CaptureError::Denied("no display available".to_string()))?;
        tracing::info!("Opened display {}", device);
        Ok(LocalTrack::new(TrackSource::Screen, device.as_str()))
    }
}
