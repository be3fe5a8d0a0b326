//! Capture devices that can be told to fail

use std::sync::Mutex;

use async_trait::async_trait;
use meshmeet_client::error::{CaptureError, DeviceError};
use meshmeet_client::media::{LocalMedia, MediaConstraints, MediaDevices};
use meshmeet_media::{LocalTrack, TrackSource};

#[derive(Default)]
struct Behaviour {
    user_media_error: Option<DeviceError>,
    display_error: Option<CaptureError>,
    opened: Vec<LocalTrack>,
}

/// Always has a microphone, a camera and a display unless told otherwise.
/// Keeps every track it hands out.
#[derive(Default)]
pub struct FakeDevices {
    behaviour: Mutex<Behaviour>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_user_media(&self, error: DeviceError) {
        self.behaviour.lock().unwrap().user_media_error = Some(error);
    }

    pub fn deny_display(&self, error: CaptureError) {
        self.behaviour.lock().unwrap().display_error = Some(error);
    }

    pub fn allow_display(&self) {
        self.behaviour.lock().unwrap().display_error = None;
    }

    pub fn opened(&self) -> Vec<LocalTrack> {
        self.behaviour.lock().unwrap().opened.clone()
    }

    pub fn opened_of(&self, source: TrackSource) -> Vec<LocalTrack> {
        self.opened().into_iter().filter(|t| t.source() == source).collect()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn open_user_media(&self, constraints: MediaConstraints) -> Result<LocalMedia, DeviceError> {
        let mut behaviour = self.behaviour.lock().unwrap();
        if let Some(e) = behaviour.user_media_error.clone() {
            return Err(e);
        }

        let microphone = constraints
            .audio
            .then(|| LocalTrack::new(TrackSource::Microphone, "fake-mic"));
        let camera = constraints
            .video
            .then(|| LocalTrack::new(TrackSource::Camera, "fake-cam"));
        behaviour
            .opened
            .extend(microphone.iter().chain(camera.iter()).cloned());

        Ok(LocalMedia { microphone, camera })
    }

    async fn open_display_media(&self) -> Result<LocalTrack, CaptureError> {
        let mut behaviour = self.behaviour.lock().unwrap();
        if let Some(e) = behaviour.display_error.clone() {
            return Err(e);
        }

        let screen = LocalTrack::new(TrackSource::Screen, "fake-display");
        behaviour.opened.push(screen.clone());
        Ok(screen)
    }
}
