//! Local media controller
//!
//! Owns the single outbound source: one microphone track, an optional camera
//! track and, while presenting, a screen track that stands in for the camera
//! on the video sender. Mute and camera toggles only flip track enablement;
//! routing the active video onto peer links is left to the mesh.

use std::sync::Arc;

use meshmeet_media::{BitratePolicy, EncodingParams, LocalTrack};

use super::devices::{MediaConstraints, MediaDevices};
use crate::error::{CaptureError, DeviceError};
use crate::mesh::MediaHandle;

pub struct LocalMediaController {
    devices: Arc<dyn MediaDevices>,
    policy: BitratePolicy,
    microphone: Option<LocalTrack>,
    camera: Option<LocalTrack>,
    screen: Option<LocalTrack>,
    mic_enabled: bool,
    camera_enabled: bool,
    handle: Option<MediaHandle>,
}

impl LocalMediaController {
    pub fn new(devices: Arc<dyn MediaDevices>, policy: BitratePolicy) -> Self {
        Self {
            devices,
            policy,
            microphone: None,
            camera: None,
            screen: None,
            mic_enabled: false,
            camera_enabled: true,
            handle: None,
        }
    }

    /// Open user media and build the local handle. Mic and camera start in
    /// the given enablement.
    pub async fn acquire(
        &mut self,
        constraints: MediaConstraints,
        mic_enabled: bool,
        camera_enabled: bool,
    ) -> Result<MediaHandle, DeviceError> {
        let media = self.devices.open_user_media(constraints).await?;

        let handle = MediaHandle::new();
        if let Some(mic) = &media.microphone {
            mic.set_enabled(mic_enabled);
            handle.add_track(Arc::new(mic.clone()));
        }
        if let Some(camera) = &media.camera {
            camera.set_enabled(camera_enabled);
            camera.set_encoding(self.policy.params(false));
            handle.add_track(Arc::new(camera.clone()));
        }

        self.microphone = media.microphone;
        self.camera = media.camera;
        self.mic_enabled = mic_enabled;
        self.camera_enabled = camera_enabled;
        self.handle = Some(handle.clone());

        tracing::info!(
            "Local media acquired (mic={}, camera={})",
            mic_enabled,
            camera_enabled
        );
        Ok(handle)
    }

    pub fn is_acquired(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&MediaHandle> {
        self.handle.as_ref()
    }

    pub fn mic_enabled(&self) -> bool {
        self.mic_enabled
    }

    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled
    }

    pub fn is_presenting(&self) -> bool {
        self.screen.is_some()
    }

    pub fn microphone(&self) -> Option<&LocalTrack> {
        self.microphone.as_ref()
    }

    pub fn camera(&self) -> Option<&LocalTrack> {
        self.camera.as_ref()
    }

    pub fn screen(&self) -> Option<&LocalTrack> {
        self.screen.as_ref()
    }

    /// Returns true if the state changed
    pub fn set_mic_enabled(&mut self, enabled: bool) -> bool {
        if self.mic_enabled == enabled {
            return false;
        }
        self.mic_enabled = enabled;
        if let Some(mic) = &self.microphone {
            mic.set_enabled(enabled);
        }
        true
    }

    /// Returns true if the state changed
    pub fn set_camera_enabled(&mut self, enabled: bool) -> bool {
        if self.camera_enabled == enabled {
            return false;
        }
        self.camera_enabled = enabled;
        if let Some(camera) = &self.camera {
            camera.set_enabled(enabled);
        }
        true
    }

    /// Open a screen source and make it the outbound video. Nothing changes
    /// if the source cannot be opened.
    pub async fn start_presenting(&mut self) -> Result<LocalTrack, CaptureError> {
        let handle = self.handle.clone().ok_or(CaptureError::NotAcquired)?;
        if self.is_presenting() {
            return Err(CaptureError::AlreadyPresenting);
        }

        let screen = self.devices.open_display_media().await?;
        screen.set_encoding(self.policy.params(true));
        handle.add_track(Arc::new(screen.clone()));
        self.screen = Some(screen.clone());

        tracing::info!("Presenting {}", screen.device());
        Ok(screen)
    }

    /// Stop the screen source and fall back to the camera. Returns false if
    /// we were not presenting.
    pub fn stop_presenting(&mut self) -> bool {
        let Some(screen) = self.screen.take() else {
            return false;
        };
        screen.stop();
        if let Some(handle) = &self.handle {
            handle.remove_track(screen.id());
        }
        if let Some(camera) = &self.camera {
            camera.set_encoding(self.policy.params(false));
        }

        tracing::info!("Stopped presenting");
        true
    }

    /// The track the video senders should carry
    pub fn outbound_video(&self) -> Option<LocalTrack> {
        self.screen.clone().or_else(|| self.camera.clone())
    }

    /// Tracks to attach to a new peer link
    pub fn outbound_tracks(&self) -> Vec<LocalTrack> {
        self.microphone
            .iter()
            .cloned()
            .chain(self.outbound_video())
            .collect()
    }

    /// Encoding for outbound video in the current role
    pub fn encoding(&self) -> EncodingParams {
        self.policy.params(self.is_presenting())
    }

    /// Stop every local track. The controller is unusable afterwards.
    pub fn stop_all(&mut self) {
        for track in [self.screen.take(), self.camera.take(), self.microphone.take()]
            .into_iter()
            .flatten()
        {
            track.stop();
        }
        self.handle = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::devices::InventoryDevices;
    use meshmeet_media::{ContentHint, TrackSource};

    fn controller(displays: Vec<String>) -> LocalMediaController {
        LocalMediaController::new(
            Arc::new(InventoryDevices::new(
                vec!["mic".to_string()],
                vec!["cam".to_string()],
                displays,
            )),
            BitratePolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_acquire_applies_initial_enablement() {
        let mut local = controller(vec![]);
        let handle = local
            .acquire(MediaConstraints::default(), false, true)
            .await
            .unwrap();

        assert!(handle.has_audio());
        assert_eq!(handle.video_count(), 1);
        assert!(!local.microphone().unwrap().is_enabled());
        assert!(local.camera().unwrap().is_enabled());
        assert_eq!(local.outbound_tracks().len(), 2);
    }

    #[tokio::test]
    async fn test_toggles_flip_enablement_in_place() {
        let mut local = controller(vec![]);
        local.acquire(MediaConstraints::default(), false, true).await.unwrap();
        let camera = local.camera().unwrap().clone();

        assert!(local.set_mic_enabled(true));
        assert!(!local.set_mic_enabled(true));
        assert!(local.set_camera_enabled(false));

        assert!(local.microphone().unwrap().is_enabled());
        assert!(!camera.is_enabled());
        assert!(local.outbound_video().unwrap().same_track(&camera));
    }

    #[tokio::test]
    async fn test_presenting_swaps_outbound_video() {
        let mut local = controller(vec!["display-0".to_string()]);
        local.acquire(MediaConstraints::default(), true, true).await.unwrap();

        let screen = local.start_presenting().await.unwrap();
        assert_eq!(screen.source(), TrackSource::Screen);
        assert!(local.outbound_video().unwrap().same_track(&screen));
        assert_eq!(local.encoding().content_hint, ContentHint::Detail);
        assert_eq!(
            local.start_presenting().await.unwrap_err(),
            CaptureError::AlreadyPresenting
        );

        assert!(local.stop_presenting());
        let restored = local.outbound_video().unwrap();
        assert_eq!(restored.source(), TrackSource::Camera);
        assert!(screen.is_ended());
        assert_eq!(local.encoding().max_bitrate_bps, 650_000);
        assert!(!local.stop_presenting());
    }

    #[tokio::test]
    async fn test_capture_failure_leaves_state_untouched() {
        let mut local = controller(vec![]);

        assert_eq!(
            local.start_presenting().await.unwrap_err(),
            CaptureError::NotAcquired
        );

        local.acquire(MediaConstraints::default(), true, true).await.unwrap();
        assert!(local.start_presenting().await.is_err());
        assert!(!local.is_presenting());
        assert_eq!(local.outbound_video().unwrap().source(), TrackSource::Camera);
    }

    #[tokio::test]
    async fn test_stop_all_ends_tracks() {
        let mut local = controller(vec![]);
        local.acquire(MediaConstraints::default(), true, true).await.unwrap();
        let mic = local.microphone().unwrap().clone();

        local.stop_all();

        assert!(mic.is_ended());
        assert!(!local.is_acquired());
        assert!(local.outbound_tracks().is_empty());
    }
}
