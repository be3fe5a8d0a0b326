//! Outbound media tracks
//!
//! A `LocalTrack` wraps a `TrackLocalStaticSample` that can be attached to any
//! number of peer connections. Capture pipelines push encoded samples through
//! `write_sample`; enablement is a local gate in front of the RTP track, so
//! muting never touches the peer connections the track is attached to.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use webrtc::media::Sample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::codec::{h264_capability, opus_capability};
use crate::encoding::{CAMERA_MAX_BITRATE_BPS, ContentHint, EncodingParams};

const LOCAL_STREAM_ID: &str = "meshmeet-local";

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// What feeds a local track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

impl TrackSource {
    pub fn kind(self) -> TrackKind {
        match self {
            Self::Microphone => TrackKind::Audio,
            Self::Camera | Self::Screen => TrackKind::Video,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Microphone => "microphone",
            Self::Camera => "camera",
            Self::Screen => "screen",
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<LocalTrackInner>,
}

struct LocalTrackInner {
    id: String,
    source: TrackSource,
    device: String,
    rtp: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    ended: AtomicBool,
    max_bitrate_bps: AtomicU64,
    detail_hint: AtomicBool,
}

impl LocalTrack {
    /// Create a track for `source`, captured from the named device
    pub fn new(source: TrackSource, device: impl Into<String>) -> Self {
        let id = format!(
            "{}-{}",
            source.label(),
            NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed)
        );
        let capability = match source.kind() {
            TrackKind::Audio => opus_capability(),
            TrackKind::Video => h264_capability(),
        };
        let rtp = Arc::new(TrackLocalStaticSample::new(
            capability,
            id.clone(),
            LOCAL_STREAM_ID.to_string(),
        ));

        Self {
            inner: Arc::new(LocalTrackInner {
                id,
                source,
                device: device.into(),
                rtp,
                enabled: AtomicBool::new(true),
                ended: AtomicBool::new(false),
                max_bitrate_bps: AtomicU64::new(CAMERA_MAX_BITRATE_BPS),
                detail_hint: AtomicBool::new(source == TrackSource::Screen),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.source.kind()
    }

    pub fn device(&self) -> &str {
        &self.inner.device
    }

    /// True when both handles refer to the same underlying track
    pub fn same_track(&self, other: &LocalTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The RTP track to attach to a peer connection
    pub fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.inner.rtp.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
        tracing::debug!("Local {} track {} enabled={}", self.source(), self.id(), enabled);
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// Stop the track permanently; further samples are dropped
    pub fn stop(&self) {
        if !self.inner.ended.swap(true, Ordering::AcqRel) {
            tracing::info!("Local {} track {} stopped", self.source(), self.id());
        }
    }

    /// Encoding parameters the capture pipeline should apply to this track
    pub fn encoding(&self) -> EncodingParams {
        EncodingParams {
            max_bitrate_bps: self.inner.max_bitrate_bps.load(Ordering::Acquire),
            content_hint: if self.inner.detail_hint.load(Ordering::Acquire) {
                ContentHint::Detail
            } else {
                ContentHint::Motion
            },
        }
    }

    pub fn set_encoding(&self, params: EncodingParams) {
        self.inner
            .max_bitrate_bps
            .store(params.max_bitrate_bps, Ordering::Release);
        self.inner
            .detail_hint
            .store(params.content_hint == ContentHint::Detail, Ordering::Release);
    }

    /// Push one encoded sample to every peer this track is attached to.
    /// Returns `Ok(false)` when the sample was dropped because the track is
    /// disabled or ended.
    pub async fn write_sample(&self, data: Vec<u8>, duration: Duration) -> Result<bool, webrtc::Error> {
        if !self.is_enabled() || self.is_ended() {
            return Ok(false);
        }

        let sample = Sample {
            data: data.into(),
            duration,
            ..Default::default()
        };
        self.inner.rtp.write_sample(&sample).await?;
        Ok(true)
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("device", &self.inner.device)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::BitratePolicy;

    #[test]
    fn test_track_ids_are_unique() {
        let a = LocalTrack::new(TrackSource::Camera, "cam0");
        let b = LocalTrack::new(TrackSource::Camera, "cam0");

        assert_ne!(a.id(), b.id());
        assert!(a.same_track(&a.clone()));
        assert!(!a.same_track(&b));
    }

    #[test]
    fn test_rtp_track_kind_follows_source() {
        use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

        let mic = LocalTrack::new(TrackSource::Microphone, "default");
        let screen = LocalTrack::new(TrackSource::Screen, "display-0");

        assert_eq!(mic.rtp_track().kind(), RTPCodecType::Audio);
        assert_eq!(screen.rtp_track().kind(), RTPCodecType::Video);
        assert_eq!(screen.encoding().content_hint, ContentHint::Detail);
    }

    #[tokio::test]
    async fn test_disabled_track_drops_samples() {
        let mic = LocalTrack::new(TrackSource::Microphone, "default");
        mic.set_enabled(false);

        let written = mic
            .write_sample(vec![0u8; 16], Duration::from_millis(20))
            .await
            .unwrap();
        assert!(!written);
    }

    #[tokio::test]
    async fn test_stopped_track_drops_samples() {
        let cam = LocalTrack::new(TrackSource::Camera, "cam0");
        cam.stop();

        assert!(cam.is_ended());
        let written = cam
            .write_sample(vec![0u8; 16], Duration::from_millis(33))
            .await
            .unwrap();
        assert!(!written);
    }

    #[test]
    fn test_set_encoding() {
        let cam = LocalTrack::new(TrackSource::Camera, "cam0");
        let params = BitratePolicy::default().params(true);
        cam.set_encoding(params);

        assert_eq!(cam.encoding(), params);
    }
}
