//! Outbound video encoding policy
//!
//! Bandwidth is not estimated: every outbound video encoding gets a fixed
//! ceiling chosen by role. Shared-screen content gets a higher ceiling and a
//! `Detail` hint, talking-head video a lower ceiling and a `Motion` hint.

pub const CAMERA_MAX_BITRATE_BPS: u64 = 650_000;
pub const PRESENTING_MAX_BITRATE_BPS: u64 = 1_800_000;

/// Encoder content hint, mirrors `MediaStreamTrack.contentHint`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentHint {
    #[default]
    Motion,
    Detail,
}

/// Parameters applied to an outbound video encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingParams {
    pub max_bitrate_bps: u64,
    pub content_hint: ContentHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitratePolicy {
    pub camera_bps: u64,
    pub presenting_bps: u64,
}

impl BitratePolicy {
    pub fn new(camera_bps: u64, presenting_bps: u64) -> Self {
        Self {
            camera_bps,
            presenting_bps,
        }
    }

    pub fn params(&self, presenting: bool) -> EncodingParams {
        if presenting {
            EncodingParams {
                max_bitrate_bps: self.presenting_bps,
                content_hint: ContentHint::Detail,
            }
        } else {
            EncodingParams {
                max_bitrate_bps: self.camera_bps,
                content_hint: ContentHint::Motion,
            }
        }
    }
}

impl Default for BitratePolicy {
    fn default() -> Self {
        Self::new(CAMERA_MAX_BITRATE_BPS, PRESENTING_MAX_BITRATE_BPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presenting_ceiling_is_higher() {
        let policy = BitratePolicy::default();
        let camera = policy.params(false);
        let screen = policy.params(true);

        assert!(screen.max_bitrate_bps > camera.max_bitrate_bps);
        assert_eq!(camera.content_hint, ContentHint::Motion);
        assert_eq!(screen.content_hint, ContentHint::Detail);
    }
}
