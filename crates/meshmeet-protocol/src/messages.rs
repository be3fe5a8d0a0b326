use serde::{Deserialize, Serialize};

use crate::types::{IceCandidate, ParticipantData, ParticipantId, SessionDescription};

/// Envelope type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKind {
    /// WebRTC offer, unicast
    Offer,
    /// WebRTC answer, unicast
    Answer,
    /// Trickled ICE candidate, unicast
    IceCandidate,
    Chat,
    UserJoined,
    UserLeft,
    /// Full membership snapshot
    RoomState,
    ScreenShareStart,
    ScreenShareStop,
    /// Remote participant mic/camera flags
    Media,
    /// Terminal broadcast, the host ended the meeting
    MeetingEnded,
    Mute,
    Unmute,
    CameraOn,
    CameraOff,
    /// Any type this client does not understand
    #[serde(other)]
    Unknown,
}

impl EnvelopeKind {
    /// Unicast envelopes carry an explicit `data.to` destination
    pub fn is_unicast(self) -> bool {
        matches!(self, Self::Offer | Self::Answer | Self::IceCandidate)
    }
}

/// Identity attached to an envelope by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderData {
    pub id: ParticipantId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<IceCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cam: Option<bool>,
}

/// Message relayed over the meeting signaling channel, in both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderData>,
    /// Subject of `user-joined` / `user-left`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SenderData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EnvelopeData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<ParticipantData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presenter_id: Option<ParticipantId>,
}

impl Envelope {
    /// Bare envelope with no payload
    pub fn new(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            sender: None,
            user: None,
            data: None,
            participants: None,
            presenter_id: None,
        }
    }

    fn outbound(kind: EnvelopeKind, data: EnvelopeData) -> Self {
        Self {
            data: Some(data),
            ..Self::new(kind)
        }
    }

    pub fn offer(to: ParticipantId, sdp: SessionDescription) -> Self {
        Self::outbound(
            EnvelopeKind::Offer,
            EnvelopeData {
                to: Some(to),
                sdp: Some(sdp),
                ..Default::default()
            },
        )
    }

    pub fn answer(to: ParticipantId, sdp: SessionDescription) -> Self {
        Self::outbound(
            EnvelopeKind::Answer,
            EnvelopeData {
                to: Some(to),
                sdp: Some(sdp),
                ..Default::default()
            },
        )
    }

    pub fn ice_candidate(to: ParticipantId, candidate: IceCandidate) -> Self {
        Self::outbound(
            EnvelopeKind::IceCandidate,
            EnvelopeData {
                to: Some(to),
                candidate: Some(candidate),
                ..Default::default()
            },
        )
    }

    pub fn chat(text: impl Into<String>) -> Self {
        Self::outbound(
            EnvelopeKind::Chat,
            EnvelopeData {
                text: Some(text.into()),
                ..Default::default()
            },
        )
    }

    /// `unmute` / `mute`
    pub fn mic(enabled: bool) -> Self {
        let kind = if enabled {
            EnvelopeKind::Unmute
        } else {
            EnvelopeKind::Mute
        };
        Self::outbound(kind, EnvelopeData::default())
    }

    /// `camera-on` / `camera-off`
    pub fn camera(enabled: bool) -> Self {
        let kind = if enabled {
            EnvelopeKind::CameraOn
        } else {
            EnvelopeKind::CameraOff
        };
        Self::outbound(kind, EnvelopeData::default())
    }

    pub fn screen_share_start() -> Self {
        Self::outbound(EnvelopeKind::ScreenShareStart, EnvelopeData::default())
    }

    pub fn screen_share_stop() -> Self {
        Self::outbound(EnvelopeKind::ScreenShareStop, EnvelopeData::default())
    }

    /// Participant a presence envelope is about: `user`, falling back to `sender`
    pub fn subject(&self) -> Option<&SenderData> {
        self.user.as_ref().or(self.sender.as_ref())
    }

    pub fn sender_id(&self) -> Option<ParticipantId> {
        self.sender.as_ref().map(|s| s.id)
    }

    /// Destination of a unicast envelope
    pub fn destination(&self) -> Option<ParticipantId> {
        self.data.as_ref().and_then(|d| d.to)
    }
}
