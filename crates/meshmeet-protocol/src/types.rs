use serde::{Deserialize, Deserializer, Serialize};

/// Participant identity, stable for the lifetime of a meeting
pub type ParticipantId = i64;

/// Participant as listed by the meeting API and `room-state` snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantData {
    pub id: ParticipantId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cam: Option<bool>,
}

impl ParticipantData {
    pub fn new(id: ParticipantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mic: None,
            cam: None,
        }
    }
}

/// Response of `POST /meeting/join`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub participants: Vec<ParticipantData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<ParticipantId>,
}

/// Response of `POST /meeting/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMeetingResponse {
    pub meeting_id: String,
    pub join_url: String,
}

/// Plain `{ "message": ... }` acknowledgement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub message: String,
}

/// Persisted chat message from the history endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageData {
    pub id: i64,
    pub user_id: ParticipantId,
    pub name: String,
    pub message: String,
    pub timestamp: String,
}

/// ICE server configuration for WebRTC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Response of `GET /config/turn`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(rename = "iceServers", default)]
    pub ice_servers: Vec<IceServer>,
}

// Browsers accept `urls` as either a string or a list
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description in the browser `RTCSessionDescriptionInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the browser `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}
