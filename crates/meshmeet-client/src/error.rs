//! Error taxonomy
//!
//! Device and capture errors surface to the caller, negotiation and stale-event
//! errors are absorbed where they happen, channel errors end the session.

use meshmeet_protocol::ParticipantId;
use thiserror::Error;

/// Capture permission denied or no usable device. Fatal to joining.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission to use the {0} was denied")]
    PermissionDenied(&'static str),

    #[error("No {0} available")]
    NoDevice(&'static str),

    #[error("Media constraints request neither audio nor video")]
    EmptyConstraints,
}

/// Screen-share source unavailable or cancelled. Recoverable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Screen selection was cancelled")]
    Cancelled,

    #[error("Screen capture denied: {0}")]
    Denied(String),

    #[error("Already presenting")]
    AlreadyPresenting,

    #[error("Local media has not been acquired")]
    NotAcquired,
}

/// Malformed or inapplicable offer/answer/candidate. Closes only the affected link.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("Envelope is missing its {0}")]
    MissingField(&'static str),

    #[error("Expected an {expected} description")]
    UnexpectedDescription { expected: &'static str },

    #[error("WebRTC error: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("Peer connection has no video sender")]
    NoVideoSender,

    #[error("Peer connection is closed")]
    Closed,
}

/// Abnormal close of the signaling channel. Fatal to the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Authentication failed - invalid or missing token")]
    Unauthorized,

    #[error("User not found")]
    UserNotFound,

    #[error("Meeting not found or already ended")]
    MeetingNotFound,

    #[error("Abnormal closure - network issues or server problems")]
    Abnormal,

    #[error("Connection closed with code {code}: {reason}")]
    Closed { code: u16, reason: String },

    #[error("Connection timeout - server may be unreachable")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid signaling URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to encode envelope: {0}")]
    Encode(String),

    #[error("Signaling channel is closed")]
    NotOpen,
}

impl ChannelError {
    /// Classify a WebSocket close code. Normal closes map to `None`.
    pub fn from_close(code: u16, reason: &str) -> Option<Self> {
        match code {
            1000 | 1005 => None,
            4401 => Some(Self::Unauthorized),
            4403 => Some(Self::UserNotFound),
            4404 => Some(Self::MeetingNotFound),
            1006 => Some(Self::Abnormal),
            _ => Some(Self::Closed {
                code,
                reason: if reason.is_empty() {
                    "Unknown reason".to_string()
                } else {
                    reason.to_string()
                },
            }),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Out-of-order event that refers to something not (or no longer) known.
/// Logged and dropped, never reported.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StaleEvent {
    #[error("Participant {0} is not in the room")]
    UnknownParticipant(ParticipantId),

    #[error("No peer link to {0}")]
    MissingLink(ParticipantId),
}

/// Outcome of applying a remote negotiation message to the mesh
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Stale(#[from] StaleEvent),

    /// The link has already been closed when this is returned
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}

/// Failure to enter or keep a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to join meeting: {0}")]
    Join(#[source] anyhow::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Only the host can end the meeting")]
    NotHost,

    #[error("Session is no longer running")]
    Ended,
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_classification() {
        assert_eq!(ChannelError::from_close(1000, ""), None);
        assert_eq!(ChannelError::from_close(1005, ""), None);
        assert_eq!(ChannelError::from_close(4401, ""), Some(ChannelError::Unauthorized));
        assert_eq!(ChannelError::from_close(4403, ""), Some(ChannelError::UserNotFound));
        assert_eq!(ChannelError::from_close(4404, ""), Some(ChannelError::MeetingNotFound));
        assert_eq!(ChannelError::from_close(1006, ""), Some(ChannelError::Abnormal));
        assert_eq!(
            ChannelError::from_close(1011, ""),
            Some(ChannelError::Closed {
                code: 1011,
                reason: "Unknown reason".to_string()
            })
        );
    }
}
