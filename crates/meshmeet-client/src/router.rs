//! Inbound envelope classification
//!
//! Turns a relayed envelope into a typed route for the session, dropping
//! anything that is not for us: unicast messages addressed to someone else,
//! the echo of our own chat, controls that are only ever sent, and types
//! this client does not know.

use meshmeet_protocol::{
    Envelope, EnvelopeKind, IceCandidate, ParticipantData, ParticipantId, SessionDescription,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Offer {
        from: ParticipantId,
        sdp: Option<SessionDescription>,
    },
    Answer {
        from: ParticipantId,
        sdp: Option<SessionDescription>,
    },
    Candidate {
        from: ParticipantId,
        candidate: Option<IceCandidate>,
    },
    Chat {
        from: Option<ParticipantId>,
        name: String,
        text: String,
        timestamp: Option<String>,
    },
    Joined(ParticipantData),
    Left(ParticipantId),
    Snapshot {
        participants: Vec<ParticipantData>,
        presenter: Option<ParticipantId>,
    },
    PresentingStarted(ParticipantId),
    PresentingStopped(ParticipantId),
    MediaFlags {
        id: ParticipantId,
        mic: Option<bool>,
        cam: Option<bool>,
    },
    MeetingEnded,
    Discard(&'static str),
}

pub fn classify(local_id: ParticipantId, envelope: Envelope) -> Route {
    if envelope.kind.is_unicast() {
        return classify_unicast(local_id, envelope);
    }

    let sender = envelope.sender_id();
    match envelope.kind {
        EnvelopeKind::Chat => {
            if sender == Some(local_id) {
                return Route::Discard("own chat echo");
            }
            let data = envelope.data.unwrap_or_default();
            let name = envelope
                .sender
                .map(|s| s.name)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "User".to_string());
            Route::Chat {
                from: sender,
                name,
                text: data.text.unwrap_or_default(),
                timestamp: data.timestamp,
            }
        }
        EnvelopeKind::UserJoined => match envelope.subject() {
            Some(user) => Route::Joined(ParticipantData::new(user.id, user.name.clone())),
            None => Route::Discard("presence without subject"),
        },
        EnvelopeKind::UserLeft => match envelope.subject() {
            Some(user) => Route::Left(user.id),
            None => Route::Discard("presence without subject"),
        },
        EnvelopeKind::RoomState => Route::Snapshot {
            participants: envelope.participants.unwrap_or_default(),
            presenter: envelope.presenter_id,
        },
        EnvelopeKind::ScreenShareStart => match sender {
            Some(id) => Route::PresentingStarted(id),
            None => Route::Discard("screen share without sender"),
        },
        EnvelopeKind::ScreenShareStop => match sender {
            Some(id) => Route::PresentingStopped(id),
            None => Route::Discard("screen share without sender"),
        },
        EnvelopeKind::Media => match sender {
            Some(id) => {
                let data = envelope.data.unwrap_or_default();
                Route::MediaFlags {
                    id,
                    mic: data.mic,
                    cam: data.cam,
                }
            }
            None => Route::Discard("media flags without sender"),
        },
        EnvelopeKind::MeetingEnded => Route::MeetingEnded,
        EnvelopeKind::Mute
        | EnvelopeKind::Unmute
        | EnvelopeKind::CameraOn
        | EnvelopeKind::CameraOff => Route::Discard("outbound-only control"),
        _ => Route::Discard("unknown type"),
    }
}

fn classify_unicast(local_id: ParticipantId, envelope: Envelope) -> Route {
    if envelope.destination().is_some_and(|to| to != local_id) {
        return Route::Discard("addressed to another participant");
    }
    let Some(from) = envelope.sender_id() else {
        return Route::Discard("unicast without sender");
    };

    let data = envelope.data.unwrap_or_default();
    match envelope.kind {
        EnvelopeKind::Offer => Route::Offer {
            from,
            sdp: data.sdp,
        },
        EnvelopeKind::Answer => Route::Answer {
            from,
            sdp: data.sdp,
        },
        _ => Route::Candidate {
            from,
            candidate: data.candidate,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Envelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_unicast_for_someone_else_is_discarded() {
        let offer = parse(r#"{"type":"offer","sender":{"id":1},"data":{"to":3,"sdp":{"type":"offer","sdp":"x"}}}"#);
        assert_eq!(
            classify(2, offer.clone()),
            Route::Discard("addressed to another participant")
        );
        assert!(matches!(classify(3, offer), Route::Offer { from: 1, sdp: Some(_) }));
    }

    #[test]
    fn test_unicast_without_destination_is_accepted() {
        let answer = parse(r#"{"type":"answer","sender":{"id":1},"data":{"sdp":{"type":"answer","sdp":"x"}}}"#);
        assert!(matches!(classify(2, answer), Route::Answer { from: 1, .. }));

        let candidate = parse(r#"{"type":"ice-candidate","sender":{"id":4},"data":{"to":2}}"#);
        assert_eq!(
            classify(2, candidate),
            Route::Candidate {
                from: 4,
                candidate: None
            }
        );
    }

    #[test]
    fn test_own_chat_is_discarded() {
        let chat = parse(r#"{"type":"chat","sender":{"id":2,"name":"Me"},"data":{"text":"hi"}}"#);
        assert_eq!(classify(2, chat.clone()), Route::Discard("own chat echo"));
        assert_eq!(
            classify(1, chat),
            Route::Chat {
                from: Some(2),
                name: "Me".to_string(),
                text: "hi".to_string(),
                timestamp: None,
            }
        );
    }

    #[test]
    fn test_presence_uses_subject() {
        let joined = parse(r#"{"type":"user-joined","user":{"id":7,"name":"Kit"}}"#);
        assert_eq!(classify(1, joined), Route::Joined(ParticipantData::new(7, "Kit")));

        let left = parse(r#"{"type":"user-left","sender":{"id":7}}"#);
        assert_eq!(classify(1, left), Route::Left(7));

        let orphan = parse(r#"{"type":"user-left"}"#);
        assert!(matches!(classify(1, orphan), Route::Discard(_)));
    }

    #[test]
    fn test_broadcasts_apply_unconditionally() {
        let snapshot = parse(r#"{"type":"room-state","participants":[{"id":1},{"id":2}],"presenter_id":2}"#);
        assert!(matches!(
            classify(1, snapshot),
            Route::Snapshot { ref participants, presenter: Some(2) } if participants.len() == 2
        ));

        let media = parse(r#"{"type":"media","sender":{"id":3},"data":{"mic":false}}"#);
        assert_eq!(
            classify(1, media),
            Route::MediaFlags {
                id: 3,
                mic: Some(false),
                cam: None
            }
        );

        assert_eq!(classify(1, parse(r#"{"type":"meeting-ended"}"#)), Route::MeetingEnded);
    }

    #[test]
    fn test_controls_and_unknown_are_dropped() {
        assert!(matches!(classify(1, parse(r#"{"type":"mute","sender":{"id":2}}"#)), Route::Discard(_)));
        assert!(matches!(classify(1, parse(r#"{"type":"reaction"}"#)), Route::Discard(_)));
    }
}
