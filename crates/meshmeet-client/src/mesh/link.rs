use meshmeet_protocol::ParticipantId;

use super::connector::{MediaHandle, PeerConnection};

/// Where a link is in the offer/answer exchange. There is no retry state:
/// a failed link is closed and stays closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    /// Offer sent, waiting for the answer
    Offering,
    /// Remote offer applied, answer being produced
    Answering,
    Connected,
    Closed,
}

/// Per-remote negotiation record owned by the mesh
pub struct PeerLink {
    remote: ParticipantId,
    connection: Box<dyn PeerConnection>,
    state: NegotiationState,
    media: MediaHandle,
}

impl PeerLink {
    pub fn new(remote: ParticipantId, connection: Box<dyn PeerConnection>) -> Self {
        Self {
            remote,
            connection,
            state: NegotiationState::New,
            media: MediaHandle::new(),
        }
    }

    pub fn remote(&self) -> ParticipantId {
        self.remote
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn connection(&self) -> &dyn PeerConnection {
        self.connection.as_ref()
    }

    pub fn media(&self) -> &MediaHandle {
        &self.media
    }

    /// NEW → OFFERING. Refused in every other state, so a link never sends a
    /// second offer.
    pub fn begin_offer(&mut self) -> bool {
        self.transition(NegotiationState::New, NegotiationState::Offering)
    }

    /// NEW or CONNECTED → ANSWERING. A connected link may be renegotiated by
    /// its initiator.
    pub fn begin_answer(&mut self) -> bool {
        match self.state {
            NegotiationState::New | NegotiationState::Connected => {
                self.set_state(NegotiationState::Answering);
                true
            }
            _ => false,
        }
    }

    /// OFFERING → CONNECTED on the answer
    pub fn accept_answer(&mut self) -> bool {
        self.transition(NegotiationState::Offering, NegotiationState::Connected)
    }

    /// ANSWERING → CONNECTED once our answer is out
    pub fn answer_sent(&mut self) -> bool {
        self.transition(NegotiationState::Answering, NegotiationState::Connected)
    }

    /// Any state → CLOSED. Releases the connection once.
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        self.set_state(NegotiationState::Closed);
        self.connection.close().await;
    }

    fn transition(&mut self, from: NegotiationState, to: NegotiationState) -> bool {
        if self.state != from {
            return false;
        }
        self.set_state(to);
        true
    }

    fn set_state(&mut self, state: NegotiationState) {
        tracing::debug!("Link {}: {:?} -> {:?}", self.remote, self.state, state);
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NegotiationError;
    use async_trait::async_trait;
    use meshmeet_media::{EncodingParams, LocalTrack};
    use meshmeet_protocol::{IceCandidate, SessionDescription};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Inert {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PeerConnection for Inert {
        async fn add_local_tracks(&self, _: &[LocalTrack]) -> Result<(), NegotiationError> {
            Ok(())
        }
        async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
            Ok(SessionDescription::offer(""))
        }
        async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
            Ok(SessionDescription::answer(""))
        }
        async fn set_remote_description(&self, _: SessionDescription) -> Result<(), NegotiationError> {
            Ok(())
        }
        async fn add_ice_candidate(&self, _: IceCandidate) -> Result<(), NegotiationError> {
            Ok(())
        }
        async fn replace_video_track(&self, _: Option<LocalTrack>) -> Result<(), NegotiationError> {
            Ok(())
        }
        async fn set_video_encoding(&self, _: EncodingParams) -> Result<(), NegotiationError> {
            Ok(())
        }
        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_initiator_path() {
        let mut link = PeerLink::new(2, Box::new(Inert::default()));

        assert!(link.begin_offer());
        assert!(!link.begin_offer());
        assert!(!link.answer_sent());
        assert!(link.accept_answer());
        assert_eq!(link.state(), NegotiationState::Connected);
        assert!(!link.accept_answer());
    }

    #[test]
    fn test_responder_path() {
        let mut link = PeerLink::new(1, Box::new(Inert::default()));

        assert!(link.begin_answer());
        assert!(!link.begin_offer());
        assert!(link.answer_sent());
        assert_eq!(link.state(), NegotiationState::Connected);
        assert!(link.begin_answer());
    }

    #[tokio::test]
    async fn test_close_is_terminal_and_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut link = PeerLink::new(
            3,
            Box::new(Inert {
                closes: closes.clone(),
            }),
        );
        link.begin_offer();

        link.close().await;
        link.close().await;

        assert_eq!(link.state(), NegotiationState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!link.begin_answer());
        assert!(!link.accept_answer());
    }
}
