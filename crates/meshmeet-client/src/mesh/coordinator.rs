use std::collections::BTreeMap;
use std::sync::Arc;

use meshmeet_media::{EncodingParams, LocalTrack, TrackKind};
use meshmeet_protocol::{
    Envelope, IceCandidate, IceServer, ParticipantId, SdpKind, SessionDescription,
};

use super::connector::{MediaHandle, MeshEventSender, PeerConnector, StreamTrack};
use super::link::{NegotiationState, PeerLink};
use crate::error::{LinkError, NegotiationError, StaleEvent};

/// The smaller id initiates toward the larger one; the larger only answers
pub fn should_initiate(local: ParticipantId, remote: ParticipantId) -> bool {
    local < remote
}

/// Media that arrived for a remote participant
#[derive(Debug)]
pub struct RemoteMedia {
    pub handle: MediaHandle,
    pub kind: TrackKind,
}

/// Full mesh of peer links, at most one per remote id
pub struct PeerMesh {
    local_id: ParticipantId,
    connector: Arc<dyn PeerConnector>,
    ice_servers: Vec<IceServer>,
    events: MeshEventSender,
    links: BTreeMap<ParticipantId, PeerLink>,
}

impl PeerMesh {
    pub fn new(
        local_id: ParticipantId,
        connector: Arc<dyn PeerConnector>,
        ice_servers: Vec<IceServer>,
        events: MeshEventSender,
    ) -> Self {
        Self {
            local_id,
            connector,
            ice_servers,
            events,
            links: BTreeMap::new(),
        }
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn contains(&self, remote: ParticipantId) -> bool {
        self.links.contains_key(&remote)
    }

    pub fn state(&self, remote: ParticipantId) -> Option<NegotiationState> {
        self.links.get(&remote).map(PeerLink::state)
    }

    pub fn media(&self, remote: ParticipantId) -> Option<MediaHandle> {
        self.links.get(&remote).map(|l| l.media().clone())
    }

    pub fn remotes(&self) -> Vec<ParticipantId> {
        self.links.keys().copied().collect()
    }

    /// Get the link to `remote`, creating it with local tracks attached and
    /// the current encoding applied
    async fn ensure_link(
        &mut self,
        remote: ParticipantId,
        tracks: &[LocalTrack],
        encoding: EncodingParams,
    ) -> Result<&mut PeerLink, NegotiationError> {
        if !self.links.contains_key(&remote) {
            let connection = self
                .connector
                .connect(remote, &self.ice_servers, self.events.clone())
                .await?;

            let setup = async {
                connection.add_local_tracks(tracks).await?;
                connection.set_video_encoding(encoding).await
            };
            if let Err(e) = setup.await {
                connection.close().await;
                return Err(e);
            }

            tracing::info!("Created peer link to {}", remote);
            self.links.insert(remote, PeerLink::new(remote, connection));
        }

        self.links
            .get_mut(&remote)
            .ok_or(NegotiationError::Closed)
    }

    /// Start negotiating toward `remote` if the tie-break makes us the
    /// initiator and no offer has been made yet. Returns the offer to send.
    pub async fn initiate(
        &mut self,
        remote: ParticipantId,
        tracks: &[LocalTrack],
        encoding: EncodingParams,
    ) -> Result<Option<Envelope>, NegotiationError> {
        if remote == self.local_id || !should_initiate(self.local_id, remote) {
            return Ok(None);
        }
        if self
            .links
            .get(&remote)
            .is_some_and(|l| l.state() != NegotiationState::New)
        {
            return Ok(None);
        }

        let result = async {
            let link = self.ensure_link(remote, tracks, encoding).await?;
            link.begin_offer();
            link.connection().create_offer().await
        }
        .await;

        match result {
            Ok(offer) => {
                tracing::debug!("Sending offer to {}", remote);
                Ok(Some(Envelope::offer(remote, offer)))
            }
            Err(e) => {
                self.close_link(remote).await;
                Err(e)
            }
        }
    }

    /// Apply a remote offer and produce the answer to send back
    pub async fn handle_offer(
        &mut self,
        remote: ParticipantId,
        offer: Option<SessionDescription>,
        tracks: &[LocalTrack],
        encoding: EncodingParams,
    ) -> Result<Envelope, NegotiationError> {
        let result = async {
            let offer = offer.ok_or(NegotiationError::MissingField("sdp"))?;
            if offer.kind != SdpKind::Offer {
                return Err(NegotiationError::UnexpectedDescription { expected: "offer" });
            }
            let link = self.ensure_link(remote, tracks, encoding).await?;
            if !link.begin_answer() {
                return Err(NegotiationError::UnexpectedDescription { expected: "answer" });
            }
            link.connection().set_remote_description(offer).await?;
            let answer = link.connection().create_answer().await?;
            link.answer_sent();
            Ok(answer)
        }
        .await;

        match result {
            Ok(answer) => {
                tracing::debug!("Sending answer to {}", remote);
                Ok(Envelope::answer(remote, answer))
            }
            Err(e) => {
                self.close_link(remote).await;
                Err(e)
            }
        }
    }

    pub async fn handle_answer(
        &mut self,
        remote: ParticipantId,
        answer: Option<SessionDescription>,
    ) -> Result<(), LinkError> {
        let link = self
            .links
            .get_mut(&remote)
            .ok_or(StaleEvent::MissingLink(remote))?;
        if link.state() != NegotiationState::Offering {
            return Err(StaleEvent::MissingLink(remote).into());
        }

        let result = async {
            let answer = answer.ok_or(NegotiationError::MissingField("sdp"))?;
            if answer.kind != SdpKind::Answer {
                return Err(NegotiationError::UnexpectedDescription { expected: "answer" });
            }
            link.connection().set_remote_description(answer).await?;
            link.accept_answer();
            Ok(())
        }
        .await;

        if let Err(e) = result {
            self.close_link(remote).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn handle_candidate(
        &mut self,
        remote: ParticipantId,
        candidate: Option<IceCandidate>,
    ) -> Result<(), LinkError> {
        let link = self
            .links
            .get(&remote)
            .ok_or(StaleEvent::MissingLink(remote))?;

        let result = match candidate {
            Some(candidate) => link.connection().add_ice_candidate(candidate).await,
            None => Err(NegotiationError::MissingField("candidate")),
        };

        if let Err(e) = result {
            self.close_link(remote).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Merge a remote track into the remote's handle
    pub fn on_remote_track(
        &mut self,
        remote: ParticipantId,
        track: Arc<dyn StreamTrack>,
    ) -> Result<RemoteMedia, StaleEvent> {
        let link = self
            .links
            .get(&remote)
            .ok_or(StaleEvent::MissingLink(remote))?;

        let kind = track.kind();
        link.media().add_track(track);
        Ok(RemoteMedia {
            handle: link.media().clone(),
            kind,
        })
    }

    /// Drop an ended remote track. Returns its kind if it was still attached.
    pub fn on_remote_track_ended(
        &mut self,
        remote: ParticipantId,
        track_id: &str,
    ) -> Result<Option<TrackKind>, StaleEvent> {
        let link = self
            .links
            .get(&remote)
            .ok_or(StaleEvent::MissingLink(remote))?;
        Ok(link.media().remove_track(track_id))
    }

    /// Swap the outbound video on every link and re-apply the cap. Links are
    /// never closed here; a failing link keeps its previous track.
    pub async fn replace_video_all(&self, track: Option<LocalTrack>, encoding: EncodingParams) -> usize {
        let mut replaced = 0;
        for (remote, link) in &self.links {
            if let Err(e) = link.connection().replace_video_track(track.clone()).await {
                tracing::warn!("Failed to replace video track for {}: {}", remote, e);
                continue;
            }
            if let Err(e) = link.connection().set_video_encoding(encoding).await {
                tracing::warn!("Failed to apply encoding for {}: {}", remote, e);
            }
            replaced += 1;
        }
        replaced
    }

    pub async fn apply_encoding(&self, encoding: EncodingParams) {
        for (remote, link) in &self.links {
            if let Err(e) = link.connection().set_video_encoding(encoding).await {
                tracing::warn!("Failed to apply encoding for {}: {}", remote, e);
            }
        }
    }

    /// Close and forget the link to `remote` along with its media handle
    pub async fn close_link(&mut self, remote: ParticipantId) -> bool {
        match self.links.remove(&remote) {
            Some(mut link) => {
                link.close().await;
                tracing::info!("Closed peer link to {}", remote);
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&mut self) {
        let links = std::mem::take(&mut self.links);
        for (_, mut link) in links {
            link.close().await;
        }
        tracing::info!("Closed all peer links");
    }
}
