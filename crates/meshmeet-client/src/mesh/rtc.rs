//! webrtc-rs implementation of the peer connection seam

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshmeet_media::{EncodingParams, LocalTrack, TrackKind, register_codecs};
use meshmeet_protocol::{IceCandidate, IceServer, ParticipantId, SdpKind, SessionDescription};
use tokio::sync::{Mutex, broadcast};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_remote::TrackRemote;

use super::connector::{
    MeshEvent, MeshEventSender, PeerConnection, PeerConnector, RtpPacket, StreamTrack,
};
use crate::error::NegotiationError;

/// No RTP for this long marks a remote video track as muted
const REMOTE_MUTE_TIMEOUT: Duration = Duration::from_secs(2);

/// Fan-out buffer per remote track; slow subscribers lag and skip ahead
const REMOTE_PACKET_BUFFER: usize = 256;

/// A received track and the packets read from it
struct RemoteRtpTrack {
    track: Arc<TrackRemote>,
    packets: broadcast::Sender<RtpPacket>,
}

impl StreamTrack for RemoteRtpTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<RtpPacket>> {
        Some(self.packets.subscribe())
    }
}

/// Builds one webrtc-rs API shared by every peer connection of the session
pub struct WebRtcConnector {
    api: API,
}

impl WebRtcConnector {
    pub fn new() -> Result<Self, webrtc::Error> {
        let mut media_engine = MediaEngine::default();
        register_codecs(&mut media_engine)?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

fn rtc_ice_servers(servers: &[IceServer]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|s| RTCIceServer {
            urls: s.urls.clone(),
            username: s.username.clone().unwrap_or_default(),
            credential: s.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(
        &self,
        remote: ParticipantId,
        ice_servers: &[IceServer],
        events: MeshEventSender,
    ) -> Result<Box<dyn PeerConnection>, NegotiationError> {
        let config = RTCConfiguration {
            ice_servers: rtc_ice_servers(ice_servers),
            ..Default::default()
        };
        let pc = Arc::new(self.api.new_peer_connection(config).await?);

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(json) => {
                        let _ = tx.send(MeshEvent::LocalCandidate {
                            remote,
                            candidate: IceCandidate {
                                candidate: json.candidate,
                                sdp_mid: json.sdp_mid,
                                sdp_mline_index: json.sdp_mline_index,
                                username_fragment: json.username_fragment,
                            },
                        });
                    }
                    Err(e) => tracing::warn!("Failed to serialize ICE candidate for {}: {}", remote, e),
                }
            })
        }));

        let tx = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            tracing::info!(
                "Remote {:?} track {} from participant {}",
                track.kind(),
                track.id(),
                remote
            );
            let (packets, _) = broadcast::channel(REMOTE_PACKET_BUFFER);
            let _ = tx.send(MeshEvent::RemoteTrack {
                remote,
                track: Arc::new(RemoteRtpTrack {
                    track: track.clone(),
                    packets: packets.clone(),
                }),
            });
            let tx = tx.clone();
            Box::pin(async move {
                tokio::spawn(watch_remote_track(remote, track, packets, tx));
            })
        }));

        let tx = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            tracing::info!("Peer connection to {} is {}", remote, state);
            if state == RTCPeerConnectionState::Failed {
                let _ = tx.send(MeshEvent::LinkFailed { remote });
            }
            Box::pin(async {})
        }));

        Ok(Box::new(RtcPeer {
            remote,
            pc,
            video_sender: Mutex::new(None),
            video_track: Mutex::new(None),
        }))
    }
}

/// Read a remote track, forward its packets to subscribers and report mute,
/// unmute and end. Video counts as muted after `REMOTE_MUTE_TIMEOUT` without
/// packets.
async fn watch_remote_track(
    remote: ParticipantId,
    track: Arc<TrackRemote>,
    packets: broadcast::Sender<RtpPacket>,
    events: MeshEventSender,
) {
    let track_id = TrackRemote::id(&track);
    let is_video = TrackRemote::kind(&track) == RTPCodecType::Video;
    let mut live = true;

    loop {
        match tokio::time::timeout(REMOTE_MUTE_TIMEOUT, track.read_rtp()).await {
            Ok(Ok((packet, _))) => {
                // No subscriber yet is fine
                let _ = packets.send(packet);
                if is_video && !live {
                    live = true;
                    if events
                        .send(MeshEvent::RemoteVideoState {
                            remote,
                            track_id: track_id.clone(),
                            live,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::debug!("Remote track {} from {} ended: {}", track_id, remote, e);
                let _ = events.send(MeshEvent::RemoteTrackEnded { remote, track_id });
                return;
            }
            Err(_) => {
                if is_video && live {
                    live = false;
                    if events
                        .send(MeshEvent::RemoteVideoState {
                            remote,
                            track_id: track_id.clone(),
                            live,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                if events.is_closed() {
                    return;
                }
            }
        }
    }
}

struct RtcPeer {
    remote: ParticipantId,
    pc: Arc<RTCPeerConnection>,
    video_sender: Mutex<Option<Arc<RTCRtpSender>>>,
    video_track: Mutex<Option<LocalTrack>>,
}

/// RTCP has to be read for the interceptors (NACK, reports) to run
fn drain_rtcp(sender: Arc<RTCRtpSender>) {
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
    });
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, NegotiationError> {
    Ok(match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpKind::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpKind::Rollback => {
            return Err(NegotiationError::UnexpectedDescription {
                expected: "offer or answer",
            });
        }
    })
}

impl RtcPeer {
    async fn add_transceiver(
        &self,
        kind: RTPCodecType,
        direction: RTCRtpTransceiverDirection,
    ) -> Result<Arc<RTCRtpSender>, NegotiationError> {
        let transceiver = self
            .pc
            .add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction,
                    send_encodings: vec![],
                }),
            )
            .await?;
        Ok(transceiver.sender().await)
    }
}

#[async_trait]
impl PeerConnection for RtcPeer {
    async fn add_local_tracks(&self, tracks: &[LocalTrack]) -> Result<(), NegotiationError> {
        let mut has_audio = false;

        for track in tracks {
            let sender = self.pc.add_track(track.rtp_track()).await?;
            drain_rtcp(sender.clone());

            match track.kind() {
                TrackKind::Audio => has_audio = true,
                TrackKind::Video => {
                    *self.video_sender.lock().await = Some(sender);
                    *self.video_track.lock().await = Some(track.clone());
                }
            }
        }

        // Keep both m-lines so remote media arrives and a video track can be
        // swapped in later without renegotiating
        if !has_audio {
            self.add_transceiver(RTPCodecType::Audio, RTCRtpTransceiverDirection::Recvonly)
                .await?;
        }
        let mut video_sender = self.video_sender.lock().await;
        if video_sender.is_none() {
            let sender = self
                .add_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Sendrecv)
                .await?;
            drain_rtcp(sender.clone());
            *video_sender = Some(sender);
        }

        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.pc.set_remote_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn replace_video_track(&self, track: Option<LocalTrack>) -> Result<(), NegotiationError> {
        let sender = self
            .video_sender
            .lock()
            .await
            .clone()
            .ok_or(NegotiationError::NoVideoSender)?;

        sender.replace_track(track.as_ref().map(|t| t.rtp_track())).await?;
        tracing::debug!(
            "Video sender for {} now carries {:?}",
            self.remote,
            track.as_ref().map(|t| t.id().to_string())
        );
        *self.video_track.lock().await = track;
        Ok(())
    }

    async fn set_video_encoding(&self, params: EncodingParams) -> Result<(), NegotiationError> {
        // webrtc-rs has no sender parameters; the cap rides on the track and
        // is honoured by the capture pipeline's encoder
        if let Some(track) = self.video_track.lock().await.as_ref() {
            track.set_encoding(params);
        }
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::warn!("Failed to close peer connection to {}: {}", self.remote, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_servers_keep_credentials() {
        let servers = vec![
            IceServer::stun("stun:stun.example.org"),
            IceServer {
                urls: vec!["turn:turn.example.org".to_string()],
                username: Some("u".to_string()),
                credential: Some("p".to_string()),
            },
        ];
        let rtc = rtc_ice_servers(&servers);

        assert_eq!(rtc[0].username, "");
        assert_eq!(rtc[1].urls, vec!["turn:turn.example.org".to_string()]);
        assert_eq!(rtc[1].credential, "p");
    }

    #[test]
    fn test_rollback_is_not_applicable() {
        let rollback = SessionDescription {
            kind: SdpKind::Rollback,
            sdp: String::new(),
        };
        assert!(matches!(
            to_rtc(rollback),
            Err(NegotiationError::UnexpectedDescription { .. })
        ));
    }

    #[tokio::test]
    async fn test_connector_builds_and_negotiates_offer() {
        let connector = WebRtcConnector::new().unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let peer = connector.connect(2, &[], tx).await.unwrap();

        let mic = LocalTrack::new(meshmeet_media::TrackSource::Microphone, "default");
        peer.add_local_tracks(&[mic]).await.unwrap();
        let offer = peer.create_offer().await.unwrap();

        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("m=video"));
        peer.close().await;
    }
}
