//! Room view, chat and local controls

use meshmeet_client::mesh::MeshEvent;
use meshmeet_client::state::Participant;
use meshmeet_client::{Command, SessionEvent};
use meshmeet_media::TrackKind;
use meshmeet_client::mesh::RtpPacket;
use meshmeet_protocol::{Envelope, EnvelopeData, EnvelopeKind, ParticipantId};
use meshmeet_test_utils::*;
use tokio_test::assert_ok;

fn three_way() -> Harness {
    Harness::new(
        1,
        vec![participant(1, "Me"), participant(2, "Bo"), participant(3, "Cy")],
    )
}

fn find(room: &[Participant], id: ParticipantId) -> &Participant {
    room.iter().find(|p| p.id == id).unwrap()
}

fn media_flags(mic: Option<bool>, cam: Option<bool>) -> Envelope {
    Envelope {
        data: Some(EnvelopeData {
            mic,
            cam,
            ..Default::default()
        }),
        ..Envelope::new(EnvelopeKind::Media)
    }
}

async fn next_chat(session: &mut meshmeet_client::SessionHandle) -> (meshmeet_client::state::ChatEntry, u32) {
    match wait_for_event(session, |e| matches!(e, SessionEvent::Chat { .. })).await {
        SessionEvent::Chat { entry, unread } => (entry, unread),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_local_participant_is_listed_first() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();

    let room = wait_for_participants(&mut session, 3).await;

    assert!(room[0].is_self);
    assert_eq!(room[0].id, 1);
    assert!(room[0].media.as_ref().is_some_and(|m| m.has_audio()));
    assert!(room[1..].iter().all(|p| !p.is_self && p.media.is_none()));

    session.leave().await;
}

#[tokio::test]
async fn test_own_chat_echo_is_ignored() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness.signaling.inject(relayed(1, Envelope::chat("echo")));
    harness.signaling.inject(relayed(2, Envelope::chat("hello")));

    let (entry, unread) = next_chat(&mut session).await;
    assert_eq!(entry.sender_id, Some(2));
    assert_eq!(entry.text, "hello");
    assert!(!entry.is_self);
    assert_eq!(unread, 1);

    session.leave().await;
}

#[tokio::test]
async fn test_sent_chat_is_appended_locally() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    assert_ok!(session.send_chat("  hi all  "));
    let (entry, unread) = next_chat(&mut session).await;

    assert!(entry.is_self);
    assert_eq!(entry.sender, "You");
    assert_eq!(entry.text, "hi all");
    assert_eq!(unread, 0);

    let sent = harness.signaling.sent_of(EnvelopeKind::Chat);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data.as_ref().unwrap().text.as_deref(), Some("hi all"));

    session.leave().await;
}

#[tokio::test]
async fn test_unread_counter_caps_and_resets() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    for i in 0..120 {
        harness
            .signaling
            .inject(relayed(2, Envelope::chat(format!("message {}", i))));
    }
    let mut unread = 0;
    for _ in 0..120 {
        unread = next_chat(&mut session).await.1;
    }
    assert_eq!(unread, 99);

    assert_ok!(session.send(Command::MarkChatRead));
    // Commands are handled in order
    assert_ok!(session.send_chat("caught up"));
    let (_, unread) = next_chat(&mut session).await;
    assert_eq!(unread, 0);

    harness.signaling.inject(relayed(3, Envelope::chat("new")));
    let (_, unread) = next_chat(&mut session).await;
    assert_eq!(unread, 1);

    session.leave().await;
}

#[tokio::test]
async fn test_toggles_keep_links_and_notify_peers() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    assert_ok!(session.set_mic(false));
    let room = wait_for_participants(&mut session, 3).await;
    assert!(!find(&room, 1).mic_enabled);

    assert_ok!(session.set_camera(false));
    let room = wait_for_participants(&mut session, 3).await;
    assert!(!find(&room, 1).camera_enabled);

    // Repeating a state sends nothing
    assert_ok!(session.set_mic(false));
    assert_ok!(session.set_mic(true));
    wait_for_participants(&mut session, 3).await;

    assert_eq!(harness.signaling.sent_of(EnvelopeKind::Mute).len(), 1);
    assert_eq!(harness.signaling.sent_of(EnvelopeKind::Unmute).len(), 1);
    assert_eq!(harness.signaling.sent_of(EnvelopeKind::CameraOff).len(), 1);
    assert_eq!(harness.peers.connected(), vec![2, 3]);
    assert!(!harness.peers.record(2).unwrap().closed);
    assert!(harness.peers.record(2).unwrap().replacements.is_empty());

    session.leave().await;
}

#[tokio::test]
async fn test_remote_media_flags_update_the_view() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness
        .signaling
        .inject(relayed(2, media_flags(Some(false), None)));
    let room = wait_for_participants(&mut session, 3).await;

    let bo = find(&room, 2);
    assert!(!bo.mic_enabled);
    assert!(bo.camera_enabled);

    // Flags about ourselves are ours to decide
    harness
        .signaling
        .inject(relayed(1, media_flags(Some(false), Some(false))));
    let room = wait_for_participants(&mut session, 3).await;
    assert!(find(&room, 1).mic_enabled);

    session.leave().await;
}

#[tokio::test]
async fn test_snapshot_merges_without_removing() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness.signaling.inject(room_state(
        vec![participant(1, "Me"), participant(2, "Bo"), participant(4, "Dee")],
        Some(4),
    ));
    wait_for_event(&mut session, |e| {
        matches!(e, SessionEvent::PresenterChanged(Some(4)))
    })
    .await;
    let room = wait_for_participants(&mut session, 4).await;

    assert!(room.iter().any(|p| p.id == 3));
    assert_eq!(harness.peers.connected(), vec![2, 3, 4]);

    session.leave().await;
}

#[tokio::test]
async fn test_remote_audio_waits_for_unlock() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness.peers.remote_track(2, "audio-2", TrackKind::Audio);
    let blocked = wait_for_event(&mut session, |e| matches!(e, SessionEvent::PlaybackBlocked(_))).await;
    assert!(matches!(blocked, SessionEvent::PlaybackBlocked(ref ids) if ids == &vec![2]));

    let room = wait_for_participants(&mut session, 3).await;
    assert!(find(&room, 2).media.as_ref().is_some_and(|m| m.has_audio()));

    assert_ok!(session.unlock_playback());
    let unlocked = wait_for_event(&mut session, |e| matches!(e, SessionEvent::PlaybackUnlocked(_))).await;
    assert!(matches!(unlocked, SessionEvent::PlaybackUnlocked(ref ids) if ids == &vec![2]));

    session.leave().await;
}

#[tokio::test]
async fn test_received_audio_reaches_subscribers() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    let packets = harness.peers.remote_track(2, "audio-2", TrackKind::Audio);
    let room = wait_for_event(&mut session, |e| {
        matches!(e, SessionEvent::ParticipantsChanged(room)
            if room.iter().any(|p| p.id == 2 && p.media.is_some()))
    })
    .await;
    let media = match room {
        SessionEvent::ParticipantsChanged(room) => find(&room, 2).media.clone().unwrap(),
        other => panic!("unexpected event {:?}", other),
    };

    let mut audio = media.subscribe_audio().unwrap();
    let mut packet = RtpPacket::default();
    packet.header.sequence_number = 7;
    assert_ok!(packets.send(packet));

    assert_eq!(audio.recv().await.unwrap().header.sequence_number, 7);

    session.leave().await;
}

fn camera_of(event: &SessionEvent, id: ParticipantId) -> Option<bool> {
    match event {
        SessionEvent::ParticipantsChanged(room) => room.iter().find(|p| p.id == id).map(|p| p.camera_enabled),
        _ => None,
    }
}

#[tokio::test]
async fn test_remote_video_state_drives_camera_flag() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness.peers.remote_track(2, "video-2", TrackKind::Video);
    wait_for_event(&mut session, |e| {
        matches!(e, SessionEvent::ParticipantsChanged(room)
            if room.iter().any(|p| p.id == 2 && p.media.is_some()))
    })
    .await;

    harness.peers.emit(MeshEvent::RemoteVideoState {
        remote: 2,
        track_id: "video-2".to_string(),
        live: false,
    });
    wait_for_event(&mut session, |e| camera_of(e, 2) == Some(false)).await;

    harness.peers.emit(MeshEvent::RemoteVideoState {
        remote: 2,
        track_id: "video-2".to_string(),
        live: true,
    });
    wait_for_event(&mut session, |e| camera_of(e, 2) == Some(true)).await;

    harness.peers.emit(MeshEvent::RemoteTrackEnded {
        remote: 2,
        track_id: "video-2".to_string(),
    });
    let ended = wait_for_event(&mut session, |e| camera_of(e, 2) == Some(false)).await;
    if let SessionEvent::ParticipantsChanged(room) = ended {
        let media = find(&room, 2).media.clone().unwrap();
        assert_eq!(media.video_count(), 0);
    }

    session.leave().await;
}

#[tokio::test]
async fn test_video_state_for_departed_participant_is_ignored() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness.signaling.inject(left(3));
    wait_for_participants(&mut session, 2).await;

    // Mesh events are handled in order
    harness.peers.emit(MeshEvent::RemoteVideoState {
        remote: 3,
        track_id: "video-3".to_string(),
        live: false,
    });
    harness.peers.emit(MeshEvent::RemoteVideoState {
        remote: 2,
        track_id: "video-2".to_string(),
        live: false,
    });
    let room = wait_for_event(&mut session, |e| camera_of(e, 2) == Some(false)).await;

    if let SessionEvent::ParticipantsChanged(room) = room {
        assert_eq!(room.len(), 2);
        assert!(room.iter().all(|p| p.id != 3));
    }

    session.leave().await;
}

#[tokio::test]
async fn test_remote_video_tracks_merge_into_one_handle() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness.peers.remote_track(3, "audio-3", TrackKind::Audio);
    harness.peers.remote_track(3, "video-3", TrackKind::Video);
    let room = wait_for_event(&mut session, |e| {
        matches!(e, SessionEvent::ParticipantsChanged(room)
            if room.iter().any(|p| p.id == 3 && p.media.as_ref().is_some_and(|m| m.video_count() == 1)))
    })
    .await;

    if let SessionEvent::ParticipantsChanged(room) = room {
        let media = find(&room, 3).media.clone().unwrap();
        assert!(media.has_audio());
        assert_eq!(media.track_ids(), vec!["audio-3".to_string(), "video-3".to_string()]);
    }

    session.leave().await;
}
