//! Screen presentation across an established mesh

use meshmeet_client::error::CaptureError;
use meshmeet_client::{Command, SessionEvent};
use meshmeet_media::{ContentHint, TrackSource};
use meshmeet_protocol::{Envelope, EnvelopeKind};
use meshmeet_test_utils::*;
use tokio_test::assert_ok;

fn three_way() -> Harness {
    Harness::new(
        1,
        vec![participant(1, "Me"), participant(2, "Bo"), participant(3, "Cy")],
    )
}

#[tokio::test]
async fn test_presenting_swaps_video_on_every_link() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    assert_ok!(session.start_presenting());
    wait_for_event(&mut session, |e| {
        matches!(e, SessionEvent::PresenterChanged(Some(1)))
    })
    .await;

    for remote in [2, 3] {
        let record = harness.peers.record(remote).unwrap();
        assert_eq!(record.replacements, vec![Some(TrackSource::Screen)]);
        let encoding = record.last_encoding().unwrap();
        assert_eq!(encoding.max_bitrate_bps, 1_800_000);
        assert_eq!(encoding.content_hint, ContentHint::Detail);
        assert!(!record.closed);
    }
    assert_eq!(harness.peers.connected(), vec![2, 3]);
    assert_eq!(harness.signaling.sent_of(EnvelopeKind::ScreenShareStart).len(), 1);

    assert_ok!(session.stop_presenting());
    wait_for_event(&mut session, |e| matches!(e, SessionEvent::PresenterChanged(None))).await;

    for remote in [2, 3] {
        let record = harness.peers.record(remote).unwrap();
        assert_eq!(record.replacements.last(), Some(&Some(TrackSource::Camera)));
        assert_eq!(record.last_encoding().unwrap().max_bitrate_bps, 650_000);
    }
    assert_eq!(harness.signaling.sent_of(EnvelopeKind::ScreenShareStop).len(), 1);
    assert!(harness.devices.opened_of(TrackSource::Screen)[0].is_ended());

    session.leave().await;
}

#[tokio::test]
async fn test_ended_screen_source_stops_presenting() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    assert_ok!(session.start_presenting());
    wait_for_event(&mut session, |e| matches!(e, SessionEvent::PresentingStarted(_))).await;

    assert_ok!(session.send(Command::ScreenEnded));
    wait_for_event(&mut session, |e| matches!(e, SessionEvent::PresenterChanged(None))).await;

    assert_eq!(harness.signaling.sent_of(EnvelopeKind::ScreenShareStop).len(), 1);
    let record = harness.peers.record(2).unwrap();
    assert_eq!(
        record.replacements,
        vec![Some(TrackSource::Screen), Some(TrackSource::Camera)]
    );

    session.leave().await;
}

#[tokio::test]
async fn test_capture_failure_changes_nothing() {
    let harness = three_way();
    harness.devices.deny_display(CaptureError::Cancelled);
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    assert_ok!(session.start_presenting());
    let failed = wait_for_event(&mut session, |e| matches!(e, SessionEvent::PresentingFailed(_))).await;
    assert!(matches!(
        failed,
        SessionEvent::PresentingFailed(CaptureError::Cancelled)
    ));

    assert!(harness.peers.record(2).unwrap().replacements.is_empty());
    assert!(harness.signaling.sent_of(EnvelopeKind::ScreenShareStart).is_empty());

    // A later attempt succeeds
    harness.devices.allow_display();
    assert_ok!(session.start_presenting());
    wait_for_event(&mut session, |e| {
        matches!(e, SessionEvent::PresenterChanged(Some(1)))
    })
    .await;

    session.leave().await;
}

#[tokio::test]
async fn test_remote_presenter_follows_broadcasts() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness
        .signaling
        .inject(relayed(2, Envelope::screen_share_start()));
    wait_for_event(&mut session, |e| {
        matches!(e, SessionEvent::PresenterChanged(Some(2)))
    })
    .await;

    // A stop from someone else does not clear the presenter
    harness
        .signaling
        .inject(relayed(3, Envelope::screen_share_stop()));
    // Leaving clears it
    harness.signaling.inject(left(2));
    wait_for_event(&mut session, |e| matches!(e, SessionEvent::PresenterChanged(None))).await;

    let room = wait_for_participants(&mut session, 2).await;
    assert!(room.iter().all(|p| p.id != 2));
    assert!(harness.peers.record(2).unwrap().closed);
    assert!(!harness.peers.record(3).unwrap().closed);

    session.leave().await;
}

#[tokio::test]
async fn test_presenter_leaving_before_join_is_cleared() {
    let harness = three_way();
    let mut session = harness.join().await.unwrap();
    wait_for_participants(&mut session, 3).await;

    harness
        .signaling
        .inject(relayed(7, Envelope::screen_share_start()));
    wait_for_event(&mut session, |e| {
        matches!(e, SessionEvent::PresenterChanged(Some(7)))
    })
    .await;

    harness.signaling.inject(left(7));
    wait_for_event(&mut session, |e| matches!(e, SessionEvent::PresenterChanged(None))).await;

    for remote in [2, 3] {
        let record = harness.peers.record(remote).unwrap();
        assert_eq!(record.last_encoding().unwrap().max_bitrate_bps, 650_000);
    }

    session.leave().await;
}
