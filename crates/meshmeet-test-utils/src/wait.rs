//! Polling helpers for asynchronous assertions

use std::time::Duration;

use meshmeet_client::state::Participant;
use meshmeet_client::{SessionEvent, SessionHandle};

const TIMEOUT: Duration = Duration::from_secs(2);
const POLL: Duration = Duration::from_millis(5);

/// Wait until `condition` holds, panicking with `what` after a timeout
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Consume session events until one matches
pub async fn wait_for_event(
    session: &mut SessionHandle,
    matches: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    let found = tokio::time::timeout(TIMEOUT, async {
        loop {
            match session.next_event().await {
                Some(event) if matches(&event) => return event,
                Some(_) => continue,
                None => panic!("session event stream closed"),
            }
        }
    })
    .await;
    found.expect("timed out waiting for a session event")
}

/// Wait for a participant list of the given size
pub async fn wait_for_participants(session: &mut SessionHandle, count: usize) -> Vec<Participant> {
    match wait_for_event(session, |e| {
        matches!(e, SessionEvent::ParticipantsChanged(list) if list.len() == count)
    })
    .await
    {
        SessionEvent::ParticipantsChanged(list) => list,
        other => panic!("unexpected event {:?}", other),
    }
}
