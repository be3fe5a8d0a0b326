use std::sync::Arc;

use anyhow::{Context, Result};
use meshmeet_client::media::InventoryDevices;
use meshmeet_client::mesh::WebRtcConnector;
use meshmeet_client::network::{MeetingApi, WebSocketConnector};
use meshmeet_client::{Collaborators, Command, JoinConfig, SessionEvent, Settings, join};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshmeet=debug,meshmeet_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let code = std::env::args()
        .nth(1)
        .context("usage: meshmeet <meeting-code>")?;

    tracing::info!("Starting Meshmeet client...");

    let settings = Settings::load()?;
    let collaborators = Collaborators {
        meetings: Arc::new(MeetingApi::new(&settings.server_url, settings.token.clone())),
        signaling: Arc::new(WebSocketConnector::new(
            &settings.server_url,
            settings.token.clone(),
        )),
        peers: Arc::new(WebRtcConnector::new().context("Failed to set up WebRTC")?),
        devices: Arc::new(InventoryDevices::from_settings(&settings)),
    };

    let mut session = join(JoinConfig::from_settings(&code, &settings), collaborators).await?;
    tracing::info!(
        "Joined meeting {}{}",
        code,
        if session.is_host() { " as host" } else { "" }
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = session.next_event() => match event {
                Some(SessionEvent::SessionEnded(reason)) => {
                    tracing::info!("Session ended: {:?}", reason);
                    return Ok(());
                }
                Some(event) => log_event(&event),
                None => return Ok(()),
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Some(command) = parse_command(&line) {
                        session.send(command)?;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, leaving meeting");
                break;
            }
        }
    }

    for event in session.leave().await {
        log_event(&event);
    }
    Ok(())
}

/// Map a console line to a session command. Anything that is not a known
/// command is sent as chat.
fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let command = match line {
        "" => return None,
        "/mute" => Command::SetMic(false),
        "/unmute" => Command::SetMic(true),
        "/camera on" => Command::SetCamera(true),
        "/camera off" => Command::SetCamera(false),
        "/present" => Command::StartPresenting,
        "/stop" => Command::StopPresenting,
        "/read" => Command::MarkChatRead,
        "/unlock" => Command::UnlockPlayback,
        "/end" => Command::EndMeeting,
        "/leave" => Command::Leave,
        text => Command::SendChat(text.to_string()),
    };
    Some(command)
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::ParticipantsChanged(participants) => {
            let names: Vec<String> = participants
                .iter()
                .map(|p| {
                    format!(
                        "{}{}{}",
                        p.name,
                        if p.mic_enabled { "" } else { " (muted)" },
                        if p.camera_enabled { "" } else { " (camera off)" }
                    )
                })
                .collect();
            tracing::info!("In the room: {}", names.join(", "));
        }
        SessionEvent::Chat { entry, unread } => {
            tracing::info!(
                "[{}] {}: {} ({} unread)",
                entry.time_label(),
                entry.sender,
                entry.text,
                unread
            );
        }
        SessionEvent::PresenterChanged(Some(id)) => tracing::info!("Participant {} is presenting", id),
        SessionEvent::PresenterChanged(None) => tracing::info!("Nobody is presenting"),
        SessionEvent::PlaybackBlocked(ids) => {
            tracing::info!("Audio from {:?} is waiting, type /unlock to play it", ids)
        }
        SessionEvent::PlaybackUnlocked(ids) => tracing::info!("Playing audio from {:?}", ids),
        SessionEvent::PresentingStarted(screen) => {
            tracing::info!("Presenting {}", screen.device())
        }
        SessionEvent::PresentingFailed(e) => tracing::warn!("Could not present: {}", e),
        SessionEvent::EndMeetingRejected(reason) => tracing::warn!("Could not end meeting: {}", reason),
        SessionEvent::SessionEnded(reason) => tracing::info!("Session ended: {:?}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_commands() {
        assert_eq!(parse_command("/mute"), Some(Command::SetMic(false)));
        assert_eq!(parse_command(" /camera off "), Some(Command::SetCamera(false)));
        assert_eq!(parse_command("/leave"), Some(Command::Leave));
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_other_lines_are_chat() {
        assert_eq!(
            parse_command("/camera sideways"),
            Some(Command::SendChat("/camera sideways".to_string()))
        );
        assert_eq!(
            parse_command("hello all"),
            Some(Command::SendChat("hello all".to_string()))
        );
    }
}
