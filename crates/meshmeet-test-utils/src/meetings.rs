//! Scripted meeting REST service

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use meshmeet_client::network::MeetingService;
use meshmeet_protocol::{ChatMessageData, IceServer, JoinResponse, ParticipantData, ParticipantId};

#[derive(Debug, Default)]
struct Script {
    roster: Vec<ParticipantData>,
    host_id: Option<ParticipantId>,
    reject_join: bool,
    history: Option<Vec<ChatMessageData>>,
    relay: Option<Vec<IceServer>>,
    reject_end: bool,
    end_calls: usize,
}

/// Meeting service that answers from a script. Chat history and relay
/// credentials fail unless scripted.
#[derive(Debug, Default)]
pub struct FakeMeetings {
    script: Mutex<Script>,
}

impl FakeMeetings {
    pub fn new(roster: Vec<ParticipantData>) -> Self {
        Self {
            script: Mutex::new(Script {
                roster,
                ..Default::default()
            }),
        }
    }

    pub fn set_host(&self, host_id: ParticipantId) {
        self.script.lock().unwrap().host_id = Some(host_id);
    }

    pub fn set_history(&self, history: Vec<ChatMessageData>) {
        self.script.lock().unwrap().history = Some(history);
    }

    pub fn set_relay(&self, servers: Vec<IceServer>) {
        self.script.lock().unwrap().relay = Some(servers);
    }

    pub fn reject_join(&self) {
        self.script.lock().unwrap().reject_join = true;
    }

    pub fn reject_end(&self) {
        self.script.lock().unwrap().reject_end = true;
    }

    pub fn end_calls(&self) -> usize {
        self.script.lock().unwrap().end_calls
    }
}

#[async_trait]
impl MeetingService for FakeMeetings {
    async fn join_meeting(&self, code: &str) -> Result<JoinResponse> {
        let script = self.script.lock().unwrap();
        if script.reject_join {
            return Err(anyhow!("Meeting {} not found", code));
        }
        Ok(JoinResponse {
            message: "joined".to_string(),
            participants: script.roster.clone(),
            host_id: script.host_id,
        })
    }

    async fn chat_history(&self, _code: &str) -> Result<Vec<ChatMessageData>> {
        self.script
            .lock()
            .unwrap()
            .history
            .clone()
            .ok_or_else(|| anyhow!("history unavailable"))
    }

    async fn relay_servers(&self) -> Result<Vec<IceServer>> {
        self.script
            .lock()
            .unwrap()
            .relay
            .clone()
            .ok_or_else(|| anyhow!("relay credentials unavailable"))
    }

    async fn end_meeting(&self, _code: &str) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.end_calls += 1;
        if script.reject_end {
            return Err(anyhow!("Only the host can end the meeting"));
        }
        Ok(())
    }
}
