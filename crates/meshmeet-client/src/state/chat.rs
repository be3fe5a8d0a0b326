use chrono::{DateTime, Local, Utc};
use meshmeet_protocol::{ChatMessageData, ParticipantId};

const MAX_UNREAD: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub sender_id: Option<ParticipantId>,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_self: bool,
}

impl ChatEntry {
    /// Local wall-clock time, `HH:MM`
    pub fn time_label(&self) -> String {
        self.timestamp.with_timezone(&Local).format("%H:%M").to_string()
    }
}

/// Parse a server timestamp, falling back to now
pub fn parse_timestamp(timestamp: Option<&str>) -> DateTime<Utc> {
    timestamp
        .and_then(|t| {
            DateTime::parse_from_rfc3339(t)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    // Naive ISO timestamps are UTC
                    chrono::NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|t| t.and_utc())
                })
        })
        .unwrap_or_else(Utc::now)
}

/// Meeting chat with an unread counter for the presentation layer
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
    unread: u32,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the history endpoint. History does not count as unread.
    pub fn seed(&mut self, history: Vec<ChatMessageData>) {
        self.entries = history
            .into_iter()
            .map(|m| ChatEntry {
                sender_id: Some(m.user_id),
                sender: m.name,
                timestamp: parse_timestamp(Some(&m.timestamp)),
                text: m.message,
                is_self: false,
            })
            .collect();
    }

    pub fn push_local(&mut self, local_id: ParticipantId, text: &str) -> ChatEntry {
        let entry = ChatEntry {
            sender_id: Some(local_id),
            sender: "You".to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
            is_self: true,
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn push_remote(&mut self, entry: ChatEntry) {
        self.entries.push(entry);
        self.unread = (self.unread + 1).min(MAX_UNREAD);
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn mark_read(&mut self) {
        self.unread = 0;
    }
}
