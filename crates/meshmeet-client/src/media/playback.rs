use std::collections::BTreeSet;

use meshmeet_protocol::ParticipantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No user interaction yet, remote audio is held back
    PendingUnlock,
    Unlocked,
}

/// Audio autoplay gate. Locked until the first confirmed user interaction,
/// then stays open for the rest of the session.
#[derive(Debug)]
pub struct PlaybackGate {
    state: PlaybackState,
    pending: BTreeSet<ParticipantId>,
    reported: bool,
}

impl Default for PlaybackGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackGate {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::PendingUnlock,
            pending: BTreeSet::new(),
            reported: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == PlaybackState::Unlocked
    }

    /// Record remote audio from `id`. Returns true the first time playback
    /// gets blocked, which is when the presentation layer should ask for
    /// an interaction.
    pub fn on_remote_audio(&mut self, id: ParticipantId) -> bool {
        if self.is_unlocked() {
            return false;
        }
        self.pending.insert(id);
        !std::mem::replace(&mut self.reported, true)
    }

    pub fn pending(&self) -> Vec<ParticipantId> {
        self.pending.iter().copied().collect()
    }

    pub fn forget(&mut self, id: ParticipantId) {
        self.pending.remove(&id);
    }

    /// Open the gate and release everything held back
    pub fn unlock(&mut self) -> Vec<ParticipantId> {
        if !self.is_unlocked() {
            tracing::info!("Audio playback unlocked");
        }
        self.state = PlaybackState::Unlocked;
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}
