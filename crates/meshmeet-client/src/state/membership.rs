//! Room membership table
//!
//! The local view of who is in the meeting. Snapshots merge by union and
//! never remove anyone; only a leave event removes a remote participant, and
//! nothing remote ever removes the local one.

use std::collections::BTreeMap;

use meshmeet_media::TrackKind;
use meshmeet_protocol::{ParticipantData, ParticipantId};

use crate::error::StaleEvent;
use crate::mesh::MediaHandle;

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub is_self: bool,
    pub mic_enabled: bool,
    pub camera_enabled: bool,
    pub media: Option<MediaHandle>,
}

impl Participant {
    fn remote(id: ParticipantId, name: &str) -> Self {
        Self {
            id,
            name: display_name(id, name),
            is_self: false,
            mic_enabled: true,
            camera_enabled: true,
            media: None,
        }
    }
}

fn display_name(id: ParticipantId, name: &str) -> String {
    if name.is_empty() {
        format!("User {}", id)
    } else {
        name.to_string()
    }
}

/// The effect of a leave event. `participant` is `None` when the id was
/// only known as the presenter.
#[derive(Debug)]
pub struct Departure {
    pub participant: Option<Participant>,
    pub was_presenting: bool,
}

#[derive(Debug)]
pub struct Membership {
    local_id: ParticipantId,
    local_name: String,
    participants: BTreeMap<ParticipantId, Participant>,
    presenter: Option<ParticipantId>,
}

impl Membership {
    pub fn new(local_id: ParticipantId, local_name: impl Into<String>) -> Self {
        Self {
            local_id,
            local_name: local_name.into(),
            participants: BTreeMap::new(),
            presenter: None,
        }
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    /// Current room view, local participant first
    pub fn get(&self) -> Vec<Participant> {
        let mut view: Vec<Participant> = self.participants.values().cloned().collect();
        view.sort_by_key(|p| !p.is_self);
        view
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn remote_ids(&self) -> Vec<ParticipantId> {
        self.participants
            .values()
            .filter(|p| !p.is_self)
            .map(|p| p.id)
            .collect()
    }

    pub fn presenter(&self) -> Option<ParticipantId> {
        self.presenter
    }

    /// Returns true if the presenter changed
    pub fn set_presenter(&mut self, presenter: Option<ParticipantId>) -> bool {
        if self.presenter == presenter {
            return false;
        }
        tracing::debug!("Presenter {:?} -> {:?}", self.presenter, presenter);
        self.presenter = presenter;
        true
    }

    /// Clear the presenter only if it is `id`
    pub fn clear_presenter_if(&mut self, id: ParticipantId) -> bool {
        if self.presenter == Some(id) {
            self.set_presenter(None)
        } else {
            false
        }
    }

    /// Install or refresh the local participant with its media
    pub fn bind_local_handle(&mut self, handle: MediaHandle, mic_enabled: bool, camera_enabled: bool) {
        let id = self.local_id;
        let name = self.local_name.clone();
        let local = self
            .participants
            .entry(id)
            .or_insert_with(|| Participant {
                id,
                name,
                is_self: true,
                mic_enabled,
                camera_enabled,
                media: None,
            });
        local.is_self = true;
        local.mic_enabled = mic_enabled;
        local.camera_enabled = camera_enabled;
        local.media = Some(handle);
    }

    pub fn set_local_flags(&mut self, mic: Option<bool>, cam: Option<bool>) {
        if let Some(local) = self.participants.get_mut(&self.local_id) {
            if let Some(mic) = mic {
                local.mic_enabled = mic;
            }
            if let Some(cam) = cam {
                local.camera_enabled = cam;
            }
        }
    }

    /// Idempotent. Returns true if the participant was not known before.
    pub fn apply_join(&mut self, data: &ParticipantData) -> bool {
        if data.id == self.local_id {
            return false;
        }

        let mut added = false;
        let entry = self.participants.entry(data.id).or_insert_with(|| {
            added = true;
            Participant::remote(data.id, &data.name)
        });
        if !data.name.is_empty() {
            entry.name = data.name.clone();
        }
        if let Some(mic) = data.mic {
            entry.mic_enabled = mic;
        }
        if let Some(cam) = data.cam {
            entry.camera_enabled = cam;
        }

        if added {
            tracing::info!("{} ({}) joined", entry.name, entry.id);
        }
        added
    }

    /// Remove a remote participant. The local participant is never removed.
    pub fn apply_leave(&mut self, id: ParticipantId) -> Option<Departure> {
        if id == self.local_id {
            return None;
        }

        let was_presenting = self.clear_presenter_if(id);
        let participant = self.participants.remove(&id);
        match &participant {
            Some(p) => tracing::info!("{} ({}) left", p.name, id),
            None if was_presenting => tracing::info!("Presenter {} left before joining", id),
            None => return None,
        }

        Some(Departure {
            participant,
            was_presenting,
        })
    }

    /// Union-merge a roster. Returns ids that were not known before.
    pub fn apply_snapshot(
        &mut self,
        participants: &[ParticipantData],
        presenter: Option<ParticipantId>,
    ) -> Vec<ParticipantId> {
        let added = participants
            .iter()
            .filter(|p| self.apply_join(p))
            .map(|p| p.id)
            .collect();

        if presenter.is_some() {
            self.set_presenter(presenter);
        }
        added
    }

    /// Update the flags of one remote participant. Absent flags are kept.
    pub fn apply_media_flags(
        &mut self,
        id: ParticipantId,
        mic: Option<bool>,
        cam: Option<bool>,
    ) -> Result<(), StaleEvent> {
        if id == self.local_id {
            return Ok(());
        }

        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(StaleEvent::UnknownParticipant(id))?;
        if let Some(mic) = mic {
            participant.mic_enabled = mic;
        }
        if let Some(cam) = cam {
            participant.camera_enabled = cam;
        }
        Ok(())
    }

    pub fn set_camera_flag(&mut self, id: ParticipantId, on: bool) -> Result<(), StaleEvent> {
        self.apply_media_flags(id, None, Some(on))
    }

    /// Attach a remote media handle. Track arrival counts as a first mention,
    /// so an unknown id is added. Returns true if the participant was created.
    pub fn bind_remote_media(&mut self, id: ParticipantId, handle: MediaHandle, kind: TrackKind) -> bool {
        if id == self.local_id {
            return false;
        }

        let mut created = false;
        let participant = self.participants.entry(id).or_insert_with(|| {
            created = true;
            Participant::remote(id, "")
        });
        participant.media = Some(handle);
        if created && kind == TrackKind::Video {
            participant.camera_enabled = true;
        }
        created
    }

    pub fn clear_media(&mut self, id: ParticipantId) {
        if let Some(participant) = self.participants.get_mut(&id) {
            if !participant.is_self {
                participant.media = None;
            }
        }
    }

    /// Forget every remote participant, e.g. when the mesh is torn down
    pub fn clear_remotes(&mut self) {
        self.participants.retain(|_, p| p.is_self);
        self.presenter = None;
    }
}
