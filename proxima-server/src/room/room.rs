use proxima_core::{AudioState, PeerId, PeerSummary};
use serde::Serialize;
use std::collections::BTreeMap;

/// Where a connected peer lives: room name plus instance number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub room_name: String,
    pub instance: u32,
}

impl Placement {
    pub fn new(room_name: impl Into<String>, instance: u32) -> Self {
        Self {
            room_name: room_name.into(),
            instance,
        }
    }
}

/// One sub-partition of a room. Members are kept in join order.
#[derive(Debug, Default)]
pub struct Instance {
    members: Vec<PeerSummary>,
}

impl Instance {
    pub fn members(&self) -> &[PeerSummary] {
        &self.members
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.members.iter().any(|m| &m.peer_id == peer_id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn insert(&mut self, summary: PeerSummary) {
        self.members.push(summary);
    }

    pub(crate) fn remove(&mut self, peer_id: &PeerId) -> Option<PeerSummary> {
        let idx = self.members.iter().position(|m| &m.peer_id == peer_id)?;
        Some(self.members.remove(idx))
    }

    pub(crate) fn set_audio_state(&mut self, peer_id: &PeerId, state: AudioState) -> bool {
        match self.members.iter_mut().find(|m| &m.peer_id == peer_id) {
            Some(member) => {
                member.audio_state = state;
                true
            }
            None => false,
        }
    }
}

/// A named rendezvous group. Dropped by the registry once its last instance empties.
#[derive(Debug, Default)]
pub struct Room {
    password: Option<String>,
    instances: BTreeMap<u32, Instance>,
}

impl Room {
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub(crate) fn set_password(&mut self, password: String) {
        self.password = Some(password);
    }

    pub(crate) fn password_matches(&self, candidate: &str) -> bool {
        self.password.as_deref().unwrap_or_default() == candidate
    }

    pub fn instances(&self) -> impl Iterator<Item = (u32, &Instance)> {
        self.instances.iter().map(|(n, i)| (*n, i))
    }

    pub fn instance(&self, number: u32) -> Option<&Instance> {
        self.instances.get(&number)
    }

    pub(crate) fn instance_mut(&mut self, number: u32) -> Option<&mut Instance> {
        self.instances.get_mut(&number)
    }

    pub(crate) fn instance_or_create(&mut self, number: u32) -> &mut Instance {
        self.instances.entry(number).or_default()
    }

    /// Instance that already holds `peer_id`, if any.
    pub fn instance_of(&self, peer_id: &PeerId) -> Option<u32> {
        self.instances
            .iter()
            .find(|(_, inst)| inst.contains(peer_id))
            .map(|(n, _)| *n)
    }

    /// Lowest instance number with no live instance behind it.
    pub fn lowest_free_instance(&self) -> u32 {
        let mut candidate = 0;
        for number in self.instances.keys() {
            if *number != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    /// Drops `number` if it has no members left. Returns whether the room is now empty.
    pub(crate) fn collect_instance(&mut self, number: u32) -> bool {
        if self.instances.get(&number).is_some_and(Instance::is_empty) {
            self.instances.remove(&number);
        }
        self.instances.is_empty()
    }
}
