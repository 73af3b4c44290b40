use crate::JoinError;
use crate::room::{Placement, Room};
use proxima_core::{AudioState, JoinRequest, PeerId, PeerSummary};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Result of a successful join: where the peer landed and who was already there.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub placement: Placement,
    pub existing: Vec<PeerSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub name: String,
    pub has_password: bool,
    pub instances: Vec<InstanceView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub instance: u32,
    pub peers: Vec<PeerId>,
}

/// Room and instance tree. Every decision that spans rooms happens under one lock,
/// which is never held across an await or while touching the connection table.
pub struct RoomManager {
    rooms: Mutex<HashMap<String, Room>>,
    public_prefix: String,
}

impl RoomManager {
    pub fn new(public_prefix: impl Into<String>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            public_prefix: public_prefix.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_public(&self, room_name: &str) -> bool {
        room_name.starts_with(&self.public_prefix)
    }

    pub fn join(&self, req: &JoinRequest) -> Result<JoinOutcome, JoinError> {
        let mut rooms = self.lock();

        let (room, instance) = if self.is_public(&req.room_name) {
            let room = rooms.entry(req.room_name.clone()).or_default();
            let instance = req
                .players_in_instance
                .iter()
                .find_map(|hint| room.instance_of(hint))
                .unwrap_or_else(|| room.lowest_free_instance());
            (room, instance)
        } else if req.peer_id.as_str() == req.room_name {
            let room = rooms.entry(req.room_name.clone()).or_default();
            room.set_password(req.room_password.clone());
            (room, 0)
        } else {
            let room = rooms
                .get_mut(&req.room_name)
                .ok_or(JoinError::RoomNotFound)?;
            if !room.password_matches(&req.room_password) {
                return Err(JoinError::IncorrectPassword);
            }
            (room, 0)
        };

        let inst = room.instance_or_create(instance);
        let existing = inst.members().to_vec();
        inst.insert(PeerSummary::new(req.peer_id.clone(), req.peer_type.clone()));

        info!(
            "Peer {} joined room '{}' instance {} ({} already present)",
            req.peer_id,
            req.room_name,
            instance,
            existing.len()
        );

        Ok(JoinOutcome {
            placement: Placement::new(req.room_name.clone(), instance),
            existing,
        })
    }

    /// Removes the peer and collects its instance and room when they empty.
    /// Returns the members left behind.
    pub fn leave(&self, placement: &Placement, peer_id: &PeerId) -> Vec<PeerId> {
        let mut rooms = self.lock();
        let Some(room) = rooms.get_mut(&placement.room_name) else {
            return Vec::new();
        };

        let remaining = match room.instance_mut(placement.instance) {
            Some(inst) => {
                inst.remove(peer_id);
                inst.members().iter().map(|m| m.peer_id.clone()).collect()
            }
            None => Vec::new(),
        };

        if room.collect_instance(placement.instance) {
            rooms.remove(&placement.room_name);
            debug!("Room '{}' is empty, dropped", placement.room_name);
        }
        remaining
    }

    pub fn set_audio_state(&self, placement: &Placement, peer_id: &PeerId, state: AudioState) -> bool {
        let mut rooms = self.lock();
        rooms
            .get_mut(&placement.room_name)
            .and_then(|room| room.instance_mut(placement.instance))
            .is_some_and(|inst| inst.set_audio_state(peer_id, state))
    }

    pub fn members(&self, placement: &Placement) -> Vec<PeerId> {
        let rooms = self.lock();
        rooms
            .get(&placement.room_name)
            .and_then(|room| room.instance(placement.instance))
            .map(|inst| inst.members().iter().map(|m| m.peer_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, placement: &Placement, peer_id: &PeerId) -> bool {
        let rooms = self.lock();
        rooms
            .get(&placement.room_name)
            .and_then(|room| room.instance(placement.instance))
            .is_some_and(|inst| inst.contains(peer_id))
    }

    pub fn summary(&self, placement: &Placement, peer_id: &PeerId) -> Option<PeerSummary> {
        let rooms = self.lock();
        rooms
            .get(&placement.room_name)
            .and_then(|room| room.instance(placement.instance))
            .and_then(|inst| inst.members().iter().find(|m| &m.peer_id == peer_id).cloned())
    }

    pub fn room_count(&self) -> usize {
        self.lock().len()
    }

    pub fn snapshot(&self) -> Vec<RoomView> {
        let rooms = self.lock();
        let mut views: Vec<RoomView> = rooms
            .iter()
            .map(|(name, room)| RoomView {
                name: name.clone(),
                has_password: room.has_password(),
                instances: room
                    .instances()
                    .map(|(number, inst)| InstanceView {
                        instance: number,
                        peers: inst.members().iter().map(|m| m.peer_id.clone()).collect(),
                    })
                    .collect(),
            })
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }
}
