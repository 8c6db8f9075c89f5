//! Room registry: named topics with membership by user id.
//!
//! Membership is independent of connection count; it survives a user's
//! individual connection churn and is purged entirely when the user's last
//! connection closes. Rooms are created lazily on first join and deleted
//! when emptied.

use std::collections::{BTreeMap, HashSet};

use dashmap::DashMap;

use crate::auth::session::Role;

/// Broadcast room every connection joins.
pub const GLOBAL_ROOM: &str = "global";
pub const CLIENTS_ROOM: &str = "clients";
pub const PRESSINGS_ROOM: &str = "pressings";
pub const ADMINS_ROOM: &str = "admins";

/// Room gathering every user of one role class.
pub fn role_room(role: Role) -> &'static str {
    match role {
        Role::Client => CLIENTS_ROOM,
        Role::Pressing => PRESSINGS_ROOM,
        Role::Admin => ADMINS_ROOM,
    }
}

/// Private room addressing a single user regardless of device count.
pub fn private_room(role: Role, user_id: &str) -> String {
    format!("{}_{}", role.as_str(), user_id)
}

/// Rooms joined automatically on connect: the global room, the role-class
/// room and the private per-user room. Admins additionally join both class
/// rooms to receive all marketplace traffic.
pub fn default_rooms(role: Role, user_id: &str) -> Vec<String> {
    let mut rooms = vec![
        GLOBAL_ROOM.to_string(),
        role_room(role).to_string(),
        private_room(role, user_id),
    ];
    if role == Role::Admin {
        rooms.push(CLIENTS_ROOM.to_string());
        rooms.push(PRESSINGS_ROOM.to_string());
    }
    rooms
}

/// Process-wide map from room id to member user ids.
pub struct RoomRegistry {
    rooms: DashMap<String, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add the user to the room, creating it on first join. Idempotent.
    pub fn join(&self, user_id: &str, room: &str) {
        let _ = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Remove the user; the room is deleted once its member set is empty.
    pub fn leave(&self, user_id: &str, room: &str) {
        let mut emptied = false;
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(user_id);
            emptied = members.is_empty();
        }
        if emptied {
            let _ = self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    /// Drop the user from every room it belongs to, deleting rooms left
    /// empty. Invoked when a user's last connection closes.
    pub fn leave_all(&self, user_id: &str) {
        let mut emptied = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            entry.value_mut().remove(user_id);
            if entry.value().is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for room in emptied {
            let _ = self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
    }

    /// Current member set; empty if the room does not exist.
    pub fn members_of(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Member counts per room, for the stats endpoint.
    pub fn member_counts(&self) -> BTreeMap<String, usize> {
        self.rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    /// User ids currently holding any room membership.
    pub fn users(&self) -> HashSet<String> {
        self.rooms
            .iter()
            .flat_map(|entry| entry.value().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn clear(&self) {
        self.rooms.clear();
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
