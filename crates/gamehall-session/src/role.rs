//! Roles a session can hold, and the authorization rules over them.
//!
//! Roles carry data only. Every permission check is a free function over
//! a role list, so the rules live in one place.

use gamehall_protocol::{RoomId, SlotIndex};

/// A capability held by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Bound to one slot of one room until that room finishes.
    Player { room_id: RoomId, slot: SlotIndex },
    /// Knows the administrative secret.
    Administrator,
    /// Receives a room's broadcasts and may pause or step it.
    Observer { room_id: RoomId },
}

pub fn is_administrator(roles: &[Role]) -> bool {
    roles.contains(&Role::Administrator)
}

/// The slot this session plays in `room_id`, if any.
pub fn player_slot(roles: &[Role], room_id: RoomId) -> Option<SlotIndex> {
    roles.iter().find_map(|role| match *role {
        Role::Player { room_id: r, slot } if r == room_id => Some(slot),
        _ => None,
    })
}

pub fn observes(roles: &[Role], room_id: RoomId) -> bool {
    roles.contains(&Role::Observer { room_id })
}

/// Pause and step are open to administrators and to observers of the
/// room in question.
pub fn can_control(roles: &[Role], room_id: RoomId) -> bool {
    is_administrator(roles) || observes(roles, room_id)
}

/// Whether `role` ties the session to `room_id`.
pub fn concerns(role: &Role, room_id: RoomId) -> bool {
    match *role {
        Role::Player { room_id: r, .. } | Role::Observer { room_id: r } => r == room_id,
        Role::Administrator => false,
    }
}

/// Every room the session is attached to, as player or observer.
pub fn attached_rooms(roles: &[Role]) -> Vec<RoomId> {
    let mut rooms: Vec<RoomId> = roles
        .iter()
        .filter_map(|role| match *role {
            Role::Player { room_id, .. } | Role::Observer { room_id } => {
                Some(room_id)
            }
            Role::Administrator => None,
        })
        .collect();
    rooms.sort();
    rooms.dedup();
    rooms
}
