//! One-time reservation tokens for prepared games.
//!
//! An administrator prepares a game and hands each token to the client
//! meant to play that slot. Redeeming removes the token under the
//! registry lock, so two clients racing with the same token cannot both
//! win.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use gamehall_protocol::{RoomId, SlotIndex};
use rand::Rng;

use crate::RoomError;

/// Token length in random bytes. Tokens are hex encoded.
const TOKEN_BYTES: usize = 16;

/// Where a redeemed token sends its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub room_id: RoomId,
    pub slot: SlotIndex,
}

/// Issued and not yet redeemed reservation tokens.
#[derive(Debug, Default)]
pub struct ReservationRegistry {
    tokens: Mutex<HashMap<String, Reservation>>,
}

impl ReservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Reservation>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a fresh token for `slot` of `room_id`.
    pub fn issue(&self, room_id: RoomId, slot: SlotIndex) -> String {
        let mut tokens = self.lock();
        loop {
            let token = generate_token();
            if !tokens.contains_key(&token) {
                tokens.insert(token.clone(), Reservation { room_id, slot });
                return token;
            }
        }
    }

    /// Consumes `token`. A token can be redeemed once.
    pub fn redeem(&self, token: &str) -> Result<Reservation, RoomError> {
        self.lock().remove(token).ok_or(RoomError::ReservationInvalid)
    }

    /// Drops `token` without using it. Returns `false` if it was unknown
    /// or already redeemed.
    pub fn free(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    /// Drops every token of `room_id`. Returns how many were dropped.
    pub fn free_room(&self, room_id: RoomId) -> usize {
        let mut tokens = self.lock();
        let before = tokens.len();
        tokens.retain(|_, r| r.room_id != room_id);
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
