//! Matchmaking primitives
//!
//! The queue and the battle room are plain data structures with no interior
//! locking; the arena's single coordinating task is their only owner, which
//! is what makes their invariants hold under concurrent traffic.

use thiserror::Error;

pub use crate::matchmaking::queue::{MatchQueue, QueueEntry};
pub use crate::matchmaking::room::{
    BattleRoom, BattleStatus, CodeSync, PlayerSlot, PlayerSnapshot, RoomSnapshot, RoomUpdate,
    new_room_id,
};

pub mod queue;
pub mod room;

/// Errors from queue operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("identity is already queued")]
    AlreadyQueued,
}

/// Errors from battle room operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("battle already completed")]
    AlreadyCompleted,

    #[error("identity is not a participant in this room")]
    UnknownParticipant,
}
