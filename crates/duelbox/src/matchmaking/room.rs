//! Battle room state machine
//!
//! A room moves `Pending → InProgress → Completed` and never back. All
//! fields are private; every mutation goes through a method that refuses to
//! touch a completed room, which is what freezes the winner and the counts
//! once the battle is decided.
//!
//! Results are applied in the order they reach the owning task. If both
//! players reach a full pass in flight at the same time, the first result
//! applied takes the `Completed` transition and fixes the winner; the later
//! apply is refused as already completed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matchmaking::RoomError;

/// Mint a room identifier
pub fn new_room_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("room_{}", &hex[..12])
}

/// Lifecycle of a battle room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    /// Created, no submissions yet
    Pending,
    /// At least one submission received
    InProgress,
    /// One player passed every test (or won by forfeit); terminal
    Completed,
}

/// Outcome of storing a code sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSync {
    /// The stored code changed; the peer should hear about it
    Updated,
    /// Identical to what was already stored; nothing observable happened
    Unchanged,
}

/// Outcome of applying an execution result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomUpdate {
    /// Counts recorded; the battle continues
    Progress,
    /// Full pass: the room completed and the submitter won
    Won,
}

/// One player's half of a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSlot {
    identity: String,
    display_name: String,
    rating: i32,
    code: String,
    passed: usize,
    connected: bool,
}

impl PlayerSlot {
    fn new(identity: &str, display_name: &str, rating: i32) -> Self {
        Self {
            identity: identity.to_string(),
            display_name: display_name.to_string(),
            rating,
            code: String::new(),
            passed: 0,
            connected: true,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn rating(&self) -> i32 {
        self.rating
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// The authoritative state of one pairing
#[derive(Debug)]
pub struct BattleRoom {
    id: String,
    challenge_id: String,
    slots: [PlayerSlot; 2],
    total_tests: usize,
    status: BattleStatus,
    winner: Option<String>,
}

impl BattleRoom {
    /// Create a pending room for two players
    pub fn new(
        id: String,
        challenge_id: &str,
        players: [(&str, &str, i32); 2],
        total_tests: usize,
    ) -> Self {
        let [(id_a, name_a, rating_a), (id_b, name_b, rating_b)] = players;
        Self {
            id,
            challenge_id: challenge_id.to_string(),
            slots: [
                PlayerSlot::new(id_a, name_a, rating_a),
                PlayerSlot::new(id_b, name_b, rating_b),
            ],
            total_tests,
            status: BattleStatus::Pending,
            winner: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn challenge_id(&self) -> &str {
        &self.challenge_id
    }

    pub fn status(&self) -> BattleStatus {
        self.status
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn total_tests(&self) -> usize {
        self.total_tests
    }

    pub fn is_completed(&self) -> bool {
        self.status == BattleStatus::Completed
    }

    /// Whether the identity is one of the two players
    pub fn contains(&self, identity: &str) -> bool {
        self.slots.iter().any(|s| s.identity == identity)
    }

    /// The slot for an identity
    pub fn slot(&self, identity: &str) -> Option<&PlayerSlot> {
        self.slots.iter().find(|s| s.identity == identity)
    }

    /// The other player's slot
    pub fn opponent_of(&self, identity: &str) -> Option<&PlayerSlot> {
        if !self.contains(identity) {
            return None;
        }
        self.slots.iter().find(|s| s.identity != identity)
    }

    /// Both players' identities
    pub fn identities(&self) -> [&str; 2] {
        [&self.slots[0].identity, &self.slots[1].identity]
    }

    fn slot_mut(&mut self, identity: &str) -> Result<&mut PlayerSlot, RoomError> {
        self.slots
            .iter_mut()
            .find(|s| s.identity == identity)
            .ok_or(RoomError::UnknownParticipant)
    }

    fn refuse_if_completed(&self) -> Result<(), RoomError> {
        if self.is_completed() {
            return Err(RoomError::AlreadyCompleted);
        }
        Ok(())
    }

    /// Store a player's latest code, last write winning
    ///
    /// Identical code reports `Unchanged` so repeated syncs of the same text
    /// have no observable effect past the first.
    pub fn sync_code(&mut self, identity: &str, code: &str) -> Result<CodeSync, RoomError> {
        self.refuse_if_completed()?;
        let slot = self.slot_mut(identity)?;
        if slot.code == code {
            return Ok(CodeSync::Unchanged);
        }
        slot.code = code.to_string();
        Ok(CodeSync::Updated)
    }

    /// Note that a submission was received, entering `InProgress`
    pub fn record_submission(&mut self, identity: &str) -> Result<(), RoomError> {
        self.refuse_if_completed()?;
        self.slot_mut(identity)?;
        if self.status == BattleStatus::Pending {
            self.status = BattleStatus::InProgress;
        }
        Ok(())
    }

    /// Apply an execution result for one player
    ///
    /// A full pass takes the one-way `Completed` transition and records the
    /// winner. Applying to an already-completed room is refused, leaving the
    /// recorded winner and counts untouched.
    pub fn apply_result(&mut self, identity: &str, passed: usize) -> Result<RoomUpdate, RoomError> {
        self.refuse_if_completed()?;
        let total = self.total_tests;
        let slot = self.slot_mut(identity)?;
        slot.passed = passed.min(total);

        if self.status == BattleStatus::Pending {
            self.status = BattleStatus::InProgress;
        }

        if total > 0 && passed >= total {
            self.status = BattleStatus::Completed;
            self.winner = Some(identity.to_string());
            return Ok(RoomUpdate::Won);
        }
        Ok(RoomUpdate::Progress)
    }

    /// Complete the room in the remaining player's favor
    ///
    /// Used when a disconnected player's grace period runs out. Returns the
    /// winning slot.
    pub fn forfeit(&mut self, leaver: &str) -> Result<&PlayerSlot, RoomError> {
        self.refuse_if_completed()?;
        if !self.contains(leaver) {
            return Err(RoomError::UnknownParticipant);
        }
        let winner_index = self
            .slots
            .iter()
            .position(|s| s.identity != leaver)
            .ok_or(RoomError::UnknownParticipant)?;
        self.status = BattleStatus::Completed;
        self.winner = Some(self.slots[winner_index].identity.clone());
        Ok(&self.slots[winner_index])
    }

    /// Track a player's connection state
    pub fn set_connected(&mut self, identity: &str, connected: bool) -> Result<(), RoomError> {
        self.refuse_if_completed()?;
        self.slot_mut(identity)?.connected = connected;
        Ok(())
    }

    /// Read-only snapshot for operational introspection
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            challenge_id: self.challenge_id.clone(),
            status: self.status,
            total_tests: self.total_tests,
            winner: self.winner.clone(),
            players: [
                PlayerSnapshot::from(&self.slots[0]),
                PlayerSnapshot::from(&self.slots[1]),
            ],
        }
    }
}

/// Read-only view of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub challenge_id: String,
    pub status: BattleStatus,
    pub total_tests: usize,
    pub winner: Option<String>,
    pub players: [PlayerSnapshot; 2],
}

/// Read-only view of one player's half
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub identity: String,
    pub display_name: String,
    pub rating: i32,
    pub code: String,
    pub passed: usize,
    pub connected: bool,
}

impl From<&PlayerSlot> for PlayerSnapshot {
    fn from(slot: &PlayerSlot) -> Self {
        Self {
            identity: slot.identity.clone(),
            display_name: slot.display_name.clone(),
            rating: slot.rating,
            code: slot.code.clone(),
            passed: slot.passed,
            connected: slot.connected,
        }
    }
}
