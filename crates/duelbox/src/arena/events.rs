//! Outbound events and rejection reasons
//!
//! The transport to real clients is out of scope; an event channel per
//! participant stands in for it. Events are serde-serializable so a transport
//! layer can frame them however it likes.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{Challenge, Difficulty};
use crate::types::{FailureKind, TestOutcome};

/// Per-participant delivery channel for [`Event`]s
///
/// Stands in for a client connection. A dropped receiver simply discards
/// further events for that participant.
pub type ConnectionHandle = mpsc::UnboundedSender<Event>;

/// Everything the system says back to a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Registration acknowledged
    Registered {
        identity: String,
        display_name: String,
    },

    /// Joined the matchmaking queue at the given 1-based position
    Queued { position: usize },

    /// Removed from the queue (left, or waited past the expiry bound)
    Dequeued,

    /// Paired into a battle room
    Matched {
        room_id: String,
        challenge: ChallengeBrief,
        opponent: OpponentBrief,
        test_count: usize,
    },

    /// Outcome of a submission, broadcast to both players
    SubmissionResult {
        identity: String,
        passed: usize,
        total: usize,
        tests: Vec<TestOutcome>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<FailureKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diagnostic: Option<String>,
    },

    /// The opponent's editor content changed
    PeerCodeUpdate { code: String },

    /// The battle is decided
    BattleComplete {
        winner_identity: String,
        winner_display_name: String,
        loser_display_name: String,
    },

    /// A request was refused; no side effects took place
    Rejected { reason: Rejection },
}

/// Challenge summary shipped with a match notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeBrief {
    pub id: String,
    pub name: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub test_count: usize,
}

impl ChallengeBrief {
    pub fn new(id: &str, challenge: &Challenge) -> Self {
        Self {
            id: id.to_string(),
            name: challenge.name.clone(),
            description: challenge.description.clone(),
            difficulty: challenge.difficulty,
            test_count: challenge.test_count(),
        }
    }
}

/// Opponent summary shipped with a match notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentBrief {
    pub display_name: String,
    pub rating: i32,
}

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("not registered")]
    NotRegistered,

    #[error("already queued")]
    AlreadyQueued,

    #[error("already in an active battle")]
    AlreadyInBattle,

    #[error("not in the queue")]
    NotQueued,

    #[error("unknown challenge")]
    UnknownChallenge,

    #[error("unknown room")]
    UnknownRoom,

    #[error("not a participant in this room")]
    NotAParticipant,

    #[error("battle already completed")]
    BattleCompleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::Queued { position: 3 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"queued","position":3}"#);
    }

    #[test]
    fn rejection_serializes_snake_case() {
        let event = Event::Rejected {
            reason: Rejection::BattleCompleted,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"battle_completed\""));
    }

    #[test]
    fn submission_result_omits_empty_failure() {
        let event = Event::SubmissionResult {
            identity: "alice".to_string(),
            passed: 5,
            total: 5,
            tests: Vec::new(),
            failure: None,
            diagnostic: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("failure"));
        assert!(!json.contains("diagnostic"));
    }

    #[test]
    fn events_round_trip() {
        let event = Event::BattleComplete {
            winner_identity: "alice".to_string(),
            winner_display_name: "Alice".to_string(),
            loser_display_name: "Bob".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
