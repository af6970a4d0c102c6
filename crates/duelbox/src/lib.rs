//! A library for real-time 1v1 code battles over sandboxed execution.
//!
//! Duelbox pairs two players on a shared challenge, runs each untrusted
//! Python submission in a resource-limited child process, scores it against
//! the challenge's hidden tests, and reflects results to both sides. The
//! transport to real clients is out of scope; per-participant event channels
//! stand in for it.
//!
//! # Features
//!
//! - **Sandboxed execution** — submissions run in fresh OS processes under
//!   rlimits, wall-clock timeouts, and capped output capture.
//! - **Structural validation** — submissions are parsed into a full syntax
//!   tree and screened against a capability denylist before anything spawns.
//! - **Bounded concurrency** — a fixed pool of execution slots caps live
//!   child processes regardless of submission rate.
//! - **Rating-window matchmaking** — FIFO queue with a skill tolerance
//!   window and deterministic tie-breaks.
//! - **Single-owner orchestration** — one task owns the queue and the room
//!   table, so battle invariants hold without locks.
//! - **TOML configuration** — limits and the challenge library load from a
//!   config file, with an embedded starter config.

pub use arena::{Arena, ChallengeBrief, ConnectionHandle, Event, OpponentBrief, Rejection};
pub use config::{Challenge, Config, ConfigError, Difficulty, EXAMPLE_CONFIG, EntryPoint, TestCase};
pub use matchmaking::{
    BattleRoom, BattleStatus, CodeSync, MatchQueue, PlayerSnapshot, QueueEntry, QueueError,
    RoomError, RoomSnapshot, RoomUpdate,
};
pub use pool::{ExecutionJob, ExecutionPool};
pub use sandbox::{Sandbox, SandboxError};
pub use types::{ExecutionResult, FailureKind, ResourceLimits, TestOutcome, TestStatus};
pub use validator::{RejectReason, validate};

pub mod arena;
pub mod config;
pub mod matchmaking;
pub mod pool;
pub mod sandbox;
pub mod types;
pub mod validator;
