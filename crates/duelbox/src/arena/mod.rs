//! Arena orchestrator
//!
//! One task owns the participant table, the matchmaking queue, and the room
//! table; every mutation arrives through its command mailbox and is applied
//! in order, so queue and room invariants hold without locks. The only slow
//! work, sandboxed execution, runs on the pool and re-enters the mailbox as
//! an internal command when it finishes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

pub use crate::arena::events::{ChallengeBrief, ConnectionHandle, Event, OpponentBrief, Rejection};
use crate::config::Config;
use crate::matchmaking::{
    BattleRoom, CodeSync, MatchQueue, RoomSnapshot, RoomUpdate, new_room_id,
};
use crate::pool::{ExecutionJob, ExecutionPool};
use crate::sandbox::Sandbox;
use crate::types::ExecutionResult;

pub mod events;

/// Handle to a running arena
///
/// Cheap to clone; every method is a non-blocking mailbox send. The arena
/// task keeps running until the runtime shuts down.
#[derive(Debug, Clone)]
pub struct Arena {
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Register {
        identity: String,
        display_name: String,
        rating: i32,
        handle: ConnectionHandle,
    },
    JoinQueue {
        identity: String,
        challenge_id: String,
    },
    LeaveQueue {
        identity: String,
    },
    Submit {
        identity: String,
        room_id: String,
        code: String,
    },
    Sync {
        identity: String,
        room_id: String,
        code: String,
    },
    Disconnect {
        identity: String,
    },
    // Internal re-entries
    SubmissionFinished {
        room_id: String,
        identity: String,
        result: ExecutionResult,
    },
    GraceExpired {
        room_id: String,
        identity: String,
    },
    PurgeRoom {
        room_id: String,
    },
    // Read-only introspection
    QueueDepth {
        reply: oneshot::Sender<usize>,
    },
    ActiveRooms {
        reply: oneshot::Sender<usize>,
    },
    RoomSnapshot {
        room_id: String,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
}

impl Arena {
    /// Start an arena task for the given configuration
    pub fn spawn(config: Config) -> Self {
        let config = Arc::new(config);
        let pool = ExecutionPool::new(
            Sandbox::from_shared(config.clone()),
            config.max_concurrent_executions,
        );
        let (commands, mailbox) = mpsc::unbounded_channel();

        let state = ArenaState {
            config,
            pool,
            commands: commands.clone(),
            participants: HashMap::new(),
            queue: MatchQueue::new(),
            rooms: HashMap::new(),
            member_rooms: HashMap::new(),
        };
        tokio::spawn(run_loop(state, mailbox));

        Self { commands }
    }

    /// Register a participant (or re-attach a reconnecting one)
    pub fn register(
        &self,
        identity: &str,
        display_name: &str,
        rating: i32,
        handle: ConnectionHandle,
    ) {
        self.send(Command::Register {
            identity: identity.to_string(),
            display_name: display_name.to_string(),
            rating,
            handle,
        });
    }

    /// Join the matchmaking queue for a challenge
    pub fn join_queue(&self, identity: &str, challenge_id: &str) {
        self.send(Command::JoinQueue {
            identity: identity.to_string(),
            challenge_id: challenge_id.to_string(),
        });
    }

    /// Leave the matchmaking queue
    pub fn leave_queue(&self, identity: &str) {
        self.send(Command::LeaveQueue {
            identity: identity.to_string(),
        });
    }

    /// Submit code for judging in a room
    pub fn submit(&self, identity: &str, room_id: &str, code: &str) {
        self.send(Command::Submit {
            identity: identity.to_string(),
            room_id: room_id.to_string(),
            code: code.to_string(),
        });
    }

    /// Mirror editor content to the opponent (no judging)
    pub fn sync(&self, identity: &str, room_id: &str, code: &str) {
        self.send(Command::Sync {
            identity: identity.to_string(),
            room_id: room_id.to_string(),
            code: code.to_string(),
        });
    }

    /// Note that a participant's connection dropped
    pub fn disconnect(&self, identity: &str) {
        self.send(Command::Disconnect {
            identity: identity.to_string(),
        });
    }

    /// Current number of waiting players
    pub async fn queue_depth(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(Command::QueueDepth { reply });
        rx.await.unwrap_or(0)
    }

    /// Current number of rooms (active and recently completed)
    pub async fn active_rooms(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ActiveRooms { reply });
        rx.await.unwrap_or(0)
    }

    /// Read-only snapshot of one room
    pub async fn room_snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RoomSnapshot {
            room_id: room_id.to_string(),
            reply,
        });
        rx.await.ok().flatten()
    }

    fn send(&self, command: Command) {
        // The arena task outlives every handle; a failed send can only mean
        // runtime shutdown, where dropping the command is correct anyway
        let _ = self.commands.send(command);
    }
}

struct Participant {
    display_name: String,
    rating: i32,
    handle: ConnectionHandle,
}

struct ArenaState {
    config: Arc<Config>,
    pool: ExecutionPool,
    commands: mpsc::UnboundedSender<Command>,
    participants: HashMap<String, Participant>,
    queue: MatchQueue,
    rooms: HashMap<String, BattleRoom>,
    /// identity -> room id, for rooms that are not yet completed
    member_rooms: HashMap<String, String>,
}

async fn run_loop(mut state: ArenaState, mut mailbox: mpsc::UnboundedReceiver<Command>) {
    let sweep_period = (state.config.queue_expiry() / 4)
        .clamp(Duration::from_secs(1), Duration::from_secs(60));
    let mut sweep = tokio::time::interval(sweep_period);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = mailbox.recv() => match command {
                Some(command) => state.handle(command),
                None => break,
            },
            _ = sweep.tick() => state.sweep_queue(),
        }
    }
}

impl ArenaState {
    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                identity,
                display_name,
                rating,
                handle,
            } => self.on_register(identity, display_name, rating, handle),
            Command::JoinQueue {
                identity,
                challenge_id,
            } => self.on_join_queue(&identity, &challenge_id),
            Command::LeaveQueue { identity } => self.on_leave_queue(&identity),
            Command::Submit {
                identity,
                room_id,
                code,
            } => self.on_submit(&identity, &room_id, &code),
            Command::Sync {
                identity,
                room_id,
                code,
            } => self.on_sync(&identity, &room_id, &code),
            Command::Disconnect { identity } => self.on_disconnect(&identity),
            Command::SubmissionFinished {
                room_id,
                identity,
                result,
            } => self.on_submission_finished(&room_id, &identity, result),
            Command::GraceExpired { room_id, identity } => {
                self.on_grace_expired(&room_id, &identity)
            }
            Command::PurgeRoom { room_id } => self.on_purge_room(&room_id),
            Command::QueueDepth { reply } => {
                let _ = reply.send(self.queue.len());
            }
            Command::ActiveRooms { reply } => {
                let _ = reply.send(self.rooms.len());
            }
            Command::RoomSnapshot { room_id, reply } => {
                let _ = reply.send(self.rooms.get(&room_id).map(BattleRoom::snapshot));
            }
        }
    }

    #[instrument(skip(self, handle))]
    fn on_register(
        &mut self,
        identity: String,
        display_name: String,
        rating: i32,
        handle: ConnectionHandle,
    ) {
        let display_name = match self.participants.get_mut(&identity) {
            // Reconnect: only the connection handle changes
            Some(existing) => {
                existing.handle = handle;
                existing.display_name.clone()
            }
            None => {
                self.participants.insert(
                    identity.clone(),
                    Participant {
                        display_name: display_name.clone(),
                        rating,
                        handle,
                    },
                );
                display_name
            }
        };

        info!(%identity, %display_name, "participant registered");
        self.send_to(
            &identity,
            Event::Registered {
                identity: identity.clone(),
                display_name,
            },
        );

        // Resume an active battle if one is waiting on this identity
        if let Some(room_id) = self.member_rooms.get(&identity).cloned()
            && let Some(room) = self.rooms.get_mut(&room_id)
            && !room.is_completed()
        {
            let _ = room.set_connected(&identity, true);
            debug!(%identity, %room_id, "reconnected into active battle");
            self.send_matched(&identity, &room_id);
        }
    }

    #[instrument(skip(self))]
    fn on_join_queue(&mut self, identity: &str, challenge_id: &str) {
        let Some(participant) = self.participants.get(identity) else {
            warn!(identity, "join_queue from unregistered identity");
            return;
        };

        if self.member_rooms.contains_key(identity) {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::AlreadyInBattle,
                },
            );
            return;
        }

        if self.config.get_challenge(challenge_id).is_err() {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::UnknownChallenge,
                },
            );
            return;
        }

        let display_name = participant.display_name.clone();
        let rating = participant.rating;
        match self
            .queue
            .enqueue(identity, &display_name, rating, challenge_id)
        {
            Ok(position) => {
                info!(identity, challenge_id, position, "joined queue");
                self.send_to(identity, Event::Queued { position });
            }
            Err(_) => {
                self.send_to(
                    identity,
                    Event::Rejected {
                        reason: Rejection::AlreadyQueued,
                    },
                );
                return;
            }
        }

        self.drain_matches();
    }

    fn on_leave_queue(&mut self, identity: &str) {
        if self.queue.dequeue(identity) {
            info!(identity, "left queue");
            self.send_to(identity, Event::Dequeued);
        } else {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::NotQueued,
                },
            );
        }
    }

    /// Pair players until no head-of-queue match remains
    fn drain_matches(&mut self) {
        let tolerance = self.config.rating_tolerance;
        while let Some((first, second)) = self.queue.try_match(tolerance) {
            let Ok(challenge) = self.config.get_challenge(&first.challenge_id) else {
                // Entries only enter the queue with known challenges
                warn!(challenge_id = %first.challenge_id, "matched unknown challenge");
                continue;
            };
            let total = challenge.test_count();

            let room_id = new_room_id();
            let room = BattleRoom::new(
                room_id.clone(),
                &first.challenge_id,
                [
                    (first.identity.as_str(), first.display_name.as_str(), first.rating),
                    (second.identity.as_str(), second.display_name.as_str(), second.rating),
                ],
                total,
            );
            self.rooms.insert(room_id.clone(), room);
            self.member_rooms
                .insert(first.identity.clone(), room_id.clone());
            self.member_rooms
                .insert(second.identity.clone(), room_id.clone());

            info!(
                %room_id,
                player1 = %first.identity,
                player2 = %second.identity,
                challenge_id = %first.challenge_id,
                "match created"
            );
            self.send_matched(&first.identity, &room_id);
            self.send_matched(&second.identity, &room_id);
        }
    }

    fn send_matched(&self, identity: &str, room_id: &str) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let Some(opponent) = room.opponent_of(identity) else {
            return;
        };
        let Ok(challenge) = self.config.get_challenge(room.challenge_id()) else {
            return;
        };

        self.send_to(
            identity,
            Event::Matched {
                room_id: room_id.to_string(),
                challenge: ChallengeBrief::new(room.challenge_id(), challenge),
                opponent: OpponentBrief {
                    display_name: opponent.display_name().to_string(),
                    rating: opponent.rating(),
                },
                test_count: room.total_tests(),
            },
        );
    }

    #[instrument(skip(self, code))]
    fn on_sync(&mut self, identity: &str, room_id: &str, code: &str) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::UnknownRoom,
                },
            );
            return;
        };
        if !room.contains(identity) {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::NotAParticipant,
                },
            );
            return;
        }

        match room.sync_code(identity, code) {
            Ok(CodeSync::Updated) => {
                let peer = room
                    .opponent_of(identity)
                    .map(|slot| slot.identity().to_string());
                let code = code.to_string();
                if let Some(peer) = peer {
                    self.send_to(&peer, Event::PeerCodeUpdate { code });
                }
            }
            // Identical content: the peer already saw this code
            Ok(CodeSync::Unchanged) => {}
            Err(_) => {
                self.send_to(
                    identity,
                    Event::Rejected {
                        reason: Rejection::BattleCompleted,
                    },
                );
            }
        }
    }

    #[instrument(skip(self, code))]
    fn on_submit(&mut self, identity: &str, room_id: &str, code: &str) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::UnknownRoom,
                },
            );
            return;
        };
        if !room.contains(identity) {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::NotAParticipant,
                },
            );
            return;
        }
        if room.record_submission(identity).is_err() {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::BattleCompleted,
                },
            );
            return;
        }
        let _ = room.sync_code(identity, code);

        let challenge_id = room.challenge_id().to_string();
        let Ok(challenge) = self.config.get_challenge(&challenge_id) else {
            self.send_to(
                identity,
                Event::Rejected {
                    reason: Rejection::UnknownChallenge,
                },
            );
            return;
        };

        info!(identity, room_id, %challenge_id, "submission accepted");
        let receiver = self.pool.submit(ExecutionJob {
            code: code.to_string(),
            challenge: challenge.clone(),
            limits: None,
        });

        // Re-enter the mailbox when the run finishes so the result is
        // applied on the coordinating task, in receipt order
        let commands = self.commands.clone();
        let room_id = room_id.to_string();
        let identity = identity.to_string();
        tokio::spawn(async move {
            if let Ok(result) = receiver.await {
                let _ = commands.send(Command::SubmissionFinished {
                    room_id,
                    identity,
                    result,
                });
            }
        });
    }

    #[instrument(skip(self, result))]
    fn on_submission_finished(&mut self, room_id: &str, identity: &str, result: ExecutionResult) {
        let event = Event::SubmissionResult {
            identity: identity.to_string(),
            passed: result.passed,
            total: result.total,
            tests: result.tests.clone(),
            failure: result.failure.is_failure().then_some(result.failure),
            diagnostic: result.diagnostic.clone(),
        };

        let Some(room) = self.rooms.get_mut(room_id) else {
            // Room purged or forfeited while the job ran; the submitter
            // still gets their feedback
            self.send_to(identity, event);
            return;
        };
        if !room.contains(identity) {
            return;
        }

        if room.is_completed() {
            // An in-flight result that lost the completion race: feedback
            // only, the room stays frozen
            self.send_to(identity, event);
            return;
        }

        let update = room.apply_result(identity, result.passed);
        let members: Vec<String> = room
            .identities()
            .iter()
            .map(|id| id.to_string())
            .collect();
        for member in &members {
            self.send_to(member, event.clone());
        }

        info!(
            identity,
            room_id,
            passed = result.passed,
            total = result.total,
            failure = %result.failure,
            "submission result applied"
        );

        if let Ok(RoomUpdate::Won) = update {
            self.complete_room(room_id);
        }
    }

    /// Broadcast the outcome and detach both players from a decided room
    fn complete_room(&mut self, room_id: &str) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let Some(winner_identity) = room.winner().map(str::to_string) else {
            return;
        };
        let Some(winner) = room.slot(&winner_identity) else {
            return;
        };
        let Some(loser) = room.opponent_of(&winner_identity) else {
            return;
        };

        let event = Event::BattleComplete {
            winner_identity: winner_identity.clone(),
            winner_display_name: winner.display_name().to_string(),
            loser_display_name: loser.display_name().to_string(),
        };
        let members: Vec<String> = room
            .identities()
            .iter()
            .map(|id| id.to_string())
            .collect();
        for member in &members {
            self.send_to(member, event.clone());
            self.member_rooms.remove(member);
        }

        info!(room_id, winner = %winner_identity, "battle complete");
        self.schedule_purge(room_id);
    }

    #[instrument(skip(self))]
    fn on_disconnect(&mut self, identity: &str) {
        self.queue.dequeue(identity);
        self.participants.remove(identity);

        if let Some(room_id) = self.member_rooms.get(identity).cloned()
            && let Some(room) = self.rooms.get_mut(&room_id)
            && !room.is_completed()
        {
            let _ = room.set_connected(identity, false);
            let grace = self.config.disconnect_grace();
            info!(identity, %room_id, ?grace, "holding room open for reconnect");

            let commands = self.commands.clone();
            let identity = identity.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = commands.send(Command::GraceExpired { room_id, identity });
            });
        }
    }

    fn on_grace_expired(&mut self, room_id: &str, identity: &str) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        if room.is_completed() {
            return;
        }
        // Reconnecting within the grace period cancels the forfeit
        if room.slot(identity).is_some_and(|slot| slot.is_connected()) {
            return;
        }

        if room.forfeit(identity).is_ok() {
            info!(identity, room_id, "grace period expired, forfeiting");
            self.complete_room(room_id);
        }
    }

    fn on_purge_room(&mut self, room_id: &str) {
        if self.rooms.remove(room_id).is_some() {
            debug!(room_id, "room purged");
        }
        self.member_rooms.retain(|_, id| id != room_id);
    }

    fn schedule_purge(&self, room_id: &str) {
        let retention = self.config.room_retention();
        let commands = self.commands.clone();
        let room_id = room_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let _ = commands.send(Command::PurgeRoom { room_id });
        });
    }

    fn sweep_queue(&mut self) {
        let expired = self.queue.sweep_expired(self.config.queue_expiry());
        for entry in expired {
            info!(identity = %entry.identity, "queue entry expired");
            self.send_to(&entry.identity, Event::Dequeued);
        }
    }

    fn send_to(&self, identity: &str, event: Event) {
        if let Some(participant) = self.participants.get(identity) {
            // A dead handle means the participant is gone; nothing to do
            let _ = participant.handle.send(event);
        }
    }
}
