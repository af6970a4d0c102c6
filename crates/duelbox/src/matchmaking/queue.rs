//! Matchmaking queue
//!
//! FIFO with a rating tolerance window: the longest-waiting player anchors
//! every match search, and the closest-rated candidate on the same challenge
//! wins, with ties broken by arrival order. An identity can be queued at most
//! once; that single invariant is what keeps a player out of two rooms.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::matchmaking::QueueError;

/// One waiting player
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Opaque player identity
    pub identity: String,

    /// Display name carried into the room on match
    pub display_name: String,

    /// Skill rating used for the tolerance window
    pub rating: i32,

    /// Challenge the player asked to battle on
    pub challenge_id: String,

    /// When the player joined the queue
    pub queued_at: Instant,

    /// Arrival order, used for FIFO tie-breaks
    seq: u64,
}

/// The matchmaking queue
///
/// Not internally synchronized; owned and mutated by exactly one task.
#[derive(Debug, Default)]
pub struct MatchQueue {
    /// Entries in arrival order
    entries: Vec<QueueEntry>,

    /// Identities currently queued
    identities: HashSet<String>,

    /// Next arrival sequence number
    next_seq: u64,
}

impl MatchQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player to the queue
    ///
    /// Returns the 1-based queue position. An identity that is already
    /// queued is refused and the queue is left untouched.
    pub fn enqueue(
        &mut self,
        identity: &str,
        display_name: &str,
        rating: i32,
        challenge_id: &str,
    ) -> Result<usize, QueueError> {
        if self.identities.contains(identity) {
            return Err(QueueError::AlreadyQueued);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(QueueEntry {
            identity: identity.to_string(),
            display_name: display_name.to_string(),
            rating,
            challenge_id: challenge_id.to_string(),
            queued_at: Instant::now(),
            seq,
        });
        self.identities.insert(identity.to_string());
        Ok(self.entries.len())
    }

    /// Remove a player from the queue
    ///
    /// Returns whether the identity was present.
    pub fn dequeue(&mut self, identity: &str) -> bool {
        if !self.identities.remove(identity) {
            return false;
        }
        self.entries.retain(|e| e.identity != identity);
        true
    }

    /// Try to pair the longest-waiting player
    ///
    /// The FIFO head anchors the search; the remainder is scanned for the
    /// closest rating on the same challenge within `tolerance`, earliest
    /// arrival winning ties. Both entries are removed before returning. No
    /// candidate within tolerance leaves the head queued for the next try.
    pub fn try_match(&mut self, tolerance: i32) -> Option<(QueueEntry, QueueEntry)> {
        if self.entries.len() < 2 {
            return None;
        }

        let head = &self.entries[0];
        let mut best: Option<(usize, i32, u64)> = None;
        for (index, candidate) in self.entries.iter().enumerate().skip(1) {
            if candidate.challenge_id != head.challenge_id {
                continue;
            }
            let diff = (head.rating - candidate.rating).abs();
            if diff > tolerance {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, best_diff, best_seq)) => {
                    diff < best_diff || (diff == best_diff && candidate.seq < best_seq)
                }
            };
            if better {
                best = Some((index, diff, candidate.seq));
            }
        }

        let (candidate_index, _, _) = best?;
        let candidate = self.entries.remove(candidate_index);
        let head = self.entries.remove(0);
        self.identities.remove(&head.identity);
        self.identities.remove(&candidate.identity);
        Some((head, candidate))
    }

    /// Remove and return every entry that has waited longer than `max_wait`
    pub fn sweep_expired(&mut self, max_wait: Duration) -> Vec<QueueEntry> {
        let now = Instant::now();
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| now.duration_since(e.queued_at) > max_wait);
        self.entries = kept;
        for entry in &expired {
            self.identities.remove(&entry.identity);
        }
        expired
    }

    /// 1-based position of an identity, if queued
    pub fn position(&self, identity: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.identity == identity)
            .map(|i| i + 1)
    }

    /// Whether an identity is currently queued
    pub fn contains(&self, identity: &str) -> bool {
        self.identities.contains(identity)
    }

    /// Number of waiting players
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: i32 = 200;

    fn join(queue: &mut MatchQueue, identity: &str, rating: i32) -> Result<usize, QueueError> {
        queue.enqueue(identity, identity, rating, "palindrome")
    }

    #[test]
    fn enqueue_returns_positions() {
        let mut queue = MatchQueue::new();
        assert_eq!(join(&mut queue, "alice", 1000), Ok(1));
        assert_eq!(join(&mut queue, "bob", 1100), Ok(2));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn enqueue_rejects_duplicate_identity() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "alice", 1000).unwrap();
        assert_eq!(
            join(&mut queue, "alice", 1200),
            Err(QueueError::AlreadyQueued)
        );
        // Queue size unchanged by the refused enqueue
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn dequeue_removes_entry() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "alice", 1000).unwrap();
        assert!(queue.dequeue("alice"));
        assert!(!queue.dequeue("alice"));
        assert!(queue.is_empty());
    }

    #[test]
    fn try_match_pairs_within_tolerance() {
        // Ratings 1000 and 1100 differ by 100, inside the 200 window
        let mut queue = MatchQueue::new();
        join(&mut queue, "alice", 1000).unwrap();
        join(&mut queue, "bob", 1100).unwrap();

        let (a, b) = queue.try_match(TOLERANCE).unwrap();
        assert_eq!(a.identity, "alice");
        assert_eq!(b.identity, "bob");
        assert!(queue.is_empty());
    }

    #[test]
    fn try_match_refuses_out_of_tolerance() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "alice", 1000).unwrap();
        join(&mut queue, "pro", 1500).unwrap();

        assert!(queue.try_match(TOLERANCE).is_none());
        // The head is not consumed by a failed search
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.position("alice"), Some(1));
    }

    #[test]
    fn try_match_third_player_out_of_range_stays() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "alice", 1000).unwrap();
        join(&mut queue, "bob", 1100).unwrap();
        join(&mut queue, "pro", 1500).unwrap();

        let (a, b) = queue.try_match(TOLERANCE).unwrap();
        assert_eq!(a.identity, "alice");
        assert_eq!(b.identity, "bob");

        // The 1500-rated player matches neither and stays queued
        assert!(queue.try_match(TOLERANCE).is_none());
        assert!(queue.contains("pro"));
    }

    #[test]
    fn try_match_picks_closest_rating() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "anchor", 1000).unwrap();
        join(&mut queue, "far", 1180).unwrap();
        join(&mut queue, "near", 1020).unwrap();

        let (_, opponent) = queue.try_match(TOLERANCE).unwrap();
        assert_eq!(opponent.identity, "near");
    }

    #[test]
    fn try_match_breaks_ties_by_arrival() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "anchor", 1000).unwrap();
        join(&mut queue, "first", 1100).unwrap();
        join(&mut queue, "second", 900).unwrap();

        // Equal diff of 100: the earlier arrival wins
        let (_, opponent) = queue.try_match(TOLERANCE).unwrap();
        assert_eq!(opponent.identity, "first");
    }

    #[test]
    fn try_match_requires_same_challenge() {
        let mut queue = MatchQueue::new();
        queue.enqueue("alice", "alice", 1000, "palindrome").unwrap();
        queue.enqueue("bob", "bob", 1000, "fizzbuzz").unwrap();

        assert!(queue.try_match(TOLERANCE).is_none());
    }

    #[test]
    fn try_match_never_pairs_identity_with_itself() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "alice", 1000).unwrap();
        join(&mut queue, "bob", 1000).unwrap();

        let (a, b) = queue.try_match(TOLERANCE).unwrap();
        assert_ne!(a.identity, b.identity);
    }

    #[test]
    fn try_match_on_short_queue_is_none() {
        let mut queue = MatchQueue::new();
        assert!(queue.try_match(TOLERANCE).is_none());
        join(&mut queue, "alice", 1000).unwrap();
        assert!(queue.try_match(TOLERANCE).is_none());
    }

    #[test]
    fn sweep_expired_removes_only_stale_entries() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "alice", 1000).unwrap();
        join(&mut queue, "bob", 1000).unwrap();

        // Nothing has waited longer than an hour
        assert!(queue.sweep_expired(Duration::from_secs(3600)).is_empty());
        assert_eq!(queue.len(), 2);

        // Everything has waited longer than zero
        let expired = queue.sweep_expired(Duration::ZERO);
        assert_eq!(expired.len(), 2);
        assert!(queue.is_empty());
        assert!(!queue.contains("alice"));
    }

    #[test]
    fn position_tracks_fifo_order() {
        let mut queue = MatchQueue::new();
        join(&mut queue, "alice", 1000).unwrap();
        join(&mut queue, "bob", 1000).unwrap();
        assert_eq!(queue.position("bob"), Some(2));
        queue.dequeue("alice");
        assert_eq!(queue.position("bob"), Some(1));
        assert_eq!(queue.position("alice"), None);
    }
}
