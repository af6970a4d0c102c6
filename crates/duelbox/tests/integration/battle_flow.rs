use std::time::Duration;

use duelbox::{Arena, BattleStatus, Event, Rejection};
use tokio::sync::mpsc;

use super::test_config;

const CORRECT_PALINDROME: &str = "def is_palindrome(s):\n    s = s.replace(' ', '').lower()\n    return s == s[::-1]\n";

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(15), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn matched_pair(
    arena: &Arena,
) -> (
    mpsc::UnboundedReceiver<Event>,
    mpsc::UnboundedReceiver<Event>,
    String,
) {
    let (alice_tx, mut alice) = mpsc::unbounded_channel();
    let (bob_tx, mut bob) = mpsc::unbounded_channel();
    arena.register("alice", "Alice", 1000, alice_tx);
    arena.register("bob", "Bob", 1100, bob_tx);
    let _ = next_event(&mut alice).await; // Registered
    let _ = next_event(&mut bob).await; // Registered

    arena.join_queue("alice", "palindrome");
    arena.join_queue("bob", "palindrome");
    let _ = next_event(&mut alice).await; // Queued
    let _ = next_event(&mut bob).await; // Queued

    let room_id = match next_event(&mut alice).await {
        Event::Matched { room_id, .. } => room_id,
        other => panic!("expected Matched, got {other:?}"),
    };
    let _ = next_event(&mut bob).await; // Matched

    (alice, bob, room_id)
}

#[tokio::test]
async fn winning_submission_completes_the_battle() {
    let arena = Arena::spawn(test_config());
    let (mut alice, mut bob, room_id) = matched_pair(&arena).await;

    arena.submit("alice", &room_id, CORRECT_PALINDROME);

    // Both players hear the result, then the outcome
    for rx in [&mut alice, &mut bob] {
        match next_event(rx).await {
            Event::SubmissionResult {
                identity,
                passed,
                total,
                failure,
                ..
            } => {
                assert_eq!(identity, "alice");
                assert_eq!(passed, 5);
                assert_eq!(total, 5);
                assert_eq!(failure, None);
            }
            other => panic!("expected SubmissionResult, got {other:?}"),
        }
    }
    for rx in [&mut alice, &mut bob] {
        match next_event(rx).await {
            Event::BattleComplete {
                winner_identity,
                winner_display_name,
                loser_display_name,
            } => {
                assert_eq!(winner_identity, "alice");
                assert_eq!(winner_display_name, "Alice");
                assert_eq!(loser_display_name, "Bob");
            }
            other => panic!("expected BattleComplete, got {other:?}"),
        }
    }

    let snapshot = arena.room_snapshot(&room_id).await.unwrap();
    assert_eq!(snapshot.status, BattleStatus::Completed);
    assert_eq!(snapshot.winner.as_deref(), Some("alice"));

    // A follow-up submission by the opponent is refused outright
    arena.submit("bob", &room_id, CORRECT_PALINDROME);
    assert!(matches!(
        next_event(&mut bob).await,
        Event::Rejected {
            reason: Rejection::BattleCompleted
        }
    ));

    // The decided room never changes again
    let snapshot = arena.room_snapshot(&room_id).await.unwrap();
    assert_eq!(snapshot.winner.as_deref(), Some("alice"));
    let bob_half = snapshot
        .players
        .iter()
        .find(|p| p.identity == "bob")
        .unwrap();
    assert_eq!(bob_half.passed, 0);
}

#[tokio::test]
async fn losing_partial_submission_keeps_the_battle_open() {
    let arena = Arena::spawn(test_config());
    let (mut alice, mut bob, room_id) = matched_pair(&arena).await;

    arena.submit("bob", &room_id, "def is_palindrome(s):\n    return True\n");

    for rx in [&mut alice, &mut bob] {
        match next_event(rx).await {
            Event::SubmissionResult {
                identity, passed, ..
            } => {
                assert_eq!(identity, "bob");
                assert_eq!(passed, 4);
            }
            other => panic!("expected SubmissionResult, got {other:?}"),
        }
    }

    let snapshot = arena.room_snapshot(&room_id).await.unwrap();
    assert_eq!(snapshot.status, BattleStatus::InProgress);
    assert_eq!(snapshot.winner, None);

    // The battle is still winnable by either side
    arena.submit("alice", &room_id, CORRECT_PALINDROME);
    let _ = next_event(&mut alice).await; // SubmissionResult
    match next_event(&mut alice).await {
        Event::BattleComplete {
            winner_identity, ..
        } => assert_eq!(winner_identity, "alice"),
        other => panic!("expected BattleComplete, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_submissions_resolve_deterministically() {
    let arena = Arena::spawn(test_config());
    let (mut alice, mut bob, room_id) = matched_pair(&arena).await;

    // Both full passes race through the pool; exactly one wins and the
    // room records exactly one winner
    arena.submit("alice", &room_id, CORRECT_PALINDROME);
    arena.submit("bob", &room_id, CORRECT_PALINDROME);

    let mut complete = None;
    for _ in 0..4 {
        match next_event(&mut alice).await {
            Event::BattleComplete {
                winner_identity, ..
            } => {
                complete = Some(winner_identity);
                break;
            }
            Event::SubmissionResult { .. } => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }
    let winner = complete.expect("battle must complete");
    assert!(winner == "alice" || winner == "bob");

    let snapshot = arena.room_snapshot(&room_id).await.unwrap();
    assert_eq!(snapshot.status, BattleStatus::Completed);
    assert_eq!(snapshot.winner.as_deref(), Some(winner.as_str()));

    // Drain bob's events; he must agree on the same winner
    let mut bob_winner = None;
    for _ in 0..4 {
        match next_event(&mut bob).await {
            Event::BattleComplete {
                winner_identity, ..
            } => {
                bob_winner = Some(winner_identity);
                break;
            }
            Event::SubmissionResult { .. } => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(bob_winner.as_deref(), Some(winner.as_str()));
}
