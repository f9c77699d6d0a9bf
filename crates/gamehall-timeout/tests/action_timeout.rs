//! Integration tests for the per-turn action timeout.
//!
//! Every async test runs with a paused Tokio clock so `advance` moves
//! time deterministically.

use std::time::Duration;

use gamehall_timeout::{ActionTimeout, TimeoutPolicy};
use tokio::time::advance;

fn policy() -> TimeoutPolicy {
    TimeoutPolicy::from_millis(1_000, 5_000)
}

// =========================================================================
// TimeoutPolicy
// =========================================================================

#[test]
fn test_policy_new_hard_shorter_than_soft_is_raised() {
    let p = TimeoutPolicy::new(Duration::from_secs(3), Duration::from_secs(1));
    assert_eq!(p.hard, Duration::from_secs(3));
}

// =========================================================================
// Disarmed
// =========================================================================

#[test]
fn test_new_is_disarmed() {
    let t = ActionTimeout::new();
    assert!(!t.is_armed());
    assert_eq!(t.remaining(), None);
    assert_eq!(t.deadline(), None);
    assert!(!t.soft_exceeded());
}

#[tokio::test(start_paused = true)]
async fn test_expired_disarmed_pends_forever() {
    let t = ActionTimeout::new();

    let result = tokio::time::timeout(Duration::from_secs(60), t.expired()).await;

    assert!(result.is_err(), "disarmed timeout should never fire");
}

// =========================================================================
// Countdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_full_budget_available() {
    let mut t = ActionTimeout::new();

    t.reset(policy());

    assert_eq!(t.remaining(), Some(Duration::from_secs(5)));
}

#[tokio::test(start_paused = true)]
async fn test_soft_exceeded_after_soft_limit() {
    let mut t = ActionTimeout::new();
    t.reset(policy());

    advance(Duration::from_millis(900)).await;
    assert!(!t.soft_exceeded());

    advance(Duration::from_millis(200)).await;
    assert!(t.soft_exceeded());
    assert!(!t.hard_exceeded());
}

#[tokio::test(start_paused = true)]
async fn test_expired_fires_at_hard_limit() {
    let mut t = ActionTimeout::new();
    t.reset(policy());
    let start = tokio::time::Instant::now();

    t.expired().await;

    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert!(t.hard_exceeded());
    assert_eq!(t.remaining(), Some(Duration::ZERO));
}

#[tokio::test(start_paused = true)]
async fn test_remaining_never_goes_below_zero() {
    let mut t = ActionTimeout::new();
    t.reset(policy());

    advance(Duration::from_secs(30)).await;

    assert_eq!(t.remaining(), Some(Duration::ZERO));
}

#[tokio::test(start_paused = true)]
async fn test_reset_restores_full_budget() {
    let mut t = ActionTimeout::new();
    t.reset(policy());
    advance(Duration::from_secs(4)).await;

    t.reset(policy());

    assert_eq!(t.remaining(), Some(Duration::from_secs(5)));
    assert!(!t.soft_exceeded());
}

#[tokio::test(start_paused = true)]
async fn test_stop_disarms() {
    let mut t = ActionTimeout::new();
    t.reset(policy());

    t.stop();

    assert!(!t.is_armed());
    let result = tokio::time::timeout(Duration::from_secs(60), t.expired()).await;
    assert!(result.is_err());
}

// =========================================================================
// Pause / Resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_preserves_remaining_budget() {
    let mut t = ActionTimeout::new();
    t.reset(policy());
    advance(Duration::from_secs(2)).await;

    t.pause();
    let before = t.remaining().unwrap();
    advance(Duration::from_secs(60)).await;

    assert_eq!(before, Duration::from_secs(3));
    assert_eq!(t.remaining(), Some(before));
    assert_eq!(t.deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn test_resume_charges_only_unpaused_time() {
    let mut t = ActionTimeout::new();
    t.reset(policy());
    advance(Duration::from_secs(1)).await;
    t.pause();
    advance(Duration::from_secs(100)).await;
    t.resume();
    advance(Duration::from_secs(1)).await;

    // 2s of running time in total, regardless of the pause.
    assert_eq!(t.elapsed(), Duration::from_secs(2));
    assert_eq!(t.remaining(), Some(Duration::from_secs(3)));
}

#[tokio::test(start_paused = true)]
async fn test_expired_paused_pends_then_fires_after_resume() {
    let mut t = ActionTimeout::new();
    t.reset(policy());
    advance(Duration::from_secs(4)).await;
    t.pause();

    let paused = tokio::time::timeout(Duration::from_secs(30), t.expired()).await;
    assert!(paused.is_err(), "paused timeout should not fire");

    t.resume();
    let start = tokio::time::Instant::now();
    t.expired().await;
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_reset_while_paused_starts_on_resume() {
    let mut t = ActionTimeout::new();
    t.pause();
    t.reset(policy());
    advance(Duration::from_secs(10)).await;

    assert_eq!(t.remaining(), Some(Duration::from_secs(5)));

    t.resume();
    advance(Duration::from_secs(1)).await;
    assert_eq!(t.remaining(), Some(Duration::from_secs(4)));
}

#[tokio::test]
async fn test_pause_resume_idempotent() {
    let mut t = ActionTimeout::new();
    t.reset(policy());

    t.pause();
    t.pause();
    assert!(t.is_paused());

    t.resume();
    t.resume();
    assert!(!t.is_paused());
}
