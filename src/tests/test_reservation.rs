use std::time::Duration;

use crate::{Clock, ManualClock, RateLimiterError, TokenBucket, TokenBucketOptions};

fn bucket(rate_per_second: f64, burst: u64) -> (TokenBucket<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let bucket = TokenBucket::with_clock(
        TokenBucketOptions::new(rate_per_second, burst).unwrap(),
        clock.clone(),
    );

    (bucket, clock)
}

#[test]
fn reservation_on_full_bucket_is_immediate() {
    let (bucket, _clock) = bucket(10.0, 2);

    let reservation = bucket.reserve_n(2).unwrap();
    assert_eq!(reservation.cost(), 2);
    assert_eq!(reservation.delay(), Duration::ZERO);
    assert!(!bucket.try_acquire());
}

#[test]
fn reservation_on_empty_bucket_waits_for_deficit() {
    let (bucket, clock) = bucket(10.0, 1);
    assert!(bucket.try_acquire());

    let start = clock.now();
    let reservation = bucket.reserve_n(1).unwrap();

    assert_eq!(reservation.delay(), Duration::from_millis(100));
    assert_eq!(reservation.granted_at() - start, Duration::from_millis(100));
    assert!(bucket.available_tokens() < 0.0);
}

#[test]
fn reservations_queue_up_in_order() {
    let (bucket, clock) = bucket(10.0, 1);
    assert!(bucket.try_acquire());

    let first = bucket.reserve_n(1).unwrap();
    let second = bucket.reserve_n(1).unwrap();
    assert_eq!(first.delay(), Duration::from_millis(100));
    assert_eq!(second.delay(), Duration::from_millis(200));

    clock.advance(Duration::from_millis(150));
    assert_eq!(first.delay(), Duration::ZERO);
    assert_eq!(second.delay(), Duration::from_millis(50));

    // Both pending tokens are spoken for.
    assert!(!bucket.try_acquire());
}

#[test]
fn cancelled_reservation_is_refunded() {
    let (bucket, clock) = bucket(10.0, 1);
    assert!(bucket.try_acquire());

    let reservation = bucket.reserve_n(1).unwrap();
    assert!(reservation.cancel());
    assert!((bucket.available_tokens() - 0.0).abs() < 1e-9);

    clock.advance(Duration::from_millis(100));
    assert!(bucket.try_acquire());
    assert!(!bucket.try_acquire());
}

#[test]
fn cancel_after_grant_time_keeps_tokens_consumed() {
    let (bucket, clock) = bucket(10.0, 1);
    assert!(bucket.try_acquire());

    let reservation = bucket.reserve_n(1).unwrap();
    clock.advance(Duration::from_millis(100));

    assert!(!reservation.cancel());
    assert!(!bucket.try_acquire());
}

#[test]
fn refund_never_exceeds_burst() {
    let (bucket, clock) = bucket(10.0, 2);

    let reservation = bucket.reserve_n(1).unwrap();
    let pending = bucket.reserve_n(2).unwrap();
    assert!(pending.delay() > Duration::ZERO);
    drop(reservation);

    assert!(pending.cancel());
    clock.advance(Duration::from_secs(10));

    assert!(bucket.try_acquire_n(2).is_allowed());
    assert!(!bucket.try_acquire());
}

#[test]
fn zero_cost_reservation_is_free() {
    let (bucket, _clock) = bucket(1.0, 1);
    assert!(bucket.try_acquire());

    let reservation = bucket.reserve_n(0).unwrap();
    assert_eq!(reservation.delay(), Duration::ZERO);
    assert!(!reservation.cancel());
}

#[test]
fn reservation_above_burst_fails() {
    let (bucket, _clock) = bucket(1.0, 3);

    assert_eq!(
        bucket.reserve_n(4).unwrap_err(),
        RateLimiterError::CostExceedsBurst { cost: 4, burst: 3 }
    );
    assert!(bucket.try_acquire_n(3).is_allowed());
}

#[test]
fn acquire_blocking_returns_immediately_when_tokens_are_banked() {
    let (bucket, _clock) = bucket(1.0, 1);

    let start = std::time::Instant::now();
    assert!(bucket.acquire_blocking(1, None).is_ok());
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn acquire_blocking_times_out_and_refunds() {
    let (bucket, clock) = bucket(1.0, 1);
    assert!(bucket.try_acquire());

    assert_eq!(
        bucket.acquire_blocking(1, Some(Duration::from_millis(10))),
        Err(RateLimiterError::Cancelled)
    );

    clock.advance(Duration::from_secs(1));
    assert!(bucket.try_acquire());
}

#[test]
fn acquire_blocking_sleeps_for_the_deficit() {
    let bucket = TokenBucket::new(20.0, 1).unwrap();
    assert!(bucket.try_acquire());

    let start = std::time::Instant::now();
    let granted_at = bucket.acquire_blocking(1, Some(Duration::from_secs(1))).unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(45), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "elapsed {elapsed:?}");
    assert!(granted_at <= std::time::Instant::now());
}
