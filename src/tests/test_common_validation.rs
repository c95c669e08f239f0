use crate::{Burst, RateLimiterError, RatePerSecond, TokenBucket, TokenBucketOptions};

fn invalid(message: &str) -> RateLimiterError {
    RateLimiterError::InvalidPolicy(message.to_string())
}

#[test]
fn rate_per_second_try_from_validates_positive_and_finite() {
    let rate = RatePerSecond::try_from(1f64).unwrap();
    assert_eq!(*rate, 1f64);

    let expected = invalid("Rate per second must be a finite number greater than 0");
    assert_eq!(RatePerSecond::try_from(0f64).unwrap_err(), expected);
    assert_eq!(RatePerSecond::try_from(-1f64).unwrap_err(), expected);
    assert_eq!(RatePerSecond::try_from(f64::NAN).unwrap_err(), expected);
    assert_eq!(RatePerSecond::try_from(f64::INFINITY).unwrap_err(), expected);

    assert!(*RatePerSecond::max() > 0f64);
}

#[test]
fn tick_scale_rounds_token_cost_up_by_at_most_a_tenth_percent() {
    for rate in [1.0, 3.0, 7.0, 1e6, 3e6, 1.7e7, 6e8, 7.77e8, 999_999_999.0] {
        let scale = RatePerSecond::try_from(rate).unwrap().tick_scale();
        let exact = 1e9 / rate * f64::from(1u32 << scale.shift);
        let rounding = (scale.token_ticks as f64 - exact) / exact;

        assert!(
            (0.0..=1.0 / 1024.0).contains(&rounding),
            "rate={rate} shift={} token_ticks={}",
            scale.shift,
            scale.token_ticks
        );
    }
}

#[test]
fn whole_nanosecond_intervals_keep_nanosecond_ticks() {
    let scale = |rate: f64| RatePerSecond::try_from(rate).unwrap().tick_scale();

    assert_eq!((scale(1.0).shift, scale(1.0).token_ticks), (0, 1_000_000_000));
    assert_eq!((scale(10.0).shift, scale(10.0).token_ticks), (0, 100_000_000));
    assert_eq!((scale(3.0).shift, scale(3.0).token_ticks), (0, 333_333_334));
    assert_eq!((scale(1e9).shift, scale(1e9).token_ticks), (0, 1));
    assert_eq!((scale(1e15).shift, scale(1e15).token_ticks), (0, 1));
    assert_eq!(scale(1e-300).token_ticks, i64::MAX);

    // 1/256ns ticks, 427 per token.
    assert_eq!((scale(6e8).shift, scale(6e8).token_ticks), (8, 427));
}

#[test]
fn burst_try_from_validates_min_1() {
    let burst = Burst::try_from(1u64).unwrap();
    assert_eq!(*burst, 1u64);

    assert_eq!(
        Burst::try_from(0u64).unwrap_err(),
        invalid("Burst must be at least 1")
    );
}

#[test]
fn options_new_reports_first_invalid_field() {
    let options = TokenBucketOptions::new(5.0, 3).unwrap();
    assert_eq!(*options.rate_per_second, 5.0);
    assert_eq!(*options.burst, 3);

    assert!(matches!(
        TokenBucketOptions::new(-5.0, 0),
        Err(RateLimiterError::InvalidPolicy(msg)) if msg.starts_with("Rate per second")
    ));
}

#[test]
fn token_bucket_new_rejects_invalid_policy() {
    assert!(matches!(
        TokenBucket::new(0.0, 1),
        Err(RateLimiterError::InvalidPolicy(_))
    ));
    assert!(matches!(
        TokenBucket::new(1.0, 0),
        Err(RateLimiterError::InvalidPolicy(_))
    ));

    let bucket = TokenBucket::new(100.0, 7).unwrap();
    assert_eq!(*bucket.rate_per_second(), 100.0);
    assert_eq!(*bucket.burst(), 7);
}

#[test]
fn error_messages_are_descriptive() {
    assert_eq!(
        invalid("Burst must be at least 1").to_string(),
        "invalid policy: Burst must be at least 1"
    );
    assert_eq!(
        RateLimiterError::Cancelled.to_string(),
        "acquire cancelled before admission"
    );
    assert_eq!(
        RateLimiterError::CostExceedsBurst { cost: 5, burst: 2 }.to_string(),
        "cost 5 exceeds burst 2"
    );
}
