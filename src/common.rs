use std::ops::Deref;

use crate::RateLimiterError;

const NANOS_PER_SECOND: f64 = 1_000_000_000f64;

/// Sustained admission rate, in tokens per second.
///
/// Always finite and strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct RatePerSecond(f64);

impl RatePerSecond {
    /// Largest rate the bucket can honor: one token per nanosecond.
    ///
    /// Higher rates are accepted but clamped to this value.
    pub fn max() -> Self {
        Self(NANOS_PER_SECOND)
    }

    /// Fixed-point time unit fine enough to track this rate.
    ///
    /// Picks the coarsest tick, starting from one nanosecond, at which rounding a token
    /// up to whole ticks costs at most `1 / MAX_ROUNDING` of the rate. Rates whose token
    /// interval is a whole number of nanoseconds stay on nanosecond ticks.
    pub(crate) fn tick_scale(&self) -> TickScale {
        let interval = NANOS_PER_SECOND / self.0.min(NANOS_PER_SECOND);
        let mut shift = 0;

        loop {
            let exact = interval * f64::from(1u32 << shift);
            let ticks = exact.ceil();

            if ticks >= i64::MAX as f64 {
                return TickScale {
                    shift,
                    token_ticks: i64::MAX,
                };
            }

            if shift == TickScale::MAX_SHIFT || ticks - exact <= exact / TickScale::MAX_ROUNDING {
                return TickScale {
                    shift,
                    token_ticks: (ticks as i64).max(1),
                };
            }

            shift += 1;
        }
    }
}

/// Time unit of a bucket's state: one tick is `2^-shift` nanoseconds.
///
/// A bucket can track `2^(63 - shift)` nanoseconds after its epoch; that is about
/// 292 years on nanosecond ticks and never less than 104 days at the finest scale.
/// Later readings saturate and no further tokens accrue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TickScale {
    pub(crate) shift: u32,
    /// Ticks needed to accrue one token, rounded up.
    pub(crate) token_ticks: i64,
}

impl TickScale {
    const MAX_SHIFT: u32 = 10;
    const MAX_ROUNDING: f64 = 1024f64;

    /// `nanos` must not be negative.
    #[inline]
    pub(crate) fn ticks_from_nanos(&self, nanos: i64) -> i64 {
        i64::try_from(i128::from(nanos) << self.shift).unwrap_or(i64::MAX)
    }

    /// Whole nanoseconds covering `ticks`, rounded up.
    #[inline]
    pub(crate) fn nanos_from_ticks(&self, ticks: i64) -> i64 {
        ticks.saturating_add((1i64 << self.shift) - 1) >> self.shift
    }
}

impl Deref for RatePerSecond {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for RatePerSecond {
    type Error = RateLimiterError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value.is_finite() && value > 0f64 {
            Ok(Self(value))
        } else {
            Err(RateLimiterError::InvalidPolicy(
                "Rate per second must be a finite number greater than 0".to_string(),
            ))
        }
    }
}

/// Maximum number of tokens the bucket can bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Burst(u64);

impl Deref for Burst {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for Burst {
    type Error = RateLimiterError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err(RateLimiterError::InvalidPolicy(
                "Burst must be at least 1".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Policy for a [`TokenBucket`](crate::TokenBucket).
///
/// Immutable once the bucket is built.
#[derive(Clone, Debug)]
pub struct TokenBucketOptions {
    /// Rate at which tokens accrue.
    pub rate_per_second: RatePerSecond,
    /// Bucket capacity, i.e. the largest back-to-back burst.
    pub burst: Burst,
}

impl TokenBucketOptions {
    /// Validate raw values into options.
    pub fn new(rate_per_second: f64, burst: u64) -> Result<Self, RateLimiterError> {
        Ok(Self {
            rate_per_second: RatePerSecond::try_from(rate_per_second)?,
            burst: Burst::try_from(burst)?,
        })
    }
}

/// Outcome of a non-blocking admission attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateLimitDecision {
    /// The request/work is allowed and its tokens were consumed.
    Allowed,
    /// The request/work is rejected. No tokens were consumed.
    ///
    /// Includes best-effort hints for callers that want to communicate backoff.
    Rejected {
        /// Milliseconds until enough tokens accrue, assuming no other caller consumes them.
        ///
        /// `u64::MAX` when the cost exceeds the burst and can never be admitted.
        retry_after_ms: u64,
        /// Tokens banked at the time of the decision.
        available_tokens: f64,
    },
}

impl RateLimitDecision {
    /// Whether the decision admitted the request.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}
