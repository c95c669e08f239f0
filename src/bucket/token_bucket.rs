use std::time::{Duration, Instant};

use crate::{
    Burst, Clock, MonotonicClock, RateLimitDecision, RateLimiterError, RatePerSecond,
    Reservation, TokenBucketOptions, bucket::state::BucketState, clock::duration_to_nanos,
    common::TickScale,
};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Lock-free token bucket rate limiter.
///
/// Tokens accrue continuously at [`rate_per_second`](Self::rate_per_second) up to
/// [`burst`](Self::burst). Every admitted operation consumes tokens; the bucket starts full.
///
/// # Algorithm
///
/// 1. **Reconcile:** tokens at `now` are `min(burst, banked + elapsed × rate)`
/// 2. **Admit:** if at least `cost` tokens are banked, consume them
/// 3. **Reject:** otherwise leave the state untouched (the partial refill is kept)
///
/// Steps 1–3 run as one compare-and-swap on a single atomic word. A caller that loses
/// the race retries the arithmetic against the fresh state without reading the clock
/// again, so total admissions never exceed `burst + rate × elapsed` whatever the contention.
///
/// # Precision
///
/// Accrual is tracked in fixed-point ticks of down to 1/1024 ns, so the cost of a token is
/// rounded up by at most 0.1%. The effective rate is therefore never above the configured
/// one and never more than 0.1% below it. Rates above [`RatePerSecond::max`] are clamped
/// to one token per nanosecond.
///
/// The finer the ticks, the shorter the span a bucket can track: from about 292 years for
/// rates with a whole-nanosecond token interval down to 104 days near the maximum rate.
/// Past that span the bucket stops accruing.
///
/// # Examples
///
/// ```
/// use tokenbucket::TokenBucket;
///
/// let bucket = TokenBucket::new(2.0, 1).unwrap();
///
/// assert!(bucket.try_acquire());
/// assert!(!bucket.try_acquire());
/// ```
pub struct TokenBucket<C: Clock = MonotonicClock> {
    rate_per_second: RatePerSecond,
    burst: Burst,
    scale: TickScale,
    burst_ticks: i64,
    epoch: Instant,
    clock: C,
    state: BucketState,
}

impl TokenBucket<MonotonicClock> {
    /// Create a full bucket on the process monotonic clock.
    ///
    /// Fails with [`RateLimiterError::InvalidPolicy`] if `rate_per_second` is not a
    /// positive finite number or `burst` is zero.
    pub fn new(rate_per_second: f64, burst: u64) -> Result<Self, RateLimiterError> {
        Ok(Self::with_clock(
            TokenBucketOptions::new(rate_per_second, burst)?,
            MonotonicClock,
        ))
    }

    /// Create a full bucket from validated options on the process monotonic clock.
    pub fn from_options(options: TokenBucketOptions) -> Self {
        Self::with_clock(options, MonotonicClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a full bucket reading time from `clock`.
    pub fn with_clock(options: TokenBucketOptions, clock: C) -> Self {
        let scale = options.rate_per_second.tick_scale();
        let burst_ticks = i64::try_from(*options.burst)
            .unwrap_or(i64::MAX)
            .saturating_mul(scale.token_ticks);

        tracing::debug!(
            rate_per_second = *options.rate_per_second,
            burst = *options.burst,
            tick_shift = scale.shift,
            token_ticks = scale.token_ticks,
            "token bucket created"
        );

        Self {
            rate_per_second: options.rate_per_second,
            burst: options.burst,
            scale,
            burst_ticks,
            epoch: clock.now(),
            clock,
            state: BucketState::full(burst_ticks),
        }
    } // end constructor

    /// Configured sustained rate.
    pub fn rate_per_second(&self) -> RatePerSecond {
        self.rate_per_second
    }

    /// Configured capacity.
    pub fn burst(&self) -> Burst {
        self.burst
    }

    /// Tokens banked right now.
    ///
    /// Read-only snapshot; negative while reservations are waiting for their tokens.
    pub fn available_tokens(&self) -> f64 {
        let now = self.now_ticks();
        self.ticks_to_tokens(self.state.banked(now, self.burst_ticks))
    }

    /// Admit a single operation if a token is banked.
    ///
    /// Never blocks and never allocates: one clock read and a compare-and-swap loop.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        let now = self.now_ticks();

        self.state
            .try_consume(now, self.scale.token_ticks, self.burst_ticks)
            .is_ok()
    }

    /// Admit an operation costing `cost` tokens if they are all banked.
    ///
    /// A zero cost is always allowed. A cost above the burst can never be admitted and is
    /// rejected with `retry_after_ms == u64::MAX`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokenbucket::{RateLimitDecision, TokenBucket};
    ///
    /// let bucket = TokenBucket::new(10.0, 5).unwrap();
    ///
    /// assert!(bucket.try_acquire_n(5).is_allowed());
    /// match bucket.try_acquire_n(1) {
    ///     RateLimitDecision::Allowed => unreachable!(),
    ///     RateLimitDecision::Rejected { retry_after_ms, .. } => assert!(retry_after_ms <= 100),
    /// }
    /// ```
    pub fn try_acquire_n(&self, cost: u64) -> RateLimitDecision {
        if cost == 0 {
            return RateLimitDecision::Allowed;
        }

        let Some(cost_ticks) = self.cost_ticks(cost) else {
            return RateLimitDecision::Rejected {
                retry_after_ms: u64::MAX,
                available_tokens: self.available_tokens(),
            };
        };

        let now = self.now_ticks();

        match self.state.try_consume(now, cost_ticks, self.burst_ticks) {
            Ok(()) => RateLimitDecision::Allowed,
            Err(banked) => {
                let missing = self.scale.nanos_from_ticks(cost_ticks.saturating_sub(banked));
                let retry_after_ms =
                    missing.saturating_add(NANOS_PER_MILLI - 1) / NANOS_PER_MILLI;

                RateLimitDecision::Rejected {
                    retry_after_ms: u64::try_from(retry_after_ms).unwrap_or(0),
                    available_tokens: self.ticks_to_tokens(banked),
                }
            }
        }
    } // end method try_acquire_n

    /// Reserve `cost` tokens now, to be used once they have accrued.
    ///
    /// The tokens are taken immediately even if that drives the balance negative; the
    /// returned [`Reservation`] says when they become effective. Callers that give up
    /// before then should [`cancel`](Reservation::cancel) to return them.
    ///
    /// Fails with [`RateLimiterError::CostExceedsBurst`] if `cost` can never be satisfied.
    pub fn reserve_n(&self, cost: u64) -> Result<Reservation<'_, C>, RateLimiterError> {
        let cost_ticks = self
            .cost_ticks(cost)
            .ok_or(RateLimiterError::CostExceedsBurst {
                cost,
                burst: *self.burst,
            })?;

        let now = self.now_ticks();
        let granted_at = if cost_ticks == 0 {
            now
        } else {
            self.state.reserve(now, cost_ticks, self.burst_ticks)
        };

        if granted_at > now {
            tracing::trace!(
                cost,
                wait_nanos = self.scale.nanos_from_ticks(granted_at - now),
                "reservation must wait for tokens"
            );
        }

        Ok(Reservation::new(self, cost, cost_ticks, granted_at))
    } // end method reserve_n

    /// Wait until one token is available, unless `cancel` completes first.
    ///
    /// See [`acquire_n`](Self::acquire_n).
    #[cfg(any(feature = "tokio", feature = "smol"))]
    #[cfg_attr(docsrs, doc(cfg(any(feature = "tokio", feature = "smol"))))]
    pub async fn acquire<F>(&self, cancel: F) -> Result<Instant, RateLimiterError>
    where
        F: std::future::Future<Output = ()>,
    {
        self.acquire_n(1, cancel).await
    }

    /// Wait until `cost` tokens are available, unless `cancel` completes first.
    ///
    /// The tokens are reserved up front, so waiters are granted in reservation order.
    /// Returns the instant admission became effective.
    ///
    /// If `cancel` completes before then, the reservation is refunded and
    /// [`RateLimiterError::Cancelled`] is returned. Dropping the returned future while it
    /// waits refunds the reservation as well.
    ///
    /// # Examples
    ///
    /// ```
    /// # #[cfg(feature = "tokio")]
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// use std::time::Duration;
    /// use tokenbucket::{RateLimiterError, TokenBucket};
    ///
    /// let bucket = TokenBucket::new(1.0, 1).unwrap();
    /// bucket.acquire(std::future::pending()).await.unwrap();
    ///
    /// // The next token is a second away; give up after 10ms.
    /// let timeout = tokio::time::sleep(Duration::from_millis(10));
    /// assert_eq!(bucket.acquire(timeout).await, Err(RateLimiterError::Cancelled));
    /// # });
    /// ```
    #[cfg(any(feature = "tokio", feature = "smol"))]
    #[cfg_attr(docsrs, doc(cfg(any(feature = "tokio", feature = "smol"))))]
    pub async fn acquire_n<F>(&self, cost: u64, cancel: F) -> Result<Instant, RateLimiterError>
    where
        F: std::future::Future<Output = ()>,
    {
        use futures::future::{Either, select};

        let reservation = self.reserve_n(cost)?;
        let granted_at = reservation.granted_at();
        let delay = reservation.delay();

        if delay.is_zero() {
            return Ok(granted_at);
        }

        let mut guard = crate::bucket::reservation::CancelOnDrop::new(reservation);

        let sleep = std::pin::pin!(crate::runtime::sleep(delay));
        let cancel = std::pin::pin!(cancel);

        match select(sleep, cancel).await {
            Either::Left(_) => {
                guard.disarm();
                Ok(granted_at)
            }
            Either::Right(_) => {
                if guard.cancel() {
                    tracing::debug!(cost, "acquire cancelled, reservation refunded");
                    Err(RateLimiterError::Cancelled)
                } else {
                    Ok(granted_at)
                }
            }
        }
    } // end method acquire_n

    /// Block the calling thread until `cost` tokens are available.
    ///
    /// If the wait would exceed `timeout`, the reservation is refunded at once and
    /// [`RateLimiterError::Cancelled`] is returned without sleeping.
    pub fn acquire_blocking(
        &self,
        cost: u64,
        timeout: Option<Duration>,
    ) -> Result<Instant, RateLimiterError> {
        let reservation = self.reserve_n(cost)?;
        let granted_at = reservation.granted_at();
        let delay = reservation.delay();

        if let Some(timeout) = timeout
            && delay > timeout
        {
            reservation.cancel();
            tracing::debug!(
                cost,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "acquire would exceed timeout, reservation refunded"
            );
            return Err(RateLimiterError::Cancelled);
        }

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        Ok(granted_at)
    } // end method acquire_blocking

    pub(crate) fn state(&self) -> &BucketState {
        &self.state
    }

    /// Clock reading in ticks after the epoch, never behind an earlier reading.
    #[inline]
    pub(crate) fn now_ticks(&self) -> i64 {
        let elapsed = self.clock.now().saturating_duration_since(self.epoch);
        self.state
            .observe(self.scale.ticks_from_nanos(duration_to_nanos(elapsed)))
    }

    /// Instant of a tick, rounded up to the next whole nanosecond.
    pub(crate) fn instant_at(&self, ticks: i64) -> Instant {
        self.epoch
            .checked_add(self.ticks_to_duration(ticks))
            .unwrap_or(self.epoch)
    }

    /// Length of `ticks`, rounded up to whole nanoseconds; zero if negative.
    pub(crate) fn ticks_to_duration(&self, ticks: i64) -> Duration {
        let nanos = self.scale.nanos_from_ticks(ticks);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
    }

    fn cost_ticks(&self, cost: u64) -> Option<i64> {
        if cost > *self.burst {
            return None;
        }

        Some(
            i64::try_from(cost)
                .unwrap_or(i64::MAX)
                .saturating_mul(self.scale.token_ticks),
        )
    }

    fn ticks_to_tokens(&self, ticks: i64) -> f64 {
        ticks as f64 / self.scale.token_ticks as f64
    }
} // end of impl

impl<C: Clock> std::fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate_per_second", &*self.rate_per_second)
            .field("burst", &*self.burst)
            .field("tick_shift", &self.scale.shift)
            .field("token_ticks", &self.scale.token_ticks)
            .finish_non_exhaustive()
    }
}
