use std::sync::atomic::{AtomicI64, Ordering};

/// Shared mutable state of a token bucket, packed into one atomic word.
///
/// The pair `(available_tokens, last_refill)` is stored as the single instant `empty_at`
/// (ticks after the bucket's epoch, see [`TickScale`](crate::common::TickScale)) at which
/// the bucket would hold zero tokens. At time `now` the bucket holds
/// `(now - max(empty_at, now - burst_ticks)) / token_ticks` tokens: accrual is implicit in
/// the distance to `now` and the burst cap is applied by the `max`. Consuming `n` tokens
/// moves `empty_at` forward by `n` token intervals.
///
/// Values of `empty_at` greater than `now` represent outstanding reservations, i.e. a
/// negative token balance.
///
/// `latest_seen` is kept apart from `empty_at`. A rejection must not write, and `empty_at`
/// may legitimately run ahead of the clock while reservations wait, so neither word can
/// stand in for the other. `observe` only writes when the clock moved past every earlier
/// reading; repeated readings cost a single load.
pub(crate) struct BucketState {
    empty_at: AtomicI64,
    latest_seen: AtomicI64,
}

impl BucketState {
    /// A full bucket.
    pub(crate) fn full(burst_ticks: i64) -> Self {
        Self {
            empty_at: AtomicI64::new(burst_ticks.saturating_neg()),
            latest_seen: AtomicI64::new(0),
        }
    }

    /// Clamp a clock reading to the latest one any caller has seen.
    ///
    /// A clock that repeats or goes backward then yields zero elapsed time.
    #[inline]
    pub(crate) fn observe(&self, now: i64) -> i64 {
        let latest = self.latest_seen.load(Ordering::Acquire);

        if now <= latest {
            return latest;
        }

        self.latest_seen.fetch_max(now, Ordering::AcqRel).max(now)
    }

    /// Ticks worth of tokens banked at `now`, capped at `burst_ticks`.
    ///
    /// Negative while reservations are outstanding.
    pub(crate) fn banked(&self, now: i64, burst_ticks: i64) -> i64 {
        let empty_at = self.empty_at.load(Ordering::Acquire);
        now.saturating_sub(reconcile(empty_at, now, burst_ticks))
    }

    /// Consume `cost_ticks` of tokens if they are banked at `now`.
    ///
    /// On rejection nothing is written and the banked amount is returned.
    #[inline]
    pub(crate) fn try_consume(
        &self,
        now: i64,
        cost_ticks: i64,
        burst_ticks: i64,
    ) -> Result<(), i64> {
        let mut current = self.empty_at.load(Ordering::Acquire);

        loop {
            let base = reconcile(current, now, burst_ticks);
            let banked = now.saturating_sub(base);

            if banked < cost_ticks {
                return Err(banked);
            }

            // base + cost_ticks <= now, cannot overflow
            match self.empty_at.compare_exchange_weak(
                current,
                base + cost_ticks,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    } // end method try_consume

    /// Consume `cost_ticks` of tokens unconditionally, letting the balance go negative.
    ///
    /// Returns the instant the consumed tokens are fully accrued, never earlier than `now`.
    pub(crate) fn reserve(&self, now: i64, cost_ticks: i64, burst_ticks: i64) -> i64 {
        let mut current = self.empty_at.load(Ordering::Acquire);

        loop {
            let next = reconcile(current, now, burst_ticks).saturating_add(cost_ticks);

            match self.empty_at.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next.max(now),
                Err(actual) => current = actual,
            }
        }
    } // end method reserve

    /// Give back tokens taken by an unused reservation.
    ///
    /// Any surplus above the burst is discarded by the next reconciliation.
    pub(crate) fn refund(&self, cost_ticks: i64) {
        let _ = self
            .empty_at
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |empty_at| {
                Some(empty_at.saturating_sub(cost_ticks))
            });
    }
}

/// Apply the burst cap: the bucket can never have been empty earlier than
/// `now - burst_ticks`.
#[inline]
fn reconcile(empty_at: i64, now: i64, burst_ticks: i64) -> i64 {
    empty_at.max(now.saturating_sub(burst_ticks))
}
