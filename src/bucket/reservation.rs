use std::time::{Duration, Instant};

use crate::{Clock, TokenBucket};

/// Tokens taken from a [`TokenBucket`] ahead of time.
///
/// Returned by [`TokenBucket::reserve_n`]. The tokens are already accounted for; the
/// holder may act at [`granted_at`](Self::granted_at). Dropping a reservation keeps the
/// tokens consumed. Use [`cancel`](Self::cancel) to give them back.
#[must_use = "dropping a reservation keeps its tokens; cancel it to return them"]
pub struct Reservation<'a, C: Clock> {
    bucket: &'a TokenBucket<C>,
    cost: u64,
    cost_ticks: i64,
    granted_at_ticks: i64,
}

impl<'a, C: Clock> Reservation<'a, C> {
    pub(crate) fn new(
        bucket: &'a TokenBucket<C>,
        cost: u64,
        cost_ticks: i64,
        granted_at_ticks: i64,
    ) -> Self {
        Self {
            bucket,
            cost,
            cost_ticks,
            granted_at_ticks,
        }
    }

    /// Tokens held by this reservation.
    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// Instant, on the bucket's clock, at which the reserved tokens have accrued.
    pub fn granted_at(&self) -> Instant {
        self.bucket.instant_at(self.granted_at_ticks)
    }

    /// Time left until [`granted_at`](Self::granted_at), zero once it has passed.
    pub fn delay(&self) -> Duration {
        let now = self.bucket.now_ticks();
        self.bucket
            .ticks_to_duration(self.granted_at_ticks.saturating_sub(now))
    }

    /// Return the reserved tokens to the bucket.
    ///
    /// Only takes effect while the reservation is still pending; once its grant time has
    /// passed the tokens count as used. Returns whether a refund happened.
    pub fn cancel(self) -> bool {
        if self.cost_ticks == 0 || self.bucket.now_ticks() >= self.granted_at_ticks {
            return false;
        }

        self.bucket.state().refund(self.cost_ticks);
        tracing::debug!(cost = self.cost, "reservation refunded");

        true
    }
}

impl<C: Clock> std::fmt::Debug for Reservation<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("cost", &self.cost)
            .field("delay", &self.delay())
            .finish()
    }
}

/// Cancels the wrapped reservation unless disarmed, so an abandoned wait refunds.
#[cfg(any(feature = "tokio", feature = "smol"))]
pub(crate) struct CancelOnDrop<'a, C: Clock>(Option<Reservation<'a, C>>);

#[cfg(any(feature = "tokio", feature = "smol"))]
impl<'a, C: Clock> CancelOnDrop<'a, C> {
    pub(crate) fn new(reservation: Reservation<'a, C>) -> Self {
        Self(Some(reservation))
    }

    /// Keep the tokens.
    pub(crate) fn disarm(&mut self) {
        self.0 = None;
    }

    pub(crate) fn cancel(&mut self) -> bool {
        self.0.take().is_some_and(Reservation::cancel)
    }
}

#[cfg(any(feature = "tokio", feature = "smol"))]
impl<C: Clock> Drop for CancelOnDrop<'_, C> {
    fn drop(&mut self) {
        if self.cancel() {
            tracing::debug!("pending acquire dropped, reservation refunded");
        }
    }
}
