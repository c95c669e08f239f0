//! In-process token bucket.
//!
//! A [`TokenBucket`] enforces one rate + burst policy for any number of concurrent
//! callers. Its state lives in a single atomic word, updated through a compare-and-swap
//! loop, so admission never takes a lock.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** share it behind an `Arc` or a `&'static`; all methods take `&self`
//! - **No over-admission:** accounting is serialized through the atomic update
//! - **Non-blocking fast path:** [`TokenBucket::try_acquire`] does one clock read, no allocation
//! - **Process-scoped:** state is not shared across processes and does not survive restarts
//!
//! # Admission styles
//!
//! - [`TokenBucket::try_acquire`] / [`TokenBucket::try_acquire_n`]: immediate yes/no
//! - [`TokenBucket::reserve_n`]: take tokens now, act later, cancel to refund
//! - [`TokenBucket::acquire`] / [`TokenBucket::acquire_n`]: async wait with cancellation
//!   (features `tokio` or `smol`)
//! - [`TokenBucket::acquire_blocking`]: thread-blocking wait with an optional timeout
//!
//! # Examples
//!
//! ```
//! use std::{sync::Arc, thread};
//! use tokenbucket::TokenBucket;
//!
//! let bucket = Arc::new(TokenBucket::new(1.0, 10).unwrap());
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let bucket = Arc::clone(&bucket);
//!         thread::spawn(move || (0..100).filter(|_| bucket.try_acquire()).count())
//!     })
//!     .collect();
//!
//! let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
//! assert!(admitted <= 11);
//! ```

pub(crate) mod state;

mod token_bucket;
pub use token_bucket::*;

pub(crate) mod reservation;
pub use reservation::Reservation;
