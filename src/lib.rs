#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod bucket;
pub use bucket::*;

mod clock;
pub use clock::*;

mod error;
pub use error::*;

mod common;
pub use common::{Burst, RateLimitDecision, RatePerSecond, TokenBucketOptions};

#[cfg(any(feature = "tokio", feature = "smol"))]
mod runtime;

#[cfg(test)]
mod tests;
