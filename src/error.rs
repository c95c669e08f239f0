/// Error type for this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimiterError {
    /// Rate or burst rejected at construction.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The caller's cancellation signal fired before admission.
    ///
    /// Any tokens reserved for the call have been refunded.
    #[error("acquire cancelled before admission")]
    Cancelled,

    /// The requested cost can never be satisfied because it exceeds the bucket capacity.
    #[error("cost {cost} exceeds burst {burst}")]
    CostExceedsBurst {
        /// Tokens requested.
        cost: u64,
        /// Bucket capacity.
        burst: u64,
    },
}
