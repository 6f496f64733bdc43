//! Error types for aggregator requests.

use thiserror::Error;

/// Failure modes of a price-route or calldata request.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// The aggregator reported that the quoted rate moved since the price route
    /// was fetched. Recoverable by re-quoting.
    #[error("aggregator rate changed, re-query the latest price")]
    RateChanged,

    #[error("no swap route available: {0}")]
    NoRoute(String),

    #[error("aggregator API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid aggregator response: {0}")]
    InvalidResponse(String),

    #[error("chain {0} is not supported by this aggregator")]
    UnsupportedChain(u64),
}

impl AggregatorError {
    /// Whether the error means the quote went stale and a fresh one may succeed.
    pub fn is_rate_change(&self) -> bool {
        matches!(self, Self::RateChanged)
    }

    /// Whether retrying the same request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::NoRoute(_) | Self::UnsupportedChain(_))
    }
}
