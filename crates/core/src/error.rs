//! Error taxonomy of the leverage engine.

use leverage_api::AggregatorError;
use leverage_chain::WalletError;
use thiserror::Error;

/// Errors raised while quoting, building, or executing a leverage flow.
#[derive(Debug, Error)]
pub enum LeverageError {
    /// No route serves this market (or this direction on it).
    #[error("unsupported route: {reason}")]
    UnsupportedRoute { reason: String },

    /// Non-positive amount or an amount above a freshness-checked maximum.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The quote no longer matches what would execute; re-fetch and retry.
    #[error("quote changed, re-fetch and retry: {reason}")]
    StaleQuote { reason: String },

    /// The aggregator priced a swap method the engine cannot verify.
    #[error("unsupported swap method: {method}")]
    UnsupportedSwap { method: String },

    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("token approval failed: {0}")]
    ApprovalFailed(String),

    /// The user declined a signature or transaction. Terminal, never surfaced.
    #[error("rejected by user")]
    SubmissionRejectedByUser,

    #[error("transaction reverted: {reason}")]
    SubmissionReverted { reason: String },

    /// A chain read failed; the quote is still loading.
    #[error("chain read failed: {0}")]
    Read(String),

    /// The aggregator failed for a reason other than a rate change.
    #[error("price quote failed: {0}")]
    Aggregator(String),

    /// The aggregator has no route for this pair or chain.
    #[error("no swap route: {0}")]
    NoSwapRoute(String),
}

impl LeverageError {
    pub fn stale(reason: impl Into<String>) -> Self {
        LeverageError::StaleQuote { reason: reason.into() }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        LeverageError::UnsupportedRoute { reason: reason.into() }
    }

    pub fn read(err: anyhow::Error) -> Self {
        LeverageError::Read(format!("{err:#}"))
    }

    /// Recoverable by one re-quote-and-rebuild.
    pub fn is_stale_quote(&self) -> bool {
        matches!(self, LeverageError::StaleQuote { .. })
    }

    /// Ends the flow without surfacing an error.
    pub fn is_silent(&self) -> bool {
        matches!(self, LeverageError::SubmissionRejectedByUser)
    }

    /// Transient: the caller should keep showing a loading state.
    pub fn is_transient(&self) -> bool {
        matches!(self, LeverageError::Read(_) | LeverageError::Aggregator(_))
    }

    /// Map a wallet error raised while authorizing the router.
    pub fn from_authorization(err: WalletError) -> Self {
        match err {
            WalletError::UserRejected => LeverageError::SubmissionRejectedByUser,
            other => LeverageError::AuthorizationFailed(other.to_string()),
        }
    }

    /// Map a wallet error raised while approving or permitting a token.
    pub fn from_approval(err: WalletError) -> Self {
        match err {
            WalletError::UserRejected => LeverageError::SubmissionRejectedByUser,
            other => LeverageError::ApprovalFailed(other.to_string()),
        }
    }

    /// Map a wallet error raised while submitting the bundle.
    pub fn from_submission(err: WalletError) -> Self {
        match err {
            WalletError::UserRejected => LeverageError::SubmissionRejectedByUser,
            WalletError::Reverted { reason, .. } => LeverageError::SubmissionReverted { reason },
            other => LeverageError::SubmissionReverted {
                reason: other.to_string(),
            },
        }
    }
}

impl From<AggregatorError> for LeverageError {
    fn from(err: AggregatorError) -> Self {
        if err.is_rate_change() {
            LeverageError::stale(err.to_string())
        } else if err.is_permanent() {
            LeverageError::NoSwapRoute(err.to_string())
        } else {
            LeverageError::Aggregator(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_change_is_stale() {
        let err: LeverageError = AggregatorError::RateChanged.into();
        assert!(err.is_stale_quote());

        let err: LeverageError = AggregatorError::InvalidResponse("truncated".into()).into();
        assert!(!err.is_stale_quote());
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_route_is_not_transient() {
        let err: LeverageError = AggregatorError::NoRoute("none".into()).into();
        assert!(matches!(err, LeverageError::NoSwapRoute(_)));
        assert!(!err.is_transient());

        let err: LeverageError = AggregatorError::UnsupportedChain(10).into();
        assert!(!err.is_transient());
        assert!(!err.is_stale_quote());
    }

    #[test]
    fn test_user_rejection_is_silent_everywhere() {
        assert!(LeverageError::from_authorization(WalletError::UserRejected).is_silent());
        assert!(LeverageError::from_approval(WalletError::UserRejected).is_silent());
        assert!(LeverageError::from_submission(WalletError::UserRejected).is_silent());
    }

    #[test]
    fn test_submission_revert_keeps_reason() {
        let err = LeverageError::from_submission(WalletError::Reverted {
            tx_hash: None,
            reason: "execution reverted: insufficient collateral".into(),
        });
        assert_eq!(
            err.to_string(),
            "transaction reverted: execution reverted: insufficient collateral"
        );
    }
}
