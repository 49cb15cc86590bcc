//! Error types for the realized performance engine.

use thiserror::Error;

/// A specialized Result type for performance operations.
pub type PerformanceResult<T> = Result<T, PerformanceError>;

/// Errors raised while reconstructing timelines or computing returns.
#[derive(Error, Debug, Clone)]
pub enum PerformanceError {
    /// An account had no transactions, flows, or positions to anchor an
    /// inception date.
    #[error("Account '{account_id}' has no credible inception")]
    NoInception {
        /// The account without history.
        account_id: String,
    },

    /// No account produced a NAV series.
    #[error("No computable account series: {reason}")]
    Empty {
        /// Why nothing could be computed.
        reason: String,
    },

    /// A date range was inverted.
    #[error("Invalid range: {reason}")]
    InvalidRange {
        /// Why the range is invalid.
        reason: String,
    },
}
