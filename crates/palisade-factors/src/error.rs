//! Error types for the factor engine.

use thiserror::Error;

/// A specialized Result type for factor operations.
pub type FactorResult<T> = Result<T, FactorError>;

/// Errors raised during proxy assignment, panel construction, or
/// decomposition.
#[derive(Error, Debug, Clone)]
pub enum FactorError {
    /// A non-cash symbol ended up with no factor proxies.
    #[error("Empty factor-proxy mapping for '{symbol}'")]
    EmptyProxies {
        /// Symbol with no proxies.
        symbol: String,
    },

    /// The panel has no usable factor columns.
    #[error("Factor panel is empty: {reason}")]
    EmptyPanel {
        /// Why the panel emptied out.
        reason: String,
    },

    /// The decomposition had no assets with both weights and returns.
    #[error("No regressable assets: {reason}")]
    NoAssets {
        /// Why nothing could be regressed.
        reason: String,
    },

    /// The design matrix could not be solved.
    #[error("Regression failed for '{symbol}': {reason}")]
    Singular {
        /// Asset whose regression failed.
        symbol: String,
        /// Solver failure description.
        reason: String,
    },
}
