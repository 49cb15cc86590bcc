//! Error types for the factor intelligence layer.

use thiserror::Error;

/// A specialized Result type for intelligence operations.
pub type IntelResult<T> = Result<T, IntelError>;

/// Errors raised while building baskets, correlations, or
/// recommendations.
#[derive(Error, Debug, Clone)]
pub enum IntelError {
    /// A basket could not produce a return series.
    #[error("Basket '{name}' failed: {reason}")]
    Basket {
        /// Basket name.
        name: String,
        /// Why it failed.
        reason: String,
    },

    /// The factor panel has nothing to analyze.
    #[error("Empty factor panel: {reason}")]
    EmptyPanel {
        /// Why the panel is unusable.
        reason: String,
    },

    /// The requested factor does not exist in the panel.
    #[error("Unknown factor '{factor}'")]
    UnknownFactor {
        /// The missing factor.
        factor: String,
    },
}
