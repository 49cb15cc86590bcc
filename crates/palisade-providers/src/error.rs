//! Error types for provider ingestion and canonicalization.

use palisade_core::ProviderKind;
use thiserror::Error;

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised while fetching, normalizing, or canonicalizing positions.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// A provider could not be reached or returned garbage.
    ///
    /// Partial kind: the analysis proceeds when any other provider
    /// succeeded; the failed source is recorded in
    /// `data_quality.excluded_sources`.
    #[error("Provider '{source}' unavailable: {reason}")]
    Unavailable {
        /// The failed source.
        source: ProviderKind,
        /// Failure description.
        reason: String,
    },

    /// A raw payload row could not be normalized.
    #[error("Normalization failed: {reason}")]
    Normalization {
        /// Why the row could not be normalized.
        reason: String,
    },

    /// A cash position referenced a currency with no cash-proxy mapping.
    ///
    /// Fatal for the run.
    #[error("No cash mapping for currency '{code}'")]
    UnknownCashCurrency {
        /// The unmapped currency code.
        code: String,
    },

    /// Canonical weights violated an invariant.
    ///
    /// Fatal for the run.
    #[error("Invalid canonical weights: {reason}")]
    InvalidWeights {
        /// Why the weights are invalid.
        reason: String,
    },

    /// A futures position had no catalog entry to derive notional from.
    #[error("Unknown futures contract '{symbol}' in position feed")]
    UnknownContract {
        /// The root symbol missing from the catalog.
        symbol: String,
    },
}

impl ProviderError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(source: ProviderKind, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            source,
            reason: reason.into(),
        }
    }

    /// Create a normalization error.
    #[must_use]
    pub fn normalization(reason: impl Into<String>) -> Self {
        Self::Normalization {
            reason: reason.into(),
        }
    }
}
