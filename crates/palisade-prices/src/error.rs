//! Error types for the price store.

use thiserror::Error;

/// A specialized Result type for price operations.
pub type PriceResult<T> = Result<T, PriceError>;

/// Errors raised while fetching or aligning price series.
///
/// `Unavailable` is the partial-failure kind: callers exclude the symbol
/// from aggregates and record it in data quality, never substitute zeros.
#[derive(Error, Debug, Clone)]
pub enum PriceError {
    /// Every configured vendor failed for the symbol.
    #[error("Price unavailable for '{symbol}'")]
    Unavailable {
        /// Symbol no vendor could price.
        symbol: String,
    },

    /// A single vendor call failed.
    #[error("Vendor '{vendor}' failed for '{symbol}': {reason}")]
    Vendor {
        /// Vendor name.
        vendor: String,
        /// Symbol requested.
        symbol: String,
        /// Failure description.
        reason: String,
    },

    /// A date range was inverted or empty.
    #[error("Invalid range: {reason}")]
    InvalidRange {
        /// Why the range is invalid.
        reason: String,
    },

    /// Alignment produced no overlapping observations.
    #[error("Empty series for '{symbol}' after alignment")]
    EmptySeries {
        /// Symbol whose series emptied out.
        symbol: String,
    },
}

impl PriceError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(symbol: impl Into<String>) -> Self {
        Self::Unavailable {
            symbol: symbol.into(),
        }
    }

    /// Create a vendor failure error.
    #[must_use]
    pub fn vendor(
        vendor: impl Into<String>,
        symbol: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Vendor {
            vendor: vendor.into(),
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }
}
