//! Error types for the contract catalog.

use thiserror::Error;

/// A specialized Result type for catalog operations.
pub type ContractResult<T> = Result<T, ContractError>;

/// Errors raised by the contract catalog and roll builder.
#[derive(Error, Debug, Clone)]
pub enum ContractError {
    /// The root symbol has no catalog entry.
    #[error("Unknown futures contract: '{symbol}'")]
    UnknownContract {
        /// The unrecognized root symbol.
        symbol: String,
    },

    /// A contract month string was not YYYYMM.
    #[error("Invalid contract month '{value}': {reason}")]
    InvalidMonth {
        /// The offending value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    /// Roll construction was given an impossible pair of months.
    #[error("Invalid roll {front} -> {back}: {reason}")]
    InvalidRoll {
        /// Front contract month.
        front: u32,
        /// Back contract month.
        back: u32,
        /// Why the roll is invalid.
        reason: String,
    },

    /// The broker gateway failed to list months.
    #[error("Futures gateway error: {reason}")]
    Gateway {
        /// Gateway failure description.
        reason: String,
    },

    /// Catalog configuration could not be parsed.
    #[error("Catalog config error: {reason}")]
    Config {
        /// Parse failure description.
        reason: String,
    },
}

impl ContractError {
    /// Create an unknown contract error.
    #[must_use]
    pub fn unknown(symbol: impl Into<String>) -> Self {
        Self::UnknownContract {
            symbol: symbol.into(),
        }
    }

    /// Create a gateway error.
    #[must_use]
    pub fn gateway(reason: impl Into<String>) -> Self {
        Self::Gateway {
            reason: reason.into(),
        }
    }
}
