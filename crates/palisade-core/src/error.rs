//! Error types for the core data model.

use thiserror::Error;

/// A specialized Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while constructing or validating core types.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Position failed validation.
    #[error("Invalid position '{symbol}': {reason}")]
    InvalidPosition {
        /// Symbol of the offending position.
        symbol: String,
        /// Why the position is invalid.
        reason: String,
    },

    /// A date string or range was invalid.
    #[error("Invalid date: {message}")]
    InvalidDate {
        /// Description of the date error.
        message: String,
    },

    /// A weight vector violated a stated constraint.
    #[error("Invalid weights: {reason}")]
    InvalidWeights {
        /// Why the weights are invalid.
        reason: String,
    },

    /// An enum label could not be parsed.
    #[error("Unknown {kind}: '{value}'")]
    UnknownEnum {
        /// What was being parsed (e.g., "provider source").
        kind: String,
        /// The unparseable value.
        value: String,
    },

    /// A currency code was not recognized.
    #[error("Unknown currency: '{code}'")]
    UnknownCurrency {
        /// The unrecognized code.
        code: String,
    },

    /// A required field was missing during construction.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },
}

impl CoreError {
    /// Create an invalid position error.
    #[must_use]
    pub fn invalid_position(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPosition {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid date error.
    #[must_use]
    pub fn invalid_date(message: impl Into<String>) -> Self {
        Self::InvalidDate {
            message: message.into(),
        }
    }

    /// Create an invalid weights error.
    #[must_use]
    pub fn invalid_weights(reason: impl Into<String>) -> Self {
        Self::InvalidWeights {
            reason: reason.into(),
        }
    }

    /// Create an unknown enum error.
    #[must_use]
    pub fn unknown_enum(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnknownEnum {
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// Create a missing field error.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
