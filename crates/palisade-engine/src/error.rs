//! Service-level error taxonomy with stable codes.

use palisade_core::{CoreError, ProviderKind};
use thiserror::Error;
use uuid::Uuid;

/// A specialized Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced to the tool/API layer.
///
/// Each variant maps to one stable code; partial failures
/// (price/provider) normally stay inside `data_quality` and only become
/// errors when nothing remains to analyze.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// Inputs violated a stated constraint.
    #[error("Validation failed: {reason}")]
    Validation {
        /// What was wrong.
        reason: String,
    },

    /// No vendor could price a required symbol.
    #[error("Price unavailable for '{symbol}'")]
    PriceUnavailable {
        /// The unpriceable symbol.
        symbol: String,
    },

    /// A provider failed and nothing else could stand in.
    #[error("Provider '{source}' unavailable")]
    ProviderUnavailable {
        /// The failed source.
        source: ProviderKind,
    },

    /// Optimizer constraints cannot be satisfied.
    #[error("Infeasible: binding constraints {binding:?}")]
    Infeasible {
        /// Binding constraint names.
        binding: Vec<String>,
    },

    /// Numerical solver failure after retry.
    #[error("Solver error: {reason}")]
    Solver {
        /// Failure description.
        reason: String,
    },

    /// Cross-source ambiguity emptied the requested scope.
    #[error("Cross-source ambiguity: {symbols:?}")]
    CrossSourceAmbiguity {
        /// Ambiguous symbols.
        symbols: Vec<String>,
    },

    /// A persisted record was not found.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Record family.
        kind: String,
        /// Record identifier.
        id: String,
    },

    /// Storage backend failure.
    #[error("Storage error: {reason}")]
    Storage {
        /// Failure description.
        reason: String,
    },

    /// Bug class; carries an opaque id for log correlation.
    #[error("Internal error {id}")]
    Internal {
        /// Opaque correlation id.
        id: String,
        /// Description, logged but not shown to end users.
        reason: String,
    },
}

impl ServiceError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation { .. } => "VALIDATION",
            ServiceError::PriceUnavailable { .. } => "PRICE_UNAVAILABLE",
            ServiceError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            ServiceError::Infeasible { .. } => "INFEASIBLE",
            ServiceError::Solver { .. } => "SOLVER_ERROR",
            ServiceError::CrossSourceAmbiguity { .. } => "CROSS_SOURCE_AMBIGUITY",
            ServiceError::NotFound { .. } => "NOT_FOUND",
            ServiceError::Storage { .. } => "STORAGE",
            ServiceError::Internal { .. } => "INTERNAL",
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an internal error with a fresh correlation id.
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            id: Uuid::new_v4().to_string(),
            reason: reason.into(),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<palisade_prices::PriceError> for ServiceError {
    fn from(err: palisade_prices::PriceError) -> Self {
        match err {
            palisade_prices::PriceError::Unavailable { symbol } => {
                Self::PriceUnavailable { symbol }
            }
            other => Self::validation(other.to_string()),
        }
    }
}

impl From<palisade_providers::ProviderError> for ServiceError {
    fn from(err: palisade_providers::ProviderError) -> Self {
        match err {
            palisade_providers::ProviderError::Unavailable { source, .. } => {
                Self::ProviderUnavailable { source }
            }
            other => Self::validation(other.to_string()),
        }
    }
}

impl From<palisade_factors::FactorError> for ServiceError {
    fn from(err: palisade_factors::FactorError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<palisade_optimizer::OptimizerError> for ServiceError {
    fn from(err: palisade_optimizer::OptimizerError) -> Self {
        match err {
            palisade_optimizer::OptimizerError::Infeasible { binding } => {
                Self::Infeasible { binding }
            }
            palisade_optimizer::OptimizerError::Solver { reason } => Self::Solver { reason },
            palisade_optimizer::OptimizerError::Validation { reason } => {
                Self::Validation { reason }
            }
        }
    }
}

impl From<palisade_performance::PerformanceError> for ServiceError {
    fn from(err: palisade_performance::PerformanceError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<palisade_contracts::ContractError> for ServiceError {
    fn from(err: palisade_contracts::ContractError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<palisade_intel::IntelError> for ServiceError {
    fn from(err: palisade_intel::IntelError) -> Self {
        Self::validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        assert_eq!(ServiceError::validation("x").code(), "VALIDATION");
        assert_eq!(
            ServiceError::PriceUnavailable {
                symbol: "ES".to_string()
            }
            .code(),
            "PRICE_UNAVAILABLE"
        );
        assert_eq!(ServiceError::internal("bug").code(), "INTERNAL");
    }

    #[test]
    fn test_optimizer_error_mapping() {
        let err: ServiceError =
            palisade_optimizer::OptimizerError::infeasible(["max_single_stock"]).into();
        assert_eq!(err.code(), "INFEASIBLE");
    }
}
