//! Error types for the optimizer and what-if engine.

use thiserror::Error;

/// A specialized Result type for optimizer operations.
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Errors raised by the QP solver and scenario engine.
///
/// `Infeasible` and `Solver` are deliberately distinct: the first means
/// the constraints cannot be satisfied with the current universe, the
/// second a numerical failure (retried once with relaxed tolerance
/// before surfacing).
#[derive(Error, Debug, Clone)]
pub enum OptimizerError {
    /// Constraints cannot be satisfied with this universe.
    #[error("Infeasible: binding constraints {binding:?}")]
    Infeasible {
        /// The constraint set that cannot be met.
        binding: Vec<String>,
    },

    /// Numerical failure in the solver.
    #[error("Solver error: {reason}")]
    Solver {
        /// Failure description.
        reason: String,
    },

    /// Inputs violated a stated precondition.
    #[error("Validation: {reason}")]
    Validation {
        /// What was wrong with the inputs.
        reason: String,
    },
}

impl OptimizerError {
    /// Create an infeasibility error.
    #[must_use]
    pub fn infeasible(binding: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Infeasible {
            binding: binding.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a solver error.
    #[must_use]
    pub fn solver(reason: impl Into<String>) -> Self {
        Self::Solver {
            reason: reason.into(),
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}
