//! # Palisade Optimizer
//!
//! Constrained mean-variance optimization and the what-if scenario
//! engine.
//!
//! The optimizer solves `min wᵀΣw` (or `max μᵀw - λ wᵀΣw`) over the
//! capped simplex with factor-beta boxes, enforcing
//! factor-contribution caps by iterative re-projection. Infeasible
//! constraint sets are reported with the binding constraints, distinct
//! from numerical solver failure (which is retried once with relaxed
//! tolerance). The what-if engine re-evaluates the same invariants on a
//! hypothetical weight vector without persisting anything.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod optimizer;
pub mod qp;
pub mod whatif;

pub use error::{OptimizerError, OptimizerResult};
pub use optimizer::{
    build_covariance, run_optimization, verdict_for, CovarianceModel, Objective,
    OptimizationResult, Verdict, WeightChange, NO_CHANGE_THRESHOLD,
};
pub use qp::{
    achievable_range, project_capped_simplex, solve, solve_with_retry, LinearBox, QpProblem,
    QpSettings,
};
pub use whatif::{
    run_whatif, ComplianceDelta, PositionChange, ScenarioSummary, WhatIfRequest, WhatIfResult,
};
