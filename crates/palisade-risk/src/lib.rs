//! # Palisade Risk
//!
//! Risk limit evaluation for the Palisade engine.
//!
//! Applies a configured [`palisade_core::RiskProfile`] to a factor
//! decomposition: per-limit pass/fail checks, a flag list ordered by
//! (severity desc, type) for stable diffing, and a 0-100 composite score
//! built from documented piecewise-linear sub-score maps anchored at
//! (0 → 100, at-limit → 70, 2×-limit → 30, 5×-limit → 0).

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod capacity;
pub mod evaluator;
pub mod score;

pub use capacity::{check_exit_signals, leverage_capacity, ExitSignal, LeverageCapacity};
pub use evaluator::{evaluate, Flag, LimitCheck, LimitKind, RiskReport, Severity};
pub use score::{ratio_score, RiskScore, ScoreWeights};
