//! Constrained quadratic solver.
//!
//! Minimizes `wᵀΣw - γ μᵀw` over the capped simplex
//! `{Σw = 1, 0 ≤ w ≤ ub}` with linear (beta box) side constraints,
//! by projected gradient descent with a quadratic penalty on the side
//! constraints. Infeasibility is detected up front from the constraint
//! geometry; numerical failure is reported separately so callers can
//! retry once with a relaxed tolerance.

use crate::error::{OptimizerError, OptimizerResult};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A linear box constraint `min ≤ cᵀw ≤ max`.
#[derive(Debug, Clone)]
pub struct LinearBox {
    /// Stable constraint name for infeasibility reports.
    pub name: String,
    /// Coefficients per asset.
    pub coefficients: DVector<f64>,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

/// Solver settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QpSettings {
    /// Maximum gradient iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the iterate step.
    pub tolerance: f64,
    /// Tolerance on side-constraint violation.
    pub constraint_tolerance: f64,
}

impl Default for QpSettings {
    fn default() -> Self {
        Self {
            max_iter: 5_000,
            tolerance: 1e-9,
            constraint_tolerance: 1e-5,
        }
    }
}

impl QpSettings {
    /// Relaxed settings for the single retry after a numerical failure.
    #[must_use]
    pub fn relaxed(self) -> Self {
        Self {
            max_iter: self.max_iter * 2,
            tolerance: self.tolerance * 100.0,
            constraint_tolerance: self.constraint_tolerance * 10.0,
        }
    }
}

/// The quadratic program.
#[derive(Debug, Clone)]
pub struct QpProblem {
    /// Annualized covariance matrix.
    pub sigma: DMatrix<f64>,
    /// Expected returns; `None` for pure min-variance.
    pub mu: Option<DVector<f64>>,
    /// Risk-penalty trade-off γ for the max-return objective.
    pub risk_penalty: f64,
    /// Per-asset upper bounds.
    pub upper_bounds: DVector<f64>,
    /// Linear side constraints (factor beta boxes, linearized caps).
    pub boxes: Vec<LinearBox>,
}

/// Projects `v` onto `{Σw = 1, 0 ≤ w ≤ ub}` by bisection on the shift.
#[must_use]
pub fn project_capped_simplex(v: &DVector<f64>, ub: &DVector<f64>) -> DVector<f64> {
    let total: f64 = (0..v.len()).map(|i| ub[i]).sum();
    if total <= 1.0 {
        // Only feasible point (or infeasible; caller pre-checks).
        return ub.clone();
    }

    let clamped_sum = |lambda: f64| -> f64 {
        (0..v.len())
            .map(|i| (v[i] - lambda).clamp(0.0, ub[i]))
            .sum()
    };

    let mut lo = v.min() - ub.max() - 1.0;
    let mut hi = v.max() + 1.0;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if clamped_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let lambda = 0.5 * (lo + hi);
    DVector::from_iterator(v.len(), (0..v.len()).map(|i| (v[i] - lambda).clamp(0.0, ub[i])))
}

/// Range of `cᵀw` achievable over the capped simplex, by greedy fill.
#[must_use]
pub fn achievable_range(coefficients: &DVector<f64>, ub: &DVector<f64>) -> (f64, f64) {
    let extreme = |descending: bool| -> f64 {
        let mut order: Vec<usize> = (0..coefficients.len()).collect();
        order.sort_by(|a, b| {
            let cmp = coefficients[*a]
                .partial_cmp(&coefficients[*b])
                .unwrap_or(std::cmp::Ordering::Equal);
            if descending {
                cmp.reverse()
            } else {
                cmp
            }
        });
        let mut remaining = 1.0f64;
        let mut value = 0.0f64;
        for i in order {
            let take = remaining.min(ub[i]);
            value += take * coefficients[i];
            remaining -= take;
            if remaining <= 0.0 {
                break;
            }
        }
        value
    };
    (extreme(false), extreme(true))
}

/// Checks constraint geometry before iterating.
fn precheck(problem: &QpProblem) -> OptimizerResult<()> {
    let n = problem.sigma.nrows();
    if n == 0 {
        return Err(OptimizerError::validation("empty universe"));
    }
    if problem.sigma.ncols() != n || problem.upper_bounds.len() != n {
        return Err(OptimizerError::validation("dimension mismatch"));
    }

    let total_ub: f64 = problem.upper_bounds.iter().sum();
    if total_ub < 1.0 - 1e-12 {
        return Err(OptimizerError::infeasible(["max_single_stock"]));
    }

    let mut binding = Vec::new();
    for constraint in &problem.boxes {
        let (lo, hi) = achievable_range(&constraint.coefficients, &problem.upper_bounds);
        if constraint.max < lo - 1e-9 || constraint.min > hi + 1e-9 {
            binding.push(constraint.name.clone());
        }
    }
    if !binding.is_empty() {
        return Err(OptimizerError::Infeasible { binding });
    }
    Ok(())
}

/// Solves the QP.
///
/// # Errors
///
/// - [`OptimizerError::Infeasible`] when the constraint set cannot be
///   satisfied with this universe
/// - [`OptimizerError::Solver`] on numerical failure (NaN iterates or a
///   feasible problem that will not converge)
pub fn solve(problem: &QpProblem, settings: &QpSettings) -> OptimizerResult<DVector<f64>> {
    precheck(problem)?;

    let n = problem.sigma.nrows();
    let mut w = project_capped_simplex(
        &DVector::from_element(n, 1.0 / n as f64),
        &problem.upper_bounds,
    );

    let mut penalty = 10.0f64;
    let gamma = problem.risk_penalty;

    // Lipschitz-style step bound; grows with the penalty weight.
    let base_l = 2.0 * problem.sigma.norm() + 1e-9;

    for iteration in 0..settings.max_iter {
        let box_norm: f64 = problem
            .boxes
            .iter()
            .map(|b| b.coefficients.norm_squared())
            .sum();
        let step = 1.0 / (base_l + 2.0 * penalty * box_norm + 1.0);

        // Gradient of wᵀΣw - γ μᵀw plus penalty terms.
        let mut gradient = &problem.sigma * &w * 2.0;
        if let Some(mu) = &problem.mu {
            gradient -= mu * gamma;
        }
        for constraint in &problem.boxes {
            let value = constraint.coefficients.dot(&w);
            if value > constraint.max {
                gradient += &constraint.coefficients * (2.0 * penalty * (value - constraint.max));
            } else if value < constraint.min {
                gradient += &constraint.coefficients * (2.0 * penalty * (value - constraint.min));
            }
        }

        let next = project_capped_simplex(&(&w - gradient * step), &problem.upper_bounds);
        if next.iter().any(|x| !x.is_finite()) {
            return Err(OptimizerError::solver(format!(
                "non-finite iterate at iteration {iteration}"
            )));
        }

        let moved = (&next - &w).norm();
        w = next;

        let worst_violation = problem
            .boxes
            .iter()
            .map(|b| {
                let value = b.coefficients.dot(&w);
                (value - b.max).max(b.min - value).max(0.0)
            })
            .fold(0.0f64, f64::max);

        if moved < settings.tolerance {
            if worst_violation <= settings.constraint_tolerance {
                debug!(iteration, "qp converged");
                return Ok(w);
            }
            // Feasible per the pre-check but the penalty is too soft;
            // harden it and keep going.
            penalty *= 10.0;
            if penalty > 1e12 {
                return Err(OptimizerError::solver(
                    "penalty exhausted without satisfying side constraints",
                ));
            }
        }
    }

    Err(OptimizerError::solver("iteration limit exhausted"))
}

/// Solves with one relaxed-tolerance retry after a numerical failure.
///
/// # Errors
///
/// Propagates infeasibility immediately; surfaces the solver error only
/// after the retry also fails.
pub fn solve_with_retry(problem: &QpProblem, settings: &QpSettings) -> OptimizerResult<DVector<f64>> {
    match solve(problem, settings) {
        Err(OptimizerError::Solver { reason }) => {
            debug!(%reason, "retrying with relaxed tolerance");
            solve(problem, &settings.relaxed())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_projection_sums_to_one() {
        let v = DVector::from_vec(vec![0.9, 0.5, -0.2, 0.1]);
        let ub = DVector::from_element(4, 0.6);
        let w = project_capped_simplex(&v, &ub);
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-9);
        for x in w.iter() {
            assert!(*x >= -1e-12 && *x <= 0.6 + 1e-12);
        }
    }

    #[test]
    fn test_min_variance_two_uncorrelated_assets() {
        // Uncorrelated variances 0.04 and 0.01: w* ∝ 1/σ² = (0.2, 0.8).
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.01]));
        let problem = QpProblem {
            sigma,
            mu: None,
            risk_penalty: 0.0,
            upper_bounds: DVector::from_element(2, 1.0),
            boxes: Vec::new(),
        };
        let w = solve(&problem, &QpSettings::default()).unwrap();
        assert_relative_eq!(w[0], 0.2, epsilon = 1e-4);
        assert_relative_eq!(w[1], 0.8, epsilon = 1e-4);
    }

    #[test]
    fn test_upper_bound_binds() {
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.01]));
        let problem = QpProblem {
            sigma,
            mu: None,
            risk_penalty: 0.0,
            upper_bounds: DVector::from_vec(vec![1.0, 0.6]),
            boxes: Vec::new(),
        };
        let w = solve(&problem, &QpSettings::default()).unwrap();
        assert_relative_eq!(w[1], 0.6, epsilon = 1e-6);
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_infeasible_bounds_detected() {
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.01, 0.02]));
        let problem = QpProblem {
            sigma,
            mu: None,
            risk_penalty: 0.0,
            upper_bounds: DVector::from_element(3, 0.2), // sums to 0.6 < 1
            boxes: Vec::new(),
        };
        match solve(&problem, &QpSettings::default()) {
            Err(OptimizerError::Infeasible { binding }) => {
                assert_eq!(binding, vec!["max_single_stock".to_string()]);
            }
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn test_infeasible_beta_box_detected() {
        // Both assets have beta 1.0; requiring portfolio beta <= 0.5 is
        // impossible on the simplex.
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.01]));
        let problem = QpProblem {
            sigma,
            mu: None,
            risk_penalty: 0.0,
            upper_bounds: DVector::from_element(2, 1.0),
            boxes: vec![LinearBox {
                name: "beta:market".to_string(),
                coefficients: DVector::from_element(2, 1.0),
                min: -1.0,
                max: 0.5,
            }],
        };
        match solve(&problem, &QpSettings::default()) {
            Err(OptimizerError::Infeasible { binding }) => {
                assert_eq!(binding, vec!["beta:market".to_string()]);
            }
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn test_beta_box_satisfied() {
        // Asset betas 1.5 and 0.5; cap portfolio beta at 0.8.
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.04]));
        let problem = QpProblem {
            sigma,
            mu: None,
            risk_penalty: 0.0,
            upper_bounds: DVector::from_element(2, 1.0),
            boxes: vec![LinearBox {
                name: "beta:market".to_string(),
                coefficients: DVector::from_vec(vec![1.5, 0.5]),
                min: -2.0,
                max: 0.8,
            }],
        };
        let w = solve(&problem, &QpSettings::default()).unwrap();
        let beta = 1.5 * w[0] + 0.5 * w[1];
        assert!(beta <= 0.8 + 1e-4, "beta {beta} exceeds cap");
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_max_return_tilts_to_high_mu() {
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.02, 0.02]));
        let mu = DVector::from_vec(vec![0.12, 0.04]);
        let min_var = QpProblem {
            sigma: sigma.clone(),
            mu: None,
            risk_penalty: 0.0,
            upper_bounds: DVector::from_element(2, 1.0),
            boxes: Vec::new(),
        };
        let max_ret = QpProblem {
            sigma,
            mu: Some(mu),
            risk_penalty: 1.0,
            upper_bounds: DVector::from_element(2, 1.0),
            boxes: Vec::new(),
        };
        let w_minvar = solve(&min_var, &QpSettings::default()).unwrap();
        let w_maxret = solve(&max_ret, &QpSettings::default()).unwrap();
        assert!(w_maxret[0] > w_minvar[0]);
    }

    #[test]
    fn test_achievable_range() {
        let c = DVector::from_vec(vec![1.5, 0.5, -0.5]);
        let ub = DVector::from_element(3, 0.6);
        let (lo, hi) = achievable_range(&c, &ub);
        // Max: 0.6×1.5 + 0.4×0.5 = 1.1. Min: 0.6×(-0.5) + 0.4×0.5 = -0.1.
        assert_relative_eq!(hi, 1.1, epsilon = 1e-12);
        assert_relative_eq!(lo, -0.1, epsilon = 1e-12);
    }
}
