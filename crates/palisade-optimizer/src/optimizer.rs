//! Portfolio optimization over the factor covariance model.

use crate::error::{OptimizerError, OptimizerResult};
use crate::qp::{solve_with_retry, LinearBox, QpProblem, QpSettings};
use nalgebra::{DMatrix, DVector};
use palisade_core::RiskProfile;
use palisade_factors::{
    decompose_with_weights, regress_asset, DecompositionConfig, FactorInputs, FactorProxies,
    RegressionOutcome,
};
use palisade_risk::{LimitCheck, LimitKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Minimize portfolio variance.
    MinVariance,
    /// Maximize expected return with a small risk penalty.
    MaxReturn,
}

/// Rebalance-magnitude label from the L1 weight distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// L1 distance below the no-change threshold (default 2%).
    NoChanges,
    /// Small tilt.
    MinorRebalance,
    /// Meaningful reallocation.
    ModerateRebalance,
    /// Large reallocation.
    MajorRebalance,
    /// The optimized weights still violate a constraint.
    HasViolations,
}

/// L1 distance below which the verdict is `NoChanges`.
pub const NO_CHANGE_THRESHOLD: f64 = 0.02;

/// Derives the verdict from the L1 distance and compliance outcome.
#[must_use]
pub fn verdict_for(l1_distance: f64, has_violations: bool) -> Verdict {
    if has_violations {
        Verdict::HasViolations
    } else if l1_distance < NO_CHANGE_THRESHOLD {
        Verdict::NoChanges
    } else if l1_distance < 0.10 {
        Verdict::MinorRebalance
    } else if l1_distance < 0.25 {
        Verdict::ModerateRebalance
    } else {
        Verdict::MajorRebalance
    }
}

/// One weight move in the optimized allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightChange {
    /// Asset symbol.
    pub symbol: String,
    /// Current weight.
    pub from: f64,
    /// Optimized weight.
    pub to: f64,
    /// Change in basis points.
    pub change_bps: f64,
}

/// Optimization output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Objective that was run.
    pub objective: Objective,
    /// Optimized weights per asset.
    pub weights: BTreeMap<String, f64>,
    /// Weights the portfolio holds today.
    pub current_weights: BTreeMap<String, f64>,
    /// Largest moves first, in basis points.
    pub top_changes: Vec<WeightChange>,
    /// Constraint compliance of the optimized weights.
    pub compliance: Vec<LimitCheck>,
    /// Rebalance verdict.
    pub verdict: Verdict,
    /// Annualized volatility of the optimized portfolio.
    pub expected_volatility: f64,
    /// L1 distance between current and optimized weights.
    pub l1_distance: f64,
}

/// Factor covariance model shared by the optimizer stages.
#[derive(Debug, Clone)]
pub struct CovarianceModel {
    /// Asset order for every matrix.
    pub assets: Vec<String>,
    /// Annualized covariance `12 (B Σ_f Bᵀ + D)`.
    pub sigma: DMatrix<f64>,
    /// Beta matrix (assets × columns).
    pub b: DMatrix<f64>,
    /// Panel column order.
    pub columns: Vec<String>,
    /// Annualized mean returns per asset.
    pub mu: DVector<f64>,
}

/// Builds the covariance model from fitted inputs.
///
/// # Errors
///
/// Fails when no asset has both a weight and a return series.
pub fn build_covariance(
    inputs: &FactorInputs,
    config: &DecompositionConfig,
) -> OptimizerResult<CovarianceModel> {
    let assets: Vec<String> = inputs
        .weights
        .keys()
        .filter(|s| inputs.asset_returns.contains_key(*s))
        .cloned()
        .collect();
    if assets.is_empty() {
        return Err(OptimizerError::validation(
            "no asset has both a weight and a return series",
        ));
    }

    let columns = inputs.panel.column_names();
    let k = columns.len();
    let n = assets.len();

    let mut b = DMatrix::<f64>::zeros(n, k);
    let mut idio = DVector::<f64>::zeros(n);
    let mut mu = DVector::<f64>::zeros(n);
    let empty = FactorProxies::default();

    for (i, symbol) in assets.iter().enumerate() {
        let returns = &inputs.asset_returns[symbol];
        mu[i] = returns.mean().unwrap_or(0.0) * 12.0;
        let proxies = inputs.proxies.get(symbol).unwrap_or(&empty);
        match regress_asset(symbol, returns, proxies, &inputs.panel, config.min_obs) {
            RegressionOutcome::Fitted(fit) => {
                for (j, column) in columns.iter().enumerate() {
                    if let Some(beta) = fit.betas.get(column) {
                        b[(i, j)] = *beta;
                    }
                }
                idio[i] = fit.residual_variance;
            }
            RegressionOutcome::InsufficientHistory { own_variance, .. } => {
                idio[i] = own_variance;
            }
        }
    }

    let variances = inputs.panel.monthly_variances();
    let sigma_f = DMatrix::<f64>::from_diagonal(&DVector::from_iterator(
        k,
        columns.iter().map(|c| variances[c]),
    ));
    let mut sigma = &b * &sigma_f * b.transpose();
    for i in 0..n {
        sigma[(i, i)] += idio[i];
    }
    sigma *= 12.0;

    Ok(CovarianceModel {
        assets,
        sigma,
        b,
        columns,
        mu,
    })
}

fn beta_boxes(
    model: &CovarianceModel,
    inputs: &FactorInputs,
    profile: &RiskProfile,
) -> Vec<LinearBox> {
    let mut boxes = Vec::new();
    for (factor, cap) in &profile.factor_beta_caps {
        let category_columns = inputs.panel.columns_in_category(factor);
        if category_columns.is_empty() {
            continue;
        }
        let mut coefficients = DVector::<f64>::zeros(model.assets.len());
        for column in &category_columns {
            if let Some(j) = model.columns.iter().position(|c| c == column) {
                for i in 0..model.assets.len() {
                    coefficients[i] += model.b[(i, j)];
                }
            }
        }
        boxes.push(LinearBox {
            name: format!("beta:{factor}"),
            coefficients,
            min: cap.min,
            max: cap.max,
        });
    }
    boxes
}

/// Maximum re-projection rounds for factor-contribution caps.
const MAX_REPROJECTIONS: usize = 5;

/// Runs a constrained optimization.
///
/// Factor-contribution caps are enforced by iterative re-projection:
/// after each solve, any factor whose variance share exceeds the cap gets
/// a tightened linearized bound and the QP is re-solved.
///
/// # Errors
///
/// Infeasibility and solver failure are distinguished per the error
/// taxonomy; bad inputs surface as validation errors.
pub fn run_optimization(
    inputs: &FactorInputs,
    profile: &RiskProfile,
    objective: Objective,
    config: &DecompositionConfig,
) -> OptimizerResult<OptimizationResult> {
    let model = build_covariance(inputs, config)?;
    let n = model.assets.len();

    let upper_bounds = DVector::from_element(n, profile.max_single_stock_weight.min(1.0));
    let mut boxes = beta_boxes(&model, inputs, profile);
    let settings = QpSettings::default();

    let (mu, risk_penalty) = match objective {
        Objective::MinVariance => (None, 0.0),
        // Small λ keeps the tilt bounded by risk.
        Objective::MaxReturn => (Some(model.mu.clone()), 4.0),
    };

    let mut weights_vec = DVector::<f64>::zeros(n);
    for round in 0..=MAX_REPROJECTIONS {
        let problem = QpProblem {
            sigma: model.sigma.clone(),
            mu: mu.clone(),
            risk_penalty,
            upper_bounds: upper_bounds.clone(),
            boxes: boxes.clone(),
        };
        weights_vec = solve_with_retry(&problem, &settings)?;

        // Factor-contribution caps: share_k = 12 (b_kᵀw)² σ²_k / var_port.
        let weights_map: BTreeMap<String, f64> = model
            .assets
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), weights_vec[i]))
            .collect();
        let decomposition = decompose_with_weights(inputs, &weights_map, config)
            .map_err(|e| OptimizerError::solver(e.to_string()))?;

        // Market has its own limit; the per-factor cap binds the rest.
        let mut worst: Option<(String, f64)> = None;
        for (column, share) in &decomposition.factor_variance_shares {
            if inputs.panel.categories.get(column).map(String::as_str) == Some("market") {
                continue;
            }
            if *share > profile.max_factor_contribution
                && worst.as_ref().map_or(true, |(_, w)| share > w)
            {
                worst = Some((column.clone(), *share));
            }
        }
        match worst {
            Some((column, share)) if round < MAX_REPROJECTIONS => {
                let j = model
                    .columns
                    .iter()
                    .position(|c| c == &column)
                    .ok_or_else(|| OptimizerError::solver("missing cap column"))?;
                let exposure: f64 =
                    (0..n).map(|i| model.b[(i, j)] * weights_vec[i]).sum();
                let tighten = (profile.max_factor_contribution / share).sqrt();
                let bound = (exposure.abs() * tighten).max(1e-6);
                debug!(column = %column, share, bound, "re-projecting factor cap");
                boxes.push(LinearBox {
                    name: format!("factor_cap:{column}"),
                    coefficients: DVector::from_iterator(
                        n,
                        (0..n).map(|i| model.b[(i, j)]),
                    ),
                    min: -bound,
                    max: bound,
                });
            }
            _ => break,
        }
    }

    let optimized: BTreeMap<String, f64> = model
        .assets
        .iter()
        .enumerate()
        .map(|(i, s)| (s.clone(), weights_vec[i]))
        .collect();
    let current: BTreeMap<String, f64> = model
        .assets
        .iter()
        .map(|s| (s.clone(), inputs.weights.get(s).copied().unwrap_or(0.0)))
        .collect();

    let decomposition = decompose_with_weights(inputs, &optimized, config)
        .map_err(|e| OptimizerError::solver(e.to_string()))?;

    // Compliance of the optimized weights.
    let mut compliance = Vec::new();
    let max_weight = optimized.values().fold(0.0f64, |a, w| a.max(w.abs()));
    compliance.push(LimitCheck {
        kind: LimitKind::SingleStock,
        subject: None,
        limit: profile.max_single_stock_weight,
        actual: max_weight,
        ratio: max_weight / profile.max_single_stock_weight.max(f64::EPSILON),
        pass: max_weight <= profile.max_single_stock_weight + 1e-9,
    });
    for (factor, cap) in &profile.factor_beta_caps {
        if let Some(beta) = decomposition.category_betas.get(factor) {
            let pass = *beta >= cap.min - 1e-6 && *beta <= cap.max + 1e-6;
            compliance.push(LimitCheck {
                kind: LimitKind::BetaCap,
                subject: Some(factor.clone()),
                limit: cap.max,
                actual: *beta,
                ratio: if cap.max.abs() > f64::EPSILON {
                    beta.abs() / cap.max.abs()
                } else {
                    0.0
                },
                pass,
            });
        }
    }
    let max_share = decomposition
        .factor_variance_shares
        .iter()
        .filter(|(column, _)| {
            inputs.panel.categories.get(*column).map(String::as_str) != Some("market")
        })
        .map(|(_, s)| *s)
        .fold(0.0f64, f64::max);
    compliance.push(LimitCheck {
        kind: LimitKind::FactorContribution,
        subject: None,
        limit: profile.max_factor_contribution,
        actual: max_share,
        ratio: max_share / profile.max_factor_contribution.max(f64::EPSILON),
        pass: max_share <= profile.max_factor_contribution + 1e-6,
    });
    compliance.push(LimitCheck {
        kind: LimitKind::Volatility,
        subject: None,
        limit: profile.max_volatility,
        actual: decomposition.volatility_annual,
        ratio: decomposition.volatility_annual / profile.max_volatility.max(f64::EPSILON),
        pass: decomposition.volatility_annual <= profile.max_volatility + 1e-9,
    });

    let l1_distance: f64 = model
        .assets
        .iter()
        .map(|s| (optimized[s] - current[s]).abs())
        .sum();
    let has_violations = compliance.iter().any(|c| !c.pass);
    let verdict = verdict_for(l1_distance, has_violations);

    let mut top_changes: Vec<WeightChange> = model
        .assets
        .iter()
        .map(|s| {
            let from = current[s];
            let to = optimized[s];
            WeightChange {
                symbol: s.clone(),
                from,
                to,
                change_bps: (to - from) * 10_000.0,
            }
        })
        .collect();
    top_changes.sort_by(|a, b| {
        b.change_bps
            .abs()
            .partial_cmp(&a.change_bps.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    info!(
        ?objective,
        l1 = l1_distance,
        verdict = ?verdict,
        "optimization complete"
    );

    Ok(OptimizationResult {
        objective,
        weights: optimized,
        current_weights: current,
        top_changes,
        compliance,
        verdict,
        expected_volatility: decomposition.volatility_annual,
        l1_distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use palisade_core::{ProfileTemplate, RiskProfile};
    use palisade_factors::FactorPanel;
    use palisade_prices::Series;

    fn date(i: usize) -> NaiveDate {
        let year = 2023 + (i / 12) as i32;
        let month = (i % 12) as u32 + 1;
        NaiveDate::from_ymd_opt(year, month, 28).unwrap()
    }

    fn fixture() -> FactorInputs {
        let factor: Vec<f64> = (0..36).map(|i| 0.015 * (((i * 7) % 11) as f64 - 5.0) / 5.0).collect();
        let mut panel = FactorPanel::default();
        panel.add_column(
            "SPY",
            Series::from_pairs(factor.iter().enumerate().map(|(i, v)| (date(i), *v))),
            "market",
            "SPY",
        );

        let mut asset_returns = BTreeMap::new();
        let mut proxies = BTreeMap::new();
        let mut weights = BTreeMap::new();
        for (symbol, beta, noise_scale, weight) in [
            ("AAA", 1.4, 0.006, 0.4),
            ("BBB", 0.9, 0.004, 0.3),
            ("CCC", 0.5, 0.008, 0.2),
            ("DDD", 0.7, 0.005, 0.1),
        ] {
            let series = Series::from_pairs(factor.iter().enumerate().map(|(i, f)| {
                let noise = noise_scale * (((i * 13) % 5) as f64 - 2.0);
                (date(i), beta * *f + noise)
            }));
            asset_returns.insert(symbol.to_string(), series);
            proxies.insert(
                symbol.to_string(),
                FactorProxies {
                    market: Some("SPY".to_string()),
                    ..FactorProxies::default()
                },
            );
            weights.insert(symbol.to_string(), weight);
        }

        FactorInputs {
            panel,
            asset_returns,
            proxies,
            weights,
            missing_prices: Vec::new(),
        }
    }

    #[test]
    fn test_min_variance_satisfies_constraints() {
        let inputs = fixture();
        let profile = RiskProfile::from_template(ProfileTemplate::Trading);
        let result = run_optimization(
            &inputs,
            &profile,
            Objective::MinVariance,
            &DecompositionConfig::default(),
        )
        .unwrap();

        let sum: f64 = result.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        for (_, w) in &result.weights {
            assert!(*w >= -1e-9 && *w <= profile.max_single_stock_weight + 1e-6);
        }
        assert!(result.compliance.iter().all(|c| c.pass));
        assert_ne!(result.verdict, Verdict::HasViolations);
    }

    #[test]
    fn test_top_changes_in_bps_sorted() {
        let inputs = fixture();
        let profile = RiskProfile::from_template(ProfileTemplate::Trading);
        let result = run_optimization(
            &inputs,
            &profile,
            Objective::MinVariance,
            &DecompositionConfig::default(),
        )
        .unwrap();
        for pair in result.top_changes.windows(2) {
            assert!(pair[0].change_bps.abs() >= pair[1].change_bps.abs());
        }
    }

    #[test]
    fn test_infeasible_single_stock_cap() {
        let inputs = fixture();
        let mut profile = RiskProfile::from_template(ProfileTemplate::Trading);
        // 4 assets × 20% cap cannot reach 100%.
        profile.max_single_stock_weight = 0.20;
        let err = run_optimization(
            &inputs,
            &profile,
            Objective::MinVariance,
            &DecompositionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::Infeasible { .. }));
    }

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(verdict_for(0.001, false), Verdict::NoChanges);
        assert_eq!(verdict_for(0.05, false), Verdict::MinorRebalance);
        assert_eq!(verdict_for(0.15, false), Verdict::ModerateRebalance);
        assert_eq!(verdict_for(0.40, false), Verdict::MajorRebalance);
        assert_eq!(verdict_for(0.001, true), Verdict::HasViolations);
    }
}
