//! What-if scenario engine.
//!
//! Applies absolute target weights or relative deltas to a canonical
//! portfolio, re-normalizes over non-cash positions, and re-runs the
//! factor decomposition and risk evaluation. Nothing is persisted.

use crate::error::{OptimizerError, OptimizerResult};
use palisade_core::RiskProfile;
use palisade_factors::{decompose, decompose_with_weights, DecompositionConfig, FactorInputs};
use palisade_providers::CanonicalPortfolio;
use palisade_risk::{evaluate, Flag, LimitCheck, RiskReport, RiskScore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A what-if request: exactly one of `target_weights` (absolute) or
/// `delta_changes` (relative) must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhatIfRequest {
    /// Absolute weights; symbols omitted drop to zero.
    pub target_weights: Option<BTreeMap<String, f64>>,
    /// Relative weight changes applied to current weights.
    pub delta_changes: Option<BTreeMap<String, f64>>,
}

/// Risk summary of one side of the scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    /// Annualized volatility.
    pub volatility_annual: f64,
    /// Systematic share of variance.
    pub factor_pct: f64,
    /// Composite risk score.
    pub score: RiskScore,
    /// Whether every limit passed.
    pub passes: bool,
}

impl ScenarioSummary {
    fn of(volatility_annual: f64, factor_pct: f64, report: &RiskReport) -> Self {
        Self {
            volatility_annual,
            factor_pct,
            score: report.score.clone(),
            passes: report.passes,
        }
    }
}

/// Per-position weight move in the scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionChange {
    /// Asset symbol.
    pub symbol: String,
    /// Current weight.
    pub from: f64,
    /// Scenario weight.
    pub to: f64,
}

/// Compliance delta for one limit between before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceDelta {
    /// The before-side check.
    pub before: LimitCheck,
    /// The after-side check.
    pub after: LimitCheck,
}

/// Full scenario output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfResult {
    /// Metrics on today's weights.
    pub before: ScenarioSummary,
    /// Metrics on the scenario weights.
    pub after: ScenarioSummary,
    /// Weight moves, largest first.
    pub position_changes: Vec<PositionChange>,
    /// Paired limit checks.
    pub compliance: Vec<ComplianceDelta>,
    /// Flags from the after-side evaluation.
    pub flags: Vec<Flag>,
}

fn validate_and_build_weights(
    portfolio: &CanonicalPortfolio,
    current: &BTreeMap<String, f64>,
    request: &WhatIfRequest,
) -> OptimizerResult<BTreeMap<String, f64>> {
    let mut raw: BTreeMap<String, f64> = match (&request.target_weights, &request.delta_changes) {
        (Some(_), Some(_)) => {
            return Err(OptimizerError::validation(
                "provide target_weights or delta_changes, not both",
            ))
        }
        (None, None) => {
            return Err(OptimizerError::validation(
                "provide target_weights or delta_changes",
            ))
        }
        (Some(targets), None) => targets.clone(),
        (None, Some(deltas)) => {
            let mut weights = current.clone();
            for (symbol, delta) in deltas {
                *weights.entry(symbol.clone()).or_insert(0.0) += delta;
            }
            weights
        }
    };

    for (symbol, weight) in &raw {
        if !weight.is_finite() {
            return Err(OptimizerError::validation(format!(
                "non-finite weight for '{symbol}'"
            )));
        }
        // A weight-only submission cannot derive a notional for futures
        // the portfolio does not already hold; reject rather than guess.
        if !portfolio.positions.contains_key(symbol) {
            if symbol.contains(':') {
                return Err(OptimizerError::validation(format!(
                    "futures symbol '{symbol}' not in portfolio: weight-only futures \
                     require pre-computed notional weights"
                )));
            }
            return Err(OptimizerError::validation(format!(
                "unknown symbol '{symbol}' in scenario"
            )));
        }
    }

    raw.retain(|_, w| *w != 0.0);
    let gross: f64 = raw.values().map(|w| w.abs()).sum();
    if gross <= 0.0 {
        return Err(OptimizerError::validation("scenario weights sum to zero"));
    }
    for weight in raw.values_mut() {
        *weight /= gross;
    }
    Ok(raw)
}

/// Clones a portfolio with scenario weights (notional scaled to match).
fn with_weights(
    portfolio: &CanonicalPortfolio,
    weights: &BTreeMap<String, f64>,
) -> CanonicalPortfolio {
    let mut scenario = portfolio.clone();
    for (key, position) in scenario.positions.iter_mut() {
        if position.classification.is_cash() {
            continue;
        }
        let weight = weights.get(key).copied().unwrap_or(0.0);
        position.weight_by_notional = weight;
        position.notional_value = weight * portfolio.gross_notional;
    }
    scenario
}

/// Runs a what-if scenario.
///
/// # Errors
///
/// Validation failures (bad weight shape, unknown symbols, weight-only
/// futures) surface immediately; decomposition failures as solver
/// errors.
pub fn run_whatif(
    portfolio: &CanonicalPortfolio,
    inputs: &FactorInputs,
    profile: &RiskProfile,
    request: &WhatIfRequest,
    config: &DecompositionConfig,
) -> OptimizerResult<WhatIfResult> {
    let current = portfolio.weights();
    let scenario_weights = validate_and_build_weights(portfolio, &current, request)?;

    let before_decomposition =
        decompose(inputs, config).map_err(|e| OptimizerError::solver(e.to_string()))?;
    let before_report = evaluate(portfolio, &before_decomposition, &inputs.panel, profile);

    let scenario_portfolio = with_weights(portfolio, &scenario_weights);
    let after_decomposition = decompose_with_weights(inputs, &scenario_weights, config)
        .map_err(|e| OptimizerError::solver(e.to_string()))?;
    let after_report = evaluate(
        &scenario_portfolio,
        &after_decomposition,
        &inputs.panel,
        profile,
    );

    let mut position_changes: Vec<PositionChange> = current
        .keys()
        .chain(scenario_weights.keys())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(|symbol| PositionChange {
            symbol: symbol.clone(),
            from: current.get(symbol).copied().unwrap_or(0.0),
            to: scenario_weights.get(symbol).copied().unwrap_or(0.0),
        })
        .filter(|c| (c.from - c.to).abs() > 1e-12)
        .collect();
    position_changes.sort_by(|a, b| {
        (b.to - b.from)
            .abs()
            .partial_cmp(&(a.to - a.from).abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let compliance = before_report
        .checks
        .iter()
        .filter_map(|before| {
            after_report
                .checks
                .iter()
                .find(|after| after.kind == before.kind && after.subject == before.subject)
                .map(|after| ComplianceDelta {
                    before: before.clone(),
                    after: after.clone(),
                })
        })
        .collect();

    Ok(WhatIfResult {
        before: ScenarioSummary::of(
            before_decomposition.volatility_annual,
            before_decomposition.factor_pct,
            &before_report,
        ),
        after: ScenarioSummary::of(
            after_decomposition.volatility_annual,
            after_decomposition.factor_pct,
            &after_report,
        ),
        position_changes,
        compliance,
        flags: after_report.flags,
    })
}
