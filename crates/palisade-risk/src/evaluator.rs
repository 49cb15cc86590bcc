//! Risk limit evaluation.
//!
//! Every check is deterministic in its inputs; the flag list is sorted by
//! (severity desc, type) so repeated runs diff cleanly.

use crate::score::{RiskScore, ScoreWeights};
use palisade_core::RiskProfile;
use palisade_factors::{FactorDecomposition, FactorPanel};
use palisade_providers::CanonicalPortfolio;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Severity of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Approaching a limit.
    Warning,
    /// Limit breached.
    Error,
}

/// A single evaluation flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    /// Severity of the finding.
    pub severity: Severity,
    /// Stable machine-readable type.
    pub flag_type: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details (limit, actual, symbol, ...).
    pub details: serde_json::Value,
}

/// Which limit a check belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Annualized portfolio volatility.
    Volatility,
    /// Largest single non-cash position weight.
    SingleStock,
    /// Largest single-factor variance share.
    FactorContribution,
    /// Market-category variance share.
    MarketContribution,
    /// Industry-category variance share.
    IndustryContribution,
    /// Worst single-factor historical loss.
    SingleFactorLoss,
    /// Notional leverage.
    Leverage,
    /// Per-factor beta box.
    BetaCap,
}

impl LimitKind {
    fn label(&self) -> &'static str {
        match self {
            LimitKind::Volatility => "volatility",
            LimitKind::SingleStock => "single_stock",
            LimitKind::FactorContribution => "factor_contribution",
            LimitKind::MarketContribution => "market_contribution",
            LimitKind::IndustryContribution => "industry_contribution",
            LimitKind::SingleFactorLoss => "single_factor_loss",
            LimitKind::Leverage => "leverage",
            LimitKind::BetaCap => "beta_cap",
        }
    }
}

/// Pass/fail result for one limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitCheck {
    /// Which limit this is.
    pub kind: LimitKind,
    /// Subject of the check (factor or symbol), when applicable.
    pub subject: Option<String>,
    /// Configured limit.
    pub limit: f64,
    /// Measured value.
    pub actual: f64,
    /// `actual / limit` on the breach axis (1.0 = at limit).
    pub ratio: f64,
    /// Whether the check passed.
    pub pass: bool,
}

/// Full evaluation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// True when every limit passed.
    pub passes: bool,
    /// Per-limit results.
    pub checks: Vec<LimitCheck>,
    /// Ordered flag list (severity desc, type asc).
    pub flags: Vec<Flag>,
    /// Composite 0-100 score.
    pub score: RiskScore,
}

impl RiskReport {
    /// Flags at or above a severity.
    #[must_use]
    pub fn flags_at_least(&self, severity: Severity) -> Vec<&Flag> {
        self.flags.iter().filter(|f| f.severity >= severity).collect()
    }
}

fn check(kind: LimitKind, subject: Option<String>, limit: f64, actual: f64) -> LimitCheck {
    let ratio = if limit.abs() > f64::EPSILON {
        (actual / limit).max(0.0)
    } else if actual.abs() > f64::EPSILON {
        f64::INFINITY
    } else {
        0.0
    };
    LimitCheck {
        kind,
        subject,
        limit,
        actual,
        ratio,
        pass: ratio <= 1.0,
    }
}

fn flag_for(check: &LimitCheck) -> Option<Flag> {
    if check.pass {
        return None;
    }
    let severity = if check.ratio > 1.25 {
        Severity::Error
    } else {
        Severity::Warning
    };
    let subject = check
        .subject
        .as_deref()
        .map(|s| format!(" ({s})"))
        .unwrap_or_default();
    Some(Flag {
        severity,
        flag_type: check.kind.label().to_string(),
        message: format!(
            "{}{} at {:.4} exceeds limit {:.4}",
            check.kind.label(),
            subject,
            check.actual,
            check.limit
        ),
        details: serde_json::json!({
            "limit": check.limit,
            "actual": check.actual,
            "ratio": check.ratio,
            "subject": check.subject,
        }),
    })
}

/// Evaluates a decomposition against a risk profile.
#[must_use]
pub fn evaluate(
    portfolio: &CanonicalPortfolio,
    decomposition: &FactorDecomposition,
    panel: &FactorPanel,
    profile: &RiskProfile,
) -> RiskReport {
    let mut checks = Vec::new();

    // Volatility.
    checks.push(check(
        LimitKind::Volatility,
        None,
        profile.max_volatility,
        decomposition.volatility_annual,
    ));

    // Single-position concentration (futures measured by notional weight
    // like everything else).
    let (max_weight_symbol, max_weight) = portfolio
        .non_cash()
        .map(|p| (p.symbol.to_string(), p.weight_by_notional.abs()))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .unwrap_or(("none".to_string(), 0.0));
    checks.push(check(
        LimitKind::SingleStock,
        Some(max_weight_symbol),
        profile.max_single_stock_weight,
        max_weight,
    ));

    // Largest single-factor variance share (market excluded; it has its
    // own limit).
    let (max_factor, max_factor_share) = decomposition
        .factor_variance_shares
        .iter()
        .filter(|(column, _)| {
            panel.categories.get(*column).map(String::as_str) != Some("market")
        })
        .map(|(column, share)| (column.clone(), *share))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .unwrap_or(("none".to_string(), 0.0));
    checks.push(check(
        LimitKind::FactorContribution,
        Some(max_factor),
        profile.max_factor_contribution,
        max_factor_share,
    ));

    // Market and industry category shares.
    let market_share = decomposition
        .category_variance_shares
        .get("market")
        .copied()
        .unwrap_or(0.0);
    checks.push(check(
        LimitKind::MarketContribution,
        None,
        profile.max_market_contribution,
        market_share,
    ));

    let industry_share = decomposition
        .category_variance_shares
        .get("industry")
        .copied()
        .unwrap_or(0.0);
    checks.push(check(
        LimitKind::IndustryContribution,
        None,
        profile.max_industry_contribution,
        industry_share,
    ));

    // Worst single-factor loss: portfolio beta times the factor's worst
    // observed month.
    let mut worst_loss = 0.0f64;
    let mut worst_factor = "none".to_string();
    for (column, beta) in &decomposition.portfolio_betas {
        if let Some(series) = panel.columns.get(column) {
            let worst_month = series
                .values()
                .into_iter()
                .fold(f64::INFINITY, f64::min);
            if worst_month.is_finite() {
                let loss = beta * worst_month;
                if loss < worst_loss {
                    worst_loss = loss;
                    worst_factor = column.clone();
                }
            }
        }
    }
    // Both sides are losses (negative); ratio on the loss magnitude.
    let loss_check = LimitCheck {
        kind: LimitKind::SingleFactorLoss,
        subject: Some(worst_factor),
        limit: profile.max_single_factor_loss,
        actual: worst_loss,
        ratio: if profile.max_single_factor_loss.abs() > f64::EPSILON {
            (worst_loss.abs() / profile.max_single_factor_loss.abs()).max(0.0)
        } else {
            0.0
        },
        pass: worst_loss >= profile.max_single_factor_loss,
    };
    checks.push(loss_check);

    // Leverage.
    checks.push(check(
        LimitKind::Leverage,
        None,
        profile.max_leverage,
        portfolio.notional_leverage,
    ));

    // Beta caps per factor category.
    for (factor, cap) in &profile.factor_beta_caps {
        if let Some(beta) = decomposition.category_betas.get(factor) {
            let breached_high = *beta > cap.max;
            let breached_low = *beta < cap.min;
            let bound = if breached_low { cap.min } else { cap.max };
            let ratio = if bound.abs() > f64::EPSILON {
                (beta.abs() / bound.abs()).max(0.0)
            } else if breached_high || breached_low {
                f64::INFINITY
            } else {
                0.0
            };
            checks.push(LimitCheck {
                kind: LimitKind::BetaCap,
                subject: Some(factor.clone()),
                limit: bound,
                actual: *beta,
                ratio,
                pass: !(breached_high || breached_low),
            });
        }
    }

    let mut flags: Vec<Flag> = checks.iter().filter_map(flag_for).collect();

    // Data-quality findings surface as informational flags.
    let dq = &portfolio.data_quality;
    if !dq.cross_source_leakage.is_empty() {
        flags.push(Flag {
            severity: Severity::Info,
            flag_type: "cross_source_leakage".to_string(),
            message: format!(
                "{} symbol(s) excluded by cross-source ambiguity",
                dq.cross_source_leakage.len()
            ),
            details: serde_json::json!({ "symbols": dq.cross_source_leakage }),
        });
    }
    if !decomposition.insufficient_history.is_empty() {
        flags.push(Flag {
            severity: Severity::Info,
            flag_type: "insufficient_history".to_string(),
            message: format!(
                "{} asset(s) below the observation floor",
                decomposition.insufficient_history.len()
            ),
            details: serde_json::json!({ "symbols": decomposition.insufficient_history }),
        });
    }
    if dq.synthetic_positions > 0 {
        flags.push(Flag {
            severity: Severity::Info,
            flag_type: "synthetic_positions".to_string(),
            message: format!("{} position(s) carried without cost basis", dq.synthetic_positions),
            details: serde_json::json!({ "count": dq.synthetic_positions }),
        });
    }

    // Stable ordering for diffing.
    flags.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.flag_type.cmp(&b.flag_type))
    });

    let find_ratio = |kind: LimitKind| {
        checks
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.ratio)
            .fold(0.0f64, f64::max)
    };
    let score = RiskScore::from_ratios(
        find_ratio(LimitKind::SingleStock),
        find_ratio(LimitKind::Volatility),
        find_ratio(LimitKind::FactorContribution),
        find_ratio(LimitKind::IndustryContribution),
        &ScoreWeights::default(),
    );

    let passes = checks.iter().all(|c| c.pass);

    RiskReport {
        passes,
        checks,
        flags,
        score,
    }
}
