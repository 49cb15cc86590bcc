//! Return-series metrics: Sharpe, Sortino, drawdown, win rate.

use crate::twr::{annualize, chain};
use chrono::NaiveDate;
use palisade_prices::Series;
use serde::{Deserialize, Serialize};

/// Months per year.
const MONTHS_PER_YEAR: f64 = 12.0;

/// A labeled month observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthObservation {
    /// Last return date of the month.
    pub date: NaiveDate,
    /// Monthly return.
    pub value: f64,
}

/// Summary statistics over a monthly return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Compounded total return over the period.
    pub total_return: f64,
    /// Annualized return `(1 + R)^(12/n) - 1`.
    pub annualized_return: f64,
    /// Annualized volatility (monthly std × √12).
    pub volatility_annual: f64,
    /// Sharpe ratio against the configured annual risk-free rate.
    pub sharpe_ratio: f64,
    /// Sortino ratio (downside deviation denominator).
    pub sortino_ratio: f64,
    /// Maximum drawdown from the cumulative product (negative).
    pub max_drawdown: f64,
    /// Share of positive months (0-1).
    pub win_rate: f64,
    /// Best month.
    pub best_month: Option<MonthObservation>,
    /// Worst month.
    pub worst_month: Option<MonthObservation>,
    /// Number of months observed.
    pub n_months: u32,
}

/// Computes metrics from a monthly return series.
#[must_use]
pub fn compute_metrics(monthly: &Series, risk_free_annual: f64) -> PerformanceMetrics {
    let values = monthly.values();
    let n = values.len();
    let n_months = n as u32;

    let total_return = chain(monthly);
    let annualized_return = annualize(total_return, n_months.max(1));

    let mean = if n > 0 {
        values.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    let std_monthly = monthly.std_dev().unwrap_or(0.0);
    let volatility_annual = std_monthly * MONTHS_PER_YEAR.sqrt();

    let rf_monthly = (1.0 + risk_free_annual).powf(1.0 / MONTHS_PER_YEAR) - 1.0;
    let excess_annual = (mean - rf_monthly) * MONTHS_PER_YEAR;
    let sharpe_ratio = if volatility_annual > f64::EPSILON {
        excess_annual / volatility_annual
    } else {
        0.0
    };

    let downside: Vec<f64> = values
        .iter()
        .map(|r| (r - rf_monthly).min(0.0))
        .collect();
    let downside_dev = if n > 1 {
        (downside.iter().map(|d| d * d).sum::<f64>() / (n - 1) as f64).sqrt()
            * MONTHS_PER_YEAR.sqrt()
    } else {
        0.0
    };
    let sortino_ratio = if downside_dev > f64::EPSILON {
        excess_annual / downside_dev
    } else {
        0.0
    };

    // Max drawdown from the cumulative growth path.
    let mut peak = 1.0f64;
    let mut cumulative = 1.0f64;
    let mut max_drawdown = 0.0f64;
    for r in &values {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.min(cumulative / peak - 1.0);
    }

    let wins = values.iter().filter(|r| **r > 0.0).count();
    let win_rate = if n > 0 { wins as f64 / n as f64 } else { 0.0 };

    let best_month = monthly
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(date, value)| MonthObservation { date, value });
    let worst_month = monthly
        .iter()
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(date, value)| MonthObservation { date, value });

    PerformanceMetrics {
        total_return,
        annualized_return,
        volatility_annual,
        sharpe_ratio,
        sortino_ratio,
        max_drawdown,
        win_rate,
        best_month,
        worst_month,
        n_months,
    }
}
