//! Per-factor performance profiles.
//!
//! Basket columns are computed directly from their appended series; the
//! output schema is identical to standard factors, with return,
//! volatility, and drawdown expressed in percent.

use crate::error::{IntelError, IntelResult};
use palisade_factors::FactorPanel;
use palisade_prices::{pairwise_correlation, Series};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Performance profile of one factor column (percent units for return,
/// volatility, and drawdown).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorProfile {
    /// Annualized compounded return, percent.
    pub annual_return: f64,
    /// Annualized volatility, percent.
    pub volatility: f64,
    /// Sharpe ratio (unitless).
    pub sharpe_ratio: f64,
    /// Maximum drawdown, percent (negative).
    pub max_drawdown: f64,
    /// Beta to the market column.
    pub beta_to_market: f64,
}

fn profile_of(series: &Series, market: Option<&Series>, risk_free_annual: f64) -> FactorProfile {
    let values = series.values();
    let n = values.len().max(1);

    let growth: f64 = values.iter().fold(1.0, |acc, r| acc * (1.0 + r));
    let annual_return = growth.powf(12.0 / n as f64) - 1.0;

    let volatility = series.std_dev().unwrap_or(0.0) * 12f64.sqrt();

    let sharpe_ratio = if volatility > f64::EPSILON {
        (annual_return - risk_free_annual) / volatility
    } else {
        0.0
    };

    let mut peak = 1.0f64;
    let mut cumulative = 1.0f64;
    let mut max_drawdown = 0.0f64;
    for r in &values {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.min(cumulative / peak - 1.0);
    }

    // Beta via correlation × vol ratio on the pairwise overlap.
    let beta_to_market = market
        .and_then(|m| {
            let corr = pairwise_correlation(series, m)?;
            let own = series.std_dev()?;
            let mkt = m.std_dev()?;
            (mkt > f64::EPSILON).then(|| corr * own / mkt)
        })
        .unwrap_or(0.0);

    FactorProfile {
        annual_return: annual_return * 100.0,
        volatility: volatility * 100.0,
        sharpe_ratio,
        max_drawdown: max_drawdown * 100.0,
        beta_to_market,
    }
}

/// Computes a profile per panel column (baskets included, same schema).
///
/// # Errors
///
/// Fails on an empty panel.
pub fn factor_profiles(
    panel: &FactorPanel,
    risk_free_annual: f64,
) -> IntelResult<BTreeMap<String, FactorProfile>> {
    if panel.is_empty() {
        return Err(IntelError::EmptyPanel {
            reason: "no columns to profile".to_string(),
        });
    }
    // First market-category column anchors beta.
    let market_column = panel.columns_in_category("market").into_iter().next();
    let market_series = market_column.as_ref().map(|c| &panel.columns[c]);

    Ok(panel
        .columns
        .iter()
        .map(|(name, series)| {
            let market = if Some(name) == market_column.as_ref() {
                Some(series)
            } else {
                market_series
            };
            (name.clone(), profile_of(series, market, risk_free_annual))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn date(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, 28).unwrap()
    }

    fn panel() -> FactorPanel {
        let mut panel = FactorPanel::default();
        panel.add_column(
            "SPY",
            Series::from_pairs((1..=12).map(|m| (date(m), 0.01))),
            "market",
            "SPY",
        );
        panel.add_column(
            "Basket: X",
            Series::from_pairs((1..=12).map(|m| (date(m), 0.02))),
            "user_baskets",
            "Basket: X",
        );
        panel
    }

    #[test]
    fn test_constant_return_profile() {
        let profiles = factor_profiles(&panel(), 0.0).unwrap();
        let spy = &profiles["SPY"];
        // 1% monthly compounds to (1.01)^12 - 1 annually, in percent.
        assert_relative_eq!(
            spy.annual_return,
            (1.01f64.powi(12) - 1.0) * 100.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(spy.volatility, 0.0, epsilon = 1e-9);
        assert_relative_eq!(spy.max_drawdown, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_basket_profile_same_schema() {
        let profiles = factor_profiles(&panel(), 0.0).unwrap();
        // Both entries deserialize to the same shape; the basket profile
        // is computed from its appended series.
        let basket = &profiles["Basket: X"];
        assert!(basket.annual_return > profiles["SPY"].annual_return);
    }

    #[test]
    fn test_market_beta_of_market_is_one() {
        let mut panel = FactorPanel::default();
        let series = Series::from_pairs((1..=12).map(|m| (date(m), 0.01 * (m as f64 - 6.0))));
        panel.add_column("SPY", series, "market", "SPY");
        let profiles = factor_profiles(&panel, 0.0).unwrap();
        assert_relative_eq!(profiles["SPY"].beta_to_market, 1.0, epsilon = 1e-9);
    }
}
