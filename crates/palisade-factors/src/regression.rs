//! Per-asset OLS factor regression.
//!
//! For each asset, the monthly return series is aligned with the panel
//! columns present in its proxy set and fit by ordinary least squares:
//! `r = α + Σ β_k f_k + ε`. Missing months are dropped per regression,
//! never globally, preserving maximum observations per asset.

use crate::panel::{composite_key, FactorPanel};
use crate::proxy::FactorProxies;
use nalgebra::{DMatrix, DVector};
use palisade_prices::Series;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum observations before an asset's betas are trusted.
pub const DEFAULT_MIN_OBS: usize = 24;

/// A fitted per-asset regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRegression {
    /// Asset symbol.
    pub symbol: String,
    /// Betas keyed by panel column.
    pub betas: BTreeMap<String, f64>,
    /// Regression intercept (monthly).
    pub alpha: f64,
    /// Residual variance (monthly, sample).
    pub residual_variance: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
    /// Observations used.
    pub n_obs: usize,
}

/// Outcome of attempting a regression for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegressionOutcome {
    /// Enough history; betas fitted.
    Fitted(AssetRegression),
    /// Below the observation floor. The asset is excluded from factor
    /// contributions but still carries idiosyncratic variance from its
    /// own series.
    InsufficientHistory {
        /// Asset symbol.
        symbol: String,
        /// Observations available.
        n_obs: usize,
        /// Sample variance of the asset's own returns (monthly).
        own_variance: f64,
    },
}

/// Panel columns referenced by an asset's proxy set, in deterministic
/// factor order, restricted to columns that exist in the panel.
#[must_use]
pub fn asset_columns(proxies: &FactorProxies, panel: &FactorPanel) -> Vec<String> {
    let mut columns = Vec::new();
    let push = |columns: &mut Vec<String>, ticker: &Option<String>| {
        if let Some(ticker) = ticker {
            if panel.columns.contains_key(ticker) && !columns.contains(ticker) {
                columns.push(ticker.clone());
            }
        }
    };
    push(&mut columns, &proxies.market);
    push(&mut columns, &proxies.momentum);
    push(&mut columns, &proxies.value);
    push(&mut columns, &proxies.industry);
    if !proxies.subindustry.is_empty() {
        let key = composite_key(&proxies.subindustry);
        if panel.columns.contains_key(&key) && !columns.contains(&key) {
            columns.push(key);
        }
    }
    push(&mut columns, &proxies.commodity);
    push(&mut columns, &proxies.rate);
    columns
}

fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Fits the factor regression for one asset.
pub fn regress_asset(
    symbol: &str,
    returns: &Series,
    proxies: &FactorProxies,
    panel: &FactorPanel,
    min_obs: usize,
) -> RegressionOutcome {
    let columns = asset_columns(proxies, panel);

    // Complete-case alignment for this asset only.
    let mut dates = returns.dates();
    for column in &columns {
        let series = &panel.columns[column];
        dates.retain(|d| series.get(*d).is_some());
    }

    let n = dates.len();
    let k = columns.len();
    let own: Vec<f64> = dates.iter().filter_map(|d| returns.get(*d)).collect();

    if n < min_obs || k == 0 || n <= k + 1 {
        return RegressionOutcome::InsufficientHistory {
            symbol: symbol.to_string(),
            n_obs: n,
            own_variance: sample_variance(&own),
        };
    }

    // Design matrix with intercept.
    let mut x = DMatrix::<f64>::zeros(n, k + 1);
    let mut y = DVector::<f64>::zeros(n);
    for (row, date) in dates.iter().enumerate() {
        x[(row, 0)] = 1.0;
        for (col, column) in columns.iter().enumerate() {
            x[(row, col + 1)] = panel.columns[column].get(*date).unwrap_or(0.0);
        }
        y[row] = returns.get(*date).unwrap_or(0.0);
    }

    let svd = x.clone().svd(true, true);
    let coefficients = match svd.solve(&y, 1e-12) {
        Ok(c) => c,
        Err(_) => {
            return RegressionOutcome::InsufficientHistory {
                symbol: symbol.to_string(),
                n_obs: n,
                own_variance: sample_variance(&own),
            }
        }
    };

    let fitted = &x * &coefficients;
    let residuals = &y - &fitted;
    let dof = (n - k - 1) as f64;
    let residual_variance = residuals.iter().map(|r| r * r).sum::<f64>() / dof;

    let mean_y = y.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean_y).powi(2)).sum();
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let r_squared = if ss_tot > f64::EPSILON {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    };

    let betas = columns
        .iter()
        .enumerate()
        .map(|(i, column)| (column.clone(), coefficients[i + 1]))
        .collect();

    RegressionOutcome::Fitted(AssetRegression {
        symbol: symbol.to_string(),
        betas,
        alpha: coefficients[0],
        residual_variance,
        r_squared,
        n_obs: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn date(i: usize) -> NaiveDate {
        let year = 2023 + (i / 12) as i32;
        let month = (i % 12) as u32 + 1;
        NaiveDate::from_ymd_opt(year, month, 28).unwrap()
    }

    fn panel_with_market(factor: &[f64]) -> FactorPanel {
        let mut panel = FactorPanel::default();
        let series = Series::from_pairs(factor.iter().enumerate().map(|(i, v)| (date(i), *v)));
        panel.add_column("SPY", series, "market", "SPY");
        panel
    }

    fn market_proxies() -> FactorProxies {
        FactorProxies {
            market: Some("SPY".to_string()),
            ..FactorProxies::default()
        }
    }

    #[test]
    fn test_exact_linear_fit() {
        // r = 0.002 + 1.5 f, zero noise.
        let factor: Vec<f64> = (0..36).map(|i| 0.01 * ((i % 7) as f64 - 3.0)).collect();
        let asset: Vec<f64> = factor.iter().map(|f| 0.002 + 1.5 * f).collect();
        let panel = panel_with_market(&factor);
        let returns = Series::from_pairs(asset.iter().enumerate().map(|(i, v)| (date(i), *v)));

        let outcome = regress_asset("TEST", &returns, &market_proxies(), &panel, 24);
        let fit = match outcome {
            RegressionOutcome::Fitted(fit) => fit,
            other => panic!("expected fit, got {other:?}"),
        };
        assert_relative_eq!(fit.betas["SPY"], 1.5, epsilon = 1e-9);
        assert_relative_eq!(fit.alpha, 0.002, epsilon = 1e-9);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-9);
        assert!(fit.residual_variance < 1e-18);
        assert_eq!(fit.n_obs, 36);
    }

    #[test]
    fn test_insufficient_history() {
        let factor: Vec<f64> = (0..10).map(|i| 0.01 * (i as f64)).collect();
        let asset: Vec<f64> = factor.iter().map(|f| 2.0 * f).collect();
        let panel = panel_with_market(&factor);
        let returns = Series::from_pairs(asset.iter().enumerate().map(|(i, v)| (date(i), *v)));

        let outcome = regress_asset("TEST", &returns, &market_proxies(), &panel, 24);
        match outcome {
            RegressionOutcome::InsufficientHistory { n_obs, own_variance, .. } => {
                assert_eq!(n_obs, 10);
                assert!(own_variance > 0.0);
            }
            other => panic!("expected insufficient history, got {other:?}"),
        }
    }

    #[test]
    fn test_pairwise_month_drop() {
        // The asset misses two months the factor has; alignment keeps the
        // remaining 34 observations rather than failing.
        let factor: Vec<f64> = (0..36).map(|i| 0.01 * ((i % 5) as f64 - 2.0)).collect();
        let panel = panel_with_market(&factor);
        let returns = Series::from_pairs(
            factor
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != 4 && *i != 20)
                .map(|(i, v)| (date(i), 0.8 * *v)),
        );

        let outcome = regress_asset("TEST", &returns, &market_proxies(), &panel, 24);
        match outcome {
            RegressionOutcome::Fitted(fit) => {
                assert_eq!(fit.n_obs, 34);
                assert_relative_eq!(fit.betas["SPY"], 0.8, epsilon = 1e-9);
            }
            other => panic!("expected fit, got {other:?}"),
        }
    }
}
