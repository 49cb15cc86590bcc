//! Portfolio-level variance decomposition and Euler contributions.
//!
//! All upstream I/O is gathered into [`FactorInputs`] first; the
//! decomposition itself is pure and synchronous, so no inconsistent panel
//! can be observed mid-computation.

use crate::error::{FactorError, FactorResult};
use crate::panel::{build_panel, FactorPanel};
use crate::proxy::FactorProxies;
use crate::regression::{regress_asset, AssetRegression, RegressionOutcome, DEFAULT_MIN_OBS};
use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use palisade_prices::{PriceStore, Series};
use palisade_providers::CanonicalPortfolio;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Months per year used for annualization.
const MONTHS_PER_YEAR: f64 = 12.0;

/// Inputs for a decomposition, with every upstream fetch completed.
#[derive(Debug, Clone)]
pub struct FactorInputs {
    /// Shared factor panel.
    pub panel: FactorPanel,
    /// Monthly return series per asset.
    pub asset_returns: BTreeMap<String, Series>,
    /// Proxy assignments per asset.
    pub proxies: BTreeMap<String, FactorProxies>,
    /// Signed weights per asset (by notional).
    pub weights: BTreeMap<String, f64>,
    /// Assets excluded because no vendor could price them.
    pub missing_prices: Vec<String>,
}

/// Gathers panel and per-asset return series for a canonical portfolio.
///
/// Individual asset price failures exclude the asset from regression
/// without failing the analysis.
///
/// # Errors
///
/// Fails only when the panel itself cannot be built.
pub async fn collect_inputs(
    store: &PriceStore,
    portfolio: &CanonicalPortfolio,
    proxies: BTreeMap<String, FactorProxies>,
    start: NaiveDate,
    end: NaiveDate,
) -> FactorResult<FactorInputs> {
    let panel = build_panel(store, &proxies, start, end).await?;

    let weights = portfolio.weights();
    let mut asset_returns = BTreeMap::new();
    let mut missing_prices = Vec::new();

    for position in portfolio.non_cash() {
        let key = position.symbol.to_string();
        // Futures series are fetched by root (continuous contract).
        let fetch_symbol = position.symbol.root().to_string();
        match store.monthly_returns(&fetch_symbol, start, end).await {
            Ok(series) => {
                asset_returns.insert(key, series);
            }
            Err(err) => {
                warn!(symbol = %key, %err, "excluding asset from regression");
                missing_prices.push(key);
            }
        }
    }
    missing_prices.sort();

    Ok(FactorInputs {
        panel,
        asset_returns,
        proxies,
        weights,
        missing_prices,
    })
}

/// Euler risk contribution of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    /// Asset symbol.
    pub symbol: String,
    /// Signed weight.
    pub weight: f64,
    /// Contribution to annualized portfolio volatility.
    pub contribution: f64,
    /// Contribution as a share of portfolio volatility (0-100).
    pub contribution_pct: f64,
}

/// The full factor decomposition of a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDecomposition {
    /// Annualized portfolio volatility.
    pub volatility_annual: f64,
    /// Annualized portfolio variance.
    pub var_port: f64,
    /// Annualized systematic variance.
    pub var_factor: f64,
    /// Annualized idiosyncratic variance.
    pub var_idio: f64,
    /// `var_factor / var_port`.
    pub factor_pct: f64,
    /// `1 - factor_pct`.
    pub idio_pct: f64,
    /// Portfolio beta per panel column.
    pub portfolio_betas: BTreeMap<String, f64>,
    /// Portfolio beta aggregated per factor category.
    pub category_betas: BTreeMap<String, f64>,
    /// Annualized vol per panel column.
    pub factor_vols_annual: BTreeMap<String, f64>,
    /// Share of portfolio variance per panel column.
    pub factor_variance_shares: BTreeMap<String, f64>,
    /// Share of portfolio variance per factor category.
    pub category_variance_shares: BTreeMap<String, f64>,
    /// Euler contributions per asset, sorted descending by |contribution|.
    pub risk_contributions: Vec<RiskContribution>,
    /// Assets below the observation floor.
    pub insufficient_history: Vec<String>,
    /// Fitted regressions per asset.
    pub regressions: BTreeMap<String, AssetRegression>,
}

/// Decomposition parameters.
#[derive(Debug, Clone, Copy)]
pub struct DecompositionConfig {
    /// Minimum observations for a trusted regression.
    pub min_obs: usize,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            min_obs: DEFAULT_MIN_OBS,
        }
    }
}

/// Runs the decomposition on the portfolio's own weights.
///
/// # Errors
///
/// Fails when no asset has both a weight and a return series.
pub fn decompose(
    inputs: &FactorInputs,
    config: &DecompositionConfig,
) -> FactorResult<FactorDecomposition> {
    decompose_with_weights(inputs, &inputs.weights, config)
}

/// Runs the decomposition with an alternative weight vector (what-if and
/// optimizer paths reuse the fitted inputs).
///
/// # Errors
///
/// Fails when no asset has both a weight and a return series.
pub fn decompose_with_weights(
    inputs: &FactorInputs,
    weights: &BTreeMap<String, f64>,
    config: &DecompositionConfig,
) -> FactorResult<FactorDecomposition> {
    // Assets entering the matrices: weighted and priced.
    let assets: Vec<String> = weights
        .keys()
        .filter(|symbol| inputs.asset_returns.contains_key(*symbol))
        .cloned()
        .collect();
    if assets.is_empty() {
        return Err(FactorError::NoAssets {
            reason: "no asset has both a weight and a return series".to_string(),
        });
    }

    let columns = inputs.panel.column_names();
    let k = columns.len();
    let n = assets.len();

    let mut regressions = BTreeMap::new();
    let mut insufficient = Vec::new();
    let mut b = DMatrix::<f64>::zeros(n, k);
    let mut idio = DVector::<f64>::zeros(n);
    let mut w = DVector::<f64>::zeros(n);

    for (i, symbol) in assets.iter().enumerate() {
        w[i] = weights[symbol];
        let returns = &inputs.asset_returns[symbol];
        let empty = FactorProxies::default();
        let proxies = inputs.proxies.get(symbol).unwrap_or(&empty);

        match regress_asset(symbol, returns, proxies, &inputs.panel, config.min_obs) {
            RegressionOutcome::Fitted(fit) => {
                for (j, column) in columns.iter().enumerate() {
                    if let Some(beta) = fit.betas.get(column) {
                        b[(i, j)] = *beta;
                    }
                }
                idio[i] = fit.residual_variance;
                regressions.insert(symbol.clone(), fit);
            }
            RegressionOutcome::InsufficientHistory {
                symbol,
                own_variance,
                ..
            } => {
                // No factor row; the asset still carries idio variance
                // from its own series.
                idio[i] = own_variance;
                insufficient.push(symbol);
            }
        }
    }

    let variances = inputs.panel.monthly_variances();
    let sigma_f = DMatrix::<f64>::from_diagonal(&DVector::from_iterator(
        k,
        columns.iter().map(|c| variances[c]),
    ));

    // Monthly decomposition, annualized below.
    let exposures = b.transpose() * &w; // k × 1: (W·B)ᵀ
    let var_factor_m = (exposures.transpose() * &sigma_f * &exposures)[(0, 0)];
    let var_idio_m: f64 = (0..n).map(|i| w[i] * w[i] * idio[i]).sum();

    let var_factor = var_factor_m * MONTHS_PER_YEAR;
    let var_idio = var_idio_m * MONTHS_PER_YEAR;
    let var_port = var_factor + var_idio;
    let volatility_annual = var_port.max(0.0).sqrt();

    let (factor_pct, idio_pct) = if var_port > f64::EPSILON {
        (var_factor / var_port, var_idio / var_port)
    } else {
        (0.0, 0.0)
    };

    // Euler contributions from the annualized asset covariance
    // Σ = 12 (B Σ_f Bᵀ + D): RC_i = w_i (Σ w)_i / σ, summing to σ.
    let mut sigma_assets = &b * &sigma_f * b.transpose();
    for i in 0..n {
        sigma_assets[(i, i)] += idio[i];
    }
    sigma_assets *= MONTHS_PER_YEAR;
    let marginal = &sigma_assets * &w;

    let mut risk_contributions: Vec<RiskContribution> = assets
        .iter()
        .enumerate()
        .map(|(i, symbol)| {
            let contribution = if volatility_annual > f64::EPSILON {
                w[i] * marginal[i] / volatility_annual
            } else {
                0.0
            };
            let contribution_pct = if volatility_annual > f64::EPSILON {
                contribution / volatility_annual * 100.0
            } else {
                0.0
            };
            RiskContribution {
                symbol: symbol.clone(),
                weight: w[i],
                contribution,
                contribution_pct,
            }
        })
        .collect();
    risk_contributions.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Per-column exposure and additive variance shares.
    let mut portfolio_betas = BTreeMap::new();
    let mut factor_variance_shares = BTreeMap::new();
    let mut category_betas: BTreeMap<String, f64> = BTreeMap::new();
    let mut category_variance_shares: BTreeMap<String, f64> = BTreeMap::new();
    for (j, column) in columns.iter().enumerate() {
        let beta = exposures[j];
        portfolio_betas.insert(column.clone(), beta);

        let share = if var_port > f64::EPSILON {
            beta * beta * variances[column] * MONTHS_PER_YEAR / var_port
        } else {
            0.0
        };
        factor_variance_shares.insert(column.clone(), share);

        if let Some(category) = inputs.panel.categories.get(column) {
            *category_betas.entry(category.clone()).or_default() += beta;
            *category_variance_shares.entry(category.clone()).or_default() += share;
        }
    }

    insufficient.sort();

    Ok(FactorDecomposition {
        volatility_annual,
        var_port,
        var_factor,
        var_idio,
        factor_pct,
        idio_pct,
        portfolio_betas,
        category_betas,
        factor_vols_annual: inputs.panel.annualized_vols(),
        factor_variance_shares,
        category_variance_shares,
        risk_contributions,
        insufficient_history: insufficient,
        regressions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(i: usize) -> NaiveDate {
        let year = 2023 + (i / 12) as i32;
        let month = (i % 12) as u32 + 1;
        NaiveDate::from_ymd_opt(year, month, 28).unwrap()
    }

    /// Two assets driven by one market factor plus deterministic
    /// "noise" patterns that are orthogonal enough to exercise idio
    /// variance.
    fn fixture() -> FactorInputs {
        let factor: Vec<f64> = (0..36).map(|i| 0.012 * (((i * 7) % 11) as f64 - 5.0)).collect();
        let noise_a: Vec<f64> = (0..36).map(|i| 0.004 * (((i * 5) % 7) as f64 - 3.0)).collect();

        let mut panel = FactorPanel::default();
        panel.add_column(
            "SPY",
            Series::from_pairs(factor.iter().enumerate().map(|(i, v)| (date(i), *v))),
            "market",
            "SPY",
        );

        let asset_a = Series::from_pairs(
            factor
                .iter()
                .zip(&noise_a)
                .enumerate()
                .map(|(i, (f, e))| (date(i), 1.2 * f + e)),
        );
        let asset_b = Series::from_pairs(
            factor
                .iter()
                .enumerate()
                .map(|(i, f)| (date(i), 0.7 * *f)),
        );

        let mut asset_returns = BTreeMap::new();
        asset_returns.insert("AAA".to_string(), asset_a);
        asset_returns.insert("BBB".to_string(), asset_b);

        let market_proxies = FactorProxies {
            market: Some("SPY".to_string()),
            ..FactorProxies::default()
        };
        let mut proxies = BTreeMap::new();
        proxies.insert("AAA".to_string(), market_proxies.clone());
        proxies.insert("BBB".to_string(), market_proxies);

        let mut weights = BTreeMap::new();
        weights.insert("AAA".to_string(), 0.6);
        weights.insert("BBB".to_string(), 0.4);

        FactorInputs {
            panel,
            asset_returns,
            proxies,
            weights,
            missing_prices: Vec::new(),
        }
    }

    #[test]
    fn test_variance_additivity() {
        let inputs = fixture();
        let decomposition = decompose(&inputs, &DecompositionConfig::default()).unwrap();
        assert_relative_eq!(
            decomposition.var_factor + decomposition.var_idio,
            decomposition.var_port,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            decomposition.factor_pct + decomposition.idio_pct,
            1.0,
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_euler_contributions_sum_to_vol() {
        let inputs = fixture();
        let decomposition = decompose(&inputs, &DecompositionConfig::default()).unwrap();
        let rc_sum: f64 = decomposition
            .risk_contributions
            .iter()
            .map(|rc| rc.contribution)
            .sum();
        assert_relative_eq!(rc_sum, decomposition.volatility_annual, max_relative = 1e-9);
    }

    #[test]
    fn test_portfolio_beta_is_weighted_sum() {
        let inputs = fixture();
        let decomposition = decompose(&inputs, &DecompositionConfig::default()).unwrap();
        let beta_a = decomposition.regressions["AAA"].betas["SPY"];
        let beta_b = decomposition.regressions["BBB"].betas["SPY"];
        assert_relative_eq!(
            decomposition.portfolio_betas["SPY"],
            0.6 * beta_a + 0.4 * beta_b,
            max_relative = 1e-9
        );
        assert_relative_eq!(beta_b, 0.7, epsilon = 1e-9);
    }

    #[test]
    fn test_insufficient_asset_keeps_idio() {
        let mut inputs = fixture();
        // Truncate BBB to 10 observations.
        let short: Series = inputs.asset_returns["BBB"]
            .iter()
            .take(10)
            .collect();
        inputs.asset_returns.insert("BBB".to_string(), short);

        let decomposition = decompose(&inputs, &DecompositionConfig::default()).unwrap();
        assert_eq!(decomposition.insufficient_history, vec!["BBB".to_string()]);
        assert!(!decomposition.regressions.contains_key("BBB"));
        // BBB still shows up as a risk contributor through idio variance.
        assert!(decomposition
            .risk_contributions
            .iter()
            .any(|rc| rc.symbol == "BBB" && rc.contribution > 0.0));
    }

    #[test]
    fn test_what_if_weights_change_decomposition() {
        let inputs = fixture();
        let base = decompose(&inputs, &DecompositionConfig::default()).unwrap();

        let mut shifted = BTreeMap::new();
        shifted.insert("AAA".to_string(), 0.1);
        shifted.insert("BBB".to_string(), 0.9);
        let whatif =
            decompose_with_weights(&inputs, &shifted, &DecompositionConfig::default()).unwrap();

        // Portfolio beta must fall as weight moves to the lower-beta
        // asset.
        assert!(whatif.portfolio_betas["SPY"] < base.portfolio_betas["SPY"]);
    }
}
