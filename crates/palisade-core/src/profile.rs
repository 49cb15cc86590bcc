//! Risk profiles: configured limits applied by the risk evaluator.
//!
//! Profiles are mutated only through the engine's authoring path; every
//! derivation works on an immutable snapshot.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Box constraint on a single factor beta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaCap {
    /// Lower bound on portfolio beta to the factor.
    pub min: f64,
    /// Upper bound on portfolio beta to the factor.
    pub max: f64,
}

impl BetaCap {
    /// Symmetric cap `[-limit, limit]`.
    #[must_use]
    pub fn symmetric(limit: f64) -> Self {
        Self {
            min: -limit,
            max: limit,
        }
    }
}

/// Configured risk limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Maximum annualized portfolio volatility (decimal, e.g., 0.18).
    pub max_volatility: f64,
    /// Maximum tolerable portfolio loss (decimal).
    pub max_loss: f64,
    /// Maximum weight in any single non-cash position.
    pub max_single_stock_weight: f64,
    /// Maximum share of variance from any single factor.
    pub max_factor_contribution: f64,
    /// Maximum share of variance from the market factor.
    pub max_market_contribution: f64,
    /// Maximum share of variance from any single industry.
    pub max_industry_contribution: f64,
    /// Maximum loss attributable to a single factor at its historical worst.
    pub max_single_factor_loss: f64,
    /// Maximum notional leverage.
    pub max_leverage: f64,
    /// Per-factor beta box constraints, keyed by factor name.
    pub factor_beta_caps: BTreeMap<String, BetaCap>,
}

impl RiskProfile {
    /// Builds the profile for a named template.
    #[must_use]
    pub fn from_template(template: ProfileTemplate) -> Self {
        match template {
            ProfileTemplate::Income => Self {
                max_volatility: 0.12,
                max_loss: -0.10,
                max_single_stock_weight: 0.10,
                max_factor_contribution: 0.35,
                max_market_contribution: 0.50,
                max_industry_contribution: 0.25,
                max_single_factor_loss: -0.08,
                max_leverage: 1.0,
                factor_beta_caps: default_beta_caps(0.8),
            },
            ProfileTemplate::Balanced => Self {
                max_volatility: 0.18,
                max_loss: -0.20,
                max_single_stock_weight: 0.15,
                max_factor_contribution: 0.40,
                max_market_contribution: 0.60,
                max_industry_contribution: 0.30,
                max_single_factor_loss: -0.12,
                max_leverage: 1.2,
                factor_beta_caps: default_beta_caps(1.2),
            },
            ProfileTemplate::Growth => Self {
                max_volatility: 0.25,
                max_loss: -0.30,
                max_single_stock_weight: 0.20,
                max_factor_contribution: 0.50,
                max_market_contribution: 0.70,
                max_industry_contribution: 0.35,
                max_single_factor_loss: -0.18,
                max_leverage: 1.5,
                factor_beta_caps: default_beta_caps(1.6),
            },
            ProfileTemplate::Trading => Self {
                max_volatility: 0.35,
                max_loss: -0.40,
                max_single_stock_weight: 0.30,
                max_factor_contribution: 0.60,
                max_market_contribution: 0.80,
                max_industry_contribution: 0.45,
                max_single_factor_loss: -0.25,
                max_leverage: 4.0,
                factor_beta_caps: default_beta_caps(2.5),
            },
        }
    }

    /// Validates internal consistency of the limits.
    ///
    /// # Errors
    ///
    /// Returns an error when a limit has an impossible sign or ordering.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_volatility <= 0.0 {
            return Err(CoreError::invalid_weights("max_volatility must be positive"));
        }
        if !(0.0..=1.0).contains(&self.max_single_stock_weight) {
            return Err(CoreError::invalid_weights(
                "max_single_stock_weight must be in [0, 1]",
            ));
        }
        if self.max_leverage < 1.0 {
            return Err(CoreError::invalid_weights("max_leverage must be >= 1.0"));
        }
        for (factor, cap) in &self.factor_beta_caps {
            if cap.min > cap.max {
                return Err(CoreError::invalid_weights(format!(
                    "beta cap for '{factor}' has min > max"
                )));
            }
        }
        Ok(())
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self::from_template(ProfileTemplate::Balanced)
    }
}

fn default_beta_caps(market_limit: f64) -> BTreeMap<String, BetaCap> {
    let mut caps = BTreeMap::new();
    caps.insert(
        "market".to_string(),
        BetaCap {
            min: -0.2,
            max: market_limit,
        },
    );
    caps.insert("momentum".to_string(), BetaCap::symmetric(1.0));
    caps.insert("value".to_string(), BetaCap::symmetric(1.0));
    caps
}

/// Named profile templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileTemplate {
    /// Capital preservation, low leverage.
    Income,
    /// Moderate risk.
    Balanced,
    /// Higher volatility tolerance.
    Growth,
    /// Futures-friendly limits with real leverage headroom.
    Trading,
}

impl FromStr for ProfileTemplate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "income" => Ok(ProfileTemplate::Income),
            "balanced" => Ok(ProfileTemplate::Balanced),
            "growth" => Ok(ProfileTemplate::Growth),
            "trading" => Ok(ProfileTemplate::Trading),
            other => Err(CoreError::unknown_enum("profile template", other)),
        }
    }
}
