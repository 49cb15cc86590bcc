//! Composite risk scoring.
//!
//! Each sub-score maps the measured ratio-to-limit through a documented
//! piecewise-linear function; the composite is a linear blend of the
//! sub-scores.

use serde::{Deserialize, Serialize};

/// Maps a ratio-to-limit to a 0-100 score.
///
/// Anchor points, linearly interpolated and monotone decreasing:
///
/// | ratio | score |
/// |-------|-------|
/// | 0.0   | 100   |
/// | 1.0   | 70    |
/// | 2.0   | 30    |
/// | 5.0   | 0     |
///
/// Flat at 0 beyond ratio 5.
#[must_use]
pub fn ratio_score(ratio: f64) -> f64 {
    let r = ratio.max(0.0);
    if r <= 1.0 {
        100.0 - 30.0 * r
    } else if r <= 2.0 {
        70.0 - 40.0 * (r - 1.0)
    } else if r <= 5.0 {
        30.0 - 10.0 * (r - 2.0)
    } else {
        0.0
    }
}

/// Sub-score weights used in the composite blend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight on the concentration sub-score.
    pub concentration: f64,
    /// Weight on the volatility sub-score.
    pub volatility: f64,
    /// Weight on the factor sub-score.
    pub factor: f64,
    /// Weight on the sector sub-score.
    pub sector: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            concentration: 0.25,
            volatility: 0.30,
            factor: 0.25,
            sector: 0.20,
        }
    }
}

/// A 0-100 composite score with its sub-scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// Blended 0-100 score.
    pub composite: f64,
    /// Single-position concentration sub-score.
    pub concentration: f64,
    /// Portfolio volatility sub-score.
    pub volatility: f64,
    /// Single-factor contribution sub-score.
    pub factor: f64,
    /// Industry contribution sub-score.
    pub sector: f64,
}

impl RiskScore {
    /// Blends sub-scores from ratio-to-limit measurements.
    #[must_use]
    pub fn from_ratios(
        concentration_ratio: f64,
        volatility_ratio: f64,
        factor_ratio: f64,
        sector_ratio: f64,
        weights: &ScoreWeights,
    ) -> Self {
        let concentration = ratio_score(concentration_ratio);
        let volatility = ratio_score(volatility_ratio);
        let factor = ratio_score(factor_ratio);
        let sector = ratio_score(sector_ratio);
        let total =
            weights.concentration + weights.volatility + weights.factor + weights.sector;
        let composite = (concentration * weights.concentration
            + volatility * weights.volatility
            + factor * weights.factor
            + sector * weights.sector)
            / total;
        Self {
            composite,
            concentration,
            volatility,
            factor,
            sector,
        }
    }
}
