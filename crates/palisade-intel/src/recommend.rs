//! Hedge/offset recommendations.
//!
//! For an overexposed factor, candidates are the remaining panel columns
//! (user baskets included) ranked by most negative pairwise correlation.

use crate::error::{IntelError, IntelResult};
use palisade_factors::FactorPanel;
use palisade_prices::pairwise_correlation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One hedge candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeCandidate {
    /// Column name of the candidate.
    pub name: String,
    /// Display label.
    pub label: String,
    /// Factor category of the candidate.
    pub category: String,
    /// Pairwise correlation with the overexposed factor.
    pub correlation: f64,
}

/// Offset recommendation for one overexposed factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetRecommendation {
    /// The factor being hedged.
    pub overexposed: String,
    /// Candidates, most negatively correlated first.
    pub candidates: Vec<HedgeCandidate>,
}

/// Recommends offsets for a named factor column.
///
/// # Errors
///
/// Fails when the factor is not a panel column.
pub fn recommend_offsets(
    panel: &FactorPanel,
    overexposed: &str,
    top_n: usize,
) -> IntelResult<OffsetRecommendation> {
    let target = panel
        .columns
        .get(overexposed)
        .ok_or_else(|| IntelError::UnknownFactor {
            factor: overexposed.to_string(),
        })?;

    let mut candidates: Vec<HedgeCandidate> = panel
        .columns
        .iter()
        .filter(|(name, _)| name.as_str() != overexposed)
        .filter_map(|(name, series)| {
            let correlation = pairwise_correlation(target, series)?;
            Some(HedgeCandidate {
                name: name.clone(),
                label: panel.labels.get(name).cloned().unwrap_or_else(|| name.clone()),
                category: panel
                    .categories
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                correlation,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.correlation
            .partial_cmp(&b.correlation)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_n);

    Ok(OffsetRecommendation {
        overexposed: overexposed.to_string(),
        candidates,
    })
}

/// Portfolio mode: hedges the factor with the largest variance share
/// (market excluded, since it has its own limit and its own hedges).
///
/// # Errors
///
/// Fails when no non-market factor carries a variance share.
pub fn recommend_for_portfolio(
    panel: &FactorPanel,
    variance_shares: &BTreeMap<String, f64>,
    top_n: usize,
) -> IntelResult<OffsetRecommendation> {
    let overexposed = variance_shares
        .iter()
        .filter(|(column, _)| {
            panel.categories.get(*column).map(String::as_str) != Some("market")
        })
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(column, _)| column.clone())
        .ok_or_else(|| IntelError::EmptyPanel {
            reason: "no non-market factor to hedge".to_string(),
        })?;
    recommend_offsets(panel, &overexposed, top_n)
}
