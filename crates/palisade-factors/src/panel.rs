//! Factor return panel.
//!
//! A date-indexed `time × factor` matrix of proxy returns, with display
//! labels and a factor taxonomy. One panel serves both beta fitting and
//! factor-vol estimation, so a commodity column added for one is present
//! in the other by construction.

use crate::error::{FactorError, FactorResult};
use crate::proxy::FactorProxies;
use chrono::NaiveDate;
use palisade_prices::{PriceStore, Series};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Category tag for user-injected basket columns.
pub const CATEGORY_USER_BASKETS: &str = "user_baskets";

/// A factor return panel: columns of monthly returns keyed by proxy
/// ticker (or composite key), each tagged with a category and label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorPanel {
    /// Return series per column.
    pub columns: BTreeMap<String, Series>,
    /// Factor taxonomy per column (market, momentum, value, industry,
    /// subindustry, commodity, rate, user_baskets).
    pub categories: BTreeMap<String, String>,
    /// Display labels per column.
    pub labels: BTreeMap<String, String>,
}

impl FactorPanel {
    /// True when the panel has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column keys in deterministic order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Column keys belonging to a category.
    #[must_use]
    pub fn columns_in_category(&self, category: &str) -> Vec<String> {
        self.categories
            .iter()
            .filter(|(_, c)| c.as_str() == category)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Adds (or replaces) a column with its metadata.
    pub fn add_column(
        &mut self,
        key: impl Into<String>,
        series: Series,
        category: impl Into<String>,
        label: impl Into<String>,
    ) {
        let key = key.into();
        self.categories.insert(key.clone(), category.into());
        self.labels.insert(key.clone(), label.into());
        self.columns.insert(key, series);
    }

    /// True when a column with this key exists, case-insensitively.
    #[must_use]
    pub fn has_column_ci(&self, key: &str) -> bool {
        self.columns
            .keys()
            .any(|k| k.eq_ignore_ascii_case(key))
    }

    /// Sample monthly variance per column.
    #[must_use]
    pub fn monthly_variances(&self) -> BTreeMap<String, f64> {
        self.columns
            .iter()
            .map(|(k, s)| {
                let var = s.std_dev().map(|sd| sd * sd).unwrap_or(0.0);
                (k.clone(), var)
            })
            .collect()
    }

    /// Annualized vol per column: monthly std × √12.
    #[must_use]
    pub fn annualized_vols(&self) -> BTreeMap<String, f64> {
        self.columns
            .iter()
            .map(|(k, s)| {
                let vol = s.std_dev().unwrap_or(0.0) * 12f64.sqrt();
                (k.clone(), vol)
            })
            .collect()
    }

    /// Deep clone including category/label metadata.
    ///
    /// Basket injection mutates the clone, never the shared panel.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}

/// Key under which a subindustry composite column is stored.
#[must_use]
pub fn composite_key(tickers: &[String]) -> String {
    tickers.join("+")
}

/// Builds the factor panel for a set of proxy assignments.
///
/// One column per distinct proxy ticker across every asset, plus one
/// composite column per distinct subindustry list. Columns whose prices
/// are unavailable are skipped with a warning; the affected assets simply
/// regress on fewer factors.
///
/// # Errors
///
/// Returns an error when no column at all could be built.
pub async fn build_panel(
    store: &PriceStore,
    proxies: &BTreeMap<String, FactorProxies>,
    start: NaiveDate,
    end: NaiveDate,
) -> FactorResult<FactorPanel> {
    let mut wanted: BTreeMap<String, &'static str> = BTreeMap::new();
    let mut composites: BTreeSet<Vec<String>> = BTreeSet::new();

    for set in proxies.values() {
        for (ticker, category) in [
            (&set.market, "market"),
            (&set.momentum, "momentum"),
            (&set.value, "value"),
            (&set.industry, "industry"),
            (&set.commodity, "commodity"),
            (&set.rate, "rate"),
        ] {
            if let Some(ticker) = ticker {
                wanted.entry(ticker.clone()).or_insert(category);
            }
        }
        if !set.subindustry.is_empty() {
            composites.insert(set.subindustry.clone());
        }
    }

    let mut panel = FactorPanel::default();

    for (ticker, category) in wanted {
        match store.monthly_returns(&ticker, start, end).await {
            Ok(series) => {
                panel.add_column(ticker.clone(), series, category, ticker.clone());
            }
            Err(err) => warn!(ticker, %err, "skipping factor column"),
        }
    }

    for components in composites {
        let key = composite_key(&components);
        match build_composite(store, &components, start, end).await {
            Ok(series) => {
                panel.add_column(key.clone(), series, "subindustry", key.clone());
            }
            Err(err) => warn!(composite = %key, %err, "skipping subindustry composite"),
        }
    }

    if panel.is_empty() {
        return Err(FactorError::EmptyPanel {
            reason: "no proxy column could be fetched".to_string(),
        });
    }
    Ok(panel)
}

/// Equal-weighted average of component returns, inner-joined on dates.
async fn build_composite(
    store: &PriceStore,
    components: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> FactorResult<Series> {
    let mut series = Vec::with_capacity(components.len());
    for ticker in components {
        match store.monthly_returns(ticker, start, end).await {
            Ok(s) => series.push(s),
            Err(err) => warn!(ticker, %err, "composite component missing"),
        }
    }
    if series.is_empty() {
        return Err(FactorError::EmptyPanel {
            reason: "no composite component available".to_string(),
        });
    }

    // Inner join: only dates all surviving components share.
    let mut dates: Vec<NaiveDate> = series[0].dates();
    for s in &series[1..] {
        dates.retain(|d| s.get(*d).is_some());
    }

    let n = series.len() as f64;
    let averaged = dates.into_iter().map(|date| {
        let sum: f64 = series.iter().filter_map(|s| s.get(date)).sum();
        (date, sum / n)
    });
    Ok(Series::from_pairs(averaged))
}
