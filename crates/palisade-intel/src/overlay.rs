//! Basket injection into the factor panel and the basket overlay matrix.

use crate::basket::{basket_fingerprint, Basket};
use chrono::NaiveDate;
use palisade_factors::{FactorPanel, CATEGORY_USER_BASKETS};
use palisade_prices::{pairwise_correlation, PriceStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A basket skipped during injection, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketSkip {
    /// Basket name.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of injecting user baskets into a panel clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketInjection {
    /// The cloned panel with basket columns appended.
    pub panel: FactorPanel,
    /// Names of columns added.
    pub added: Vec<String>,
    /// Baskets skipped (collision or failed series).
    pub skipped: Vec<BasketSkip>,
    /// Content fingerprint; returned even when every basket failed, so a
    /// no-basket cache entry differs from a transient-failure entry.
    pub fingerprint: String,
}

/// Clones the panel and appends one column per user basket.
///
/// The clone deep-copies category and label metadata; the shared panel
/// is never mutated. Basket columns are tagged `user_baskets` and
/// labeled `"Basket: <name>"`. A basket whose name collides
/// case-insensitively with an existing column, or whose series fails,
/// is skipped with a warning.
pub async fn inject_baskets(
    store: &PriceStore,
    base_panel: &FactorPanel,
    baskets: &[Basket],
    market_caps: &HashMap<String, f64>,
    start: NaiveDate,
    end: NaiveDate,
) -> BasketInjection {
    let fingerprint = basket_fingerprint(baskets);
    let mut panel = base_panel.deep_clone();
    let mut added = Vec::new();
    let mut skipped = Vec::new();

    for basket in baskets {
        if panel.has_column_ci(&basket.name) {
            warn!(basket = %basket.name, "name collides with an existing column, skipping");
            skipped.push(BasketSkip {
                name: basket.name.clone(),
                reason: "name collides with an existing factor column".to_string(),
            });
            continue;
        }
        match basket.build_series(store, market_caps, start, end).await {
            Ok(series) => {
                panel.add_column(
                    basket.name.clone(),
                    series,
                    CATEGORY_USER_BASKETS,
                    format!("Basket: {}", basket.name),
                );
                added.push(basket.name.clone());
            }
            Err(err) => {
                warn!(basket = %basket.name, %err, "basket series failed, skipping");
                skipped.push(BasketSkip {
                    name: basket.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    BasketInjection {
        panel,
        added,
        skipped,
        fingerprint,
    }
}

/// The basket overlay: each basket correlated against each non-basket
/// factor, pairwise-dropna per cell.
///
/// Exists so baskets appear in recommendations even when the standard
/// bucketed matrix elides the single-member `user_baskets` bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketOverlay {
    /// Basket column names (rows).
    pub baskets: Vec<String>,
    /// Factor column names (columns).
    pub factors: Vec<String>,
    /// Correlation per (basket, factor); `None` when overlap is too
    /// short.
    pub matrix: Vec<Vec<Option<f64>>>,
}

/// Builds the basket overlay matrix from an injected panel.
#[must_use]
pub fn basket_overlay(panel: &FactorPanel) -> BasketOverlay {
    let baskets = panel.columns_in_category(CATEGORY_USER_BASKETS);
    let factors: Vec<String> = panel
        .column_names()
        .into_iter()
        .filter(|c| {
            panel.categories.get(c).map(String::as_str) != Some(CATEGORY_USER_BASKETS)
        })
        .collect();

    let matrix = baskets
        .iter()
        .map(|basket| {
            factors
                .iter()
                .map(|factor| {
                    pairwise_correlation(&panel.columns[basket], &panel.columns[factor])
                })
                .collect()
        })
        .collect();

    BasketOverlay {
        baskets,
        factors,
        matrix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basket::WeightingMethod;
    use chrono::{TimeZone, Utc};
    use palisade_prices::{Series, StaticVendor};
    use std::sync::Arc;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 28).unwrap()
    }

    fn base_panel() -> FactorPanel {
        let mut panel = FactorPanel::default();
        panel.add_column(
            "SPY",
            Series::from_pairs((1..=12).map(|m| (date(2025, m), 0.01 * (m as f64 - 6.0)))),
            "market",
            "SPY",
        );
        panel
    }

    fn basket(name: &str, tickers: &[&str]) -> Basket {
        Basket {
            user_id: "u1".to_string(),
            name: name.to_string(),
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            weights: None,
            weighting_method: WeightingMethod::Equal,
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn store() -> PriceStore {
        let prices = Series::from_pairs((1..=13).map(|m| {
            let (y, month) = if m <= 12 { (2025, m) } else { (2026, m - 12) };
            (date(y, month), 100.0 * 1.01f64.powi(m as i32))
        }));
        PriceStore::new(Arc::new(StaticVendor::named("test").with_monthly("AAA", prices)))
    }

    #[tokio::test]
    async fn test_injection_adds_tagged_column() {
        let injection = inject_baskets(
            &store(),
            &base_panel(),
            &[basket("My Basket", &["AAA"])],
            &HashMap::new(),
            date(2025, 1),
            date(2026, 2),
        )
        .await;

        assert_eq!(injection.added, vec!["My Basket".to_string()]);
        assert_eq!(
            injection.panel.categories["My Basket"],
            CATEGORY_USER_BASKETS
        );
        assert_eq!(injection.panel.labels["My Basket"], "Basket: My Basket");
    }

    #[tokio::test]
    async fn test_collision_skipped() {
        let injection = inject_baskets(
            &store(),
            &base_panel(),
            &[basket("spy", &["AAA"])],
            &HashMap::new(),
            date(2025, 1),
            date(2026, 2),
        )
        .await;
        assert!(injection.added.is_empty());
        assert_eq!(injection.skipped.len(), 1);
        assert!(injection.skipped[0].reason.contains("collides"));
    }

    #[tokio::test]
    async fn test_fingerprint_returned_on_total_failure() {
        let injection = inject_baskets(
            &store(),
            &base_panel(),
            &[basket("Ghost", &["GONE"])],
            &HashMap::new(),
            date(2025, 1),
            date(2026, 2),
        )
        .await;
        assert!(injection.added.is_empty());
        assert!(!injection.fingerprint.is_empty());
        // The shared panel was not mutated.
        assert_eq!(injection.panel.columns.len(), 1);
    }

    #[tokio::test]
    async fn test_overlay_has_row_for_single_basket() {
        let injection = inject_baskets(
            &store(),
            &base_panel(),
            &[basket("Solo", &["AAA"])],
            &HashMap::new(),
            date(2025, 1),
            date(2026, 2),
        )
        .await;
        let overlay = basket_overlay(&injection.panel);
        assert_eq!(overlay.baskets, vec!["Solo".to_string()]);
        assert_eq!(overlay.factors, vec!["SPY".to_string()]);
        assert_eq!(overlay.matrix.len(), 1);
        assert_eq!(overlay.matrix[0].len(), 1);
    }
}
