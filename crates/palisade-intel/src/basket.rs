//! User-defined factor baskets.

use crate::error::{IntelError, IntelResult};
use chrono::{DateTime, NaiveDate, Utc};
use palisade_prices::{PriceStore, Series};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::warn;

/// How basket component weights are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMethod {
    /// Equal weight per component.
    Equal,
    /// Weight by market capitalization.
    MarketCap,
    /// Caller-supplied weights.
    Custom,
}

/// A user basket: a named group of tickers treated as a custom factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basket {
    /// Owning user.
    pub user_id: String,
    /// Basket name (panel column key).
    pub name: String,
    /// Component tickers.
    pub tickers: Vec<String>,
    /// Custom weights, parallel to `tickers`.
    pub weights: Option<Vec<f64>>,
    /// Weight resolution method.
    pub weighting_method: WeightingMethod,
    /// Last content mutation; part of the cache fingerprint.
    pub updated_at: DateTime<Utc>,
}

impl Basket {
    /// Resolves component weights.
    ///
    /// Market-cap weighting falls back to equal weight for components
    /// with no cap available.
    ///
    /// # Errors
    ///
    /// Custom weighting fails when the weight vector is missing or the
    /// wrong length.
    pub fn resolve_weights(&self, market_caps: &HashMap<String, f64>) -> IntelResult<Vec<f64>> {
        let n = self.tickers.len();
        if n == 0 {
            return Err(IntelError::Basket {
                name: self.name.clone(),
                reason: "no components".to_string(),
            });
        }
        let raw = match self.weighting_method {
            WeightingMethod::Equal => vec![1.0; n],
            WeightingMethod::MarketCap => {
                let caps: Vec<f64> = self
                    .tickers
                    .iter()
                    .map(|t| {
                        market_caps
                            .get(&t.to_ascii_uppercase())
                            .copied()
                            .unwrap_or_else(|| {
                                warn!(basket = %self.name, ticker = %t, "no market cap, using equal weight");
                                1.0
                            })
                    })
                    .collect();
                caps
            }
            WeightingMethod::Custom => {
                let weights = self.weights.clone().ok_or_else(|| IntelError::Basket {
                    name: self.name.clone(),
                    reason: "custom weighting requires weights".to_string(),
                })?;
                if weights.len() != n {
                    return Err(IntelError::Basket {
                        name: self.name.clone(),
                        reason: format!("{} weights for {} tickers", weights.len(), n),
                    });
                }
                weights
            }
        };
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return Err(IntelError::Basket {
                name: self.name.clone(),
                reason: "weights sum to zero".to_string(),
            });
        }
        Ok(raw.iter().map(|w| w / total).collect())
    }

    /// Builds the basket's monthly return series: inner join of available
    /// component returns, weighted sum, weights re-normalized over the
    /// components that actually have data.
    ///
    /// # Errors
    ///
    /// Fails when no component can be priced.
    pub async fn build_series(
        &self,
        store: &PriceStore,
        market_caps: &HashMap<String, f64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IntelResult<Series> {
        let weights = self.resolve_weights(market_caps)?;

        let mut component_series: Vec<(f64, Series)> = Vec::new();
        for (ticker, weight) in self.tickers.iter().zip(&weights) {
            match store.monthly_returns(ticker, start, end).await {
                Ok(series) => component_series.push((*weight, series)),
                Err(err) => {
                    warn!(basket = %self.name, ticker = %ticker, %err, "dropping component");
                }
            }
        }
        if component_series.is_empty() {
            return Err(IntelError::Basket {
                name: self.name.clone(),
                reason: "no component could be priced".to_string(),
            });
        }

        // Re-normalize over surviving components.
        let surviving: f64 = component_series.iter().map(|(w, _)| w).sum();
        let mut dates: Vec<NaiveDate> = component_series[0].1.dates();
        for (_, series) in &component_series[1..] {
            dates.retain(|d| series.get(*d).is_some());
        }
        if dates.is_empty() {
            return Err(IntelError::Basket {
                name: self.name.clone(),
                reason: "components share no dates".to_string(),
            });
        }

        Ok(Series::from_pairs(dates.into_iter().map(|date| {
            let value: f64 = component_series
                .iter()
                .filter_map(|(w, s)| s.get(date).map(|v| w / surviving * v))
                .sum();
            (date, value)
        })))
    }
}

/// Content fingerprint over `(user_id, name, updated_at)` triples.
///
/// Mutating any of the three yields a different fingerprint; the
/// fingerprint of an empty basket set is still well-defined, so a
/// no-basket cache entry is never conflated with a transient failure.
#[must_use]
pub fn basket_fingerprint(baskets: &[Basket]) -> String {
    let mut triples: Vec<(&str, &str, i64)> = baskets
        .iter()
        .map(|b| {
            (
                b.user_id.as_str(),
                b.name.as_str(),
                b.updated_at.timestamp_micros(),
            )
        })
        .collect();
    triples.sort();
    let mut hasher = DefaultHasher::new();
    triples.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use palisade_prices::StaticVendor;
    use std::sync::Arc;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 28).unwrap()
    }

    fn basket(name: &str, tickers: &[&str], method: WeightingMethod) -> Basket {
        Basket {
            user_id: "u1".to_string(),
            name: name.to_string(),
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            weights: None,
            weighting_method: method,
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    fn price_series(drift: f64) -> Series {
        Series::from_pairs((1..=12).map(|m| (date(2025, m), 100.0 * (1.0 + drift).powi(m as i32))))
    }

    #[tokio::test]
    async fn test_equal_weight_series() {
        let store = PriceStore::new(Arc::new(
            StaticVendor::named("test")
                .with_monthly("AAA", price_series(0.02))
                .with_monthly("BBB", price_series(0.01)),
        ));
        let basket = basket("Tech Picks", &["AAA", "BBB"], WeightingMethod::Equal);
        let series = basket
            .build_series(&store, &HashMap::new(), date(2025, 1), date(2026, 1))
            .await
            .unwrap();
        // 11 months of returns from 12 closes, averaged at 50/50.
        assert_eq!(series.len(), 11);
        let expected = (0.02 + 0.01) / 2.0;
        for (_, v) in series.iter() {
            assert!((v - expected).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_failed_component_renormalizes() {
        let store = PriceStore::new(Arc::new(
            StaticVendor::named("test").with_monthly("AAA", price_series(0.02)),
        ));
        let basket = basket("Half Gone", &["AAA", "GONE"], WeightingMethod::Equal);
        let series = basket
            .build_series(&store, &HashMap::new(), date(2025, 1), date(2026, 1))
            .await
            .unwrap();
        // Only AAA survives; its weight renormalizes to 1.0.
        for (_, v) in series.iter() {
            assert!((v - 0.02).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_all_components_failed_is_error() {
        let store = PriceStore::new(Arc::new(StaticVendor::named("test")));
        let basket = basket("Ghost", &["GONE"], WeightingMethod::Equal);
        assert!(basket
            .build_series(&store, &HashMap::new(), date(2025, 1), date(2026, 1))
            .await
            .is_err());
    }

    #[test]
    fn test_custom_weights_validated() {
        let mut b = basket("Custom", &["AAA", "BBB"], WeightingMethod::Custom);
        assert!(b.resolve_weights(&HashMap::new()).is_err());
        b.weights = Some(vec![3.0, 1.0]);
        let weights = b.resolve_weights(&HashMap::new()).unwrap();
        assert!((weights[0] - 0.75).abs() < 1e-12);
        assert!((weights[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = basket("A", &["AAA"], WeightingMethod::Equal);
        let mut b = a.clone();
        let base = basket_fingerprint(&[a.clone()]);

        b.name = "B".to_string();
        assert_ne!(base, basket_fingerprint(&[b.clone()]));

        let mut c = a.clone();
        c.updated_at = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        assert_ne!(base, basket_fingerprint(&[c]));

        // Deleting the basket changes the key too, and differs from any
        // failure-path key for the same user.
        assert_ne!(base, basket_fingerprint(&[]));
    }

    #[test]
    fn test_fingerprint_order_independent() {
        let a = basket("A", &["AAA"], WeightingMethod::Equal);
        let b = basket("B", &["BBB"], WeightingMethod::Equal);
        assert_eq!(
            basket_fingerprint(&[a.clone(), b.clone()]),
            basket_fingerprint(&[b, a])
        );
    }
}
