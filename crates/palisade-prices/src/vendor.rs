//! Vendor trait for upstream price sources.
//!
//! The concrete HTTP clients live outside this workspace; the store only
//! depends on this trait. Tests and fixtures use [`StaticVendor`].

use crate::error::{PriceError, PriceResult};
use crate::series::Series;
use async_trait::async_trait;
use chrono::NaiveDate;
use palisade_core::Currency;
use std::collections::HashMap;

/// An upstream price vendor.
#[async_trait]
pub trait PriceVendor: Send + Sync {
    /// Vendor name used in cache keys and logs.
    fn name(&self) -> &'static str;

    /// Daily closing prices for `[start, end]`.
    async fn daily_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series>;

    /// Month-end total-return-adjusted closes.
    async fn monthly_total_return_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series>;

    /// Month-end unadjusted closes; fallback when total-return data is
    /// missing.
    async fn monthly_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series>;

    /// Daily FX rate series for `base/quote`.
    async fn fx_daily(
        &self,
        base: Currency,
        quote: Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series>;
}

/// In-memory vendor backed by preloaded series; used by tests and fixtures.
#[derive(Debug, Default)]
pub struct StaticVendor {
    name: &'static str,
    daily: HashMap<String, Series>,
    monthly: HashMap<String, Series>,
    fx: HashMap<String, Series>,
}

impl StaticVendor {
    /// Creates an empty vendor with the given name.
    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Preloads a daily close series.
    #[must_use]
    pub fn with_daily(mut self, symbol: &str, series: Series) -> Self {
        self.daily.insert(symbol.to_ascii_uppercase(), series);
        self
    }

    /// Preloads a monthly total-return close series.
    #[must_use]
    pub fn with_monthly(mut self, symbol: &str, series: Series) -> Self {
        self.monthly.insert(symbol.to_ascii_uppercase(), series);
        self
    }

    /// Preloads an FX series for `base/quote`.
    #[must_use]
    pub fn with_fx(mut self, base: Currency, quote: Currency, series: Series) -> Self {
        self.fx.insert(format!("{base}/{quote}"), series);
        self
    }

    fn slice(map: &HashMap<String, Series>, key: &str, start: NaiveDate, end: NaiveDate) -> Option<Series> {
        map.get(key).map(|s| s.slice(start, end))
    }
}

#[async_trait]
impl PriceVendor for StaticVendor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn daily_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series> {
        Self::slice(&self.daily, &symbol.to_ascii_uppercase(), start, end)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PriceError::vendor(self.name, symbol, "no daily data"))
    }

    async fn monthly_total_return_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series> {
        Self::slice(&self.monthly, &symbol.to_ascii_uppercase(), start, end)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PriceError::vendor(self.name, symbol, "no monthly total-return data"))
    }

    async fn monthly_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series> {
        // Fixture vendors serve the same panel for both monthly variants.
        self.monthly_total_return_close(symbol, start, end).await
    }

    async fn fx_daily(
        &self,
        base: Currency,
        quote: Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series> {
        Self::slice(&self.fx, &format!("{base}/{quote}"), start, end)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                PriceError::vendor(self.name, format!("{base}/{quote}"), "no fx data")
            })
    }
}
