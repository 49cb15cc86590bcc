//! Cached price store with vendor fallback and request deduplication.
//!
//! Fetches fan out per symbol through a bounded semaphore (vendor rate
//! limits); concurrent requests for the same `(symbol, frequency, range)`
//! share one upstream call through a singleflight map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, warn};

use palisade_core::Currency;

use crate::error::{PriceError, PriceResult};
use crate::series::{Frequency, Series};
use crate::vendor::PriceVendor;

/// Default width of the vendor fan-out pool.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 16;

/// Cache key: one entry per vendor that served the series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PriceKey {
    /// Uppercased symbol (or `FX:BASE/QUOTE`).
    pub symbol: String,
    /// Sampling frequency.
    pub frequency: Frequency,
    /// Range start.
    pub start: NaiveDate,
    /// Range end.
    pub end: NaiveDate,
    /// Vendor that served (or is serving) the request.
    pub vendor: &'static str,
}

/// Singleflight key: vendor-agnostic, so followers share the leader's
/// fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlightKey {
    symbol: String,
    frequency: Frequency,
    start: NaiveDate,
    end: NaiveDate,
}

/// Hit/miss statistics for the price cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceCacheStats {
    /// Cache hits.
    pub hits: u64,
    /// Cache misses (upstream fetches).
    pub misses: u64,
    /// Requests that joined an in-flight fetch.
    pub coalesced: u64,
}

impl PriceCacheStats {
    /// Hit rate in [0, 1].
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type FlightResult = PriceResult<Arc<Series>>;

/// Price store over a primary vendor with a secondary fallback.
pub struct PriceStore {
    primary: Arc<dyn PriceVendor>,
    secondary: Option<Arc<dyn PriceVendor>>,
    cache: DashMap<PriceKey, Arc<Series>>,
    inflight: DashMap<FlightKey, broadcast::Sender<FlightResult>>,
    fetch_pool: Arc<Semaphore>,
    concurrency: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl PriceStore {
    /// Creates a store over a single vendor.
    #[must_use]
    pub fn new(primary: Arc<dyn PriceVendor>) -> Self {
        Self::with_fallback(primary, None, DEFAULT_FETCH_CONCURRENCY)
    }

    /// Creates a store with an optional secondary vendor and pool width.
    #[must_use]
    pub fn with_fallback(
        primary: Arc<dyn PriceVendor>,
        secondary: Option<Arc<dyn PriceVendor>>,
        concurrency: usize,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            primary,
            secondary,
            cache: DashMap::new(),
            inflight: DashMap::new(),
            fetch_pool: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Width of the vendor fan-out pool.
    #[must_use]
    pub fn fetch_concurrency(&self) -> usize {
        self.concurrency
    }

    /// Daily closing prices for `[start, end]`.
    pub async fn daily_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Arc<Series>> {
        self.fetch(symbol, Frequency::Daily, start, end).await
    }

    /// Month-end total-return closes, with a monthly-close fallback when
    /// total-return data is missing from a vendor.
    pub async fn monthly_total_return_close(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Arc<Series>> {
        self.fetch(symbol, Frequency::Monthly, start, end).await
    }

    /// Daily FX rates for `base/quote`.
    pub async fn fx_daily(
        &self,
        base: Currency,
        quote: Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Arc<Series>> {
        let symbol = format!("FX:{base}/{quote}");
        self.fetch(&symbol, Frequency::Daily, start, end).await
    }

    /// Monthly simple returns derived from total-return closes.
    pub async fn monthly_returns(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series> {
        let closes = self.monthly_total_return_close(symbol, start, end).await?;
        let returns = closes.returns();
        if returns.is_empty() {
            return Err(PriceError::EmptySeries {
                symbol: symbol.to_string(),
            });
        }
        Ok(returns)
    }

    /// Snapshot of cache statistics.
    #[must_use]
    pub fn stats(&self) -> PriceCacheStats {
        PriceCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Drops all cached series.
    pub fn clear(&self) {
        self.cache.clear();
    }

    async fn fetch(
        &self,
        symbol: &str,
        frequency: Frequency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Arc<Series>> {
        if end < start {
            return Err(PriceError::InvalidRange {
                reason: format!("end {end} precedes start {start}"),
            });
        }
        let symbol = symbol.trim().to_ascii_uppercase();

        if let Some(hit) = self.cache_lookup(&symbol, frequency, start, end) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        let flight = FlightKey {
            symbol: symbol.clone(),
            frequency,
            start,
            end,
        };

        loop {
            // A finished leader populates the cache before clearing the
            // flight entry; late joiners land here.
            if let Some(hit) = self.cache_lookup(&symbol, frequency, start, end) {
                return Ok(hit);
            }
            match self.inflight.entry(flight.clone()) {
                Entry::Occupied(occupied) => {
                    let mut rx = occupied.get().subscribe();
                    drop(occupied);
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    match rx.recv().await {
                        Ok(result) => return result,
                        // Leader dropped without sending; race again.
                        Err(_) => continue,
                    }
                }
                Entry::Vacant(vacant) => {
                    let (tx, _) = broadcast::channel(1);
                    // Release the shard lock before awaiting upstream.
                    drop(vacant.insert(tx.clone()));

                    let result = self.fetch_upstream(&symbol, frequency, start, end).await;
                    self.inflight.remove(&flight);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let _ = tx.send(result.clone());
                    return result;
                }
            }
        }
    }

    fn cache_lookup(
        &self,
        symbol: &str,
        frequency: Frequency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<Arc<Series>> {
        let mut vendors = vec![self.primary.name()];
        if let Some(secondary) = &self.secondary {
            vendors.push(secondary.name());
        }
        for vendor in vendors {
            let key = PriceKey {
                symbol: symbol.to_string(),
                frequency,
                start,
                end,
                vendor,
            };
            if let Some(hit) = self.cache.get(&key) {
                return Some(hit.clone());
            }
        }
        None
    }

    async fn fetch_upstream(
        &self,
        symbol: &str,
        frequency: Frequency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FlightResult {
        let _permit = self
            .fetch_pool
            .acquire()
            .await
            .map_err(|_| PriceError::unavailable(symbol))?;

        let mut vendors: Vec<Arc<dyn PriceVendor>> = vec![self.primary.clone()];
        if let Some(secondary) = &self.secondary {
            vendors.push(secondary.clone());
        }

        for vendor in vendors {
            let fetched = self
                .fetch_from_vendor(vendor.as_ref(), symbol, frequency, start, end)
                .await;
            match fetched {
                Ok(series) if !series.is_empty() => {
                    let series = Arc::new(series);
                    let key = PriceKey {
                        symbol: symbol.to_string(),
                        frequency,
                        start,
                        end,
                        vendor: vendor.name(),
                    };
                    debug!(symbol, vendor = vendor.name(), points = series.len(), "cached series");
                    self.cache.insert(key, series.clone());
                    return Ok(series);
                }
                Ok(_) => {
                    warn!(symbol, vendor = vendor.name(), "vendor returned empty series");
                }
                Err(err) => {
                    warn!(symbol, vendor = vendor.name(), %err, "vendor fetch failed");
                }
            }
        }

        Err(PriceError::unavailable(symbol))
    }

    async fn fetch_from_vendor(
        &self,
        vendor: &dyn PriceVendor,
        symbol: &str,
        frequency: Frequency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceResult<Series> {
        match frequency {
            Frequency::Daily => {
                if let Some(fx) = symbol.strip_prefix("FX:") {
                    let (base, quote) = parse_fx_pair(fx)?;
                    vendor.fx_daily(base, quote, start, end).await
                } else {
                    vendor.daily_close(symbol, start, end).await
                }
            }
            Frequency::Monthly => {
                match vendor.monthly_total_return_close(symbol, start, end).await {
                    Ok(series) => Ok(series),
                    Err(err) => {
                        warn!(symbol, vendor = vendor.name(), %err, "falling back to monthly close");
                        vendor.monthly_close(symbol, start, end).await
                    }
                }
            }
        }
    }
}

fn parse_fx_pair(pair: &str) -> PriceResult<(Currency, Currency)> {
    let (base, quote) = pair.split_once('/').ok_or_else(|| PriceError::InvalidRange {
        reason: format!("malformed fx pair '{pair}'"),
    })?;
    let base = base.parse().map_err(|_| PriceError::InvalidRange {
        reason: format!("unknown fx base '{base}'"),
    })?;
    let quote = quote.parse().map_err(|_| PriceError::InvalidRange {
        reason: format!("unknown fx quote '{quote}'"),
    })?;
    Ok((base, quote))
}
