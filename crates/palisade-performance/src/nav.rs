//! Per-account daily NAV reconstruction.
//!
//! Replays an account timeline against daily prices and FX to produce
//! `NAV_D = Σ qty_{i,D} × price_{i,D} × fx_D + cash_D`, alongside
//! separate same-day inflow and outflow series for the TWR stage.

use crate::error::PerformanceResult;
use crate::timeline::AccountTimeline;
use chrono::{Duration, NaiveDate};
use palisade_core::{Currency, FlowDirection};
use palisade_prices::{PriceStore, Series};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Daily NAV and flow series for one account (or an aggregate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDailySeries {
    /// Account identifier ("combined" for aggregates).
    pub account_id: String,
    /// Daily NAV.
    pub nav: Series,
    /// External inflows per date (not netted against outflows).
    pub flows_in: Series,
    /// External outflows per date (positive amounts).
    pub flows_out: Series,
    /// Symbols valued from trade prices because no vendor priced them.
    pub missing_prices: Vec<String>,
}

/// Replays a timeline into a daily NAV series.
///
/// Valuation prices are vendor closes, forward-filled; symbols no vendor
/// can price fall back to their last transaction price and are recorded
/// in `missing_prices`. FX for non-base currencies is applied at the
/// daily rate.
pub async fn daily_nav(
    store: &PriceStore,
    timeline: &AccountTimeline,
    base: Currency,
    end: NaiveDate,
) -> PerformanceResult<AccountDailySeries> {
    let start = timeline.inception;

    // Distinct symbols and currencies in the timeline.
    let mut symbols: BTreeMap<String, Currency> = BTreeMap::new();
    for entry in &timeline.entries {
        if entry.quantity_delta != 0.0 && !entry.key.symbol.is_currency() {
            symbols.insert(entry.key.symbol.root().to_string(), entry.key.currency);
        }
    }

    // Complete every upstream fetch before the replay loop.
    let mut price_series: BTreeMap<String, Series> = BTreeMap::new();
    let mut fx_series: BTreeMap<Currency, Series> = BTreeMap::new();
    let mut missing_prices = Vec::new();
    for (root, currency) in &symbols {
        match store.daily_close(root, start, end).await {
            Ok(series) => {
                price_series.insert(root.clone(), (*series).clone());
            }
            Err(err) => {
                warn!(symbol = %root, %err, "valuing from trade prices");
                missing_prices.push(root.clone());
                let fallback = Series::from_pairs(
                    timeline
                        .entries
                        .iter()
                        .filter(|e| e.key.symbol.root() == root)
                        .filter_map(|e| e.price.map(|p| (e.date, p))),
                );
                price_series.insert(root.clone(), fallback);
            }
        }
        if *currency != base && !fx_series.contains_key(currency) {
            match store.fx_daily(*currency, base, start, end).await {
                Ok(series) => {
                    fx_series.insert(*currency, (*series).clone());
                }
                Err(err) => {
                    warn!(currency = %currency, %err, "missing FX, using 1.0");
                }
            }
        }
    }

    // Replay: quantities and cash evolve as entries land.
    let mut quantities: BTreeMap<String, (f64, Currency)> = BTreeMap::new();
    let mut cash = 0.0f64;
    let mut entry_iter = timeline.entries.iter().peekable();
    let mut nav = Series::new();

    let mut date = start;
    while date <= end {
        while let Some(entry) = entry_iter.peek() {
            if entry.date > date {
                break;
            }
            let entry = entry_iter.next().expect("peeked");
            if entry.quantity_delta != 0.0 && !entry.key.symbol.is_currency() {
                let slot = quantities
                    .entry(entry.key.symbol.root().to_string())
                    .or_insert((0.0, entry.key.currency));
                slot.0 += entry.quantity_delta;
            }
            cash += entry.cash_effect;
        }

        let mut securities = 0.0f64;
        for (root, (quantity, currency)) in &quantities {
            if *quantity == 0.0 {
                continue;
            }
            let Some(price) = price_series.get(root).and_then(|s| s.at_or_before(date)) else {
                continue;
            };
            let fx = if *currency == base {
                1.0
            } else {
                fx_series
                    .get(currency)
                    .and_then(|s| s.at_or_before(date))
                    .unwrap_or(1.0)
            };
            securities += quantity * price * fx;
        }
        nav.insert(date, securities + cash);
        date += Duration::days(1);
    }

    // Same-day inflows and outflows stay separate.
    let mut flows_in = Series::new();
    let mut flows_out = Series::new();
    for flow in &timeline.flows {
        match flow.direction {
            FlowDirection::In => {
                let current = flows_in.get(flow.date).unwrap_or(0.0);
                flows_in.insert(flow.date, current + flow.amount);
            }
            FlowDirection::Out => {
                let current = flows_out.get(flow.date).unwrap_or(0.0);
                flows_out.insert(flow.date, current + flow.amount);
            }
        }
    }

    Ok(AccountDailySeries {
        account_id: timeline.account_id.clone(),
        nav,
        flows_in,
        flows_out,
        missing_prices,
    })
}
