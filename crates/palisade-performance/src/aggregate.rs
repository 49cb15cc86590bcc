//! Multi-account aggregation.
//!
//! A combined return is computed on summed per-account daily NAV and flow
//! series, never on coalesced raw transactions. Accounts join the
//! combined series only once their NAV first crosses the small-base
//! threshold, so a freshly funded account cannot dominate the combined
//! TWR from a tiny base.

use crate::error::{PerformanceError, PerformanceResult};
use crate::nav::AccountDailySeries;
use chrono::NaiveDate;
use palisade_prices::Series;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Default small-base threshold in account currency.
pub const DEFAULT_SMALL_BASE_THRESHOLD: f64 = 500.0;

/// Aggregation outcome alongside per-account participation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    /// Summed series (account id "combined").
    pub combined: AccountDailySeries,
    /// Date each account joined the combined series.
    pub joined: Vec<(String, NaiveDate)>,
    /// Accounts whose NAV never crossed the threshold.
    pub excluded_small_base: Vec<String>,
}

fn join_date(series: &AccountDailySeries, threshold: f64) -> Option<NaiveDate> {
    series
        .nav
        .iter()
        .find(|(_, nav)| *nav >= threshold)
        .map(|(date, _)| date)
}

/// Sums per-account daily NAV and flow series into a combined series.
///
/// # Errors
///
/// Fails when no account crosses the small-base threshold.
pub fn aggregate_accounts(
    accounts: &[AccountDailySeries],
    threshold: f64,
) -> PerformanceResult<AggregatedSeries> {
    let mut joined = Vec::new();
    let mut excluded = Vec::new();
    let mut participating: Vec<(&AccountDailySeries, NaiveDate)> = Vec::new();

    for account in accounts {
        match join_date(account, threshold) {
            Some(date) => {
                debug!(account = %account.account_id, %date, "account joins combined series");
                joined.push((account.account_id.clone(), date));
                participating.push((account, date));
            }
            None => excluded.push(account.account_id.clone()),
        }
    }

    if participating.is_empty() {
        return Err(PerformanceError::Empty {
            reason: "no account crossed the small-base threshold".to_string(),
        });
    }

    // Union of NAV dates from each account's join date on.
    let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
    for (account, join) in &participating {
        for date in account.nav.dates() {
            if date >= *join {
                dates.insert(date);
            }
        }
    }

    let mut nav = Series::new();
    let mut flows_in = Series::new();
    let mut flows_out = Series::new();
    for date in &dates {
        let mut total = 0.0;
        let mut any = false;
        for (account, join) in &participating {
            if *date < *join {
                continue;
            }
            if let Some(value) = account.nav.at_or_before(*date) {
                total += value;
                any = true;
            }
        }
        if any {
            nav.insert(*date, total);
        }

        let in_total: f64 = participating
            .iter()
            .filter(|(_, join)| *date >= *join)
            .filter_map(|(account, _)| account.flows_in.get(*date))
            .sum();
        if in_total != 0.0 {
            flows_in.insert(*date, in_total);
        }
        let out_total: f64 = participating
            .iter()
            .filter(|(_, join)| *date >= *join)
            .filter_map(|(account, _)| account.flows_out.get(*date))
            .sum();
        if out_total != 0.0 {
            flows_out.insert(*date, out_total);
        }
    }

    let mut missing: Vec<String> = participating
        .iter()
        .flat_map(|(account, _)| account.missing_prices.iter().cloned())
        .collect();
    missing.sort();
    missing.dedup();

    excluded.sort();

    Ok(AggregatedSeries {
        combined: AccountDailySeries {
            account_id: "combined".to_string(),
            nav,
            flows_in,
            flows_out,
            missing_prices: missing,
        },
        joined,
        excluded_small_base: excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twr::daily_returns;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn account(id: &str, points: Vec<(NaiveDate, f64)>) -> AccountDailySeries {
        AccountDailySeries {
            account_id: id.to_string(),
            nav: Series::from_pairs(points),
            flows_in: Series::new(),
            flows_out: Series::new(),
            missing_prices: Vec::new(),
        }
    }

    #[test]
    fn test_combined_equals_summed_series() {
        let a = account(
            "a",
            vec![
                (date(2025, 1, 1), 10_000.0),
                (date(2025, 1, 2), 10_100.0),
                (date(2025, 1, 3), 10_200.0),
            ],
        );
        let b = account(
            "b",
            vec![
                (date(2025, 1, 1), 20_000.0),
                (date(2025, 1, 2), 19_800.0),
                (date(2025, 1, 3), 20_200.0),
            ],
        );

        let aggregated = aggregate_accounts(&[a.clone(), b.clone()], 500.0).unwrap();
        // Combined daily TWR equals the TWR computed on the summed
        // series by construction; verify the sum itself.
        assert_relative_eq!(
            aggregated.combined.nav.get(date(2025, 1, 2)).unwrap(),
            29_900.0,
            epsilon = 1e-9
        );
        let combined_returns = daily_returns(
            &aggregated.combined.nav,
            &aggregated.combined.flows_in,
            &aggregated.combined.flows_out,
        );
        assert_relative_eq!(
            combined_returns.get(date(2025, 1, 2)).unwrap(),
            29_900.0 / 30_000.0 - 1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_small_base_excluded_until_crossing() {
        let tiny = account(
            "tiny",
            vec![
                (date(2025, 1, 1), 50.0),
                (date(2025, 1, 2), 80.0),
                (date(2025, 1, 3), 900.0), // crosses on the 3rd
                (date(2025, 1, 4), 910.0),
            ],
        );
        let big = account(
            "big",
            vec![
                (date(2025, 1, 1), 10_000.0),
                (date(2025, 1, 2), 10_000.0),
                (date(2025, 1, 3), 10_000.0),
                (date(2025, 1, 4), 10_000.0),
            ],
        );

        let aggregated = aggregate_accounts(&[tiny, big], 500.0).unwrap();
        let join = aggregated
            .joined
            .iter()
            .find(|(id, _)| id == "tiny")
            .unwrap()
            .1;
        assert_eq!(join, date(2025, 1, 3));
        // Before the join the combined NAV is the big account alone.
        assert_relative_eq!(
            aggregated.combined.nav.get(date(2025, 1, 2)).unwrap(),
            10_000.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            aggregated.combined.nav.get(date(2025, 1, 4)).unwrap(),
            10_910.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_never_crossing_account_excluded() {
        let dust = account("dust", vec![(date(2025, 1, 1), 5.0)]);
        let big = account("big", vec![(date(2025, 1, 1), 10_000.0)]);
        let aggregated = aggregate_accounts(&[dust, big], 500.0).unwrap();
        assert_eq!(aggregated.excluded_small_base, vec!["dust".to_string()]);
    }

    #[test]
    fn test_all_small_is_error() {
        let dust = account("dust", vec![(date(2025, 1, 1), 5.0)]);
        assert!(aggregate_accounts(&[dust], 500.0).is_err());
    }
}
