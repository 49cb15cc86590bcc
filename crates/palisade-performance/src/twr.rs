//! GIPS beginning-of-day time-weighted returns.
//!
//! Daily return with previous close `V_{D-1}`, same-day inflow `CF_in`,
//! and outflow `|CF_out|`:
//!
//! ```text
//! R_D = (V_D + |CF_out|) / (V_{D-1} + CF_in) - 1
//! ```
//!
//! Inflow and outflow are never netted; the formula degenerates to the
//! inflow-only, outflow-only, and flow-free forms when a term is zero.

use chrono::{Datelike, NaiveDate};
use palisade_prices::Series;
use std::collections::BTreeMap;

/// Daily GIPS BOD returns from a NAV series and separate flow series.
#[must_use]
pub fn daily_returns(nav: &Series, flows_in: &Series, flows_out: &Series) -> Series {
    let dates = nav.dates();
    let mut returns = Series::new();
    for window in dates.windows(2) {
        let (prev_date, date) = (window[0], window[1]);
        let v_prev = nav.get(prev_date).unwrap_or(0.0);
        let v = nav.get(date).unwrap_or(0.0);
        let cf_in = flows_in.get(date).unwrap_or(0.0);
        let cf_out = flows_out.get(date).unwrap_or(0.0).abs();

        let denominator = v_prev + cf_in;
        if denominator <= 0.0 {
            continue;
        }
        returns.insert(date, (v + cf_out) / denominator - 1.0);
    }
    returns
}

/// Chains daily returns into monthly returns, keyed by the last return
/// date of each month.
#[must_use]
pub fn monthly_returns(daily: &Series) -> Series {
    let mut buckets: BTreeMap<(i32, u32), (NaiveDate, f64)> = BTreeMap::new();
    for (date, r) in daily.iter() {
        let bucket = buckets
            .entry((date.year(), date.month()))
            .or_insert((date, 1.0));
        bucket.0 = date;
        bucket.1 *= 1.0 + r;
    }
    Series::from_pairs(
        buckets
            .into_values()
            .map(|(date, growth)| (date, growth - 1.0)),
    )
}

/// Compounds a return series into a total period return.
#[must_use]
pub fn chain(returns: &Series) -> f64 {
    returns.values().iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Annualizes a period return spanning `n_months` months:
/// `(1 + R)^(12/n) - 1`.
#[must_use]
pub fn annualize(total_return: f64, n_months: u32) -> f64 {
    if n_months == 0 {
        return 0.0;
    }
    (1.0 + total_return).powf(12.0 / n_months as f64) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_gips_bod_mixed_flow_day() {
        // Prior close 100k; +5k in and -2k out the same day; EOD 104k.
        // R = (104000 + 2000) / (100000 + 5000) - 1, never the netted
        // (104000 - 3000) / 100000 - 1.
        let nav = Series::from_pairs(vec![
            (date(2025, 3, 3), 100_000.0),
            (date(2025, 3, 4), 104_000.0),
        ]);
        let flows_in = Series::from_pairs(vec![(date(2025, 3, 4), 5_000.0)]);
        let flows_out = Series::from_pairs(vec![(date(2025, 3, 4), 2_000.0)]);

        let returns = daily_returns(&nav, &flows_in, &flows_out);
        assert_relative_eq!(
            returns.get(date(2025, 3, 4)).unwrap(),
            106_000.0 / 105_000.0 - 1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_flow_free_day() {
        let nav = Series::from_pairs(vec![
            (date(2025, 3, 3), 100.0),
            (date(2025, 3, 4), 101.0),
        ]);
        let returns = daily_returns(&nav, &Series::new(), &Series::new());
        assert_relative_eq!(returns.get(date(2025, 3, 4)).unwrap(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_deposit_constant_prices_returns_zero() {
        // Deposit lands on day k with constant prices: every daily and
        // monthly return is exactly zero.
        let nav = Series::from_pairs(vec![
            (date(2025, 1, 10), 1_000.0),
            (date(2025, 1, 11), 1_000.0),
            (date(2025, 1, 12), 6_000.0), // +5k deposit
            (date(2025, 1, 13), 6_000.0),
            (date(2025, 2, 10), 6_000.0),
        ]);
        let flows_in = Series::from_pairs(vec![(date(2025, 1, 12), 5_000.0)]);

        let daily = daily_returns(&nav, &flows_in, &Series::new());
        for (_, r) in daily.iter() {
            assert_relative_eq!(r, 0.0, epsilon = 1e-12);
        }
        let monthly = monthly_returns(&daily);
        for (_, r) in monthly.iter() {
            assert_relative_eq!(r, 0.0, epsilon = 1e-12);
        }
        assert_relative_eq!(chain(&monthly), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_monthly_chaining() {
        let daily = Series::from_pairs(vec![
            (date(2025, 1, 10), 0.01),
            (date(2025, 1, 20), 0.02),
            (date(2025, 2, 10), -0.01),
        ]);
        let monthly = monthly_returns(&daily);
        assert_eq!(monthly.len(), 2);
        assert_relative_eq!(
            monthly.get(date(2025, 1, 20)).unwrap(),
            1.01 * 1.02 - 1.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(monthly.get(date(2025, 2, 10)).unwrap(), -0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_annualize() {
        // 6 months at +5% total annualizes to (1.05)^2 - 1.
        assert_relative_eq!(annualize(0.05, 6), 1.05f64.powi(2) - 1.0, epsilon = 1e-12);
        assert_relative_eq!(annualize(0.10, 12), 0.10, epsilon = 1e-12);
    }
}
