//! Date-indexed series with a single alignment policy.
//!
//! Every series returned to callers is monotonic in date (BTreeMap order)
//! and finite-length; alignment is always reindex-to-target followed by
//! dropping missing observations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sampling frequency of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Daily observations.
    Daily,
    /// Month-end observations.
    Monthly,
}

/// An ordered date → value series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    points: BTreeMap<NaiveDate, f64>,
}

impl Series {
    /// Creates an empty series.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from date/value pairs, dropping non-finite values.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let points = pairs
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .collect::<BTreeMap<_, _>>();
        Self { points }
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the series has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Value at an exact date.
    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points.get(&date).copied()
    }

    /// Most recent value at or before `date`.
    #[must_use]
    pub fn at_or_before(&self, date: NaiveDate) -> Option<f64> {
        self.points.range(..=date).next_back().map(|(_, v)| *v)
    }

    /// First (earliest) date in the series.
    #[must_use]
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.keys().next().copied()
    }

    /// Last (latest) date in the series.
    #[must_use]
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.keys().next_back().copied()
    }

    /// Dates in ascending order.
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.keys().copied().collect()
    }

    /// Values in date order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.points.values().copied().collect()
    }

    /// Iterates (date, value) pairs in date order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.points.iter().map(|(d, v)| (*d, *v))
    }

    /// Inserts or replaces an observation.
    pub fn insert(&mut self, date: NaiveDate, value: f64) {
        if value.is_finite() {
            self.points.insert(date, value);
        }
    }

    /// Reindexes to the target index and drops missing observations.
    ///
    /// This is the one alignment policy in the codebase: the result
    /// contains exactly the target dates the series has values for.
    #[must_use]
    pub fn align_to(&self, target: &[NaiveDate]) -> Series {
        let points = target
            .iter()
            .filter_map(|d| self.points.get(d).map(|v| (*d, *v)))
            .collect();
        Series { points }
    }

    /// Restricts to observations within `[start, end]`.
    #[must_use]
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Series {
        let points = self
            .points
            .range(start..=end)
            .map(|(d, v)| (*d, *v))
            .collect();
        Series { points }
    }

    /// Period-over-period simple returns, `p_t / p_{t-1} - 1`.
    ///
    /// The leading observation (which has no prior price) is dropped.
    #[must_use]
    pub fn returns(&self) -> Series {
        let mut out = BTreeMap::new();
        let mut prev: Option<f64> = None;
        for (date, value) in &self.points {
            if let Some(p) = prev {
                if p != 0.0 {
                    let r = value / p - 1.0;
                    if r.is_finite() {
                        out.insert(*date, r);
                    }
                }
            }
            prev = Some(*value);
        }
        Series { points: out }
    }

    /// Sample mean of the values.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.values().sum::<f64>() / self.points.len() as f64)
    }

    /// Sample standard deviation (N-1 denominator).
    #[must_use]
    pub fn std_dev(&self) -> Option<f64> {
        let n = self.points.len();
        if n < 2 {
            return None;
        }
        let mean = self.mean()?;
        let var = self
            .points
            .values()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        Some(var.sqrt())
    }
}

impl FromIterator<(NaiveDate, f64)> for Series {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, f64)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}

/// Pairwise-aligned view of two series: only dates present in both.
#[must_use]
pub fn align_pairwise(a: &Series, b: &Series) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (date, va) in a.iter() {
        if let Some(vb) = b.get(date) {
            xs.push(va);
            ys.push(vb);
        }
    }
    (xs, ys)
}

/// Pearson correlation of the pairwise-aligned observations, `None` when
/// fewer than two overlap or either side is constant.
#[must_use]
pub fn pairwise_correlation(a: &Series, b: &Series) -> Option<f64> {
    let (xs, ys) = align_pairwise(a, b);
    let n = xs.len();
    if n < 2 {
        return None;
    }
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monotonic_and_dedup() {
        let series = Series::from_pairs(vec![
            (date(2025, 3, 1), 101.0),
            (date(2025, 1, 1), 100.0),
            (date(2025, 2, 1), 99.0),
        ]);
        assert_eq!(
            series.dates(),
            vec![date(2025, 1, 1), date(2025, 2, 1), date(2025, 3, 1)]
        );
    }

    #[test]
    fn test_returns_drop_leading() {
        let series = Series::from_pairs(vec![
            (date(2025, 1, 31), 100.0),
            (date(2025, 2, 28), 110.0),
            (date(2025, 3, 31), 99.0),
        ]);
        let rets = series.returns();
        assert_eq!(rets.len(), 2);
        assert_relative_eq!(rets.get(date(2025, 2, 28)).unwrap(), 0.10, epsilon = 1e-12);
        assert_relative_eq!(rets.get(date(2025, 3, 31)).unwrap(), -0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_align_to_drops_missing() {
        let series = Series::from_pairs(vec![
            (date(2025, 1, 1), 1.0),
            (date(2025, 1, 3), 3.0),
        ]);
        let target = vec![date(2025, 1, 1), date(2025, 1, 2), date(2025, 1, 3)];
        let aligned = series.align_to(&target);
        assert_eq!(aligned.len(), 2);
        assert!(aligned.get(date(2025, 1, 2)).is_none());
    }

    #[test]
    fn test_nan_dropped_on_construction() {
        let series = Series::from_pairs(vec![
            (date(2025, 1, 1), f64::NAN),
            (date(2025, 1, 2), 2.0),
        ]);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_pairwise_correlation_sign() {
        let a = Series::from_pairs((1..=10).map(|i| (date(2025, 1, i), i as f64)));
        let b = Series::from_pairs((1..=10).map(|i| (date(2025, 1, i), -(i as f64))));
        let corr = pairwise_correlation(&a, &b).unwrap();
        assert_relative_eq!(corr, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pairwise_skips_missing_dates() {
        let a = Series::from_pairs(vec![
            (date(2025, 1, 1), 1.0),
            (date(2025, 1, 2), 2.0),
            (date(2025, 1, 3), 3.0),
        ]);
        let b = Series::from_pairs(vec![(date(2025, 1, 1), 2.0), (date(2025, 1, 3), 6.0)]);
        let (xs, ys) = align_pairwise(&a, &b);
        assert_eq!(xs, vec![1.0, 3.0]);
        assert_eq!(ys, vec![2.0, 6.0]);
    }

    #[test]
    fn test_at_or_before() {
        let series = Series::from_pairs(vec![
            (date(2025, 1, 2), 10.0),
            (date(2025, 1, 5), 12.0),
        ]);
        assert_eq!(series.at_or_before(date(2025, 1, 4)), Some(10.0));
        assert_eq!(series.at_or_before(date(2025, 1, 1)), None);
    }
}
