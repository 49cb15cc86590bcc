//! Bucketed cross-category correlations.

use palisade_factors::FactorPanel;
use palisade_prices::pairwise_correlation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-category correlation matrix.
///
/// Cells average the pairwise correlations between the member columns of
/// two categories. Categories with a single member are excluded from the
/// matrix (their within-bucket correlation is undefined); the
/// [`crate::overlay::basket_overlay`] matrix covers single baskets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCorrelations {
    /// Categories included, in order.
    pub categories: Vec<String>,
    /// Symmetric matrix of average cross-bucket correlations.
    pub matrix: Vec<Vec<f64>>,
    /// Categories elided for having one member.
    pub excluded_single_member: Vec<String>,
}

/// Average pairwise correlation between two sets of columns.
fn bucket_correlation(panel: &FactorPanel, a: &[String], b: &[String]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for col_a in a {
        for col_b in b {
            if col_a == col_b {
                continue;
            }
            if let Some(corr) =
                pairwise_correlation(&panel.columns[col_a], &panel.columns[col_b])
            {
                sum += corr;
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Builds the bucketed cross-category correlation matrix.
#[must_use]
pub fn category_correlations(panel: &FactorPanel) -> CategoryCorrelations {
    let mut members: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (column, category) in &panel.categories {
        if panel.columns.contains_key(column) {
            members.entry(category.clone()).or_default().push(column.clone());
        }
    }

    let mut excluded = Vec::new();
    members.retain(|category, columns| {
        if columns.len() < 2 {
            excluded.push(category.clone());
            false
        } else {
            true
        }
    });

    let categories: Vec<String> = members.keys().cloned().collect();
    let matrix = categories
        .iter()
        .map(|row| {
            categories
                .iter()
                .map(|col| bucket_correlation(panel, &members[row], &members[col]))
                .collect()
        })
        .collect();

    CategoryCorrelations {
        categories,
        matrix,
        excluded_single_member: excluded,
    }
}

/// Flat pairwise correlation matrix over every panel column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCorrelations {
    /// Column names, in order.
    pub columns: Vec<String>,
    /// Pairwise correlations; `None` when overlap is too short.
    pub matrix: Vec<Vec<Option<f64>>>,
}

/// Builds the full column-level correlation matrix, pairwise-dropna per
/// cell.
#[must_use]
pub fn column_correlations(panel: &FactorPanel) -> ColumnCorrelations {
    let columns = panel.column_names();
    let matrix = columns
        .iter()
        .map(|a| {
            columns
                .iter()
                .map(|b| {
                    if a == b {
                        Some(1.0)
                    } else {
                        pairwise_correlation(&panel.columns[a], &panel.columns[b])
                    }
                })
                .collect()
        })
        .collect();
    ColumnCorrelations { columns, matrix }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use palisade_prices::Series;

    fn date(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, 28).unwrap()
    }

    fn panel() -> FactorPanel {
        let base: Vec<f64> = (1..=12).map(|m| 0.01 * (m as f64 - 6.0)).collect();
        let mut panel = FactorPanel::default();
        panel.add_column(
            "SPY",
            Series::from_pairs(base.iter().enumerate().map(|(i, v)| (date(i as u32 + 1), *v))),
            "market",
            "SPY",
        );
        panel.add_column(
            "QQQ",
            Series::from_pairs(base.iter().enumerate().map(|(i, v)| (date(i as u32 + 1), 1.2 * *v))),
            "market",
            "QQQ",
        );
        panel.add_column(
            "GLD",
            Series::from_pairs(
                base.iter()
                    .enumerate()
                    .map(|(i, v)| (date(i as u32 + 1), -0.5 * *v)),
            ),
            "commodity",
            "GLD",
        );
        panel
    }

    #[test]
    fn test_single_member_bucket_excluded() {
        let correlations = category_correlations(&panel());
        assert_eq!(
            correlations.excluded_single_member,
            vec!["commodity".to_string()]
        );
        assert_eq!(correlations.categories, vec!["market".to_string()]);
    }

    #[test]
    fn test_within_market_correlation_is_one() {
        let correlations = category_correlations(&panel());
        // SPY and QQQ are perfectly correlated by construction.
        assert!((correlations.matrix[0][0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_column_matrix_diagonal_and_sign() {
        let matrix = column_correlations(&panel());
        let gld = matrix.columns.iter().position(|c| c == "GLD").unwrap();
        let spy = matrix.columns.iter().position(|c| c == "SPY").unwrap();
        assert_eq!(matrix.matrix[spy][spy], Some(1.0));
        assert!(matrix.matrix[gld][spy].unwrap() < -0.99);
    }
}
