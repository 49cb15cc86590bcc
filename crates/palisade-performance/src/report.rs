//! Realized-performance orchestration.
//!
//! Runs the per-account pipeline (timeline → daily NAV → TWR) and then
//! the aggregation stage, emitting metrics and a data-quality block.
//! Per-account computation always precedes aggregation; a combined
//! series is only ever built from summed per-account series.

use crate::aggregate::{aggregate_accounts, DEFAULT_SMALL_BASE_THRESHOLD};
use crate::error::{PerformanceError, PerformanceResult};
use crate::metrics::{compute_metrics, MonthObservation, PerformanceMetrics};
use crate::nav::{daily_nav, AccountDailySeries};
use crate::timeline::build_timeline;
use crate::twr::{daily_returns, monthly_returns};
use chrono::NaiveDate;
use palisade_core::{Currency, FlowEvent, Position, Transaction};
use palisade_prices::PriceStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Performance engine configuration.
#[derive(Debug, Clone)]
pub struct PerformanceConfig {
    /// Annual risk-free rate for Sharpe/Sortino.
    pub risk_free_annual: f64,
    /// Small-base threshold for combined aggregation.
    pub small_base_threshold: f64,
    /// Reporting currency.
    pub base_currency: Currency,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            risk_free_annual: 0.04,
            small_base_threshold: DEFAULT_SMALL_BASE_THRESHOLD,
            base_currency: Currency::USD,
        }
    }
}

/// Everything the engine needs for one account.
#[derive(Debug, Clone, Default)]
pub struct AccountInput {
    /// Account identifier.
    pub account_id: String,
    /// Normalized transactions for the account.
    pub transactions: Vec<Transaction>,
    /// Derived external flows for the account.
    pub flows: Vec<FlowEvent>,
    /// Current holdings, for synthetic inception seeding.
    pub positions: Vec<Position>,
}

/// Identity and coverage facts for one account's series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountFingerprint {
    /// Account identifier.
    pub account_id: String,
    /// Inception date used.
    pub inception: NaiveDate,
    /// Final NAV in the series.
    pub final_nav: f64,
    /// External flow events counted.
    pub flow_count: usize,
    /// Synthetic inception seeds emitted.
    pub synthetic_seeds: usize,
}

/// Data-quality block for a realized-performance run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceDataQuality {
    /// First covered date.
    pub coverage_start: Option<NaiveDate>,
    /// Last covered date.
    pub coverage_end: Option<NaiveDate>,
    /// Synthetic seeds across all accounts.
    pub synthetic_positions: usize,
    /// Symbols valued from trade prices.
    pub missing_prices: Vec<String>,
    /// Providers that failed upstream (set by the service layer).
    pub excluded_sources: Vec<String>,
    /// Accounts that never crossed the small-base threshold.
    pub excluded_small_base: Vec<String>,
    /// Accounts skipped for having no reconstructible history.
    pub skipped_accounts: Vec<String>,
    /// Per-account fingerprints.
    pub accounts: Vec<AccountFingerprint>,
}

/// Per-account performance result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPerformance {
    /// Account identifier.
    pub account_id: String,
    /// Metrics over the account's monthly series.
    pub metrics: PerformanceMetrics,
}

/// Full realized-performance output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedPerformance {
    /// Combined (multi-account) metrics.
    pub metrics: PerformanceMetrics,
    /// Combined monthly return series.
    pub monthly_returns: Vec<MonthObservation>,
    /// Per-account breakdowns.
    pub per_account: Vec<AccountPerformance>,
    /// Data-quality block.
    pub data_quality: PerformanceDataQuality,
}

/// Computes realized performance across accounts.
///
/// # Errors
///
/// Fails when no account yields a computable series.
pub async fn compute_realized(
    store: &PriceStore,
    accounts: &[AccountInput],
    config: &PerformanceConfig,
    as_of: NaiveDate,
) -> PerformanceResult<RealizedPerformance> {
    let mut series: Vec<AccountDailySeries> = Vec::new();
    let mut fingerprints = Vec::new();
    let mut per_account = Vec::new();
    let mut skipped = Vec::new();
    let mut synthetic_positions = 0;

    for input in accounts {
        let timeline = match build_timeline(
            &input.account_id,
            &input.transactions,
            &input.flows,
            &input.positions,
            as_of,
        ) {
            Ok(timeline) => timeline,
            Err(err) => {
                // Reduced coverage is reported, never silently dropped.
                warn!(account = %input.account_id, %err, "skipping account");
                skipped.push(input.account_id.clone());
                continue;
            }
        };
        synthetic_positions += timeline.synthetic_seeds;

        let account_series = daily_nav(store, &timeline, config.base_currency, as_of).await?;

        let daily = daily_returns(
            &account_series.nav,
            &account_series.flows_in,
            &account_series.flows_out,
        );
        let monthly = monthly_returns(&daily);
        per_account.push(AccountPerformance {
            account_id: input.account_id.clone(),
            metrics: compute_metrics(&monthly, config.risk_free_annual),
        });

        fingerprints.push(AccountFingerprint {
            account_id: input.account_id.clone(),
            inception: timeline.inception,
            final_nav: account_series.nav.values().last().copied().unwrap_or(0.0),
            flow_count: timeline.flows.len(),
            synthetic_seeds: timeline.synthetic_seeds,
        });
        series.push(account_series);
    }

    if series.is_empty() {
        return Err(PerformanceError::Empty {
            reason: "no account produced a NAV series".to_string(),
        });
    }

    let aggregated = aggregate_accounts(&series, config.small_base_threshold)?;
    let combined_daily = daily_returns(
        &aggregated.combined.nav,
        &aggregated.combined.flows_in,
        &aggregated.combined.flows_out,
    );
    let combined_monthly = monthly_returns(&combined_daily);
    let metrics = compute_metrics(&combined_monthly, config.risk_free_annual);

    info!(
        accounts = series.len(),
        months = metrics.n_months,
        total_return = metrics.total_return,
        "realized performance computed"
    );

    Ok(RealizedPerformance {
        metrics,
        monthly_returns: combined_monthly
            .iter()
            .map(|(date, value)| MonthObservation { date, value })
            .collect(),
        per_account,
        data_quality: PerformanceDataQuality {
            coverage_start: aggregated.combined.nav.first_date(),
            coverage_end: aggregated.combined.nav.last_date(),
            synthetic_positions,
            missing_prices: aggregated.combined.missing_prices.clone(),
            excluded_sources: Vec::new(),
            excluded_small_base: aggregated.excluded_small_base,
            skipped_accounts: skipped,
            accounts: fingerprints,
        },
    })
}
