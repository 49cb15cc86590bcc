//! Fixture-backed demo service.
//!
//! Builds a [`crate::RiskService`] over static providers and a static
//! price vendor: a two-broker portfolio with an aggregator mirror, an ES
//! futures position, and three years of synthetic monthly history for
//! every proxy ticker.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use palisade_contracts::ContractCatalog;
use palisade_core::ProviderKind;
use palisade_prices::{Series, StaticVendor};
use palisade_providers::{RawPosition, StaticProvider};

use crate::config::EngineConfig;
use crate::service::RiskService;
use crate::store::MemoryStore;

fn month_date(i: i32) -> NaiveDate {
    let year = 2022 + i / 12;
    let month = (i % 12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 28).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(2022, 1, 28).unwrap()
    })
}

/// Deterministic wavy monthly close series.
fn monthly_series(base: f64, drift: f64, wobble: f64, phase: usize) -> Series {
    let mut level = base;
    Series::from_pairs((0..42).map(move |i| {
        let swing = (((i + phase) * 7) % 11) as f64 - 5.0;
        level *= 1.0 + drift + wobble * swing / 5.0;
        (month_date(i as i32), level)
    }))
}

fn daily_series(price: f64) -> Series {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    Series::from_pairs((0..950).map(|i| (start + Duration::days(i), price)))
}

fn raw_position(
    ticker: &str,
    quantity: f64,
    unit_price: f64,
    instrument_type: &str,
    source: &str,
    account: &str,
    brokerage: &str,
) -> RawPosition {
    RawPosition {
        ticker: ticker.to_string(),
        quantity,
        unit_price,
        currency: "USD".to_string(),
        cost_basis: Some(quantity.abs() * unit_price * 0.9),
        account_id: account.to_string(),
        brokerage_name: brokerage.to_string(),
        instrument_type: instrument_type.to_string(),
        source: source.to_string(),
        contract_month: None,
    }
}

/// Builds the demo service.
#[must_use]
pub fn demo_service() -> RiskService {
    let schwab = StaticProvider::new(ProviderKind::NativeSchwab).with_positions(vec![
        raw_position("AAPL", 100.0, 255.0, "equity", "schwab", "schwab-1", "Charles Schwab"),
        raw_position("VTI", 120.0, 280.0, "etf", "schwab", "schwab-1", "Charles Schwab"),
        raw_position("VNQ", 80.0, 90.0, "etf", "schwab", "schwab-1", "Charles Schwab"),
    ]);

    let mut es = raw_position("ES", 2.0, 5600.0, "futures", "ibkr", "ibkr-1", "Interactive Brokers");
    es.contract_month = Some("202612".to_string());
    let ibkr = StaticProvider::new(ProviderKind::NativeIbkr).with_positions(vec![
        raw_position("MSFT", 40.0, 420.0, "equity", "ibkr", "ibkr-1", "Interactive Brokers"),
        es,
    ]);

    // Plaid mirrors the Schwab AAPL holding with a stale quantity; the
    // canonicalizer resolves it in Schwab's favor. BND is genuinely
    // plaid-only.
    let plaid = StaticProvider::new(ProviderKind::AggregatorPlaid).with_positions(vec![
        raw_position("AAPL", 90.0, 255.0, "equity", "plaid", "plaid-1", "Mirror"),
        raw_position("BND", 150.0, 72.0, "bond", "plaid", "plaid-1", "Mirror"),
    ]);

    let vendor = StaticVendor::named("demo")
        .with_monthly("SPY", monthly_series(480.0, 0.006, 0.012, 0))
        .with_monthly("MTUM", monthly_series(180.0, 0.007, 0.014, 3))
        .with_monthly("VTV", monthly_series(160.0, 0.004, 0.010, 5))
        .with_monthly("VTI", monthly_series(240.0, 0.006, 0.011, 1))
        .with_monthly("XLK", monthly_series(200.0, 0.008, 0.016, 2))
        .with_monthly("IEF", monthly_series(95.0, 0.001, 0.004, 7))
        .with_monthly("GLD", monthly_series(190.0, 0.003, 0.009, 9))
        .with_monthly("USO", monthly_series(70.0, 0.001, 0.020, 4))
        .with_monthly("AAPL", monthly_series(210.0, 0.008, 0.015, 6))
        .with_monthly("MSFT", monthly_series(360.0, 0.007, 0.013, 8))
        .with_monthly("VNQ", monthly_series(82.0, 0.002, 0.012, 10))
        .with_monthly("BND", monthly_series(71.0, 0.001, 0.005, 12))
        .with_monthly("ES", monthly_series(4800.0, 0.006, 0.013, 11))
        .with_daily("AAPL", daily_series(255.0))
        .with_daily("MSFT", daily_series(420.0))
        .with_daily("VTI", daily_series(280.0))
        .with_daily("VNQ", daily_series(90.0))
        .with_daily("ES", daily_series(5600.0))
        .with_daily("SPY", daily_series(560.0));

    RiskService::from_vendor(
        vec![Arc::new(schwab), Arc::new(ibkr), Arc::new(plaid)],
        Arc::new(vendor),
        None,
        Arc::new(ContractCatalog::standard()),
        Arc::new(MemoryStore::new()),
        EngineConfig::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::OutputFormat;
    use crate::service::{RequestContext, Segment};
    use palisade_providers::Scope;

    #[tokio::test]
    async fn test_demo_risk_analysis_runs() {
        let service = demo_service();
        let ctx = RequestContext {
            user_id: "demo".to_string(),
            scope: Scope::All,
            as_of: NaiveDate::from_ymd_opt(2025, 6, 28).unwrap(),
            format: OutputFormat::Agent,
        };
        let result = service.risk_analysis(&ctx, Segment::All).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_demo_mirror_resolved_to_native() {
        let service = demo_service();
        let ctx = RequestContext {
            user_id: "demo".to_string(),
            scope: Scope::Provider(ProviderKind::AggregatorPlaid),
            as_of: NaiveDate::from_ymd_opt(2025, 6, 28).unwrap(),
            format: OutputFormat::Full,
        };
        let (portfolio, _) = service.build_portfolio(&ctx).await.unwrap();
        assert!(!portfolio.positions.contains_key("AAPL"));
        assert!(portfolio.positions.contains_key("BND"));
        assert_eq!(
            portfolio.data_quality.cross_source_leakage,
            vec!["AAPL".to_string()]
        );
    }
}
