//! Property-based tests for canonicalizer invariants.
//!
//! - Non-cash weights sum to 1 for long-only portfolios
//! - Leverage is exactly 1.0 iff no futures are present
//! - A natively-held symbol mirrored by aggregators never appears in an
//!   aggregator scope

use chrono::NaiveDate;
use palisade_contracts::ContractCatalog;
use palisade_core::{Currency, InstrumentClass, Position, ProviderKind, Symbol};
use palisade_providers::{canonicalize, CanonicalizerConfig, Scope};
use proptest::prelude::*;

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
}

fn equity(ticker: String, quantity: f64, unit_price: f64, source: ProviderKind) -> Position {
    Position {
        symbol: Symbol::new(&ticker),
        quantity,
        unit_price,
        currency: Currency::USD,
        cost_basis: Some(quantity * unit_price),
        account_id: format!("{}-1", source.label()),
        provider_source: source,
        brokerage_name: source.label().to_string(),
        instrument_type: InstrumentClass::Equity,
    }
}

prop_compose! {
    fn arb_long_position(index: usize)
        (quantity in 1.0f64..1_000.0, unit_price in 1.0f64..500.0)
        -> Position
    {
        equity(format!("SYM{index}"), quantity, unit_price, ProviderKind::NativeSchwab)
    }
}

fn arb_portfolio(max_len: usize) -> impl Strategy<Value = Vec<Position>> {
    (1..=max_len).prop_flat_map(|len| {
        (0..len)
            .map(arb_long_position)
            .collect::<Vec<_>>()
    })
}

proptest! {
    #[test]
    fn weights_sum_to_one_long_only(positions in arb_portfolio(12)) {
        let portfolio = canonicalize(
            &positions,
            &ContractCatalog::standard(),
            &Scope::All,
            &CanonicalizerConfig::default(),
            as_of(),
        )
        .unwrap();

        let sum: f64 = portfolio.weights().values().sum();
        prop_assert!((sum - 1.0).abs() < 1e-6, "weights summed to {sum}");
    }

    #[test]
    fn leverage_is_one_without_futures(positions in arb_portfolio(8)) {
        let portfolio = canonicalize(
            &positions,
            &ContractCatalog::standard(),
            &Scope::All,
            &CanonicalizerConfig::default(),
            as_of(),
        )
        .unwrap();
        prop_assert!((portfolio.notional_leverage - 1.0).abs() < 1e-12);
    }

    #[test]
    fn native_mirror_never_leaks_to_aggregator_scope(
        native_quantity in 1.0f64..1_000.0,
        mirror_quantity in 1.0f64..1_000.0,
        unit_price in 1.0f64..500.0,
    ) {
        let positions = vec![
            equity("DSU".to_string(), native_quantity, unit_price, ProviderKind::NativeSchwab),
            equity("DSU".to_string(), mirror_quantity, unit_price, ProviderKind::AggregatorPlaid),
            equity("ONLY".to_string(), 10.0, 20.0, ProviderKind::AggregatorPlaid),
        ];

        // Native scope sees the native quantity.
        let native = canonicalize(
            &positions,
            &ContractCatalog::standard(),
            &Scope::Provider(ProviderKind::NativeSchwab),
            &CanonicalizerConfig::default(),
            as_of(),
        )
        .unwrap();
        let dsu = native.positions.get("DSU").unwrap();
        prop_assert!((dsu.quantity - native_quantity).abs() < 1e-9);

        // Aggregator scope never sees the mirrored symbol and records it.
        let mirror = canonicalize(
            &positions,
            &ContractCatalog::standard(),
            &Scope::Provider(ProviderKind::AggregatorPlaid),
            &CanonicalizerConfig::default(),
            as_of(),
        )
        .unwrap();
        prop_assert!(mirror.positions.get("DSU").is_none());
        prop_assert!(mirror.positions.get("ONLY").is_some());
        prop_assert!(mirror
            .data_quality
            .cross_source_leakage
            .contains(&"DSU".to_string()));
    }
}
