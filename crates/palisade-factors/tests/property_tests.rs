//! Property-based tests for decomposition invariants.
//!
//! - `var_factor + var_idio = var_port` within 1e-9 relative error
//! - Euler contributions sum to portfolio volatility within 1e-9
//!   relative error

use chrono::NaiveDate;
use palisade_factors::{
    decompose, DecompositionConfig, FactorInputs, FactorPanel, FactorProxies,
};
use palisade_prices::Series;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn date(i: usize) -> NaiveDate {
    let year = 2022 + (i / 12) as i32;
    let month = (i % 12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 28).unwrap()
}

/// Builds inputs for `n` assets with the given betas, noise scales, and
/// weights over a fixed deterministic factor path.
fn build_inputs(specs: &[(f64, f64, f64)]) -> FactorInputs {
    let factor: Vec<f64> = (0..36)
        .map(|i| 0.015 * (((i * 7) % 11) as f64 - 5.0) / 5.0)
        .collect();

    let mut panel = FactorPanel::default();
    panel.add_column(
        "SPY",
        Series::from_pairs(factor.iter().enumerate().map(|(i, v)| (date(i), *v))),
        "market",
        "SPY",
    );

    let mut asset_returns = BTreeMap::new();
    let mut proxies = BTreeMap::new();
    let mut weights = BTreeMap::new();
    for (index, (beta, noise, weight)) in specs.iter().enumerate() {
        let symbol = format!("A{index}");
        let series = Series::from_pairs(factor.iter().enumerate().map(|(i, f)| {
            let wobble = noise * ((((i + index) * 13) % 7) as f64 - 3.0);
            (date(i), beta * *f + wobble)
        }));
        asset_returns.insert(symbol.clone(), series);
        proxies.insert(
            symbol.clone(),
            FactorProxies {
                market: Some("SPY".to_string()),
                ..FactorProxies::default()
            },
        );
        weights.insert(symbol, *weight);
    }

    FactorInputs {
        panel,
        asset_returns,
        proxies,
        weights,
        missing_prices: Vec::new(),
    }
}

fn arb_specs() -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec(
        (-1.0f64..2.0, 0.001f64..0.01, 0.05f64..1.0),
        2..6,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn variance_decomposition_is_additive(specs in arb_specs()) {
        let inputs = build_inputs(&specs);
        let decomposition = decompose(&inputs, &DecompositionConfig::default()).unwrap();

        let reconstructed = decomposition.var_factor + decomposition.var_idio;
        let scale = decomposition.var_port.abs().max(1e-18);
        prop_assert!(
            ((reconstructed - decomposition.var_port) / scale).abs() < 1e-9,
            "additivity violated: {reconstructed} vs {}",
            decomposition.var_port
        );
    }

    #[test]
    fn euler_contributions_sum_to_volatility(specs in arb_specs()) {
        let inputs = build_inputs(&specs);
        let decomposition = decompose(&inputs, &DecompositionConfig::default()).unwrap();

        let rc_sum: f64 = decomposition
            .risk_contributions
            .iter()
            .map(|rc| rc.contribution)
            .sum();
        let scale = decomposition.volatility_annual.abs().max(1e-18);
        prop_assert!(
            ((rc_sum - decomposition.volatility_annual) / scale).abs() < 1e-9,
            "RC sum {rc_sum} vs volatility {}",
            decomposition.volatility_annual
        );
    }
}
