//! Leverage capacity and exit-signal helpers built on evaluator inputs.

use palisade_core::{Position, RiskProfile};
use palisade_providers::CanonicalPortfolio;
use serde::{Deserialize, Serialize};

/// Headroom between current and maximum notional leverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageCapacity {
    /// Current notional leverage.
    pub current_leverage: f64,
    /// Configured maximum.
    pub max_leverage: f64,
    /// `current / max`.
    pub utilization: f64,
    /// Additional notional available before hitting the cap, in account
    /// currency.
    pub additional_notional: f64,
}

/// Computes leverage headroom for a portfolio under a profile.
#[must_use]
pub fn leverage_capacity(portfolio: &CanonicalPortfolio, profile: &RiskProfile) -> LeverageCapacity {
    let current = portfolio.notional_leverage;
    let max = profile.max_leverage;
    let additional = ((max - current) * portfolio.margin_total).max(0.0);
    LeverageCapacity {
        current_leverage: current,
        max_leverage: max,
        utilization: if max > 0.0 { current / max } else { 0.0 },
        additional_notional: additional,
    }
}

/// A position whose drawdown from cost breaches the loss limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSignal {
    /// Symbol of the losing position.
    pub symbol: String,
    /// Owning account.
    pub account_id: String,
    /// Loss from cost basis as a decimal (negative).
    pub loss_pct: f64,
    /// The configured threshold that was breached.
    pub threshold: f64,
}

/// Scans positions for losses past the profile's `max_loss`.
///
/// Positions without a cost basis (synthetic) cannot be measured and are
/// skipped.
#[must_use]
pub fn check_exit_signals(positions: &[Position], profile: &RiskProfile) -> Vec<ExitSignal> {
    let mut signals: Vec<ExitSignal> = positions
        .iter()
        .filter_map(|position| {
            let basis = position.cost_basis?;
            if basis <= 0.0 {
                return None;
            }
            let loss_pct = (position.market_value() - basis) / basis;
            (loss_pct <= profile.max_loss).then(|| ExitSignal {
                symbol: position.symbol.to_string(),
                account_id: position.account_id.clone(),
                loss_pct,
                threshold: profile.max_loss,
            })
        })
        .collect();
    signals.sort_by(|a, b| {
        a.loss_pct
            .partial_cmp(&b.loss_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::{Currency, InstrumentClass, ProfileTemplate, ProviderKind, Symbol};

    fn position(symbol: &str, quantity: f64, unit_price: f64, basis: Option<f64>) -> Position {
        Position {
            symbol: Symbol::new(symbol),
            quantity,
            unit_price,
            currency: Currency::USD,
            cost_basis: basis,
            account_id: "acct-1".to_string(),
            provider_source: ProviderKind::NativeSchwab,
            brokerage_name: "Charles Schwab".to_string(),
            instrument_type: InstrumentClass::Equity,
        }
    }

    #[test]
    fn test_exit_signal_on_deep_loss() {
        let profile = RiskProfile::from_template(ProfileTemplate::Balanced); // max_loss -0.20
        let positions = vec![
            position("WINNER", 10.0, 150.0, Some(1000.0)),
            position("LOSER", 10.0, 50.0, Some(1000.0)), // -50%
            position("UNKNOWN", 10.0, 50.0, None),       // synthetic, skipped
        ];
        let signals = check_exit_signals(&positions, &profile);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].symbol, "LOSER");
        assert!((signals[0].loss_pct + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_signals_sorted_worst_first() {
        let profile = RiskProfile::from_template(ProfileTemplate::Balanced);
        let positions = vec![
            position("A", 10.0, 70.0, Some(1000.0)),  // -30%
            position("B", 10.0, 40.0, Some(1000.0)),  // -60%
        ];
        let signals = check_exit_signals(&positions, &profile);
        assert_eq!(signals[0].symbol, "B");
        assert_eq!(signals[1].symbol, "A");
    }
}
