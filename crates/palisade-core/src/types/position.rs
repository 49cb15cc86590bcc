//! Broker-reported positions.

use super::{Currency, InstrumentClass, ProviderKind, Symbol};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// A single position reported by one provider for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Signed quantity (negative for shorts).
    pub quantity: f64,
    /// Per-unit price in the position currency.
    pub unit_price: f64,
    /// Position currency.
    pub currency: Currency,
    /// Provider-reported cost basis; `None` marks the position synthetic.
    pub cost_basis: Option<f64>,
    /// Owning account identifier.
    pub account_id: String,
    /// Source that reported this row.
    pub provider_source: ProviderKind,
    /// Human-readable brokerage name (e.g., "Charles Schwab").
    pub brokerage_name: String,
    /// Instrument classification.
    pub instrument_type: InstrumentClass,
}

impl Position {
    /// Market value in the position currency.
    ///
    /// For futures this is the broker-reported margin value, not the
    /// notional exposure.
    #[must_use]
    pub fn market_value(&self) -> f64 {
        self.quantity * self.unit_price
    }

    /// True when the provider did not report a cost basis.
    ///
    /// Synthetic positions are flagged in data-quality output and excluded
    /// from some realized metrics.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.cost_basis.is_none()
    }

    /// Validates the position invariant `|quantity| > 0`.
    ///
    /// # Errors
    ///
    /// Returns an error for zero or non-finite quantities.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.quantity.is_finite() || self.quantity == 0.0 {
            return Err(CoreError::invalid_position(
                self.symbol.to_string(),
                format!("quantity must be non-zero and finite, got {}", self.quantity),
            ));
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(CoreError::invalid_position(
                self.symbol.to_string(),
                format!("unit price must be non-negative, got {}", self.unit_price),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl(quantity: f64) -> Position {
        Position {
            symbol: Symbol::new("AAPL"),
            quantity,
            unit_price: 255.0,
            currency: Currency::USD,
            cost_basis: Some(21_000.0),
            account_id: "acct-1".to_string(),
            provider_source: ProviderKind::NativeSchwab,
            brokerage_name: "Charles Schwab".to_string(),
            instrument_type: InstrumentClass::Equity,
        }
    }

    #[test]
    fn test_market_value() {
        assert!((aapl(100.0).market_value() - 25_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_quantity_invalid() {
        assert!(aapl(0.0).validate().is_err());
        assert!(aapl(100.0).validate().is_ok());
        assert!(aapl(-5.0).validate().is_ok());
    }

    #[test]
    fn test_synthetic_flag() {
        let mut pos = aapl(10.0);
        assert!(!pos.is_synthetic());
        pos.cost_basis = None;
        assert!(pos.is_synthetic());
    }
}
