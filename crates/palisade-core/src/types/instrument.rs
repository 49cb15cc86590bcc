//! Instruments, symbols, and futures contract identity.

use super::Currency;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    /// Common stock.
    Equity,
    /// Exchange-traded fund.
    Etf,
    /// Fixed income security.
    Bond,
    /// Futures contract.
    Futures,
    /// Cash or cash-equivalent (currency positions).
    Cash,
}

impl InstrumentClass {
    /// Returns true for cash and cash-equivalents.
    #[must_use]
    pub fn is_cash(&self) -> bool {
        matches!(self, InstrumentClass::Cash)
    }

    /// Lowercase label used in result payloads.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            InstrumentClass::Equity => "equity",
            InstrumentClass::Etf => "etf",
            InstrumentClass::Bond => "bond",
            InstrumentClass::Futures => "futures",
            InstrumentClass::Cash => "cash",
        }
    }
}

/// Futures asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Equity index futures (ES, NQ, ...).
    EquityIndex,
    /// Interest rate futures (ZB, ZN, ...).
    FixedIncome,
    /// Metals (GC, SI, ...).
    Metals,
    /// Energy (CL, NG, ...).
    Energy,
    /// Agricultural (ZC, ZS, ...).
    Agricultural,
    /// Currency futures (6E, 6J, ...).
    Fx,
}

impl AssetClass {
    /// Canonical asset-class label used for factor-proxy eligibility.
    ///
    /// Fixed-income futures map to `"bond"` so they join the rate-factor
    /// eligible set alongside bond ETFs.
    #[must_use]
    pub fn canonical_label(&self) -> &'static str {
        match self {
            AssetClass::EquityIndex => "equity_index",
            AssetClass::FixedIncome => "bond",
            AssetClass::Metals => "metals",
            AssetClass::Energy => "energy",
            AssetClass::Agricultural => "agricultural",
            AssetClass::Fx => "fx",
        }
    }
}

/// Immutable contract identity for a futures root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Root symbol (e.g., "ES").
    pub root: String,
    /// Contract multiplier (points to currency).
    pub multiplier: f64,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Settlement currency.
    pub currency: Currency,
    /// Listing exchange (e.g., "CME").
    pub exchange: String,
    /// Asset class of the contract.
    pub asset_class: AssetClass,
}

impl ContractSpec {
    /// Value of a single tick for one contract.
    #[must_use]
    pub fn tick_value(&self) -> f64 {
        self.tick_size * self.multiplier
    }

    /// Notional exposure of `quantity` contracts at `price`.
    #[must_use]
    pub fn notional(&self, quantity: f64, price: f64) -> f64 {
        quantity * self.multiplier * price
    }

    /// P&L for `quantity` contracts between entry and exit prices.
    #[must_use]
    pub fn pnl(&self, quantity: f64, entry: f64, exit: f64) -> f64 {
        quantity * self.multiplier * (exit - entry)
    }
}

/// A normalized instrument symbol.
///
/// The root is stored uppercased; equality and hashing are therefore
/// case-insensitive on the root plus the contract month when present.
/// Currency positions are encoded as `CUR:XXX`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    root: String,
    /// Contract month (YYYYMM) for dated futures.
    contract_month: Option<u32>,
}

impl Symbol {
    /// Creates a symbol from a root ticker, uppercasing it.
    #[must_use]
    pub fn new(root: impl AsRef<str>) -> Self {
        Self {
            root: root.as_ref().trim().to_ascii_uppercase(),
            contract_month: None,
        }
    }

    /// Creates a dated futures symbol.
    #[must_use]
    pub fn with_month(root: impl AsRef<str>, contract_month: u32) -> Self {
        Self {
            root: root.as_ref().trim().to_ascii_uppercase(),
            contract_month: Some(contract_month),
        }
    }

    /// Creates a currency-position symbol (`CUR:XXX`).
    #[must_use]
    pub fn currency(ccy: Currency) -> Self {
        Self {
            root: format!("CUR:{}", ccy.code()),
            contract_month: None,
        }
    }

    /// The uppercased root ticker.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The contract month (YYYYMM), if any.
    #[must_use]
    pub fn contract_month(&self) -> Option<u32> {
        self.contract_month
    }

    /// Returns true for `CUR:XXX` symbols.
    #[must_use]
    pub fn is_currency(&self) -> bool {
        self.root.starts_with("CUR:")
    }

    /// For `CUR:XXX` symbols, the currency code after the prefix.
    #[must_use]
    pub fn currency_code(&self) -> Option<&str> {
        self.root.strip_prefix("CUR:")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.contract_month {
            Some(month) => write!(f, "{}:{}", self.root, month),
            None => write!(f, "{}", self.root),
        }
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An instrument: a symbol plus its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// The normalized symbol.
    pub symbol: Symbol,
    /// Instrument classification.
    pub class: InstrumentClass,
    /// Contract identity for futures; `None` otherwise.
    pub contract: Option<ContractSpec>,
}

impl Instrument {
    /// Creates a non-futures instrument.
    #[must_use]
    pub fn new(symbol: Symbol, class: InstrumentClass) -> Self {
        Self {
            symbol,
            class,
            contract: None,
        }
    }

    /// Creates a futures instrument with its contract identity.
    #[must_use]
    pub fn futures(symbol: Symbol, contract: ContractSpec) -> Self {
        Self {
            symbol,
            class: InstrumentClass::Futures,
            contract: Some(contract),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_case_insensitive() {
        assert_eq!(Symbol::new("aapl"), Symbol::new("AAPL"));
        assert_eq!(Symbol::new(" es "), Symbol::new("ES"));
    }

    #[test]
    fn test_symbol_contract_month_identity() {
        let front = Symbol::with_month("es", 202603);
        let back = Symbol::with_month("ES", 202606);
        assert_ne!(front, back);
        assert_eq!(front, Symbol::with_month("Es", 202603));
    }

    #[test]
    fn test_currency_symbol() {
        let sym = Symbol::currency(Currency::CAD);
        assert!(sym.is_currency());
        assert_eq!(sym.currency_code(), Some("CAD"));
        assert_eq!(sym.to_string(), "CUR:CAD");
    }

    #[test]
    fn test_contract_spec_economics() {
        let es = ContractSpec {
            root: "ES".to_string(),
            multiplier: 50.0,
            tick_size: 0.25,
            currency: Currency::USD,
            exchange: "CME".to_string(),
            asset_class: AssetClass::EquityIndex,
        };
        assert!((es.tick_value() - 12.50).abs() < 1e-12);
        assert!((es.notional(2.0, 5600.0) - 560_000.0).abs() < 1e-9);
        assert!((es.pnl(2.0, 5600.0, 5610.0) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_income_canonical_label() {
        assert_eq!(AssetClass::FixedIncome.canonical_label(), "bond");
        assert_eq!(AssetClass::Metals.canonical_label(), "metals");
    }
}
