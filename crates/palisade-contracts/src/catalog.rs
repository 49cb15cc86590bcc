//! Static registry of futures contract specifications.
//!
//! The catalog is loaded once at process start (built-in defaults, optionally
//! overlaid from TOML) and treated as immutable thereafter.

use crate::error::{ContractError, ContractResult};
use palisade_core::{AssetClass, ContractSpec, Currency};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Registry of contract specifications keyed by uppercased root symbol.
#[derive(Debug, Clone)]
pub struct ContractCatalog {
    contracts: BTreeMap<String, ContractSpec>,
}

impl ContractCatalog {
    /// Builds an empty catalog.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            contracts: BTreeMap::new(),
        }
    }

    /// Builds the catalog with the standard CME/CBOT/COMEX/NYMEX roots.
    #[must_use]
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        for spec in standard_contracts() {
            catalog.register(spec);
        }
        catalog
    }

    /// Overlays entries parsed from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a config error when the document does not parse.
    pub fn with_toml(mut self, document: &str) -> ContractResult<Self> {
        let parsed: CatalogFile = toml::from_str(document).map_err(|e| ContractError::Config {
            reason: e.to_string(),
        })?;
        for entry in parsed.contracts {
            self.register(entry.into_spec()?);
        }
        Ok(self)
    }

    /// Registers (or replaces) a contract specification.
    pub fn register(&mut self, spec: ContractSpec) {
        self.contracts.insert(spec.root.to_ascii_uppercase(), spec);
    }

    /// Looks up a root symbol; `None` for unknown symbols.
    ///
    /// Callers must surface a clear error for `None` rather than guessing
    /// a multiplier.
    #[must_use]
    pub fn lookup(&self, symbol: &str) -> Option<&ContractSpec> {
        self.contracts.get(&symbol.trim().to_ascii_uppercase())
    }

    /// Number of registered roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// True when no contracts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Iterates all registered specifications.
    pub fn iter(&self) -> impl Iterator<Item = &ContractSpec> {
        self.contracts.values()
    }
}

impl Default for ContractCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    contracts: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    root: String,
    multiplier: f64,
    tick_size: f64,
    #[serde(default = "default_currency")]
    currency: String,
    exchange: String,
    asset_class: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl CatalogEntry {
    fn into_spec(self) -> ContractResult<ContractSpec> {
        let currency: Currency = self.currency.parse().map_err(|_| ContractError::Config {
            reason: format!("unknown currency '{}' for '{}'", self.currency, self.root),
        })?;
        let asset_class = match self.asset_class.as_str() {
            "equity_index" => AssetClass::EquityIndex,
            "fixed_income" => AssetClass::FixedIncome,
            "metals" => AssetClass::Metals,
            "energy" => AssetClass::Energy,
            "agricultural" => AssetClass::Agricultural,
            "fx" => AssetClass::Fx,
            other => {
                return Err(ContractError::Config {
                    reason: format!("unknown asset class '{}' for '{}'", other, self.root),
                })
            }
        };
        Ok(ContractSpec {
            root: self.root,
            multiplier: self.multiplier,
            tick_size: self.tick_size,
            currency,
            exchange: self.exchange,
            asset_class,
        })
    }
}

fn standard_contracts() -> Vec<ContractSpec> {
    fn spec(
        root: &str,
        multiplier: f64,
        tick_size: f64,
        exchange: &str,
        asset_class: AssetClass,
    ) -> ContractSpec {
        ContractSpec {
            root: root.to_string(),
            multiplier,
            tick_size,
            currency: Currency::USD,
            exchange: exchange.to_string(),
            asset_class,
        }
    }

    vec![
        // Equity index
        spec("ES", 50.0, 0.25, "CME", AssetClass::EquityIndex),
        spec("MES", 5.0, 0.25, "CME", AssetClass::EquityIndex),
        spec("NQ", 20.0, 0.25, "CME", AssetClass::EquityIndex),
        spec("MNQ", 2.0, 0.25, "CME", AssetClass::EquityIndex),
        spec("RTY", 50.0, 0.10, "CME", AssetClass::EquityIndex),
        spec("YM", 5.0, 1.0, "CBOT", AssetClass::EquityIndex),
        // Fixed income
        spec("ZB", 1000.0, 0.03125, "CBOT", AssetClass::FixedIncome),
        spec("ZN", 1000.0, 0.015625, "CBOT", AssetClass::FixedIncome),
        spec("ZF", 1000.0, 0.0078125, "CBOT", AssetClass::FixedIncome),
        spec("ZT", 2000.0, 0.00390625, "CBOT", AssetClass::FixedIncome),
        // Metals
        spec("GC", 100.0, 0.10, "COMEX", AssetClass::Metals),
        spec("MGC", 10.0, 0.10, "COMEX", AssetClass::Metals),
        spec("SI", 5000.0, 0.005, "COMEX", AssetClass::Metals),
        spec("HG", 25000.0, 0.0005, "COMEX", AssetClass::Metals),
        // Energy
        spec("CL", 1000.0, 0.01, "NYMEX", AssetClass::Energy),
        spec("MCL", 100.0, 0.01, "NYMEX", AssetClass::Energy),
        spec("NG", 10000.0, 0.001, "NYMEX", AssetClass::Energy),
        // Agricultural
        spec("ZC", 50.0, 0.25, "CBOT", AssetClass::Agricultural),
        spec("ZS", 50.0, 0.25, "CBOT", AssetClass::Agricultural),
        spec("ZW", 50.0, 0.25, "CBOT", AssetClass::Agricultural),
        // FX
        spec("6E", 125_000.0, 0.00005, "CME", AssetClass::Fx),
        spec("6J", 12_500_000.0, 0.0000005, "CME", AssetClass::Fx),
        spec("6B", 62_500.0, 0.0001, "CME", AssetClass::Fx),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        let catalog = ContractCatalog::standard();
        let es = catalog.lookup("es").unwrap();
        assert!((es.multiplier - 50.0).abs() < 1e-12);
        assert!((es.tick_value() - 12.50).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_symbol_is_none() {
        let catalog = ContractCatalog::standard();
        assert!(catalog.lookup("UNKNOWN").is_none());
    }

    #[test]
    fn test_fixed_income_roots_present() {
        let catalog = ContractCatalog::standard();
        for root in ["ZB", "ZN", "ZF", "ZT"] {
            assert_eq!(
                catalog.lookup(root).unwrap().asset_class,
                AssetClass::FixedIncome
            );
        }
    }

    #[test]
    fn test_toml_overlay() {
        let doc = r#"
            [[contracts]]
            root = "VX"
            multiplier = 1000.0
            tick_size = 0.05
            exchange = "CFE"
            asset_class = "equity_index"
        "#;
        let catalog = ContractCatalog::standard().with_toml(doc).unwrap();
        assert!(catalog.lookup("VX").is_some());
    }

    #[test]
    fn test_toml_unknown_asset_class_rejected() {
        let doc = r#"
            [[contracts]]
            root = "XX"
            multiplier = 1.0
            tick_size = 0.01
            exchange = "TEST"
            asset_class = "crypto"
        "#;
        assert!(ContractCatalog::standard().with_toml(doc).is_err());
    }
}
