//! Factor-proxy assignment.
//!
//! Every non-cash canonical position receives a set of liquid proxy
//! tickers, one per factor it is exposed to. Equities and ETFs get the
//! full equity factor set; futures get asset-class-specific proxies only,
//! so equity noise never contaminates a commodity decomposition.

use crate::error::{FactorError, FactorResult};
use palisade_providers::{CanonicalPortfolio, CanonicalPosition};
use palisade_core::InstrumentClass;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Proxy tickers for one asset, keyed by factor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorProxies {
    /// Market factor proxy.
    pub market: Option<String>,
    /// Momentum factor proxy.
    pub momentum: Option<String>,
    /// Value factor proxy.
    pub value: Option<String>,
    /// Industry factor proxy.
    pub industry: Option<String>,
    /// Subindustry peer composite (averaged when more than one).
    pub subindustry: Vec<String>,
    /// Commodity factor proxy (futures only).
    pub commodity: Option<String>,
    /// Rate factor proxy (rate-eligible asset classes only).
    pub rate: Option<String>,
}

impl FactorProxies {
    /// True when no factor has a proxy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.market.is_none()
            && self.momentum.is_none()
            && self.value.is_none()
            && self.industry.is_none()
            && self.subindustry.is_empty()
            && self.commodity.is_none()
            && self.rate.is_none()
    }

    /// Distinct proxy tickers across all factors.
    #[must_use]
    pub fn tickers(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for ticker in [
            &self.market,
            &self.momentum,
            &self.value,
            &self.industry,
            &self.commodity,
            &self.rate,
        ]
        .into_iter()
        .flatten()
        {
            out.insert(ticker.clone());
        }
        for ticker in &self.subindustry {
            out.insert(ticker.clone());
        }
        out
    }
}

/// Proxy assignment configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Market factor proxy ticker.
    pub market: String,
    /// Momentum factor proxy ticker.
    pub momentum: String,
    /// Value factor proxy ticker.
    pub value: String,
    /// Rate factor proxy ticker.
    pub rate: String,
    /// Industry ETF per symbol; falls back to `default_industry`.
    pub industry_map: HashMap<String, String>,
    /// Industry proxy for symbols missing from the map.
    pub default_industry: String,
    /// Subindustry peer composites per symbol.
    pub subindustry_map: HashMap<String, Vec<String>>,
    /// Commodity proxy per futures asset-class label.
    pub commodity_map: HashMap<String, String>,
    /// Canonical asset-class overrides (e.g., VNQ -> "real_estate").
    pub asset_class_overrides: HashMap<String, String>,
    /// Asset classes eligible for the rate factor.
    pub rate_factor_classes: BTreeSet<String>,
}

impl ProxyConfig {
    /// Standard configuration with the fixed factor set.
    #[must_use]
    pub fn standard() -> Self {
        let mut commodity_map = HashMap::new();
        commodity_map.insert("metals".to_string(), "GLD".to_string());
        commodity_map.insert("energy".to_string(), "USO".to_string());
        commodity_map.insert("agricultural".to_string(), "DBA".to_string());
        commodity_map.insert("fx".to_string(), "UUP".to_string());

        let mut industry_map = HashMap::new();
        for (symbol, etf) in [
            ("AAPL", "XLK"),
            ("MSFT", "XLK"),
            ("NVDA", "SMH"),
            ("GOOGL", "XLC"),
            ("AMZN", "XLY"),
            ("TSLA", "XLY"),
            ("JPM", "XLF"),
            ("XOM", "XLE"),
            ("UNH", "XLV"),
        ] {
            industry_map.insert(symbol.to_string(), etf.to_string());
        }

        let mut asset_class_overrides = HashMap::new();
        asset_class_overrides.insert("VNQ".to_string(), "real_estate".to_string());
        asset_class_overrides.insert("IYR".to_string(), "real_estate".to_string());

        Self {
            market: "SPY".to_string(),
            momentum: "MTUM".to_string(),
            value: "VTV".to_string(),
            rate: "IEF".to_string(),
            industry_map,
            default_industry: "VTI".to_string(),
            subindustry_map: HashMap::new(),
            commodity_map,
            asset_class_overrides,
            rate_factor_classes: ["bond", "real_estate"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    fn rate_eligible(&self, class_label: &str) -> bool {
        self.rate_factor_classes.contains(class_label)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::standard()
    }
}

fn class_label(position: &CanonicalPosition, config: &ProxyConfig) -> String {
    if let Some(label) = config.asset_class_overrides.get(position.symbol.root()) {
        return label.clone();
    }
    if let Some(label) = &position.asset_class {
        return label.clone();
    }
    position.classification.label().to_string()
}

fn proxies_for(position: &CanonicalPosition, config: &ProxyConfig) -> FactorProxies {
    let label = class_label(position, config);

    match position.classification {
        InstrumentClass::Futures => {
            // Asset-class proxies only; never the equity factor set.
            let mut proxies = FactorProxies::default();
            match label.as_str() {
                "equity_index" => proxies.market = Some(config.market.clone()),
                "bond" => proxies.rate = Some(config.rate.clone()),
                other => {
                    proxies.commodity = config.commodity_map.get(other).cloned();
                    if proxies.commodity.is_none() {
                        proxies.market = Some(config.market.clone());
                    }
                }
            }
            proxies
        }
        InstrumentClass::Bond => FactorProxies {
            market: Some(config.market.clone()),
            rate: config.rate_eligible(&label).then(|| config.rate.clone()),
            ..FactorProxies::default()
        },
        _ => {
            let root = position.symbol.root();
            FactorProxies {
                market: Some(config.market.clone()),
                momentum: Some(config.momentum.clone()),
                value: Some(config.value.clone()),
                industry: Some(
                    config
                        .industry_map
                        .get(root)
                        .cloned()
                        .unwrap_or_else(|| config.default_industry.clone()),
                ),
                subindustry: config.subindustry_map.get(root).cloned().unwrap_or_default(),
                commodity: None,
                rate: config
                    .rate_eligible(&label)
                    .then(|| config.rate.clone()),
            }
        }
    }
}

/// Assigns factor proxies to every non-cash position of a canonical
/// portfolio.
///
/// # Errors
///
/// Returns an error if any non-cash symbol would end up with an empty
/// proxy set (the canonical-portfolio invariant).
pub fn assign_proxies(
    portfolio: &CanonicalPortfolio,
    config: &ProxyConfig,
) -> FactorResult<BTreeMap<String, FactorProxies>> {
    let mut out = BTreeMap::new();
    for position in portfolio.non_cash() {
        let proxies = proxies_for(position, config);
        if proxies.is_empty() {
            return Err(FactorError::EmptyProxies {
                symbol: position.symbol.to_string(),
            });
        }
        out.insert(position.symbol.to_string(), proxies);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use palisade_core::{Currency, ProviderKind, Symbol};
    use palisade_providers::{DataQuality, Scope};
    use std::collections::BTreeMap as Map;

    fn canonical(symbol: Symbol, classification: InstrumentClass, asset_class: Option<&str>) -> CanonicalPosition {
        CanonicalPosition {
            symbol,
            quantity: 1.0,
            margin_value: 100.0,
            notional_value: 100.0,
            weight_by_notional: 1.0,
            currency: Currency::USD,
            classification,
            asset_class: asset_class.map(String::from),
            cash_proxy: None,
            provider_source: ProviderKind::NativeSchwab,
            accounts: Default::default(),
            synthetic: false,
        }
    }

    fn portfolio(positions: Vec<CanonicalPosition>) -> CanonicalPortfolio {
        let positions: Map<String, CanonicalPosition> = positions
            .into_iter()
            .map(|p| (p.symbol.to_string(), p))
            .collect();
        CanonicalPortfolio {
            as_of: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            scope: Scope::All,
            margin_total: 100.0,
            gross_notional: 100.0,
            notional_leverage: 1.0,
            positions,
            data_quality: DataQuality::default(),
        }
    }

    #[test]
    fn test_equity_gets_full_set() {
        let p = portfolio(vec![canonical(Symbol::new("AAPL"), InstrumentClass::Equity, None)]);
        let proxies = assign_proxies(&p, &ProxyConfig::standard()).unwrap();
        let aapl = &proxies["AAPL"];
        assert_eq!(aapl.market.as_deref(), Some("SPY"));
        assert_eq!(aapl.momentum.as_deref(), Some("MTUM"));
        assert_eq!(aapl.value.as_deref(), Some("VTV"));
        assert_eq!(aapl.industry.as_deref(), Some("XLK"));
        assert!(aapl.rate.is_none());
        assert!(aapl.commodity.is_none());
    }

    #[test]
    fn test_metals_futures_get_commodity_only() {
        let p = portfolio(vec![canonical(
            Symbol::with_month("GC", 202606),
            InstrumentClass::Futures,
            Some("metals"),
        )]);
        let proxies = assign_proxies(&p, &ProxyConfig::standard()).unwrap();
        let gc = &proxies["GC:202606"];
        assert_eq!(gc.commodity.as_deref(), Some("GLD"));
        assert!(gc.market.is_none());
        assert!(gc.momentum.is_none());
        assert!(gc.value.is_none());
        assert!(gc.industry.is_none());
    }

    #[test]
    fn test_energy_futures_get_uso() {
        let p = portfolio(vec![canonical(
            Symbol::with_month("CL", 202606),
            InstrumentClass::Futures,
            Some("energy"),
        )]);
        let proxies = assign_proxies(&p, &ProxyConfig::standard()).unwrap();
        assert_eq!(proxies["CL:202606"].commodity.as_deref(), Some("USO"));
    }

    #[test]
    fn test_fixed_income_futures_rate_eligible() {
        let p = portfolio(vec![canonical(
            Symbol::with_month("ZN", 202606),
            InstrumentClass::Futures,
            Some("bond"),
        )]);
        let proxies = assign_proxies(&p, &ProxyConfig::standard()).unwrap();
        let zn = &proxies["ZN:202606"];
        assert_eq!(zn.rate.as_deref(), Some("IEF"));
        assert!(zn.market.is_none());
    }

    #[test]
    fn test_real_estate_override_rate_eligible() {
        let p = portfolio(vec![canonical(Symbol::new("VNQ"), InstrumentClass::Etf, None)]);
        let proxies = assign_proxies(&p, &ProxyConfig::standard()).unwrap();
        assert_eq!(proxies["VNQ"].rate.as_deref(), Some("IEF"));
    }

    #[test]
    fn test_rate_eligibility_configurable() {
        let mut config = ProxyConfig::standard();
        config.rate_factor_classes.remove("real_estate");
        let p = portfolio(vec![canonical(Symbol::new("VNQ"), InstrumentClass::Etf, None)]);
        let proxies = assign_proxies(&p, &config).unwrap();
        assert!(proxies["VNQ"].rate.is_none());
    }
}
