//! Position canonicalizer.
//!
//! Merges the union of normalized positions from all enabled providers
//! into a single canonical portfolio for a requested scope, resolving
//! duplicate symbols under native-over-aggregator authority and deriving
//! notional exposure for futures.

use crate::error::{ProviderError, ProviderResult};
use crate::normalize::CashMap;
use chrono::NaiveDate;
use palisade_contracts::ContractCatalog;
use palisade_core::{Currency, InstrumentClass, Position, ProviderKind, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Which slice of the merged position universe a caller wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Scope {
    /// Every source together.
    All,
    /// One provider's view.
    Provider(ProviderKind),
    /// One institution by brokerage name.
    Institution(String),
    /// One account.
    Account(String),
}

impl Scope {
    fn matches(&self, position: &Position) -> bool {
        match self {
            Scope::All => true,
            Scope::Provider(kind) => position.provider_source == *kind,
            Scope::Institution(name) => position.brokerage_name.eq_ignore_ascii_case(name),
            Scope::Account(id) => position.account_id == *id,
        }
    }
}

/// Canonicalizer configuration.
#[derive(Debug, Clone)]
pub struct CanonicalizerConfig {
    /// Permit negative weights (short positions).
    pub allow_short: bool,
    /// Tolerance on the non-cash weight sum.
    pub weight_tolerance: f64,
    /// Cash currency to proxy-ETF mapping.
    pub cash_map: CashMap,
}

impl Default for CanonicalizerConfig {
    fn default() -> Self {
        Self {
            allow_short: true,
            weight_tolerance: 1e-6,
            cash_map: CashMap::standard(),
        }
    }
}

/// One merged canonical position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPosition {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Merged signed quantity.
    pub quantity: f64,
    /// Broker-reported value (quantity × unit price); the NAV contribution.
    pub margin_value: f64,
    /// Economic exposure; `quantity × price × multiplier` for futures,
    /// equal to `margin_value` otherwise.
    pub notional_value: f64,
    /// Signed weight against the gross non-cash notional.
    pub weight_by_notional: f64,
    /// Position currency.
    pub currency: Currency,
    /// Instrument classification.
    pub classification: InstrumentClass,
    /// Canonical asset-class label for futures ("bond" for fixed income),
    /// `None` for non-futures.
    pub asset_class: Option<String>,
    /// Cash-proxy ETF for cash positions.
    pub cash_proxy: Option<Symbol>,
    /// Source whose rows survived authority resolution.
    pub provider_source: ProviderKind,
    /// Accounts contributing to the merged quantity.
    pub accounts: BTreeSet<String>,
    /// True when any contributing row lacked a cost basis.
    pub synthetic: bool,
}

/// Data-quality findings accumulated across the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Symbols excluded from this scope by cross-source ambiguity or
    /// aggregator mirroring.
    pub cross_source_leakage: Vec<String>,
    /// Providers that failed to deliver and were excluded.
    pub excluded_sources: Vec<String>,
    /// Positions carried without a provider cost basis.
    pub synthetic_positions: usize,
    /// Symbols excluded from factor regression for missing prices.
    pub missing_prices: Vec<String>,
}

impl DataQuality {
    /// True when nothing was excluded or degraded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.cross_source_leakage.is_empty()
            && self.excluded_sources.is_empty()
            && self.synthetic_positions == 0
            && self.missing_prices.is_empty()
    }
}

/// The canonical portfolio for one user, scope, and as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPortfolio {
    /// As-of date of the snapshot.
    pub as_of: NaiveDate,
    /// Scope the portfolio was built for.
    pub scope: Scope,
    /// Canonical positions keyed by symbol string.
    pub positions: BTreeMap<String, CanonicalPosition>,
    /// Σ margin value over every included position; this is the NAV.
    pub margin_total: f64,
    /// Σ |notional| over non-cash positions.
    pub gross_notional: f64,
    /// `gross_notional / margin_total`; exactly 1.0 when no futures are
    /// present.
    pub notional_leverage: f64,
    /// Data-quality findings.
    pub data_quality: DataQuality,
}

impl CanonicalPortfolio {
    /// Non-cash positions in symbol order.
    pub fn non_cash(&self) -> impl Iterator<Item = &CanonicalPosition> {
        self.positions
            .values()
            .filter(|p| !p.classification.is_cash())
    }

    /// True when any position is a futures contract.
    #[must_use]
    pub fn has_futures(&self) -> bool {
        self.positions
            .values()
            .any(|p| p.classification == InstrumentClass::Futures)
    }

    /// Signed non-cash weights keyed by symbol string.
    #[must_use]
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.non_cash()
            .map(|p| (p.symbol.to_string(), p.weight_by_notional))
            .collect()
    }
}

enum Authority {
    /// Single source (or manual-only): include rows subject to scope.
    Include,
    /// One native + aggregator mirrors: only the native's rows count.
    NativeWins(ProviderKind),
    /// Two natives, two aggregators, or an unknown source in the mix.
    Ambiguous,
}

fn resolve_authority(sources: &BTreeSet<ProviderKind>) -> Authority {
    if sources.len() <= 1 {
        return Authority::Include;
    }
    let has_unknown = sources.iter().any(|s| !s.is_native() && !s.is_aggregator());
    let natives: Vec<ProviderKind> = sources.iter().filter(|s| s.is_native()).copied().collect();
    if !has_unknown && natives.len() == 1 {
        Authority::NativeWins(natives[0])
    } else {
        Authority::Ambiguous
    }
}

/// Builds the canonical portfolio for a scope from the union of
/// normalized positions across all enabled providers.
///
/// # Errors
///
/// Fatal conditions: non-positive NAV, negative weights without the
/// short-permitted flag, a cash position whose currency has no proxy
/// mapping, or a futures position missing from the contract catalog.
pub fn canonicalize(
    positions: &[Position],
    catalog: &ContractCatalog,
    scope: &Scope,
    config: &CanonicalizerConfig,
    as_of: NaiveDate,
) -> ProviderResult<CanonicalPortfolio> {
    // Group rows by symbol identity across every source.
    let mut by_symbol: BTreeMap<String, Vec<&Position>> = BTreeMap::new();
    for position in positions {
        if position.quantity == 0.0 {
            continue;
        }
        by_symbol
            .entry(position.symbol.to_string())
            .or_default()
            .push(position);
    }

    let mut canonical: BTreeMap<String, CanonicalPosition> = BTreeMap::new();
    let mut leakage: Vec<String> = Vec::new();

    for (key, rows) in &by_symbol {
        let sources: BTreeSet<ProviderKind> =
            rows.iter().map(|p| p.provider_source).collect();

        let included: Vec<&&Position> = match resolve_authority(&sources) {
            Authority::Include => rows.iter().filter(|p| scope.matches(p)).collect(),
            Authority::NativeWins(native) => {
                let native_rows: Vec<&&Position> = rows
                    .iter()
                    .filter(|p| p.provider_source == native && scope.matches(p))
                    .collect();
                if native_rows.is_empty() && rows.iter().any(|p| scope.matches(p)) {
                    // Visible in this scope only through an aggregator
                    // mirror of a natively-held position.
                    debug!(symbol = %key, ?scope, "excluding aggregator mirror");
                    leakage.push(key.clone());
                }
                native_rows
            }
            Authority::Ambiguous => {
                if rows.iter().any(|p| scope.matches(p)) {
                    warn!(symbol = %key, "cross-source ambiguity, excluding from every scope");
                    leakage.push(key.clone());
                }
                continue;
            }
        };

        if included.is_empty() {
            continue;
        }

        let merged = merge_rows(key, &included, catalog, &config.cash_map)?;
        canonical.insert(key.clone(), merged);
    }

    finish(canonical, leakage, scope.clone(), config, as_of)
}

fn merge_rows(
    key: &str,
    rows: &[&&Position],
    catalog: &ContractCatalog,
    cash_map: &CashMap,
) -> ProviderResult<CanonicalPosition> {
    let first = rows[0];
    let classification = first.instrument_type;
    let quantity: f64 = rows.iter().map(|p| p.quantity).sum();
    let margin_value: f64 = rows.iter().map(|p| p.market_value()).sum();
    let accounts: BTreeSet<String> = rows.iter().map(|p| p.account_id.clone()).collect();
    let synthetic = rows.iter().any(|p| p.is_synthetic());

    let (notional_value, asset_class, cash_proxy) = match classification {
        InstrumentClass::Futures => {
            let spec = catalog
                .lookup(first.symbol.root())
                .ok_or_else(|| ProviderError::UnknownContract {
                    symbol: first.symbol.root().to_string(),
                })?;
            let notional: f64 = rows
                .iter()
                .map(|p| spec.notional(p.quantity, p.unit_price))
                .sum();
            (
                notional,
                Some(spec.asset_class.canonical_label().to_string()),
                None,
            )
        }
        InstrumentClass::Cash => {
            let proxy = cash_map.proxy(first.currency)?.clone();
            (0.0, None, Some(proxy))
        }
        _ => (margin_value, None, None),
    };

    Ok(CanonicalPosition {
        symbol: first.symbol.clone(),
        quantity,
        margin_value,
        notional_value,
        weight_by_notional: 0.0,
        currency: first.currency,
        classification,
        asset_class,
        cash_proxy,
        provider_source: first.provider_source,
        accounts,
        synthetic,
    })
    .map(|p| {
        debug_assert_eq!(p.symbol.to_string(), key);
        p
    })
}

fn finish(
    mut canonical: BTreeMap<String, CanonicalPosition>,
    mut leakage: Vec<String>,
    scope: Scope,
    config: &CanonicalizerConfig,
    as_of: NaiveDate,
) -> ProviderResult<CanonicalPortfolio> {
    leakage.sort();
    leakage.dedup();

    let margin_total: f64 = canonical.values().map(|p| p.margin_value).sum();
    let gross_notional: f64 = canonical
        .values()
        .filter(|p| !p.classification.is_cash())
        .map(|p| p.notional_value.abs())
        .sum();

    if !canonical.is_empty() && margin_total <= 0.0 {
        return Err(ProviderError::InvalidWeights {
            reason: format!("non-positive portfolio NAV {margin_total}"),
        });
    }

    if gross_notional > 0.0 {
        for position in canonical.values_mut() {
            if position.classification.is_cash() {
                continue;
            }
            position.weight_by_notional = position.notional_value / gross_notional;
            if !config.allow_short && position.weight_by_notional < 0.0 {
                return Err(ProviderError::InvalidWeights {
                    reason: format!(
                        "negative weight for '{}' without short-permitted flag",
                        position.symbol
                    ),
                });
            }
        }

        let signed_sum: f64 = canonical
            .values()
            .filter(|p| !p.classification.is_cash())
            .map(|p| p.weight_by_notional)
            .sum();
        let has_short = canonical.values().any(|p| p.weight_by_notional < 0.0);
        if !has_short && (signed_sum - 1.0).abs() > config.weight_tolerance {
            return Err(ProviderError::InvalidWeights {
                reason: format!("non-cash weights sum to {signed_sum}, expected 1.0"),
            });
        }
    }

    let has_futures = canonical
        .values()
        .any(|p| p.classification == InstrumentClass::Futures);
    let notional_leverage = if !has_futures || margin_total <= 0.0 {
        1.0
    } else {
        gross_notional / margin_total
    };

    let synthetic_positions = canonical.values().filter(|p| p.synthetic).count();

    Ok(CanonicalPortfolio {
        as_of,
        scope,
        positions: canonical,
        margin_total,
        gross_notional,
        notional_leverage,
        data_quality: DataQuality {
            cross_source_leakage: leakage,
            excluded_sources: Vec::new(),
            synthetic_positions,
            missing_prices: Vec::new(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::Currency;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    fn position(
        ticker: &str,
        quantity: f64,
        unit_price: f64,
        source: ProviderKind,
        account: &str,
    ) -> Position {
        Position {
            symbol: Symbol::new(ticker),
            quantity,
            unit_price,
            currency: Currency::USD,
            cost_basis: Some(quantity * unit_price),
            account_id: account.to_string(),
            provider_source: source,
            brokerage_name: match source {
                ProviderKind::NativeSchwab => "Charles Schwab",
                ProviderKind::NativeIbkr => "Interactive Brokers",
                _ => "Mirror",
            }
            .to_string(),
            instrument_type: InstrumentClass::Equity,
        }
    }

    fn futures_position(
        root: &str,
        month: u32,
        quantity: f64,
        unit_price: f64,
        account: &str,
    ) -> Position {
        Position {
            symbol: Symbol::with_month(root, month),
            quantity,
            unit_price,
            currency: Currency::USD,
            cost_basis: Some(0.0),
            account_id: account.to_string(),
            provider_source: ProviderKind::NativeIbkr,
            brokerage_name: "Interactive Brokers".to_string(),
            instrument_type: InstrumentClass::Futures,
        }
    }

    fn run(positions: &[Position], scope: Scope) -> ProviderResult<CanonicalPortfolio> {
        canonicalize(
            positions,
            &ContractCatalog::standard(),
            &scope,
            &CanonicalizerConfig::default(),
            as_of(),
        )
    }

    #[test]
    fn test_native_over_aggregator() {
        // Same holding mirrored by Plaid with a stale quantity.
        let positions = vec![
            position("DSU", 2551.0, 10.0, ProviderKind::NativeSchwab, "schwab-1"),
            position("DSU", 4500.0, 10.0, ProviderKind::AggregatorPlaid, "plaid-1"),
        ];

        let native = run(&positions, Scope::Provider(ProviderKind::NativeSchwab)).unwrap();
        let dsu = native.positions.get("DSU").unwrap();
        assert!((dsu.quantity - 2551.0).abs() < 1e-9);
        assert!(native.data_quality.cross_source_leakage.is_empty());

        let mirror = run(&positions, Scope::Provider(ProviderKind::AggregatorPlaid)).unwrap();
        assert!(mirror.positions.get("DSU").is_none());
        assert_eq!(mirror.data_quality.cross_source_leakage, vec!["DSU".to_string()]);
    }

    #[test]
    fn test_two_natives_is_ambiguous() {
        let positions = vec![
            position("SPY", 10.0, 500.0, ProviderKind::NativeSchwab, "schwab-1"),
            position("SPY", 5.0, 500.0, ProviderKind::NativeIbkr, "ibkr-1"),
        ];
        let scoped = run(&positions, Scope::Provider(ProviderKind::NativeSchwab)).unwrap();
        assert!(scoped.positions.get("SPY").is_none());
        assert_eq!(scoped.data_quality.cross_source_leakage, vec!["SPY".to_string()]);

        let all = run(&positions, Scope::All).unwrap();
        assert!(all.positions.get("SPY").is_none());
    }

    #[test]
    fn test_single_source_included() {
        let positions = vec![position("AAPL", 100.0, 255.0, ProviderKind::NativeSchwab, "s1")];
        let portfolio = run(&positions, Scope::All).unwrap();
        let aapl = portfolio.positions.get("AAPL").unwrap();
        assert!((aapl.weight_by_notional - 1.0).abs() < 1e-9);
        assert!((portfolio.notional_leverage - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_futures_notional_and_leverage() {
        // 2 ES at 5600 with multiplier 50 is 560k notional; with margin
        // carried by the 25.5k equity sleeve, leverage is 585.5/25.5.
        let positions = vec![
            position("AAPL", 100.0, 255.0, ProviderKind::NativeIbkr, "ibkr-1"),
            futures_position("ES", 202603, 2.0, 5600.0, "ibkr-1"),
        ];
        let portfolio = run(&positions, Scope::All).unwrap();
        let es = portfolio.positions.get("ES:202603").unwrap();
        assert!((es.notional_value - 560_000.0).abs() < 1e-6);
        assert!((portfolio.margin_total - 25_500.0).abs() < 1e-6);
        assert!((portfolio.gross_notional - 585_500.0).abs() < 1e-6);
        assert!((portfolio.notional_leverage - 585_500.0 / 25_500.0).abs() < 1e-9);
        assert!(portfolio.notional_leverage >= 1.0);
    }

    #[test]
    fn test_fixed_income_futures_mapped_to_bond() {
        let positions = vec![
            position("AAPL", 100.0, 255.0, ProviderKind::NativeIbkr, "ibkr-1"),
            futures_position("ZN", 202603, 1.0, 112.0, "ibkr-1"),
        ];
        let portfolio = run(&positions, Scope::All).unwrap();
        let zn = portfolio.positions.get("ZN:202603").unwrap();
        assert_eq!(zn.asset_class.as_deref(), Some("bond"));
    }

    #[test]
    fn test_unknown_contract_is_fatal() {
        let positions = vec![futures_position("QQ", 202603, 1.0, 100.0, "ibkr-1")];
        let err = run(&positions, Scope::All).unwrap_err();
        assert!(matches!(err, ProviderError::UnknownContract { .. }));
    }

    #[test]
    fn test_negative_weight_requires_short_flag() {
        let positions = vec![
            position("AAPL", 100.0, 255.0, ProviderKind::NativeSchwab, "s1"),
            position("TSLA", -10.0, 300.0, ProviderKind::NativeSchwab, "s1"),
        ];
        let mut config = CanonicalizerConfig::default();
        config.allow_short = false;
        let err = canonicalize(
            &positions,
            &ContractCatalog::standard(),
            &Scope::All,
            &config,
            as_of(),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidWeights { .. }));
    }

    #[test]
    fn test_cash_excluded_from_weights() {
        let mut cash = position("ignored", 5000.0, 1.0, ProviderKind::NativeSchwab, "s1");
        cash.symbol = Symbol::currency(Currency::USD);
        cash.instrument_type = InstrumentClass::Cash;
        let positions = vec![
            position("AAPL", 100.0, 255.0, ProviderKind::NativeSchwab, "s1"),
            cash,
        ];
        let portfolio = run(&positions, Scope::All).unwrap();
        let aapl = portfolio.positions.get("AAPL").unwrap();
        assert!((aapl.weight_by_notional - 1.0).abs() < 1e-9);
        let cash = portfolio.positions.get("CUR:USD").unwrap();
        assert_eq!(cash.cash_proxy.as_ref().unwrap().root(), "BIL");
        assert!((portfolio.margin_total - 30_500.0).abs() < 1e-6);
    }

    #[test]
    fn test_account_scope() {
        let positions = vec![
            position("AAPL", 100.0, 255.0, ProviderKind::NativeSchwab, "s1"),
            position("MSFT", 10.0, 400.0, ProviderKind::NativeSchwab, "s2"),
        ];
        let portfolio = run(&positions, Scope::Account("s2".to_string())).unwrap();
        assert!(portfolio.positions.contains_key("MSFT"));
        assert!(!portfolio.positions.contains_key("AAPL"));
    }

    #[test]
    fn test_weights_sum_to_one_without_shorts() {
        let positions = vec![
            position("AAPL", 100.0, 255.0, ProviderKind::NativeSchwab, "s1"),
            position("MSFT", 10.0, 400.0, ProviderKind::NativeSchwab, "s1"),
            position("VTI", 50.0, 280.0, ProviderKind::NativeSchwab, "s1"),
        ];
        let portfolio = run(&positions, Scope::All).unwrap();
        let sum: f64 = portfolio.weights().values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}
