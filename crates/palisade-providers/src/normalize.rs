//! Normalization of raw provider payloads.
//!
//! The rules here are bit-exact where they affect downstream math:
//! tickers uppercase, currency positions become `CUR:XXX`, cash flows use
//! the business date rather than the system timestamp, cashback counts as
//! an external contribution, and cost basis is preserved (missing basis
//! marks the position synthetic).

use crate::adapter::{RawPosition, RawTransaction};
use crate::error::{ProviderError, ProviderResult};
use palisade_core::dates::business_date_default;
use palisade_core::{
    Currency, FlowClass, FlowDirection, FlowEvent, InstrumentClass, Position, ProviderKind,
    Symbol, Transaction, TransactionKind,
};
use std::collections::HashMap;
use tracing::warn;

/// Static mapping from cash currency to its proxy ETF.
#[derive(Debug, Clone)]
pub struct CashMap {
    proxies: HashMap<Currency, Symbol>,
}

impl CashMap {
    /// Builds the default proxy mapping for every supported currency.
    #[must_use]
    pub fn standard() -> Self {
        let mut proxies = HashMap::new();
        proxies.insert(Currency::USD, Symbol::new("BIL"));
        proxies.insert(Currency::EUR, Symbol::new("FXE"));
        proxies.insert(Currency::GBP, Symbol::new("FXB"));
        proxies.insert(Currency::JPY, Symbol::new("FXY"));
        proxies.insert(Currency::CHF, Symbol::new("FXF"));
        proxies.insert(Currency::CAD, Symbol::new("FXC"));
        proxies.insert(Currency::AUD, Symbol::new("FXA"));
        proxies.insert(Currency::HKD, Symbol::new("BIL"));
        proxies.insert(Currency::SGD, Symbol::new("BIL"));
        proxies.insert(Currency::MXN, Symbol::new("BIL"));
        Self { proxies }
    }

    /// Creates a map from explicit entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (Currency, Symbol)>) -> Self {
        Self {
            proxies: entries.into_iter().collect(),
        }
    }

    /// Resolves the proxy for a currency.
    ///
    /// # Errors
    ///
    /// A missing mapping is fatal for the run.
    pub fn proxy(&self, currency: Currency) -> ProviderResult<&Symbol> {
        self.proxies
            .get(&currency)
            .ok_or_else(|| ProviderError::UnknownCashCurrency {
                code: currency.code().to_string(),
            })
    }
}

impl Default for CashMap {
    fn default() -> Self {
        Self::standard()
    }
}

/// Narrows a possibly merged source label to a single provider.
///
/// Aggregator rows sometimes arrive stamped `"plaid,schwab"` after an
/// upstream join; the native source wins before any further processing.
pub fn narrow_source(label: &str) -> ProviderResult<ProviderKind> {
    let sources = ProviderKind::parse_merged(label)
        .map_err(|e| ProviderError::normalization(e.to_string()))?;
    match sources.as_slice() {
        [] => Err(ProviderError::normalization("empty source label")),
        [only] => Ok(*only),
        several => {
            let natives: Vec<_> = several.iter().filter(|s| s.is_native()).collect();
            match natives.as_slice() {
                [native] => Ok(**native),
                _ => Err(ProviderError::normalization(format!(
                    "cannot narrow merged sources '{label}' to a single native"
                ))),
            }
        }
    }
}

/// Normalizes one raw position row.
///
/// # Errors
///
/// Returns an error for unparseable currencies, source labels, or
/// contract months.
pub fn normalize_position(raw: &RawPosition) -> ProviderResult<Position> {
    let provider_source = narrow_source(&raw.source)?;
    let currency: Currency = raw
        .currency
        .parse()
        .map_err(|_| ProviderError::UnknownCashCurrency {
            code: raw.currency.clone(),
        })?;

    let type_label = raw.instrument_type.to_ascii_lowercase();
    let (symbol, instrument_type) = match type_label.as_str() {
        "cash" | "currency" => (Symbol::currency(currency), InstrumentClass::Cash),
        "futures" => {
            let symbol = match &raw.contract_month {
                Some(month) => {
                    let parsed = palisade_contracts::parse_contract_month(month)
                        .map_err(|e| ProviderError::normalization(e.to_string()))?;
                    Symbol::with_month(&raw.ticker, parsed)
                }
                None => Symbol::new(&raw.ticker),
            };
            (symbol, InstrumentClass::Futures)
        }
        "etf" => (Symbol::new(&raw.ticker), InstrumentClass::Etf),
        "bond" => (Symbol::new(&raw.ticker), InstrumentClass::Bond),
        _ => (Symbol::new(&raw.ticker), InstrumentClass::Equity),
    };

    let position = Position {
        symbol,
        quantity: raw.quantity,
        unit_price: raw.unit_price,
        currency,
        cost_basis: raw.cost_basis,
        account_id: raw.account_id.clone(),
        provider_source,
        brokerage_name: raw.brokerage_name.clone(),
        instrument_type,
    };
    position
        .validate()
        .map_err(|e| ProviderError::normalization(e.to_string()))?;
    Ok(position)
}

/// Normalizes a batch, culling zero-quantity rows instead of failing.
pub fn normalize_positions(raws: &[RawPosition]) -> ProviderResult<Vec<Position>> {
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        if raw.quantity == 0.0 {
            continue;
        }
        out.push(normalize_position(raw)?);
    }
    Ok(out)
}

fn parse_tx_kind(label: &str) -> ProviderResult<TransactionKind> {
    let kind = match label.to_ascii_uppercase().as_str() {
        "BUY" => TransactionKind::Buy,
        "SELL" => TransactionKind::Sell,
        "DIVIDEND" | "DIV" => TransactionKind::Dividend,
        "INTEREST" | "INT" => TransactionKind::Interest,
        "DEPOSIT" | "CASH_RECEIPT" | "ACH_IN" => TransactionKind::Deposit,
        "WITHDRAWAL" | "CASH_DISBURSEMENT" | "ACH_OUT" => TransactionKind::Withdrawal,
        "FEE" | "COMMISSION" => TransactionKind::Fee,
        "CASHBACK" | "REWARD" => TransactionKind::Cashback,
        "TRANSFER_IN" => TransactionKind::TransferIn,
        "TRANSFER_OUT" => TransactionKind::TransferOut,
        "CORPORATE_ACTION" | "SPLIT" | "MERGER" => TransactionKind::CorporateAction,
        "SYSTEM_TRANSFER" => TransactionKind::SystemTransfer,
        other => {
            return Err(ProviderError::normalization(format!(
                "unknown transaction type '{other}'"
            )))
        }
    };
    Ok(kind)
}

/// Normalizes one raw transaction row for a source.
///
/// Cash flows take their business date from the system timestamp when one
/// is present, so near-midnight UTC receipts land on the same day as the
/// trades they fund.
pub fn normalize_transaction(
    raw: &RawTransaction,
    source: ProviderKind,
) -> ProviderResult<Transaction> {
    let kind = parse_tx_kind(&raw.tx_type)?;

    let trade_date = if kind.is_external_flow() || kind.is_income() {
        raw.system_time
            .map(business_date_default)
            .unwrap_or(raw.trade_date)
    } else {
        raw.trade_date
    };

    let symbol = raw.ticker.as_deref().map(Symbol::new);

    Ok(Transaction {
        trade_date,
        settlement_date: raw.settlement_date,
        symbol,
        quantity: raw.quantity,
        price: raw.price,
        amount: raw.amount,
        kind,
        account_id: raw.account_id.clone(),
        provider_source: source,
    })
}

/// Normalizes a batch of transactions, skipping unknown types with a
/// warning rather than failing the provider.
pub fn normalize_transactions(
    raws: &[RawTransaction],
    source: ProviderKind,
) -> Vec<Transaction> {
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        match normalize_transaction(raw, source) {
            Ok(tx) => out.push(tx),
            Err(err) => warn!(%err, account = %raw.account_id, "skipping unnormalizable transaction"),
        }
    }
    out
}

/// Derives cash-flow events from normalized transactions.
///
/// Cashback and external transfers are external contributions; a
/// `SYSTEM_TRANSFER` contributes its transfer cost as an external inflow
/// (the synthetic BUY side is materialized by the performance timeline).
/// Same-day inflows and outflows stay separate events.
pub fn derive_flows(transactions: &[Transaction]) -> Vec<FlowEvent> {
    let mut flows = Vec::new();
    for tx in transactions {
        if !tx.kind.is_external_flow() {
            continue;
        }
        let (direction, amount) = match tx.kind {
            TransactionKind::Deposit | TransactionKind::Cashback | TransactionKind::TransferIn => {
                (FlowDirection::In, tx.amount.abs())
            }
            TransactionKind::SystemTransfer => {
                let cost = if tx.amount != 0.0 {
                    tx.amount.abs()
                } else {
                    tx.quantity.abs() * tx.price.unwrap_or(0.0)
                };
                (FlowDirection::In, cost)
            }
            TransactionKind::Withdrawal | TransactionKind::TransferOut => {
                (FlowDirection::Out, tx.amount.abs())
            }
            _ => continue,
        };
        if amount == 0.0 {
            continue;
        }
        flows.push(FlowEvent {
            date: tx.trade_date,
            account_id: tx.account_id.clone(),
            direction,
            amount,
            classification: FlowClass::External,
        });
    }
    flows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn raw_position(ticker: &str, source: &str) -> RawPosition {
        RawPosition {
            ticker: ticker.to_string(),
            quantity: 100.0,
            unit_price: 50.0,
            currency: "USD".to_string(),
            cost_basis: Some(4500.0),
            account_id: "acct-1".to_string(),
            brokerage_name: "Charles Schwab".to_string(),
            instrument_type: "equity".to_string(),
            source: source.to_string(),
            contract_month: None,
        }
    }

    #[test]
    fn test_ticker_uppercased() {
        let pos = normalize_position(&raw_position("dsu", "schwab")).unwrap();
        assert_eq!(pos.symbol.root(), "DSU");
    }

    #[test]
    fn test_merged_source_narrows_to_native() {
        let pos = normalize_position(&raw_position("DSU", "plaid,schwab")).unwrap();
        assert_eq!(pos.provider_source, ProviderKind::NativeSchwab);
    }

    #[test]
    fn test_merged_two_natives_rejected() {
        assert!(narrow_source("schwab,ibkr").is_err());
        assert!(narrow_source("plaid,snaptrade").is_err());
    }

    #[test]
    fn test_currency_position_encoding() {
        let mut raw = raw_position("cad cash", "plaid");
        raw.instrument_type = "currency".to_string();
        raw.currency = "CAD".to_string();
        let pos = normalize_position(&raw).unwrap();
        assert_eq!(pos.symbol.root(), "CUR:CAD");
        assert_eq!(pos.instrument_type, InstrumentClass::Cash);
    }

    #[test]
    fn test_cash_map_unknown_currency_fatal() {
        let map = CashMap::from_entries([(Currency::USD, Symbol::new("BIL"))]);
        assert!(map.proxy(Currency::USD).is_ok());
        assert!(map.proxy(Currency::CAD).is_err());
    }

    #[test]
    fn test_cash_receipt_uses_business_date() {
        // Receipt stamped 00:30 UTC July 1; business date is June 30.
        let raw = RawTransaction {
            trade_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            settlement_date: None,
            system_time: Some(Utc.with_ymd_and_hms(2025, 7, 1, 0, 30, 0).unwrap()),
            ticker: None,
            quantity: 0.0,
            price: None,
            amount: 5000.0,
            tx_type: "CASH_RECEIPT".to_string(),
            account_id: "acct-1".to_string(),
        };
        let tx = normalize_transaction(&raw, ProviderKind::NativeSchwab).unwrap();
        assert_eq!(tx.kind, TransactionKind::Deposit);
        assert_eq!(tx.trade_date, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
    }

    #[test]
    fn test_buy_keeps_trade_date() {
        let raw = RawTransaction {
            trade_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            settlement_date: None,
            system_time: Some(Utc.with_ymd_and_hms(2025, 7, 1, 0, 30, 0).unwrap()),
            ticker: Some("SPY".to_string()),
            quantity: 10.0,
            price: Some(500.0),
            amount: -5000.0,
            tx_type: "BUY".to_string(),
            account_id: "acct-1".to_string(),
        };
        let tx = normalize_transaction(&raw, ProviderKind::NativeSchwab).unwrap();
        assert_eq!(tx.trade_date, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
    }

    #[test]
    fn test_cashback_is_external_inflow() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 5).unwrap();
        let tx = Transaction::cash(
            date,
            12.34,
            TransactionKind::Cashback,
            "acct-1",
            ProviderKind::AggregatorSnaptrade,
        );
        let flows = derive_flows(&[tx]);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].direction, FlowDirection::In);
        assert_eq!(flows[0].classification, FlowClass::External);
    }

    #[test]
    fn test_same_day_flows_not_netted() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 5).unwrap();
        let txs = vec![
            Transaction::cash(date, 5000.0, TransactionKind::Deposit, "a", ProviderKind::NativeSchwab),
            Transaction::cash(date, -2000.0, TransactionKind::Withdrawal, "a", ProviderKind::NativeSchwab),
        ];
        let flows = derive_flows(&txs);
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].direction, FlowDirection::In);
        assert_eq!(flows[1].direction, FlowDirection::Out);
    }

    #[test]
    fn test_system_transfer_contributes_cost() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 5).unwrap();
        let tx = Transaction {
            trade_date: date,
            settlement_date: None,
            symbol: Some(Symbol::new("VTI")),
            quantity: 20.0,
            price: Some(250.0),
            amount: 0.0,
            kind: TransactionKind::SystemTransfer,
            account_id: "a".to_string(),
            provider_source: ProviderKind::NativeIbkr,
        };
        let flows = derive_flows(&[tx]);
        assert_eq!(flows.len(), 1);
        assert!((flows[0].amount - 5000.0).abs() < 1e-9);
        assert_eq!(flows[0].direction, FlowDirection::In);
    }
}
