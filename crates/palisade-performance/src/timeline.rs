//! Per-account timeline reconstruction.
//!
//! Builds, for one account at a time, the ordered list of quantity events
//! the NAV stage replays. Positions are keyed by
//! `(account, symbol, currency, direction)`; cross-account coalescing is
//! what this module exists to prevent.

use crate::error::{PerformanceError, PerformanceResult};
use chrono::NaiveDate;
use palisade_core::{
    Currency, FlowClass, FlowDirection, FlowEvent, Position, Symbol, Transaction, TransactionKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Long or short side of a keyed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionDirection {
    /// Positive quantity.
    Long,
    /// Negative quantity.
    Short,
}

impl PositionDirection {
    fn of(quantity: f64) -> Self {
        if quantity < 0.0 {
            Self::Short
        } else {
            Self::Long
        }
    }
}

/// Identity of a tracked position within one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    /// Symbol.
    pub symbol: Symbol,
    /// Position currency.
    pub currency: Currency,
    /// Long or short.
    pub direction: PositionDirection,
}

/// One quantity event in the replayed timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Business date of the event.
    pub date: NaiveDate,
    /// Position identity.
    pub key: PositionKey,
    /// Signed quantity change.
    pub quantity_delta: f64,
    /// Execution price; `None` for synthetic seeds priced at NAV time.
    pub price: Option<f64>,
    /// Signed cash effect on the account ledger.
    pub cash_effect: f64,
    /// True for compensating entries the engine invented (inception
    /// seeds, transfer arrivals).
    pub synthetic: bool,
}

/// The reconstructed timeline for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTimeline {
    /// Account identifier.
    pub account_id: String,
    /// Earliest credible transaction/flow date.
    pub inception: NaiveDate,
    /// Quantity events in date order.
    pub entries: Vec<TimelineEntry>,
    /// External cash flows in date order.
    pub flows: Vec<FlowEvent>,
    /// Per-symbol inception dates (enabled by transfer arrivals so
    /// synthetic seeding cannot double-count them).
    pub symbol_inceptions: BTreeMap<String, NaiveDate>,
    /// Count of synthetic seed entries emitted.
    pub synthetic_seeds: usize,
}

/// Builds the timeline for one account.
///
/// `positions` is the account's current holdings as of `as_of`; holdings
/// whose quantity is not explained by transaction history receive a
/// compensating synthetic BUY at the account inception, paired with a
/// matching external contribution so the day's TWR is not distorted.
///
/// # Errors
///
/// Fails when the account has no transaction, flow, or position at all.
pub fn build_timeline(
    account_id: &str,
    transactions: &[Transaction],
    flows: &[FlowEvent],
    positions: &[Position],
    as_of: NaiveDate,
) -> PerformanceResult<AccountTimeline> {
    let transactions: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.account_id == account_id)
        .collect();
    let mut flows: Vec<FlowEvent> = flows
        .iter()
        .filter(|f| f.account_id == account_id)
        .cloned()
        .collect();
    let positions: Vec<&Position> = positions
        .iter()
        .filter(|p| p.account_id == account_id)
        .collect();

    // Earliest credible date; never the global minimum across accounts.
    let inception = transactions
        .iter()
        .map(|t| t.trade_date)
        .chain(flows.iter().map(|f| f.date))
        .min()
        .or_else(|| (!positions.is_empty()).then_some(as_of))
        .ok_or_else(|| PerformanceError::NoInception {
            account_id: account_id.to_string(),
        })?;

    let mut entries: Vec<TimelineEntry> = Vec::new();
    let mut symbol_inceptions: BTreeMap<String, NaiveDate> = BTreeMap::new();
    // Net traded quantity per symbol, for seeding the unexplained rest.
    let mut net_traded: BTreeMap<String, f64> = BTreeMap::new();

    for tx in &transactions {
        match tx.kind {
            TransactionKind::Buy | TransactionKind::Sell => {
                if let Some(symbol) = &tx.symbol {
                    let key = PositionKey {
                        symbol: symbol.clone(),
                        currency: Currency::USD,
                        direction: PositionDirection::of(tx.quantity),
                    };
                    entries.push(TimelineEntry {
                        date: tx.trade_date,
                        key,
                        quantity_delta: tx.quantity,
                        price: tx.price,
                        cash_effect: tx.amount,
                        synthetic: false,
                    });
                    *net_traded.entry(symbol.to_string()).or_default() += tx.quantity;
                }
            }
            TransactionKind::TransferIn | TransactionKind::TransferOut => {
                if let Some(symbol) = &tx.symbol {
                    let signed = if tx.kind == TransactionKind::TransferOut {
                        -tx.quantity.abs()
                    } else {
                        tx.quantity.abs()
                    };
                    entries.push(TimelineEntry {
                        date: tx.trade_date,
                        key: PositionKey {
                            symbol: symbol.clone(),
                            currency: Currency::USD,
                            direction: PositionDirection::of(signed),
                        },
                        quantity_delta: signed,
                        price: tx.price,
                        // In-kind: no cash leaves the account.
                        cash_effect: 0.0,
                        synthetic: false,
                    });
                    *net_traded.entry(symbol.to_string()).or_default() += signed;
                    symbol_inceptions
                        .entry(symbol.to_string())
                        .or_insert(tx.trade_date);
                }
            }
            TransactionKind::SystemTransfer => {
                // Migrated position: BUY at transfer cost on the business
                // date, with the matching external contribution emitted by
                // flow derivation. Per-symbol inception blocks the
                // synthetic seed from double-counting it.
                if let Some(symbol) = &tx.symbol {
                    entries.push(TimelineEntry {
                        date: tx.trade_date,
                        key: PositionKey {
                            symbol: symbol.clone(),
                            currency: Currency::USD,
                            direction: PositionDirection::of(tx.quantity),
                        },
                        quantity_delta: tx.quantity,
                        price: tx.price,
                        cash_effect: 0.0,
                        synthetic: false,
                    });
                    *net_traded.entry(symbol.to_string()).or_default() += tx.quantity;
                    symbol_inceptions
                        .entry(symbol.to_string())
                        .or_insert(tx.trade_date);
                }
            }
            // Cash-only rows move the ledger through their amount.
            TransactionKind::Dividend
            | TransactionKind::Interest
            | TransactionKind::Deposit
            | TransactionKind::Withdrawal
            | TransactionKind::Fee
            | TransactionKind::Cashback => {
                entries.push(TimelineEntry {
                    date: tx.trade_date,
                    key: PositionKey {
                        symbol: tx
                            .symbol
                            .clone()
                            .unwrap_or_else(|| Symbol::currency(Currency::USD)),
                        currency: Currency::USD,
                        direction: PositionDirection::Long,
                    },
                    quantity_delta: 0.0,
                    price: None,
                    cash_effect: tx.amount,
                    synthetic: false,
                });
            }
            TransactionKind::CorporateAction => {
                if let Some(symbol) = &tx.symbol {
                    entries.push(TimelineEntry {
                        date: tx.trade_date,
                        key: PositionKey {
                            symbol: symbol.clone(),
                            currency: Currency::USD,
                            direction: PositionDirection::of(tx.quantity),
                        },
                        quantity_delta: tx.quantity,
                        price: None,
                        cash_effect: tx.amount,
                        synthetic: false,
                    });
                    *net_traded.entry(symbol.to_string()).or_default() += tx.quantity;
                }
            }
        }
    }

    // Compensating seeds for holdings transaction history cannot explain.
    let mut synthetic_seeds = 0;
    for position in &positions {
        if position.instrument_type.is_cash() {
            continue;
        }
        let key = position.symbol.to_string();
        let traded = net_traded.get(&key).copied().unwrap_or(0.0);
        let unexplained = position.quantity - traded;
        if unexplained.abs() < 1e-9 {
            continue;
        }
        let seed_date = symbol_inceptions.get(&key).copied().unwrap_or(inception);
        let seed_price = position
            .cost_basis
            .filter(|b| *b > 0.0 && position.quantity != 0.0)
            .map(|b| (b / position.quantity).abs());
        let seed_value = seed_price.map(|p| p * unexplained.abs());

        debug!(account_id, symbol = %key, unexplained, "seeding synthetic inception BUY");
        entries.push(TimelineEntry {
            date: seed_date,
            key: PositionKey {
                symbol: position.symbol.clone(),
                currency: position.currency,
                direction: PositionDirection::of(unexplained),
            },
            quantity_delta: unexplained,
            price: seed_price,
            // In-kind arrival: the position appears without cash leaving.
            cash_effect: 0.0,
            synthetic: true,
        });
        if let Some(value) = seed_value {
            flows.push(FlowEvent {
                date: seed_date,
                account_id: account_id.to_string(),
                direction: if unexplained >= 0.0 {
                    FlowDirection::In
                } else {
                    FlowDirection::Out
                },
                amount: value,
                classification: FlowClass::External,
            });
        }
        synthetic_seeds += 1;
    }

    entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.key.cmp(&b.key)));
    flows.sort_by_key(|f| f.date);

    Ok(AccountTimeline {
        account_id: account_id.to_string(),
        inception,
        entries,
        flows,
        symbol_inceptions,
        synthetic_seeds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::{InstrumentClass, ProviderKind};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn holding(symbol: &str, quantity: f64, basis: Option<f64>) -> Position {
        Position {
            symbol: Symbol::new(symbol),
            quantity,
            unit_price: 100.0,
            currency: Currency::USD,
            cost_basis: basis,
            account_id: "a1".to_string(),
            provider_source: ProviderKind::NativeSchwab,
            brokerage_name: "Charles Schwab".to_string(),
            instrument_type: InstrumentClass::Equity,
        }
    }

    #[test]
    fn test_inception_from_earliest_activity() {
        let txs = vec![
            Transaction::cash(date(2024, 3, 1), 10_000.0, TransactionKind::Deposit, "a1", ProviderKind::NativeSchwab),
            Transaction::trade(date(2024, 3, 5), Symbol::new("SPY"), 10.0, 500.0, TransactionKind::Buy, "a1", ProviderKind::NativeSchwab),
        ];
        let timeline = build_timeline("a1", &txs, &[], &[], date(2025, 1, 1)).unwrap();
        assert_eq!(timeline.inception, date(2024, 3, 1));
    }

    #[test]
    fn test_synthetic_seed_for_unexplained_holding() {
        // 30 shares held, only 10 ever bought: 20 are seeded at inception.
        let txs = vec![Transaction::trade(
            date(2024, 3, 5),
            Symbol::new("SPY"),
            10.0,
            500.0,
            TransactionKind::Buy,
            "a1",
            ProviderKind::NativeSchwab,
        )];
        let positions = vec![holding("SPY", 30.0, Some(13_500.0))];
        let timeline = build_timeline("a1", &txs, &[], &positions, date(2025, 1, 1)).unwrap();

        assert_eq!(timeline.synthetic_seeds, 1);
        let seed = timeline.entries.iter().find(|e| e.synthetic).unwrap();
        assert!((seed.quantity_delta - 20.0).abs() < 1e-9);
        assert_eq!(seed.date, timeline.inception);
        // Seed priced at cost basis per share: 13,500 / 30 = 450.
        assert!((seed.price.unwrap() - 450.0).abs() < 1e-9);
        // Matching external contribution of 20 × 450.
        let seeded_flow = timeline.flows.iter().find(|f| (f.amount - 9000.0).abs() < 1e-9);
        assert!(seeded_flow.is_some());
    }

    #[test]
    fn test_system_transfer_blocks_double_seed() {
        // The whole holding arrived via SYSTEM_TRANSFER; nothing left to
        // seed.
        let tx = Transaction {
            trade_date: date(2024, 6, 2),
            settlement_date: None,
            symbol: Some(Symbol::new("VTI")),
            quantity: 50.0,
            price: Some(250.0),
            amount: 0.0,
            kind: TransactionKind::SystemTransfer,
            account_id: "a1".to_string(),
            provider_source: ProviderKind::NativeSchwab,
        };
        let positions = vec![holding("VTI", 50.0, Some(12_500.0))];
        let timeline = build_timeline("a1", &[tx], &[], &positions, date(2025, 1, 1)).unwrap();

        assert_eq!(timeline.synthetic_seeds, 0);
        assert_eq!(timeline.entries.len(), 1);
        assert_eq!(
            timeline.symbol_inceptions.get("VTI"),
            Some(&date(2024, 6, 2))
        );
    }

    #[test]
    fn test_account_isolation() {
        let txs = vec![Transaction::trade(
            date(2024, 3, 5),
            Symbol::new("SPY"),
            10.0,
            500.0,
            TransactionKind::Buy,
            "other-account",
            ProviderKind::NativeSchwab,
        )];
        assert!(build_timeline("a1", &txs, &[], &[], date(2025, 1, 1)).is_err());
    }

    #[test]
    fn test_no_activity_errors() {
        assert!(matches!(
            build_timeline("a1", &[], &[], &[], date(2025, 1, 1)),
            Err(PerformanceError::NoInception { .. })
        ));
    }
}
