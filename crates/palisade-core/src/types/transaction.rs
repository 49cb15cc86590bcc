//! Transactions and their flow classification.

use super::{ProviderKind, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Transaction type as normalized from provider payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Purchase of an instrument.
    Buy,
    /// Sale of an instrument.
    Sell,
    /// Dividend payment.
    Dividend,
    /// Interest payment.
    Interest,
    /// External cash deposit.
    Deposit,
    /// External cash withdrawal.
    Withdrawal,
    /// Commission or account fee.
    Fee,
    /// Rewards / cashback credit (classified as an external contribution).
    Cashback,
    /// Securities transferred in from outside.
    TransferIn,
    /// Securities transferred out.
    TransferOut,
    /// Split, merger, spin-off.
    CorporateAction,
    /// Position migrated from another broker; materializes a synthetic BUY
    /// at transfer cost plus a matching external contribution.
    SystemTransfer,
}

impl TransactionKind {
    /// True when this kind represents money crossing the account boundary.
    #[must_use]
    pub fn is_external_flow(&self) -> bool {
        matches!(
            self,
            TransactionKind::Deposit
                | TransactionKind::Withdrawal
                | TransactionKind::Cashback
                | TransactionKind::TransferIn
                | TransactionKind::TransferOut
                | TransactionKind::SystemTransfer
        )
    }

    /// True for trades that change instrument quantities.
    #[must_use]
    pub fn is_trade(&self) -> bool {
        matches!(self, TransactionKind::Buy | TransactionKind::Sell)
    }

    /// True for income credited inside the account.
    #[must_use]
    pub fn is_income(&self) -> bool {
        matches!(self, TransactionKind::Dividend | TransactionKind::Interest)
    }
}

/// A normalized transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Business date of the trade.
    pub trade_date: NaiveDate,
    /// Settlement date, when reported.
    pub settlement_date: Option<NaiveDate>,
    /// Symbol, absent for pure cash movements.
    pub symbol: Option<Symbol>,
    /// Signed quantity (positive buys, negative sells).
    pub quantity: f64,
    /// Per-unit price, when applicable.
    pub price: Option<f64>,
    /// Signed cash amount (negative for purchases and withdrawals).
    pub amount: f64,
    /// Normalized transaction kind.
    pub kind: TransactionKind,
    /// Owning account identifier.
    pub account_id: String,
    /// Source that reported this transaction.
    pub provider_source: ProviderKind,
}

impl Transaction {
    /// Convenience constructor for cash-only rows.
    #[must_use]
    pub fn cash(
        trade_date: NaiveDate,
        amount: f64,
        kind: TransactionKind,
        account_id: impl Into<String>,
        provider_source: ProviderKind,
    ) -> Self {
        Self {
            trade_date,
            settlement_date: None,
            symbol: None,
            quantity: 0.0,
            price: None,
            amount,
            kind,
            account_id: account_id.into(),
            provider_source,
        }
    }

    /// Convenience constructor for trades.
    #[must_use]
    pub fn trade(
        trade_date: NaiveDate,
        symbol: Symbol,
        quantity: f64,
        price: f64,
        kind: TransactionKind,
        account_id: impl Into<String>,
        provider_source: ProviderKind,
    ) -> Self {
        Self {
            trade_date,
            settlement_date: None,
            symbol: Some(symbol),
            quantity,
            price: Some(price),
            amount: -quantity * price,
            kind,
            account_id: account_id.into(),
            provider_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_external_flow_classification() {
        assert!(TransactionKind::Deposit.is_external_flow());
        assert!(TransactionKind::Cashback.is_external_flow());
        assert!(TransactionKind::SystemTransfer.is_external_flow());
        assert!(!TransactionKind::Dividend.is_external_flow());
        assert!(!TransactionKind::Buy.is_external_flow());
    }

    #[test]
    fn test_trade_amount_sign() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let buy = Transaction::trade(
            date,
            Symbol::new("SPY"),
            10.0,
            500.0,
            TransactionKind::Buy,
            "acct-1",
            ProviderKind::NativeSchwab,
        );
        assert!((buy.amount + 5000.0).abs() < 1e-9);
    }
}
