//! Provider adapter trait and raw payload shapes.
//!
//! Each provider (native broker API, aggregator API, file import) exposes
//! the same three operations. Concrete HTTP clients live outside this
//! workspace; [`StaticProvider`] is the fixture-backed double used in
//! tests and demos.

use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use palisade_core::{FlowEvent, ProviderKind, Transaction};
use serde::{Deserialize, Serialize};

/// A position row as reported by a provider, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    /// Ticker in whatever case the provider uses.
    pub ticker: String,
    /// Signed quantity.
    pub quantity: f64,
    /// Per-unit price.
    pub unit_price: f64,
    /// ISO currency code.
    pub currency: String,
    /// Provider-reported cost basis, when available.
    pub cost_basis: Option<f64>,
    /// Account identifier.
    pub account_id: String,
    /// Human-readable brokerage name.
    pub brokerage_name: String,
    /// Provider's instrument type label (equity, etf, bond, futures,
    /// cash, currency).
    pub instrument_type: String,
    /// Source label; may carry merged sources like `"plaid,schwab"`.
    pub source: String,
    /// Contract month (YYYYMM) for dated futures rows.
    pub contract_month: Option<String>,
}

/// A transaction row as reported by a provider, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Business trade date.
    pub trade_date: NaiveDate,
    /// Settlement date, when reported.
    pub settlement_date: Option<NaiveDate>,
    /// System timestamp; used to re-derive the business date for flows.
    pub system_time: Option<DateTime<Utc>>,
    /// Ticker, absent for pure cash rows.
    pub ticker: Option<String>,
    /// Signed quantity.
    pub quantity: f64,
    /// Per-unit price, when applicable.
    pub price: Option<f64>,
    /// Signed cash amount.
    pub amount: f64,
    /// Provider's transaction type label (BUY, SELL, CASH_RECEIPT, ...).
    pub tx_type: String,
    /// Account identifier.
    pub account_id: String,
}

/// A provider of positions, transactions, and derived cash flows.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which source this adapter speaks for.
    fn kind(&self) -> ProviderKind;

    /// Positions as of a date.
    async fn fetch_positions(&self, as_of: NaiveDate) -> ProviderResult<Vec<RawPosition>>;

    /// Transactions in `[start, end]`.
    async fn fetch_transactions(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<RawTransaction>>;

    /// Derives external/internal cash-flow events from normalized
    /// transactions.
    ///
    /// The default implementation applies the shared classification in
    /// [`crate::normalize::derive_flows`].
    fn derive_flows(&self, transactions: &[Transaction]) -> Vec<FlowEvent> {
        crate::normalize::derive_flows(transactions)
    }
}

/// Fixture-backed provider used by tests and demo mode.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    kind: Option<ProviderKind>,
    positions: Vec<RawPosition>,
    transactions: Vec<RawTransaction>,
    fail: bool,
}

impl StaticProvider {
    /// Creates an empty provider for a source.
    #[must_use]
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Adds position fixtures.
    #[must_use]
    pub fn with_positions(mut self, positions: Vec<RawPosition>) -> Self {
        self.positions = positions;
        self
    }

    /// Adds transaction fixtures.
    #[must_use]
    pub fn with_transactions(mut self, transactions: Vec<RawTransaction>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Makes every fetch fail, for partial-failure tests.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl ProviderAdapter for StaticProvider {
    fn kind(&self) -> ProviderKind {
        self.kind.unwrap_or(ProviderKind::Manual)
    }

    async fn fetch_positions(&self, _as_of: NaiveDate) -> ProviderResult<Vec<RawPosition>> {
        if self.fail {
            return Err(ProviderError::unavailable(self.kind(), "fixture failure"));
        }
        Ok(self.positions.clone())
    }

    async fn fetch_transactions(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ProviderResult<Vec<RawTransaction>> {
        if self.fail {
            return Err(ProviderError::unavailable(self.kind(), "fixture failure"));
        }
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.trade_date >= start && t.trade_date <= end)
            .cloned()
            .collect())
    }
}
