//! Cash-flow events derived from transactions.
//!
//! Inflows and outflows landing on the same day are kept as separate
//! events; the GIPS day-return formula needs them un-netted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Direction of a cash flow relative to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    /// Money entering the account.
    In,
    /// Money leaving the account.
    Out,
}

/// Whether a flow crosses the portfolio boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowClass {
    /// External contribution or withdrawal (affects TWR denominators).
    External,
    /// Movement between accounts of the same portfolio.
    Internal,
}

/// A dated cash-flow event for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    /// Business date of the flow.
    pub date: NaiveDate,
    /// Owning account identifier.
    pub account_id: String,
    /// In or out.
    pub direction: FlowDirection,
    /// Unsigned amount in account currency.
    pub amount: f64,
    /// External vs internal classification.
    pub classification: FlowClass,
}

impl FlowEvent {
    /// Creates an external inflow.
    #[must_use]
    pub fn external_in(date: NaiveDate, account_id: impl Into<String>, amount: f64) -> Self {
        Self {
            date,
            account_id: account_id.into(),
            direction: FlowDirection::In,
            amount: amount.abs(),
            classification: FlowClass::External,
        }
    }

    /// Creates an external outflow.
    #[must_use]
    pub fn external_out(date: NaiveDate, account_id: impl Into<String>, amount: f64) -> Self {
        Self {
            date,
            account_id: account_id.into(),
            direction: FlowDirection::Out,
            amount: amount.abs(),
            classification: FlowClass::External,
        }
    }

    /// Signed amount: positive in, negative out.
    #[must_use]
    pub fn signed_amount(&self) -> f64 {
        match self.direction {
            FlowDirection::In => self.amount,
            FlowDirection::Out => -self.amount,
        }
    }
}
