//! # Palisade Core
//!
//! Canonical data model for the Palisade portfolio risk analytics engine.
//!
//! This crate defines the types every other Palisade crate builds on:
//! instruments and symbols, broker positions and transactions, cash-flow
//! events, provider source classification, and configured risk profiles.
//!
//! ## Design Philosophy
//!
//! - **Normalized at the edge**: symbols are uppercased and interned on
//!   construction; downstream code never re-normalizes
//! - **Tagged sources everywhere**: `provider_source` and `account_id`
//!   travel with every position and transaction and are never dropped by
//!   aggregation layers
//! - **Immutable snapshots**: risk profiles are cloned into derivations;
//!   mutation happens only through the engine's authoring path

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod dates;
pub mod error;
pub mod profile;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use profile::{BetaCap, ProfileTemplate, RiskProfile};
pub use types::{
    AssetClass, ContractSpec, Currency, FlowClass, FlowDirection, FlowEvent, Instrument,
    InstrumentClass, Position, ProviderKind, Symbol, Transaction, TransactionKind,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dates::{business_date, business_date_default};
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::profile::{BetaCap, ProfileTemplate, RiskProfile};
    pub use crate::types::{
        AssetClass, ContractSpec, Currency, FlowClass, FlowDirection, FlowEvent, Instrument,
        InstrumentClass, Position, ProviderKind, Symbol, Transaction, TransactionKind,
    };
}
