//! # Palisade Providers
//!
//! Provider adapters and the position canonicalizer.
//!
//! Raw broker/aggregator payloads are normalized at the edge (uppercase
//! tickers, `CUR:XXX` cash encoding, business-date flows, cashback as
//! external contribution) and merged into a canonical portfolio under
//! **native-over-aggregator authority**:
//!
//! - A symbol from one source is included as-is
//! - A symbol reported by exactly one native broker plus aggregator
//!   mirrors belongs to the native; aggregator scopes record it in
//!   `cross_source_leakage`
//! - Anything else (two natives, two aggregators, unknown sources) is
//!   genuine ambiguity: excluded from every scope and recorded
//!
//! Futures notional is derived from the contract catalog; weights are
//! normalized against the gross non-cash notional; fixed-income futures
//! take the canonical `"bond"` asset class so they join the rate-factor
//! eligible set.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod adapter;
pub mod canonical;
pub mod error;
pub mod normalize;

pub use adapter::{ProviderAdapter, RawPosition, RawTransaction, StaticProvider};
pub use canonical::{
    canonicalize, CanonicalPortfolio, CanonicalPosition, CanonicalizerConfig, DataQuality, Scope,
};
pub use error::{ProviderError, ProviderResult};
pub use normalize::{
    derive_flows, narrow_source, normalize_position, normalize_positions, normalize_transaction,
    normalize_transactions, CashMap,
};
