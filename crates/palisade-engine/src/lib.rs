//! # Palisade Engine
//!
//! Service layer for the Palisade risk analytics engine.
//!
//! [`RiskService`] orchestrates the full pipeline — provider fan-out,
//! canonicalization, factor decomposition, risk evaluation, realized
//! performance, optimization, what-if, and factor intelligence — behind
//! one facade consumed by the MCP and HTTP layers.
//!
//! ## Caching & consistency
//!
//! Results are cached by `(operation, user, portfolio fingerprint,
//! parameters, data version)` with a TTL. Entries are immutable; every
//! mutation (basket change, risk-profile change) bumps the data version
//! and invalidates the user's entries, so a newer run always observes
//! completed mutations.
//!
//! ## Persistence
//!
//! Baskets, risk profiles, target allocations, and trade previews live
//! behind the narrow [`store::Store`] trait with in-memory and redb
//! backends; transactions are scoped per mutation.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod results;
pub mod service;
pub mod store;
pub mod trades;

pub use cache::{params_hash, ResultCache, ResultCacheStats, ResultKey};
pub use config::EngineConfig;
pub use error::{ServiceError, ServiceResult};
pub use results::{AnalysisResult, OutputFormat, ResultMetadata, Snapshot};
pub use service::{
    FactorAnalysisKind, PerformanceMode, RequestContext, RiskService, Segment,
};
pub use store::{
    BasketTradeGroup, MemoryStore, RedbStore, Store, TargetAllocation, TradePreview, TradeSide,
};
pub use trades::{
    execute_basket_trade, execute_trade, preview_basket_trade, preview_futures_roll,
    preview_trade, RollPreview, TradeExecution, TradeRequest,
};
