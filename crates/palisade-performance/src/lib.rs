//! # Palisade Performance
//!
//! Realized performance engine: reconstructs a portfolio's observed
//! return from raw transactions for GIPS-compliant TWR reporting.
//!
//! The pipeline is strictly per-account first, then aggregation:
//!
//! 1. **Timeline** ([`timeline`]): inception dates, quantity events keyed
//!    by `(account, symbol, currency, direction)`, synthetic inception
//!    seeding, `SYSTEM_TRANSFER` arrivals with per-symbol inception
//! 2. **Daily NAV** ([`nav`]): replay against vendor closes and FX
//! 3. **Daily TWR** ([`twr`]): GIPS beginning-of-day formula with
//!    un-netted same-day flows; monthly chaining and annualization
//! 4. **Aggregation** ([`aggregate`]): summed per-account series, with
//!    the small-base threshold guarding the combined TWR
//! 5. **Metrics & report** ([`metrics`], [`report`]): Sharpe, Sortino,
//!    drawdown, win rate, and the data-quality block
//!
//! A combined series is never computed from coalesced raw transactions;
//! inception seeding and symbol keying stay inside each account.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod aggregate;
pub mod error;
pub mod metrics;
pub mod nav;
pub mod report;
pub mod timeline;
pub mod twr;

pub use aggregate::{aggregate_accounts, AggregatedSeries, DEFAULT_SMALL_BASE_THRESHOLD};
pub use error::{PerformanceError, PerformanceResult};
pub use metrics::{compute_metrics, MonthObservation, PerformanceMetrics};
pub use nav::{daily_nav, AccountDailySeries};
pub use report::{
    compute_realized, AccountFingerprint, AccountInput, AccountPerformance, PerformanceConfig,
    PerformanceDataQuality, RealizedPerformance,
};
pub use timeline::{
    build_timeline, AccountTimeline, PositionDirection, PositionKey, TimelineEntry,
};
pub use twr::{annualize, chain, daily_returns, monthly_returns};
