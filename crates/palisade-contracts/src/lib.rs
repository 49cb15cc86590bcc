//! # Palisade Contracts
//!
//! Static futures contract catalog for the Palisade risk engine.
//!
//! The catalog maps root symbols (ES, ZN, GC, ...) to immutable
//! [`palisade_core::ContractSpec`] entries carrying multiplier, tick size,
//! currency, exchange, and asset class. On top of it this crate provides:
//!
//! - [`months::list_months`]: tradable contract months via a broker
//!   gateway trait, expired contracts filtered, sorted by last trade date
//! - [`roll::build_roll`]: calendar-spread construction for rolling a
//!   position between months
//!
//! Unknown symbols return `None` from [`ContractCatalog::lookup`]; callers
//! surface a clear error instead of guessing contract economics.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod catalog;
pub mod error;
pub mod months;
pub mod roll;

pub use catalog::ContractCatalog;
pub use error::{ContractError, ContractResult};
pub use months::{list_months, parse_contract_month, ContractMonth, FuturesGateway};
pub use roll::{build_roll, CalendarSpread, LegAction, RollDirection, SpreadLeg};
