//! # Palisade Server
//!
//! REST API over the Palisade risk service.
//!
//! The router exposes the same operations as the MCP tool surface —
//! risk analysis, performance, what-if, optimization, factor
//! intelligence, baskets, futures, and trade previews — with the
//! stable `{success, summary, detail, metadata, flags}` envelope and
//! stable error codes in failure payloads.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod handlers;
pub mod routes;

pub use config::ServerConfig;
pub use routes::create_router;
