//! # Palisade MCP Server
//!
//! Model Context Protocol (MCP) server for the Palisade portfolio risk
//! analytics engine.
//!
//! Exposes risk decomposition, realized performance, what-if scenarios,
//! constrained optimization, factor intelligence, basket management,
//! futures utilities, and trade previews as MCP tools for AI assistants.
//!
//! ## Quick Start
//!
//! ```bash
//! # stdio transport with fixture data (for Claude Desktop etc.)
//! palisade-mcp-server --demo
//! ```

#![warn(missing_docs)]

pub mod demo;
pub mod server;

pub use server::PalisadeMcpServer;

/// Server name for the MCP handshake.
pub const SERVER_NAME: &str = "palisade-mcp";

/// Server version (same as crate version).
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
