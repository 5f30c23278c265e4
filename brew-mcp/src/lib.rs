//! brew-mcp — Homebrew's command surface exposed as MCP tools
//!
//! Every call flows through the same pipeline:
//! tool binder → argument checks → argv assembly → process spawn → audit → response.

pub mod audit;
pub mod binder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod registry;
pub mod request;
pub mod schema;
pub mod server;
