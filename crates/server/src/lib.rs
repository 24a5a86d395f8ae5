//! MCP server exposing a BookStack wiki as tools.
//!
//! Inbound requests pass a throttle and a header auth gate before reaching the tool dispatcher;
//! health endpoints probe the upstream API directly.

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod mcp;
pub mod server;
pub mod throttle;
pub mod tools;

pub use config::{Cli, Config};
pub use error::{Result, ServerError};
