//! Async client for the BookStack REST API.
//!
//! Payloads are passed through as opaque `serde_json::Value`s; this crate only knows how to
//! address entities, page/filter list calls, and authenticate with an API token.

pub mod client;
pub mod error;
pub mod query;

pub use client::{ApiConfig, BookStackClient, DocumentApi, StatusProbe};
pub use error::{ApiError, Result};
pub use query::{EntityKind, Filter, FilterOperator, ListParams, UnknownEntityKind};
