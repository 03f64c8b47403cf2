//! TicketLens Core Library
//!
//! Read-only search over a help-desk ticketing API: multi-status search with
//! reconciled pagination, message body normalization, and an MCP server for
//! AI assistants.

pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod normalize;
pub mod query;
pub mod search;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use models::*;
pub use normalize::ContentNormalizer;
pub use search::SearchEngine;
pub use session::Session;
pub use transport::{ApiClient, Transport};

/// Application name for config paths
pub const APP_NAME: &str = "ticketlens";
