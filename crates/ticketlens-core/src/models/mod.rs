//! Data models for TicketLens
//!
//! Conversations, threads, and inboxes as returned by the ticketing API,
//! plus the search criteria accepted by the search engine.

mod conversation;
mod criteria;
mod inbox;

pub use conversation::*;
pub use criteria::*;
pub use inbox::*;
