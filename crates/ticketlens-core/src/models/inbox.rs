//! Inbox (mailbox) data structures

use serde::{Deserialize, Serialize};

/// A shared inbox conversations belong to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inbox {
    pub id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
