//! Conversation and thread data structures

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::normalize::{ContentNormalizer, InlineImage};

/// Conversation status. The API only filters by one status per call.
///
/// Declaration order is the canonical merge order for multi-status searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Pending,
    Closed,
    Spam,
}

impl Status {
    /// Wire value used in the `status` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Pending => "pending",
            Status::Closed => "closed",
            Status::Spam => "spam",
        }
    }

    /// Deduplicate and put statuses in canonical order
    pub fn canonical(statuses: &[Status]) -> Vec<Status> {
        let mut ordered = statuses.to_vec();
        ordered.sort();
        ordered.dedup();
        ordered
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "pending" => Ok(Status::Pending),
            "closed" => Ok(Status::Closed),
            "spam" => Ok(Status::Spam),
            other => Err(Error::Validation(format!(
                "Unknown status '{}' (expected active, pending, closed, or spam)",
                other
            ))),
        }
    }
}

/// A customer or staff user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// "customer" or "user" when the API says so
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Person {
    /// "First Last", falling back to the email address
    pub fn display_name(&self) -> Option<String> {
        let name = [self.first.as_deref(), self.last.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            Some(name)
        } else {
            self.email.clone()
        }
    }

    /// Whether this person is a staff user rather than a customer
    pub fn is_user(&self) -> bool {
        self.kind.as_deref() == Some("user")
    }
}

/// Conversation tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(alias = "name")]
    pub tag: String,
}

/// One message (or note, or event) inside a conversation, body still raw markup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: u64,

    /// "customer", "message", "note", "lineitem", ...
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created_by: Option<Person>,
}

impl Thread {
    /// Threads written by the customer
    pub fn is_customer_message(&self) -> bool {
        self.kind == "customer"
    }

    /// Replies written by staff
    pub fn is_staff_reply(&self) -> bool {
        self.kind == "message"
    }

    /// Produce the caller-facing form with a normalized body
    pub fn normalize(&self, normalizer: &ContentNormalizer) -> NormalizedThread {
        let normalized = normalizer.normalize(self.body.as_deref().unwrap_or_default());
        NormalizedThread {
            id: self.id,
            kind: self.kind.clone(),
            created_at: self.created_at,
            author: self.created_by.as_ref().and_then(Person::display_name),
            body: normalized.text,
            images: normalized.images,
            quoted_content_removed: normalized.quoted_content_removed,
        }
    }
}

/// A thread whose body went through the content normalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedThread {
    pub id: u64,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    pub body: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<InlineImage>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub quoted_content_removed: bool,
}

/// Resources embedded in a conversation response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationEmbedded {
    #[serde(default)]
    pub threads: Vec<Thread>,
}

/// A ticket. Identity is `id`; `number` is the human-facing ticket number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: u64,

    #[serde(default)]
    pub number: u64,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub status: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, alias = "primaryCustomer", skip_serializing_if = "Option::is_none")]
    pub customer: Option<Person>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Person>,

    #[serde(default)]
    pub tags: Vec<Tag>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailbox_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,

    /// Raw threads when requested with `embed=threads`; never serialized
    #[serde(rename = "_embedded", default, skip_serializing)]
    pub embedded: Option<ConversationEmbedded>,
}

impl Conversation {
    /// Embedded raw threads, if any
    pub fn threads(&self) -> &[Thread] {
        self.embedded
            .as_ref()
            .map(|e| e.threads.as_slice())
            .unwrap_or_default()
    }

    /// Tag names
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.tag.as_str()).collect()
    }
}

/// Caller-facing conversation: the record plus normalized thread bodies
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    #[serde(flatten)]
    pub conversation: Conversation,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub threads: Vec<NormalizedThread>,
}

impl ConversationRecord {
    /// Normalize every embedded thread body
    pub fn new(conversation: Conversation, normalizer: &ContentNormalizer) -> Self {
        let threads = conversation
            .threads()
            .iter()
            .map(|t| t.normalize(normalizer))
            .collect();
        Self {
            conversation,
            threads,
        }
    }
}
