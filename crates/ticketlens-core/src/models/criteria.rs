//! Search criteria accepted by the search engine

use serde::{Deserialize, Serialize};

use super::Status;

/// Structured filters for one search invocation.
///
/// Term lists are OR-groups; separate groups are AND-combined by the query
/// builder. Date bounds are kept as the caller supplied them and validated
/// when the query is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Terms matched against message bodies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_terms: Vec<String>,

    /// Terms matched against the subject line
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_terms: Vec<String>,

    /// Tag names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Exact customer email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,

    /// Customer email domain ("example.com" or "@example.com")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_domain: Option<String>,

    /// Inbox (mailbox) scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox_id: Option<u64>,

    /// Statuses to search; empty means the configured defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<Status>,

    /// ISO-8601 lower creation bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<String>,

    /// ISO-8601 upper creation bound, enforced client-side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<String>,

    /// Maximum number of conversations returned
    pub limit: usize,

    /// Embed and normalize thread bodies
    #[serde(default)]
    pub include_threads: bool,
}

impl SearchCriteria {
    /// Criteria with only a limit
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Set the statuses
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Add body terms
    pub fn with_content_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_terms.extend(terms.into_iter().map(Into::into));
        self
    }

    /// Set the upper creation bound
    pub fn created_before(mut self, bound: impl Into<String>) -> Self {
        self.created_before = Some(bound.into());
        self
    }

    /// Set the lower creation bound
    pub fn created_after(mut self, bound: impl Into<String>) -> Self {
        self.created_after = Some(bound.into());
        self
    }
}
