//! Concurrent per-status fetching
//!
//! The ticketing API filters by one status per call, so a multi-status search
//! runs one paginated branch per status. All branches are dispatched before
//! any is awaited and the join waits for every one of them.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{Conversation, Status};
use crate::transport::{QueryParams, Transport};

/// Resource path for conversation lists
pub const CONVERSATIONS_PATH: &str = "conversations";

/// Everything a branch needs besides its status. Shared read-only by all
/// branches of one search.
#[derive(Debug, Clone, Default)]
pub struct BranchRequest {
    pub query: Option<String>,
    pub inbox_id: Option<u64>,
    pub include_threads: bool,

    /// Stop paging once this many conversations survive the client filter
    pub limit: usize,

    /// Keep only conversations created strictly before this instant
    pub created_before: Option<DateTime<Utc>>,
}

impl BranchRequest {
    /// Query parameters for one page of one status
    pub fn params(&self, status: Status, page: u32) -> QueryParams {
        let mut params = Vec::with_capacity(7);
        if let Some(query) = &self.query {
            params.push(("query".to_string(), query.clone()));
        }
        params.push(("status".to_string(), status.as_str().to_string()));
        if let Some(inbox) = self.inbox_id {
            params.push(("mailbox".to_string(), inbox.to_string()));
        }
        params.push(("sortField".to_string(), "createdAt".to_string()));
        params.push(("sortOrder".to_string(), "desc".to_string()));
        if self.include_threads {
            params.push(("embed".to_string(), "threads".to_string()));
        }
        params.push(("page".to_string(), page.to_string()));
        params
    }

    fn passes_client_filter(&self, conversation: &Conversation) -> bool {
        self.created_before
            .map_or(true, |bound| conversation.created_at < bound)
    }
}

/// Why a branch produced no conversations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchFailure {
    pub status: Status,
    pub message: String,
    pub code: &'static str,
}

/// Terminal outcome of one status branch
#[derive(Debug, Clone)]
pub struct StatusBranchResult {
    pub status: Status,

    /// Conversations in the API's page order, after the client filter
    pub conversations: Vec<Conversation>,

    /// Matching conversations still available after the client filter
    pub reported_total: u64,

    /// What the API reported before the client filter
    pub api_total: u64,

    /// Conversations received from the API
    pub fetched: usize,

    /// Conversations dropped by the created-before filter
    pub filtered_out: usize,

    /// Whether a client-side filter was applied
    pub client_filtered: bool,

    /// `reported_total` is an upper bound: paging stopped before any
    /// record passed the client filter
    pub total_is_estimate: bool,

    /// The first page's `page` object
    pub page_info: Option<Value>,

    pub error: Option<BranchFailure>,
}

impl StatusBranchResult {
    /// A failed branch; contributes nothing to results or totals
    pub fn failed(status: Status, error: &Error) -> Self {
        Self {
            status,
            conversations: Vec::new(),
            reported_total: 0,
            api_total: 0,
            fetched: 0,
            filtered_out: 0,
            client_filtered: false,
            total_is_estimate: false,
            page_info: None,
            error: Some(BranchFailure {
                status,
                message: error.to_string(),
                code: error.mcp_code(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs status branches against a transport
pub struct MultiStatusFetcher<'a> {
    transport: &'a dyn Transport,
    max_pages_per_branch: u32,
}

impl<'a> MultiStatusFetcher<'a> {
    pub fn new(transport: &'a dyn Transport, max_pages_per_branch: u32) -> Self {
        Self {
            transport,
            max_pages_per_branch: max_pages_per_branch.max(1),
        }
    }

    /// Page through one status until the request's limit is met, the pages
    /// run out, or the page cap is reached. Any error ends the branch.
    pub async fn fetch_branch(
        &self,
        request: &BranchRequest,
        status: Status,
    ) -> Result<StatusBranchResult> {
        let mut conversations = Vec::new();
        let mut fetched = 0;
        let mut filtered_out = 0;
        let mut api_total = 0;
        let mut page_info = None;
        let mut page_number = 1;
        let mut pages_fetched = 0;

        let exhausted = loop {
            let page = self
                .transport
                .fetch_page(CONVERSATIONS_PATH, &request.params(status, page_number))
                .await?;
            pages_fetched += 1;

            if pages_fetched == 1 {
                api_total = page.reported_total;
                page_info = page.page_info.clone();
            }

            for item in page.items {
                let conversation: Conversation = serde_json::from_value(item)?;
                fetched += 1;
                if request.passes_client_filter(&conversation) {
                    conversations.push(conversation);
                } else {
                    filtered_out += 1;
                }
            }

            match page.continuation {
                None => break true,
                Some(_) if conversations.len() >= request.limit => break false,
                Some(_) if pages_fetched >= self.max_pages_per_branch => {
                    warn!(
                        "Status {} stopped after {} pages with {} of {} conversations",
                        status, pages_fetched, fetched, api_total
                    );
                    break false;
                }
                Some(next) => page_number = next,
            }
        };

        let client_filtered = request.created_before.is_some();
        // Sorted newest first, so once one record passes every later one
        // does too. Before that the unseen records may still fail.
        let total_is_estimate = client_filtered && !exhausted && conversations.is_empty();
        let reported_total = if !client_filtered {
            api_total
        } else if exhausted {
            conversations.len() as u64
        } else {
            api_total.saturating_sub(filtered_out as u64)
        };
        if total_is_estimate {
            debug!(
                "Status {}: no record before the bound in {} pages, total {} is an upper bound",
                status, pages_fetched, api_total.saturating_sub(filtered_out as u64)
            );
        }

        debug!(
            "Status {}: {} pages, {} fetched, {} kept, total {} (API {})",
            status,
            pages_fetched,
            fetched,
            conversations.len(),
            reported_total,
            api_total
        );

        Ok(StatusBranchResult {
            status,
            conversations,
            reported_total,
            api_total,
            fetched,
            filtered_out,
            client_filtered,
            total_is_estimate,
            page_info,
            error: None,
        })
    }

    /// Fetch every status concurrently and wait for all of them.
    ///
    /// Results come back in canonical status order. Rate-limit, upstream,
    /// and not-found failures are recorded on their branch. Any other error
    /// fails the whole call, the first in canonical order winning.
    pub async fn fetch_all(
        &self,
        request: &BranchRequest,
        statuses: &[Status],
    ) -> Result<Vec<StatusBranchResult>> {
        let statuses = Status::canonical(statuses);
        info!(
            "Fetching {} status branches: {}",
            statuses.len(),
            statuses.iter().map(Status::as_str).collect::<Vec<_>>().join(", ")
        );

        let outcomes = join_all(
            statuses
                .iter()
                .map(|status| self.fetch_branch(request, *status)),
        )
        .await;

        let mut branches = Vec::with_capacity(outcomes.len());
        for (status, outcome) in statuses.iter().zip(outcomes) {
            match outcome {
                Ok(branch) => branches.push(branch),
                Err(e) if e.is_branch_recoverable() => {
                    warn!("Status {} failed, continuing without it: {}", status, e);
                    branches.push(StatusBranchResult::failed(*status, &e));
                }
                Err(e) => {
                    warn!("Status {} failed, aborting search: {}", status, e);
                    return Err(e);
                }
            }
        }

        Ok(branches)
    }
}
