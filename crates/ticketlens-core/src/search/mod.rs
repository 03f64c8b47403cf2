//! Conversation search and retrieval
//!
//! [`SearchEngine`] ties the query builder, the multi-status fetcher, the
//! reconciler, and the content normalizer together.

mod fetcher;
mod reconcile;
#[cfg(test)]
pub(crate) mod testing;

pub use fetcher::{
    BranchFailure, BranchRequest, MultiStatusFetcher, StatusBranchResult, CONVERSATIONS_PATH,
};
pub use reconcile::{reconcile, PaginationSummary, ReconciledResult};

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::models::{Conversation, ConversationRecord, Inbox, SearchCriteria, Status, Thread};
use crate::normalize::ContentNormalizer;
use crate::query::{build_query, parse_bound};
use crate::transport::{QueryParams, Transport};

/// Caller-facing search result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub results: Vec<ConversationRecord>,

    pub pagination: PaginationSummary,

    /// The synthesized query string, if any criteria produced one
    pub search_query: Option<String>,

    /// The API's own page metadata, for single-status searches only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_info: Option<Value>,
}

/// Search and retrieval over a [`Transport`]
pub struct SearchEngine {
    transport: Arc<dyn Transport>,
    normalizer: ContentNormalizer,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        normalizer: ContentNormalizer,
        config: SearchConfig,
    ) -> Self {
        Self {
            transport,
            normalizer,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &ContentNormalizer {
        &self.normalizer
    }

    /// Run a search.
    ///
    /// One status is fetched directly and any error is returned as is.
    /// Several statuses are fetched concurrently and reconciled, with
    /// recoverable branch failures reported in the pagination summary.
    pub async fn search(&self, criteria: &SearchCriteria) -> Result<SearchOutcome> {
        if criteria.limit == 0 {
            return Err(Error::Validation("limit must be at least 1".to_string()));
        }
        let limit = criteria.limit.min(self.config.max_limit);

        let search_query = build_query(criteria)?;
        let created_before = criteria
            .created_before
            .as_deref()
            .map(|raw| parse_bound("createdBefore", raw))
            .transpose()?;

        let statuses = if criteria.statuses.is_empty() {
            Status::canonical(&self.config.default_statuses)
        } else {
            Status::canonical(&criteria.statuses)
        };

        let request = BranchRequest {
            query: search_query.clone(),
            inbox_id: criteria.inbox_id,
            include_threads: criteria.include_threads || self.config.include_threads,
            limit,
            created_before,
        };

        info!(
            "Searching {} status(es), limit {}, query {:?}",
            statuses.len(),
            limit,
            search_query
        );

        let fetcher = MultiStatusFetcher::new(self.transport.as_ref(), self.config.max_pages_per_branch);
        let (reconciled, page_info) = match statuses.as_slice() {
            [status] => {
                let branch = fetcher.fetch_branch(&request, *status).await?;
                let page_info = branch.page_info.clone();
                (reconcile(vec![branch], limit), page_info)
            }
            _ => {
                let branches = fetcher.fetch_all(&request, &statuses).await?;
                (reconcile(branches, limit), None)
            }
        };

        debug!(
            "Returning {} of {} conversations",
            reconciled.pagination.returned_count, reconciled.pagination.available_total
        );

        let results = reconciled
            .conversations
            .into_iter()
            .map(|c| ConversationRecord::new(c, &self.normalizer))
            .collect();

        Ok(SearchOutcome {
            results,
            pagination: reconciled.pagination,
            search_query,
            page_info,
        })
    }

    /// One conversation with its threads embedded
    pub async fn conversation(&self, id: u64) -> Result<Conversation> {
        let params: QueryParams = vec![("embed".to_string(), "threads".to_string())];
        let value = self
            .transport
            .fetch_resource(&format!("{}/{}", CONVERSATIONS_PATH, id), &params)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Threads of a conversation in API order (newest first), up to `limit`
    pub async fn threads(&self, conversation_id: u64, limit: usize) -> Result<Vec<Thread>> {
        let path = format!("{}/{}/threads", CONVERSATIONS_PATH, conversation_id);
        let items = self.collect_pages(&path, limit).await?;
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Error::from))
            .collect()
    }

    /// Every inbox visible to the credentials
    pub async fn inboxes(&self) -> Result<Vec<Inbox>> {
        let items = self.collect_pages("mailboxes", usize::MAX).await?;
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Error::from))
            .collect()
    }

    async fn collect_pages(&self, path: &str, limit: usize) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page_number = 1;

        for _ in 0..self.config.max_pages_per_branch.max(1) {
            let params: QueryParams = vec![("page".to_string(), page_number.to_string())];
            let page = self.transport.fetch_page(path, &params).await?;
            items.extend(page.items);
            match page.continuation {
                Some(next) if items.len() < limit => page_number = next,
                _ => break,
            }
        }

        items.truncate(limit);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{conversation_json, page, ScriptedTransport};
    use super::*;
    use crate::error::ApiErrorKind;
    use serde_json::json;

    fn engine(transport: Arc<ScriptedTransport>) -> SearchEngine {
        SearchEngine::new(transport, ContentNormalizer::default(), SearchConfig::default())
    }

    fn api_error(kind: ApiErrorKind, status: u16) -> Error {
        Error::api(kind, Some(status), "scripted failure")
    }

    #[tokio::test]
    async fn test_rate_limited_branch_is_partial() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_page(
                "active",
                Ok(page(vec![conversation_json(1, "2024-03-01T00:00:00Z")], 10, None)),
            )
            .push_page("pending", Err(api_error(ApiErrorKind::RateLimited, 429)))
            .push_page(
                "closed",
                Ok(page(vec![conversation_json(2, "2024-03-05T00:00:00Z")], 5, None)),
            );

        let criteria = SearchCriteria::new(10)
            .with_statuses([Status::Active, Status::Pending, Status::Closed]);
        let outcome = engine(transport).search(&criteria).await.unwrap();

        assert_eq!(outcome.pagination.available_total, 15);
        assert_eq!(outcome.pagination.failed_statuses, vec![Status::Pending]);
        let ids: Vec<_> = outcome.results.iter().map(|r| r.conversation.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(outcome.page_info.is_none());
        assert!(outcome.pagination.note.unwrap().contains("active, closed"));
    }

    #[tokio::test]
    async fn test_unauthorized_branch_aborts() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_page("active", Ok(page(vec![], 0, None)))
            .push_page("closed", Err(api_error(ApiErrorKind::Unauthorized, 401)));

        let criteria = SearchCriteria::new(10).with_statuses([Status::Active, Status::Closed]);
        let err = engine(transport).search(&criteria).await.unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Unauthorized));
    }

    #[tokio::test]
    async fn test_unclassified_branch_error_aborts() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_page("active", Err(Error::Other("unexpected shape".into())))
            .push_page("closed", Ok(page(vec![], 0, None)));

        let criteria = SearchCriteria::new(10).with_statuses([Status::Closed, Status::Active]);
        let err = engine(transport).search(&criteria).await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }

    #[tokio::test]
    async fn test_all_branches_are_awaited_before_abort() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_page("active", Err(api_error(ApiErrorKind::InvalidInput, 400)))
            .push_page(
                "pending",
                Ok(page(vec![conversation_json(1, "2024-03-01T00:00:00Z")], 1, None)),
            )
            .push_page("closed", Ok(page(vec![], 0, None)));

        let criteria = SearchCriteria::new(10)
            .with_statuses([Status::Active, Status::Pending, Status::Closed]);
        assert!(engine(transport.clone()).search(&criteria).await.is_err());

        let statuses: Vec<_> = transport
            .calls()
            .iter()
            .filter_map(|(_, params)| ScriptedTransport::param(params, "status"))
            .collect();
        assert_eq!(statuses, vec!["active", "pending", "closed"]);
    }

    #[tokio::test]
    async fn test_single_status_propagates_recoverable_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page("pending", Err(api_error(ApiErrorKind::RateLimited, 429)));

        let criteria = SearchCriteria::new(10).with_statuses([Status::Pending]);
        let err = engine(transport).search(&criteria).await.unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::RateLimited));
    }

    #[tokio::test]
    async fn test_single_status_created_before_filter() {
        let items: Vec<_> = (1..=8)
            .map(|i| {
                // 3 newest are on or after the bound
                let day = 12 - i;
                conversation_json(i as u64, &format!("2024-01-{:02}T12:00:00Z", day))
            })
            .collect();

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page("active", Ok(page(items, 20, Some(2))));

        let criteria = SearchCriteria::new(5)
            .with_statuses([Status::Active])
            .created_before("2024-01-09T00:00:00Z");
        let outcome = engine(transport.clone()).search(&criteria).await.unwrap();

        let p = &outcome.pagination;
        assert_eq!(p.returned_count, 5);
        assert_eq!(p.total_before_client_filter, Some(20));
        assert_eq!(p.available_total, 17);
        assert!(p.estimated_statuses.is_empty());
        let note = p.note.as_deref().unwrap();
        assert!(note.contains("20") && note.contains("17"), "{note}");
        assert_eq!(outcome.page_info.unwrap()["totalElements"], 20);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.conversation.created_at.to_rfc3339() < "2024-01-09".to_string()));

        // One page was enough to fill the limit
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_page_cap_before_any_match_is_an_estimate() {
        let newer = |id: u64, day: u32| conversation_json(id, &format!("2024-03-{:02}T12:00:00Z", day));

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page("active", Ok(page(vec![newer(1, 20), newer(2, 19)], 30, Some(2))));
        let config = SearchConfig {
            max_pages_per_branch: 1,
            ..SearchConfig::default()
        };
        let engine = SearchEngine::new(transport.clone(), ContentNormalizer::default(), config);

        let criteria = SearchCriteria::new(5)
            .with_statuses([Status::Active])
            .created_before("2024-01-01");
        let outcome = engine.search(&criteria).await.unwrap();

        let p = &outcome.pagination;
        assert!(outcome.results.is_empty());
        assert_eq!(p.available_total, 28);
        assert_eq!(p.estimated_statuses, vec![Status::Active]);
        assert!(p.note.as_deref().unwrap().contains("upper bound"));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_branch_pages_until_limit() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_page(
                "closed",
                Ok(page(vec![conversation_json(1, "2024-01-03T00:00:00Z")], 3, Some(2))),
            )
            .push_page(
                "closed",
                Ok(page(vec![conversation_json(2, "2024-01-02T00:00:00Z")], 3, Some(3))),
            )
            .push_page(
                "closed",
                Ok(page(vec![conversation_json(3, "2024-01-01T00:00:00Z")], 3, None)),
            );

        let criteria = SearchCriteria::new(2).with_statuses([Status::Closed]);
        let outcome = engine(transport.clone()).search(&criteria).await.unwrap();

        assert_eq!(outcome.results.len(), 2);
        let pages: Vec<_> = transport
            .calls()
            .iter()
            .filter_map(|(_, p)| ScriptedTransport::param(p, "page"))
            .collect();
        assert_eq!(pages, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_request_parameters() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut criteria = SearchCriteria::new(10)
            .with_statuses([Status::Active])
            .with_content_terms(["refund"]);
        criteria.inbox_id = Some(42);
        criteria.include_threads = true;

        let outcome = engine(transport.clone()).search(&criteria).await.unwrap();
        assert_eq!(outcome.search_query.as_deref(), Some(r#"(body:"refund")"#));

        let (path, params) = transport.calls().remove(0);
        assert_eq!(path, "conversations");
        for (name, value) in [
            ("query", r#"(body:"refund")"#),
            ("status", "active"),
            ("mailbox", "42"),
            ("sortField", "createdAt"),
            ("sortOrder", "desc"),
            ("embed", "threads"),
        ] {
            assert_eq!(ScriptedTransport::param(&params, name).as_deref(), Some(value), "{name}");
        }
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = engine(transport.clone());

        let bad_date = SearchCriteria::new(10).created_before("last week");
        assert!(matches!(engine.search(&bad_date).await, Err(Error::Validation(_))));
        assert!(matches!(
            engine.search(&SearchCriteria::new(0)).await,
            Err(Error::Validation(_))
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_thread_bodies_are_normalized() {
        let mut conv = conversation_json(9, "2024-01-01T00:00:00Z");
        conv["_embedded"] = json!({"threads": [{
            "id": 1,
            "type": "customer",
            "body": "<p>Hello &amp; thanks</p><img src=\"https://x.test/p.gif\" width=\"1\" height=\"1\">"
        }]});

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page("active", Ok(page(vec![conv], 1, None)));

        let criteria = SearchCriteria::new(10).with_statuses([Status::Active]);
        let outcome = engine(transport).search(&criteria).await.unwrap();
        assert_eq!(outcome.results[0].threads[0].body, "Hello & thanks");
        assert!(outcome.results[0].threads[0].images.is_empty());
    }

    #[tokio::test]
    async fn test_threads_and_inboxes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_page(
                "conversations/9/threads",
                Ok(page(
                    vec![json!({"id": 1, "type": "message", "body": "a"}), json!({"id": 2, "type": "customer", "body": "b"})],
                    3,
                    Some(2),
                )),
            )
            .push_page(
                "conversations/9/threads",
                Ok(page(vec![json!({"id": 3, "type": "customer", "body": "c"})], 3, None)),
            )
            .push_page(
                "mailboxes",
                Ok(page(vec![json!({"id": 5, "name": "Support", "email": "help@corp.test"})], 1, None)),
            );

        let engine = engine(transport);
        let threads = engine.threads(9, 10).await.unwrap();
        assert_eq!(threads.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let inboxes = engine.inboxes().await.unwrap();
        assert_eq!(inboxes[0].name, "Support");

        let err = engine.conversation(404).await.unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::NotFound));
    }
}
