//! Merging status branches into one result

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::models::{Conversation, Status};

use super::fetcher::{BranchFailure, StatusBranchResult};

/// Result accounting returned next to the conversations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationSummary {
    /// Conversations in this response
    pub returned_count: usize,

    /// Sum of successful branches' totals after client-side filtering
    pub available_total: u64,

    pub available_by_status: BTreeMap<Status, u64>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_statuses: Vec<Status>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BranchFailure>,

    /// Sum of successful branches' API totals, present when a client-side
    /// filter changed availability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_before_client_filter: Option<u64>,

    /// Statuses whose availability is an upper bound rather than a count
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub estimated_statuses: Vec<Status>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PaginationSummary {
    pub fn is_partial(&self) -> bool {
        !self.failed_statuses.is_empty()
    }
}

/// Merged, deduplicated, sorted, and limited conversations
#[derive(Debug, Clone, Default)]
pub struct ReconciledResult {
    pub conversations: Vec<Conversation>,
    pub pagination: PaginationSummary,
}

fn status_list(statuses: &[Status]) -> String {
    statuses
        .iter()
        .map(Status::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Combine branch results.
///
/// Branches are merged in canonical status order, keeping the first
/// occurrence of each conversation id. The merged list is sorted newest
/// first (stable, so ties keep merge order) and only then cut to `limit`.
pub fn reconcile(mut branches: Vec<StatusBranchResult>, limit: usize) -> ReconciledResult {
    branches.sort_by_key(|b| b.status);

    let mut seen = HashSet::new();
    let mut merged: Vec<Conversation> = Vec::new();
    let mut summary = PaginationSummary::default();
    let mut succeeded = Vec::new();
    let mut api_total = 0u64;
    let mut client_filtered = false;

    for branch in branches {
        if let Some(failure) = branch.error {
            summary.failed_statuses.push(branch.status);
            summary.errors.push(failure);
            continue;
        }

        succeeded.push(branch.status);
        summary.available_total += branch.reported_total;
        summary
            .available_by_status
            .insert(branch.status, branch.reported_total);
        api_total += branch.api_total;
        client_filtered |= branch.client_filtered;
        if branch.total_is_estimate {
            summary.estimated_statuses.push(branch.status);
        }

        for conversation in branch.conversations {
            if seen.insert(conversation.id) {
                merged.push(conversation);
            }
        }
    }

    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    merged.truncate(limit);
    summary.returned_count = merged.len();

    let mut notes = Vec::new();
    if summary.is_partial() {
        notes.push(format!(
            "Partial results: totals reflect only the successful statuses ({}). Failed statuses ({}) are not counted.",
            if succeeded.is_empty() {
                "none".to_string()
            } else {
                status_list(&succeeded)
            },
            status_list(&summary.failed_statuses)
        ));
    }
    if client_filtered {
        summary.total_before_client_filter = Some(api_total);
        notes.push(format!(
            "availableTotal ({}) counts only conversations created before createdBefore, which is applied after fetching; the API reported {} before that filter.",
            summary.available_total, api_total
        ));
    }
    if !summary.estimated_statuses.is_empty() {
        notes.push(format!(
            "Availability for {} is an upper bound: the page limit was reached before any conversation created before createdBefore was found.",
            status_list(&summary.estimated_statuses)
        ));
    }
    if !notes.is_empty() {
        summary.note = Some(notes.join(" "));
    }

    ReconciledResult {
        conversations: merged,
        pagination: summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiErrorKind, Error};
    use crate::search::testing::conversation;

    fn branch(status: Status, total: u64, convs: Vec<Conversation>) -> StatusBranchResult {
        StatusBranchResult {
            status,
            fetched: convs.len(),
            conversations: convs,
            reported_total: total,
            api_total: total,
            filtered_out: 0,
            client_filtered: false,
            total_is_estimate: false,
            page_info: None,
            error: None,
        }
    }

    #[test]
    fn test_partial_failure_accounting() {
        let rate_limited = Error::api(ApiErrorKind::RateLimited, Some(429), "slow down");
        let result = reconcile(
            vec![
                branch(Status::Closed, 5, vec![conversation(3, "2024-01-03T00:00:00Z")]),
                StatusBranchResult::failed(Status::Pending, &rate_limited),
                branch(Status::Active, 10, vec![conversation(1, "2024-01-01T00:00:00Z")]),
            ],
            10,
        );

        let p = &result.pagination;
        assert_eq!(p.available_total, 15);
        assert_eq!(p.failed_statuses, vec![Status::Pending]);
        assert_eq!(p.errors[0].code, "RATE_LIMIT");
        assert_eq!(p.available_by_status.get(&Status::Active), Some(&10));
        assert_eq!(p.available_by_status.get(&Status::Pending), None);
        assert!(p.note.as_deref().unwrap().contains("active, closed"));
        assert_eq!(
            result.conversations.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![3, 1]
        );
    }

    #[test]
    fn test_dedup_keeps_first_in_canonical_order() {
        let mut from_active = conversation(7, "2024-02-01T00:00:00Z");
        from_active.subject = "active copy".into();
        let mut from_closed = conversation(7, "2024-02-01T00:00:00Z");
        from_closed.subject = "closed copy".into();

        let result = reconcile(
            vec![
                branch(Status::Closed, 1, vec![from_closed]),
                branch(Status::Active, 1, vec![from_active]),
            ],
            10,
        );
        assert_eq!(result.conversations.len(), 1);
        assert_eq!(result.conversations[0].subject, "active copy");
    }

    #[test]
    fn test_sort_then_limit_across_branches() {
        let result = reconcile(
            vec![
                branch(
                    Status::Active,
                    2,
                    vec![
                        conversation(1, "2024-01-05T00:00:00Z"),
                        conversation(2, "2024-01-01T00:00:00Z"),
                    ],
                ),
                branch(
                    Status::Closed,
                    2,
                    vec![
                        conversation(3, "2024-01-09T00:00:00Z"),
                        conversation(4, "2024-01-03T00:00:00Z"),
                    ],
                ),
            ],
            3,
        );

        let ids: Vec<_> = result.conversations.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1, 4]);
        assert_eq!(result.pagination.returned_count, 3);
        assert_eq!(result.pagination.available_total, 4);
        assert!(result.pagination.note.is_none());
    }

    #[test]
    fn test_ties_keep_merge_order() {
        let at = "2024-01-01T00:00:00Z";
        let result = reconcile(
            vec![
                branch(Status::Pending, 1, vec![conversation(20, at)]),
                branch(Status::Active, 2, vec![conversation(10, at), conversation(11, at)]),
            ],
            10,
        );
        let ids: Vec<_> = result.conversations.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![10, 11, 20]);
    }

    #[test]
    fn test_client_filter_keeps_both_totals() {
        let mut filtered = branch(Status::Active, 17, vec![conversation(1, "2023-12-01T00:00:00Z")]);
        filtered.api_total = 20;
        filtered.filtered_out = 3;
        filtered.client_filtered = true;

        let result = reconcile(vec![filtered], 10);
        let p = &result.pagination;
        assert_eq!(p.available_total, 17);
        assert_eq!(p.total_before_client_filter, Some(20));
        assert!(p.note.as_deref().unwrap().contains("reported 20"));

        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["totalBeforeClientFilter"], 20);
        assert_eq!(json["availableByStatus"]["active"], 17);
        assert!(json.get("failedStatuses").is_none());
        assert!(json.get("estimatedStatuses").is_none());
    }

    #[test]
    fn test_estimated_totals_are_flagged() {
        let mut exact = branch(Status::Active, 6, vec![conversation(1, "2023-12-01T00:00:00Z")]);
        exact.api_total = 8;
        exact.filtered_out = 2;
        exact.client_filtered = true;

        let mut estimated = branch(Status::Closed, 40, vec![]);
        estimated.api_total = 50;
        estimated.filtered_out = 10;
        estimated.client_filtered = true;
        estimated.total_is_estimate = true;

        let result = reconcile(vec![estimated, exact], 10);
        let p = &result.pagination;
        assert_eq!(p.available_total, 46);
        assert_eq!(p.estimated_statuses, vec![Status::Closed]);
        let note = p.note.as_deref().unwrap();
        assert!(note.contains("Availability for closed is an upper bound"), "{note}");

        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["estimatedStatuses"], serde_json::json!(["closed"]));
    }

    #[test]
    fn test_all_failed() {
        let upstream = Error::api(ApiErrorKind::Upstream, Some(503), "down");
        let result = reconcile(
            vec![
                StatusBranchResult::failed(Status::Active, &upstream),
                StatusBranchResult::failed(Status::Closed, &upstream),
            ],
            10,
        );
        assert!(result.conversations.is_empty());
        assert_eq!(result.pagination.available_total, 0);
        assert_eq!(result.pagination.failed_statuses, vec![Status::Active, Status::Closed]);
        assert!(result.pagination.note.as_deref().unwrap().contains("(none)"));
    }

    #[test]
    fn test_generated_branches_merge_consistently() {
        // Deterministic pseudo-random timestamps across four statuses
        let mut seed = 17u64;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            seed >> 33
        };

        for limit in [1, 5, 12, 50] {
            let mut id = 0;
            let branches = [Status::Spam, Status::Closed, Status::Pending, Status::Active]
                .into_iter()
                .map(|status| {
                    let convs: Vec<_> = (0..(next() % 9))
                        .map(|_| {
                            id += 1;
                            let ts = chrono::DateTime::from_timestamp(1_700_000_000 + (next() % 10_000) as i64, 0)
                                .unwrap()
                                .to_rfc3339();
                            conversation(id, &ts)
                        })
                        .collect();
                    branch(status, convs.len() as u64, convs)
                })
                .collect();

            let result = reconcile(branches, limit);
            let convs = &result.conversations;
            assert!(convs.len() <= limit);
            let unique: HashSet<_> = convs.iter().map(|c| c.id).collect();
            assert_eq!(unique.len(), convs.len());
            assert!(convs.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        }
    }
}
