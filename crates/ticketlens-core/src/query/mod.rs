//! Search query construction
//!
//! Turns [`SearchCriteria`] into the ticketing API's query-language string.
//! Every user-supplied value is escaped before it is embedded in a quoted
//! clause, so a term can never close its quotes or add clauses of its own.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::SearchCriteria;

/// Date, or date and time with optional seconds, fraction, and zone
static ISO_8601: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?:T\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?$")
        .expect("valid ISO-8601 regex")
});

/// The API rejects sub-second precision
static FRACTIONAL_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(T\d{2}:\d{2}:\d{2})\.\d+").expect("valid fraction regex"));

/// Escape a term for use inside a double-quoted clause.
///
/// Backslashes first, then quotes.
pub fn escape_term(term: &str) -> String {
    term.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `(field:"a" OR field:"b")`, or None when no non-blank terms remain
fn or_group(field: &str, terms: &[String]) -> Option<String> {
    let clauses: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("{}:\"{}\"", field, escape_term(t)))
        .collect();

    if clauses.is_empty() {
        None
    } else {
        Some(format!("({})", clauses.join(" OR ")))
    }
}

/// `field:"value"`, or None for a blank value
fn exact_clause(field: &str, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(format!("{}:\"{}\"", field, escape_term(value)))
    }
}

/// Lowercase and drop a leading `@`
fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('@').to_ascii_lowercase()
}

/// Validate an ISO-8601 bound and strip fractional seconds
pub fn normalize_bound(name: &str, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if !ISO_8601.is_match(raw) {
        return Err(Error::Validation(format!(
            "{} must be an ISO-8601 date or date-time (e.g. 2024-01-31 or 2024-01-31T12:00:00Z), got '{}'",
            name, raw
        )));
    }
    Ok(FRACTIONAL_SECONDS.replace(raw, "$1").into_owned())
}

/// Parse a bound into an instant. Values without a zone are taken as UTC,
/// bare dates as midnight UTC.
pub fn parse_bound(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    let value = normalize_bound(name, raw)?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(&value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    Err(Error::Validation(format!(
        "{} is not a valid calendar date or time: '{}'",
        name, raw
    )))
}

/// `createdAt:[after TO before]` with `*` for an open end
fn date_range_clause(after: Option<&str>, before: Option<&str>) -> Result<Option<String>> {
    if after.is_none() && before.is_none() {
        return Ok(None);
    }
    let after = after
        .map(|v| normalize_bound("createdAfter", v))
        .transpose()?
        .unwrap_or_else(|| "*".to_string());
    let before = before
        .map(|v| normalize_bound("createdBefore", v))
        .transpose()?
        .unwrap_or_else(|| "*".to_string());
    Ok(Some(format!("createdAt:[{} TO {}]", after, before)))
}

/// Build the query string for `criteria`.
///
/// Returns `Ok(None)` when no filterable criteria were supplied.
pub fn build_query(criteria: &SearchCriteria) -> Result<Option<String>> {
    let mut clauses = Vec::new();

    clauses.extend(or_group("body", &criteria.content_terms));
    clauses.extend(or_group("subject", &criteria.subject_terms));
    clauses.extend(or_group("tag", &criteria.tags));

    if let Some(email) = &criteria.customer_email {
        clauses.extend(exact_clause("email", email));
    }
    if let Some(domain) = &criteria.email_domain {
        clauses.extend(exact_clause("email", &normalize_domain(domain)));
    }

    let mut query = clauses.join(" AND ");

    if let Some(range) = date_range_clause(
        criteria.created_after.as_deref(),
        criteria.created_before.as_deref(),
    )? {
        query = if query.is_empty() {
            range
        } else {
            format!("({}) AND {}", query, range)
        };
    }

    if query.is_empty() {
        Ok(None)
    } else {
        Ok(Some(query))
    }
}
