//! Ticketing API transport
//!
//! The search engine only sees the [`Transport`] trait. [`ApiClient`] is the
//! HTTP implementation with authentication, pacing, retry, and caching.

mod cache;
mod client;
mod rate_limiter;

pub use cache::ResponseCache;
pub use client::ApiClient;
pub use rate_limiter::RequestRateLimiter;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

/// Query parameters for one request
pub type QueryParams = Vec<(String, String)>;

/// One page of a paginated list response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records from the first array under `_embedded`
    pub items: Vec<Value>,

    /// Total matching records across all pages (`page.totalElements`)
    pub reported_total: u64,

    /// Next page number, if any
    pub continuation: Option<u32>,

    /// The API's `page` object, untouched
    pub page_info: Option<Value>,
}

impl Page {
    /// Parse a HAL-style list response:
    /// `{"_embedded": {"<name>": [...]}, "page": {"number", "totalPages", "totalElements"}}`
    pub fn from_response(body: Value) -> Result<Self> {
        let Value::Object(mut body) = body else {
            return Err(Error::Other("List response is not a JSON object".to_string()));
        };

        let items = match body.remove("_embedded") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(embedded)) => embedded
                .into_iter()
                .find_map(|(_, v)| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .unwrap_or_default(),
            Some(_) => {
                return Err(Error::Other(
                    "List response has a non-object _embedded field".to_string(),
                ))
            }
        };

        let page_info = body.remove("page").filter(Value::is_object);

        let (reported_total, continuation) = match &page_info {
            Some(page) => {
                let total = page["totalElements"].as_u64().unwrap_or(items.len() as u64);
                let number = page["number"].as_u64().unwrap_or(1);
                let total_pages = page["totalPages"].as_u64().unwrap_or(number);
                let next = (number < total_pages)
                    .then(|| u32::try_from(number + 1).ok())
                    .flatten();
                (total, next)
            }
            None => (items.len() as u64, None),
        };

        Ok(Self {
            items,
            reported_total,
            continuation,
            page_info,
        })
    }
}

/// Read access to the ticketing API.
///
/// Implementations authenticate, retry, and cache internally. Failures are
/// returned as [`Error::Api`] with a classification, or as any other error
/// variant when the failure is not a recognized API response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a paginated list resource
    async fn fetch_page(&self, path: &str, params: &QueryParams) -> Result<Page>;

    /// GET a single resource
    async fn fetch_resource(&self, path: &str, params: &QueryParams) -> Result<Value>;
}
