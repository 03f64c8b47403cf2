//! Scripted transport for search tests

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::Conversation;
use crate::transport::{Page, QueryParams, Transport};

/// A minimal API conversation
pub fn conversation(id: u64, created_at: &str) -> Conversation {
    serde_json::from_value(conversation_json(id, created_at)).unwrap()
}

pub fn conversation_json(id: u64, created_at: &str) -> Value {
    json!({
        "id": id,
        "number": id + 1000,
        "subject": format!("Conversation {}", id),
        "status": "active",
        "createdAt": created_at,
        "tags": []
    })
}

/// Answers keyed by the `status` parameter (or the path for other
/// requests), in call order, and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    pages: Mutex<HashMap<String, VecDeque<Result<Page>>>>,
    resources: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    calls: Mutex<Vec<(String, QueryParams)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, key: &str, page: Result<Page>) -> &Self {
        self.pages
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(page);
        self
    }

    pub fn push_resource(&self, path: &str, value: Result<Value>) -> &Self {
        self.resources
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(value);
        self
    }

    pub fn calls(&self) -> Vec<(String, QueryParams)> {
        self.calls.lock().clone()
    }

    pub fn param(params: &QueryParams, name: &str) -> Option<String> {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

/// A page of conversations with the given API total and next page
pub fn page(items: Vec<Value>, total: u64, next: Option<u32>) -> Page {
    Page {
        reported_total: total,
        continuation: next,
        page_info: Some(json!({"totalElements": total, "number": next.map_or(1, |n| n - 1)})),
        items,
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_page(&self, path: &str, params: &QueryParams) -> Result<Page> {
        self.calls.lock().push((path.to_string(), params.clone()));
        let key = Self::param(params, "status").unwrap_or_else(|| path.to_string());
        tokio::task::yield_now().await;
        self.pages
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Page::default()))
    }

    async fn fetch_resource(&self, path: &str, params: &QueryParams) -> Result<Value> {
        self.calls.lock().push((path.to_string(), params.clone()));
        self.resources
            .lock()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(crate::error::Error::api(
                    crate::error::ApiErrorKind::NotFound,
                    Some(404),
                    format!("{} not found", path),
                ))
            })
    }
}
