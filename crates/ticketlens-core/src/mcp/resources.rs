//! MCP resource implementations

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::protocol::{ResourceContent, ResourceDefinition};
use crate::error::{Error, Result};
use crate::models::ConversationRecord;
use crate::search::SearchEngine;

const SCHEME: &str = "ticketlens://";

/// Get all resource definitions
pub fn get_resource_definitions() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            uri: "ticketlens://inboxes".to_string(),
            name: "Inboxes".to_string(),
            description: "All inboxes visible to the configured credentials".to_string(),
            mime_type: Some("application/json".to_string()),
        },
        ResourceDefinition {
            uri: "ticketlens://conversations/{conversation_id}".to_string(),
            name: "Conversation".to_string(),
            description: "A conversation with normalized thread bodies".to_string(),
            mime_type: Some("application/json".to_string()),
        },
    ]
}

/// Resource handler
pub struct ResourceHandler {
    engine: Arc<SearchEngine>,
}

impl ResourceHandler {
    /// Create a new resource handler
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self { engine }
    }

    /// Read a resource
    pub async fn read(&self, uri: &str) -> Result<Value> {
        debug!("Reading resource: {}", uri);

        let path = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))?;

        let value = match path.split('/').collect::<Vec<_>>().as_slice() {
            ["inboxes"] => serde_json::to_value(self.engine.inboxes().await?)?,
            ["conversations", id] => {
                let id: u64 = id
                    .parse()
                    .map_err(|_| Error::ResourceNotFound(uri.to_string()))?;
                let conversation = self.engine.conversation(id).await?;
                serde_json::to_value(ConversationRecord::new(
                    conversation,
                    self.engine.normalizer(),
                ))?
            }
            _ => return Err(Error::ResourceNotFound(uri.to_string())),
        };

        Ok(json!({
            "contents": [ResourceContent::json(uri, &value)]
        }))
    }
}
