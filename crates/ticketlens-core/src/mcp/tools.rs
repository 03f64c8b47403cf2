//! MCP tool implementations

use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::debug;

use super::protocol::{ToolDefinition, ToolResult};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ConversationRecord, SearchCriteria, Status};
use crate::search::SearchEngine;
use crate::session::Session;

/// Every tool this server exposes
pub const TOOL_NAMES: [&str; 7] = [
    "search_conversations",
    "comprehensive_search",
    "advanced_conversation_search",
    "get_conversation_summary",
    "get_threads",
    "list_inboxes",
    "get_server_time",
];

const DEFAULT_TIMEFRAME_DAYS: u32 = 60;

fn status_schema() -> Value {
    json!({
        "type": "array",
        "items": {"type": "string", "enum": ["active", "pending", "closed", "spam"]},
        "description": "Statuses to search (default: active, pending, closed). Each status is a separate API query."
    })
}

/// Get all tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "search_conversations".to_string(),
            description: "List conversations by inbox, status, tag, and creation date, newest first. Use comprehensive_search or advanced_conversation_search to match message content.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "inbox_id": {
                        "type": "integer",
                        "description": "Inbox to search (IDs come from list_inboxes)"
                    },
                    "statuses": status_schema(),
                    "tag": {
                        "type": "string",
                        "description": "Only conversations with this tag"
                    },
                    "created_after": {
                        "type": "string",
                        "description": "ISO-8601 date or date-time lower bound"
                    },
                    "created_before": {
                        "type": "string",
                        "description": "ISO-8601 date or date-time upper bound (exclusive)"
                    },
                    "limit": {
                        "type": "integer",
                        "default": 50,
                        "minimum": 1,
                        "maximum": 100
                    }
                }
            }),
        },
        ToolDefinition {
            name: "comprehensive_search".to_string(),
            description: "Find conversations mentioning any of the search terms across several statuses at once. Reports per-status totals and which statuses failed, if any.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "search_terms": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "description": "Terms to look for; a conversation matches if it contains any of them"
                    },
                    "search_in": {
                        "type": "string",
                        "enum": ["body", "subject"],
                        "default": "body",
                        "description": "Search message bodies or subject lines"
                    },
                    "statuses": status_schema(),
                    "inbox_id": {
                        "type": "integer",
                        "description": "Inbox to search (IDs come from list_inboxes)"
                    },
                    "timeframe_days": {
                        "type": "integer",
                        "default": DEFAULT_TIMEFRAME_DAYS,
                        "minimum": 1,
                        "description": "Only conversations created within this many days"
                    },
                    "created_before": {
                        "type": "string",
                        "description": "ISO-8601 upper bound (exclusive)"
                    },
                    "limit": {
                        "type": "integer",
                        "default": 50,
                        "minimum": 1,
                        "maximum": 100
                    }
                },
                "required": ["search_terms"]
            }),
        },
        ToolDefinition {
            name: "advanced_conversation_search".to_string(),
            description: "Search with separate content, subject, tag, and customer filters. Terms within a field are OR-ed; different fields are AND-ed.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "content_terms": {"type": "array", "items": {"type": "string"}, "description": "Match any of these in message bodies"},
                    "subject_terms": {"type": "array", "items": {"type": "string"}, "description": "Match any of these in the subject"},
                    "tags": {"type": "array", "items": {"type": "string"}, "description": "Match any of these tags"},
                    "customer_email": {"type": "string", "description": "Exact customer email address"},
                    "email_domain": {"type": "string", "description": "Customer email domain, e.g. example.com"},
                    "statuses": status_schema(),
                    "inbox_id": {"type": "integer", "description": "Inbox to search (IDs come from list_inboxes)"},
                    "created_after": {"type": "string", "description": "ISO-8601 lower bound"},
                    "created_before": {"type": "string", "description": "ISO-8601 upper bound (exclusive)"},
                    "limit": {"type": "integer", "default": 50, "minimum": 1, "maximum": 100}
                }
            }),
        },
        ToolDefinition {
            name: "get_conversation_summary".to_string(),
            description: "Get a conversation with its first customer message and latest staff reply, bodies cleaned of markup and quoted history.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "conversation_id": {"type": "integer", "description": "Conversation ID (not the ticket number)"}
                },
                "required": ["conversation_id"]
            }),
        },
        ToolDefinition {
            name: "get_threads".to_string(),
            description: "Get every message of a conversation, newest first, with cleaned bodies and inline image references.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "conversation_id": {"type": "integer", "description": "Conversation ID (not the ticket number)"},
                    "limit": {"type": "integer", "default": 50, "minimum": 1, "maximum": 100}
                },
                "required": ["conversation_id"]
            }),
        },
        ToolDefinition {
            name: "list_inboxes".to_string(),
            description: "List inboxes with their IDs. Call this before scoping a search with inbox_id.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: "get_server_time".to_string(),
            description: "Current server time in UTC and the configured timezone, for building date filters.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
    ]
}

/// Numeric IDs sometimes arrive as strings
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u64),
    Text(String),
}

impl IdRepr {
    fn into_id<E: serde::de::Error>(self) -> std::result::Result<u64, E> {
        match self {
            IdRepr::Number(n) => Ok(n),
            IdRepr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a numeric ID, got '{}'", s))),
        }
    }
}

fn id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    IdRepr::deserialize(d)?.into_id()
}

fn optional_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    Option::<IdRepr>::deserialize(d)?
        .map(IdRepr::into_id)
        .transpose()
}

/// Arguments for `search_conversations`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConversationsArgs {
    #[serde(deserialize_with = "optional_id")]
    pub inbox_id: Option<u64>,
    pub statuses: Option<Vec<Status>>,
    pub tag: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub limit: Option<usize>,
}

/// Where `comprehensive_search` looks for its terms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchIn {
    #[default]
    Body,
    Subject,
}

/// Arguments for `comprehensive_search`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ComprehensiveSearchArgs {
    pub search_terms: Vec<String>,
    pub search_in: SearchIn,
    pub statuses: Option<Vec<Status>>,
    #[serde(deserialize_with = "optional_id")]
    pub inbox_id: Option<u64>,
    pub timeframe_days: Option<u32>,
    pub created_before: Option<String>,
    pub limit: Option<usize>,
}

/// Arguments for `advanced_conversation_search`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdvancedSearchArgs {
    pub content_terms: Vec<String>,
    pub subject_terms: Vec<String>,
    pub tags: Vec<String>,
    pub customer_email: Option<String>,
    pub email_domain: Option<String>,
    pub statuses: Option<Vec<Status>>,
    #[serde(deserialize_with = "optional_id")]
    pub inbox_id: Option<u64>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub limit: Option<usize>,
}

/// Arguments naming one conversation
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationIdArgs {
    #[serde(deserialize_with = "id")]
    pub conversation_id: u64,
}

/// Arguments for `get_threads`
#[derive(Debug, Clone, Deserialize)]
pub struct GetThreadsArgs {
    #[serde(deserialize_with = "id")]
    pub conversation_id: u64,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Tools without arguments
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoArgs {}

/// A validated tool invocation
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    SearchConversations(SearchConversationsArgs),
    ComprehensiveSearch(ComprehensiveSearchArgs),
    AdvancedConversationSearch(AdvancedSearchArgs),
    GetConversationSummary(ConversationIdArgs),
    GetThreads(GetThreadsArgs),
    ListInboxes(NoArgs),
    GetServerTime(NoArgs),
}

fn check_limit(limit: Option<usize>) -> Result<()> {
    match limit {
        Some(0) => Err(Error::Validation("limit must be at least 1".to_string())),
        _ => Ok(()),
    }
}

fn check_email(email: Option<&str>) -> Result<()> {
    match email {
        Some(e) if !e.contains('@') || e.trim().len() < 3 => Err(Error::Validation(format!(
            "customer_email '{}' is not an email address",
            e
        ))),
        _ => Ok(()),
    }
}

impl ToolCall {
    /// Parse `tools/call` arguments for `name`
    pub fn parse(name: &str, arguments: Value) -> Result<Self> {
        if !TOOL_NAMES.contains(&name) {
            return Err(Error::ToolNotFound(name.to_string()));
        }
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        let call: ToolCall = serde_json::from_value(json!({"name": name, "arguments": arguments}))
            .map_err(|e| Error::Validation(format!("Invalid arguments for {}: {}", name, e)))?;
        call.validate()?;
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SearchConversations(_) => "search_conversations",
            ToolCall::ComprehensiveSearch(_) => "comprehensive_search",
            ToolCall::AdvancedConversationSearch(_) => "advanced_conversation_search",
            ToolCall::GetConversationSummary(_) => "get_conversation_summary",
            ToolCall::GetThreads(_) => "get_threads",
            ToolCall::ListInboxes(_) => "list_inboxes",
            ToolCall::GetServerTime(_) => "get_server_time",
        }
    }

    /// Checks serde cannot express
    fn validate(&self) -> Result<()> {
        match self {
            ToolCall::SearchConversations(args) => check_limit(args.limit),
            ToolCall::ComprehensiveSearch(args) => {
                if args.search_terms.iter().all(|t| t.trim().is_empty()) {
                    return Err(Error::Validation(
                        "search_terms must contain at least one non-empty term".to_string(),
                    ));
                }
                if args.timeframe_days == Some(0) {
                    return Err(Error::Validation(
                        "timeframe_days must be at least 1".to_string(),
                    ));
                }
                check_limit(args.limit)
            }
            ToolCall::AdvancedConversationSearch(args) => {
                check_email(args.customer_email.as_deref())?;
                check_limit(args.limit)
            }
            ToolCall::GetThreads(args) => check_limit(args.limit),
            ToolCall::GetConversationSummary(_) | ToolCall::ListInboxes(_) | ToolCall::GetServerTime(_) => {
                Ok(())
            }
        }
    }
}

/// Executes tool calls against the search engine
pub struct ToolHandler {
    engine: Arc<SearchEngine>,
    config: Arc<Config>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(engine: Arc<SearchEngine>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }

    /// Parse, run, and wrap a `tools/call` request
    pub async fn call(&self, name: &str, arguments: Value, session: &mut Session) -> Result<Value> {
        debug!("Executing tool: {} with args: {}", name, arguments);
        session.record(name);
        let call = ToolCall::parse(name, arguments)?;
        let result = self.execute(call, session).await?;
        Ok(serde_json::to_value(ToolResult::json(&result))?)
    }

    /// Run a parsed tool call
    pub async fn execute(&self, call: ToolCall, session: &Session) -> Result<Value> {
        match call {
            ToolCall::SearchConversations(args) => self.search_conversations(args, session).await,
            ToolCall::ComprehensiveSearch(args) => self.comprehensive_search(args, session).await,
            ToolCall::AdvancedConversationSearch(args) => {
                self.advanced_conversation_search(args, session).await
            }
            ToolCall::GetConversationSummary(args) => {
                self.get_conversation_summary(args.conversation_id).await
            }
            ToolCall::GetThreads(args) => self.get_threads(args).await,
            ToolCall::ListInboxes(_) => self.list_inboxes().await,
            ToolCall::GetServerTime(_) => Ok(self.get_server_time()),
        }
    }

    fn statuses(&self, requested: Option<Vec<Status>>) -> Vec<Status> {
        requested
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.search.default_statuses.clone())
    }

    fn limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.search.default_limit)
            .min(self.config.search.max_limit)
    }

    /// Run the search and attach session warnings
    async fn run_search(&self, criteria: SearchCriteria, session: &Session) -> Result<Value> {
        let warnings = session.inbox_warnings(criteria.inbox_id);
        let outcome = self.engine.search(&criteria).await?;
        let mut value = serde_json::to_value(&outcome)?;
        if !warnings.is_empty() {
            value["warnings"] = json!(warnings);
        }
        Ok(value)
    }

    async fn search_conversations(
        &self,
        args: SearchConversationsArgs,
        session: &Session,
    ) -> Result<Value> {
        let criteria = SearchCriteria {
            tags: args.tag.into_iter().collect(),
            inbox_id: args.inbox_id,
            statuses: self.statuses(args.statuses),
            created_after: args.created_after,
            created_before: args.created_before,
            include_threads: self.config.search.include_threads,
            ..SearchCriteria::new(self.limit(args.limit))
        };
        self.run_search(criteria, session).await
    }

    async fn comprehensive_search(
        &self,
        args: ComprehensiveSearchArgs,
        session: &Session,
    ) -> Result<Value> {
        let days = args.timeframe_days.unwrap_or(DEFAULT_TIMEFRAME_DAYS);
        let created_after = (Utc::now() - Duration::days(i64::from(days)))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut criteria = SearchCriteria {
            inbox_id: args.inbox_id,
            statuses: self.statuses(args.statuses),
            created_after: Some(created_after),
            created_before: args.created_before,
            include_threads: self.config.search.include_threads,
            ..SearchCriteria::new(self.limit(args.limit))
        };
        match args.search_in {
            SearchIn::Body => criteria.content_terms = args.search_terms.clone(),
            SearchIn::Subject => criteria.subject_terms = args.search_terms.clone(),
        }

        let mut value = self.run_search(criteria, session).await?;
        value["searchTerms"] = json!(args.search_terms);
        value["timeframeDays"] = json!(days);
        Ok(value)
    }

    async fn advanced_conversation_search(
        &self,
        args: AdvancedSearchArgs,
        session: &Session,
    ) -> Result<Value> {
        let criteria = SearchCriteria {
            content_terms: args.content_terms,
            subject_terms: args.subject_terms,
            tags: args.tags,
            customer_email: args.customer_email,
            email_domain: args.email_domain,
            inbox_id: args.inbox_id,
            statuses: self.statuses(args.statuses),
            created_after: args.created_after,
            created_before: args.created_before,
            include_threads: self.config.search.include_threads,
            ..SearchCriteria::new(self.limit(args.limit))
        };
        self.run_search(criteria, session).await
    }

    async fn get_conversation_summary(&self, conversation_id: u64) -> Result<Value> {
        let conversation = self.engine.conversation(conversation_id).await?;
        let normalizer = self.engine.normalizer();

        let threads = conversation.threads();
        let thread_count = threads.len();
        let first_customer_message = threads
            .iter()
            .filter(|t| t.is_customer_message())
            .min_by_key(|t| t.created_at)
            .map(|t| t.normalize(normalizer));
        let latest_staff_reply = threads
            .iter()
            .filter(|t| t.is_staff_reply())
            .max_by_key(|t| t.created_at)
            .map(|t| t.normalize(normalizer));

        let record = ConversationRecord {
            conversation,
            threads: Vec::new(),
        };

        Ok(json!({
            "conversation": record,
            "firstCustomerMessage": first_customer_message,
            "latestStaffReply": latest_staff_reply,
            "threadCount": thread_count
        }))
    }

    async fn get_threads(&self, args: GetThreadsArgs) -> Result<Value> {
        let threads = self
            .engine
            .threads(args.conversation_id, self.limit(args.limit))
            .await?;
        let normalizer = self.engine.normalizer();
        let threads: Vec<_> = threads.iter().map(|t| t.normalize(normalizer)).collect();

        Ok(json!({
            "conversationId": args.conversation_id,
            "count": threads.len(),
            "threads": threads
        }))
    }

    async fn list_inboxes(&self) -> Result<Value> {
        let inboxes = self.engine.inboxes().await?;
        Ok(json!({
            "count": inboxes.len(),
            "inboxes": inboxes
        }))
    }

    fn get_server_time(&self) -> Value {
        let now = Utc::now();
        let tz: Tz = self.config.general.timezone.parse().unwrap_or(Tz::UTC);
        json!({
            "utc": now.to_rfc3339_opts(SecondsFormat::Secs, true),
            "unixTimestamp": now.timestamp(),
            "timezone": tz.name(),
            "local": now.with_timezone(&tz).to_rfc3339_opts(SecondsFormat::Secs, false)
        })
    }
}
