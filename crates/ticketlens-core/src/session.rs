//! Per-connection call history

/// Tool calls made over one server connection, in order.
///
/// Owned by the server loop and handed to each tool call. It only feeds
/// advisory warnings; no tool refuses to run because of it.
#[derive(Debug, Clone, Default)]
pub struct Session {
    calls: Vec<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool call
    pub fn record(&mut self, tool: &str) {
        self.calls.push(tool.to_string());
    }

    /// Whether `tool` was called earlier in this session
    pub fn has_called(&self, tool: &str) -> bool {
        self.calls.iter().any(|c| c == tool)
    }

    /// Tool names in call order
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Warnings for a search scoped to an inbox the caller never looked up
    pub fn inbox_warnings(&self, inbox_id: Option<u64>) -> Vec<String> {
        match inbox_id {
            Some(id) if !self.has_called("list_inboxes") => vec![format!(
                "inbox_id {} was used without calling list_inboxes in this session; \
                 call list_inboxes to confirm the ID if results look wrong",
                id
            )],
            _ => Vec::new(),
        }
    }
}
