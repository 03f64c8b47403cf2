//! Error types for TicketLens

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias using TicketLens's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a structured error response from the ticketing API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Missing, expired, or rejected credentials
    Unauthorized,
    /// The request itself was malformed or rejected as invalid
    InvalidInput,
    /// Too many requests
    RateLimited,
    /// Upstream 5xx, timeouts, and connection failures
    Upstream,
    /// The addressed resource does not exist
    NotFound,
}

impl ApiErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            400..=499 => Self::InvalidInput,
            _ => Self::Upstream,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::RateLimited => "RATE_LIMIT",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::NotFound => "NOT_FOUND",
        }
    }

    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Upstream)
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidInput => "invalid input",
            Self::RateLimited => "rate limited",
            Self::Upstream => "upstream failure",
            Self::NotFound => "not found",
        };
        f.write_str(label)
    }
}

/// Main error type for TicketLens
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Ticketing API errors
    #[error("API error ({kind}{}): {message}", status_suffix(.status))]
    Api {
        kind: ApiErrorKind,
        status: Option<u16>,
        message: String,
    },

    // MCP errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(", HTTP {}", s)).unwrap_or_default()
}

impl Error {
    /// Shorthand for a classified API error
    pub fn api(kind: ApiErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Api {
            kind,
            status,
            message: message.into(),
        }
    }

    /// The API classification, if this is a recognized API error
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Error::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if a multi-status search may record this as a failed
    /// branch and continue with the remaining statuses.
    ///
    /// Validation, authorization, and unclassified errors abort the whole
    /// operation.
    pub fn is_branch_recoverable(&self) -> bool {
        matches!(
            self.api_kind(),
            Some(ApiErrorKind::RateLimited | ApiErrorKind::Upstream | ApiErrorKind::NotFound)
        )
    }

    /// Returns an error code suitable for MCP error responses
    pub fn mcp_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "INVALID_INPUT",
            Error::Api { kind, .. } => kind.code(),
            Error::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Error::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-friendly action message for recoverable errors
    pub fn action_hint(&self) -> Option<&'static str> {
        match self.api_kind() {
            Some(ApiErrorKind::Unauthorized) => {
                Some("Check the configured client credentials or access token")
            }
            Some(ApiErrorKind::RateLimited) => Some("Please wait and try again"),
            Some(ApiErrorKind::Upstream) => Some("The ticketing API is unavailable, try again later"),
            Some(ApiErrorKind::InvalidInput) => Some("Check the search parameters"),
            _ => match self {
                Error::Validation(_) => Some("Check the search parameters"),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ApiErrorKind::from_status(401), ApiErrorKind::Unauthorized);
        assert_eq!(ApiErrorKind::from_status(403), ApiErrorKind::Unauthorized);
        assert_eq!(ApiErrorKind::from_status(404), ApiErrorKind::NotFound);
        assert_eq!(ApiErrorKind::from_status(429), ApiErrorKind::RateLimited);
        assert_eq!(ApiErrorKind::from_status(422), ApiErrorKind::InvalidInput);
        assert_eq!(ApiErrorKind::from_status(503), ApiErrorKind::Upstream);
    }

    #[test]
    fn test_branch_recoverability() {
        assert!(Error::api(ApiErrorKind::RateLimited, Some(429), "slow down").is_branch_recoverable());
        assert!(Error::api(ApiErrorKind::Upstream, Some(502), "bad gateway").is_branch_recoverable());
        assert!(Error::api(ApiErrorKind::NotFound, Some(404), "gone").is_branch_recoverable());
        assert!(!Error::api(ApiErrorKind::Unauthorized, Some(401), "nope").is_branch_recoverable());
        assert!(!Error::api(ApiErrorKind::InvalidInput, Some(400), "bad").is_branch_recoverable());
        assert!(!Error::Validation("bad date".into()).is_branch_recoverable());
        assert!(!Error::Other("defect".into()).is_branch_recoverable());
    }

    #[test]
    fn test_mcp_codes() {
        assert_eq!(Error::Validation("x".into()).mcp_code(), "INVALID_INPUT");
        assert_eq!(
            Error::api(ApiErrorKind::RateLimited, None, "x").mcp_code(),
            "RATE_LIMIT"
        );
        assert_eq!(Error::Other("x".into()).mcp_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_api_error_display() {
        let err = Error::api(ApiErrorKind::NotFound, Some(404), "Conversation 7 not found");
        assert_eq!(
            err.to_string(),
            "API error (not found, HTTP 404): Conversation 7 not found"
        );
    }
}
