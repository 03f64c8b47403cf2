//! HTTP client for the ticketing API

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ApiErrorKind, Error, Result};

use super::{Page, QueryParams, RequestRateLimiter, ResponseCache, Transport};

/// Refresh client-credentials tokens this long before they expire
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Longest error body quoted in an error message
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    7200
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// A failed attempt, with the server's requested wait if it sent one
struct Failure {
    error: Error,
    retry_after: Option<Duration>,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Authenticated, paced, retrying, caching client
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    base_url: Url,
    rate_limiter: RequestRateLimiter,
    cache: ResponseCache,
    token: Mutex<Option<CachedToken>>,
}

impl ApiClient {
    /// Create a client from configuration
    pub fn new(config: ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))
            .map_err(|e| Error::Config(format!("Invalid api.base_url '{}': {}", config.base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("ticketlens/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            rate_limiter: RequestRateLimiter::new(config.rate_limit_per_second),
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_secs)),
            base_url,
            config,
            token: Mutex::new(None),
        })
    }

    /// Full request URL; also the cache key
    pub fn url_for(&self, path: &str, params: &QueryParams) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Other(format!("Invalid request path '{}': {}", path, e)))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Drop cached responses
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Bearer token for the next request
    async fn access_token(&self) -> Result<String> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.clone());
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Client-credentials exchange
    async fn request_token(&self) -> Result<CachedToken> {
        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            return Err(Error::api(
                ApiErrorKind::Unauthorized,
                None,
                "No API credentials configured (set api.client_id and api.client_secret, or api.access_token)",
            ));
        };

        info!("Requesting API access token");
        self.rate_limiter.wait().await;

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // A rejected grant is a credential problem whatever the status
            let kind = match ApiErrorKind::from_status(status.as_u16()) {
                ApiErrorKind::InvalidInput | ApiErrorKind::NotFound => ApiErrorKind::Unauthorized,
                other => other,
            };
            return Err(Error::api(
                kind,
                Some(status.as_u16()),
                format!("Token request failed: {}", error_message(&body)),
            ));
        }

        let body = response.text().await.map_err(network_error)?;
        let token: TokenResponse = serde_json::from_str(&body)?;
        debug!("Access token valid for {}s", token.expires_in);

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    async fn invalidate_token(&self) {
        if self.config.access_token.is_none() {
            *self.token.lock().await = None;
        }
    }

    /// GET `url` with retries for rate limiting and upstream failures
    async fn get_json(&self, url: Url) -> Result<Value> {
        if let Some(hit) = self.cache.get(url.as_str()) {
            debug!("Cache hit: {}", url);
            return Ok(hit);
        }

        let max_attempts = self.config.max_retries.max(1);
        let mut delay_ms = self.config.initial_retry_delay_ms;
        let mut attempt = 1;

        loop {
            match self.send_once(&url).await {
                Ok(value) => {
                    self.cache.insert(url.to_string(), value.clone());
                    return Ok(value);
                }
                Err(failure) => {
                    let transient = failure.error.api_kind().is_some_and(|k| k.is_transient());
                    if !transient || attempt >= max_attempts {
                        return Err(failure.error);
                    }

                    let wait = failure
                        .retry_after
                        .unwrap_or_else(|| Duration::from_millis(delay_ms));
                    warn!(
                        "Request attempt {}/{} failed: {}; retrying in {}ms",
                        attempt,
                        max_attempts,
                        failure.error,
                        wait.as_millis()
                    );
                    tokio::time::sleep(wait).await;

                    delay_ms = (delay_ms * 2).min(self.config.max_retry_delay_ms);
                    attempt += 1;
                }
            }
        }
    }

    async fn send_once(&self, url: &Url) -> std::result::Result<Value, Failure> {
        let token = self.access_token().await?;
        self.rate_limiter.wait().await;

        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&token)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            return Err(Failure {
                error: status_error(status, &body),
                retry_after,
            });
        }

        let body = response.text().await.map_err(network_error)?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).map_err(Error::from)?)
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn fetch_page(&self, path: &str, params: &QueryParams) -> Result<Page> {
        let url = self.url_for(path, params)?;
        Page::from_response(self.get_json(url).await?)
    }

    async fn fetch_resource(&self, path: &str, params: &QueryParams) -> Result<Value> {
        let url = self.url_for(path, params)?;
        self.get_json(url).await
    }
}

/// Transport-level failures (connect, timeout, reset) are upstream errors
fn network_error(e: reqwest::Error) -> Error {
    Error::api(
        ApiErrorKind::Upstream,
        e.status().map(|s| s.as_u16()),
        format!("Request failed: {}", e),
    )
}

/// Classify a non-success response
fn status_error(status: StatusCode, body: &str) -> Error {
    Error::api(
        ApiErrorKind::from_status(status.as_u16()),
        Some(status.as_u16()),
        error_message(body),
    )
}

/// The most useful human-readable part of an error body
fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let embedded = json["_embedded"]["errors"]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| {
                        let message = e["message"].as_str()?;
                        Some(match e["path"].as_str() {
                            Some(path) => format!("{}: {}", path, message),
                            None => message.to_string(),
                        })
                    })
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|s| !s.is_empty());

        let top = ["message", "error_description", "error"]
            .iter()
            .find_map(|key| json[*key].as_str().map(str::to_string));

        match (top, embedded) {
            (Some(top), Some(details)) => return format!("{} ({})", top, details),
            (Some(top), None) => return top,
            (None, Some(details)) => return details,
            (None, None) => {}
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// `Retry-After` in delta-seconds form
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client() -> ApiClient {
        ApiClient::new(ApiConfig {
            access_token: Some("static".into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let client = client();
        let params = vec![
            ("query".to_string(), r#"(body:"a b")"#.to_string()),
            ("status".to_string(), "active".to_string()),
        ];
        let url = client.url_for("/conversations", &params).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.helpscout.net/v2/conversations?query=%28body%3A%22a+b%22%29&status=active"
        );
        assert_eq!(
            client.url_for("mailboxes", &Vec::new()).unwrap().as_str(),
            "https://api.helpscout.net/v2/mailboxes"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let result = ApiClient::new(ApiConfig {
            base_url: "not a url".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_status_error_classification() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, r#"{"message":"Slow down"}"#);
        assert_eq!(err.api_kind(), Some(ApiErrorKind::RateLimited));
        assert!(err.to_string().contains("Slow down"));

        let err = status_error(StatusCode::BAD_REQUEST, "");
        assert_eq!(err.api_kind(), Some(ApiErrorKind::InvalidInput));
        assert!(err.to_string().contains("empty response body"));
    }

    #[test]
    fn test_error_message_includes_field_errors() {
        let body = r#"{"message":"Bad request","_embedded":{"errors":[{"path":"query","message":"Invalid syntax"}]}}"#;
        assert_eq!(error_message(body), "Bad request (query: Invalid syntax)");
        assert_eq!(error_message("<html>oops</html>"), "<html>oops</html>");
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_unauthorized() {
        let client = ApiClient::new(ApiConfig::default()).unwrap();
        let err = client.access_token().await.unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Unauthorized));
    }

    #[tokio::test]
    async fn test_static_token_needs_no_exchange() {
        assert_eq!(client().access_token().await.unwrap(), "static");
    }

    #[test]
    fn test_token_freshness_margin() {
        let soon = CachedToken {
            access_token: "t".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
        };
        assert!(!soon.is_fresh());
        let later = CachedToken {
            access_token: "t".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        assert!(later.is_fresh());
    }
}
