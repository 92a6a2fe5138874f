//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - HEAD requests to refresh URL metadata
//! - GET requests to retrieve content for archiving
//! - Timing every attempt and classifying transport failures
//!
//! Fetch failures are values, not errors: a failed attempt still produces a
//! `FetchOutcome` so that it can be recorded as a snapshot.

use crate::config::UserAgentConfig;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client, Method};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// The request issued for a due URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMethod {
    /// Metadata refresh only
    Head,
    /// Full retrieval; the body is archived and parsed
    Get,
}

impl FetchMethod {
    fn as_method(self) -> Method {
        match self {
            FetchMethod::Head => Method::HEAD,
            FetchMethod::Get => Method::GET,
        }
    }
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMethod::Head => write!(f, "HEAD"),
            FetchMethod::Get => write!(f, "GET"),
        }
    }
}

/// Response metadata and, for GET, the full body
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    /// Headers in the order the client exposes them
    pub headers: Vec<(String, String)>,
    pub content_type: String,
    /// `Content-Length` if present, else the body length on GET
    pub content_length: Option<u64>,
    /// `None` for HEAD
    pub body: Option<Vec<u8>>,
}

impl FetchedResponse {
    pub fn is_html(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("text/html")
    }
}

/// Why an attempt produced no HTTP response
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to read body: {0}")]
    Body(String),
}

/// Result of one fetch attempt
#[derive(Debug)]
pub struct FetchOutcome {
    pub url: Url,
    pub method: FetchMethod,
    /// When the request was issued
    pub started_at: DateTime<Utc>,
    /// Wall-clock time until the response was fully read, in milliseconds
    pub duration_ms: i64,
    pub result: Result<FetchedResponse, FetchFailure>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn response(&self) -> Option<&FetchedResponse> {
        self.result.as_ref().ok()
    }
}

/// Builds an HTTP client with proper configuration
///
/// Per-request time limits are applied by [`fetch`], not by the client.
///
/// # Example
///
/// ```no_run
/// use tidemark::config::UserAgentConfig;
/// use tidemark::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "Tidemark".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches `url` with the given method, bounded by `timeout`
///
/// Never returns an error; transport, timeout and body-read failures are
/// reported in `FetchOutcome::result` and logged at warn level.
pub async fn fetch(client: &Client, url: &Url, method: FetchMethod, timeout: Duration) -> FetchOutcome {
    let started_at = Utc::now();
    let start = Instant::now();

    let result = match tokio::time::timeout(timeout, perform(client, url, method)).await {
        Ok(result) => result,
        Err(_) => Err(FetchFailure::Timeout(timeout)),
    };

    let duration_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

    match &result {
        Ok(response) => tracing::debug!(
            "{} {} -> {} in {}ms",
            method,
            url,
            response.status,
            duration_ms
        ),
        Err(e) => tracing::warn!("{} {} failed: {}", method, url, e),
    }

    FetchOutcome {
        url: url.clone(),
        method,
        started_at,
        duration_ms,
        result,
    }
}

async fn perform(client: &Client, url: &Url, method: FetchMethod) -> Result<FetchedResponse, FetchFailure> {
    let response = client
        .request(method.as_method(), url.clone())
        .send()
        .await
        .map_err(classify_error)?;

    let status = response.status().as_u16();
    let headers = ordered_headers(response.headers());
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let declared_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let body = match method {
        // Dropping the response closes the stream
        FetchMethod::Head => None,
        FetchMethod::Get => Some(
            response
                .bytes()
                .await
                .map_err(|e| FetchFailure::Body(e.to_string()))?
                .to_vec(),
        ),
    };

    let content_length =
        declared_length.or_else(|| body.as_ref().map(|b| b.len() as u64));

    Ok(FetchedResponse {
        status,
        headers,
        content_type,
        content_length,
        body,
    })
}

fn ordered_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn classify_error(error: reqwest::Error) -> FetchFailure {
    if error.is_connect() {
        FetchFailure::Connect(error.to_string())
    } else {
        FetchFailure::Transport(error.to_string())
    }
}
