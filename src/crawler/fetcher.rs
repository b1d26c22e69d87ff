//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests made by the harvester:
//! - Building HTTP clients with the configured user agent and timeouts
//! - Per-slot sessions for the extraction pool
//! - GET requests for HTML pages
//! - Error classification (timeouts, connection failures, HTTP status)

use crate::config::{HttpSettings, UserAgentConfig};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// Errors from fetching a page
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// The connection broke after it was established
    #[error("Network error talking to {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Expected HTML from {url}, got {content_type}")]
    NotHtml { url: String, content_type: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    /// Returns true if trying the same request again later may succeed
    ///
    /// Timeouts, connection failures, dropped connections, HTTP 429 and 5xx
    /// are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } | Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::NotHtml { .. } | Self::Request { .. } => false,
        }
    }

    /// HTTP status code, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else if e.is_request() || e.is_body() || e.is_decode() {
            // Peer hang-ups and truncated bodies; builder, redirect and URL
            // errors stay permanent
            Self::Network {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use news_harvest::config::{HttpSettings, UserAgentConfig};
/// use news_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), &HttpSettings::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    http: &HttpSettings,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(http.timeout_secs))
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches `url` and returns its HTML body
///
/// Non-2xx responses and non-HTML content types are errors. A response
/// without a Content-Type header is accepted.
pub async fn fetch_html(client: &Client, url: &Url) -> Result<String, FetchError> {
    let url_str = url.as_str();

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url_str, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            url: url_str.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if !content_type.is_empty() && !content_type.contains("html") {
        return Err(FetchError::NotHtml {
            url: url_str.to_string(),
            content_type,
        });
    }

    response
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(url_str, e))
}

/// An HTTP session owned by one worker slot
#[derive(Debug, Clone)]
pub struct Session {
    id: usize,
    client: Client,
}

impl Session {
    pub fn new(id: usize, client: Client) -> Self {
        Self { id, client }
    }

    /// Builds a session with its own connection pool
    pub fn build(
        id: usize,
        user_agent: &UserAgentConfig,
        http: &HttpSettings,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(id, build_http_client(user_agent, http)?))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetches an HTML page through this session
    pub async fn fetch_html(&self, url: &Url) -> Result<String, FetchError> {
        fetch_html(&self.client, url).await
    }
}
