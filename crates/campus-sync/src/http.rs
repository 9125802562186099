//! Async HTTP client wrapping reqwest.
//!
//! Not a browser, just HTTP requests with a persistent cookie jar, which is
//! all the portal session needs. Every call takes an explicit timeout so the
//! fetcher can escalate it from one attempt to the next. Failures are
//! reported as [`FetchFault`]s classified for the retry policy.

use std::error::Error as StdError;
use std::time::Duration;

use crate::types::{SyncError, SyncResult};

/// Desktop browser user-agent; the portal serves reduced markup to unknown agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/120.0.0.0 Safari/537.36";

/// Error text fragments that identify a dropped connection.
const RESET_MARKERS: &[&str] = &[
    "connection reset",
    "reset by peer",
    "socket hang up",
    "connection closed",
    "connection aborted",
    "broken pipe",
    "unexpected eof",
];

/// Response from a portal request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// All response headers.
    pub headers: Vec<(String, String)>,
    /// Response body, decoded as UTF-8.
    pub body: String,
}

impl HttpResponse {
    /// First header value with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A single failed request, classified for the retry policy.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFault {
    /// The remote dropped the connection mid-request.
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

impl FetchFault {
    /// Classify a reqwest error raised by a request bounded by `timeout`.
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout(timeout);
        }

        let mut source: Option<&(dyn StdError + 'static)> = err.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                if matches!(
                    io.kind(),
                    std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::UnexpectedEof
                ) {
                    return Self::ConnectionReset(error_chain(err));
                }
            }
            source = cause.source();
        }

        Self::from_message(&error_chain(err))
    }

    /// Classify a fault from its rendered error chain.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if RESET_MARKERS.iter().any(|m| lower.contains(m)) {
            Self::ConnectionReset(message.to_string())
        } else {
            Self::Other(message.to_string())
        }
    }

    pub fn is_connection_reset(&self) -> bool {
        matches!(self, Self::ConnectionReset(_))
    }
}

/// Render an error with all of its sources, outermost first.
fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// HTTP client carrying the portal session's cookie jar.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client with a cookie store, keep-alive and a browser user-agent.
    pub fn new() -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .tcp_keepalive(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Perform a single GET request.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchFault> {
        let request = self.client.get(url).timeout(timeout);
        self.execute(url, request, timeout).await
    }

    /// POST url-encoded form fields with extra request headers.
    pub async fn post_form(
        &self,
        url: &str,
        form_fields: &[(String, String)],
        extra_headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, FetchFault> {
        let mut builder = self.client.post(url).timeout(timeout);

        for (name, value) in extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = builder.form(form_fields);
        self.execute(url, builder, timeout).await
    }

    async fn execute(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<HttpResponse, FetchFault> {
        let r = request
            .send()
            .await
            .map_err(|e| FetchFault::from_reqwest(&e, timeout))?;

        let status = r.status().as_u16();
        if !r.status().is_success() {
            return Err(FetchFault::Status(status));
        }

        let final_url = r.url().to_string();
        let headers: Vec<(String, String)> = r
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let bytes = r
            .bytes()
            .await
            .map_err(|e| FetchFault::from_reqwest(&e, timeout))?;

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}
