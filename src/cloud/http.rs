//! HTTP utilities for cloud product REST API calls
//!
//! Every call made through [`CloudHttpClient`] is soft-failing: transport
//! errors, timeouts, non-success statuses and unparseable bodies are logged and
//! surface as `None`. Callers treat `None` as "no data".

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header carrying the caller-supplied token on every upstream call
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Build the standard header set for an upstream call
pub fn generate_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-auth-token"),
        HeaderValue::from_str(token).context("Token is not a valid header value")?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// HTTP client wrapper for upstream cloud API calls
#[derive(Clone)]
pub struct CloudHttpClient {
    client: Client,
}

impl CloudHttpClient {
    /// Create a new HTTP client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cap/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Perform a single request and return the parsed JSON body.
    ///
    /// Never errors: any failure is logged and reported as `None`.
    pub async fn fetch(
        &self,
        url: &str,
        method: Method,
        body: Option<&Value>,
        headers: &HeaderMap,
    ) -> Option<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).headers(headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::warn!("Request timed out: {}", url);
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to send request to {}: {}", url, e.without_url());
                return None;
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to read response body from {}: {}", url, e);
                return None;
            }
        };

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            return None;
        }

        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse response JSON from {}: {} ({})",
                    url,
                    e,
                    sanitize_for_log(&text)
                );
                None
            }
        }
    }

    /// GET shorthand for [`CloudHttpClient::fetch`]
    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Option<Value> {
        self.fetch(url, Method::GET, None, headers).await
    }

    /// Perform a GET and report only the response status.
    ///
    /// `label` stands in for the URL in log output, for URLs that carry
    /// credentials.
    pub async fn status(&self, url: &str, label: &str, headers: &HeaderMap) -> Option<StatusCode> {
        tracing::debug!("GET {} (status only)", label);

        match self.client.get(url).headers(headers.clone()).send().await {
            Ok(response) => Some(response.status()),
            Err(e) => {
                tracing::warn!("Failed to send request to {}: {}", label, e.without_url());
                None
            }
        }
    }
}
