//! Shared HTTP plumbing for the integration adapters: authentication, the
//! status-to-taxonomy mapping and argument helpers.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;

use crate::domain::errors::AdapterError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest remote body excerpt kept in an error detail (logs only).
const MAX_DETAIL_CHARS: usize = 300;

#[derive(Clone)]
pub enum Auth {
    Basic { user: String, token: SecretString },
    Bearer(SecretString),
    Header { name: &'static str, value: SecretString },
}

/// One remote API: base URL, credentials and a request timeout.
#[derive(Clone)]
pub struct HttpTarget {
    client: reqwest::Client,
    base: String,
    auth: Auth,
    timeout: Duration,
}

impl HttpTarget {
    pub fn new(base: Url, auth: Auth) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.as_str().trim_end_matches('/').to_string(),
            auth,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base, path))
            .header("Accept", "application/json")
            .timeout(self.timeout);
        match &self.auth {
            Auth::Basic { user, token } => builder.basic_auth(user, Some(token.expose_secret())),
            Auth::Bearer(token) => builder.bearer_auth(token.expose_secret()),
            Auth::Header { name, value } => builder.header(*name, value.expose_secret()),
        }
    }

    /// Sends `builder` and decodes a JSON body. An empty 2xx body is `Null`.
    pub async fn send_json(&self, builder: RequestBuilder) -> Result<Value, AdapterError> {
        let response = builder.send().await.map_err(map_transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(map_transport)?;

        if !status.is_success() {
            return Err(map_status(status, &headers, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            AdapterError::remote(None, format!("undecodable body from {}: {e}", self.base))
        })
    }
}

/// Maps a non-2xx answer onto the adapter taxonomy.
pub fn map_status(status: StatusCode, headers: &HeaderMap, body: &str) -> AdapterError {
    let detail: String = body.chars().take(MAX_DETAIL_CHARS).collect();
    match status {
        StatusCode::UNAUTHORIZED => AdapterError::auth(detail),
        StatusCode::FORBIDDEN if rate_limit_exhausted(headers) => AdapterError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::FORBIDDEN => AdapterError::auth(detail),
        StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimited {
            retry_after: retry_after(headers),
        },
        other => AdapterError::remote(Some(other.as_u16()), detail),
    }
}

pub fn map_transport(err: reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout
    } else {
        AdapterError::remote(None, err.to_string())
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    header_u64(headers, "x-ratelimit-remaining") == Some(0)
}

/// `Retry-After` seconds, else the time until `x-ratelimit-reset` (epoch seconds).
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_u64(headers, RETRY_AFTER.as_str()) {
        return Some(Duration::from_secs(secs));
    }
    let reset = header_u64(headers, "x-ratelimit-reset")?;
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    Some(Duration::from_secs(reset.saturating_sub(now)))
}

pub fn action(arguments: &Value) -> Result<&str, AdapterError> {
    required_str(arguments, "action")
}

pub fn required_str<'a>(arguments: &'a Value, field: &str) -> Result<&'a str, AdapterError> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdapterError::invalid(format!("missing `{field}`")))
}

pub fn optional_str<'a>(arguments: &'a Value, field: &str) -> Option<&'a str> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_u64(arguments: &Value, field: &str) -> Result<u64, AdapterError> {
    arguments
        .get(field)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .ok_or_else(|| AdapterError::invalid(format!("missing or non-numeric `{field}`")))
}

pub fn optional_u64(arguments: &Value, field: &str) -> Option<u64> {
    arguments.get(field).and_then(Value::as_u64)
}

pub fn unknown_action(tool: &str, action: &str) -> AdapterError {
    AdapterError::invalid(format!("{tool} has no action `{action}`"))
}
