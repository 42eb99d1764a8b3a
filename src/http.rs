//! Request plumbing shared by the Redmine and GitLab clients.

use crate::error::MigrateError;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Build a client with the given timeout.
pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client, MigrateError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("redmine2gitlab/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| MigrateError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Send `request`; any non-2xx status becomes [`MigrateError::HttpStatus`].
pub(crate) async fn send(request: RequestBuilder, url: &str) -> Result<Response, MigrateError> {
    let response = request.send().await.map_err(|source| MigrateError::Http {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MigrateError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body: truncate(&body, 500),
        });
    }
    Ok(response)
}

/// Read a JSON body. An empty body reads as `null`.
pub(crate) async fn json_body(response: Response, url: &str) -> Result<Value, MigrateError> {
    let bytes = response.bytes().await.map_err(|source| MigrateError::Http {
        url: url.to_string(),
        source,
    })?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| MigrateError::UnexpectedShape {
        url: url.to_string(),
        detail: format!("invalid JSON: {e}"),
    })
}

/// Decode a JSON value into a typed record.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, url: &str) -> Result<T, MigrateError> {
    serde_json::from_value(value).map_err(|e| MigrateError::UnexpectedShape {
        url: url.to_string(),
        detail: e.to_string(),
    })
}

/// Decode every element of a JSON list.
pub(crate) fn decode_all<T: DeserializeOwned>(
    values: Vec<Value>,
    url: &str,
) -> Result<Vec<T>, MigrateError> {
    values.into_iter().map(|v| decode(v, url)).collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
