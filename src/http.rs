//! HTTP client configuration shared by every upstream integration.

use crate::error::{Result, VenteError};
use serde_json::Value;
use std::time::Duration;

/// Longest upstream error body carried into an error message.
const MAX_ERROR_BODY: usize = 500;

/// Create an HTTP client with a custom timeout.
pub fn create_client_with_timeout(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| VenteError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Read a JSON body, turning non-success statuses into `Upstream` errors
/// that carry the (truncated) upstream body verbatim.
pub async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let detail = match response.text().await {
            Ok(body) => truncate(&upstream_message(&body), MAX_ERROR_BODY),
            Err(e) => unreadable_body(&e),
        };
        return Err(VenteError::Upstream(format!(
            "HTTP {}: {}",
            status.as_u16(),
            detail
        )));
    }

    response.json::<Value>().await.map_err(VenteError::from)
}

fn unreadable_body(err: &dyn std::fmt::Display) -> String {
    format!("(body unreadable: {})", err)
}

/// Prefer `error.message` from a JSON error body, fall back to the raw text.
fn upstream_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").and_then(|m| m.as_str()).or_else(|| e.as_str()))
                .or_else(|| v.get("detail").and_then(|d| d.as_str()))
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Truncate on a char boundary.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
