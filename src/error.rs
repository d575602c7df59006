//! Error types for Vente.

use thiserror::Error;

/// Library-level error type for Vente operations.
///
/// The first five variants form the taxonomy every tool operation reports
/// through; callers can match on them to tell a dead connection from a
/// rejected job or an exhausted polling budget.
#[derive(Error, Debug)]
pub enum VenteError {
    /// Network or connection failure. Never retried inside a poll loop.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response or an explicit failure status reported by the remote job.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Unrecognized or malformed status payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Attempt budget exhausted while the job was still pending.
    /// The job may still be running remotely.
    #[error("Timed out after {attempts} status checks (last status: {last_status})")]
    Timeout { attempts: u32, last_status: String },

    /// Caller-supplied parameters rejected before any network call.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl From<reqwest::Error> for VenteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            VenteError::Protocol(format!("malformed response body: {}", err))
        } else if let Some(status) = err.status() {
            VenteError::Upstream(format!("HTTP {}: {}", status, err))
        } else {
            VenteError::Transport(err.to_string())
        }
    }
}

/// Result type alias for Vente operations.
pub type Result<T> = std::result::Result<T, VenteError>;
