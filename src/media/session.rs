//! Explicitly owned authentication state for Vertex AI calls.
//!
//! A [`Session`] holds the current bearer token and its expiry. Callers own
//! the session and lend it mutably to each request, which refreshes the
//! token from its [`TokenSource`] when it is within [`REFRESH_MARGIN`] of
//! expiring.

use crate::config::VertexSettings;
use crate::error::{Result, VenteError};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Tokens are refreshed this long before they expire.
pub const REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(5);

/// Lifetime assumed for tokens printed by the gcloud CLI.
const GCLOUD_TOKEN_LIFETIME: TimeDelta = TimeDelta::hours(1);

/// A bearer token and when it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Usable at `now` with at least the refresh margin to spare.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

/// Where new tokens come from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken>;

    /// Short description for diagnostics.
    fn describe(&self) -> String;
}

/// A token supplied by configuration. It never expires locally; the
/// upstream rejects it once it is stale.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch_token(&self) -> Result<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: DateTime::<Utc>::MAX_UTC,
        })
    }

    fn describe(&self) -> String {
        "static access token".to_string()
    }
}

/// Tokens from `gcloud auth print-access-token`.
#[derive(Debug, Default)]
pub struct GcloudToken;

#[async_trait]
impl TokenSource for GcloudToken {
    async fn fetch_token(&self) -> Result<AccessToken> {
        let output = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VenteError::Config(
                        "gcloud not found. Install the Google Cloud CLI or set vertex.access_token"
                            .to_string(),
                    )
                } else {
                    VenteError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VenteError::Config(format!(
                "gcloud auth print-access-token failed: {}",
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(VenteError::Config(
                "gcloud printed an empty access token".to_string(),
            ));
        }

        Ok(AccessToken {
            token,
            expires_at: Utc::now() + GCLOUD_TOKEN_LIFETIME,
        })
    }

    fn describe(&self) -> String {
        "gcloud CLI".to_string()
    }
}

/// What the upstream made of the bearer token on one call.
#[derive(Debug)]
pub enum Authorized<T> {
    Accepted(T),
    /// The upstream answered 401.
    Rejected,
}

/// Authentication state for one caller.
pub struct Session {
    source: Box<dyn TokenSource>,
    current: Option<AccessToken>,
}

impl Session {
    pub fn new(source: Box<dyn TokenSource>) -> Self {
        Self {
            source,
            current: None,
        }
    }

    /// Static token when configured, gcloud otherwise.
    pub fn from_settings(settings: &VertexSettings) -> Self {
        match settings.resolved_token() {
            Some(token) => Self::new(Box::new(StaticToken::new(token))),
            None => Self::new(Box::new(GcloudToken)),
        }
    }

    pub fn source(&self) -> String {
        self.source.describe()
    }

    /// When the held token expires, if one is held.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current.as_ref().map(|t| t.expires_at)
    }

    /// Current bearer token, refreshed first if needed.
    pub async fn bearer(&mut self) -> Result<String> {
        self.bearer_at(Utc::now()).await
    }

    /// As [`Session::bearer`], judging freshness at `now`.
    pub async fn bearer_at(&mut self, now: DateTime<Utc>) -> Result<String> {
        if let Some(token) = self.current.as_ref().filter(|t| t.is_fresh_at(now)) {
            return Ok(token.token.clone());
        }

        debug!("Refreshing access token from {}", self.source.describe());
        let token = self.source.fetch_token().await?;
        info!(expires_at = %token.expires_at, "Access token refreshed");
        let bearer = token.token.clone();
        self.current = Some(token);
        Ok(bearer)
    }

    /// Drop the held token so the next call fetches a new one.
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// Run `call` with the current bearer token.
    ///
    /// A rejected token is dropped and the call is repeated once with a
    /// freshly fetched one. A second rejection is an `Upstream` error.
    pub async fn authorized<T, F, Fut>(&mut self, mut call: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Authorized<T>>>,
    {
        let bearer = self.bearer().await?;
        if let Authorized::Accepted(value) = call(bearer).await? {
            return Ok(value);
        }

        warn!("Access token rejected, fetching a new one");
        self.invalidate();
        let bearer = self.bearer().await?;
        match call(bearer).await? {
            Authorized::Accepted(value) => Ok(value),
            Authorized::Rejected => Err(VenteError::Upstream(format!(
                "HTTP 401: access token from {} was rejected",
                self.source.describe()
            ))),
        }
    }
}
