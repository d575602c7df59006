//! Bounded polling of long-running remote jobs.
//!
//! A remote job is started elsewhere and identified by a [`JobHandle`]. The
//! [`Poller`] repeatedly asks a [`StatusCheck`] capability for the job's
//! [`JobStatus`] until it reaches a terminal state or the attempt budget runs
//! out, and reports the result as a single [`PollOutcome`].
//!
//! Each poll loop is strictly sequential: one sleep, then one status check,
//! per attempt. Independent jobs are polled by independent `run` calls that
//! share no mutable state.

pub mod progress;

pub use progress::{
    logs_to_progress_message, NullSink, ProgressEvent, ProgressSink, RecordingSink, StatusLevel,
    TracingSink,
};

use crate::error::{Result, VenteError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Opaque identifier returned when a remote job is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observation of a remote job's state.
///
/// Always re-fetched from the service, never mutated locally.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus<T> {
    /// Still running, optionally with free-text progress logs.
    Pending { logs: Option<String> },
    /// Finished with a result payload.
    Succeeded(T),
    /// Finished with an upstream-provided reason.
    Failed(String),
    /// The service reported a status string this crate does not know.
    Unknown(String),
}

impl<T> JobStatus<T> {
    /// A pending status without logs.
    pub fn pending() -> Self {
        JobStatus::Pending { logs: None }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending { .. })
    }

    /// Short human-readable name of the variant.
    pub fn label(&self) -> String {
        match self {
            JobStatus::Pending { .. } => "pending".to_string(),
            JobStatus::Succeeded(_) => "succeeded".to_string(),
            JobStatus::Failed(_) => "failed".to_string(),
            JobStatus::Unknown(raw) => format!("unknown ({})", raw),
        }
    }
}

/// Why a poll loop ended in failure.
///
/// Each variant corresponds to one [`VenteError`] category, so a failed
/// status check surfaces to the caller with the category it was raised with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The job itself failed, or the service rejected the status request.
    Upstream(String),
    /// The status check could not reach the service.
    Transport(String),
    /// The service answered with something that is not a known status.
    Protocol(String),
    /// The status check refused its input before making a request.
    Validation(String),
    /// The status check is not configured to run.
    Config(String),
    /// A nested wait inside the status check ran out of attempts.
    Timeout { attempts: u32, last_status: String },
}

impl From<VenteError> for FailureReason {
    fn from(err: VenteError) -> Self {
        match err {
            VenteError::Upstream(msg) => FailureReason::Upstream(msg),
            VenteError::Protocol(msg) => FailureReason::Protocol(msg),
            VenteError::Json(e) => FailureReason::Protocol(e.to_string()),
            VenteError::Transport(msg) => FailureReason::Transport(msg),
            VenteError::Io(e) => FailureReason::Transport(e.to_string()),
            VenteError::Validation(msg) => FailureReason::Validation(msg),
            VenteError::Config(msg) => FailureReason::Config(msg),
            VenteError::TomlParse(e) => FailureReason::Config(e.to_string()),
            VenteError::Timeout {
                attempts,
                last_status,
            } => FailureReason::Timeout {
                attempts,
                last_status,
            },
        }
    }
}

impl From<FailureReason> for VenteError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Upstream(msg) => VenteError::Upstream(msg),
            FailureReason::Transport(msg) => VenteError::Transport(msg),
            FailureReason::Protocol(msg) => VenteError::Protocol(msg),
            FailureReason::Validation(msg) => VenteError::Validation(msg),
            FailureReason::Config(msg) => VenteError::Config(msg),
            FailureReason::Timeout {
                attempts,
                last_status,
            } => VenteError::Timeout {
                attempts,
                last_status,
            },
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Upstream(msg) => write!(f, "{}", msg),
            FailureReason::Transport(msg) => write!(f, "transport failure: {}", msg),
            FailureReason::Protocol(msg) => write!(f, "protocol failure: {}", msg),
            FailureReason::Validation(msg) => write!(f, "invalid input: {}", msg),
            FailureReason::Config(msg) => write!(f, "configuration error: {}", msg),
            FailureReason::Timeout {
                attempts,
                last_status,
            } => write!(
                f,
                "timed out after {} status checks (last status: {})",
                attempts, last_status
            ),
        }
    }
}

/// Terminal result of one poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Completed(T),
    Failed(FailureReason),
    /// The budget ran out while the job was still pending.
    TimedOut {
        attempts: u32,
        last_status: JobStatus<T>,
    },
}

impl<T> PollOutcome<T> {
    /// Map the outcome onto the error taxonomy.
    pub fn into_result(self) -> Result<T> {
        match self {
            PollOutcome::Completed(payload) => Ok(payload),
            PollOutcome::Failed(reason) => Err(reason.into()),
            PollOutcome::TimedOut {
                attempts,
                last_status,
            } => Err(VenteError::Timeout {
                attempts,
                last_status: last_status.label(),
            }),
        }
    }
}

/// Attempt budget and inter-attempt delay for one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of status checks.
    pub max_attempts: u32,
    /// Sleep before each status check.
    pub delay: Duration,
}

impl PollConfig {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Upper bound on the time spent sleeping.
    pub fn total_budget(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts)
    }
}

/// Capability that reads the current status of a remote job.
///
/// Transport failures are reported as `Err`; they end the poll loop
/// immediately and are never retried.
#[async_trait]
pub trait StatusCheck: Send + Sync {
    /// Payload carried by a succeeded job.
    type Payload: Send;

    /// Fetch the job's current status. Exactly one network read.
    async fn check_status(&self, handle: &JobHandle) -> Result<JobStatus<Self::Payload>>;
}

/// Drives a remote job from submission to a terminal [`PollOutcome`].
#[derive(Debug, Clone)]
pub struct Poller {
    config: PollConfig,
    job_label: String,
}

impl Poller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            job_label: "job".to_string(),
        }
    }

    /// Name used in progress messages, e.g. "flight search".
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.job_label = label.into();
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `handle` until it reaches a terminal state.
    ///
    /// `initial` is the status reported by the call that started the job. If
    /// it is already terminal no status check is made.
    pub async fn run<C>(
        &self,
        checker: &C,
        handle: &JobHandle,
        initial: Option<JobStatus<C::Payload>>,
        sink: &dyn ProgressSink,
    ) -> PollOutcome<C::Payload>
    where
        C: StatusCheck + ?Sized,
    {
        let max_attempts = self.config.max_attempts;
        let mut last_status = match initial {
            Some(status) if status.is_terminal() => {
                info!(handle = %handle, status = %status.label(), "Job resolved on submission");
                return self.resolve(status, sink);
            }
            Some(status) => status,
            None => JobStatus::pending(),
        };

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.config.delay).await;

            let status = match checker.check_status(handle).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(handle = %handle, attempt, "Status check failed: {}", e);
                    return PollOutcome::Failed(FailureReason::from(e));
                }
            };

            debug!(handle = %handle, attempt, status = %status.label(), "Status checked");

            match status {
                JobStatus::Pending { logs } => {
                    sink.progress(&self.progress_line(attempt, logs.as_deref()));
                    last_status = JobStatus::Pending { logs };
                }
                terminal => return self.resolve(terminal, sink),
            }
        }

        warn!(handle = %handle, max_attempts, "Polling budget exhausted");
        PollOutcome::TimedOut {
            attempts: max_attempts,
            last_status,
        }
    }

    fn resolve<T>(&self, status: JobStatus<T>, sink: &dyn ProgressSink) -> PollOutcome<T> {
        match status {
            JobStatus::Succeeded(payload) => {
                sink.progress(&format!("{} complete", capitalize(&self.job_label)));
                PollOutcome::Completed(payload)
            }
            JobStatus::Failed(reason) => PollOutcome::Failed(FailureReason::Upstream(reason)),
            JobStatus::Unknown(raw) => PollOutcome::Failed(FailureReason::Protocol(format!(
                "unrecognized status '{}'",
                raw
            ))),
            pending @ JobStatus::Pending { .. } => PollOutcome::TimedOut {
                attempts: 0,
                last_status: pending,
            },
        }
    }

    fn progress_line(&self, attempt: u32, logs: Option<&str>) -> String {
        let base = format!(
            "Waiting for {}... (check {}/{})",
            self.job_label, attempt, self.config.max_attempts
        );
        match logs {
            Some(logs) if !logs.trim().is_empty() => {
                format!("{}: {}", base, logs_to_progress_message(logs))
            }
            _ => base,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
