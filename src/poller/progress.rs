//! Progress reporting to the host that invoked a tool.
//!
//! Tools report what they are doing through a [`ProgressSink`]: an
//! append-only stream of status lines, a terminal success or error signal,
//! media messages, and citations. Reporting is purely observational and never
//! affects control flow.

use regex::Regex;
use serde::Serialize;
use std::sync::{Mutex, OnceLock};
use tracing::{error, info};

/// Longest log line surfaced verbatim as a progress message.
const MAX_LOG_LINE: usize = 120;

/// Severity of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    InProgress,
    Success,
    Error,
}

/// A single event sent to the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Human-readable status line; `done` marks the terminal signal.
    Status {
        status: StatusLevel,
        description: String,
        done: bool,
    },
    /// Content to render in the conversation (e.g. a `<video>` tag).
    Message { content: String },
    /// Source attribution for the tool's output.
    Citation {
        title: String,
        url: String,
        content: String,
    },
}

/// Receiver for progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);

    fn progress(&self, description: &str) {
        self.emit(ProgressEvent::Status {
            status: StatusLevel::InProgress,
            description: description.to_string(),
            done: false,
        });
    }

    fn success(&self, description: &str) {
        self.emit(ProgressEvent::Status {
            status: StatusLevel::Success,
            description: description.to_string(),
            done: true,
        });
    }

    fn error(&self, description: &str) {
        self.emit(ProgressEvent::Status {
            status: StatusLevel::Error,
            description: description.to_string(),
            done: true,
        });
    }

    fn message(&self, content: &str) {
        self.emit(ProgressEvent::Message {
            content: content.to_string(),
        });
    }

    fn citation(&self, title: &str, url: &str, content: &str) {
        self.emit(ProgressEvent::Citation {
            title: title.to_string(),
            url: url.to_string(),
            content: content.to_string(),
        });
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Status {
                status: StatusLevel::Error,
                description,
                ..
            } => error!("{}", description),
            ProgressEvent::Status { description, .. } => info!("{}", description),
            ProgressEvent::Message { content } => info!(content = %content, "Media message"),
            ProgressEvent::Citation { title, url, .. } => info!(url = %url, "Citation: {}", title),
        }
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Descriptions of in-progress status events.
    pub fn descriptions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Status {
                    status: StatusLevel::InProgress,
                    description,
                    ..
                } => Some(description),
                _ => None,
            })
            .collect()
    }

    /// Contents of message events.
    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Message { content } => Some(content),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

fn percent_regex() -> &'static Regex {
    static PERCENT: OnceLock<Regex> = OnceLock::new();
    PERCENT.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").expect("Invalid regex"))
}

/// Turn free-text job logs into a short progress message.
///
/// Only the most recent non-empty line is considered, since upstream logs
/// accumulate over the life of the job. Milestones are matched by substring,
/// completion first so that "generation complete" is not read as "generating".
pub fn logs_to_progress_message(logs: &str) -> String {
    let Some(line) = logs.lines().rev().map(str::trim).find(|l| !l.is_empty()) else {
        return "Waiting for output...".to_string();
    };
    let lower = line.to_lowercase();

    if lower.contains("complete") || lower.contains("finished") || lower.contains("succeeded") {
        return "Generation complete, finalizing output".to_string();
    }
    if lower.contains("download") {
        return "Downloading generated media".to_string();
    }
    if lower.contains("upload") {
        return "Uploading result".to_string();
    }
    if let Some(caps) = percent_regex().captures(&lower) {
        if let Ok(pct) = caps[1].parse::<u32>() {
            if pct <= 100 {
                return format!("Generating... {}%", pct);
            }
        }
    }
    if lower.contains("generat") || lower.contains("still") {
        return "Still generating...".to_string();
    }
    if lower.contains("start") || lower.contains("queue") || lower.contains("boot") {
        return "Starting up".to_string();
    }

    crate::http::truncate(line, MAX_LOG_LINE)
}
