//! Remote job services: submission, status, and cancellation.
//!
//! A [`JobService`] accepts a job description, hands back a [`JobHandle`]
//! together with the status reported on submission, and can be asked to
//! cancel a job. Status checks go through the poller's [`StatusCheck`]
//! capability so a service can be driven by a [`crate::poller::Poller`]
//! directly.

pub mod replicate;
pub mod veo;

pub use replicate::{ReplicateClient, ReplicateRequest};
pub use veo::{VeoClient, VeoRequest};

use crate::error::Result;
use crate::poller::{JobHandle, JobStatus, StatusCheck};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A job accepted by a remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission<T> {
    pub handle: JobHandle,
    /// Status reported by the submission response itself.
    pub initial: JobStatus<T>,
}

/// Capability for services that run long jobs.
#[async_trait]
pub trait JobService: StatusCheck {
    /// What the caller asks the service to do.
    type Description: Send + Sync;

    /// Start a job.
    async fn submit(&self, description: &Self::Description) -> Result<Submission<Self::Payload>>;

    /// Ask the service to stop a job. Does not interact with any poll loop
    /// currently observing the same handle.
    async fn cancel(&self, handle: &JobHandle) -> Result<()>;
}

/// Output of a finished video generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoOutput {
    pub urls: Vec<String>,
}

impl VideoOutput {
    /// One `<video>` block per URL, as rendered by the chat host.
    pub fn video_messages(&self) -> Vec<String> {
        self.urls
            .iter()
            .map(|url| format!("<video>\n{}\n</video>", url))
            .collect()
    }
}
