//! Video command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, SpinnerSink, VideoAction};
use crate::config::Settings;
use crate::jobs::{ReplicateRequest, VeoRequest};
use crate::orchestrator::{Orchestrator, VideoJob, VideoProvider};
use anyhow::Result;

/// Run a video subcommand.
pub async fn run_video(action: &VideoAction, settings: Settings) -> Result<()> {
    let provider = match action {
        VideoAction::Generate { provider, .. }
        | VideoAction::Status { provider, .. }
        | VideoAction::Cancel { provider, .. } => *provider,
    };
    if let Err(e) = preflight::check(Operation::Video(provider), &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'vente doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    let text = match action {
        VideoAction::Generate {
            prompt,
            provider,
            negative_prompt,
            image,
            aspect_ratio,
            person_generation,
            videos,
            duration,
        } => {
            let job = match provider {
                VideoProvider::Replicate => VideoJob::Replicate(ReplicateRequest {
                    prompt: prompt.clone().unwrap_or_default(),
                    negative_prompt: negative_prompt.clone(),
                }),
                VideoProvider::Veo => VideoJob::Veo(VeoRequest {
                    prompt: prompt.clone(),
                    image: image.clone(),
                    negative_prompt: negative_prompt.clone(),
                    aspect_ratio: aspect_ratio.clone(),
                    person_generation: person_generation.clone(),
                    number_of_videos: *videos,
                    duration_seconds: *duration,
                }),
            };
            let sink = SpinnerSink::new("Submitting video job...");
            orchestrator.generate_video(&job, &sink).await?
        }

        VideoAction::Status { job_id, provider } => {
            let sink = SpinnerSink::new("Checking job...");
            orchestrator.video_status(*provider, job_id, &sink).await?
        }

        VideoAction::Cancel { job_id, provider } => {
            let sink = SpinnerSink::new("Cancelling job...");
            orchestrator.cancel_video(*provider, job_id, &sink).await?
        }
    };

    Output::block(&text);
    Ok(())
}
