//! Media command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{MediaAction, Output, SpinnerSink};
use crate::config::Settings;
use crate::media::{list_models, ImageRequest, MusicRequest};
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run a media subcommand.
pub async fn run_media(action: &MediaAction, settings: Settings) -> Result<()> {
    if let MediaAction::Models = action {
        Output::block(&list_models(
            &settings.vertex.image_model,
            &settings.vertex.music_model,
        ));
        return Ok(());
    }

    if let Err(e) = preflight::check(Operation::Media, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'vente doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    if !orchestrator.uploads_enabled() {
        Output::warning("Asset uploads are disabled; generated media will not be published.");
    }

    let text = match action {
        MediaAction::Image {
            prompt,
            model,
            aspect_ratio,
            count,
            no_enhance,
            person_generation,
            watermark,
        } => {
            let request = ImageRequest {
                prompt: prompt.clone(),
                model: model.clone(),
                aspect_ratio: aspect_ratio.clone(),
                sample_count: *count,
                enhance_prompt: !no_enhance,
                person_generation: person_generation.clone(),
                add_watermark: *watermark,
                ..ImageRequest::default()
            };
            let sink = SpinnerSink::new("Generating image...");
            orchestrator.generate_image(request, &sink).await?
        }

        MediaAction::Music {
            prompt,
            model,
            negative_prompt,
            seed,
            count,
        } => {
            let request = MusicRequest {
                prompt: prompt.clone(),
                model: model.clone(),
                negative_prompt: negative_prompt.clone(),
                seed: *seed,
                sample_count: *count,
            };
            let sink = SpinnerSink::new("Generating music...");
            orchestrator.generate_music(&request, &sink).await?
        }

        MediaAction::Models => orchestrator.list_models(),
    };

    Output::block(&text);
    Ok(())
}
