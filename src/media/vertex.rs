//! Vertex AI Imagen (images) and Lyria (music) predictions.

use super::session::{Authorized, Session};
use crate::config::{HttpSettings, VertexSettings};
use crate::error::{Result, VenteError};
use crate::http::{create_client_with_timeout, read_json};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument};

/// Music predictions run longer than the shared HTTP timeout allows.
const MUSIC_TIMEOUT: Duration = Duration::from_secs(120);

/// A model the client will call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub description: &'static str,
}

pub const IMAGE_MODELS: [ModelInfo; 4] = [
    ModelInfo {
        id: "imagen-4.0-generate-preview-05-20",
        description: "Imagen 4.0 Generate (Preview) - Latest model with advanced capabilities",
    },
    ModelInfo {
        id: "imagen-4.0-ultra-generate-exp-05-20",
        description: "Imagen 4.0 Ultra Generate (Experimental) - Ultra high quality experimental model",
    },
    ModelInfo {
        id: "imagen-3.0-generate-002",
        description: "Imagen 3.0 Generate - Stable production model with good quality",
    },
    ModelInfo {
        id: "imagen-3.0-fast-generate-001",
        description: "Imagen 3.0 Fast Generate - Faster generation with good quality",
    },
];

pub const MUSIC_MODELS: [ModelInfo; 1] = [ModelInfo {
    id: "lyria-002",
    description:
        "Lyria 002 - Text-to-music generation with high quality orchestral and instrumental capabilities",
}];

pub const IMAGE_ASPECT_RATIOS: [&str; 5] = ["1:1", "9:16", "16:9", "4:3", "3:4"];
pub const IMAGE_PERSON_GENERATION: [&str; 4] =
    ["allow_all", "allow_adult", "block_some", "block_most"];

fn check_model<'a>(
    requested: Option<&'a str>,
    default: &'a str,
    allowed: &[ModelInfo],
    kind: &str,
) -> Result<&'a str> {
    let model = requested.filter(|m| !m.is_empty()).unwrap_or(default);
    if allowed.iter().any(|m| m.id == model) {
        Ok(model)
    } else {
        let ids: Vec<&str> = allowed.iter().map(|m| m.id).collect();
        Err(VenteError::Validation(format!(
            "Invalid {} model '{}'. Available models: {}",
            kind,
            model,
            ids.join(", ")
        )))
    }
}

/// Parameters for an Imagen prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub aspect_ratio: String,
    pub sample_count: u32,
    pub enhance_prompt: bool,
    pub person_generation: String,
    pub add_watermark: bool,
    pub include_rai_reason: bool,
    pub language: String,
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: None,
            aspect_ratio: "1:1".to_string(),
            sample_count: 1,
            enhance_prompt: true,
            person_generation: "allow_all".to_string(),
            add_watermark: false,
            include_rai_reason: true,
            language: "auto".to_string(),
        }
    }
}

impl ImageRequest {
    /// Replace out-of-range options with their defaults.
    ///
    /// Returns one note per replaced option.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut notes = Vec::new();
        if !IMAGE_ASPECT_RATIOS.contains(&self.aspect_ratio.as_str()) {
            notes.push(format!("Invalid aspect ratio '{}', using 1:1", self.aspect_ratio));
            self.aspect_ratio = "1:1".to_string();
        }
        if !(1..=4).contains(&self.sample_count) {
            notes.push(format!("Invalid sample count {}, using 1", self.sample_count));
            self.sample_count = 1;
        }
        if !IMAGE_PERSON_GENERATION.contains(&self.person_generation.as_str()) {
            notes.push(format!(
                "Invalid person generation policy '{}', using allow_all",
                self.person_generation
            ));
            self.person_generation = "allow_all".to_string();
        }
        notes
    }

    fn payload(&self) -> Value {
        json!({
            "instances": [{ "prompt": self.prompt }],
            "parameters": {
                "aspectRatio": self.aspect_ratio,
                "sampleCount": self.sample_count,
                "enhancePrompt": self.enhance_prompt,
                "personGeneration": self.person_generation,
                "addWatermark": self.add_watermark,
                "includeRaiReason": self.include_rai_reason,
                "language": self.language,
            }
        })
    }
}

/// Parameters for a Lyria prediction. `seed` and `sample_count` are
/// mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub negative_prompt: Option<String>,
    pub seed: Option<u64>,
    pub sample_count: Option<u32>,
}

impl MusicRequest {
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(VenteError::Validation("A prompt must be provided".to_string()));
        }
        if self.seed.is_some() && self.sample_count.is_some() {
            return Err(VenteError::Validation(
                "Cannot specify both seed and sample_count. Use one or the other.".to_string(),
            ));
        }
        Ok(())
    }

    /// Sample count sent upstream: one when neither option is given.
    pub fn effective_sample_count(&self) -> Option<u32> {
        match (self.seed, self.sample_count) {
            (None, None) => Some(1),
            (_, count) => count,
        }
    }

    fn payload(&self) -> Value {
        let mut instance = json!({ "prompt": self.prompt });
        if let Some(negative) = self.negative_prompt.as_deref().filter(|n| !n.is_empty()) {
            instance["negative_prompt"] = json!(negative);
        }
        if let Some(seed) = self.seed {
            instance["seed"] = json!(seed);
        }

        let mut payload = json!({ "instances": [instance] });
        if let Some(count) = self.effective_sample_count() {
            payload["parameters"] = json!({ "sample_count": count });
        }
        payload
    }
}

/// One generated image or track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedMedia {
    pub mime_type: String,
    /// Base64 payload; absent when the sample was filtered.
    pub data: Option<String>,
    pub rai_filtered_reason: Option<String>,
}

/// Result of one prediction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaResponse {
    pub model: String,
    pub media: Vec<GeneratedMedia>,
    pub enhanced_prompt: Option<String>,
    pub model_display_name: Option<String>,
}

/// Parse a `:predict` response. An empty prediction list is a protocol error.
pub fn parse_predictions(body: &Value, model: &str, default_mime: &str) -> Result<MediaResponse> {
    let predictions = body
        .get("predictions")
        .and_then(|p| p.as_array())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| VenteError::Protocol("No media generated in response".to_string()))?;

    let text = |value: &Value, key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let media = predictions
        .iter()
        .map(|p| GeneratedMedia {
            mime_type: text(p, "mimeType").unwrap_or_else(|| default_mime.to_string()),
            data: text(p, "bytesBase64Encoded"),
            rai_filtered_reason: text(p, "raiFilteredReason"),
        })
        .collect();

    Ok(MediaResponse {
        model: model.to_string(),
        media,
        enhanced_prompt: text(&predictions[0], "enhancedPrompt"),
        model_display_name: text(body, "modelDisplayName"),
    })
}

/// Plain-text listing of the allowed models.
pub fn list_models(default_image: &str, default_music: &str) -> String {
    let mut lines = vec!["Available Vertex AI Models:".to_string(), String::new()];
    for (title, models, default) in [
        ("Image Generation Models", &IMAGE_MODELS[..], default_image),
        ("Music Generation Models", &MUSIC_MODELS[..], default_music),
    ] {
        lines.push(format!("{} ({} total):", title, models.len()));
        lines.push(String::new());
        for model in models {
            let marker = if model.id == default { " (DEFAULT)" } else { "" };
            lines.push(format!("Model: {}{}", model.id, marker));
            lines.push(format!("Description: {}", model.description));
            lines.push(String::new());
        }
    }
    lines.join("\n").trim_end().to_string()
}

/// Vertex AI prediction client.
pub struct VertexClient {
    client: reqwest::Client,
    settings: VertexSettings,
}

impl VertexClient {
    pub fn new(settings: VertexSettings, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(&http.user_agent, http.timeout())?,
            settings,
        })
    }

    pub fn settings(&self) -> &VertexSettings {
        &self.settings
    }

    fn predict_url(&self, model: &str) -> Result<String> {
        let project = self.settings.resolved_project().ok_or_else(|| {
            VenteError::Config(
                "No Vertex AI project. Set vertex.project_id or GOOGLE_CLOUD_PROJECT.".to_string(),
            )
        })?;
        let location = &self.settings.location;
        Ok(format!(
            "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:predict"
        ))
    }

    /// POST a prediction, replacing the session token once if it is rejected.
    async fn predict(
        &self,
        session: &mut Session,
        url: &str,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let response = session
            .authorized(|bearer| {
                let mut request = self.client.post(url).bearer_auth(bearer).json(payload);
                if let Some(timeout) = timeout {
                    request = request.timeout(timeout);
                }
                async move {
                    let response = request.send().await?;
                    let answer = if response.status() == StatusCode::UNAUTHORIZED {
                        Authorized::Rejected
                    } else {
                        Authorized::Accepted(response)
                    };
                    Ok::<_, VenteError>(answer)
                }
            })
            .await?;
        read_json(response).await
    }

    /// Generate images. `request` is normalised in place.
    #[instrument(skip(self, session, request), fields(model = tracing::field::Empty))]
    pub async fn generate_image(
        &self,
        session: &mut Session,
        request: &mut ImageRequest,
    ) -> Result<(MediaResponse, Vec<String>)> {
        if request.prompt.trim().is_empty() {
            return Err(VenteError::Validation("A prompt must be provided".to_string()));
        }
        let model = check_model(
            request.model.as_deref(),
            &self.settings.image_model,
            &IMAGE_MODELS,
            "image",
        )?
        .to_string();
        tracing::Span::current().record("model", model.as_str());
        let notes = request.normalize();

        let url = self.predict_url(&model)?;
        let body = self
            .predict(session, &url, &request.payload(), None)
            .await?;

        let parsed = parse_predictions(&body, &model, "image/png")?;
        info!("Generated {} image(s)", parsed.media.len());
        Ok((parsed, notes))
    }

    /// Generate music tracks.
    #[instrument(skip(self, session, request), fields(model = tracing::field::Empty))]
    pub async fn generate_music(
        &self,
        session: &mut Session,
        request: &MusicRequest,
    ) -> Result<MediaResponse> {
        request.validate()?;
        let model = check_model(
            request.model.as_deref(),
            &self.settings.music_model,
            &MUSIC_MODELS,
            "music",
        )?
        .to_string();
        tracing::Span::current().record("model", model.as_str());

        let url = self.predict_url(&model)?;
        let body = self
            .predict(session, &url, &request.payload(), Some(MUSIC_TIMEOUT))
            .await?;

        let parsed = parse_predictions(&body, &model, "audio/mp3")?;
        info!("Generated {} track(s)", parsed.media.len());
        Ok(parsed)
    }
}
