//! Google Veo long-running video operations (Gemini API).

use super::{JobService, Submission, VideoOutput};
use crate::config::{HttpSettings, VeoSettings};
use crate::error::{Result, VenteError};
use crate::http::{create_client_with_timeout, read_json};
use crate::poller::{JobHandle, JobStatus, StatusCheck};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;
use tracing::{info, instrument, warn};

pub const ASPECT_RATIOS: [&str; 2] = ["16:9", "9:16"];
pub const PERSON_GENERATION: [&str; 3] = ["dont_allow", "allow_adult", "allow_all"];

/// Parameters for one Veo generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VeoRequest {
    pub prompt: Option<String>,
    /// Base64 image used as the first frame.
    pub image: Option<String>,
    pub negative_prompt: Option<String>,
    pub aspect_ratio: String,
    pub person_generation: String,
    pub number_of_videos: u32,
    pub duration_seconds: u32,
}

impl Default for VeoRequest {
    fn default() -> Self {
        Self {
            prompt: None,
            image: None,
            negative_prompt: None,
            aspect_ratio: "16:9".to_string(),
            person_generation: "allow_adult".to_string(),
            number_of_videos: 1,
            duration_seconds: 8,
        }
    }
}

impl VeoRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.trim().is_empty())
    }

    fn image(&self) -> Option<&str> {
        self.image.as_deref().filter(|i| !i.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt().is_none() && self.image().is_none() {
            return Err(VenteError::Validation(
                "Either prompt or image must be provided".to_string(),
            ));
        }
        if !PERSON_GENERATION.contains(&self.person_generation.as_str()) {
            return Err(VenteError::Validation(format!(
                "Invalid person_generation option: {}. Must be one of: {}",
                self.person_generation,
                PERSON_GENERATION.join(", ")
            )));
        }
        if !(1..=2).contains(&self.number_of_videos) {
            return Err(VenteError::Validation(format!(
                "Invalid number_of_videos: {}. Must be either 1 or 2.",
                self.number_of_videos
            )));
        }
        if !(5..=8).contains(&self.duration_seconds) {
            return Err(VenteError::Validation(format!(
                "Invalid duration_seconds: {}. Must be between 5 and 8 seconds.",
                self.duration_seconds
            )));
        }
        if !ASPECT_RATIOS.contains(&self.aspect_ratio.as_str()) {
            return Err(VenteError::Validation(format!(
                "Invalid aspect_ratio: {}. Must be one of: {}",
                self.aspect_ratio,
                ASPECT_RATIOS.join(", ")
            )));
        }
        Ok(())
    }

    fn payload(&self) -> Value {
        let mut instance = json!({});
        if let Some(prompt) = self.prompt() {
            instance["prompt"] = json!(prompt);
        }
        if let Some(image) = self.image() {
            instance["image"] = json!(image);
        }

        let mut parameters = json!({
            "aspectRatio": self.aspect_ratio,
            "personGeneration": self.person_generation,
            "sampleCount": self.number_of_videos,
            "durationSeconds": self.duration_seconds,
        });
        if let Some(negative) = self.negative_prompt.as_deref().filter(|n| !n.is_empty()) {
            parameters["negativePrompt"] = json!(negative);
        }

        json!({ "instances": [instance], "parameters": parameters })
    }
}

fn file_id_regex() -> &'static Regex {
    static FILE_ID: OnceLock<Regex> = OnceLock::new();
    FILE_ID.get_or_init(|| Regex::new(r"files/([a-zA-Z0-9]+)(?::download)?").expect("Invalid regex"))
}

/// File id from a generated sample URI such as `.../files/{id}:download?alt=media`.
pub fn extract_video_id(uri: &str) -> Option<&str> {
    file_id_regex()
        .captures(uri)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Where a generated sample can be fetched from.
///
/// With a proxy the URL is `{proxy}/{file_id}/{key}`; without one the raw
/// URI is returned unchanged.
pub fn sample_url(uri: &str, proxy: Option<&str>, api_key: &str) -> Option<String> {
    match proxy.filter(|p| !p.is_empty()) {
        Some(proxy) => extract_video_id(uri)
            .map(|id| format!("{}/{}/{}", proxy.trim_end_matches('/'), id, api_key)),
        None => Some(uri.to_string()),
    }
}

/// Classify an operation object.
pub fn parse_operation(body: &Value, proxy: Option<&str>, api_key: &str) -> JobStatus<VideoOutput> {
    if !body.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
        return JobStatus::pending();
    }

    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error");
        return JobStatus::Failed(message.to_string());
    }

    let urls = body
        .pointer("/response/generateVideoResponse/generatedSamples")
        .and_then(|s| s.as_array())
        .map(|samples| {
            samples
                .iter()
                .filter_map(|s| s.pointer("/video/uri").and_then(|u| u.as_str()))
                .filter_map(|uri| {
                    let url = sample_url(uri, proxy, api_key);
                    if url.is_none() {
                        warn!("No file id in sample URI");
                    }
                    url
                })
                .collect()
        })
        .unwrap_or_default();

    JobStatus::Succeeded(VideoOutput { urls })
}

/// Client for Veo operations.
pub struct VeoClient {
    client: reqwest::Client,
    settings: VeoSettings,
    api_key: String,
}

impl VeoClient {
    pub fn new(settings: VeoSettings, http: &HttpSettings) -> Result<Self> {
        let api_key = settings.resolved_key().ok_or_else(|| {
            VenteError::Config(
                "No Google API key. Set veo.api_key or GOOGLE_API_KEY.".to_string(),
            )
        })?;
        Ok(Self {
            client: create_client_with_timeout(&http.user_agent, http.timeout())?,
            settings,
            api_key,
        })
    }

    pub fn settings(&self) -> &VeoSettings {
        &self.settings
    }

    fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    /// Operation names look like `models/{model}/operations/{id}`.
    fn operation_url(&self, handle: &JobHandle) -> Result<String> {
        let name = handle.as_str().trim().trim_start_matches('/');
        if name.is_empty() || name.contains("..") {
            return Err(VenteError::Validation(format!(
                "Invalid operation name: '{}'",
                handle
            )));
        }
        Ok(format!("{}/{}", self.base_url(), name))
    }

    fn parse(&self, body: &Value) -> JobStatus<VideoOutput> {
        parse_operation(body, self.settings.proxy_url.as_deref(), &self.api_key)
    }
}

#[async_trait]
impl StatusCheck for VeoClient {
    type Payload = VideoOutput;

    #[instrument(skip(self), fields(operation = %handle))]
    async fn check_status(&self, handle: &JobHandle) -> Result<JobStatus<VideoOutput>> {
        let response = self
            .client
            .get(self.operation_url(handle)?)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        let body = read_json(response).await?;
        Ok(self.parse(&body))
    }
}

#[async_trait]
impl JobService for VeoClient {
    type Description = VeoRequest;

    #[instrument(skip(self, request))]
    async fn submit(&self, request: &VeoRequest) -> Result<Submission<VideoOutput>> {
        request.validate()?;

        let url = format!(
            "{}/models/{}:predictLongRunning",
            self.base_url(),
            self.settings.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request.payload())
            .send()
            .await?;
        let body = read_json(response).await?;

        let name = body
            .get("name")
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                VenteError::Protocol("Failed to get operation name from API response".to_string())
            })?;
        let initial = self.parse(&body);
        info!(operation = %name, status = %initial.label(), "Operation started");

        Ok(Submission {
            handle: JobHandle::new(name),
            initial,
        })
    }

    #[instrument(skip(self), fields(operation = %handle))]
    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        let response = self
            .client
            .post(format!("{}:cancel", self.operation_url(handle)?))
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({}))
            .send()
            .await?;
        read_json(response).await?;
        info!("Operation cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROXY: &str = "https://ai-asset-proxy.mrproper.dev/api/gemini/veo";

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id(
                "https://generativelanguage.googleapis.com/v1beta/files/u6e5f8rzq8cn:download?alt=media"
            ),
            Some("u6e5f8rzq8cn")
        );
        assert_eq!(
            extract_video_id("https://generativelanguage.googleapis.com/v1beta/files/pbac2s0cpb7a"),
            Some("pbac2s0cpb7a")
        );
        assert_eq!(extract_video_id("https://example.com/video.mp4"), None);
    }

    #[test]
    fn test_validation() {
        assert!(VeoRequest::from_prompt("a fox").validate().is_ok());

        let image_only = VeoRequest {
            image: Some("aGVsbG8=".into()),
            ..VeoRequest::default()
        };
        assert!(image_only.validate().is_ok());

        let cases = [
            VeoRequest::default(),
            VeoRequest {
                aspect_ratio: "4:3".into(),
                ..VeoRequest::from_prompt("x")
            },
            VeoRequest {
                person_generation: "everyone".into(),
                ..VeoRequest::from_prompt("x")
            },
            VeoRequest {
                number_of_videos: 3,
                ..VeoRequest::from_prompt("x")
            },
            VeoRequest {
                number_of_videos: 0,
                ..VeoRequest::from_prompt("x")
            },
            VeoRequest {
                duration_seconds: 4,
                ..VeoRequest::from_prompt("x")
            },
            VeoRequest {
                duration_seconds: 9,
                ..VeoRequest::from_prompt("x")
            },
        ];
        for case in cases {
            assert!(
                matches!(case.validate(), Err(VenteError::Validation(_))),
                "accepted {:?}",
                case
            );
        }
    }

    #[test]
    fn test_payload() {
        let request = VeoRequest {
            negative_prompt: Some("rain".into()),
            number_of_videos: 2,
            ..VeoRequest::from_prompt("a fox")
        };
        let payload = request.payload();
        assert_eq!(payload["instances"][0]["prompt"], "a fox");
        assert!(payload["instances"][0].get("image").is_none());
        assert_eq!(payload["parameters"]["sampleCount"], 2);
        assert_eq!(payload["parameters"]["negativePrompt"], "rain");
        assert_eq!(payload["parameters"]["aspectRatio"], "16:9");
    }

    #[test]
    fn test_parse_operation() {
        let pending = json!({"name": "models/veo/operations/abc"});
        assert_eq!(parse_operation(&pending, None, "k"), JobStatus::pending());

        let failed = json!({"done": true, "error": {"code": 3, "message": "prompt blocked"}});
        assert_eq!(
            parse_operation(&failed, None, "k"),
            JobStatus::Failed("prompt blocked".to_string())
        );

        let done = json!({
            "done": true,
            "response": {"generateVideoResponse": {"generatedSamples": [
                {"video": {"uri": "https://generativelanguage.googleapis.com/v1beta/files/u6e5f8rzq8cn:download?alt=media"}},
                {"video": {}}
            ]}}
        });
        assert_eq!(
            parse_operation(&done, Some(PROXY), "secret"),
            JobStatus::Succeeded(VideoOutput {
                urls: vec![format!("{}/u6e5f8rzq8cn/secret", PROXY)]
            })
        );
        match parse_operation(&done, None, "secret") {
            JobStatus::Succeeded(out) => assert!(out.urls[0].ends_with(":download?alt=media")),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_operation_url() {
        let settings = VeoSettings {
            api_key: Some("k".into()),
            ..VeoSettings::default()
        };
        let client = VeoClient::new(settings, &HttpSettings::default()).unwrap();
        assert_eq!(
            client
                .operation_url(&JobHandle::new("models/veo-2.0-generate-001/operations/xyz"))
                .unwrap(),
            "https://generativelanguage.googleapis.com/v1beta/models/veo-2.0-generate-001/operations/xyz"
        );
        assert!(client.operation_url(&JobHandle::new(" ")).is_err());
    }
}
