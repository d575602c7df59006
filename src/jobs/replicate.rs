//! Replicate predictions API.

use super::{JobService, Submission, VideoOutput};
use crate::config::{HttpSettings, ReplicateSettings};
use crate::error::{Result, VenteError};
use crate::http::{create_client_with_timeout, read_json};
use crate::poller::{JobHandle, JobStatus, StatusCheck};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

/// Host serving prediction outputs.
const DELIVERY_PREFIX: &str = "https://replicate.delivery/";

/// Input for a video prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

impl ReplicateRequest {
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(VenteError::Validation("A prompt must be provided".to_string()));
        }
        Ok(())
    }

    fn payload(&self) -> Value {
        let mut input = json!({ "prompt": self.prompt });
        if let Some(negative) = self.negative_prompt.as_deref().filter(|n| !n.is_empty()) {
            input["negative_prompt"] = json!(negative);
        }
        json!({ "input": input })
    }
}

/// Rewrite a `replicate.delivery` URL onto `proxy`. Other URLs pass through.
pub fn replace_delivery_url(url: &str, proxy: Option<&str>) -> String {
    match (url.strip_prefix(DELIVERY_PREFIX), proxy) {
        (Some(rest), Some(proxy)) if !proxy.is_empty() => {
            format!("{}/{}", proxy.trim_end_matches('/'), rest)
        }
        _ => url.to_string(),
    }
}

/// Classify a prediction object.
///
/// `output` may be a single URL or a list of URLs.
pub fn parse_prediction(body: &Value, proxy: Option<&str>) -> JobStatus<VideoOutput> {
    let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("");
    match status {
        "starting" | "processing" => JobStatus::Pending {
            logs: body
                .get("logs")
                .and_then(|l| l.as_str())
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string),
        },
        "succeeded" => {
            let urls = match body.get("output") {
                Some(Value::String(url)) => vec![url.as_str()],
                Some(Value::Array(items)) => items.iter().filter_map(|i| i.as_str()).collect(),
                _ => Vec::new(),
            };
            JobStatus::Succeeded(VideoOutput {
                urls: urls
                    .into_iter()
                    .filter(|u| !u.is_empty())
                    .map(|u| replace_delivery_url(u, proxy))
                    .collect(),
            })
        }
        "failed" => JobStatus::Failed(
            body.get("error")
                .and_then(|e| match e {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .unwrap_or_else(|| "Unknown error".to_string()),
        ),
        "canceled" => JobStatus::Failed("Prediction was canceled".to_string()),
        other => JobStatus::Unknown(other.to_string()),
    }
}

/// Client for Replicate video predictions.
pub struct ReplicateClient {
    client: reqwest::Client,
    settings: ReplicateSettings,
    token: String,
}

impl ReplicateClient {
    pub fn new(settings: ReplicateSettings, http: &HttpSettings) -> Result<Self> {
        let token = settings.resolved_token().ok_or_else(|| {
            VenteError::Config(
                "No Replicate API token. Set replicate.api_token or REPLICATE_API_TOKEN."
                    .to_string(),
            )
        })?;
        Ok(Self {
            client: create_client_with_timeout(&http.user_agent, http.timeout())?,
            settings,
            token,
        })
    }

    pub fn settings(&self) -> &ReplicateSettings {
        &self.settings
    }

    fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    fn prediction_url(&self, handle: &JobHandle) -> Result<String> {
        let id = handle.as_str().trim();
        if id.is_empty() || id.contains('/') {
            return Err(VenteError::Validation(format!(
                "Invalid prediction id: '{}'",
                handle
            )));
        }
        Ok(format!("{}/predictions/{}", self.base_url(), id))
    }
}

#[async_trait]
impl StatusCheck for ReplicateClient {
    type Payload = VideoOutput;

    #[instrument(skip(self), fields(prediction = %handle))]
    async fn check_status(&self, handle: &JobHandle) -> Result<JobStatus<VideoOutput>> {
        let response = self
            .client
            .get(self.prediction_url(handle)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body = read_json(response).await?;
        Ok(parse_prediction(
            &body,
            self.settings.delivery_proxy_url.as_deref(),
        ))
    }
}

#[async_trait]
impl JobService for ReplicateClient {
    type Description = ReplicateRequest;

    #[instrument(skip(self, request))]
    async fn submit(&self, request: &ReplicateRequest) -> Result<Submission<VideoOutput>> {
        request.validate()?;

        let url = format!(
            "{}/models/{}/predictions",
            self.base_url(),
            self.settings.model_path.trim_matches('/')
        );
        debug!("Submitting prediction to {}", url);

        // Prefer: wait holds the request open until the prediction settles
        // or the server-side wait window ends.
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&request.payload())
            .send()
            .await?;
        let body = read_json(response).await?;

        let id = body
            .get("id")
            .and_then(|i| i.as_str())
            .filter(|i| !i.is_empty())
            .ok_or_else(|| {
                VenteError::Protocol("Failed to get prediction id from API response".to_string())
            })?;
        let initial = parse_prediction(&body, self.settings.delivery_proxy_url.as_deref());
        info!(prediction = %id, status = %initial.label(), "Prediction created");

        Ok(Submission {
            handle: JobHandle::new(id),
            initial,
        })
    }

    #[instrument(skip(self), fields(prediction = %handle))]
    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/cancel", self.prediction_url(handle)?))
            .bearer_auth(&self.token)
            .send()
            .await?;
        read_json(response).await?;
        info!("Prediction cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROXY: &str = "https://ai-asset-proxy.mrproper.dev/api/replicate/";

    #[test]
    fn test_replace_delivery_url() {
        let original =
            "https://replicate.delivery/pbxt/JzGrWGQ3tVEQoYQkOKOuvmYfZsGn85RIBhb3OKqtVdRZjnvhA/output.mp4";
        assert_eq!(
            replace_delivery_url(original, Some(PROXY)),
            "https://ai-asset-proxy.mrproper.dev/api/replicate/pbxt/JzGrWGQ3tVEQoYQkOKOuvmYfZsGn85RIBhb3OKqtVdRZjnvhA/output.mp4"
        );

        let other = "https://example.com/video.mp4";
        assert_eq!(replace_delivery_url(other, Some(PROXY)), other);
        assert_eq!(replace_delivery_url(original, None), original);
    }

    #[test]
    fn test_pending_statuses_carry_logs() {
        let body = json!({"id": "p1", "status": "processing", "logs": "Generating video... 40%"});
        assert_eq!(
            parse_prediction(&body, None),
            JobStatus::Pending {
                logs: Some("Generating video... 40%".to_string())
            }
        );

        let body = json!({"id": "p1", "status": "starting", "logs": ""});
        assert_eq!(parse_prediction(&body, None), JobStatus::pending());
    }

    #[test]
    fn test_succeeded_output_shapes() {
        let single = json!({"status": "succeeded", "output": "https://replicate.delivery/a/out.mp4"});
        assert_eq!(
            parse_prediction(&single, Some(PROXY)),
            JobStatus::Succeeded(VideoOutput {
                urls: vec!["https://ai-asset-proxy.mrproper.dev/api/replicate/a/out.mp4".to_string()]
            })
        );

        let many = json!({"status": "succeeded", "output": ["https://x/1.mp4", 3, "https://x/2.mp4"]});
        match parse_prediction(&many, None) {
            JobStatus::Succeeded(out) => assert_eq!(out.urls.len(), 2),
            other => panic!("expected success, got {:?}", other),
        }

        let none = json!({"status": "succeeded", "output": null});
        assert_eq!(
            parse_prediction(&none, None),
            JobStatus::Succeeded(VideoOutput { urls: Vec::new() })
        );
    }

    #[test]
    fn test_terminal_failures() {
        let failed = json!({"status": "failed", "error": "NSFW content detected"});
        assert_eq!(
            parse_prediction(&failed, None),
            JobStatus::Failed("NSFW content detected".to_string())
        );

        let failed = json!({"status": "failed", "error": null});
        assert_eq!(
            parse_prediction(&failed, None),
            JobStatus::Failed("Unknown error".to_string())
        );

        let canceled = json!({"status": "canceled"});
        assert!(matches!(parse_prediction(&canceled, None), JobStatus::Failed(_)));

        let odd = json!({"status": "paused"});
        assert_eq!(
            parse_prediction(&odd, None),
            JobStatus::Unknown("paused".to_string())
        );
    }

    #[test]
    fn test_request_validation_and_payload() {
        let empty = ReplicateRequest::default();
        assert!(matches!(empty.validate(), Err(VenteError::Validation(_))));

        let request = ReplicateRequest {
            prompt: "a cat surfing".to_string(),
            negative_prompt: Some("blurry".to_string()),
        };
        assert!(request.validate().is_ok());
        let payload = request.payload();
        assert_eq!(payload["input"]["prompt"], "a cat surfing");
        assert_eq!(payload["input"]["negative_prompt"], "blurry");
    }

    #[test]
    fn test_prediction_url_rejects_bad_ids() {
        let settings = ReplicateSettings {
            api_token: Some("r8_test".to_string()),
            ..ReplicateSettings::default()
        };
        let client = ReplicateClient::new(settings, &HttpSettings::default()).unwrap();

        assert_eq!(
            client.prediction_url(&JobHandle::new("abc123")).unwrap(),
            "https://api.replicate.com/v1/predictions/abc123"
        );
        assert!(client.prediction_url(&JobHandle::new("")).is_err());
        assert!(client.prediction_url(&JobHandle::new("../x")).is_err());
    }
}
