//! Uploads of generated media to the asset proxy.

use crate::config::{AssetProxySettings, HttpSettings};
use crate::error::{Result, VenteError};
use crate::http::{create_client_with_timeout, read_json};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Per-upload request timeout.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A stored asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedAsset {
    pub id: String,
    pub url: String,
}

/// Capability that stores base64 media and returns a public URL.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload(&self, base64_data: &str, mime_type: &str) -> Result<UploadedAsset>;
}

/// Read the upload id out of a proxy response.
pub fn parse_upload_response(body: &Value, upload_url: &str) -> Result<UploadedAsset> {
    let id = match body.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(VenteError::Protocol(
                "Upload succeeded but no id was returned".to_string(),
            ))
        }
    };
    Ok(UploadedAsset {
        url: format!("{}/{}", upload_url.trim_end_matches('/'), id),
        id,
    })
}

/// HTTP client for the asset proxy.
pub struct AssetProxyClient {
    client: reqwest::Client,
    url: String,
    auth_guid: String,
}

impl AssetProxyClient {
    pub fn new(settings: &AssetProxySettings, http: &HttpSettings) -> Result<Self> {
        let auth_guid = settings.resolved_guid().ok_or_else(|| {
            VenteError::Config(
                "No asset proxy auth GUID. Set asset_proxy.auth_guid or ASSET_PROXY_AUTH_GUID."
                    .to_string(),
            )
        })?;
        Ok(Self {
            client: create_client_with_timeout(&http.user_agent, UPLOAD_TIMEOUT)?,
            url: settings.url.clone(),
            auth_guid,
        })
    }
}

#[async_trait]
impl AssetUploader for AssetProxyClient {
    #[instrument(skip(self, base64_data), fields(bytes = base64_data.len()))]
    async fn upload(&self, base64_data: &str, mime_type: &str) -> Result<UploadedAsset> {
        let response = self
            .client
            .post(&self.url)
            .header("X-Auth-Guid", &self.auth_guid)
            .json(&json!({ "data": base64_data, "mimeType": mime_type }))
            .send()
            .await?;
        let body = read_json(response).await?;

        let asset = parse_upload_response(&body, &self.url)?;
        debug!(id = %asset.id, "Uploaded asset");
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://ai-asset-proxy.mrproper.dev/api/upload";

    #[test]
    fn test_parse_upload_response() {
        let asset = parse_upload_response(&json!({"id": "f3a9"}), URL).unwrap();
        assert_eq!(asset.url, "https://ai-asset-proxy.mrproper.dev/api/upload/f3a9");

        let asset = parse_upload_response(&json!({"id": 42}), &format!("{}/", URL)).unwrap();
        assert_eq!(asset.id, "42");
        assert_eq!(asset.url, "https://ai-asset-proxy.mrproper.dev/api/upload/42");

        assert!(matches!(
            parse_upload_response(&json!({"ok": true}), URL),
            Err(VenteError::Protocol(_))
        ));
    }

    #[test]
    fn test_client_requires_guid() {
        let settings = AssetProxySettings {
            auth_guid: Some("guid".into()),
            ..AssetProxySettings::default()
        };
        assert!(AssetProxyClient::new(&settings, &HttpSettings::default()).is_ok());
    }
}
