//! Configuration settings for Vente.

use crate::error::{Result, VenteError};
use crate::poller::PollConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub http: HttpSettings,
    pub flights: FlightSettings,
    pub places: PlacesSettings,
    pub replicate: ReplicateSettings,
    pub veo: VeoSettings,
    pub vertex: VertexSettings,
    pub asset_proxy: AssetProxySettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// User agent sent to every upstream.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:139.0) Gecko/20100101 Firefox/139.0"
                .to_string(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Attempt budget and delay for one kind of poll loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollSettings {
    /// Maximum number of status checks.
    pub max_attempts: u32,
    /// Delay before each status check, in seconds.
    pub delay_seconds: f64,
}

impl PollSettings {
    pub fn new(max_attempts: u32, delay_seconds: f64) -> Self {
        Self {
            max_attempts,
            delay_seconds,
        }
    }

    /// Convert into a poller configuration, rejecting unusable values.
    pub fn to_config(&self) -> Result<PollConfig> {
        if self.max_attempts == 0 {
            return Err(VenteError::Validation(
                "max_attempts must be a positive integer".to_string(),
            ));
        }
        if !self.delay_seconds.is_finite() || self.delay_seconds < 0.0 {
            return Err(VenteError::Validation(format!(
                "delay_seconds must be a non-negative number, got {}",
                self.delay_seconds
            )));
        }
        Ok(PollConfig::new(
            self.max_attempts,
            Duration::from_secs_f64(self.delay_seconds),
        ))
    }
}

/// Skyscanner flight search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightSettings {
    /// Skyscanner site to talk to.
    pub base_url: String,
    /// Market code (e.g. NL).
    pub market: String,
    /// Locale (e.g. nl-NL).
    pub locale: String,
    /// Currency for quoted prices.
    pub currency: String,
    /// Entries per ranked category.
    pub top_n: usize,
    /// Emit a citation event with the formatted results.
    pub citation: bool,
    /// Polling budget for the unified search.
    pub poll: PollSettings,
}

impl Default for FlightSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.skyscanner.nl".to_string(),
            market: "NL".to_string(),
            locale: "nl-NL".to_string(),
            currency: "EUR".to_string(),
            top_n: 3,
            citation: true,
            poll: PollSettings::new(15, 3.0),
        }
    }
}

/// Google Maps Places settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacesSettings {
    /// Base URL for the Places API (New).
    pub base_url: String,
    /// API key (falls back to GOOGLE_MAPS_API_KEY).
    pub api_key: Option<String>,
    /// Width requested for place photos.
    pub max_photo_width: u32,
    /// Emit a citation event per suggested place.
    pub citation: bool,
}

impl Default for PlacesSettings {
    fn default() -> Self {
        Self {
            base_url: "https://places.googleapis.com/v1".to_string(),
            api_key: None,
            max_photo_width: 400,
            citation: true,
        }
    }
}

impl PlacesSettings {
    /// Configured key, or the GOOGLE_MAPS_API_KEY environment variable.
    pub fn resolved_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| env_var("GOOGLE_MAPS_API_KEY"))
    }
}

/// Replicate prediction API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateSettings {
    /// Base URL for the Replicate API.
    pub base_url: String,
    /// Model path, e.g. google/veo-3.
    pub model_path: String,
    /// API token (falls back to REPLICATE_API_TOKEN).
    pub api_token: Option<String>,
    /// Rewrite replicate.delivery URLs onto this prefix.
    pub delivery_proxy_url: Option<String>,
    /// Polling budget for predictions.
    pub poll: PollSettings,
}

impl Default for ReplicateSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.replicate.com/v1".to_string(),
            model_path: "google/veo-3".to_string(),
            api_token: None,
            delivery_proxy_url: None,
            poll: PollSettings::new(180, 10.0),
        }
    }
}

impl ReplicateSettings {
    /// Configured token, or the REPLICATE_API_TOKEN environment variable.
    pub fn resolved_token(&self) -> Option<String> {
        non_empty(self.api_token.clone()).or_else(|| env_var("REPLICATE_API_TOKEN"))
    }
}

/// Google Veo (Gemini API) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VeoSettings {
    /// Base URL for the Gemini API.
    pub base_url: String,
    /// Veo model name.
    pub model: String,
    /// API key (falls back to GOOGLE_API_KEY).
    pub api_key: Option<String>,
    /// Proxy that serves generated files as `{proxy_url}/{file_id}/{key}`.
    pub proxy_url: Option<String>,
    /// Polling budget for operations.
    pub poll: PollSettings,
}

impl Default for VeoSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "veo-2.0-generate-001".to_string(),
            api_key: None,
            proxy_url: None,
            poll: PollSettings::new(60, 5.0),
        }
    }
}

impl VeoSettings {
    /// Configured key, or the GOOGLE_API_KEY environment variable.
    pub fn resolved_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| env_var("GOOGLE_API_KEY"))
    }
}

/// Vertex AI (Imagen / Lyria) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexSettings {
    /// Google Cloud project ID.
    pub project_id: Option<String>,
    /// Region for the prediction endpoints.
    pub location: String,
    /// Default Imagen model.
    pub image_model: String,
    /// Default Lyria model.
    pub music_model: String,
    /// Static bearer token (falls back to VERTEX_ACCESS_TOKEN, then gcloud).
    pub access_token: Option<String>,
    /// Upload generated media to the asset proxy.
    pub auto_upload: bool,
}

impl Default for VertexSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            location: "us-central1".to_string(),
            image_model: "imagen-4.0-generate-preview-05-20".to_string(),
            music_model: "lyria-002".to_string(),
            access_token: None,
            auto_upload: true,
        }
    }
}

impl VertexSettings {
    /// Configured project, or GOOGLE_CLOUD_PROJECT.
    pub fn resolved_project(&self) -> Option<String> {
        non_empty(self.project_id.clone()).or_else(|| env_var("GOOGLE_CLOUD_PROJECT"))
    }

    /// Configured token, or VERTEX_ACCESS_TOKEN.
    pub fn resolved_token(&self) -> Option<String> {
        non_empty(self.access_token.clone()).or_else(|| env_var("VERTEX_ACCESS_TOKEN"))
    }
}

/// Asset proxy upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetProxySettings {
    /// Upload endpoint.
    pub url: String,
    /// Authentication GUID (falls back to ASSET_PROXY_AUTH_GUID).
    pub auth_guid: Option<String>,
}

impl Default for AssetProxySettings {
    fn default() -> Self {
        Self {
            url: "https://ai-asset-proxy.mrproper.dev/api/upload".to_string(),
            auth_guid: None,
        }
    }
}

impl AssetProxySettings {
    pub fn resolved_guid(&self) -> Option<String> {
        non_empty(self.auth_guid.clone()).or_else(|| env_var("ASSET_PROXY_AUTH_GUID"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_var(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings no tool operation could run with.
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_seconds == 0 {
            return Err(VenteError::Validation(
                "http.timeout_seconds must be positive".to_string(),
            ));
        }
        if self.flights.top_n == 0 {
            return Err(VenteError::Validation(
                "flights.top_n must be at least 1".to_string(),
            ));
        }
        if self.places.max_photo_width == 0 {
            return Err(VenteError::Validation(
                "places.max_photo_width must be positive".to_string(),
            ));
        }
        for (section, poll) in [
            ("flights.poll", &self.flights.poll),
            ("replicate.poll", &self.replicate.poll),
            ("veo.poll", &self.veo.poll),
        ] {
            poll.to_config()
                .map_err(|e| VenteError::Validation(format!("{}: {}", section, e)))?;
        }
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VenteError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vente")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.flights.poll, PollSettings::new(15, 3.0));
        assert_eq!(settings.replicate.poll.max_attempts, 180);
        assert_eq!(settings.flights.top_n, 3);
        assert_eq!(settings.places.max_photo_width, 400);
    }

    #[test]
    fn test_poll_settings_validation() {
        let config = PollSettings::new(15, 3.0).to_config().unwrap();
        assert_eq!(config.max_attempts, 15);
        assert_eq!(config.delay, Duration::from_secs(3));

        assert!(matches!(
            PollSettings::new(0, 3.0).to_config(),
            Err(VenteError::Validation(_))
        ));
        assert!(matches!(
            PollSettings::new(5, -1.0).to_config(),
            Err(VenteError::Validation(_))
        ));
        assert!(matches!(
            PollSettings::new(5, f64::NAN).to_config(),
            Err(VenteError::Validation(_))
        ));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [flights]
            currency = "USD"
            top_n = 5

            [places]
            api_key = "maps-key"

            [veo.poll]
            max_attempts = 10
            delay_seconds = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(settings.flights.currency, "USD");
        assert_eq!(settings.flights.top_n, 5);
        assert_eq!(settings.flights.market, "NL");
        assert_eq!(settings.veo.poll, PollSettings::new(10, 0.5));
        assert_eq!(settings.replicate.model_path, "google/veo-3");
        assert_eq!(settings.places.resolved_key().as_deref(), Some("maps-key"));
        assert!(settings.places.citation);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.flights.currency = "GBP".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.flights.currency, "GBP");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[flights]\ntop_n = 0\n").unwrap();

        assert!(matches!(
            Settings::load_from(Some(&path)),
            Err(VenteError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.flights.base_url, "https://www.skyscanner.nl");
    }
}
