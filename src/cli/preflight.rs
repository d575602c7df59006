//! Pre-flight checks before upstream calls.
//!
//! Validates that the credentials and tools an operation needs are available
//! before any request is made.

use crate::config::Settings;
use crate::error::{Result, VenteError};
use crate::orchestrator::VideoProvider;
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Skyscanner needs no credentials.
    Flights,
    /// Video jobs need the provider's token or key.
    Video(VideoProvider),
    /// Vertex AI needs a project and a token source.
    Media,
    /// Google Maps needs an API key.
    Places,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Flights => {}
        Operation::Video(VideoProvider::Replicate) => {
            if settings.replicate.resolved_token().is_none() {
                return Err(VenteError::Config(
                    "REPLICATE_API_TOKEN not set. Set it with: export REPLICATE_API_TOKEN='r8_...'"
                        .to_string(),
                ));
            }
        }
        Operation::Video(VideoProvider::Veo) => {
            if settings.veo.resolved_key().is_none() {
                return Err(VenteError::Config(
                    "GOOGLE_API_KEY not set. Set it with: export GOOGLE_API_KEY='...'"
                        .to_string(),
                ));
            }
        }
        Operation::Media => {
            if settings.vertex.resolved_project().is_none() {
                return Err(VenteError::Config(
                    "No Vertex AI project. Set vertex.project_id or GOOGLE_CLOUD_PROJECT."
                        .to_string(),
                ));
            }
            if settings.vertex.resolved_token().is_none() {
                check_tool("gcloud")?;
            }
        }
        Operation::Places => {
            if settings.places.resolved_key().is_none() {
                return Err(VenteError::Config(
                    "GOOGLE_MAPS_API_KEY not set. Set it with: export GOOGLE_MAPS_API_KEY='...'"
                        .to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(VenteError::Config(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(VenteError::Config(format!(
            "{} not found. Install it or configure a static access token.",
            name
        ))),
        Err(e) => Err(VenteError::Config(format!("{}: {}", name, e))),
    }
}
