//! Places command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, SpinnerSink};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::places::PlaceSearchRequest;
use anyhow::Result;

/// Suggest places for a query and print them.
pub async fn run_places(request: &PlaceSearchRequest, settings: Settings) -> Result<()> {
    preflight::check(Operation::Places, &settings)?;
    let orchestrator = Orchestrator::new(settings)?;

    let sink = SpinnerSink::new("Searching Google Maps...");
    let text = orchestrator.search_places(request, &sink).await?;

    Output::block(&text);
    Ok(())
}
