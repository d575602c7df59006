//! Flights command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{FlightsAction, Output, SpinnerSink};
use crate::config::Settings;
use crate::orchestrator::{FlightSearchRequest, Orchestrator};
use anyhow::Result;

/// Run a flights subcommand.
pub async fn run_flights(action: &FlightsAction, settings: Settings) -> Result<()> {
    preflight::check(Operation::Flights, &settings)?;
    let orchestrator = Orchestrator::new(settings)?;

    let text = match action {
        FlightsAction::Search {
            origin,
            destination,
            departure,
            return_date,
            adults,
        } => {
            let request = FlightSearchRequest {
                origin: origin.clone(),
                destination: destination.clone(),
                departure: departure.clone(),
                return_date: return_date.clone(),
                adults: *adults,
            };
            let sink = SpinnerSink::new("Searching flights...");
            orchestrator.search_flights(&request, &sink).await?
        }

        FlightsAction::Calendar {
            origin,
            destination,
        } => {
            let sink = SpinnerSink::new("Fetching price calendar...");
            orchestrator
                .price_calendar(origin, destination, &sink)
                .await?
        }

        FlightsAction::Cheapest {
            origin,
            destination,
            days,
        } => {
            let sink = SpinnerSink::new("Finding cheapest dates...");
            orchestrator
                .cheapest_round_trip(origin, destination, *days, &sink)
                .await?
        }
    };

    Output::block(&text);
    Ok(())
}
