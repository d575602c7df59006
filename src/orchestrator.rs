//! Tool orchestrator for Vente.
//!
//! Wires the configured clients together and runs each tool operation end to
//! end: validation, upstream calls, polling, ranking and formatting. Every
//! operation reports through a [`ProgressSink`] and finishes with exactly one
//! terminal success or error event.

use crate::config::Settings;
use crate::error::{Result, VenteError};
use crate::flights::calendar::{
    find_cheapest_round_trip, parse_date, CalendarMatch, CalendarService, PriceMap,
};
use crate::flights::format::{
    attribution, format_incomplete_search, format_price_calendar, format_round_trip,
    format_search_results,
};
use crate::flights::ranker::rank;
use crate::flights::skyscanner::{RoundTripQuery, SearchResults, SkyscannerClient};
use crate::jobs::{JobService, ReplicateClient, ReplicateRequest, VeoClient, VeoRequest, VideoOutput};
use crate::media::{
    list_models, AssetProxyClient, AssetUploader, ImageRequest, MediaResponse, MusicRequest,
    Session, VertexClient,
};
use crate::places::{format_heading, format_place, PlaceSearchRequest, PlacesClient};
use crate::poller::{logs_to_progress_message, JobHandle, JobStatus, Poller, ProgressSink, StatusCheck};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Uploads in flight at once when publishing generated media.
const MAX_CONCURRENT_UPLOADS: usize = 4;

/// Which video backend runs a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoProvider {
    Replicate,
    Veo,
}

impl fmt::Display for VideoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoProvider::Replicate => write!(f, "replicate"),
            VideoProvider::Veo => write!(f, "veo"),
        }
    }
}

impl FromStr for VideoProvider {
    type Err = VenteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "replicate" => Ok(VideoProvider::Replicate),
            "veo" | "google" => Ok(VideoProvider::Veo),
            other => Err(VenteError::Validation(format!(
                "Unknown video provider '{}'. Use 'replicate' or 'veo'.",
                other
            ))),
        }
    }
}

/// A video generation job for one of the providers.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoJob {
    Replicate(ReplicateRequest),
    Veo(VeoRequest),
}

impl VideoJob {
    fn describe(&self) -> String {
        let prompt = match self {
            VideoJob::Replicate(request) => Some(request.prompt.as_str()),
            VideoJob::Veo(request) => request.prompt.as_deref(),
        };
        match prompt.filter(|p| !p.trim().is_empty()) {
            Some(prompt) => format!("prompt: {}", prompt),
            None => "the supplied image".to_string(),
        }
    }
}

/// Raw parameters of a round-trip flight search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSearchRequest {
    pub origin: String,
    pub destination: String,
    /// Departure date, `YYYY-MM-DD`.
    pub departure: String,
    /// Return date, `YYYY-MM-DD`.
    pub return_date: String,
    #[serde(default = "default_adults")]
    pub adults: u32,
}

fn default_adults() -> u32 {
    1
}

impl FlightSearchRequest {
    /// Check the request and parse its dates.
    pub fn validate(&self) -> Result<(NaiveDate, NaiveDate)> {
        require_place(&self.origin, "origin")?;
        require_place(&self.destination, "destination")?;
        let departure = parse_date(&self.departure)?;
        let return_date = parse_date(&self.return_date)?;
        if return_date < departure {
            return Err(VenteError::Validation(format!(
                "Return date {} is before departure date {}",
                return_date, departure
            )));
        }
        if self.adults == 0 {
            return Err(VenteError::Validation(
                "At least one passenger is required".to_string(),
            ));
        }
        Ok((departure, return_date))
    }
}

fn require_place(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(VenteError::Validation(format!("The {} must not be empty", field)));
    }
    Ok(())
}

/// The main orchestrator for Vente tools.
pub struct Orchestrator {
    settings: Settings,
    flights: Arc<SkyscannerClient>,
    calendar: Arc<dyn CalendarService>,
    vertex: VertexClient,
    session: Mutex<Session>,
    uploader: Option<Arc<dyn AssetUploader>>,
}

impl Orchestrator {
    /// Create a new orchestrator from settings.
    ///
    /// Video clients are built per call, so a missing Replicate token or Veo
    /// key only fails the operations that need it.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let flights = Arc::new(SkyscannerClient::new(
            settings.flights.clone(),
            &settings.http,
        )?);
        let vertex = VertexClient::new(settings.vertex.clone(), &settings.http)?;
        let session = Session::from_settings(&settings.vertex);

        let uploader: Option<Arc<dyn AssetUploader>> = if settings.vertex.auto_upload {
            match AssetProxyClient::new(&settings.asset_proxy, &settings.http) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    debug!("Asset uploads disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            calendar: flights.clone(),
            flights,
            vertex,
            session: Mutex::new(session),
            uploader,
            settings,
        })
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        calendar: Arc<dyn CalendarService>,
        session: Session,
        uploader: Option<Arc<dyn AssetUploader>>,
    ) -> Result<Self> {
        let flights = Arc::new(SkyscannerClient::new(
            settings.flights.clone(),
            &settings.http,
        )?);
        let vertex = VertexClient::new(settings.vertex.clone(), &settings.http)?;

        Ok(Self {
            settings,
            flights,
            calendar,
            vertex,
            session: Mutex::new(session),
            uploader,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Where Vertex AI tokens come from.
    pub async fn token_source(&self) -> String {
        self.session.lock().await.source()
    }

    /// Whether generated media is uploaded to the asset proxy.
    pub fn uploads_enabled(&self) -> bool {
        self.uploader.is_some()
    }

    // ---- Flights ----

    /// Search round-trip flights and format the ranked top-N sections.
    #[instrument(skip(self, request, sink), fields(origin = %request.origin, destination = %request.destination))]
    pub async fn search_flights(
        &self,
        request: &FlightSearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let result = self.search_flights_inner(request, sink).await;
        finish(sink, result, "Flight search processing complete. Results formatted.")
    }

    async fn search_flights_inner(
        &self,
        request: &FlightSearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let (departure, return_date) = request.validate()?;
        let poller =
            Poller::new(self.settings.flights.poll.to_config()?).with_label("flight search");

        sink.progress(&format!(
            "Looking up {} and {}...",
            request.origin.trim(),
            request.destination.trim()
        ));
        let (origin, destination) = tokio::try_join!(
            self.flights.place_details(request.origin.trim(), false),
            self.flights.place_details(request.destination.trim(), true),
        )?;

        let query = RoundTripQuery {
            origin,
            destination,
            departure,
            return_date,
            adults: request.adults,
        };
        sink.progress(&format!(
            "Searching flights from {} to {}...",
            query.origin.name, query.destination.name
        ));
        let (session, submission) = self.flights.start_search(&query).await?;

        let outcome = poller
            .run(&session, &submission.handle, Some(submission.initial), sink)
            .await
            .into_result();
        let (results, stopped) = settle_search(outcome, session.partial_results())?;
        info!(
            total = results.total_results,
            parsed = results.itineraries.len(),
            complete = stopped.is_none(),
            "Flight search finished"
        );

        let top_n = self.settings.flights.top_n;
        let rankings = rank(&results.itineraries, top_n);
        let text = match stopped {
            None => format_search_results(&results, &rankings, top_n),
            Some(reason) => {
                warn!(error = %reason, "Rendering partial flight results");
                sink.progress(&format!("Search may be incomplete: {}", reason));
                format_incomplete_search(&results, &rankings, top_n, &reason.to_string())
            }
        };
        Ok(self.cite(
            sink,
            &format!(
                "Flights {} to {}",
                query.origin.name, query.destination.name
            ),
            &self.flights.search_page_url(&query),
            text,
        ))
    }

    /// One-way price calendar from `origin` to `destination`.
    #[instrument(skip(self, sink))]
    pub async fn price_calendar(
        &self,
        origin: &str,
        destination: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let result = self.price_calendar_inner(origin, destination, sink).await;
        finish(sink, result, "Price calendar retrieved.")
    }

    async fn price_calendar_inner(
        &self,
        origin: &str,
        destination: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        require_place(origin, "origin")?;
        require_place(destination, "destination")?;

        sink.progress(&format!("Looking up {} and {}...", origin.trim(), destination.trim()));
        let (origin, destination) = tokio::try_join!(
            self.flights.place_details(origin.trim(), false),
            self.flights.place_details(destination.trim(), true),
        )?;

        sink.progress("Fetching price calendar...");
        let days = self
            .calendar
            .fetch_calendar(&origin.sky_id, &destination.sky_id)
            .await?;
        if days.is_empty() {
            return Ok(format!(
                "No price calendar data available for {} to {}.",
                origin.name, destination.name
            ));
        }

        let text = format_price_calendar(
            &origin.name,
            &destination.name,
            &days,
            &self.settings.flights.currency,
        );
        Ok(self.cite(
            sink,
            &format!("Price calendar {} to {}", origin.name, destination.name),
            &self.flights.route_url(&origin, &destination),
            text,
        ))
    }

    /// Cheapest outbound/return pair exactly `trip_duration_days` apart.
    #[instrument(skip(self, sink))]
    pub async fn cheapest_round_trip(
        &self,
        origin: &str,
        destination: &str,
        trip_duration_days: i64,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let result = self
            .cheapest_round_trip_inner(origin, destination, trip_duration_days, sink)
            .await;
        finish(sink, result, "Cheapest round trip search complete.")
    }

    async fn cheapest_round_trip_inner(
        &self,
        origin: &str,
        destination: &str,
        trip_duration_days: i64,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        require_place(origin, "origin")?;
        require_place(destination, "destination")?;
        require_trip_duration(trip_duration_days)?;

        sink.progress(&format!("Looking up {} and {}...", origin.trim(), destination.trim()));
        let (origin, destination) = tokio::try_join!(
            self.flights.place_details(origin.trim(), false),
            self.flights.place_details(destination.trim(), true),
        )?;

        sink.progress("Fetching outbound and return price calendars...");
        let result = cheapest_window(
            self.calendar.as_ref(),
            &origin.sky_id,
            &destination.sky_id,
            trip_duration_days,
        )
        .await?;

        let text = format_round_trip(&result, trip_duration_days, &self.settings.flights.currency);
        Ok(self.cite(
            sink,
            &format!("Round trip {} to {}", origin.name, destination.name),
            &self.flights.route_url(&origin, &destination),
            text,
        ))
    }

    fn cite(&self, sink: &dyn ProgressSink, title: &str, url: &str, text: String) -> String {
        if !self.settings.flights.citation {
            return text;
        }
        sink.citation(title, url, &text);
        format!("{}\n\n{}", text, attribution(&self.settings.flights.base_url))
    }

    // ---- Places ----

    fn places(&self) -> Result<PlacesClient> {
        PlacesClient::new(self.settings.places.clone(), &self.settings.http)
    }

    /// Suggest places for a free-text query, one markdown section each.
    #[instrument(skip(self, request, sink), fields(query = %request.query))]
    pub async fn search_places(
        &self,
        request: &PlaceSearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let result = self.search_places_inner(request, sink).await;
        finish(
            sink,
            result,
            &format!("Place suggestions for {} retrieved.", request.query.trim()),
        )
    }

    async fn search_places_inner(
        &self,
        request: &PlaceSearchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        request.validate()?;
        let client = self.places()?;
        let query = request.query.trim();

        sink.progress(&format!("Searching Google Maps for '{}'...", query));
        let places = client.search_text(request).await.map_err(with_key_hint)?;
        if places.is_empty() {
            return Ok(format!("No places found matching your query: '{}'.", query));
        }

        let mut sections = vec![format_heading(query)];
        for (idx, place) in places.iter().enumerate() {
            let section = format_place(place, idx + 1);
            if client.settings().citation {
                sink.citation(&format!("Google Maps - {}", place.name), &place.maps_uri, &section);
            }
            sections.push(section);
        }
        Ok(sections.join("\n\n"))
    }

    // ---- Video ----

    fn replicate(&self) -> Result<ReplicateClient> {
        ReplicateClient::new(self.settings.replicate.clone(), &self.settings.http)
    }

    fn veo(&self) -> Result<VeoClient> {
        VeoClient::new(self.settings.veo.clone(), &self.settings.http)
    }

    /// Submit a video job and poll it to completion.
    #[instrument(skip(self, job, sink))]
    pub async fn generate_video(&self, job: &VideoJob, sink: &dyn ProgressSink) -> Result<String> {
        let result = self.generate_video_inner(job, sink).await;
        finish(sink, result, "Video generation complete.")
    }

    async fn generate_video_inner(&self, job: &VideoJob, sink: &dyn ProgressSink) -> Result<String> {
        let output = match job {
            VideoJob::Replicate(request) => {
                request.validate()?;
                let poller = Poller::new(self.settings.replicate.poll.to_config()?)
                    .with_label("video generation");
                let client = self.replicate()?;
                sink.progress("Submitting video generation request to Replicate...");
                run_job(&client, request, &poller, sink).await?
            }
            VideoJob::Veo(request) => {
                request.validate()?;
                let poller = Poller::new(self.settings.veo.poll.to_config()?)
                    .with_label("video generation");
                let client = self.veo()?;
                sink.progress("Submitting video generation request to Veo...");
                run_job(&client, request, &poller, sink).await?
            }
        };

        emit_videos(&output, sink)?;
        Ok(format!(
            "{} video(s) generated from {}",
            output.urls.len(),
            job.describe()
        ))
    }

    /// Check a video job once.
    #[instrument(skip(self, sink))]
    pub async fn video_status(
        &self,
        provider: VideoProvider,
        job_id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let result = self.video_status_inner(provider, job_id, sink).await;
        finish(sink, result, "Video status checked.")
    }

    async fn video_status_inner(
        &self,
        provider: VideoProvider,
        job_id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let handle = job_handle(job_id)?;
        sink.progress(&format!("Checking status of {} job {}...", provider, handle));
        let status = match provider {
            VideoProvider::Replicate => self.replicate()?.check_status(&handle).await?,
            VideoProvider::Veo => self.veo()?.check_status(&handle).await?,
        };
        describe_status(&handle, status, sink)
    }

    /// Ask the provider to cancel a video job.
    #[instrument(skip(self, sink))]
    pub async fn cancel_video(
        &self,
        provider: VideoProvider,
        job_id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let result = self.cancel_video_inner(provider, job_id, sink).await;
        finish(sink, result, "Cancellation requested.")
    }

    async fn cancel_video_inner(
        &self,
        provider: VideoProvider,
        job_id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let handle = job_handle(job_id)?;
        sink.progress(&format!("Cancelling {} job {}...", provider, handle));
        match provider {
            VideoProvider::Replicate => self.replicate()?.cancel(&handle).await?,
            VideoProvider::Veo => self.veo()?.cancel(&handle).await?,
        }
        Ok(format!("Cancellation requested for {} job {}", provider, handle))
    }

    // ---- Media ----

    /// Generate images with Imagen and publish them.
    #[instrument(skip(self, request, sink))]
    pub async fn generate_image(
        &self,
        request: ImageRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let result = self.generate_image_inner(request, sink).await;
        finish(sink, result, "Image generation complete.")
    }

    async fn generate_image_inner(
        &self,
        mut request: ImageRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        sink.progress("Generating image...");
        let (response, notes) = {
            let mut session = self.session.lock().await;
            self.vertex.generate_image(&mut session, &mut request).await?
        };
        for note in &notes {
            sink.progress(note);
        }

        let mut lines = vec![format!(
            "Generated {} image(s) with {}",
            response.media.len(),
            response.model_display_name.as_deref().unwrap_or(&response.model)
        )];
        if let Some(enhanced) = &response.enhanced_prompt {
            lines.push(format!("Enhanced prompt: {}", enhanced));
        }
        lines.extend(notes);
        lines.extend(
            publish_media(self.uploader.as_deref(), &response, MediaKind::Image, sink).await,
        );
        Ok(lines.join("\n"))
    }

    /// Generate music with Lyria and publish it.
    #[instrument(skip(self, request, sink))]
    pub async fn generate_music(
        &self,
        request: &MusicRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let result = self.generate_music_inner(request, sink).await;
        finish(sink, result, "Music generation complete.")
    }

    async fn generate_music_inner(
        &self,
        request: &MusicRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        request.validate()?;
        sink.progress("Generating music...");
        let response = {
            let mut session = self.session.lock().await;
            self.vertex.generate_music(&mut session, request).await?
        };

        let mut lines = vec![format!(
            "Generated {} track(s) with {}",
            response.media.len(),
            response.model_display_name.as_deref().unwrap_or(&response.model)
        )];
        lines.extend(
            publish_media(self.uploader.as_deref(), &response, MediaKind::Audio, sink).await,
        );
        Ok(lines.join("\n"))
    }

    /// Allowed Vertex AI models with the configured defaults marked.
    pub fn list_models(&self) -> String {
        list_models(
            &self.settings.vertex.image_model,
            &self.settings.vertex.music_model,
        )
    }
}

/// Report the terminal event for an operation and pass its result through.
fn finish(sink: &dyn ProgressSink, result: Result<String>, done: &str) -> Result<String> {
    match &result {
        Ok(_) => sink.success(done),
        Err(e) => sink.error(&format!("Error: {}", e)),
    }
    result
}

/// Fall back to the itineraries already received when a search stops short.
///
/// A search that ran out of attempts or hit an unexpected status still
/// yields its partial results, together with the reason it did not finish.
fn settle_search(
    result: Result<SearchResults>,
    partial: Option<SearchResults>,
) -> Result<(SearchResults, Option<VenteError>)> {
    match (result, partial) {
        (Ok(results), _) => Ok((results, None)),
        (Err(e @ (VenteError::Timeout { .. } | VenteError::Protocol(_))), Some(partial)) => {
            Ok((partial, Some(e)))
        }
        (Err(e), _) => Err(e),
    }
}

/// Point rejected Places requests at the API key.
fn with_key_hint(err: VenteError) -> VenteError {
    match err {
        VenteError::Upstream(msg) if msg.starts_with("HTTP 401") || msg.starts_with("HTTP 403") => {
            VenteError::Upstream(format!(
                "{}. Check the Google Maps API key and that the Places API is enabled for it.",
                msg
            ))
        }
        other => other,
    }
}

fn require_trip_duration(days: i64) -> Result<()> {
    if days <= 0 {
        return Err(VenteError::Validation(format!(
            "Trip duration must be a positive number of days, got {}",
            days
        )));
    }
    Ok(())
}

fn job_handle(job_id: &str) -> Result<JobHandle> {
    let id = job_id.trim();
    if id.is_empty() {
        return Err(VenteError::Validation("A job id must be provided".to_string()));
    }
    Ok(JobHandle::new(id))
}

/// Fetch both calendar directions concurrently and pair them.
pub async fn cheapest_window(
    calendar: &dyn CalendarService,
    origin_id: &str,
    destination_id: &str,
    trip_duration_days: i64,
) -> Result<CalendarMatch> {
    require_trip_duration(trip_duration_days)?;
    let (outbound, inbound) = tokio::try_join!(
        calendar.fetch_calendar(origin_id, destination_id),
        calendar.fetch_calendar(destination_id, origin_id),
    )?;

    let outbound = PriceMap::from_days(&outbound);
    let inbound = PriceMap::from_days(&inbound);
    debug!(
        outbound = outbound.len(),
        inbound = inbound.len(),
        "Built price maps"
    );
    find_cheapest_round_trip(&outbound, &inbound, trip_duration_days)
}

/// Submit a job and poll it until it is terminal.
pub async fn run_job<S>(
    service: &S,
    description: &S::Description,
    poller: &Poller,
    sink: &dyn ProgressSink,
) -> Result<S::Payload>
where
    S: JobService,
{
    let submission = service.submit(description).await?;
    sink.progress(&format!("Job submitted: {}", submission.handle));
    poller
        .run(service, &submission.handle, Some(submission.initial), sink)
        .await
        .into_result()
}

fn emit_videos(output: &VideoOutput, sink: &dyn ProgressSink) -> Result<()> {
    if output.urls.is_empty() {
        return Err(VenteError::Protocol(
            "Job completed but no video URL was found in the response".to_string(),
        ));
    }
    for message in output.video_messages() {
        sink.message(&message);
    }
    Ok(())
}

fn describe_status(
    handle: &JobHandle,
    status: JobStatus<VideoOutput>,
    sink: &dyn ProgressSink,
) -> Result<String> {
    match status {
        JobStatus::Succeeded(output) => {
            emit_videos(&output, sink)?;
            Ok(format!("Video has been generated for job {}", handle))
        }
        JobStatus::Pending { logs } => {
            let detail = logs
                .as_deref()
                .filter(|l| !l.trim().is_empty())
                .map(|l| format!(" ({})", logs_to_progress_message(l)))
                .unwrap_or_default();
            Ok(format!(
                "Video generation for job {} is still in progress{}. Please check again later.",
                handle, detail
            ))
        }
        JobStatus::Failed(reason) => Err(VenteError::Upstream(reason)),
        JobStatus::Unknown(raw) => Err(VenteError::Protocol(format!(
            "unrecognized status '{}'",
            raw
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    fn noun(&self) -> &'static str {
        match self {
            MediaKind::Image => "Image",
            MediaKind::Audio => "Track",
        }
    }

    fn message(&self, url: &str, index: usize) -> String {
        match self {
            MediaKind::Image => format!("![Generated image {}]({})", index, url),
            MediaKind::Audio => format!("<audio>\n{}\n</audio>", url),
        }
    }
}

/// Upload each generated item and emit it as a message.
///
/// Uploads run concurrently; lines and messages keep the upstream order.
/// Upload failures are reported per item and never fail the operation.
async fn publish_media(
    uploader: Option<&dyn AssetUploader>,
    response: &MediaResponse,
    kind: MediaKind,
    sink: &dyn ProgressSink,
) -> Vec<String> {
    let noun = kind.noun();
    let uploads = response.media.len();
    if uploader.is_some() && uploads > 0 {
        sink.progress(&format!("Uploading {} file(s)...", uploads));
    }

    let results: Vec<(String, Option<String>)> = stream::iter(0..response.media.len())
        .map(|idx| async move {
            let media = &response.media[idx];
            let index = idx + 1;
            if let Some(reason) = &media.rai_filtered_reason {
                return (format!("{} {} was filtered: {}", noun, index, reason), None);
            }
            let Some(data) = media.data.as_deref() else {
                return (format!("{} {} returned no data", noun, index), None);
            };
            let Some(uploader) = uploader else {
                return (
                    format!(
                        "{} {}: {} ({} base64 bytes, upload disabled)",
                        noun,
                        index,
                        media.mime_type,
                        data.len()
                    ),
                    None,
                );
            };
            match uploader.upload(data, &media.mime_type).await {
                Ok(asset) => (
                    format!("{} {}: {}", noun, index, asset.url),
                    Some(kind.message(&asset.url, index)),
                ),
                Err(e) => (format!("{} {}: upload failed: {}", noun, index, e), None),
            }
        })
        .buffered(MAX_CONCURRENT_UPLOADS)
        .collect()
        .await;

    results
        .into_iter()
        .map(|(line, message)| {
            if let Some(message) = message {
                sink.message(&message);
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flights::calendar::CalendarDay;
    use crate::jobs::Submission;
    use crate::media::{GeneratedMedia, StaticToken, UploadedAsset};
    use crate::poller::{PollConfig, ProgressEvent, RecordingSink, StatusLevel};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FakeCalendar {
        days: HashMap<(String, String), Vec<CalendarDay>>,
        calls: AtomicU32,
    }

    impl FakeCalendar {
        fn new(entries: Vec<(&str, &str, Vec<CalendarDay>)>) -> Self {
            Self {
                days: entries
                    .into_iter()
                    .map(|(o, d, days)| ((o.to_string(), d.to_string()), days))
                    .collect(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CalendarService for FakeCalendar {
        async fn fetch_calendar(
            &self,
            origin_id: &str,
            destination_id: &str,
        ) -> Result<Vec<CalendarDay>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.days
                .get(&(origin_id.to_string(), destination_id.to_string()))
                .cloned()
                .ok_or_else(|| VenteError::Upstream("HTTP 404: unknown route".to_string()))
        }
    }

    /// Accepts one job and replays a script of statuses for it.
    struct FakeJobs {
        initial: JobStatus<VideoOutput>,
        script: std::sync::Mutex<VecDeque<JobStatus<VideoOutput>>>,
        checks: AtomicU32,
    }

    impl FakeJobs {
        fn new(initial: JobStatus<VideoOutput>, script: Vec<JobStatus<VideoOutput>>) -> Self {
            Self {
                initial,
                script: std::sync::Mutex::new(script.into()),
                checks: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl StatusCheck for FakeJobs {
        type Payload = VideoOutput;

        async fn check_status(&self, _handle: &JobHandle) -> Result<JobStatus<VideoOutput>> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(JobStatus::pending))
        }
    }

    #[async_trait]
    impl JobService for FakeJobs {
        type Description = String;

        async fn submit(&self, _description: &String) -> Result<Submission<VideoOutput>> {
            Ok(Submission {
                handle: JobHandle::new("job-1"),
                initial: self.initial.clone(),
            })
        }

        async fn cancel(&self, _handle: &JobHandle) -> Result<()> {
            Ok(())
        }
    }

    struct FakeUploader {
        fail: bool,
    }

    #[async_trait]
    impl AssetUploader for FakeUploader {
        async fn upload(&self, _base64_data: &str, _mime_type: &str) -> Result<UploadedAsset> {
            if self.fail {
                return Err(VenteError::Upstream("HTTP 401: bad guid".to_string()));
            }
            Ok(UploadedAsset {
                id: "abc".to_string(),
                url: "https://assets.test/abc".to_string(),
            })
        }
    }

    fn video(url: &str) -> VideoOutput {
        VideoOutput {
            urls: vec![url.to_string()],
        }
    }

    fn search_request() -> FlightSearchRequest {
        FlightSearchRequest {
            origin: "Amsterdam".to_string(),
            destination: "Lisbon".to_string(),
            departure: "2025-06-01".to_string(),
            return_date: "2025-06-08".to_string(),
            adults: 1,
        }
    }

    #[test]
    fn test_flight_request_validation() {
        let (departure, return_date) = search_request().validate().unwrap();
        assert_eq!(departure, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(return_date, NaiveDate::from_ymd_opt(2025, 6, 8).unwrap());

        let same_day = FlightSearchRequest {
            return_date: "2025-06-01".to_string(),
            ..search_request()
        };
        assert!(same_day.validate().is_ok());

        for bad in [
            FlightSearchRequest {
                origin: "  ".to_string(),
                ..search_request()
            },
            FlightSearchRequest {
                departure: "01-06-2025".to_string(),
                ..search_request()
            },
            FlightSearchRequest {
                return_date: "2025-05-31".to_string(),
                ..search_request()
            },
            FlightSearchRequest {
                adults: 0,
                ..search_request()
            },
        ] {
            assert!(matches!(bad.validate(), Err(VenteError::Validation(_))));
        }
    }

    #[test]
    fn test_video_provider_from_str() {
        assert_eq!("Replicate".parse::<VideoProvider>().unwrap(), VideoProvider::Replicate);
        assert_eq!("veo".parse::<VideoProvider>().unwrap(), VideoProvider::Veo);
        assert!(matches!(
            "sora".parse::<VideoProvider>(),
            Err(VenteError::Validation(_))
        ));
        assert_eq!(VideoProvider::Veo.to_string(), "veo");
    }

    #[tokio::test]
    async fn test_cheapest_window_pairs_both_directions() {
        let calendar = FakeCalendar::new(vec![
            (
                "AMS",
                "LIS",
                vec![
                    CalendarDay::new("2024-12-20", Some(100.0)),
                    CalendarDay::new("2024-12-21", Some(80.0)),
                ],
            ),
            (
                "LIS",
                "AMS",
                vec![
                    CalendarDay::new("2024-12-27", Some(90.0)),
                    CalendarDay::new("2024-12-28", Some(70.0)),
                ],
            ),
        ]);

        let result = cheapest_window(&calendar, "AMS", "LIS", 7).await.unwrap();
        let CalendarMatch::Found(window) = result else {
            panic!("expected a window, got {:?}", result);
        };
        assert_eq!(window.outbound_date, NaiveDate::from_ymd_opt(2024, 12, 21).unwrap());
        assert_eq!(window.return_date, NaiveDate::from_ymd_opt(2024, 12, 28).unwrap());
        assert_eq!(window.total_price, 150.0);
        assert_eq!(calendar.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cheapest_window_rejects_duration_before_fetching() {
        let calendar = FakeCalendar::new(Vec::new());
        let result = cheapest_window(&calendar, "AMS", "LIS", 0).await;
        assert!(matches!(result, Err(VenteError::Validation(_))));
        assert_eq!(calendar.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cheapest_window_propagates_fetch_errors() {
        let calendar = FakeCalendar::new(vec![(
            "AMS",
            "LIS",
            vec![CalendarDay::new("2024-12-20", Some(100.0))],
        )]);
        let result = cheapest_window(&calendar, "AMS", "LIS", 7).await;
        assert!(matches!(result, Err(VenteError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_cheapest_window_without_prices() {
        let calendar = FakeCalendar::new(vec![
            ("AMS", "LIS", vec![CalendarDay::new("2024-12-20", None)]),
            ("LIS", "AMS", Vec::new()),
        ]);
        let result = cheapest_window(&calendar, "AMS", "LIS", 7).await.unwrap();
        assert_eq!(result, CalendarMatch::NoPricingData);
    }

    #[tokio::test]
    async fn test_run_job_resolves_on_submission() {
        let jobs = FakeJobs::new(JobStatus::Succeeded(video("https://v/1.mp4")), Vec::new());
        let poller = Poller::new(PollConfig::new(3, Duration::from_secs(10)));
        let sink = RecordingSink::new();

        let output = run_job(&jobs, &"prompt".to_string(), &poller, &sink)
            .await
            .unwrap();
        assert_eq!(output, video("https://v/1.mp4"));
        assert_eq!(jobs.checks.load(Ordering::SeqCst), 0);
        assert_eq!(sink.descriptions()[0], "Job submitted: job-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_job_polls_until_done() {
        let jobs = FakeJobs::new(
            JobStatus::pending(),
            vec![
                JobStatus::Pending {
                    logs: Some("Still generating".to_string()),
                },
                JobStatus::Succeeded(video("https://v/2.mp4")),
            ],
        );
        let poller = Poller::new(PollConfig::new(5, Duration::from_secs(10)));
        let sink = RecordingSink::new();

        let output = run_job(&jobs, &"prompt".to_string(), &poller, &sink)
            .await
            .unwrap();
        assert_eq!(output.urls, vec!["https://v/2.mp4"]);
        assert_eq!(jobs.checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_job_times_out() {
        let jobs = FakeJobs::new(JobStatus::pending(), Vec::new());
        let poller = Poller::new(PollConfig::new(3, Duration::from_secs(1)));

        let err = run_job(&jobs, &"prompt".to_string(), &poller, &RecordingSink::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VenteError::Timeout { attempts: 3, .. }));
    }

    #[test]
    fn test_describe_status() {
        let handle = JobHandle::new("pred-1");
        let sink = RecordingSink::new();

        let text = describe_status(&handle, JobStatus::Succeeded(video("https://v/3.mp4")), &sink)
            .unwrap();
        assert_eq!(text, "Video has been generated for job pred-1");
        assert_eq!(sink.messages(), vec!["<video>\nhttps://v/3.mp4\n</video>"]);

        let text = describe_status(
            &handle,
            JobStatus::Pending {
                logs: Some("50%".to_string()),
            },
            &sink,
        )
        .unwrap();
        assert!(text.contains("still in progress (Generating... 50%)"));

        assert!(matches!(
            describe_status(&handle, JobStatus::Failed("NSFW".into()), &sink),
            Err(VenteError::Upstream(reason)) if reason == "NSFW"
        ));
        assert!(matches!(
            describe_status(&handle, JobStatus::Unknown("paused".into()), &sink),
            Err(VenteError::Protocol(_))
        ));
        assert!(matches!(
            describe_status(&handle, JobStatus::Succeeded(VideoOutput { urls: vec![] }), &sink),
            Err(VenteError::Protocol(_))
        ));
    }

    #[test]
    fn test_job_handle_rejects_empty_ids() {
        let err = tokio_test::assert_err!(job_handle("  "));
        assert!(matches!(err, VenteError::Validation(_)));
        let handle = tokio_test::assert_ok!(job_handle(" abc "));
        assert_eq!(handle.as_str(), "abc");
    }

    fn media_response() -> MediaResponse {
        MediaResponse {
            model: "imagen-4.0-generate-preview-05-20".to_string(),
            media: vec![
                GeneratedMedia {
                    mime_type: "image/png".to_string(),
                    data: Some("aGVsbG8=".to_string()),
                    rai_filtered_reason: None,
                },
                GeneratedMedia {
                    mime_type: "image/png".to_string(),
                    data: None,
                    rai_filtered_reason: Some("Contains people".to_string()),
                },
            ],
            enhanced_prompt: None,
            model_display_name: None,
        }
    }

    #[tokio::test]
    async fn test_publish_media_uploads_and_emits() {
        let sink = RecordingSink::new();
        let uploader = FakeUploader { fail: false };
        let lines = publish_media(
            Some(&uploader as &dyn AssetUploader),
            &media_response(),
            MediaKind::Image,
            &sink,
        )
        .await;

        assert_eq!(
            lines,
            vec![
                "Image 1: https://assets.test/abc",
                "Image 2 was filtered: Contains people"
            ]
        );
        assert_eq!(sink.messages(), vec!["![Generated image 1](https://assets.test/abc)"]);
    }

    #[tokio::test]
    async fn test_publish_media_upload_failure_is_not_fatal() {
        let sink = RecordingSink::new();
        let uploader = FakeUploader { fail: true };
        let lines = publish_media(
            Some(&uploader as &dyn AssetUploader),
            &media_response(),
            MediaKind::Audio,
            &sink,
        )
        .await;

        assert!(lines[0].starts_with("Track 1: upload failed"));
        assert!(sink.messages().is_empty());

        let lines = publish_media(None, &media_response(), MediaKind::Audio, &sink).await;
        assert_eq!(lines[0], "Track 1: image/png (8 base64 bytes, upload disabled)");
    }

    fn partial_search(total: u64) -> SearchResults {
        SearchResults {
            total_results: total,
            itineraries: crate::flights::itinerary::parse_itineraries(
                &[serde_json::json!({"id": "a", "price": {"raw": 99.0}})],
                "https://x",
                "EUR",
            ),
        }
    }

    #[test]
    fn test_timed_out_search_keeps_partial_results() {
        let timeout = VenteError::Timeout {
            attempts: 12,
            last_status: "processing".to_string(),
        };
        let (results, stopped) =
            settle_search(Err(timeout), Some(partial_search(40))).unwrap();
        assert_eq!(results.total_results, 40);
        assert!(matches!(
            stopped,
            Some(VenteError::Timeout { attempts: 12, .. })
        ));

        let odd = VenteError::Protocol("Unexpected status 'throttled'".to_string());
        let (_, stopped) = settle_search(Err(odd), Some(partial_search(3))).unwrap();
        assert!(matches!(stopped, Some(VenteError::Protocol(_))));
    }

    #[test]
    fn test_settle_search_without_partial_results() {
        let (results, stopped) =
            settle_search(Ok(partial_search(1)), Some(partial_search(9))).unwrap();
        assert_eq!(results.total_results, 1);
        assert!(stopped.is_none());

        let timeout = VenteError::Timeout {
            attempts: 2,
            last_status: "pending".to_string(),
        };
        assert!(matches!(
            settle_search(Err(timeout), None),
            Err(VenteError::Timeout { attempts: 2, .. })
        ));

        let upstream = VenteError::Upstream("HTTP 500: down".to_string());
        assert!(matches!(
            settle_search(Err(upstream), Some(partial_search(4))),
            Err(VenteError::Upstream(_))
        ));
    }

    #[test]
    fn test_rejected_places_key_gets_a_hint() {
        let err = with_key_hint(VenteError::Upstream("HTTP 403: API key not valid".into()));
        assert!(err.to_string().contains("Check the Google Maps API key"));

        let err = with_key_hint(VenteError::Upstream("HTTP 500: down".into()));
        assert!(!err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn test_search_places_validates_before_calling() {
        let orchestrator = Orchestrator::new(Settings::default()).unwrap();
        let sink = RecordingSink::new();
        let mut request = PlaceSearchRequest::new("museums in Leiden");
        request.max_results = 0;

        let result = orchestrator.search_places(&request, &sink).await;
        assert!(matches!(result, Err(VenteError::Validation(_))));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ProgressEvent::Status {
                status: StatusLevel::Error,
                done: true,
                ..
            }
        ));
    }

    #[test]
    fn test_finish_emits_terminal_event() {
        let sink = RecordingSink::new();
        let result = finish(&sink, Err(VenteError::Validation("bad".into())), "done");
        assert!(result.is_err());
        assert_eq!(
            sink.events(),
            vec![ProgressEvent::Status {
                status: StatusLevel::Error,
                description: "Error: Invalid input: bad".to_string(),
                done: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_orchestrator_with_components() {
        let mut settings = Settings::default();
        settings.flights.citation = false;
        let calendar = Arc::new(FakeCalendar::new(Vec::new()));
        let orchestrator = Orchestrator::with_components(
            settings,
            calendar,
            Session::new(Box::new(StaticToken::new("token"))),
            None,
        )
        .unwrap();

        assert_eq!(orchestrator.token_source().await, "static access token");
        assert!(!orchestrator.uploads_enabled());
        assert!(orchestrator.list_models().contains("lyria-002 (DEFAULT)"));

        let sink = RecordingSink::new();
        let result = orchestrator.cheapest_round_trip("AMS", "LIS", -3, &sink).await;
        assert!(matches!(result, Err(VenteError::Validation(_))));
    }
}
