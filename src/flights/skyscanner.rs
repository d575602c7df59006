//! Skyscanner web API client: place lookup, unified search, price calendar.

use super::calendar::{parse_calendar_days, CalendarDay, CalendarService};
use super::itinerary::{parse_itineraries, Itinerary};
use crate::config::{FlightSettings, HttpSettings};
use crate::error::{Result, VenteError};
use crate::http::{create_client_with_timeout, read_json};
use crate::jobs::Submission;
use crate::poller::{JobHandle, JobStatus, StatusCheck};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Mutex;
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

/// A resolved airport or city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceDetails {
    /// Entity id used by the unified search.
    pub geo_id: String,
    /// IATA code or place id, used by the price calendar and in URLs.
    pub sky_id: String,
    pub name: String,
    /// Containing city, used as the place of stay.
    pub city_geo_id: String,
}

impl PlaceDetails {
    /// Take the first autosuggest hit.
    pub fn from_autosuggest(results: &Value, query: &str) -> Result<Self> {
        let first = results
            .as_array()
            .and_then(|r| r.first())
            .ok_or_else(|| {
                VenteError::Upstream(format!("No place details found for '{}'", query))
            })?;

        let field = |key: &str| {
            first
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let geo_id = field("GeoId");
        let sky_id = field("IataCode").or_else(|| field("PlaceId"));
        let (Some(geo_id), Some(sky_id)) = (geo_id, sky_id) else {
            return Err(VenteError::Protocol(format!(
                "Could not extract GeoId or IATA-equivalent id for '{}'",
                query
            )));
        };

        Ok(Self {
            city_geo_id: field("GeoContainerId").unwrap_or_else(|| geo_id.clone()),
            name: field("PlaceName").unwrap_or_else(|| query.to_string()),
            geo_id,
            sky_id,
        })
    }
}

/// A round trip to search for.
#[derive(Debug, Clone)]
pub struct RoundTripQuery {
    pub origin: PlaceDetails,
    pub destination: PlaceDetails,
    pub departure: NaiveDate,
    pub return_date: NaiveDate,
    pub adults: u32,
}

/// Payload of a completed search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    /// Total reported by the upstream, which may exceed `itineraries.len()`.
    pub total_results: u64,
    pub itineraries: Vec<Itinerary>,
}

/// One unified-search response, classified.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    /// Session id to use for the next poll, if the response carried one.
    pub session_id: Option<String>,
    /// `complete` is success, `incomplete` pending, anything else unknown.
    pub status: JobStatus<SearchResults>,
    /// Itineraries already received by a search that has not completed.
    pub partial: Option<SearchResults>,
}

/// Classify one unified-search response.
pub fn classify_search_response(body: &Value, base_url: &str, currency: &str) -> SearchResponse {
    let context = body.get("context");
    let session_id = context
        .and_then(|c| c.get("sessionId"))
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let status = context
        .and_then(|c| c.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");

    let itineraries = body.get("itineraries");
    let raw = itineraries
        .and_then(|i| i.get("results"))
        .and_then(|r| r.as_array());
    let results = SearchResults {
        total_results: itineraries
            .and_then(|i| i.get("context"))
            .and_then(|c| c.get("totalResults"))
            .and_then(|t| t.as_u64())
            .unwrap_or_else(|| raw.map_or(0, |r| r.len() as u64)),
        itineraries: raw
            .map(|r| parse_itineraries(r, base_url, currency))
            .unwrap_or_default(),
    };

    let (status, partial) = match status {
        "complete" => (JobStatus::Succeeded(results), None),
        "incomplete" => (
            JobStatus::Pending {
                logs: Some(format!("Results so far: {}", results.total_results)),
            },
            Some(results),
        ),
        other => (JobStatus::Unknown(other.to_string()), Some(results)),
    };

    SearchResponse {
        session_id,
        status,
        partial: partial.filter(|r| !r.itineraries.is_empty()),
    }
}

/// Skyscanner client.
pub struct SkyscannerClient {
    client: reqwest::Client,
    settings: FlightSettings,
}

impl SkyscannerClient {
    pub fn new(settings: FlightSettings, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(&http.user_agent, http.timeout())?,
            settings,
        })
    }

    pub fn settings(&self) -> &FlightSettings {
        &self.settings
    }

    fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    /// Public page for a route, used for citations.
    pub fn route_url(&self, origin: &PlaceDetails, destination: &PlaceDetails) -> String {
        format!(
            "{}/transport/vluchten/{}/{}/",
            self.base_url(),
            origin.sky_id.to_lowercase(),
            destination.sky_id.to_lowercase()
        )
    }

    /// Public results page for a concrete round trip.
    pub fn search_page_url(&self, query: &RoundTripQuery) -> String {
        format!(
            "{}{}/{}/?adultsv2={}&cabinclass=economy&childrenv2=&ref=home&rtn=1\
             &preferdirects=false&outboundaltsenabled=false&inboundaltsenabled=false",
            self.route_url(&query.origin, &query.destination),
            query.departure.format("%y%m%d"),
            query.return_date.format("%y%m%d"),
            query.adults
        )
    }

    /// Resolve a free-text place name.
    #[instrument(skip(self))]
    pub async fn place_details(&self, query: &str, is_destination: bool) -> Result<PlaceDetails> {
        let mut url = Url::parse(self.base_url())
            .map_err(|e| VenteError::Config(format!("Invalid flights base_url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| VenteError::Config("flights base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([
                "g",
                "autosuggest-search",
                "api",
                "v1",
                "search-flight",
                self.settings.market.as_str(),
                self.settings.locale.as_str(),
                query,
            ]);
        url.query_pairs_mut()
            .append_pair("isDestination", if is_destination { "true" } else { "false" })
            .append_pair("enable_general_search_v2", "true")
            .append_pair("autosuggestExp", "");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let results = read_json(response).await?;

        let place = PlaceDetails::from_autosuggest(&results, query)?;
        debug!(geo_id = %place.geo_id, sky_id = %place.sky_id, "Resolved place '{}'", query);
        Ok(place)
    }

    /// Start a unified search.
    ///
    /// Returns the poll capability for the new session together with the
    /// handle and the status of the first response.
    #[instrument(skip(self, query), fields(origin = %query.origin.sky_id, destination = %query.destination.sky_id))]
    pub async fn start_search(
        &self,
        query: &RoundTripQuery,
    ) -> Result<(SearchSession, Submission<SearchResults>)> {
        let headers = self.search_headers(&self.search_page_url(query))?;
        let search_url = format!("{}/g/radar/api/v2/web-unified-search/", self.base_url());

        let response = self
            .client
            .post(&search_url)
            .headers(headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&search_payload(query))
            .send()
            .await?;
        let body = read_json(response).await?;

        let SearchResponse {
            session_id,
            status: initial,
            partial,
        } = classify_search_response(&body, self.base_url(), &self.settings.currency);
        let session_id = session_id.ok_or_else(|| {
            VenteError::Protocol("Missing sessionId in initial search response".to_string())
        })?;
        info!(session = %session_id, status = %initial.label(), "Flight search started");

        let session = SearchSession {
            client: self.client.clone(),
            headers,
            search_url,
            base_url: self.base_url().to_string(),
            currency: self.settings.currency.clone(),
            session_id: Mutex::new(session_id.clone()),
            partial: Mutex::new(None),
        };
        session.record_partial(partial);
        Ok((
            session,
            Submission {
                handle: JobHandle::new(session_id),
                initial,
            },
        ))
    }

    fn search_headers(&self, referer: &str) -> Result<HeaderMap> {
        let view_id = Uuid::new_v4().to_string();
        let traveller_context = Uuid::new_v4().to_string();
        let host = Url::parse(self.base_url())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let pairs = [
            ("accept", "application/json"),
            ("accept-language", "nl,en-US;q=0.7,en;q=0.3"),
            ("x-skyscanner-channelid", "website"),
            ("x-skyscanner-consent-adverts", "true"),
            ("x-skyscanner-traveller-context", traveller_context.as_str()),
            ("x-skyscanner-viewid", view_id.as_str()),
            ("x-skyscanner-ads-sponsored-view-type", "ADS_SPONSORED_VIEW_DAY_VIEW"),
            ("x-skyscanner-combined-results-rail", "true"),
            ("x-skyscanner-market", self.settings.market.as_str()),
            ("x-skyscanner-locale", self.settings.locale.as_str()),
            ("x-skyscanner-currency", self.settings.currency.as_str()),
            ("x-skyscanner-trustedfunnelid", view_id.as_str()),
            ("alt-used", host.as_str()),
            ("sec-fetch-dest", "empty"),
            ("sec-fetch-mode", "cors"),
            ("sec-fetch-site", "same-origin"),
            ("referer", referer),
        ];

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let value = HeaderValue::from_str(value).map_err(|_| {
                VenteError::Config(format!("Invalid value for header '{}'", name))
            })?;
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl CalendarService for SkyscannerClient {
    #[instrument(skip(self))]
    async fn fetch_calendar(
        &self,
        origin_id: &str,
        destination_id: &str,
    ) -> Result<Vec<CalendarDay>> {
        let payload = json!({
            "headers": {
                "xSkyscannerClient": "banana",
                "xSkyscannerCurrency": self.settings.currency,
                "xSkyscannerLocale": self.settings.locale,
                "xSkyscannerMarket": self.settings.market,
            },
            "originRelevantFlightSkyId": origin_id,
            "destinationRelevantFlightSkyId": destination_id,
        });

        let response = self
            .client
            .post(format!("{}/g/search-intent/v1/pricecalendar", self.base_url()))
            .header("Accept", "*/*")
            .header("Referer", self.base_url())
            .json(&payload)
            .send()
            .await?;
        let body = read_json(response).await?;

        let days = parse_calendar_days(&body);
        debug!("Fetched {} calendar days", days.len());
        Ok(days)
    }
}

/// Poll capability for one unified-search session.
///
/// Every poll response carries the session id to use for the next poll;
/// the current one is held here so the [`JobHandle`] stays immutable. The
/// most recent non-empty set of itineraries from an unfinished search is
/// kept too, for callers that settle for partial results.
pub struct SearchSession {
    client: reqwest::Client,
    headers: HeaderMap,
    search_url: String,
    base_url: String,
    currency: String,
    session_id: Mutex<String>,
    partial: Mutex<Option<SearchResults>>,
}

impl SearchSession {
    /// Itineraries received before the search stopped short of completing.
    pub fn partial_results(&self) -> Option<SearchResults> {
        self.partial.lock().ok().and_then(|p| p.clone())
    }

    fn record_partial(&self, partial: Option<SearchResults>) {
        if let (Some(results), Ok(mut held)) = (partial, self.partial.lock()) {
            debug!(received = results.itineraries.len(), "Holding partial results");
            *held = Some(results);
        }
    }

    fn current_session(&self, handle: &JobHandle) -> String {
        self.session_id
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| handle.as_str().to_string())
    }
}

#[async_trait]
impl StatusCheck for SearchSession {
    type Payload = SearchResults;

    async fn check_status(&self, handle: &JobHandle) -> Result<JobStatus<SearchResults>> {
        let session = self.current_session(handle);
        let response = self
            .client
            .get(format!("{}{}", self.search_url, session))
            .headers(self.headers.clone())
            .send()
            .await?;
        let body = read_json(response).await?;

        let SearchResponse {
            session_id: next_session,
            status,
            partial,
        } = classify_search_response(&body, &self.base_url, &self.currency);
        self.record_partial(partial);
        match next_session {
            Some(next) => {
                if let Ok(mut current) = self.session_id.lock() {
                    *current = next;
                }
            }
            None if !status.is_terminal() => {
                return Err(VenteError::Protocol(
                    "Session id missing in polling response".to_string(),
                ));
            }
            None => {}
        }
        Ok(status)
    }
}

fn api_date(date: NaiveDate) -> Value {
    json!({
        "@type": "date",
        "year": format!("{:04}", date.year()),
        "month": format!("{:02}", date.month()),
        "day": format!("{:02}", date.day()),
    })
}

fn search_payload(query: &RoundTripQuery) -> Value {
    json!({
        "cabinClass": "ECONOMY",
        "childAges": [],
        "adults": query.adults,
        "legs": [
            {
                "legOrigin": {"@type": "entity", "entityId": query.origin.geo_id},
                "legDestination": {"@type": "entity", "entityId": query.destination.geo_id},
                "dates": api_date(query.departure),
                "placeOfStay": query.destination.city_geo_id,
            },
            {
                "legOrigin": {"@type": "entity", "entityId": query.destination.geo_id},
                "legDestination": {"@type": "entity", "entityId": query.origin.geo_id},
                "dates": api_date(query.return_date),
            }
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(geo: &str, sky: &str, name: &str) -> PlaceDetails {
        PlaceDetails {
            geo_id: geo.to_string(),
            sky_id: sky.to_string(),
            name: name.to_string(),
            city_geo_id: geo.to_string(),
        }
    }

    fn query() -> RoundTripQuery {
        RoundTripQuery {
            origin: place("95565050", "AMS", "Amsterdam Schiphol"),
            destination: place("95565058", "LHR", "London Heathrow"),
            departure: NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
            return_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            adults: 2,
        }
    }

    fn client() -> SkyscannerClient {
        SkyscannerClient::new(FlightSettings::default(), &HttpSettings::default()).unwrap()
    }

    #[test]
    fn test_place_from_autosuggest() {
        let results = json!([
            {"GeoId": "27536561", "PlaceId": "LOND", "PlaceName": "Londen", "GeoContainerId": ""},
            {"GeoId": "other"}
        ]);
        let place = PlaceDetails::from_autosuggest(&results, "london").unwrap();
        assert_eq!(place.geo_id, "27536561");
        assert_eq!(place.sky_id, "LOND");
        assert_eq!(place.name, "Londen");
        assert_eq!(place.city_geo_id, "27536561");

        let results = json!([{"GeoId": "1", "IataCode": "AMS", "PlaceId": "x", "GeoContainerId": "9"}]);
        let place = PlaceDetails::from_autosuggest(&results, "ams").unwrap();
        assert_eq!(place.sky_id, "AMS");
        assert_eq!(place.city_geo_id, "9");
        assert_eq!(place.name, "ams");
    }

    #[test]
    fn test_place_errors() {
        assert!(matches!(
            PlaceDetails::from_autosuggest(&json!([]), "nowhere"),
            Err(VenteError::Upstream(_))
        ));
        assert!(matches!(
            PlaceDetails::from_autosuggest(&json!([{"PlaceName": "x"}]), "x"),
            Err(VenteError::Protocol(_))
        ));
    }

    #[test]
    fn test_classify_search_statuses() {
        let pending = json!({
            "context": {"sessionId": "s2", "status": "incomplete"},
            "itineraries": {"context": {"totalResults": 12}, "results": []}
        });
        let response = classify_search_response(&pending, "https://x", "EUR");
        assert_eq!(response.session_id.as_deref(), Some("s2"));
        assert_eq!(
            response.status,
            JobStatus::Pending {
                logs: Some("Results so far: 12".to_string())
            }
        );
        assert!(response.partial.is_none());

        let complete = json!({
            "context": {"sessionId": "s3", "status": "complete"},
            "itineraries": {"results": [{"id": "a", "price": {"raw": 10.0}}]}
        });
        let response = classify_search_response(&complete, "https://x", "EUR");
        assert!(response.partial.is_none());
        match response.status {
            JobStatus::Succeeded(results) => {
                assert_eq!(results.total_results, 1);
                assert_eq!(results.itineraries[0].price_key(), 10.0);
            }
            other => panic!("expected success, got {:?}", other),
        }

        let odd = json!({"context": {"status": "throttled"}});
        let response = classify_search_response(&odd, "https://x", "EUR");
        assert!(response.session_id.is_none());
        assert_eq!(response.status, JobStatus::Unknown("throttled".to_string()));
    }

    #[test]
    fn test_unfinished_search_keeps_received_itineraries() {
        let body = json!({
            "context": {"sessionId": "s4", "status": "incomplete"},
            "itineraries": {
                "context": {"totalResults": 30},
                "results": [
                    {"id": "a", "price": {"raw": 120.0}},
                    {"id": "b", "price": {"raw": 95.0}}
                ]
            }
        });
        let response = classify_search_response(&body, "https://x", "EUR");
        assert!(!response.status.is_terminal());
        let partial = response.partial.unwrap();
        assert_eq!(partial.total_results, 30);
        assert_eq!(partial.itineraries.len(), 2);
        assert_eq!(partial.itineraries[1].price_key(), 95.0);

        let body = json!({
            "context": {"status": "failed"},
            "itineraries": {"results": [{"id": "c", "price": {"raw": 80.0}}]}
        });
        let response = classify_search_response(&body, "https://x", "EUR");
        assert_eq!(response.status, JobStatus::Unknown("failed".to_string()));
        assert_eq!(response.partial.unwrap().itineraries.len(), 1);
    }

    #[test]
    fn test_session_holds_latest_partial_results() {
        let session = SearchSession {
            client: reqwest::Client::new(),
            headers: HeaderMap::new(),
            search_url: "https://x/search/".to_string(),
            base_url: "https://x".to_string(),
            currency: "EUR".to_string(),
            session_id: Mutex::new("s1".to_string()),
            partial: Mutex::new(None),
        };
        assert!(session.partial_results().is_none());

        let first = SearchResults {
            total_results: 5,
            itineraries: parse_itineraries(&[json!({"id": "a"})], "https://x", "EUR"),
        };
        session.record_partial(Some(first.clone()));
        session.record_partial(None);
        assert_eq!(session.partial_results(), Some(first));
    }

    #[test]
    fn test_search_payload_dates() {
        let payload = search_payload(&query());
        assert_eq!(payload["adults"], 2);
        assert_eq!(payload["legs"][0]["dates"]["month"], "12");
        assert_eq!(payload["legs"][1]["dates"]["day"], "05");
        assert_eq!(payload["legs"][1]["legOrigin"]["entityId"], "95565058");
        assert_eq!(payload["legs"][0]["placeOfStay"], "95565058");
    }

    #[test]
    fn test_page_urls() {
        let client = client();
        let url = client.search_page_url(&query());
        assert!(url.starts_with("https://www.skyscanner.nl/transport/vluchten/ams/lhr/241220/250105/?adultsv2=2"));
        assert!(url.contains("&rtn=1&preferdirects=false"));
    }

    #[test]
    fn test_search_headers() {
        let headers = client().search_headers("https://www.skyscanner.nl/x").unwrap();
        assert_eq!(headers["x-skyscanner-market"], "NL");
        assert_eq!(headers["alt-used"], "www.skyscanner.nl");
        assert_eq!(
            headers["x-skyscanner-viewid"],
            headers["x-skyscanner-trustedfunnelid"]
        );
    }
}
