//! Google Maps place suggestions (Places API text search).

use crate::config::{HttpSettings, PlacesSettings};
use crate::error::{Result, VenteError};
use crate::http::{create_client_with_timeout, read_json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

/// Fields requested from the text search.
pub const FIELD_MASK: &str = "places.displayName,places.formattedAddress,\
places.primaryTypeDisplayName,places.googleMapsUri,places.reviews,places.businessStatus,\
places.priceRange,places.rating,places.websiteUri,places.internationalPhoneNumber,places.photos";

const PHOTO_URL: &str = "https://maps.googleapis.com/maps/api/place/photo";
const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/";

/// Parameters for one place search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceSearchRequest {
    pub query: String,
    /// Places to return, 1 to 20.
    pub max_results: u32,
    /// Reviews shown per place, 0 to 5.
    pub max_reviews_per_place: usize,
    /// Overrides the configured photo width.
    pub max_photo_width: Option<u32>,
}

impl Default for PlaceSearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_results: 3,
            max_reviews_per_place: 5,
            max_photo_width: None,
        }
    }
}

impl PlaceSearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(VenteError::Validation(
                "A search query is required".to_string(),
            ));
        }
        if !(1..=20).contains(&self.max_results) {
            return Err(VenteError::Validation(format!(
                "Invalid max_results value: {}. Must be between 1 and 20.",
                self.max_results
            )));
        }
        if self.max_reviews_per_place > 5 {
            return Err(VenteError::Validation(format!(
                "Invalid max_reviews_per_place value: {}. Must be between 0 and 5.",
                self.max_reviews_per_place
            )));
        }
        if self.max_photo_width == Some(0) {
            return Err(VenteError::Validation(
                "max_photo_width must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub author: String,
    pub rating: Option<f64>,
    pub text: String,
}

/// One suggested place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSuggestion {
    pub name: String,
    pub address: Option<String>,
    pub primary_type: Option<String>,
    pub rating: Option<f64>,
    pub business_status: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    /// Google Maps page, or a search URL built from name and address.
    pub maps_uri: String,
    pub photo_url: Option<String>,
    /// `1 - 3 EUR`, or just the start price when there is no upper bound.
    pub price_range: Option<String>,
    pub reviews: Vec<Review>,
}

fn text_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn maps_search_url(name: &str, address: Option<&str>) -> String {
    let query = match address {
        Some(address) => format!("{} {}", name, address),
        None => name.to_string(),
    };
    Url::parse_with_params(MAPS_SEARCH_URL, [("api", "1"), ("query", query.as_str())])
        .map(String::from)
        .unwrap_or_else(|_| MAPS_SEARCH_URL.to_string())
}

/// Photo URL for the first photo of a place.
///
/// Photo resources are named `places/{id}/photos/{reference}`; only the
/// reference goes into the URL.
fn photo_url(place: &Value, api_key: &str, max_width: u32) -> Option<String> {
    let name = text_at(place, "/photos/0/name")?;
    let reference = name.rsplit('/').next().unwrap_or(name);
    let width = max_width.to_string();
    Url::parse_with_params(
        PHOTO_URL,
        [
            ("maxwidth", width.as_str()),
            ("photoreference", reference),
            ("key", api_key),
        ],
    )
    .ok()
    .map(String::from)
}

fn price_range(place: &Value) -> Option<String> {
    let units = |bound: &str| {
        place
            .pointer(&format!("/priceRange/{}/units", bound))
            .and_then(|u| match u {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    };
    let currency = text_at(place, "/priceRange/startPrice/currencyCode")?;
    match (units("startPrice")?, units("endPrice")) {
        (start, Some(end)) => Some(format!("{} - {} {}", start, end, currency)),
        (start, None) => Some(format!("{} {}", start, currency)),
    }
}

fn parse_review(review: &Value) -> Review {
    Review {
        author: text_at(review, "/authorAttribution/displayName")
            .unwrap_or("Anonymous")
            .to_string(),
        rating: review.get("rating").and_then(|r| r.as_f64()),
        text: text_at(review, "/originalText/text")
            .or_else(|| text_at(review, "/text/text"))
            .unwrap_or("No review text.")
            .to_string(),
    }
}

/// Turn a text-search response into suggestions, in the order returned.
pub fn parse_places(
    body: &Value,
    api_key: &str,
    max_photo_width: u32,
    max_reviews: usize,
) -> Vec<PlaceSuggestion> {
    let Some(places) = body.get("places").and_then(|p| p.as_array()) else {
        return Vec::new();
    };

    places
        .iter()
        .map(|place| {
            let name = text_at(place, "/displayName/text").unwrap_or("N/A").to_string();
            let address = text_at(place, "/formattedAddress").map(str::to_string);
            let maps_uri = text_at(place, "/googleMapsUri")
                .map(str::to_string)
                .unwrap_or_else(|| maps_search_url(&name, address.as_deref()));

            PlaceSuggestion {
                primary_type: text_at(place, "/primaryTypeDisplayName/text").map(str::to_string),
                rating: place.get("rating").and_then(|r| r.as_f64()),
                business_status: text_at(place, "/businessStatus").map(str::to_string),
                phone: text_at(place, "/internationalPhoneNumber").map(str::to_string),
                website: text_at(place, "/websiteUri").map(str::to_string),
                photo_url: photo_url(place, api_key, max_photo_width),
                price_range: price_range(place),
                reviews: place
                    .get("reviews")
                    .and_then(|r| r.as_array())
                    .map(|r| r.iter().take(max_reviews).map(parse_review).collect())
                    .unwrap_or_default(),
                name,
                address,
                maps_uri,
            }
        })
        .collect()
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

fn format_rating(rating: Option<f64>) -> String {
    rating.map_or_else(|| "N/A".to_string(), |r| r.to_string())
}

/// Markdown section for one place, numbered from 1.
pub fn format_place(place: &PlaceSuggestion, index: usize) -> String {
    let mut lines = vec![format!("## {}. {}", index, place.name)];
    if let Some(photo) = &place.photo_url {
        lines.push(format!("![Photo of {}]({})", place.name, photo));
        lines.push(String::new());
    }

    lines.push(format!("- **Type**: {}", or_na(place.primary_type.as_deref())));
    lines.push(format!("- **Address**: {}", or_na(place.address.as_deref())));
    lines.push(format!("- **Rating**: {} ⭐", format_rating(place.rating)));
    lines.push(format!("- **Status**: {}", or_na(place.business_status.as_deref())));
    lines.push(format!("- **Phone**: {}", or_na(place.phone.as_deref())));
    if let Some(website) = &place.website {
        lines.push(format!("- **Website**: [{0}]({0})", website));
    }
    lines.push(format!("- **Google Maps**: [{0}]({0})", place.maps_uri));
    if let Some(range) = &place.price_range {
        lines.push(format!("- **Price Range**: {}", range));
    }

    if !place.reviews.is_empty() {
        lines.push("- **Reviews**:".to_string());
        for (idx, review) in place.reviews.iter().enumerate() {
            lines.push(format!(
                "  - **{}. {}** ({} ⭐):",
                idx + 1,
                review.author,
                format_rating(review.rating)
            ));
            lines.extend(review.text.lines().map(|line| format!("    > {}", line)));
            lines.push(String::new());
        }
    }

    lines.push(String::new());
    lines.push("---".to_string());
    lines.join("\n")
}

/// Heading for the full suggestion list.
pub fn format_heading(query: &str) -> String {
    format!("# Place Suggestions for \"{}\"", query)
}

/// Client for the Places text search.
pub struct PlacesClient {
    client: reqwest::Client,
    settings: PlacesSettings,
    api_key: String,
}

impl PlacesClient {
    pub fn new(settings: PlacesSettings, http: &HttpSettings) -> Result<Self> {
        let api_key = settings.resolved_key().ok_or_else(|| {
            VenteError::Config(
                "No Google Maps API key. Set places.api_key or GOOGLE_MAPS_API_KEY.".to_string(),
            )
        })?;
        Ok(Self {
            client: create_client_with_timeout(&http.user_agent, http.timeout())?,
            settings,
            api_key,
        })
    }

    pub fn settings(&self) -> &PlacesSettings {
        &self.settings
    }

    /// Run a text search and parse the places it returns.
    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn search_text(&self, request: &PlaceSearchRequest) -> Result<Vec<PlaceSuggestion>> {
        request.validate()?;

        let response = self
            .client
            .post(format!(
                "{}/places:searchText",
                self.settings.base_url.trim_end_matches('/')
            ))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&json!({
                "textQuery": request.query.trim(),
                "pageSize": request.max_results,
            }))
            .send()
            .await?;
        let body = read_json(response).await?;

        let places = parse_places(
            &body,
            &self.api_key,
            request.max_photo_width.unwrap_or(self.settings.max_photo_width),
            request.max_reviews_per_place,
        );
        debug!("Found {} places", places.len());
        Ok(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> Value {
        json!({
            "places": [
                {
                    "displayName": {"text": "Café Loetje", "languageCode": "nl"},
                    "formattedAddress": "Johannes Vermeerstraat 52, Amsterdam",
                    "primaryTypeDisplayName": {"text": "Restaurant"},
                    "googleMapsUri": "https://maps.google.com/?cid=123",
                    "rating": 4.4,
                    "businessStatus": "OPERATIONAL",
                    "internationalPhoneNumber": "+31 20 662 8173",
                    "websiteUri": "https://loetje.nl/",
                    "priceRange": {
                        "startPrice": {"currencyCode": "EUR", "units": "20"},
                        "endPrice": {"currencyCode": "EUR", "units": "30"}
                    },
                    "photos": [{"name": "places/abc/photos/PHOTO_REF"}],
                    "reviews": [
                        {
                            "rating": 5,
                            "authorAttribution": {"displayName": "Anna"},
                            "originalText": {"text": "Best steak.\nFriendly staff."},
                            "text": {"text": "Translated"}
                        },
                        {"rating": 3, "text": {"text": "Busy"}}
                    ]
                },
                {
                    "displayName": {"text": "Bar & Co"},
                    "formattedAddress": "Main St 1"
                }
            ]
        })
    }

    #[test]
    fn test_parse_places() {
        let places = parse_places(&sample_response(), "KEY", 400, 5);
        assert_eq!(places.len(), 2);

        let cafe = &places[0];
        assert_eq!(cafe.name, "Café Loetje");
        assert_eq!(cafe.rating, Some(4.4));
        assert_eq!(cafe.maps_uri, "https://maps.google.com/?cid=123");
        assert_eq!(cafe.price_range.as_deref(), Some("20 - 30 EUR"));
        assert_eq!(
            cafe.photo_url.as_deref(),
            Some(
                "https://maps.googleapis.com/maps/api/place/photo\
                 ?maxwidth=400&photoreference=PHOTO_REF&key=KEY"
            )
        );
        assert_eq!(cafe.reviews.len(), 2);
        assert_eq!(cafe.reviews[0].author, "Anna");
        assert_eq!(cafe.reviews[0].text, "Best steak.\nFriendly staff.");
        assert_eq!(cafe.reviews[1].author, "Anonymous");
        assert_eq!(cafe.reviews[1].text, "Busy");

        let bar = &places[1];
        assert!(bar.photo_url.is_none());
        assert!(bar.rating.is_none());
        assert!(bar.reviews.is_empty());
        assert_eq!(
            bar.maps_uri,
            "https://www.google.com/maps/search/?api=1&query=Bar+%26+Co+Main+St+1"
        );
    }

    #[test]
    fn test_parse_places_limits_reviews() {
        let places = parse_places(&sample_response(), "KEY", 400, 1);
        assert_eq!(places[0].reviews.len(), 1);

        let places = parse_places(&sample_response(), "KEY", 400, 0);
        assert!(places[0].reviews.is_empty());

        assert!(parse_places(&json!({}), "KEY", 400, 5).is_empty());
    }

    #[test]
    fn test_price_range_without_upper_bound() {
        let place = json!({"priceRange": {"startPrice": {"currencyCode": "USD", "units": 10}}});
        assert_eq!(price_range(&place).as_deref(), Some("10 USD"));
        assert!(price_range(&json!({"priceRange": {}})).is_none());
    }

    #[test]
    fn test_format_place() {
        let places = parse_places(&sample_response(), "KEY", 400, 5);

        let text = format_place(&places[0], 1);
        assert!(text.starts_with("## 1. Café Loetje\n![Photo of Café Loetje](https://"));
        assert!(text.contains("- **Rating**: 4.4 ⭐"));
        assert!(text.contains("- **Website**: [https://loetje.nl/](https://loetje.nl/)"));
        assert!(text.contains("- **Price Range**: 20 - 30 EUR"));
        assert!(text.contains("  - **1. Anna** (5 ⭐):\n    > Best steak.\n    > Friendly staff."));
        assert!(text.ends_with("---"));

        let text = format_place(&places[1], 2);
        assert!(text.contains("- **Type**: N/A"));
        assert!(text.contains("- **Rating**: N/A ⭐"));
        assert!(!text.contains("Website"));
        assert!(!text.contains("Reviews"));
    }

    #[test]
    fn test_request_validation() {
        assert!(PlaceSearchRequest::new("pizza in Utrecht").validate().is_ok());
        assert!(PlaceSearchRequest::new("  ").validate().is_err());

        let mut request = PlaceSearchRequest::new("pizza");
        request.max_results = 21;
        assert!(matches!(request.validate(), Err(VenteError::Validation(_))));

        let mut request = PlaceSearchRequest::new("pizza");
        request.max_reviews_per_place = 6;
        assert!(matches!(request.validate(), Err(VenteError::Validation(_))));
    }

    #[test]
    fn test_client_with_configured_key() {
        let settings = PlacesSettings {
            api_key: Some("k".to_string()),
            ..PlacesSettings::default()
        };
        assert!(PlacesClient::new(settings, &HttpSettings::default()).is_ok());
    }
}
