//! MCP tool definitions for Vente.

use super::protocol::Tool;
use serde_json::{json, Value};

fn route_properties() -> Value {
    json!({
        "origin_airport_name": {
            "type": "string",
            "description": "Starting airport or city, as an IATA code or a name (e.g. \"AMS\", \"Amsterdam\")"
        },
        "destination_airport_name": {
            "type": "string",
            "description": "Destination airport or city (e.g. \"LHR\", \"London Heathrow\")"
        }
    })
}

fn job_properties(id_description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "provider": {
                "type": "string",
                "enum": ["replicate", "veo"],
                "description": "Video backend that runs the job",
                "default": "replicate"
            },
            "job_id": {
                "type": "string",
                "description": id_description
            }
        },
        "required": ["job_id"]
    })
}

/// Get all available tools.
pub fn get_tools() -> Vec<Tool> {
    let mut search_properties = route_properties();
    if let Some(props) = search_properties.as_object_mut() {
        props.insert(
            "departure_date".to_string(),
            json!({"type": "string", "description": "Outbound date, YYYY-MM-DD"}),
        );
        props.insert(
            "return_date".to_string(),
            json!({"type": "string", "description": "Return date, YYYY-MM-DD"}),
        );
        props.insert(
            "passengers".to_string(),
            json!({"type": "integer", "description": "Number of adult passengers", "default": 1}),
        );
    }

    let mut cheapest_properties = route_properties();
    if let Some(props) = cheapest_properties.as_object_mut() {
        props.insert(
            "trip_duration_days".to_string(),
            json!({"type": "integer", "description": "Length of the trip in days", "default": 7}),
        );
    }

    vec![
        Tool {
            name: "search_flights".to_string(),
            description: "Search bookable round-trip flights for exact dates. \
                Returns the top options by price, by total duration, and by Skyscanner score, each with a booking link."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": search_properties,
                "required": ["origin_airport_name", "destination_airport_name", "departure_date", "return_date"]
            }),
        },
        Tool {
            name: "get_flight_price_calendar".to_string(),
            description: "One-way indicative price calendar for a route over the coming months."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": route_properties(),
                "required": ["origin_airport_name", "destination_airport_name"]
            }),
        },
        Tool {
            name: "find_cheapest_round_trip_by_calendar".to_string(),
            description: "Find the cheapest outbound and return dates for a round trip of a fixed length, \
                using indicative calendar prices."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": cheapest_properties,
                "required": ["origin_airport_name", "destination_airport_name"]
            }),
        },
        Tool {
            name: "generate_video".to_string(),
            description: "Generate a video from a text prompt (or, with Veo, a first-frame image) and wait for it. \
                Returns the video URLs in <video> tags."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "provider": {
                        "type": "string",
                        "enum": ["replicate", "veo"],
                        "default": "replicate"
                    },
                    "prompt": {"type": "string", "description": "What the video should show"},
                    "negative_prompt": {"type": "string", "description": "What to avoid"},
                    "image": {"type": "string", "description": "Base64 first frame (veo only)"},
                    "aspect_ratio": {"type": "string", "enum": ["16:9", "9:16"], "default": "16:9"},
                    "person_generation": {
                        "type": "string",
                        "enum": ["dont_allow", "allow_adult", "allow_all"],
                        "default": "allow_adult"
                    },
                    "number_of_videos": {"type": "integer", "minimum": 1, "maximum": 2, "default": 1},
                    "duration_seconds": {"type": "integer", "minimum": 5, "maximum": 8, "default": 8}
                }
            }),
        },
        Tool {
            name: "check_video_status".to_string(),
            description: "Check a video generation job once and return its video if it is done."
                .to_string(),
            input_schema: job_properties("Prediction id (replicate) or operation name (veo)"),
        },
        Tool {
            name: "cancel_video".to_string(),
            description: "Ask the provider to cancel a running video generation job.".to_string(),
            input_schema: job_properties("Prediction id (replicate) or operation name (veo)"),
        },
        Tool {
            name: "generate_image".to_string(),
            description: "Generate images with Vertex AI Imagen.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"},
                    "model": {"type": "string", "description": "Imagen model id; see list_available_models"},
                    "aspect_ratio": {"type": "string", "enum": ["1:1", "9:16", "16:9", "4:3", "3:4"], "default": "1:1"},
                    "sample_count": {"type": "integer", "minimum": 1, "maximum": 4, "default": 1},
                    "enhance_prompt": {"type": "boolean", "default": true},
                    "person_generation": {
                        "type": "string",
                        "enum": ["dont_allow", "allow_adult", "allow_all"],
                        "default": "allow_all"
                    },
                    "add_watermark": {"type": "boolean", "default": false},
                    "include_rai_reason": {"type": "boolean", "default": true},
                    "language": {"type": "string", "default": "auto"}
                },
                "required": ["prompt"]
            }),
        },
        Tool {
            name: "generate_music".to_string(),
            description: "Generate instrumental music with Vertex AI Lyria. \
                Give either a seed or a sample count, not both."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"},
                    "model": {"type": "string"},
                    "negative_prompt": {"type": "string"},
                    "seed": {"type": "integer", "minimum": 0},
                    "sample_count": {"type": "integer", "minimum": 1}
                },
                "required": ["prompt"]
            }),
        },
        Tool {
            name: "get_place_suggestions".to_string(),
            description: "Suggest places from Google Maps for a text query, with address, \
                rating, photo, reviews and a Google Maps link for each."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look for (e.g. \"ramen in Rotterdam\")"
                    },
                    "max_results": {"type": "integer", "minimum": 1, "maximum": 20, "default": 3},
                    "max_reviews_per_place": {"type": "integer", "minimum": 0, "maximum": 5, "default": 5},
                    "max_photo_width": {"type": "integer", "minimum": 1}
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "list_available_models".to_string(),
            description: "List the Vertex AI image and music models that can be used.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}
