//! Vente - flight search and media generation tools for chat assistants
//!
//! Proxies assistant tool calls to third-party HTTP APIs and turns their
//! JSON into text a conversation can use.
//!
//! # Overview
//!
//! Vente allows you to:
//! - Search Skyscanner round trips and rank them by price, duration and score
//! - Find the cheapest travel dates for a fixed trip length from price calendars
//! - Generate videos with Replicate or Google Veo and follow the jobs to completion
//! - Generate images and music with Vertex AI and publish them through an asset proxy
//! - Suggest places from Google Maps with photos and reviews
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `http` - Shared HTTP client setup
//! - `poller` - Bounded polling of long-running remote jobs, progress reporting
//! - `jobs` - Video job services (Replicate, Veo)
//! - `flights` - Itinerary ranking, calendar matching, Skyscanner client
//! - `media` - Vertex AI session, Imagen/Lyria client, asset uploads
//! - `places` - Google Maps place suggestions
//! - `orchestrator` - Runs each tool end to end
//! - `mcp` - MCP server exposing the tools
//!
//! # Example
//!
//! ```rust,no_run
//! use vente::config::Settings;
//! use vente::orchestrator::Orchestrator;
//! use vente::poller::TracingSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let text = orchestrator
//!         .cheapest_round_trip("Amsterdam", "Barcelona", 7, &TracingSink)
//!         .await?;
//!     println!("{}", text);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod flights;
pub mod http;
pub mod jobs;
pub mod mcp;
pub mod media;
pub mod orchestrator;
pub mod places;
pub mod poller;

pub use error::{Result, VenteError};
