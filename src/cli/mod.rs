//! CLI module for Vente.

pub mod commands;
mod output;
pub mod preflight;

pub use output::{Output, SpinnerSink};

use crate::orchestrator::VideoProvider;
use clap::{Parser, Subcommand};

/// Vente - flight search and media generation tools for chat assistants
///
/// Runs each tool from the command line, or serves them all to an assistant
/// over MCP.
#[derive(Parser, Debug)]
#[command(name = "vente")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "VENTE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check credentials and configuration
    Doctor,

    /// Search flights and price calendars
    Flights {
        #[command(subcommand)]
        action: FlightsAction,
    },

    /// Suggest places from Google Maps
    Places {
        /// What to look for (e.g. "ramen in Rotterdam")
        query: String,

        /// Number of places, 1-20
        #[arg(short = 'n', long, default_value = "3")]
        max_results: u32,

        /// Reviews per place, 0-5
        #[arg(long, default_value = "5")]
        max_reviews: usize,

        /// Photo width in pixels (defaults to places.max_photo_width)
        #[arg(long)]
        photo_width: Option<u32>,
    },

    /// Generate videos and manage video jobs
    Video {
        #[command(subcommand)]
        action: VideoAction,
    },

    /// Generate images and music with Vertex AI
    Media {
        #[command(subcommand)]
        action: MediaAction,
    },

    /// Start MCP server for AI assistant integration (Claude, etc.)
    Mcp,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum FlightsAction {
    /// Search round-trip flights for exact dates
    Search {
        /// Origin airport or city (e.g. AMS, Amsterdam)
        origin: String,
        /// Destination airport or city
        destination: String,
        /// Departure date (YYYY-MM-DD)
        departure: String,
        /// Return date (YYYY-MM-DD)
        return_date: String,
        /// Number of adult passengers
        #[arg(short, long, default_value = "1")]
        adults: u32,
    },

    /// Show the one-way price calendar for a route
    Calendar {
        origin: String,
        destination: String,
    },

    /// Find the cheapest dates for a round trip of fixed length
    Cheapest {
        origin: String,
        destination: String,
        /// Trip length in days
        #[arg(short, long, default_value = "7")]
        days: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum VideoAction {
    /// Generate a video and wait for it
    Generate {
        /// What the video should show (optional with --image on veo)
        prompt: Option<String>,

        /// Video backend
        #[arg(short, long, default_value = "replicate")]
        provider: VideoProvider,

        /// What to avoid
        #[arg(short, long)]
        negative_prompt: Option<String>,

        /// Base64 first frame (veo only)
        #[arg(long)]
        image: Option<String>,

        /// Aspect ratio (veo only: 16:9 or 9:16)
        #[arg(long, default_value = "16:9")]
        aspect_ratio: String,

        /// Person generation policy (veo only)
        #[arg(long, default_value = "allow_adult")]
        person_generation: String,

        /// Number of videos, 1-2 (veo only)
        #[arg(long, default_value = "1")]
        videos: u32,

        /// Length in seconds, 5-8 (veo only)
        #[arg(long, default_value = "8")]
        duration: u32,
    },

    /// Check a video job once
    Status {
        /// Prediction id or operation name
        job_id: String,

        #[arg(short, long, default_value = "replicate")]
        provider: VideoProvider,
    },

    /// Cancel a running video job
    Cancel {
        job_id: String,

        #[arg(short, long, default_value = "replicate")]
        provider: VideoProvider,
    },
}

#[derive(Subcommand, Debug)]
pub enum MediaAction {
    /// Generate images with Imagen
    Image {
        prompt: String,

        /// Imagen model (see `vente media models`)
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long, default_value = "1:1")]
        aspect_ratio: String,

        /// Number of images, 1-4
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Send the prompt as written
        #[arg(long)]
        no_enhance: bool,

        #[arg(long, default_value = "allow_all")]
        person_generation: String,

        #[arg(long)]
        watermark: bool,
    },

    /// Generate music with Lyria
    Music {
        prompt: String,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        negative_prompt: Option<String>,

        /// Seed for reproducible output (conflicts with --count)
        #[arg(long, conflicts_with = "count")]
        seed: Option<u64>,

        /// Number of tracks
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },

    /// List available models
    Models,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
