//! CLI command implementations.

mod config;
mod doctor;
mod flights;
mod mcp;
mod media;
mod places;
mod video;

pub use config::run_config;
pub use doctor::run_doctor;
pub use flights::run_flights;
pub use mcp::run_mcp;
pub use media::run_media;
pub use places::run_places;
pub use video::run_video;
