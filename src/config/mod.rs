//! Configuration module for Vente.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    AssetProxySettings, FlightSettings, GeneralSettings, HttpSettings, PlacesSettings,
    PollSettings, ReplicateSettings, Settings, VeoSettings, VertexSettings,
};
