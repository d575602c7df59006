//! Synchronous media generation on Vertex AI and upload of the results.

pub mod asset_proxy;
pub mod session;
pub mod vertex;

pub use asset_proxy::{AssetProxyClient, AssetUploader, UploadedAsset};
pub use session::{AccessToken, Authorized, GcloudToken, Session, StaticToken, TokenSource};
pub use vertex::{
    list_models, GeneratedMedia, ImageRequest, MediaResponse, ModelInfo, MusicRequest,
    VertexClient, IMAGE_MODELS, MUSIC_MODELS,
};
