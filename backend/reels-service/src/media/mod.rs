/// Media upload boundary
///
/// Raw video files are handed to a hosted transcoding/storage service through
/// [`MediaUploader`]. The service returns a durable URL, its own asset id and
/// enough metadata to template a thumbnail URL.
use crate::error::AppError;
use async_trait::async_trait;
use thiserror::Error;

pub mod cloudinary;

pub use cloudinary::CloudinaryUploader;

/// Thumbnail transformation applied by the delivery host
pub const THUMBNAIL_TRANSFORM: &str = "q_auto:good,f_auto,w_400,h_300,c_fill";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Provider answered with a non-success status; carries its message
    #[error("{0}")]
    Rejected(String),

    #[error("upload transport failure: {0}")]
    Transport(String),

    #[error("malformed upload response: {0}")]
    Decode(String),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Upload(err.to_string())
    }
}

/// File picked by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMetadata {
    pub cloud_name: String,
    pub version: u64,
    pub format: Option<String>,
    pub duration_secs: Option<f64>,
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    pub url: String,
    pub asset_id: String,
    pub metadata: ProviderMetadata,
}

impl UploadedMedia {
    /// Derived still frame served by the delivery host
    pub fn thumbnail_url(&self, delivery_base_url: &str) -> String {
        format!(
            "{}/{}/video/upload/{}/v{}/{}.jpg",
            delivery_base_url.trim_end_matches('/'),
            self.metadata.cloud_name,
            THUMBNAIL_TRANSFORM,
            self.metadata.version,
            self.asset_id
        )
    }
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file: MediaFile) -> Result<UploadedMedia, UploadError>;
}
