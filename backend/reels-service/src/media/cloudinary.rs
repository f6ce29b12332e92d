//! Hosted media upload client (unsigned preset uploads)

use super::{MediaFile, MediaUploader, ProviderMetadata, UploadError, UploadedMedia};
use crate::config::{CloudinaryConfig, HttpConfig};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Longest slice of a non-JSON error body carried into the message
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    version: u64,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    cloud_name: Option<String>,
}

pub struct CloudinaryUploader {
    http: Client,
    api_base_url: String,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryUploader {
    pub fn new(config: &CloudinaryConfig, http: &HttpConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(http.upload_timeout_ms))
            .build()
            .map_err(|e| UploadError::Transport(format!("Failed to create HTTP client: {e}")))?;

        info!(cloud = %config.cloud_name, "media uploader initialized");

        Ok(Self {
            http: client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            upload_preset: config.upload_preset.clone(),
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/{}/video/upload", self.api_base_url, self.cloud_name)
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(&self, file: MediaFile) -> Result<UploadedMedia, UploadError> {
        let size = file.bytes.len();
        let mut part = Part::bytes(file.bytes).file_name(file.file_name.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| UploadError::Rejected(format!("invalid content type: {e}")))?;
        }

        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let response = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = rejection_message(status, &text);
            warn!(status = status.as_u16(), file = %file.file_name, "upload rejected: {}", message);
            return Err(UploadError::Rejected(message));
        }

        let parsed: UploadResponse =
            serde_json::from_str(&text).map_err(|e| UploadError::Decode(e.to_string()))?;

        info!(asset_id = %parsed.public_id, bytes = size, "media uploaded");

        Ok(UploadedMedia {
            url: parsed.secure_url,
            asset_id: parsed.public_id,
            metadata: ProviderMetadata {
                cloud_name: parsed
                    .cloud_name
                    .unwrap_or_else(|| self.cloud_name.clone()),
                version: parsed.version,
                format: parsed.format,
                duration_secs: parsed.duration,
                bytes: parsed.bytes,
            },
        })
    }
}

/// Provider's own `error.message` when the body carries one, otherwise the
/// status with the start of whatever the proxy or gateway sent back
fn rejection_message(status: StatusCode, body: &str) -> String {
    let provider_message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json["error"]["message"]
            .as_str()
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(str::to_string)
    });
    if let Some(message) = provider_message {
        return message;
    }

    let body = body.trim();
    if body.is_empty() {
        return format!("Media upload failed (HTTP {})", status.as_u16());
    }
    let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("Media upload failed (HTTP {}): {}", status.as_u16(), excerpt)
}
