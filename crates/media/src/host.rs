//! Common interface for media storage backends.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use tourgen_core::candidates::ResourceType;
use tourgen_core::error::CoreError;

/// Bytes of an error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 2048;

/// Errors from media backends.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Media API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The backend cannot perform this operation.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// A stored asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaAsset {
    pub public_id: String,
    /// Delivery URL (https where the backend offers it).
    pub url: String,
    pub resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A file to upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub resource_type: ResourceType,
    pub public_id: Option<String>,
    pub folder: Option<String>,
    pub content_type: Option<String>,
}

impl UploadRequest {
    /// Read `path` into an upload request, guessing the content type from
    /// the extension.
    pub async fn from_path(path: &Path, resource_type: ResourceType) -> Result<Self, MediaError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self {
            content_type: content_type_for(&filename).map(str::to_string),
            bytes,
            filename,
            resource_type,
            public_id: None,
            folder: None,
        })
    }

    pub fn with_public_id(mut self, public_id: Option<String>) -> Self {
        self.public_id = public_id;
        self
    }

    pub fn with_folder(mut self, folder: Option<String>) -> Self {
        self.folder = folder;
        self
    }
}

/// Filter for listing assets.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub resource_type: ResourceType,
    pub prefix: Option<String>,
    /// Maximum number of assets returned across all pages.
    pub limit: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            resource_type: ResourceType::Video,
            prefix: None,
            limit: 50,
        }
    }
}

/// Storage backend for uploaded fixtures and rendered videos.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Short backend name for logs and diagnostics.
    fn name(&self) -> &'static str;

    async fn upload(&self, request: UploadRequest) -> Result<MediaAsset, MediaError>;

    async fn list(&self, query: &ListQuery) -> Result<Vec<MediaAsset>, MediaError>;

    /// Download an asset by URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError>;

    /// `HEAD` the URL: `true` on 2xx, `false` on 404/410.
    async fn exists(&self, url: &str) -> Result<bool, MediaError>;
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

pub(crate) async fn http_fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, MediaError> {
    let response = client.get(url).send().await?;
    let response = ensure_success(response).await?;
    Ok(response.bytes().await?.to_vec())
}

pub(crate) async fn http_exists(client: &reqwest::Client, url: &str) -> Result<bool, MediaError> {
    let response = client.head(url).send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(true);
    }
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return Ok(false);
    }
    Err(MediaError::ApiError {
        status: status.as_u16(),
        body: String::new(),
    })
}

/// Ensure the response has a success status code, capturing status and
/// body text on failure.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, MediaError> {
    let status = response.status();
    if !status.is_success() {
        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(MediaError::ApiError {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, MediaError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| MediaError::Decode(format!("{e}: {text}")))
}

/// MIME type for common fixture and video extensions.
pub fn content_type_for(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.JPG"), Some("image/jpeg"));
        assert_eq!(content_type_for("tour.mp4"), Some("video/mp4"));
        assert_eq!(content_type_for("archive.tar.gz"), None);
        assert_eq!(content_type_for("README"), None);
    }

    #[tokio::test]
    async fn upload_request_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("front.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let req = UploadRequest::from_path(&path, ResourceType::Image)
            .await
            .unwrap()
            .with_folder(Some("fixtures".to_string()));

        assert_eq!(req.filename, "front.png");
        assert_eq!(req.bytes, b"png-bytes");
        assert_eq!(req.content_type.as_deref(), Some("image/png"));
        assert_eq!(req.folder.as_deref(), Some("fixtures"));
    }

    #[test]
    fn unsupported_error_message() {
        let err = MediaError::Unsupported {
            backend: "object-store",
            operation: "list",
        };
        assert_eq!(err.to_string(), "object-store does not support list");
    }
}
