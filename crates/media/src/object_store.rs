//! Plain HTTP object store: `PUT {base}/{key}` to upload, `GET` to fetch.

use std::time::Duration;

use async_trait::async_trait;

use tourgen_core::candidates::ResourceType;
use tourgen_core::validation::{join_url, validate_http_url};

use crate::host::{
    ensure_success, http_exists, http_fetch, ListQuery, MediaAsset, MediaError, MediaHost,
    UploadRequest,
};

pub struct ObjectStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl ObjectStoreClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tourgen/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Result<Self, MediaError> {
        let base_url = base_url.into();
        validate_http_url(&base_url)?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Public URL of `key`.
    pub fn url_for(&self, key: &str) -> String {
        join_url(&self.base_url, key.trim_start_matches('/'))
    }

    /// Object key for an upload: `[folder/]{public_id or filename}`.
    fn key_for(request: &UploadRequest) -> String {
        let name = request
            .public_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&request.filename)
            .trim_matches('/');
        match request.folder.as_deref().map(|f| f.trim_matches('/')) {
            Some(folder) if !folder.is_empty() => format!("{folder}/{name}"),
            _ => name.to_string(),
        }
    }
}

#[async_trait]
impl MediaHost for ObjectStoreClient {
    fn name(&self) -> &'static str {
        "object-store"
    }

    async fn upload(&self, request: UploadRequest) -> Result<MediaAsset, MediaError> {
        let key = Self::key_for(&request);
        let url = self.url_for(&key);
        let size = request.bytes.len() as u64;
        let format = request
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        let mut builder = self.client.put(&url);
        if let Some(content_type) = &request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        tracing::info!(key = %key, bytes = size, "Uploading to object store");
        let response = builder.body(request.bytes).send().await?;
        ensure_success(response).await?;

        Ok(MediaAsset {
            public_id: key,
            url,
            resource_type: request.resource_type,
            format,
            bytes: Some(size),
            version: None,
            created_at: None,
        })
    }

    async fn list(&self, _query: &ListQuery) -> Result<Vec<MediaAsset>, MediaError> {
        Err(MediaError::Unsupported {
            backend: "object-store",
            operation: "list",
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        validate_http_url(url)?;
        http_fetch(&self.client, url).await
    }

    async fn exists(&self, url: &str) -> Result<bool, MediaError> {
        validate_http_url(url)?;
        http_exists(&self.client, url).await
    }
}

/// Fetch `key` from the store.
pub async fn get_key(store: &ObjectStoreClient, key: &str) -> Result<Vec<u8>, MediaError> {
    store.fetch(&store.url_for(key)).await
}

/// Default resource type for a store key, guessed from its extension.
pub fn resource_type_for(key: &str) -> ResourceType {
    match crate::host::content_type_for(key) {
        Some(mime) if mime.starts_with("video/") => ResourceType::Video,
        _ => ResourceType::Image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(public_id: Option<&str>, folder: Option<&str>) -> UploadRequest {
        UploadRequest {
            bytes: Vec::new(),
            filename: "tour.mp4".to_string(),
            resource_type: ResourceType::Video,
            public_id: public_id.map(str::to_string),
            folder: folder.map(str::to_string),
            content_type: None,
        }
    }

    #[test]
    fn key_prefers_public_id_and_folder() {
        assert_eq!(ObjectStoreClient::key_for(&request(None, None)), "tour.mp4");
        assert_eq!(
            ObjectStoreClient::key_for(&request(Some("job_1.mp4"), Some("/renders/"))),
            "renders/job_1.mp4"
        );
        assert_eq!(ObjectStoreClient::key_for(&request(Some(" "), Some(""))), "tour.mp4");
    }

    #[test]
    fn url_for_joins_base() {
        let store =
            ObjectStoreClient::new("http://store.local/bucket/", Duration::from_secs(1)).unwrap();
        assert_eq!(store.url_for("/a/b.png"), "http://store.local/bucket/a/b.png");
    }

    #[test]
    fn resource_type_from_extension() {
        assert_eq!(resource_type_for("x/tour.MP4"), ResourceType::Video);
        assert_eq!(resource_type_for("front.jpg"), ResourceType::Image);
    }
}
