//! Cloudinary upload and admin API client.
//!
//! Uploads go through `POST /v1_1/{cloud}/{type}/upload`, either signed
//! with the account's API secret or through an unsigned upload preset.
//! Listing and lookups use the admin API with basic auth.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use tourgen_core::candidates::{ResourceType, DEFAULT_DELIVERY_BASE};
use tourgen_core::hashing::sha256_hex;
use tourgen_core::redact::redact_opt;
use tourgen_core::validation::validate_http_url;

use crate::host::{
    ensure_success, http_exists, http_fetch, parse_response, ListQuery, MediaAsset, MediaError,
    MediaHost, UploadRequest,
};

/// Default upload/admin API host.
pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

/// Admin API page size ceiling.
const MAX_PAGE_SIZE: usize = 500;

/// Account settings for one Cloudinary cloud.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Unsigned upload preset, used when no key/secret pair is configured.
    pub upload_preset: Option<String>,
    pub api_base: String,
    pub delivery_base: String,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &redact_opt(self.api_key.as_deref()))
            .field("api_secret", &redact_opt(self.api_secret.as_deref()))
            .field("upload_preset", &self.upload_preset)
            .field("api_base", &self.api_base)
            .field("delivery_base", &self.delivery_base)
            .finish()
    }
}

impl CloudinaryConfig {
    pub fn new(cloud_name: impl Into<String>) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: None,
            api_secret: None,
            upload_preset: None,
            api_base: DEFAULT_API_BASE.to_string(),
            delivery_base: DEFAULT_DELIVERY_BASE.to_string(),
        }
    }

    pub fn with_credentials(mut self, api_key: Option<String>, api_secret: Option<String>) -> Self {
        self.api_key = api_key.filter(|s| !s.trim().is_empty());
        self.api_secret = api_secret.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_upload_preset(mut self, preset: Option<String>) -> Self {
        self.upload_preset = preset.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_delivery_base(mut self, base: impl Into<String>) -> Self {
        self.delivery_base = base.into();
        self
    }

    /// Key and secret, when both are present.
    fn signing_pair(&self) -> Option<(&str, &str)> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

/// Sign upload parameters: `k=v` pairs sorted by key, joined with `&`,
/// with the secret appended, hashed with SHA-256. Empty values are left
/// out.
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    sha256_hex(format!("{joined}{api_secret}").as_bytes())
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResourceDto {
    public_id: String,
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    version: Option<u64>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ResourcePage {
    #[serde(default)]
    resources: Vec<ResourceDto>,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl ResourceDto {
    fn into_asset(self, resource_type: ResourceType) -> Result<MediaAsset, MediaError> {
        let url = self
            .secure_url
            .or(self.url)
            .ok_or_else(|| MediaError::Decode(format!("resource {} has no url", self.public_id)))?;
        Ok(MediaAsset {
            public_id: self.public_id,
            url,
            resource_type,
            format: self.format,
            bytes: self.bytes,
            version: self.version,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CloudinaryClient {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig, timeout: Duration) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tourgen/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client, config)
    }

    pub fn with_client(
        client: reqwest::Client,
        mut config: CloudinaryConfig,
    ) -> Result<Self, MediaError> {
        if config.cloud_name.trim().is_empty() {
            return Err(MediaError::MissingCredentials("CLOUDINARY_CLOUD_NAME".to_string()));
        }
        validate_http_url(&config.api_base)?;
        validate_http_url(&config.delivery_base)?;
        config.api_base = config.api_base.trim_end_matches('/').to_string();
        config.delivery_base = config.delivery_base.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CloudinaryConfig {
        &self.config
    }

    /// Whether uploads will be signed (`true`) or go through the preset.
    pub fn can_sign(&self) -> bool {
        self.config.signing_pair().is_some()
    }

    /// Look up one resource by public id. `Ok(None)` when it does not exist.
    pub async fn resource(
        &self,
        resource_type: ResourceType,
        public_id: &str,
    ) -> Result<Option<MediaAsset>, MediaError> {
        let url = format!(
            "{}/v1_1/{}/resources/{}/upload/{}",
            self.config.api_base,
            self.config.cloud_name,
            resource_type.as_str(),
            public_id.trim_matches('/'),
        );
        let response = self.admin_get(&url)?.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let dto: ResourceDto = parse_response(response).await?;
        dto.into_asset(resource_type).map(Some)
    }

    /// Check the admin credentials with `GET /v1_1/{cloud}/ping`.
    pub async fn ping(&self) -> Result<(), MediaError> {
        let url = format!("{}/v1_1/{}/ping", self.config.api_base, self.config.cloud_name);
        let response = self.admin_get(&url)?.send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    fn admin_get(&self, url: &str) -> Result<reqwest::RequestBuilder, MediaError> {
        let (key, secret) = self.config.signing_pair().ok_or_else(|| {
            MediaError::MissingCredentials(
                "CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET".to_string(),
            )
        })?;
        Ok(self.client.get(url).basic_auth(key, Some(secret)))
    }

    fn upload_form(&self, request: UploadRequest) -> Result<reqwest::multipart::Form, MediaError> {
        let mut params: BTreeMap<&str, String> = BTreeMap::new();
        if let Some(public_id) = request.public_id.filter(|s| !s.is_empty()) {
            params.insert("public_id", public_id);
        }
        if let Some(folder) = request.folder.filter(|s| !s.is_empty()) {
            params.insert("folder", folder);
        }

        let mut form = reqwest::multipart::Form::new();
        if let Some((key, secret)) = self.config.signing_pair() {
            params.insert("timestamp", Utc::now().timestamp().to_string());
            let signature = sign_params(&params, secret);
            form = form
                .text("api_key", key.to_string())
                .text("signature", signature)
                .text("signature_algorithm", "sha256");
        } else if let Some(preset) = &self.config.upload_preset {
            params.insert("upload_preset", preset.clone());
        } else {
            return Err(MediaError::MissingCredentials(
                "CLOUDINARY_API_KEY/CLOUDINARY_API_SECRET or CLOUDINARY_UPLOAD_PRESET".to_string(),
            ));
        }

        for (k, v) in params {
            form = form.text(k, v);
        }

        let mut part = reqwest::multipart::Part::bytes(request.bytes).file_name(request.filename);
        if let Some(content_type) = &request.content_type {
            part = part.mime_str(content_type)?;
        }
        Ok(form.part("file", part))
    }
}

#[async_trait]
impl MediaHost for CloudinaryClient {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload(&self, request: UploadRequest) -> Result<MediaAsset, MediaError> {
        let resource_type = request.resource_type;
        let filename = request.filename.clone();
        let size = request.bytes.len();
        let form = self.upload_form(request)?;

        let url = format!(
            "{}/v1_1/{}/{}/upload",
            self.config.api_base,
            self.config.cloud_name,
            resource_type.as_str(),
        );
        tracing::info!(
            file = %filename,
            bytes = size,
            signed = self.can_sign(),
            "Uploading to Cloudinary"
        );

        let response = self.client.post(&url).multipart(form).send().await?;
        let dto: ResourceDto = parse_response(response).await?;
        let asset = dto.into_asset(resource_type)?;
        tracing::info!(public_id = %asset.public_id, url = %asset.url, "Upload complete");
        Ok(asset)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<MediaAsset>, MediaError> {
        let url = format!(
            "{}/v1_1/{}/resources/{}/upload",
            self.config.api_base,
            self.config.cloud_name,
            query.resource_type.as_str(),
        );

        let mut assets: Vec<MediaAsset> = Vec::new();
        let mut cursor: Option<String> = None;
        while assets.len() < query.limit {
            let page_size = (query.limit - assets.len()).min(MAX_PAGE_SIZE);
            let mut params: Vec<(&str, String)> = vec![("max_results", page_size.to_string())];
            if let Some(prefix) = query.prefix.as_ref().filter(|p| !p.is_empty()) {
                params.push(("prefix", prefix.clone()));
            }
            if let Some(next) = &cursor {
                params.push(("next_cursor", next.clone()));
            }

            let response = self.admin_get(&url)?.query(&params).send().await?;
            let page: ResourcePage = parse_response(response).await?;
            tracing::debug!(
                count = page.resources.len(),
                more = page.next_cursor.is_some(),
                "Listed page"
            );

            for dto in page.resources {
                assets.push(dto.into_asset(query.resource_type)?);
            }
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        assets.truncate(query.limit);
        Ok(assets)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1700000000".to_string());
        params.insert("public_id", "job_1".to_string());
        params.insert("folder", "tours".to_string());
        assert_eq!(
            sign_params(&params, "s3cr3t"),
            "1c35592eaf7812b6bbe1bbdc0c69bc4aa2359d771345b5a0501c1d27ec6954da"
        );
    }

    #[test]
    fn empty_values_are_not_signed() {
        let mut with_empty = BTreeMap::new();
        with_empty.insert("timestamp", "1".to_string());
        with_empty.insert("folder", String::new());
        let mut without = BTreeMap::new();
        without.insert("timestamp", "1".to_string());
        assert_eq!(sign_params(&with_empty, "x"), sign_params(&without, "x"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = CloudinaryConfig::new("demo").with_credentials(
            Some("123456789012345".to_string()),
            Some("very-secret-value-abcd".to_string()),
        );
        let text = format!("{config:?}");
        assert!(!text.contains("very-secret-value"));
        assert!(text.contains("...abcd"));
    }

    #[test]
    fn blank_cloud_name_is_rejected() {
        let result = CloudinaryClient::new(CloudinaryConfig::new(" "), Duration::from_secs(1));
        assert!(matches!(result, Err(MediaError::MissingCredentials(_))));
    }

    #[test]
    fn upload_without_any_credentials_fails() {
        let client =
            CloudinaryClient::new(CloudinaryConfig::new("demo"), Duration::from_secs(1)).unwrap();
        assert!(!client.can_sign());
        let request = UploadRequest {
            bytes: vec![1, 2, 3],
            filename: "a.png".to_string(),
            resource_type: ResourceType::Image,
            public_id: None,
            folder: None,
            content_type: None,
        };
        assert!(matches!(
            client.upload_form(request),
            Err(MediaError::MissingCredentials(_))
        ));
    }
}
