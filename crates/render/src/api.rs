//! REST API client for the rendering service.
//!
//! Wraps the service's HTTP endpoints (job submission, status, video
//! download, health) using [`reqwest`].

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use tourgen_core::error::CoreError;
use tourgen_core::types::{JobId, JobRequest, StatusReport, SubmitResponse};
use tourgen_core::validation::{join_url, validate_http_url};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes of an error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 2048;

/// HTTP client for one deployment of the rendering service.
#[derive(Clone)]
pub struct RenderApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Result of a `GET /health` request.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status_code: u16,
    /// Parsed JSON body, when the service returns one.
    pub body: Option<serde_json::Value>,
    pub elapsed_ms: u64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Errors from the rendering service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RenderApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Render API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated) for debugging.
        body: String,
    },

    /// The service does not know the job.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// A 2xx response whose body could not be understood.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl RenderApiError {
    /// Whether retrying the same request later could succeed.
    ///
    /// Network failures, timeouts, 408, 429 and 5xx are transient; other
    /// client errors, decode failures and local errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !(e.is_builder() || e.is_decode() || e.is_redirect()),
            Self::ApiError { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            Self::NotFound(_) | Self::Decode(_) | Self::Io(_) | Self::Invalid(_) => false,
        }
    }
}

/// Anything that can report a job's status. Implemented by [`RenderApi`];
/// the poller only depends on this seam.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusReport, RenderApiError>;
}

#[async_trait]
impl StatusSource for RenderApi {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusReport, RenderApiError> {
        self.job_status(job_id).await
    }
}

impl RenderApi {
    /// Create a client for the service at `base_url`, e.g.
    /// `https://tour-api.up.railway.app`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RenderApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tourgen/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Result<Self, RenderApiError> {
        let base_url = base_url.into();
        validate_http_url(&base_url)?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a tour job.
    ///
    /// Sends `POST /api/generate` with the image list and property
    /// details. The request is validated locally first.
    pub async fn submit_job(&self, request: &JobRequest) -> Result<SubmitResponse, RenderApiError> {
        request.ensure_valid()?;

        tracing::info!(
            images = request.images.len(),
            address = %request.property.address,
            "Submitting render job",
        );

        let response = self
            .request(reqwest::Method::POST, "api/generate")
            .json(request)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        tracing::info!(job_id = %submitted.job_id, "Render job accepted");
        Ok(submitted)
    }

    /// Fetch the current status of a job via `GET /api/status/{job_id}`.
    pub async fn job_status(&self, job_id: &JobId) -> Result<StatusReport, RenderApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("api/status/{job_id}"))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RenderApiError::NotFound(job_id.to_string()));
        }

        Self::parse_response(response).await
    }

    /// Download a finished video via `GET /api/download/{job_id}`.
    ///
    /// Returns the number of bytes written to `dest`.
    pub async fn download_video(&self, job_id: &JobId, dest: &Path) -> Result<u64, RenderApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("api/download/{job_id}"))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RenderApiError::NotFound(job_id.to_string()));
        }

        let response = Self::ensure_success(response).await?;
        let written = stream_to_file(response, dest).await?;
        tracing::info!(
            job_id = %job_id,
            bytes = written,
            dest = %dest.display(),
            "Video downloaded"
        );
        Ok(written)
    }

    /// Download an arbitrary media URL (e.g. the video's CDN location).
    ///
    /// No credentials are attached; the URL usually belongs to another host.
    pub async fn download_url(&self, url: &str, dest: &Path) -> Result<u64, RenderApiError> {
        validate_http_url(url)?;
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        let written = stream_to_file(response, dest).await?;
        tracing::info!(url, bytes = written, dest = %dest.display(), "Media downloaded");
        Ok(written)
    }

    /// Probe `GET /health`.
    ///
    /// Any HTTP response counts as reachable; the status code tells whether
    /// the service reports itself healthy.
    pub async fn health(&self) -> Result<HealthReport, RenderApiError> {
        let start = Instant::now();
        let response = self.request(reqwest::Method::GET, "health").send().await?;
        let status_code = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Ok(HealthReport {
            status_code,
            body: serde_json::from_str(&text).ok(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    // ---- private helpers ----

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, join_url(&self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`RenderApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RenderApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RenderApiError::ApiError {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RenderApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| RenderApiError::Decode(format!("{e}: {}", truncate(text, MAX_ERROR_BODY))))
    }
}

/// Stream a response body into `dest` through a `.part` file.
///
/// The final file only appears once the whole body has been written. A
/// failed or empty transfer leaves nothing behind.
async fn stream_to_file(
    response: reqwest::Response,
    dest: &Path,
) -> Result<u64, RenderApiError> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    let partial = std::path::PathBuf::from(partial);

    let written = match write_body(response, &partial).await {
        Ok(0) => Err(RenderApiError::Decode("empty response body".to_string())),
        other => other,
    };
    let written = match written {
        Ok(written) => written,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                tracing::warn!(
                    path = %partial.display(),
                    error = %cleanup,
                    "Failed to remove partial download"
                );
            }
            return Err(e);
        }
    };

    tokio::fs::rename(&partial, dest).await?;
    Ok(written)
}

async fn write_body(mut response: reqwest::Response, path: &Path) -> Result<u64, RenderApiError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_base_url() {
        let result = RenderApi::new("localhost:8000", DEFAULT_REQUEST_TIMEOUT);
        assert!(matches!(result, Err(RenderApiError::Invalid(_))));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = RenderApi::new("http://localhost:8000/", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
    }

    #[test]
    fn blank_api_key_is_ignored() {
        let api = RenderApi::new("http://localhost:8000", DEFAULT_REQUEST_TIMEOUT)
            .unwrap()
            .with_api_key(Some("  ".to_string()));
        assert!(api.api_key.is_none());
    }

    #[test]
    fn transient_classification() {
        let server = |status| RenderApiError::ApiError {
            status,
            body: String::new(),
        };
        assert!(server(502).is_transient());
        assert!(server(503).is_transient());
        assert!(server(429).is_transient());
        assert!(server(408).is_transient());
        assert!(!server(400).is_transient());
        assert!(!server(401).is_transient());
        assert!(!RenderApiError::NotFound("j".into()).is_transient());
        assert!(!RenderApiError::Decode("bad".into()).is_transient());
    }

    #[test]
    fn builder_errors_are_permanent() {
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = RenderApiError::Request(req_err);
        assert!(!err.is_transient());
        assert!(err.to_string().contains("HTTP request failed"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short".to_string(), 10), "short");
        assert_eq!(truncate("héllo".to_string(), 2), "h...");
    }

    #[test]
    fn health_report_classification() {
        let ok = HealthReport {
            status_code: 204,
            body: None,
            elapsed_ms: 3,
        };
        assert!(ok.is_healthy());
        let down = HealthReport {
            status_code: 503,
            ..ok
        };
        assert!(!down.is_healthy());
    }
}
