//! Job data model exchanged with the rendering service.
//!
//! The service speaks loosely-shaped JSON: status strings vary between
//! deployments, progress may arrive as an integer, a float or a
//! percentage string, and the result URL has gone by several field
//! names. Everything is normalised here so callers only ever see
//! [`JobStatus`] and [`JobState`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::validation::validate_http_url;

/// Maximum number of images accepted in one submission.
pub const MAX_IMAGES_PER_JOB: usize = 100;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Opaque job identifier assigned by the rendering service.
///
/// The id is embedded in URL paths, so path and query delimiters and
/// whitespace are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        let malformed = trimmed.is_empty()
            || trimmed
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'));
        if malformed {
            return Err(CoreError::InvalidJobId(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Normalised job status.
///
/// Unrecognised strings are kept verbatim in [`JobStatus::Unknown`] so
/// they can still be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Unknown(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" | "waiting" => Self::Queued,
            "processing" | "running" | "rendering" | "in_progress" | "started" => {
                Self::Processing
            }
            "completed" | "complete" | "done" | "success" | "succeeded" | "finished" => {
                Self::Completed
            }
            "failed" | "error" | "errored" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Unknown(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown(s) if s.is_empty() => "unknown",
            Self::Unknown(s) => s.as_str(),
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// StatusReport
// ---------------------------------------------------------------------------

/// Body of the rendering service's status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStatusReport")]
pub struct StatusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: JobStatus,
    /// Completion percentage (0-100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Wire shape of [`StatusReport`]. Each result URL spelling is its own
/// field so bodies carrying several of them still decode.
#[derive(Deserialize)]
struct RawStatusReport {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    status: JobStatus,
    #[serde(default, deserialize_with = "deserialize_progress")]
    progress: Option<u8>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default, rename = "videoUrl")]
    video_url_camel: Option<String>,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<RawStatusReport> for StatusReport {
    fn from(raw: RawStatusReport) -> Self {
        Self {
            job_id: raw.job_id,
            status: raw.status,
            progress: raw.progress,
            video_url: first_non_blank([
                raw.video_url,
                raw.video_url_camel,
                raw.result_url,
                raw.url,
            ]),
            error: raw.error,
            message: raw.message,
        }
    }
}

/// First candidate that is present and not blank, trimmed.
fn first_non_blank<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// What a status report means for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// The job produced a video.
    Ready { video_url: String },
    /// The job is still in flight.
    Pending {
        status: JobStatus,
        progress: Option<u8>,
    },
    /// The job will never produce a video.
    Failed { reason: String },
}

impl StatusReport {
    /// Result URL, if present and non-blank.
    pub fn result_url(&self) -> Option<&str> {
        self.video_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Classify the report.
    ///
    /// A result URL means success whatever the status string says; a
    /// `completed` status without one is still pending.
    pub fn state(&self) -> JobState {
        if matches!(self.status, JobStatus::Failed | JobStatus::Cancelled) {
            let reason = non_blank(&self.error)
                .or_else(|| non_blank(&self.message))
                .map(str::to_string)
                .unwrap_or_else(|| format!("job {}", self.status));
            return JobState::Failed { reason };
        }

        if let Some(url) = self.result_url() {
            return JobState::Ready {
                video_url: url.to_string(),
            };
        }

        JobState::Pending {
            status: self.status.clone(),
            progress: self.progress,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let raw = value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    });
    Ok(raw.map(clamp_progress))
}

/// Clamp a raw percentage into `0..=100`. NaN maps to 0.
pub fn clamp_progress(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0).round() as u8
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Listing details rendered into the tour video overlays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_sqft: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_email: Option<String>,
    /// Keys this client does not model, passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Body of a job submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub images: Vec<String>,
    pub property: PropertyDetails,
}

impl JobRequest {
    /// Check the request before it is sent.
    ///
    /// Returns an empty `Vec` if valid; otherwise a list of human-readable errors.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.images.is_empty() {
            errors.push("At least one image URL is required".to_string());
        }
        if self.images.len() > MAX_IMAGES_PER_JOB {
            errors.push(format!(
                "Too many images: {} (max {MAX_IMAGES_PER_JOB})",
                self.images.len()
            ));
        }
        for (idx, image) in self.images.iter().enumerate() {
            if let Err(e) = validate_http_url(image) {
                errors.push(format!("images[{idx}]: {e}"));
            }
        }

        let property = &self.property;
        if property.address.trim().is_empty() {
            errors.push("property.address must not be empty".to_string());
        }
        if let Some(bathrooms) = property.bathrooms {
            if !bathrooms.is_finite() || bathrooms < 0.0 {
                errors.push(format!("property.bathrooms must be >= 0, got {bathrooms}"));
            }
        }
        if let Some(email) = property.agent_email.as_deref() {
            if !email.contains('@') {
                errors.push(format!("property.agent_email is not an email address: '{email}'"));
            }
        }

        errors
    }

    /// [`validate`](Self::validate) folded into a single error.
    pub fn ensure_valid(&self) -> Result<(), CoreError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(errors.join("; ")))
        }
    }
}

/// Response of the submission endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSubmitResponse")]
pub struct SubmitResponse {
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Canonical video location, when the service announces it up front.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

#[derive(Deserialize)]
struct RawSubmitResponse {
    job_id: JobId,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default, rename = "videoUrl")]
    video_url_camel: Option<String>,
    #[serde(default)]
    result_url: Option<String>,
}

impl From<RawSubmitResponse> for SubmitResponse {
    fn from(raw: RawSubmitResponse) -> Self {
        Self {
            job_id: raw.job_id,
            status: raw.status,
            message: raw.message,
            video_url: first_non_blank([raw.video_url, raw.video_url_camel, raw.result_url]),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
