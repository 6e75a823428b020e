//! Workflow run, job and artifact records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summarized state of a run or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    Success,
    Failure,
    Cancelled,
    InProgress,
    Queued,
    Skipped,
    Other,
}

impl RunVerdict {
    /// Combine the API's `status` and `conclusion` fields.
    pub fn from_parts(status: &str, conclusion: Option<&str>) -> Self {
        match status {
            "completed" => match conclusion.unwrap_or_default() {
                "success" => Self::Success,
                "failure" | "timed_out" | "startup_failure" => Self::Failure,
                "cancelled" => Self::Cancelled,
                "skipped" | "neutral" => Self::Skipped,
                _ => Self::Other,
            },
            "in_progress" => Self::InProgress,
            "queued" | "waiting" | "pending" | "requested" => Self::Queued,
            _ => Self::Other,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Failure => "❌",
            Self::Cancelled => "🚫",
            Self::InProgress => "🔄",
            Self::Queued => "⏳",
            Self::Skipped => "⏭",
            Self::Other => "❔",
        }
    }

    pub fn is_finished(self) -> bool {
        !matches!(self, Self::InProgress | Self::Queued)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_title: Option<String>,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub head_sha: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub run_number: Option<u64>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn verdict(&self) -> RunVerdict {
        RunVerdict::from_parts(&self.status, self.conclusion.as_deref())
    }

    /// Title shown in listings: the display title, else the workflow name.
    pub fn title(&self) -> &str {
        self.display_title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("(untitled)")
    }

    /// Whether the run's title or workflow name contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        [self.display_title.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .any(|text| text.contains(needle))
    }

    /// Wall time from creation to last update.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.updated_at? - self.created_at?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobStep {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub number: Option<u32>,
}

impl JobStep {
    pub fn verdict(&self) -> RunVerdict {
        RunVerdict::from_parts(&self.status, self.conclusion.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowJob {
    pub id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub steps: Vec<JobStep>,
}

impl WorkflowJob {
    pub fn verdict(&self) -> RunVerdict {
        RunVerdict::from_parts(&self.status, self.conclusion.as_deref())
    }

    /// First step that did not succeed, if any.
    pub fn failed_step(&self) -> Option<&JobStep> {
        self.steps
            .iter()
            .find(|s| s.verdict() == RunVerdict::Failure)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Artifact {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: u64,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Filter for run listings.
#[derive(Debug, Clone)]
pub struct RunFilter {
    pub branch: Option<String>,
    /// `status` query value (`completed`, `in_progress`, `failure`, ...).
    pub status: Option<String>,
    pub per_page: u32,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            branch: None,
            status: None,
            per_page: 20,
        }
    }
}

// ---- list envelopes ----

#[derive(Debug, Deserialize)]
pub(crate) struct RunList {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobList {
    #[serde(default)]
    pub jobs: Vec<WorkflowJob>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtifactList {
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}
