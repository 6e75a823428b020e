//! GitHub Actions REST client scoped to one repository.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;

use tourgen_core::validation::validate_http_url;

use crate::error::CiError;
use crate::logs::{extract_archive, LogFile};
use crate::runs::{Artifact, ArtifactList, JobList, RunFilter, RunList, WorkflowJob, WorkflowRun};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

/// Bytes of an error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 2048;

#[derive(Clone)]
pub struct ActionsClient {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    token: Option<String>,
}

impl ActionsClient {
    /// Create a client for `repo` (`owner/name`). Public repositories can
    /// be read without a token.
    pub fn new(
        api_base: impl Into<String>,
        repo: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tourgen/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        let api_base = api_base.into();
        validate_http_url(&api_base)?;
        let repo = repo.into();
        parse_repo(&repo)?;

        Ok(Self {
            client,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            repo: repo.trim().to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, CiError> {
        let mut query: Vec<(&str, String)> =
            vec![("per_page", filter.per_page.clamp(1, 100).to_string())];
        if let Some(branch) = &filter.branch {
            query.push(("branch", branch.clone()));
        }
        if let Some(status) = &filter.status {
            query.push(("status", status.clone()));
        }
        let response = self.get("actions/runs").query(&query).send().await?;
        let list: RunList = parse_response(response).await?;
        tracing::debug!(
            repo = %self.repo,
            count = list.workflow_runs.len(),
            "Listed workflow runs"
        );
        Ok(list.workflow_runs)
    }

    pub async fn get_run(&self, run_id: u64) -> Result<WorkflowRun, CiError> {
        let response = self.get(&format!("actions/runs/{run_id}")).send().await?;
        parse_response(response).await
    }

    pub async fn list_jobs(&self, run_id: u64) -> Result<Vec<WorkflowJob>, CiError> {
        let response = self
            .get(&format!("actions/runs/{run_id}/jobs"))
            .query(&[("per_page", "100")])
            .send()
            .await?;
        let list: JobList = parse_response(response).await?;
        Ok(list.jobs)
    }

    pub async fn list_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>, CiError> {
        let response = self
            .get(&format!("actions/runs/{run_id}/artifacts"))
            .send()
            .await?;
        let list: ArtifactList = parse_response(response).await?;
        Ok(list.artifacts)
    }

    /// Download an artifact's zip archive to `dest`. Returns bytes written.
    pub async fn download_artifact(&self, artifact_id: u64, dest: &Path) -> Result<u64, CiError> {
        let bytes = self
            .get_bytes(&format!("actions/artifacts/{artifact_id}/zip"))
            .await?;
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        tracing::info!(
            artifact_id,
            bytes = bytes.len(),
            dest = %dest.display(),
            "Artifact downloaded"
        );
        Ok(bytes.len() as u64)
    }

    /// Fetch and unpack the log archive of a run.
    pub async fn run_logs(&self, run_id: u64) -> Result<Vec<LogFile>, CiError> {
        let bytes = self.get_bytes(&format!("actions/runs/{run_id}/logs")).await?;
        let files = extract_archive(&bytes)?;
        tracing::info!(run_id, files = files.len(), "Run logs fetched");
        Ok(files)
    }

    /// Plain-text log of a single job.
    pub async fn job_log(&self, job_id: u64) -> Result<String, CiError> {
        let bytes = self.get_bytes(&format!("actions/jobs/{job_id}/logs")).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Trigger a `workflow_dispatch` event. `workflow` is the file name or
    /// numeric id.
    pub async fn dispatch_workflow(
        &self,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<(), CiError> {
        let body = serde_json::json!({ "ref": git_ref, "inputs": inputs });
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("actions/workflows/{workflow}/dispatches"),
            )
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::info!(repo = %self.repo, workflow, git_ref, "Workflow dispatched");
        Ok(())
    }

    /// Runs whose title or workflow name mention `job_id`.
    pub async fn find_runs_for_job(
        &self,
        job_id: &str,
        filter: &RunFilter,
    ) -> Result<Vec<WorkflowRun>, CiError> {
        let runs = self.list_runs(filter).await?;
        Ok(runs.into_iter().filter(|r| r.mentions(job_id)).collect())
    }

    // ---- private helpers ----

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/repos/{}/{}", self.api_base, self.repo, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, CiError> {
        let response = self.get(path).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Split `owner/name`.
pub fn parse_repo(repo: &str) -> Result<(&str, &str), CiError> {
    let trimmed = repo.trim();
    match trimmed.split_once('/') {
        Some((owner, name))
            if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((owner, name))
        }
        _ => Err(CiError::InvalidRepo(repo.to_string())),
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CiError> {
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
        return Err(CiError::ApiError {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CiError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| CiError::Decode(e.to_string()))
}
