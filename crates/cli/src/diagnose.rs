//! `tourgen diagnose`: one health check per configured collaborator.
//!
//! Collaborators without configuration are reported as skipped, never as
//! failed.

use std::future::Future;
use std::time::Instant;

use serde::Serialize;

use tourgen_ci::client::ActionsClient;
use tourgen_ci::runs::RunFilter;
use tourgen_core::ffmpeg::{tool_version, FfmpegError};
use tourgen_media::cloudinary::CloudinaryClient;
use tourgen_media::host::{MediaError, MediaHost};
use tourgen_media::object_store::ObjectStoreClient;
use tourgen_render::api::RenderApi;

use crate::config::Config;

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub ok: bool,
    pub skipped: bool,
    pub detail: String,
    pub elapsed_ms: u64,
}

impl CheckResult {
    fn skipped(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            skipped: true,
            detail: detail.into(),
            elapsed_ms: 0,
        }
    }

    fn glyph(&self) -> &'static str {
        match (self.ok, self.skipped) {
            (true, _) => "✓",
            (false, true) => "-",
            (false, false) => "✗",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Setting {
    pub name: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub settings: Vec<Setting>,
    pub checks: Vec<CheckResult>,
}

impl DiagnosticReport {
    /// No configured check failed.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.ok || c.skipped)
    }

    pub fn lines(&self) -> Vec<String> {
        let width = self.settings.iter().map(|s| s.name.len()).max().unwrap_or(0);
        let mut lines = vec!["Configuration".to_string()];
        lines.extend(
            self.settings
                .iter()
                .map(|s| format!("  {:<width$}  {}", s.name, s.value)),
        );
        lines.push(String::new());
        lines.push("Checks".to_string());
        for check in &self.checks {
            let timing = if check.skipped {
                String::new()
            } else {
                format!(" ({} ms)", check.elapsed_ms)
            };
            lines.push(format!(
                "  {} {:<14} {}{timing}",
                check.glyph(),
                check.name,
                check.detail
            ));
        }
        lines
    }
}

/// Time `check`, which yields `Ok(detail)` or `Err(detail)`.
async fn timed<F>(name: &'static str, check: F) -> CheckResult
where
    F: Future<Output = Result<String, String>>,
{
    let start = Instant::now();
    let result = check.await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(detail) => tracing::debug!(check = name, elapsed_ms, %detail, "Check passed"),
        Err(detail) => tracing::warn!(check = name, elapsed_ms, %detail, "Check failed"),
    }
    let ok = result.is_ok();
    CheckResult {
        name,
        ok,
        skipped: false,
        detail: result.unwrap_or_else(|e| e),
        elapsed_ms,
    }
}

pub async fn run(config: &Config) -> DiagnosticReport {
    let (render, cloudinary, store, github, ffmpeg, ffprobe) = tokio::join!(
        check_render_api(config),
        check_cloudinary(config),
        check_object_store(config),
        check_github(config),
        check_tool("ffmpeg"),
        check_tool("ffprobe"),
    );

    DiagnosticReport {
        settings: config
            .summary()
            .into_iter()
            .map(|(name, value)| Setting { name, value })
            .collect(),
        checks: vec![render, cloudinary, store, github, ffmpeg, ffprobe],
    }
}

async fn check_render_api(config: &Config) -> CheckResult {
    timed("render_api", async {
        let api = RenderApi::new(&config.api_url, config.request_timeout)
            .map_err(|e| e.to_string())?
            .with_api_key(config.api_key.clone());
        let health = api.health().await.map_err(|e| e.to_string())?;
        let detail = format!("{} -> HTTP {}", api.base_url(), health.status_code);
        if health.is_healthy() {
            Ok(detail)
        } else {
            Err(detail)
        }
    })
    .await
}

async fn check_cloudinary(config: &Config) -> CheckResult {
    let Some(cloud) = &config.cloudinary else {
        return CheckResult::skipped("cloudinary", "CLOUDINARY_CLOUD_NAME not set");
    };
    let client = match CloudinaryClient::new(cloud.clone(), config.request_timeout) {
        Ok(client) => client,
        Err(e) => return CheckResult::skipped("cloudinary", e.to_string()),
    };
    if !client.can_sign() {
        return CheckResult::skipped(
            "cloudinary",
            "no API key/secret, admin API not checked",
        );
    }
    timed("cloudinary", async {
        client.ping().await.map_err(|e| e.to_string())?;
        Ok(format!("cloud {} reachable", cloud.cloud_name))
    })
    .await
}

async fn check_object_store(config: &Config) -> CheckResult {
    let Some(url) = &config.object_store_url else {
        return CheckResult::skipped("object_store", "TOURGEN_OBJECT_STORE_URL not set");
    };
    timed("object_store", async {
        let store = ObjectStoreClient::new(url.as_str(), config.request_timeout)
            .map_err(|e| e.to_string())?;
        // Any HTTP answer means the store is reachable; bucket roots often
        // refuse anonymous reads.
        match store.exists(store.base_url()).await {
            Ok(_) => Ok(format!("{} reachable", store.base_url())),
            Err(MediaError::ApiError { status, .. }) => {
                Ok(format!("{} reachable (HTTP {status})", store.base_url()))
            }
            Err(e) => Err(e.to_string()),
        }
    })
    .await
}

async fn check_github(config: &Config) -> CheckResult {
    let Some(repo) = &config.github.repository else {
        return CheckResult::skipped("github", "GITHUB_REPOSITORY not set");
    };
    timed("github", async {
        let client = ActionsClient::new(
            config.github.api_base.as_str(),
            repo.as_str(),
            config.github.token.clone(),
            config.request_timeout,
        )
        .map_err(|e| e.to_string())?;
        let filter = RunFilter {
            per_page: 1,
            ..Default::default()
        };
        let runs = client.list_runs(&filter).await.map_err(|e| e.to_string())?;
        Ok(match runs.first() {
            Some(run) => format!("{repo}: latest run {} {}", run.verdict().glyph(), run.title()),
            None => format!("{repo}: no runs"),
        })
    })
    .await
}

async fn check_tool(binary: &'static str) -> CheckResult {
    let start = Instant::now();
    match tool_version(binary).await {
        Ok(version) => CheckResult {
            name: binary,
            ok: true,
            skipped: false,
            detail: version,
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
        Err(FfmpegError::NotFound(_)) => CheckResult::skipped(binary, "not installed"),
        Err(e) => CheckResult {
            name: binary,
            ok: false,
            skipped: false,
            detail: e.to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
    }
}
