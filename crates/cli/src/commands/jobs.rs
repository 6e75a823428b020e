//! `submit`, `status`, `watch`, `run`, `download` and `probe`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::Serialize;
use tokio::sync::mpsc;

use tourgen_core::candidates::{MediaLocator, VideoSource};
use tourgen_core::types::{JobId, JobRequest, JobStatus, PropertyDetails};
use tourgen_core::validation::filename_from_url;
use tourgen_media::probe::{
    resolve_video_url, ProbeAttempt, ProbeOutcome, Resolution, UrlProber, DEFAULT_CONCURRENCY,
};
use tourgen_render::api::RenderApi;
use tourgen_render::events::PollEvent;
use tourgen_render::poller::{estimated_budget, JobPoller, PollOutcome};

use super::Context;
use crate::args::{JobInput, ProbeArgs, WatchOptions};
use crate::config::{Config, ConfigError};
use crate::exit::Exit;
use crate::output::format_bytes;

pub fn render_api(config: &Config) -> anyhow::Result<RenderApi> {
    Ok(RenderApi::new(&config.api_url, config.request_timeout)?
        .with_api_key(config.api_key.clone()))
}

/// Build the request from `--request FILE` or from the individual flags.
pub fn build_request(input: &JobInput) -> anyhow::Result<JobRequest> {
    if let Some(path) = &input.request {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()));
    }

    Ok(JobRequest {
        images: input
            .images
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        property: PropertyDetails {
            address: input.address.clone().unwrap_or_default(),
            price: input.price.clone(),
            bedrooms: input.bedrooms,
            bathrooms: input.bathrooms,
            area_sqft: input.area_sqft,
            description: input.description.clone(),
            agent_name: input.agent_name.clone(),
            agent_phone: input.agent_phone.clone(),
            agent_email: input.agent_email.clone(),
            ..Default::default()
        },
    })
}

pub async fn submit(ctx: &Context, input: &JobInput) -> anyhow::Result<Exit> {
    let request = build_request(input)?;
    let response = render_api(&ctx.config)?.submit_job(&request).await?;
    ctx.out.emit(&response, || {
        let mut lines = vec![format!("Job submitted: {}", response.job_id)];
        if let Some(status) = &response.status {
            lines.push(format!("  status:  {status}"));
        }
        if let Some(message) = &response.message {
            lines.push(format!("  message: {message}"));
        }
        if let Some(url) = &response.video_url {
            lines.push(format!("  video:   {url}"));
        }
        lines
    })?;
    Ok(Exit::Success)
}

pub async fn status(ctx: &Context, job: &str) -> anyhow::Result<Exit> {
    let job_id = JobId::new(job)?;
    let report = render_api(&ctx.config)?.job_status(&job_id).await?;
    let state = report.state();

    #[derive(Serialize)]
    struct StatusOutput<'a> {
        job_id: &'a str,
        report: &'a tourgen_core::types::StatusReport,
        state: &'a tourgen_core::types::JobState,
    }

    let body = StatusOutput {
        job_id: job_id.as_str(),
        report: &report,
        state: &state,
    };
    ctx.out.emit(&body, || {
        let mut lines = vec![format!("Job {job_id}: {}", report.status)];
        if let Some(progress) = report.progress {
            lines.push(format!("  progress: {progress}%"));
        }
        if let Some(url) = report.result_url() {
            lines.push(format!("  video:    {url}"));
        }
        if let Some(error) = &report.error {
            lines.push(format!("  error:    {error}"));
        }
        lines
    })?;
    Ok(Exit::Success)
}

#[derive(Debug, Serialize)]
pub struct DownloadInfo {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct WatchReport {
    pub job_id: String,
    pub outcome: PollOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSource>,
    /// `video` answered a request. A URL reported by the service is kept
    /// even when it did not.
    pub verified: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadInfo>,
}

impl WatchReport {
    /// Exit status: the poll outcome, unless probing found the video of a
    /// job that finished without reporting one.
    pub fn exit(&self) -> Exit {
        match (&self.outcome, &self.video) {
            (PollOutcome::TimedOut { .. }, Some(_)) if self.verified => Exit::Success,
            (outcome, _) => Exit::from_outcome(outcome),
        }
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.outcome {
            PollOutcome::Succeeded {
                video_url,
                attempts,
                elapsed_ms,
            } => {
                lines.push(format!(
                    "Job {} completed after {attempts} attempt(s) in {:.1}s",
                    self.job_id,
                    *elapsed_ms as f64 / 1000.0
                ));
                if self.video.as_ref().map(VideoSource::url) != Some(video_url.as_str()) {
                    lines.push(format!("  reported: {video_url}"));
                }
            }
            PollOutcome::Failed { reason, attempts } => lines.push(format!(
                "Job {} failed after {attempts} attempt(s): {reason}",
                self.job_id
            )),
            PollOutcome::TimedOut { attempts, last_status, .. } => lines.push(format!(
                "Job {} still {} after {attempts} attempt(s)",
                self.job_id,
                last_status
                    .as_ref()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unreachable".to_string())
            )),
            PollOutcome::Cancelled { attempts } => lines.push(format!(
                "Cancelled after {attempts} attempt(s)"
            )),
        }
        match &self.video {
            Some(VideoSource::Canonical(url)) if !self.verified => lines.push(format!(
                "  video:    {url} (not verified, {} URL(s) probed)",
                self.probes.len()
            )),
            Some(VideoSource::Canonical(url)) => lines.push(format!("  video:    {url}")),
            Some(VideoSource::Probed(url)) => {
                lines.push(format!("  video:    {url} (found by probing)"))
            }
            None if !self.probes.is_empty() => lines.push(format!(
                "  video:    not found ({} URL(s) probed)",
                self.probes.len()
            )),
            None => {}
        }
        if let Some(download) = &self.download {
            lines.push(format!(
                "  saved:    {} ({})",
                download.path.display(),
                format_bytes(download.bytes)
            ));
        }
        lines
    }
}

/// Poll `job` to the end and locate its video.
///
/// `announced` is the canonical URL the service gave at submission, if
/// any. It is checked before any delivery candidate is guessed.
pub async fn watch(
    ctx: &Context,
    job: &str,
    options: &WatchOptions,
    announced: Option<&str>,
) -> anyhow::Result<Exit> {
    let job_id = JobId::new(job)?;
    let report = watch_job(ctx, &job_id, options, announced).await?;
    ctx.out.emit(&report, || report.lines())?;
    Ok(report.exit())
}

pub async fn run(ctx: &Context, input: &JobInput, options: &WatchOptions) -> anyhow::Result<Exit> {
    let request = build_request(input)?;
    let response = render_api(&ctx.config)?.submit_job(&request).await?;
    match &response.video_url {
        Some(url) => ctx
            .out
            .note(format!("Job submitted: {} (video at {url})", response.job_id)),
        None => ctx.out.note(format!("Job submitted: {}", response.job_id)),
    }
    watch(
        ctx,
        response.job_id.as_str(),
        options,
        response.video_url.as_deref(),
    )
    .await
}

pub async fn download(ctx: &Context, job: &str, out: &Path) -> anyhow::Result<Exit> {
    let job_id = JobId::new(job)?;
    let dest = download_target(out, &format!("{job_id}.mp4")).await;
    let bytes = render_api(&ctx.config)?.download_video(&job_id, &dest).await?;
    let info = DownloadInfo { path: dest, bytes };
    ctx.out.emit(&info, || {
        vec![format!("Saved {} ({})", info.path.display(), format_bytes(info.bytes))]
    })?;
    Ok(Exit::Success)
}

pub async fn probe(ctx: &Context, args: &ProbeArgs) -> anyhow::Result<Exit> {
    let job_id = JobId::new(&args.job)?;
    let public_id = args.public_id.as_deref().unwrap_or(job_id.as_str());
    let locator = match &ctx.config.cloudinary {
        Some(_) => Some(locator_for(&ctx.config, public_id)?.with_versions(args.versions.clone())),
        None if args.canonical.is_some() => None,
        None => return Err(ConfigError::Missing("CLOUDINARY_CLOUD_NAME").into()),
    };

    let prober = UrlProber::with_timeout(ctx.config.request_timeout, args.concurrency)?;
    let resolution = resolve_video_url(&prober, args.canonical.as_deref(), locator.as_ref()).await;

    ctx.out.emit(&resolution, || probe_lines(&resolution))?;
    Ok(if resolution.source.is_some() {
        Exit::Success
    } else {
        Exit::Error
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// [`watch`] without printing the report.
pub async fn watch_job(
    ctx: &Context,
    job_id: &JobId,
    options: &WatchOptions,
    announced: Option<&str>,
) -> anyhow::Result<WatchReport> {
    let api = render_api(&ctx.config)?;
    let mut policy = ctx.config.poll.clone();
    if let Some(secs) = options.deadline_secs {
        policy = policy.with_deadline(Duration::from_secs(secs));
    }
    let budget = estimated_budget(&policy);
    tracing::info!(
        job_id = %job_id,
        max_attempts = policy.max_attempts,
        budget_secs = budget.as_secs(),
        "Watching job"
    );
    ctx.out.note(format!(
        "Watching job {job_id}: up to {} attempt(s), about {}s",
        policy.max_attempts,
        budget.as_secs()
    ));

    let (tx, mut rx) = mpsc::channel::<PollEvent>(32);
    let poller = JobPoller::new(api.clone(), policy)?.with_events(tx);
    let out = ctx.out;
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = describe_event(&event) {
                out.note(line);
            }
        }
    });

    let polled = poller.poll(job_id, &ctx.cancel).await;
    drop(poller);
    let _ = printer.await;
    let outcome = polled?;

    let mut report = WatchReport {
        job_id: job_id.to_string(),
        outcome,
        video: None,
        verified: false,
        probes: Vec::new(),
        download: None,
    };

    // After a timeout the video may still exist: the service announced
    // where it would land, or says "completed" without handing out a URL.
    let announced = announced.map(str::trim).filter(|u| !u.is_empty());
    let canonical = match &report.outcome {
        PollOutcome::Succeeded { video_url, .. } => Some(Some(video_url.as_str())),
        PollOutcome::TimedOut { .. } if announced.is_some() => Some(announced),
        PollOutcome::TimedOut {
            last_status: Some(JobStatus::Completed),
            ..
        } if !options.no_probe => Some(None),
        _ => None,
    };
    let Some(canonical) = canonical else {
        return Ok(report);
    };

    let resolution = resolve(ctx, job_id, canonical, options.no_probe).await?;
    report.probes = resolution.attempts;
    report.verified = resolution.source.is_some();
    report.video = match (resolution.source, &report.outcome) {
        (Some(source), _) => Some(source),
        (None, PollOutcome::Succeeded { video_url, .. }) => {
            tracing::warn!(
                job_id = %job_id,
                url = %video_url,
                "Reported video URL did not answer, keeping it unverified"
            );
            Some(VideoSource::Canonical(video_url.clone()))
        }
        (None, _) => None,
    };

    let Some(dest) = &options.download else {
        return Ok(report);
    };
    let succeeded = matches!(report.outcome, PollOutcome::Succeeded { .. });
    let download = match &report.video {
        Some(source) => {
            let dest = download_target(dest, &filename_from_url(source.url())).await;
            let bytes = api.download_url(source.url(), &dest).await?;
            Some(DownloadInfo { path: dest, bytes })
        }
        None if succeeded => {
            let dest = download_target(dest, &format!("{job_id}.mp4")).await;
            let bytes = api.download_video(job_id, &dest).await?;
            Some(DownloadInfo { path: dest, bytes })
        }
        None => None,
    };
    report.download = download;
    Ok(report)
}

/// `dest` itself, or `dest/<filename>` when `dest` is an existing directory.
async fn download_target(dest: &Path, filename: &str) -> PathBuf {
    match tokio::fs::metadata(dest).await {
        Ok(meta) if meta.is_dir() => dest.join(filename),
        _ => dest.to_path_buf(),
    }
}

async fn resolve(
    ctx: &Context,
    job_id: &JobId,
    canonical: Option<&str>,
    no_probe: bool,
) -> anyhow::Result<Resolution> {
    let locator = match (&ctx.config.cloudinary, no_probe) {
        (Some(_), false) => Some(locator_for(&ctx.config, job_id.as_str())?),
        _ => None,
    };
    let prober = UrlProber::with_timeout(ctx.config.request_timeout, DEFAULT_CONCURRENCY)?;
    Ok(resolve_video_url(&prober, canonical, locator.as_ref()).await)
}

fn locator_for(config: &Config, public_id: &str) -> Result<MediaLocator, ConfigError> {
    let cloud = config.require_cloudinary()?;
    Ok(MediaLocator::for_video(cloud.cloud_name.clone(), public_id)
        .with_folders(config.media_folders.clone())
        .with_delivery_base(cloud.delivery_base.clone()))
}

fn describe_event(event: &PollEvent) -> Option<String> {
    match event {
        PollEvent::Attempt { .. } | PollEvent::Finished { .. } => None,
        PollEvent::Progress {
            job_id,
            status,
            progress,
        } => Some(match progress {
            Some(p) => format!("[{job_id}] {status} {p}%"),
            None => format!("[{job_id}] {status}"),
        }),
        PollEvent::TransientError {
            job_id,
            attempt,
            error,
        } => Some(format!("[{job_id}] attempt {attempt} failed, retrying: {error}")),
    }
}

pub fn probe_lines(resolution: &Resolution) -> Vec<String> {
    let mut lines: Vec<String> = resolution
        .attempts
        .iter()
        .map(|attempt| match &attempt.outcome {
            ProbeOutcome::Found { status } => format!("  ✓ {status} {}", attempt.url),
            ProbeOutcome::Missing { status } => format!("  ✗ {status} {}", attempt.url),
            ProbeOutcome::Error { message } => format!("  ! {} ({message})", attempt.url),
        })
        .collect();
    match &resolution.source {
        Some(source) => lines.push(format!("Resolved: {}", source.url())),
        None => lines.push("No URL resolved".to_string()),
    }
    lines
}
