//! FFmpeg/FFprobe wrappers for local video fixtures.
//!
//! Encodes ordered stills into a slideshow mp4 (a stand-in for a rendered
//! tour when the remote service is unavailable) and inspects videos the
//! service produced.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),

    #[error("no input images given")]
    NoInputs,
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
    pub format_name: Option<String>,
}

/// Condensed view of a probed video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSummary {
    pub duration_secs: f64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub framerate: Option<f64>,
    pub video_codec: Option<String>,
    pub has_audio: bool,
    pub size_bytes: Option<u64>,
    pub container: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::VideoNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout)
}

/// Parse raw ffprobe JSON.
pub fn parse_probe_output(raw: &str) -> Result<FfprobeOutput, FfmpegError> {
    serde_json::from_str::<FfprobeOutput>(raw)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {raw}")))
}

/// Encode `images` into an H.264 slideshow at `output`.
///
/// Every still is shown for `secs_per_image`. The concat list is written
/// next to `output` and removed afterwards, whether or not ffmpeg succeeds.
pub async fn encode_slideshow(
    images: &[PathBuf],
    output: &Path,
    secs_per_image: f32,
    fps: u32,
) -> Result<(), FfmpegError> {
    if images.is_empty() {
        return Err(FfmpegError::NoInputs);
    }
    for image in images {
        if !image.exists() {
            return Err(FfmpegError::VideoNotFound(
                image.to_string_lossy().to_string(),
            ));
        }
    }

    let mut absolute = Vec::with_capacity(images.len());
    for image in images {
        absolute.push(tokio::fs::canonicalize(image).await?);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let list_path = output.with_extension("concat.txt");
    tokio::fs::write(&list_path, concat_list(&absolute, secs_per_image)).await?;

    tracing::info!(
        images = images.len(),
        output = %output.display(),
        secs_per_image,
        fps,
        "Encoding slideshow",
    );

    let result = tokio::process::Command::new("ffmpeg")
        .args(slideshow_args(&list_path, output, fps))
        .output()
        .await;

    if let Err(e) = tokio::fs::remove_file(&list_path).await {
        tracing::warn!(path = %list_path.display(), error = %e, "Failed to remove concat list");
    }

    let output = result.map_err(FfmpegError::NotFound)?;
    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(())
}

/// First line of `<binary> -version`, e.g. `ffmpeg version 6.1.1 ...`.
pub async fn tool_version(binary: &str) -> Result<String, FfmpegError> {
    let output = tokio::process::Command::new(binary)
        .arg("-version")
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

// ---------------------------------------------------------------------------
// Command construction
// ---------------------------------------------------------------------------

/// Concat-demuxer script for a slideshow.
///
/// The last file is listed twice: the demuxer ignores the final
/// `duration` directive otherwise.
pub fn concat_list(images: &[PathBuf], secs_per_image: f32) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for image in images {
        list.push_str(&format!("file '{}'\n", escape_concat_path(image)));
        list.push_str(&format!("duration {secs_per_image:.3}\n"));
    }
    if let Some(last) = images.last() {
        list.push_str(&format!("file '{}'\n", escape_concat_path(last)));
    }
    list
}

fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// ffmpeg arguments for encoding a concat list.
pub fn slideshow_args(list_path: &Path, output: &Path, fps: u32) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_path.to_string_lossy().to_string(),
        // libx264 with yuv420p needs even dimensions.
        "-vf".to_string(),
        "scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p".to_string(),
        "-r".to_string(),
        fps.max(1).to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse the duration from probe output (format-level, falling back to the
/// first video stream).
pub fn duration_secs(probe: &FfprobeOutput) -> f64 {
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            video_stream(probe)
                .and_then(|s| s.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .unwrap_or(0.0)
}

/// Parse the framerate of the first video stream from an `"N/D"` fraction.
pub fn framerate(probe: &FfprobeOutput) -> Option<f64> {
    let raw = video_stream(probe)?.r_frame_rate.as_deref()?;
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Width and height of the first video stream.
pub fn video_dimensions(probe: &FfprobeOutput) -> Option<(i32, i32)> {
    let stream = video_stream(probe)?;
    Some((stream.width?, stream.height?))
}

fn video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Condense probe output for display.
pub fn summarize(probe: &FfprobeOutput) -> VideoSummary {
    let video = video_stream(probe);
    VideoSummary {
        duration_secs: duration_secs(probe),
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        framerate: framerate(probe),
        video_codec: video.and_then(|s| s.codec_name.clone()),
        has_audio: probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
        size_bytes: probe.format.size.as_deref().and_then(|s| s.parse().ok()),
        container: probe.format.format_name.clone(),
    }
}
