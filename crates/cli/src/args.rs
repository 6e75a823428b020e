//! Command-line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "tourgen")]
#[command(version)]
#[command(about = "Diagnostics toolkit for the virtual tour video service")]
#[command(after_help = concat!(
    "Environment:\n",
    "  TOURGEN_API_URL        Rendering service base URL\n",
    "  CLOUDINARY_CLOUD_NAME  Media host cloud\n",
    "  GITHUB_REPOSITORY      owner/name of the render workflow repository\n",
    "  RUST_LOG               Log filter (default tourgen=info)",
))]
pub struct Cli {
    /// Print machine-readable JSON on stdout.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
    /// Log output format; overrides TOURGEN_LOG_FORMAT.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a render job and print its id.
    Submit(JobInput),
    /// Fetch a job's status once.
    Status { job: String },
    /// Poll a job until it finishes, then locate its video.
    Watch(WatchArgs),
    /// Submit a job and watch it.
    Run {
        #[command(flatten)]
        input: JobInput,
        #[command(flatten)]
        watch: WatchOptions,
    },
    /// Download a finished video through the service.
    Download {
        job: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Resolve a job's video URL and print every probe.
    Probe(ProbeArgs),
    /// Media host operations.
    Media {
        #[command(subcommand)]
        command: MediaCommand,
    },
    /// Object store operations.
    Store {
        #[command(subcommand)]
        command: StoreCommand,
    },
    /// CI provider operations.
    Ci {
        #[command(subcommand)]
        command: CiCommand,
    },
    /// Local test fixtures.
    Fixtures {
        #[command(subcommand)]
        command: FixturesCommand,
    },
    /// Check every configured collaborator.
    Diagnose,
}

/// A job request from a JSON file or from flags.
#[derive(Debug, Clone, Args)]
pub struct JobInput {
    /// JSON file with `images` and `property`.
    #[arg(long, conflicts_with_all = ["images", "address"])]
    pub request: Option<PathBuf>,
    /// Comma-separated image URLs.
    #[arg(long, value_delimiter = ',')]
    pub images: Vec<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub price: Option<String>,
    #[arg(long)]
    pub bedrooms: Option<u32>,
    #[arg(long)]
    pub bathrooms: Option<f32>,
    #[arg(long)]
    pub area_sqft: Option<u32>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub agent_name: Option<String>,
    #[arg(long)]
    pub agent_phone: Option<String>,
    #[arg(long)]
    pub agent_email: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct WatchOptions {
    /// Save the video here once it is available.
    #[arg(long)]
    pub download: Option<PathBuf>,
    /// Give up after this many seconds regardless of attempts left.
    #[arg(long)]
    pub deadline_secs: Option<u64>,
    /// Skip candidate probing when the service gives no URL.
    #[arg(long, default_value_t = false)]
    pub no_probe: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    pub job: String,
    #[command(flatten)]
    pub options: WatchOptions,
}

#[derive(Debug, Clone, Args)]
pub struct ProbeArgs {
    pub job: String,
    /// URL reported by the service, checked before any candidate.
    #[arg(long)]
    pub canonical: Option<String>,
    /// Public id to probe for; defaults to the job id.
    #[arg(long)]
    pub public_id: Option<String>,
    /// Version tokens to try after the unversioned URL.
    #[arg(long = "version-token", value_delimiter = ',')]
    pub versions: Vec<u64>,
    #[arg(long, default_value_t = tourgen_media::probe::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

#[derive(Debug, Subcommand)]
pub enum MediaCommand {
    Upload {
        file: PathBuf,
        #[arg(long)]
        public_id: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        /// Upload as a video resource.
        #[arg(long, default_value_t = false)]
        video: bool,
    },
    List {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// List images instead of videos.
        #[arg(long, default_value_t = false)]
        images: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    Put {
        file: PathBuf,
        #[arg(long)]
        key: String,
    },
    Get {
        key: String,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum CiCommand {
    Runs {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Only runs mentioning this render job id.
        #[arg(long)]
        job: Option<String>,
    },
    Jobs { run: u64 },
    Logs {
        run: u64,
        /// Show only lines with error markers.
        #[arg(long, default_value_t = false)]
        errors: bool,
        #[arg(long)]
        grep: Vec<String>,
        /// Last N lines of each file.
        #[arg(long)]
        tail: Option<usize>,
    },
    Artifacts {
        run: u64,
        /// Artifact id to download.
        #[arg(long, requires = "out")]
        download: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Dispatch {
        workflow: String,
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,
        /// `key=value`, repeatable.
        #[arg(long = "input", value_parser = parse_key_value)]
        inputs: Vec<(String, String)>,
    },
}

#[derive(Debug, Subcommand)]
pub enum FixturesCommand {
    Images {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
        #[arg(long, default_value_t = false)]
        jpeg: bool,
    },
    Video {
        #[arg(long)]
        out: PathBuf,
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long, default_value_t = 3.0)]
        secs_per_image: f32,
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },
    Inspect { file: PathBuf },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::try_parse_from([
            "tourgen",
            "--json",
            "run",
            "--images",
            "https://a/1.jpg,https://a/2.jpg",
            "--address",
            "1 Main St",
            "--download",
            "out.mp4",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Run { input, watch } => {
                assert_eq!(input.images.len(), 2);
                assert_eq!(input.address.as_deref(), Some("1 Main St"));
                assert_eq!(watch.download, Some(PathBuf::from("out.mp4")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn request_file_conflicts_with_flags() {
        let result = Cli::try_parse_from([
            "tourgen", "submit", "--request", "job.json", "--address", "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn dispatch_inputs_are_key_values() {
        let cli = Cli::try_parse_from([
            "tourgen", "ci", "dispatch", "render.yml", "--input", "job_id=abc", "--input",
            "quality=high",
        ])
        .unwrap();
        match cli.command {
            Command::Ci {
                command: CiCommand::Dispatch { git_ref, inputs, .. },
            } => {
                assert_eq!(git_ref, "main");
                assert_eq!(inputs[0], ("job_id".to_string(), "abc".to_string()));
                assert_eq!(inputs.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(parse_key_value("novalue").is_err());
    }
}
