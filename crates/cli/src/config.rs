//! Environment configuration.
//!
//! | Variable                          | Default                  |
//! |-----------------------------------|--------------------------|
//! | `TOURGEN_API_URL`                 | `http://localhost:8000`  |
//! | `TOURGEN_API_KEY`                 | --                       |
//! | `TOURGEN_REQUEST_TIMEOUT_SECS`    | `30`                     |
//! | `TOURGEN_POLL_MAX_ATTEMPTS`       | `30`                     |
//! | `TOURGEN_POLL_INITIAL_DELAY_SECS` | `5`                      |
//! | `TOURGEN_POLL_MAX_DELAY_SECS`     | `30`                     |
//! | `TOURGEN_POLL_MULTIPLIER`         | `1.5`                    |
//! | `TOURGEN_POLL_JITTER`             | `0.1`                    |
//! | `CLOUDINARY_CLOUD_NAME`           | --                       |
//! | `CLOUDINARY_API_KEY`              | --                       |
//! | `CLOUDINARY_API_SECRET`           | --                       |
//! | `CLOUDINARY_UPLOAD_PRESET`        | --                       |
//! | `TOURGEN_MEDIA_FOLDERS`           | `,virtual_tours,videos`  |
//! | `TOURGEN_OBJECT_STORE_URL`        | --                       |
//! | `GITHUB_TOKEN`                    | --                       |
//! | `GITHUB_REPOSITORY`               | --                       |
//! | `GITHUB_API_URL`                  | `https://api.github.com` |
//! | `TOURGEN_LOG_FORMAT`              | `text`                   |

use std::str::FromStr;
use std::time::Duration;

use tourgen_ci::client::DEFAULT_API_BASE as GITHUB_API_BASE;
use tourgen_core::candidates::DEFAULT_FOLDERS;
use tourgen_core::error::CoreError;
use tourgen_core::redact::redact_opt;
use tourgen_core::retry::PollPolicy;
use tourgen_media::cloudinary::CloudinaryConfig;

use crate::logging::LogFormat;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("Invalid poll policy: {0}")]
    Policy(#[from] CoreError),
}

/// GitHub Actions settings.
#[derive(Clone)]
pub struct GithubConfig {
    pub api_base: String,
    pub repository: Option<String>,
    pub token: Option<String>,
}

#[derive(Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub poll: PollPolicy,
    pub cloudinary: Option<CloudinaryConfig>,
    pub media_folders: Vec<String>,
    pub object_store_url: Option<String>,
    pub github: GithubConfig,
    pub log_format: LogFormat,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = PollPolicy::default();
        let poll = PollPolicy {
            max_attempts: parse_or(&get, "TOURGEN_POLL_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_delay: parse_secs(
                &get,
                "TOURGEN_POLL_INITIAL_DELAY_SECS",
                defaults.initial_delay,
            )?,
            max_delay: parse_secs(&get, "TOURGEN_POLL_MAX_DELAY_SECS", defaults.max_delay)?,
            multiplier: parse_or(&get, "TOURGEN_POLL_MULTIPLIER", defaults.multiplier)?,
            jitter: parse_or(&get, "TOURGEN_POLL_JITTER", defaults.jitter)?,
            deadline: None,
        };
        poll.validate()?;

        let request_timeout_secs: u64 = parse_or(&get, "TOURGEN_REQUEST_TIMEOUT_SECS", 30)?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "TOURGEN_REQUEST_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        let cloudinary = get("CLOUDINARY_CLOUD_NAME").map(|cloud| {
            CloudinaryConfig::new(cloud)
                .with_credentials(get("CLOUDINARY_API_KEY"), get("CLOUDINARY_API_SECRET"))
                .with_upload_preset(get("CLOUDINARY_UPLOAD_PRESET"))
        });

        // An explicitly empty list still means "root only"; unset means defaults.
        let media_folders = match lookup("TOURGEN_MEDIA_FOLDERS") {
            Some(raw) => raw.split(',').map(|f| f.trim().to_string()).collect(),
            None => DEFAULT_FOLDERS.iter().map(|f| f.to_string()).collect(),
        };

        let log_format = match get("TOURGEN_LOG_FORMAT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "TOURGEN_LOG_FORMAT",
                value: raw,
            })?,
            None => LogFormat::Text,
        };

        Ok(Self {
            api_url: get("TOURGEN_API_URL").unwrap_or_else(|| "http://localhost:8000".to_string()),
            api_key: get("TOURGEN_API_KEY"),
            request_timeout: Duration::from_secs(request_timeout_secs),
            poll,
            cloudinary,
            media_folders,
            object_store_url: get("TOURGEN_OBJECT_STORE_URL"),
            github: GithubConfig {
                api_base: get("GITHUB_API_URL").unwrap_or_else(|| GITHUB_API_BASE.to_string()),
                repository: get("GITHUB_REPOSITORY"),
                token: get("GITHUB_TOKEN"),
            },
            log_format,
        })
    }

    pub fn require_cloudinary(&self) -> Result<&CloudinaryConfig, ConfigError> {
        self.cloudinary
            .as_ref()
            .ok_or(ConfigError::Missing("CLOUDINARY_CLOUD_NAME"))
    }

    pub fn require_object_store(&self) -> Result<&str, ConfigError> {
        self.object_store_url
            .as_deref()
            .ok_or(ConfigError::Missing("TOURGEN_OBJECT_STORE_URL"))
    }

    pub fn require_repository(&self) -> Result<&str, ConfigError> {
        self.github
            .repository
            .as_deref()
            .ok_or(ConfigError::Missing("GITHUB_REPOSITORY"))
    }

    /// Settings as printable pairs, with credentials redacted.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let cloud = self.cloudinary.as_ref();
        vec![
            ("api_url", self.api_url.clone()),
            ("api_key", redact_opt(self.api_key.as_deref())),
            ("request_timeout_secs", self.request_timeout.as_secs().to_string()),
            ("poll_max_attempts", self.poll.max_attempts.to_string()),
            (
                "poll_delay",
                format!(
                    "{:?}..{:?} x{}",
                    self.poll.initial_delay, self.poll.max_delay, self.poll.multiplier
                ),
            ),
            (
                "cloudinary_cloud",
                cloud.map(|c| c.cloud_name.clone()).unwrap_or_else(|| "(not set)".to_string()),
            ),
            (
                "cloudinary_api_key",
                redact_opt(cloud.and_then(|c| c.api_key.as_deref())),
            ),
            (
                "cloudinary_api_secret",
                redact_opt(cloud.and_then(|c| c.api_secret.as_deref())),
            ),
            (
                "cloudinary_upload_preset",
                cloud
                    .and_then(|c| c.upload_preset.clone())
                    .unwrap_or_else(|| "(not set)".to_string()),
            ),
            ("media_folders", format!("{:?}", self.media_folders)),
            (
                "object_store_url",
                self.object_store_url.clone().unwrap_or_else(|| "(not set)".to_string()),
            ),
            ("github_api_url", self.github.api_base.clone()),
            (
                "github_repository",
                self.github.repository.clone().unwrap_or_else(|| "(not set)".to_string()),
            ),
            ("github_token", redact_opt(self.github.token.as_deref())),
        ]
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

/// Fractional seconds; negative or non-finite values are invalid.
fn parse_secs<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or(ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.poll.max_attempts, 30);
        assert_eq!(config.poll.initial_delay, Duration::from_secs(5));
        assert_eq!(config.media_folders, ["", "virtual_tours", "videos"]);
        assert_eq!(config.github.api_base, "https://api.github.com");
        assert!(config.cloudinary.is_none());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("TOURGEN_API_URL", "https://tours.example.com"),
            ("TOURGEN_POLL_MAX_ATTEMPTS", "12"),
            ("TOURGEN_POLL_INITIAL_DELAY_SECS", "0.5"),
            ("TOURGEN_MEDIA_FOLDERS", "renders, archive"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_UPLOAD_PRESET", "unsigned"),
            ("TOURGEN_LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.api_url, "https://tours.example.com");
        assert_eq!(config.poll.max_attempts, 12);
        assert_eq!(config.poll.initial_delay, Duration::from_millis(500));
        assert_eq!(config.media_folders, ["renders", "archive"]);
        assert_eq!(config.require_cloudinary().unwrap().upload_preset.as_deref(), Some("unsigned"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_number_is_invalid() {
        let err = load(&[("TOURGEN_POLL_MAX_ATTEMPTS", "lots")]).err().expect("invalid config");
        assert_matches!(
            err,
            ConfigError::Invalid { var: "TOURGEN_POLL_MAX_ATTEMPTS", ref value } if value == "lots"
        );
    }

    #[test]
    fn negative_delay_is_invalid() {
        let err = load(&[("TOURGEN_POLL_MAX_DELAY_SECS", "-3")]).err().expect("invalid config");
        assert_matches!(err, ConfigError::Invalid { var: "TOURGEN_POLL_MAX_DELAY_SECS", .. });
    }

    #[test]
    fn inconsistent_policy_is_rejected() {
        let err = load(&[("TOURGEN_POLL_MULTIPLIER", "0.5")]).err().expect("invalid config");
        assert_matches!(err, ConfigError::Policy(_));
    }

    #[test]
    fn missing_sections_are_reported_by_name() {
        let config = load(&[]).unwrap();
        assert_matches!(
            config.require_repository(),
            Err(ConfigError::Missing("GITHUB_REPOSITORY"))
        );
        assert_matches!(
            config.require_object_store(),
            Err(ConfigError::Missing("TOURGEN_OBJECT_STORE_URL"))
        );
    }

    #[test]
    fn summary_redacts_credentials() {
        let config = load(&[
            ("TOURGEN_API_KEY", "sk-live-0123456789abcdef"),
            ("GITHUB_TOKEN", "ghp_aaaaaaaaaaaaaaaaWXYZ"),
        ])
        .unwrap();
        let text = format!("{:?}", config.summary());
        assert!(!text.contains("sk-live"));
        assert!(text.contains("...cdef"));
        assert!(text.contains("...WXYZ"));
    }
}
