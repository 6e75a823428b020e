//! Locate a rendered video by probing its possible delivery URLs.
//!
//! The canonical URL from the rendering service always wins when it
//! resolves. Otherwise the candidate list from
//! [`tourgen_core::candidates::candidate_urls`] is probed with `HEAD`
//! requests, a few at a time, and the first hit in list order is taken.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use tourgen_core::candidates::{candidate_urls, MediaLocator, VideoSource};

use crate::host::MediaError;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// What one probe saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Found { status: u16 },
    Missing { status: u16 },
    Error { message: String },
}

impl ProbeOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeAttempt {
    pub url: String,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub found: Option<String>,
    pub attempts: Vec<ProbeAttempt>,
}

/// Result of [`resolve_video_url`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    pub source: Option<VideoSource>,
    pub attempts: Vec<ProbeAttempt>,
}

pub struct UrlProber {
    client: reqwest::Client,
    concurrency: usize,
}

impl UrlProber {
    pub fn new(client: reqwest::Client, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    pub fn with_timeout(timeout: Duration, concurrency: usize) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tourgen/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(client, concurrency))
    }

    /// Probe a single URL.
    ///
    /// Hosts that refuse `HEAD` (403/405/501) get a one-byte ranged `GET`.
    /// Signed CDN URLs are often only valid for `GET`.
    pub async fn probe_one(&self, url: &str) -> ProbeOutcome {
        let head = match self.client.head(url).send().await {
            Ok(response) => response.status(),
            Err(e) => return ProbeOutcome::Error { message: e.to_string() },
        };
        let status = if matches!(
            head,
            reqwest::StatusCode::FORBIDDEN
                | reqwest::StatusCode::METHOD_NOT_ALLOWED
                | reqwest::StatusCode::NOT_IMPLEMENTED
        ) {
            match self
                .client
                .get(url)
                .header(reqwest::header::RANGE, "bytes=0-0")
                .send()
                .await
            {
                Ok(response) => response.status(),
                Err(e) => return ProbeOutcome::Error { message: e.to_string() },
            }
        } else {
            head
        };

        if status.is_success() {
            ProbeOutcome::Found { status: status.as_u16() }
        } else {
            ProbeOutcome::Missing { status: status.as_u16() }
        }
    }

    /// Probe `candidates` and report the first one that resolves.
    ///
    /// At most `concurrency` requests are in flight. Results are consumed
    /// in candidate order, so a later candidate answering first never
    /// beats an earlier one. Once a hit is seen the remaining requests are
    /// dropped.
    pub async fn probe(&self, candidates: &[String]) -> ProbeReport {
        let mut results = stream::iter(candidates.iter())
            .map(|url| async move { (url.clone(), self.probe_one(url).await) })
            .buffered(self.concurrency);

        let mut report = ProbeReport::default();
        while let Some((url, outcome)) = results.next().await {
            tracing::debug!(url = %url, outcome = ?outcome, "Probed candidate");
            let found = outcome.is_found();
            report.attempts.push(ProbeAttempt {
                url: url.clone(),
                outcome,
            });
            if found {
                report.found = Some(url);
                break;
            }
        }
        report
    }
}

/// Find the video: canonical URL first, then delivery candidates.
///
/// A canonical URL that does not resolve is recorded as an attempt and
/// the candidates are tried next.
pub async fn resolve_video_url(
    prober: &UrlProber,
    canonical: Option<&str>,
    locator: Option<&MediaLocator>,
) -> Resolution {
    let mut resolution = Resolution::default();

    if let Some(url) = canonical.map(str::trim).filter(|u| !u.is_empty()) {
        let outcome = prober.probe_one(url).await;
        let found = outcome.is_found();
        resolution.attempts.push(ProbeAttempt {
            url: url.to_string(),
            outcome,
        });
        if found {
            tracing::info!(url, "Canonical video URL resolves");
            resolution.source = Some(VideoSource::Canonical(url.to_string()));
            return resolution;
        }
        tracing::warn!(url, "Canonical video URL did not resolve, probing candidates");
    }

    let Some(locator) = locator else {
        return resolution;
    };

    let candidates = candidate_urls(locator);
    tracing::info!(
        count = candidates.len(),
        public_id = %locator.public_id,
        "Probing candidate URLs"
    );
    let report = prober.probe(&candidates).await;
    resolution.attempts.extend(report.attempts);
    resolution.source = report.found.map(VideoSource::Probed);
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_serializes_flat() {
        let attempt = ProbeAttempt {
            url: "https://x/y.mp4".to_string(),
            outcome: ProbeOutcome::Missing { status: 404 },
        };
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["url"], "https://x/y.mp4");
        assert_eq!(json["outcome"], "missing");
        assert_eq!(json["status"], 404);
    }

    #[test]
    fn zero_concurrency_is_raised_to_one() {
        let prober = UrlProber::new(reqwest::Client::new(), 0);
        assert_eq!(prober.concurrency, 1);
    }

    #[tokio::test]
    async fn nothing_to_probe_resolves_to_none() {
        let prober = UrlProber::new(reqwest::Client::new(), 2);
        let resolution = resolve_video_url(&prober, Some("  "), None).await;
        assert!(resolution.source.is_none());
        assert!(resolution.attempts.is_empty());
    }
}
