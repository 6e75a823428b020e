//! Poll a render job until it produces a video, fails, or runs out of
//! budget.
//!
//! [`JobPoller`] replaces the ad-hoc "sleep and retry" loops: the delay
//! schedule comes from a [`PollPolicy`], transient failures consume an
//! attempt but do not abort, permanent failures are returned straight
//! away, and a [`CancellationToken`] stops the loop between or during
//! requests.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tourgen_core::retry::{jittered, next_delay, PollPolicy};
use tourgen_core::types::{JobId, JobState, JobStatus};

use crate::api::{RenderApiError, StatusSource};
use crate::events::PollEvent;

/// How a poll ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// The job reported a video URL.
    Succeeded {
        video_url: String,
        attempts: u32,
        elapsed_ms: u64,
    },
    /// The job reported a terminal failure.
    Failed { reason: String, attempts: u32 },
    /// The attempt budget or deadline ran out while the job was pending.
    TimedOut {
        attempts: u32,
        last_status: Option<JobStatus>,
        elapsed_ms: u64,
    },
    /// The cancellation token fired.
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::TimedOut { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn video_url(&self) -> Option<&str> {
        match self {
            Self::Succeeded { video_url, .. } => Some(video_url),
            _ => None,
        }
    }
}

/// Drives status requests for one job at a time.
pub struct JobPoller<S> {
    source: S,
    policy: PollPolicy,
    events: Option<mpsc::Sender<PollEvent>>,
}

impl<S: StatusSource> JobPoller<S> {
    /// Create a poller. The policy is validated up front.
    pub fn new(source: S, policy: PollPolicy) -> Result<Self, RenderApiError> {
        policy.validate()?;
        Ok(Self {
            source,
            policy,
            events: None,
        })
    }

    /// Publish [`PollEvent`]s to `tx` while polling.
    pub fn with_events(mut self, tx: mpsc::Sender<PollEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll `job_id` until it settles.
    ///
    /// Returns `Err` only for permanent failures (unknown job, rejected
    /// request, undecodable response); every other ending is a
    /// [`PollOutcome`].
    pub async fn poll(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, RenderApiError> {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts;
        let mut delay = self.policy.initial_delay;
        let mut attempts: u32 = 0;
        let mut last_status: Option<JobStatus> = None;
        let mut best_progress: Option<u8> = None;

        tracing::info!(
            job_id = %job_id,
            max_attempts,
            initial_delay_ms = delay.as_millis() as u64,
            "Polling render job",
        );

        for attempt in 1..=max_attempts {
            if attempt > 1 && self.deadline_passed(started) {
                tracing::warn!(job_id = %job_id, attempts, "Poll deadline reached");
                break;
            }

            self.emit(PollEvent::Attempt {
                job_id: job_id.to_string(),
                attempt,
                max_attempts,
            })
            .await;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.finish(job_id, PollOutcome::Cancelled { attempts }).await);
                }
                result = self.source.fetch_status(job_id) => result,
            };
            attempts = attempt;

            match result {
                Ok(report) => match report.state() {
                    JobState::Ready { video_url } => {
                        let outcome = PollOutcome::Succeeded {
                            video_url,
                            attempts,
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        };
                        return Ok(self.finish(job_id, outcome).await);
                    }
                    JobState::Failed { reason } => {
                        let outcome = PollOutcome::Failed { reason, attempts };
                        return Ok(self.finish(job_id, outcome).await);
                    }
                    JobState::Pending { status, progress } => {
                        if let (Some(seen), Some(now)) = (best_progress, progress) {
                            if now < seen {
                                tracing::debug!(
                                    job_id = %job_id,
                                    seen,
                                    reported = now,
                                    "Progress went backwards; keeping highest value",
                                );
                            }
                        }
                        best_progress = best_progress.max(progress);
                        tracing::debug!(
                            job_id = %job_id,
                            attempt,
                            status = %status,
                            progress = ?best_progress,
                            "Job pending",
                        );
                        self.emit(PollEvent::Progress {
                            job_id: job_id.to_string(),
                            status: status.clone(),
                            progress: best_progress,
                        })
                        .await;
                        last_status = Some(status);
                    }
                },
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        error = %e,
                        "Status request failed, will retry",
                    );
                    self.emit(PollEvent::TransientError {
                        job_id: job_id.to_string(),
                        attempt,
                        error: e.to_string(),
                    })
                    .await;
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        attempt,
                        error = %e,
                        "Status request failed permanently",
                    );
                    return Err(e);
                }
            }

            if attempt == max_attempts {
                break;
            }

            let mut sleep_for = jittered(
                delay,
                self.policy.jitter,
                self.policy.max_delay,
                &mut rand::rng(),
            );
            if let Some(deadline) = self.policy.deadline {
                sleep_for = sleep_for.min(deadline.saturating_sub(started.elapsed()));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.finish(job_id, PollOutcome::Cancelled { attempts }).await);
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }

            delay = next_delay(delay, &self.policy);
        }

        let outcome = PollOutcome::TimedOut {
            attempts,
            last_status,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        Ok(self.finish(job_id, outcome).await)
    }

    fn deadline_passed(&self, started: Instant) -> bool {
        self.policy
            .deadline
            .is_some_and(|deadline| started.elapsed() >= deadline)
    }

    async fn finish(&self, job_id: &JobId, outcome: PollOutcome) -> PollOutcome {
        tracing::info!(job_id = %job_id, outcome = ?outcome, "Polling finished");
        self.emit(PollEvent::Finished {
            job_id: job_id.to_string(),
            outcome: outcome.clone(),
        })
        .await;
        outcome
    }

    async fn emit(&self, event: PollEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event).await;
        }
    }
}

/// Rough upper bound on how long a poll with `policy` can take, ignoring
/// request latency.
pub fn estimated_budget(policy: &PollPolicy) -> Duration {
    let sleep = policy.worst_case_sleep();
    match policy.deadline {
        Some(deadline) => sleep.min(deadline),
        None => sleep,
    }
}
