//! Events emitted by the job poller.
//!
//! Consumers (the CLI's live progress line, tests) receive these over an
//! `mpsc` channel while [`JobPoller::poll`](crate::poller::JobPoller::poll)
//! runs.

use serde::Serialize;
use tourgen_core::types::JobStatus;

use crate::poller::PollOutcome;

/// A state change observed while polling one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PollEvent {
    /// A status request is about to be sent.
    Attempt {
        job_id: String,
        attempt: u32,
        max_attempts: u32,
    },

    /// The job is still in flight.
    Progress {
        job_id: String,
        status: JobStatus,
        /// Highest completion percentage seen so far (0-100).
        progress: Option<u8>,
    },

    /// A status request failed in a way worth retrying.
    TransientError {
        job_id: String,
        attempt: u32,
        error: String,
    },

    /// Polling stopped.
    Finished { job_id: String, outcome: PollOutcome },
}
