//! Client for the CI provider that runs the render workflows.
//!
//! Workflow runs, jobs, artifacts and logs come from the GitHub Actions
//! REST API. [`logs`] searches the downloaded log archives for failures.

pub mod client;
pub mod error;
pub mod logs;
pub mod runs;
