//! Client library for the virtual tour rendering service.
//!
//! Provides the REST wrapper for job submission, status and download
//! ([`api`]), the typed poll loop that waits for a job to finish
//! ([`poller`]), and the events it emits while doing so ([`events`]).

pub mod api;
pub mod events;
pub mod poller;
