//! Shared types and helpers for the tourgen toolkit.
//!
//! Holds the job data model exchanged with the rendering service, the
//! poll/backoff policy, media URL candidate rules, request validation,
//! secret redaction, and local fixture generation (synthetic images and
//! ffmpeg encodes).

pub mod candidates;
pub mod error;
pub mod ffmpeg;
pub mod fixtures;
pub mod hashing;
pub mod redact;
pub mod retry;
pub mod types;
pub mod validation;
