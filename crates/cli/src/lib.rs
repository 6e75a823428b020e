//! `tourgen` library crate.
//!
//! Command definitions and implementations live here so they can be
//! tested; the binary entrypoint is `main.rs`.

pub mod args;
pub mod commands;
pub mod config;
pub mod diagnose;
pub mod exit;
pub mod logging;
pub mod output;
