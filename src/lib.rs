//! Mediafetch Core Library
//!
//! This library provides resumable HTTP(S) downloads of single media
//! resources, with the retry, validation, and file naming behavior a batch
//! media downloader needs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Download state machine, sessions, destinations, and validators
//! - [`actions`] - Leveled logging with configurable before/after action hooks, and signal-bound actions
//! - [`config`] - Configuration file model and resolution into runtime settings
//! - [`job`] - Sequential batch orchestration used by the command line

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actions;
pub mod config;
pub mod download;
pub mod job;
mod user_agent;

// Re-export commonly used types
pub use actions::{ActionRegistry, ControlError, Flags, JobContext, JobLogger};
pub use config::{ConfigError, FileConfig, LoadedConfig, load_config};
pub use download::{
    DEFAULT_TEMPLATE, Destination, DownloadError, FileDestination, HttpDownloader, HttpSettings,
    TaskOverrides, TerminalProgress, TransferOutcome,
};
pub use job::{BatchJob, JobReport, JobStats};
