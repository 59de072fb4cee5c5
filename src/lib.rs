//! Transfer Deck Library
//!
//! The download subsystem of a browser-like host: it accepts "download this
//! URL" requests, runs a bounded number of transfers at once, retries
//! transient failures and keeps subscribers informed of progress.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Manager settings and the TOML config file
//! - [`download`] - Admission, transfer execution, retry, progress and events
//!
//! The HTTP request profile (browser user agent and default headers) lives in
//! a private module used by [`HttpClient`].

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
mod user_agent;

// Re-export commonly used types
pub use config::ManagerConfig;
pub use download::{
    DownloadError, DownloadEvent, DownloadManager, DownloadSummary, EventBus, HttpClient, JobId,
    JobSnapshot, JobStatus, ManagerError, RetryDecision, RetryPolicy, TransferBody,
    TransferSource, format_bytes, is_downloadable_url,
};
pub use user_agent::BROWSER_USER_AGENT;
