//! Concurrent download manager with bounded retry and progress events.
//!
//! This module turns "download this URL" requests into files on disk while
//! enforcing a concurrency cap, retrying transient failures and reporting
//! progress to any number of subscribers.
//!
//! # Features
//!
//! - FIFO admission under a concurrency cap (3 by default)
//! - Streaming transfers through a pluggable [`TransferSource`] ([`HttpClient`] by default)
//! - Fixed-delay retry (3 retries, 2 s apart by default)
//! - Throughput and time-remaining estimates sampled once per second
//! - `name(1).ext` style disambiguation of destination files
//! - Pause, resume, cancel and cancel-all
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use transfer_deck::download::{DownloadManager, HttpClient};
//! use transfer_deck::ManagerConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DownloadManager::new(ManagerConfig::default(), Arc::new(HttpClient::new()))?;
//! manager.submit("https://example.com/paper.pdf", None);
//! manager.wait_for_idle().await;
//! println!("{}", manager.summary());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod events;
mod executor;
pub mod filename;
mod job;
mod manager;
pub mod progress;
mod retry;
mod source;

pub use client::HttpClient;
pub use error::{DownloadError, ManagerError};
pub use events::{DownloadEvent, EventBus};
pub use filename::{derive_filename, is_downloadable_url};
pub use job::{JobId, JobSnapshot, JobStatus};
pub use manager::{DownloadManager, DownloadSummary};
pub use progress::{Estimate, format_bytes, format_time_remaining};
pub use retry::{RetryDecision, RetryPolicy};
pub use source::{TransferBody, TransferSource};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
