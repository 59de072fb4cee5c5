//! Download job state and the read-only snapshots handed to subscribers.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::progress::{format_time_remaining, progress_percentage};

/// Opaque job handle, assigned in submission order.
///
/// Two jobs for the same URL get different handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// Pending -> Downloading -> Completed | Cancelled | Failed
///                 |  ^
///                 v  |
///              Retrying
/// Downloading -> Paused -> Pending (on resume)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free slot.
    Pending,
    /// An attempt is streaming.
    Downloading,
    /// Stopped by the user; resumable.
    Paused,
    /// Waiting out the backoff before retry `attempt` of `max`.
    Retrying {
        /// Retry number (1-indexed).
        attempt: u32,
        /// Retry budget.
        max: u32,
    },
    /// Transfer finished.
    Completed,
    /// Stopped by the user; partial file removed.
    Cancelled,
    /// Gave up.
    Failed {
        /// Most specific error description available.
        message: String,
    },
}

impl JobStatus {
    /// Returns true for `Completed`, `Cancelled` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed { .. })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending..."),
            Self::Downloading => f.write_str("Downloading..."),
            Self::Paused => f.write_str("Paused"),
            Self::Retrying { attempt, max } => write!(f, "Retrying... ({attempt}/{max})"),
            Self::Completed => f.write_str("Completed"),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::Failed { message } => write!(f, "Failed: {message}"),
        }
    }
}

/// Mutable job record owned by the manager's job table.
#[derive(Debug, Clone)]
pub(crate) struct DownloadJob {
    pub(crate) id: JobId,
    pub(crate) url: String,
    pub(crate) destination: PathBuf,
    pub(crate) bytes_received: u64,
    pub(crate) total_bytes: u64,
    pub(crate) status: JobStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) throughput_bytes_per_sec: f64,
    pub(crate) eta_seconds: Option<f64>,
    pub(crate) retry_attempts: u32,
}

impl DownloadJob {
    pub(crate) fn new(id: JobId, url: String, destination: PathBuf) -> Self {
        Self {
            id,
            url,
            destination,
            bytes_received: 0,
            total_bytes: 0,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            throughput_bytes_per_sec: 0.0,
            eta_seconds: None,
            retry_attempts: 0,
        }
    }

    /// Records a new running total, keeping `bytes_received <= total_bytes`.
    pub(crate) fn record_bytes(&mut self, bytes_received: u64, total_bytes: Option<u64>) {
        self.bytes_received = bytes_received;
        if let Some(total) = total_bytes {
            self.total_bytes = total;
        }
        if self.total_bytes > 0 && self.bytes_received > self.total_bytes {
            self.total_bytes = self.bytes_received;
        }
    }

    /// Moves to a terminal state and stamps the completion time.
    pub(crate) fn finish(&mut self, status: JobStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.throughput_bytes_per_sec = 0.0;
        self.eta_seconds = None;
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        let file_name = self
            .destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        JobSnapshot {
            id: self.id,
            url: self.url.clone(),
            destination_path: self.destination.clone(),
            file_name,
            bytes_received: self.bytes_received,
            total_bytes: self.total_bytes,
            status: self.status.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            throughput_bytes_per_sec: self.throughput_bytes_per_sec,
            eta_seconds: self.eta_seconds,
            retry_attempts: self.retry_attempts,
        }
    }
}

/// Point-in-time copy of a job, safe to hand to any subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    /// Job handle.
    pub id: JobId,
    /// Requested URL.
    pub url: String,
    /// Where the file is written.
    pub destination_path: PathBuf,
    /// File name part of `destination_path`.
    pub file_name: String,
    /// Bytes received in the current (or last) attempt.
    pub bytes_received: u64,
    /// Declared size, `0` while unknown.
    pub total_bytes: u64,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Time the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last sampled throughput.
    pub throughput_bytes_per_sec: f64,
    /// Last estimated seconds remaining.
    pub eta_seconds: Option<f64>,
    /// Retries used so far.
    pub retry_attempts: u32,
}

impl JobSnapshot {
    /// Percentage complete; `0.0` while the total is unknown.
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        progress_percentage(self.bytes_received, self.total_bytes)
    }

    /// Formatted time remaining, if an estimate exists.
    #[must_use]
    pub fn time_remaining(&self) -> Option<String> {
        self.eta_seconds.map(format_time_remaining)
    }

    /// Returns true once the job can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
