//! Download manager: job table, admission control and lifecycle operations.
//!
//! The manager owns two pieces of shared state:
//!
//! - the job table, every submitted job in submission order, and
//! - the active set, one slot per job currently holding a concurrency slot.
//!
//! A job holds its slot from admission until its attempt reports a terminal
//! outcome or a pause takes effect; a job waiting out a retry backoff keeps
//! its slot. Admission always starts the earliest-submitted `Pending` job.
//!
//! Attempts run on their own tasks and report back over a channel to a single
//! supervisor task, which applies the outcome (completion, retry, failure,
//! pause or cancellation) and then re-runs admission.
//!
//! Lock order is active set first, job table second. Events are published
//! only after both locks are released.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use transfer_deck::download::{DownloadManager, HttpClient};
//! use transfer_deck::ManagerConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = DownloadManager::new(
//!     ManagerConfig::in_dir("./Downloads"),
//!     Arc::new(HttpClient::new()),
//! )?;
//! let mut events = manager.subscribe();
//! let id = manager.submit("https://example.com/report.pdf", None);
//! while let Ok(event) = events.recv().await {
//!     if event.is_completed() && Some(event.job().id) == id {
//!         println!("{}: {}", event.job().file_name, event.job().status);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::error::{DownloadError, ManagerError};
use super::events::{DownloadEvent, EventBus};
use super::executor::{AttemptOutcome, ProgressUpdate, TransferExecutor, remove_partial_file};
use super::filename::{derive_filename, resolve_unique_path};
use super::job::{DownloadJob, JobId, JobSnapshot, JobStatus};
use super::retry::{RetryDecision, RetryPolicy};
use super::source::TransferSource;
use crate::config::ManagerConfig;

/// Counts shown on the list view status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    /// Jobs in the table.
    pub total: usize,
    /// Jobs that completed successfully.
    pub finished: usize,
    /// Jobs currently streaming.
    pub downloading: usize,
    /// Jobs that gave up.
    pub failed: usize,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Downloads: {}/{} completed | Currently downloading: {}",
            self.finished, self.total, self.downloading
        )
    }
}

/// Why an active job's token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopRequest {
    /// Keep the job resumable.
    Pause,
    /// Paused, then resumed before the attempt wound down.
    Requeue,
    /// Terminal cancellation; overrides the others.
    Cancel,
}

#[derive(Debug)]
struct ActiveSlot {
    cancel: CancellationToken,
    stop: Option<StopRequest>,
}

#[derive(Debug, Default)]
struct JobTable {
    next_id: u64,
    jobs: BTreeMap<JobId, DownloadJob>,
}

impl JobTable {
    fn is_reserved(&self, path: &Path) -> bool {
        self.jobs.values().any(|job| job.destination == path)
    }
}

/// What to do with a failed attempt.
enum FailureStep {
    Stop,
    GiveUp,
    Retry {
        snapshot: JobSnapshot,
        delay: Duration,
        cancel: CancellationToken,
    },
}

#[derive(Debug)]
struct AttemptReport {
    id: JobId,
    outcome: AttemptOutcome,
}

/// Work picked by admission, started after the locks are released.
struct Admitted {
    id: JobId,
    url: String,
    destination: PathBuf,
    cancel: CancellationToken,
    snapshot: JobSnapshot,
}

#[derive(Debug)]
struct Inner {
    config: ManagerConfig,
    retry_policy: RetryPolicy,
    executor: TransferExecutor,
    bus: EventBus,
    jobs: Mutex<JobTable>,
    active: Mutex<HashMap<JobId, ActiveSlot>>,
    reports: mpsc::UnboundedSender<AttemptReport>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinates concurrent downloads for a host application.
///
/// Cloning is cheap and every clone drives the same jobs. All operations are
/// non-blocking; outcomes arrive as [`DownloadEvent`]s.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Creates a manager reading transfers from `source`.
    ///
    /// Creates the download directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidConfig`] for out-of-range settings and
    /// [`ManagerError::CreateDirectory`] if the directory cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(
        config: ManagerConfig,
        source: Arc<dyn TransferSource>,
    ) -> Result<Self, ManagerError> {
        config.validate()?;
        std::fs::create_dir_all(&config.download_dir).map_err(|source| {
            ManagerError::CreateDirectory {
                path: config.download_dir.clone(),
                source,
            }
        })?;

        let (reports, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            retry_policy: config.retry_policy(),
            executor: TransferExecutor::new(source, config.sample_interval),
            bus: EventBus::new(config.event_capacity),
            jobs: Mutex::new(JobTable::default()),
            active: Mutex::new(HashMap::new()),
            reports,
            config,
        });
        tokio::spawn(supervise(Arc::downgrade(&inner), receiver));

        info!(
            dir = %inner.config.download_dir.display(),
            max_concurrent = inner.config.max_concurrent,
            max_retries = inner.config.max_retries,
            "download manager ready"
        );
        Ok(Self { inner })
    }

    /// Creates a manager backed by an [`HttpClient`] using the configured timeouts.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_http_client(config: ManagerConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        let client =
            HttpClient::new_with_timeouts(config.connect_timeout_secs, config.read_timeout_secs);
        Self::new(config, Arc::new(client))
    }

    /// Queues a download and returns its handle.
    ///
    /// Returns `None` for a blank URL. `suggested_name` (from a
    /// Content-Disposition header, say) wins over the name derived from the
    /// URL. The destination never collides with an existing file or with any
    /// other job's destination.
    #[instrument(skip(self))]
    pub fn submit(&self, url: &str, suggested_name: Option<&str>) -> Option<JobId> {
        let url = url.trim();
        if url.is_empty() {
            debug!("ignoring blank url");
            return None;
        }

        let snapshot = {
            let mut table = lock(&self.inner.jobs);
            let file_name = derive_filename(url, suggested_name);
            let destination =
                resolve_unique_path(&self.inner.config.download_dir, &file_name, |path| {
                    table.is_reserved(path)
                });
            table.next_id += 1;
            let id = JobId::new(table.next_id);
            let job = DownloadJob::new(id, url.to_string(), destination);
            let snapshot = job.snapshot();
            table.jobs.insert(id, job);
            snapshot
        };

        info!(job = %snapshot.id, path = %snapshot.destination_path.display(), "job submitted");
        let id = snapshot.id;
        self.inner.bus.publish(DownloadEvent::ProgressChanged(snapshot));
        self.inner.admit();
        Some(id)
    }

    /// Pauses an active job, keeping its partial file.
    ///
    /// No-op unless the job currently holds a slot.
    #[instrument(skip(self))]
    pub fn pause(&self, id: JobId) {
        let snapshot = {
            let mut active = lock(&self.inner.active);
            let Some(slot) = active.get_mut(&id) else {
                debug!("pause ignored, job not active");
                return;
            };
            if slot.stop == Some(StopRequest::Cancel) {
                return;
            }
            slot.stop = Some(StopRequest::Pause);
            slot.cancel.cancel();

            let mut table = lock(&self.inner.jobs);
            let Some(job) = table.jobs.get_mut(&id) else {
                return;
            };
            job.status = JobStatus::Paused;
            job.throughput_bytes_per_sec = 0.0;
            job.eta_seconds = None;
            job.snapshot()
        };

        info!(job = %id, "job paused");
        self.inner.bus.publish(DownloadEvent::ProgressChanged(snapshot));
    }

    /// Re-queues a paused job. The transfer restarts from the beginning.
    ///
    /// No-op for terminal jobs.
    #[instrument(skip(self))]
    pub fn resume(&self, id: JobId) {
        let snapshot = {
            let mut active = lock(&self.inner.active);
            let mut table = lock(&self.inner.jobs);
            let Some(job) = table.jobs.get_mut(&id) else {
                debug!("resume ignored, unknown job");
                return;
            };
            if job.status.is_terminal() {
                debug!("resume ignored, job already finished");
                return;
            }

            match active.get_mut(&id) {
                // Still winding down from the pause: re-queue once it reports.
                Some(slot) if slot.stop == Some(StopRequest::Pause) => {
                    slot.stop = Some(StopRequest::Requeue);
                    job.status = JobStatus::Pending;
                    Some(job.snapshot())
                }
                Some(_) => None,
                None if job.status == JobStatus::Paused => {
                    job.status = JobStatus::Pending;
                    Some(job.snapshot())
                }
                None => None,
            }
        };

        if let Some(snapshot) = snapshot {
            info!(job = %id, "job resumed");
            self.inner.bus.publish(DownloadEvent::ProgressChanged(snapshot));
        }
        self.inner.admit();
    }

    /// Cancels an active job; its partial file is deleted.
    ///
    /// No-op unless the job currently holds a slot.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: JobId) {
        let mut active = lock(&self.inner.active);
        match active.get_mut(&id) {
            Some(slot) => {
                slot.stop = Some(StopRequest::Cancel);
                slot.cancel.cancel();
                info!(job = %id, "cancellation requested");
            }
            None => debug!("cancel ignored, job not active"),
        }
    }

    /// Cancels every active job.
    #[instrument(skip(self))]
    pub fn cancel_all(&self) {
        let mut active = lock(&self.inner.active);
        for slot in active.values_mut() {
            slot.stop = Some(StopRequest::Cancel);
            slot.cancel.cancel();
        }
        info!(count = active.len(), "cancelled all active jobs");
    }

    /// Snapshots of every job in submission order.
    #[must_use]
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        lock(&self.inner.jobs)
            .jobs
            .values()
            .map(DownloadJob::snapshot)
            .collect()
    }

    /// Snapshot of a single job.
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<JobSnapshot> {
        lock(&self.inner.jobs).jobs.get(&id).map(DownloadJob::snapshot)
    }

    /// Counts for the status line.
    #[must_use]
    pub fn summary(&self) -> DownloadSummary {
        let table = lock(&self.inner.jobs);
        let mut summary = DownloadSummary {
            total: table.jobs.len(),
            ..DownloadSummary::default()
        };
        for job in table.jobs.values() {
            match job.status {
                JobStatus::Completed => summary.finished += 1,
                JobStatus::Downloading => summary.downloading += 1,
                JobStatus::Failed { .. } => summary.failed += 1,
                _ => {}
            }
        }
        summary
    }

    /// Removes completed, cancelled and failed jobs from the table.
    ///
    /// Returns how many were removed.
    #[instrument(skip(self))]
    pub fn clear_completed(&self) -> usize {
        let mut table = lock(&self.inner.jobs);
        let before = table.jobs.len();
        table.jobs.retain(|_, job| !job.status.is_terminal());
        let removed = before - table.jobs.len();
        debug!(removed, "cleared finished jobs");
        removed
    }

    /// Returns true when nothing is running or waiting for a slot.
    ///
    /// Paused jobs do not count as work.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let active = lock(&self.inner.active);
        if !active.is_empty() {
            return false;
        }
        let table = lock(&self.inner.jobs);
        !table
            .jobs
            .values()
            .any(|job| job.status == JobStatus::Pending)
    }

    /// Waits until [`is_idle`](Self::is_idle) holds.
    pub async fn wait_for_idle(&self) {
        let mut events = self.subscribe();
        loop {
            if self.is_idle() {
                return;
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Subscribes to progress and completion events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.bus.subscribe()
    }

    /// The bus events are published on, for [`EventBus::spawn_handler`].
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Folder downloads are written to.
    #[must_use]
    pub fn download_directory(&self) -> &Path {
        &self.inner.config.download_dir
    }

    /// Shows the download folder in the platform file browser.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::OpenDirectory`] if the browser cannot be launched.
    pub fn open_download_directory(&self) -> Result<(), ManagerError> {
        let dir = self.download_directory();
        let program = if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        Command::new(program)
            .arg(dir)
            .spawn()
            .map(|_child| ())
            .map_err(|source| ManagerError::OpenDirectory {
                path: dir.to_path_buf(),
                source,
            })
    }
}

/// Applies attempt outcomes until the manager is dropped.
async fn supervise(inner: Weak<Inner>, mut reports: mpsc::UnboundedReceiver<AttemptReport>) {
    while let Some(report) = reports.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply(report).await;
    }
    debug!("download supervisor exiting");
}

impl Inner {
    /// Starts the earliest pending jobs while slots are free.
    fn admit(self: &Arc<Self>) {
        let mut admitted = Vec::new();
        {
            let mut active = lock(&self.active);
            let mut table = lock(&self.jobs);
            while active.len() < self.config.max_concurrent {
                let Some(job) = table
                    .jobs
                    .values_mut()
                    .find(|job| job.status == JobStatus::Pending && !active.contains_key(&job.id))
                else {
                    break;
                };
                job.status = JobStatus::Downloading;
                let cancel = CancellationToken::new();
                active.insert(
                    job.id,
                    ActiveSlot {
                        cancel: cancel.clone(),
                        stop: None,
                    },
                );
                admitted.push(Admitted {
                    id: job.id,
                    url: job.url.clone(),
                    destination: job.destination.clone(),
                    cancel,
                    snapshot: job.snapshot(),
                });
            }
        }

        for work in admitted {
            info!(job = %work.id, url = %work.url, "job admitted");
            self.bus.publish(DownloadEvent::ProgressChanged(work.snapshot));
            self.spawn_attempt(work.id, work.url, work.destination, work.cancel);
        }
    }

    fn spawn_attempt(
        self: &Arc<Self>,
        id: JobId,
        url: String,
        destination: PathBuf,
        cancel: CancellationToken,
    ) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner
                .executor
                .run(&url, &destination, &cancel, |update| {
                    inner.record_progress(id, update);
                })
                .await;
            if inner.reports.send(AttemptReport { id, outcome }).is_err() {
                debug!(job = %id, "supervisor gone, dropping attempt outcome");
            }
        });
    }

    fn record_progress(&self, id: JobId, update: ProgressUpdate) {
        let mut table = lock(&self.jobs);
        let Some(job) = table.jobs.get_mut(&id) else {
            return;
        };
        job.record_bytes(update.bytes_received, update.total_bytes);
        if job.status != JobStatus::Downloading {
            return;
        }
        let Some(estimate) = update.estimate else {
            return;
        };
        job.throughput_bytes_per_sec = estimate.bytes_per_sec;
        if let Some(eta) = estimate.eta_seconds {
            job.eta_seconds = Some(eta);
        }
        // Published under the table lock: a pause or cancel that changes the
        // status afterwards always publishes after this sample.
        self.bus.publish(DownloadEvent::ProgressChanged(job.snapshot()));
    }

    async fn apply(self: &Arc<Self>, report: AttemptReport) {
        let AttemptReport { id, outcome } = report;
        match outcome {
            AttemptOutcome::Completed {
                bytes_received,
                total_bytes,
            } => self.complete(id, bytes_received, total_bytes),
            AttemptOutcome::Cancelled => self.stopped(id).await,
            AttemptOutcome::Failed(error) => self.failed(id, error).await,
        }
    }

    fn complete(self: &Arc<Self>, id: JobId, bytes_received: u64, total_bytes: Option<u64>) {
        let snapshot = {
            let mut active = lock(&self.active);
            active.remove(&id);
            let mut table = lock(&self.jobs);
            let Some(job) = table.jobs.get_mut(&id) else {
                return;
            };
            job.record_bytes(bytes_received, total_bytes);
            if job.total_bytes == 0 {
                job.total_bytes = job.bytes_received;
            }
            job.finish(JobStatus::Completed);
            job.snapshot()
        };

        info!(job = %id, bytes = snapshot.bytes_received, "download completed");
        self.bus.publish(DownloadEvent::Completed(snapshot));
        self.admit();
    }

    /// Handles an attempt that ended because its token was cancelled.
    async fn stopped(self: &Arc<Self>, id: JobId) {
        let (event, partial) = {
            let mut active = lock(&self.active);
            let stop = active.remove(&id).and_then(|slot| slot.stop);
            let mut table = lock(&self.jobs);
            let Some(job) = table.jobs.get_mut(&id) else {
                return;
            };
            match stop {
                Some(StopRequest::Pause) => {
                    debug!(job = %id, "pause took effect");
                    (Some(DownloadEvent::ProgressChanged(job.snapshot())), None)
                }
                Some(StopRequest::Requeue) => {
                    job.status = JobStatus::Pending;
                    (Some(DownloadEvent::ProgressChanged(job.snapshot())), None)
                }
                Some(StopRequest::Cancel) | None => {
                    job.finish(JobStatus::Cancelled);
                    (
                        Some(DownloadEvent::Completed(job.snapshot())),
                        Some(job.destination.clone()),
                    )
                }
            }
        };

        if let Some(path) = partial {
            remove_partial_file(&path).await;
            info!(job = %id, "download cancelled");
        }
        if let Some(event) = event {
            self.bus.publish(event);
        }
        self.admit();
    }

    async fn failed(self: &Arc<Self>, id: JobId, error: DownloadError) {
        if error.is_start_fault() {
            self.give_up(id, &error);
            return;
        }

        let step = {
            let active = lock(&self.active);
            let Some(slot) = active.get(&id) else {
                return;
            };
            if slot.stop.is_some() {
                FailureStep::Stop
            } else {
                let cancel = slot.cancel.clone();
                let mut table = lock(&self.jobs);
                let Some(job) = table.jobs.get_mut(&id) else {
                    return;
                };
                match self.retry_policy.decide(job.retry_attempts) {
                    RetryDecision::Retry { attempt, delay } => {
                        job.retry_attempts = attempt;
                        job.bytes_received = 0;
                        job.throughput_bytes_per_sec = 0.0;
                        job.eta_seconds = None;
                        job.status = JobStatus::Retrying {
                            attempt,
                            max: self.retry_policy.max_retries(),
                        };
                        FailureStep::Retry {
                            snapshot: job.snapshot(),
                            delay,
                            cancel,
                        }
                    }
                    RetryDecision::GiveUp => FailureStep::GiveUp,
                }
            }
        };

        match step {
            // A pause or cancel raced the failure; honour it instead.
            FailureStep::Stop => self.stopped(id).await,
            FailureStep::GiveUp => self.give_up(id, &error),
            FailureStep::Retry {
                snapshot,
                delay,
                cancel,
            } => {
                warn!(
                    job = %id,
                    error = %error,
                    attempt = snapshot.retry_attempts,
                    delay_ms = delay.as_millis(),
                    "attempt failed, retrying"
                );
                self.bus.publish(DownloadEvent::ProgressChanged(snapshot));
                self.schedule_retry(id, delay, cancel);
            }
        }
    }

    /// Waits out the backoff, keeping the slot, then starts the next attempt.
    fn schedule_retry(self: &Arc<Self>, id: JobId, delay: Duration, cancel: CancellationToken) {
        let inner = Arc::clone(self);
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = stop.cancelled() => {
                    let report = AttemptReport { id, outcome: AttemptOutcome::Cancelled };
                    if inner.reports.send(report).is_err() {
                        debug!(job = %id, "supervisor gone during backoff");
                    }
                }
                () = tokio::time::sleep(delay) => inner.restart(id, cancel),
            }
        });
    }

    fn restart(self: &Arc<Self>, id: JobId, cancel: CancellationToken) {
        let work = {
            let mut table = lock(&self.jobs);
            let Some(job) = table.jobs.get_mut(&id) else {
                return;
            };
            let snapshot = if matches!(job.status, JobStatus::Retrying { .. }) {
                job.status = JobStatus::Downloading;
                Some(job.snapshot())
            } else {
                None
            };
            (job.url.clone(), job.destination.clone(), snapshot)
        };

        let (url, destination, snapshot) = work;
        if let Some(snapshot) = snapshot {
            debug!(job = %id, attempt = snapshot.retry_attempts, "retry starting");
            self.bus.publish(DownloadEvent::ProgressChanged(snapshot));
        }
        // A pause that landed after the backoff already cancelled the token,
        // so the attempt reports Cancelled straight away.
        self.spawn_attempt(id, url, destination, cancel);
    }

    fn give_up(self: &Arc<Self>, id: JobId, error: &DownloadError) {
        let snapshot = {
            let mut active = lock(&self.active);
            active.remove(&id);
            let mut table = lock(&self.jobs);
            let Some(job) = table.jobs.get_mut(&id) else {
                return;
            };
            job.finish(JobStatus::Failed {
                message: error.detail(),
            });
            job.snapshot()
        };

        warn!(job = %id, error = %error, retries = snapshot.retry_attempts, "download failed");
        self.bus.publish(DownloadEvent::Completed(snapshot));
        self.admit();
    }
}
