//! Transfer executor: runs exactly one attempt of one job.
//!
//! The executor opens the transfer through the shared [`TransferSource`],
//! streams the body into the job's destination file (truncating whatever an
//! earlier attempt left behind) and reports a single [`AttemptOutcome`]. It
//! never touches the job table or the active set; the manager interprets the
//! outcome.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::DownloadError;
use super::progress::{Estimate, ProgressSampler};
use super::source::{TransferBody, TransferSource};

/// Deletes a partially written file; a file that is already gone is fine.
pub(crate) async fn remove_partial_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial file"),
    }
}

/// Result of a single attempt.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    /// The body was fully written.
    Completed {
        /// Bytes written.
        bytes_received: u64,
        /// Size declared by the server, if any.
        total_bytes: Option<u64>,
    },
    /// The cancellation token fired before the transfer finished.
    Cancelled,
    /// Network or disk failure.
    Failed(DownloadError),
}

/// Running counters reported on every chunk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProgressUpdate {
    pub(crate) bytes_received: u64,
    pub(crate) total_bytes: Option<u64>,
    /// Present only when a sample interval has elapsed.
    pub(crate) estimate: Option<Estimate>,
}

enum StreamEnd {
    Finished(u64),
    Cancelled,
}

#[derive(Debug, Clone)]
pub(crate) struct TransferExecutor {
    source: Arc<dyn TransferSource>,
    sample_interval: Duration,
}

impl TransferExecutor {
    pub(crate) fn new(source: Arc<dyn TransferSource>, sample_interval: Duration) -> Self {
        Self {
            source,
            sample_interval,
        }
    }

    /// Runs one attempt, calling `on_progress` after every chunk.
    #[instrument(skip(self, cancel, on_progress), fields(url = %url, path = %destination.display()))]
    pub(crate) async fn run<F>(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> AttemptOutcome
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return AttemptOutcome::Failed(DownloadError::invalid_url(url));
        };

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return AttemptOutcome::Cancelled,
            opened = self.source.open(&parsed) => opened,
        };
        let body = match opened {
            Ok(body) => body,
            Err(e) => return AttemptOutcome::Failed(e),
        };
        let total_bytes = body.total_bytes;

        on_progress(ProgressUpdate {
            bytes_received: 0,
            total_bytes,
            estimate: None,
        });

        match self
            .stream_to_file(body, url, destination, cancel, &mut on_progress)
            .await
        {
            Ok(StreamEnd::Finished(bytes_received)) => {
                debug!(bytes = bytes_received, "attempt finished");
                AttemptOutcome::Completed {
                    bytes_received,
                    total_bytes,
                }
            }
            Ok(StreamEnd::Cancelled) => {
                debug!("attempt cancelled");
                AttemptOutcome::Cancelled
            }
            Err(e) => {
                remove_partial_file(destination).await;
                AttemptOutcome::Failed(e)
            }
        }
    }

    /// Streams the body to disk, stopping early if `cancel` fires.
    async fn stream_to_file<F>(
        &self,
        body: TransferBody,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<StreamEnd, DownloadError>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let TransferBody {
            total_bytes,
            mut chunks,
        } = body;

        let file = File::create(destination)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;
        let mut writer = BufWriter::new(file);
        let mut sampler = ProgressSampler::new(Instant::now(), self.sample_interval);
        let mut bytes_received: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                next = chunks.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(destination, e))?;
            bytes_received += chunk.len() as u64;

            let estimate = sampler.observe(bytes_received, Instant::now(), total_bytes);
            on_progress(ProgressUpdate {
                bytes_received,
                total_bytes,
                estimate,
            });
        }

        // Ensure all data is flushed to disk
        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        debug!(url = %url, bytes = bytes_received, "body streamed");
        Ok(StreamEnd::Finished(bytes_received))
    }
}
