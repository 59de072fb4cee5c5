//! Notification bus for job progress and completion.
//!
//! Built on a `tokio::sync::broadcast` channel: every subscriber owns its own
//! receiver, so a subscriber that stalls, errors or panics cannot hold up the
//! others or the transfers producing the events. A subscriber that falls more
//! than the channel capacity behind skips the events it missed.

use std::error::Error;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::constants::EVENT_CAPACITY_RANGE;
use super::job::JobSnapshot;

/// Event delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// Submission, periodic progress sample, pause/retry/resume transitions.
    ProgressChanged(JobSnapshot),
    /// Exactly once per terminal outcome.
    Completed(JobSnapshot),
}

impl DownloadEvent {
    /// The job snapshot carried by the event.
    #[must_use]
    pub fn job(&self) -> &JobSnapshot {
        match self {
            Self::ProgressChanged(job) | Self::Completed(job) => job,
        }
    }

    /// Returns true for [`DownloadEvent::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Fan-out of [`DownloadEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DownloadEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    ///
    /// The capacity is clamped to [`EVENT_CAPACITY_RANGE`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(*EVENT_CAPACITY_RANGE.start(), *EVENT_CAPACITY_RANGE.end());
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Delivers an event to all current subscribers.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: DownloadEvent) {
        if self.sender.receiver_count() > 0 {
            let _ = self.sender.send(event);
        }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Runs `handler` for every event on a dedicated task.
    ///
    /// Errors returned by the handler are logged and delivery continues. The
    /// task ends when the bus is dropped, or early if the handler panics.
    pub fn spawn_handler<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&DownloadEvent) -> Result<(), Box<dyn Error + Send + Sync>> + Send + 'static,
    {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if let Err(e) = handler(&event) {
                            warn!(job = %event.job().id, error = %e, "event handler failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event handler lagged behind, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("event bus closed, handler exiting");
                        break;
                    }
                }
            }
        })
    }
}
