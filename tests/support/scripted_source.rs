//! In-memory [`TransferSource`] whose behaviour is scripted per URL path.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use transfer_deck::{DownloadError, TransferBody, TransferSource};
use url::Url;

const CHUNK_SIZE: usize = 64 * 1024;
static ZEROS: [u8; CHUNK_SIZE] = [0; CHUNK_SIZE];

/// What one attempt against a path does.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Attempt {
    /// Streams `bytes` zero bytes and ends.
    Succeed { bytes: u64 },
    /// Streams `bytes` then fails with a connection reset.
    FailAfter { bytes: u64 },
    /// Streams `bytes` then stays open until cancelled.
    Hold { bytes: u64 },
    /// Fails to open with HTTP 503.
    Refuse,
    /// Waits `every` before each chunk: `data_chunks` chunks of `chunk_bytes`,
    /// then `idle_chunks` empty chunks, then stays open until cancelled.
    Paced {
        chunk_bytes: u64,
        data_chunks: u32,
        idle_chunks: u32,
        every: Duration,
    },
}

#[derive(Debug, Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Attempt>>>,
    opened: Mutex<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues attempts for `path`; unscripted opens succeed with 1 KiB.
    pub fn script(&self, path: &str, attempts: impl IntoIterator<Item = Attempt>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .extend(attempts);
    }

    /// Paths in the order they were opened.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn open_count(&self, path: &str) -> usize {
        self.opened().iter().filter(|p| *p == path).count()
    }

    /// Bodies currently being streamed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of bodies ever streamed at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferSource for ScriptedSource {
    async fn open(&self, url: &Url) -> Result<TransferBody, DownloadError> {
        let path = url.path().to_string();
        self.opened.lock().unwrap().push(path.clone());
        let attempt = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Attempt::Succeed { bytes: 1024 });

        let url = url.to_string();
        let (total, chunks) = match attempt {
            Attempt::Refuse => return Err(DownloadError::http_status(url, 503)),
            Attempt::Succeed { bytes } => (bytes, stream::iter(zero_chunks(bytes)).boxed()),
            Attempt::FailAfter { bytes } => {
                let failure = DownloadError::stream(url, "connection reset by peer");
                let chunks = stream::iter(zero_chunks(bytes)).chain(stream::iter([Err(failure)]));
                (bytes * 2, chunks.boxed())
            }
            Attempt::Hold { bytes } => {
                let chunks = stream::iter(zero_chunks(bytes)).chain(stream::pending());
                (bytes * 2, chunks.boxed())
            }
            Attempt::Paced {
                chunk_bytes,
                data_chunks,
                idle_chunks,
                every,
            } => {
                let len = usize::try_from(chunk_bytes).unwrap().min(CHUNK_SIZE);
                let sizes = std::iter::repeat_n(len, data_chunks as usize)
                    .chain(std::iter::repeat_n(0, idle_chunks as usize));
                let chunks = stream::iter(sizes)
                    .then(move |len| async move {
                        tokio::time::sleep(every).await;
                        Ok::<_, DownloadError>(Bytes::from_static(&ZEROS[..len]))
                    })
                    .chain(stream::pending());
                (chunk_bytes * u64::from(data_chunks) * 2, chunks.boxed())
            }
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(TransferBody {
            total_bytes: Some(total),
            chunks: Tracked {
                inner: chunks,
                in_flight: Arc::clone(&self.in_flight),
            }
            .boxed(),
        })
    }
}

fn zero_chunks(bytes: u64) -> Vec<Result<Bytes, DownloadError>> {
    let mut chunks = Vec::new();
    let mut left = bytes;
    while left > 0 {
        let len = usize::try_from(left.min(CHUNK_SIZE as u64)).unwrap();
        chunks.push(Ok(Bytes::from_static(&ZEROS[..len])));
        left -= len as u64;
    }
    chunks
}

/// Counts a body as in flight until the executor drops it.
struct Tracked {
    inner: BoxStream<'static, Result<Bytes, DownloadError>>,
    in_flight: Arc<AtomicUsize>,
}

impl Stream for Tracked {
    type Item = Result<Bytes, DownloadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
