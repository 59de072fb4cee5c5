//! The streaming-transfer capability the manager consumes.
//!
//! The manager never speaks HTTP itself. It asks a [`TransferSource`] to open a
//! URL and receives the declared size plus a stream of body chunks. The
//! production source is [`HttpClient`](super::HttpClient); tests plug in
//! scripted sources.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use url::Url;

use super::DownloadError;

/// An opened transfer: declared size and the body as a chunk stream.
pub struct TransferBody {
    /// Size declared by the server, if any.
    pub total_bytes: Option<u64>,
    /// Body chunks in order. An `Err` item ends the attempt as a failure.
    pub chunks: BoxStream<'static, Result<Bytes, DownloadError>>,
}

impl fmt::Debug for TransferBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBody")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Opens streaming transfers.
///
/// Implementations must be cheap to share across tasks; the manager holds one
/// instance behind an `Arc` for all jobs.
#[async_trait]
pub trait TransferSource: Send + Sync + fmt::Debug {
    /// Begins a transfer of `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] if the request cannot be made or the server
    /// rejects it.
    async fn open(&self, url: &Url) -> Result<TransferBody, DownloadError>;
}
