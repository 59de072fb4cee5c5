//! Error types for the download module.
//!
//! [`DownloadError`] describes why a single transfer attempt failed. It never
//! reaches the host application directly: the manager folds it into the job's
//! status text. [`ManagerError`] covers the few synchronous operations that can
//! fail for the caller (construction, config loading, opening the folder).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can end a single transfer attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the destination file.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or uses an unsupported scheme.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The byte stream broke for a reason reported by a non-HTTP source.
    #[error("transfer of {url} interrupted: {message}")]
    Stream {
        /// The URL being transferred.
        url: String,
        /// Source-provided description.
        message: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a stream interruption error.
    pub fn stream(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stream {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns true when the transfer could not begin at all.
    ///
    /// Such faults fail the job immediately; the retry budget is not consulted.
    #[must_use]
    pub fn is_start_fault(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. })
    }

    /// Returns the most specific description available.
    ///
    /// Walks the `source()` chain and reports the innermost error, falling back
    /// to this error's own message when there is no underlying cause.
    #[must_use]
    pub fn detail(&self) -> String {
        let mut current: &dyn std::error::Error = self;
        while let Some(source) = current.source() {
            current = source;
        }
        current.to_string()
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or `From<std::io::Error>`
// because our error variants require context (url, path) that the source errors
// don't provide. The helper constructor methods (network(), io(), etc.) are the
// correct pattern here as they allow callers to provide necessary context.

/// Errors surfaced synchronously to the host application.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A configuration value is outside its accepted range.
    #[error("invalid config value for `{field}`: {message}")]
    InvalidConfig {
        /// Config field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The config file could not be read or parsed.
    #[error("failed to load config file {path}: {message}")]
    ConfigFile {
        /// Config file path.
        path: PathBuf,
        /// Read or parse failure description.
        message: String,
    },

    /// The download directory could not be created.
    #[error("failed to create download directory {path}: {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The platform file browser could not be launched.
    #[error("failed to open download directory {path}: {source}")]
    OpenDirectory {
        /// Directory that was to be shown.
        path: PathBuf,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },
}
