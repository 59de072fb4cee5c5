//! Constants for the download module (admission, retry, sampling, timeouts).

use std::time::Duration;

/// Default cap on simultaneously running transfers.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Default retry budget per job (re-attempts after the first attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed wait between a failed attempt and its retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Minimum spacing between throughput samples (and progress events).
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Name of the download folder created under the working directory.
pub const DOWNLOAD_DIR_NAME: &str = "Downloads";

/// Buffered events per subscriber before a slow subscriber starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Accepted range for the concurrency cap.
pub const MAX_CONCURRENT_RANGE: std::ops::RangeInclusive<usize> = 1..=100;

/// Accepted range for the retry budget.
pub const MAX_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 0..=10;

/// Accepted range for per-subscriber event buffering.
pub const EVENT_CAPACITY_RANGE: std::ops::RangeInclusive<usize> = 1..=65_536;

/// Accepted range for the retry delay, in milliseconds.
pub const RETRY_DELAY_MS_RANGE: std::ops::RangeInclusive<u64> = 0..=60_000;

/// Accepted range for the progress sampling interval, in milliseconds.
pub const SAMPLE_INTERVAL_MS_RANGE: std::ops::RangeInclusive<u64> = 1..=60_000;
