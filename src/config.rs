//! Manager configuration: injected limits and an optional TOML file.
//!
//! Everything the manager treats as a policy constant (concurrency cap, retry
//! budget, backoff delay, sampling interval) is a field here so hosts and
//! tests can choose their own values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY, DEFAULT_SAMPLE_INTERVAL, DOWNLOAD_DIR_NAME, EVENT_CAPACITY_RANGE,
    MAX_CONCURRENT_RANGE, MAX_RETRIES_RANGE, READ_TIMEOUT_SECS, RETRY_DELAY_MS_RANGE,
    SAMPLE_INTERVAL_MS_RANGE,
};
use crate::download::{ManagerError, RetryPolicy};

/// Accepted range for HTTP timeouts, in seconds.
const TIMEOUT_SECS_RANGE: std::ops::RangeInclusive<u64> = 1..=3600;

/// Settings injected into [`DownloadManager`](crate::DownloadManager) at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Folder downloads are written to; created if absent.
    pub download_dir: PathBuf,
    /// Maximum simultaneously running transfers.
    pub max_concurrent: usize,
    /// Re-attempts allowed after a job's first failed attempt.
    pub max_retries: u32,
    /// Fixed wait before each re-attempt.
    pub retry_delay: Duration,
    /// Minimum spacing between progress samples.
    pub sample_interval: Duration,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Events buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DOWNLOAD_DIR_NAME),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Default settings writing into `download_dir`.
    #[must_use]
    pub fn in_dir(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the concurrency cap.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff delay.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Sets the progress sampling interval.
    #[must_use]
    pub fn with_sample_interval(mut self, sample_interval: Duration) -> Self {
        self.sample_interval = sample_interval;
        self
    }

    /// Retry policy derived from these settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Validates values against their accepted ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ManagerError> {
        if !MAX_CONCURRENT_RANGE.contains(&self.max_concurrent) {
            return Err(out_of_range(
                "max_concurrent",
                self.max_concurrent,
                &MAX_CONCURRENT_RANGE,
            ));
        }
        if !MAX_RETRIES_RANGE.contains(&self.max_retries) {
            return Err(out_of_range(
                "max_retries",
                self.max_retries,
                &MAX_RETRIES_RANGE,
            ));
        }
        if !TIMEOUT_SECS_RANGE.contains(&self.connect_timeout_secs) {
            return Err(out_of_range(
                "connect_timeout_secs",
                self.connect_timeout_secs,
                &TIMEOUT_SECS_RANGE,
            ));
        }
        if !TIMEOUT_SECS_RANGE.contains(&self.read_timeout_secs) {
            return Err(out_of_range(
                "read_timeout_secs",
                self.read_timeout_secs,
                &TIMEOUT_SECS_RANGE,
            ));
        }
        let retry_delay_ms = millis(self.retry_delay);
        if !RETRY_DELAY_MS_RANGE.contains(&retry_delay_ms) {
            return Err(out_of_range(
                "retry_delay_ms",
                retry_delay_ms,
                &RETRY_DELAY_MS_RANGE,
            ));
        }
        let sample_interval_ms = millis(self.sample_interval);
        if !SAMPLE_INTERVAL_MS_RANGE.contains(&sample_interval_ms) {
            return Err(out_of_range(
                "sample_interval_ms",
                sample_interval_ms,
                &SAMPLE_INTERVAL_MS_RANGE,
            ));
        }
        if !EVENT_CAPACITY_RANGE.contains(&self.event_capacity) {
            return Err(out_of_range(
                "event_capacity",
                self.event_capacity,
                &EVENT_CAPACITY_RANGE,
            ));
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(ManagerError::InvalidConfig {
                field: "download_dir",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Parses TOML text, applying present keys on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::ConfigFile`] for malformed TOML or unknown keys,
    /// and [`ManagerError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ManagerError> {
        let file: FileConfig = toml::from_str(raw).map_err(|e| ManagerError::ConfigFile {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = file.apply(Self::default());
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Same as [`from_toml_str`](Self::from_toml_str), plus
    /// [`ManagerError::ConfigFile`] when the file cannot be read.
    pub fn load_file(path: &Path) -> Result<Self, ManagerError> {
        let raw = fs::read_to_string(path).map_err(|e| ManagerError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&raw, path)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn out_of_range<T: std::fmt::Display>(
    field: &'static str,
    value: T,
    range: &std::ops::RangeInclusive<T>,
) -> ManagerError {
    ManagerError::InvalidConfig {
        field,
        message: format!(
            "{value} is outside {}..={}",
            range.start(),
            range.end()
        ),
    }
}

/// On-disk shape of the config file; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    download_dir: Option<PathBuf>,
    max_concurrent: Option<usize>,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    sample_interval_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    event_capacity: Option<usize>,
}

impl FileConfig {
    fn apply(self, mut base: ManagerConfig) -> ManagerConfig {
        if let Some(dir) = self.download_dir {
            base.download_dir = dir;
        }
        if let Some(value) = self.max_concurrent {
            base.max_concurrent = value;
        }
        if let Some(value) = self.max_retries {
            base.max_retries = value;
        }
        if let Some(ms) = self.retry_delay_ms {
            base.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.sample_interval_ms {
            base.sample_interval = Duration::from_millis(ms);
        }
        if let Some(value) = self.connect_timeout_secs {
            base.connect_timeout_secs = value;
        }
        if let Some(value) = self.read_timeout_secs {
            base.read_timeout_secs = value;
        }
        if let Some(value) = self.event_capacity {
            base.event_capacity = value;
        }
        base
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ManagerConfig::default();
        assert_eq!(config.download_dir, PathBuf::from("Downloads"));
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.sample_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ManagerConfig::default().with_max_concurrent(0);
        assert!(matches!(
            config.validate(),
            Err(ManagerError::InvalidConfig {
                field: "max_concurrent",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_excessive_retries() {
        let config = ManagerConfig::default().with_max_retries(11);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("0..=10"), "got {err}");
    }

    #[test]
    fn test_validate_rejects_excessive_event_capacity() {
        let mut config = ManagerConfig::default();
        config.event_capacity = usize::MAX;
        assert!(matches!(
            config.validate(),
            Err(ManagerError::InvalidConfig {
                field: "event_capacity",
                ..
            })
        ));

        config.event_capacity = 0;
        assert!(config.validate().is_err());

        config.event_capacity = 65_536;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bounds_retry_delay_and_sample_interval() {
        let config = ManagerConfig::default().with_retry_delay(Duration::from_secs(61));
        assert!(matches!(
            config.validate(),
            Err(ManagerError::InvalidConfig {
                field: "retry_delay_ms",
                ..
            })
        ));

        let config = ManagerConfig::default().with_sample_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ManagerError::InvalidConfig {
                field: "sample_interval_ms",
                ..
            })
        ));

        let config = ManagerConfig::default()
            .with_retry_delay(Duration::ZERO)
            .with_sample_interval(Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_overrides_present_keys_only() {
        let raw = r#"
            download_dir = "/tmp/dl"
            max_concurrent = 5
            retry_delay_ms = 250
        "#;
        let config = ManagerConfig::from_toml_str(raw, Path::new("config.toml")).unwrap();
        assert_eq!(config.download_dir, PathBuf::from("/tmp/dl"));
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result = ManagerConfig::from_toml_str("colour = \"blue\"", Path::new("c.toml"));
        assert!(matches!(result, Err(ManagerError::ConfigFile { .. })));
    }

    #[test]
    fn test_from_toml_validates_ranges() {
        let result = ManagerConfig::from_toml_str("max_concurrent = 0", Path::new("c.toml"));
        assert!(matches!(result, Err(ManagerError::InvalidConfig { .. })));

        let result =
            ManagerConfig::from_toml_str("event_capacity = 100000000000", Path::new("c.toml"));
        assert!(matches!(
            result,
            Err(ManagerError::InvalidConfig {
                field: "event_capacity",
                ..
            })
        ));

        let result =
            ManagerConfig::from_toml_str("sample_interval_ms = 3600000", Path::new("c.toml"));
        assert!(matches!(
            result,
            Err(ManagerError::InvalidConfig {
                field: "sample_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_load_file_missing_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let err = ManagerConfig::load_file(&path).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_load_file_reads_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_retries = 1\nsample_interval_ms = 100\n").unwrap();
        let config = ManagerConfig::load_file(&path).unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.sample_interval, Duration::from_millis(100));
    }
}
