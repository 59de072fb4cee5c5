//! Throughput and time-remaining estimation from periodic byte-count samples.
//!
//! The executor feeds every chunk's running total into a [`ProgressSampler`].
//! Only when at least one sample interval has passed does the sampler produce
//! an [`Estimate`]; that is also the only time a progress event goes out, so
//! fast links do not flood subscribers.

use std::time::{Duration, Instant};

/// A running byte count at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Bytes received so far in the current attempt.
    pub bytes_received: u64,
    /// When the count was observed.
    pub at: Instant,
}

/// Derived transfer rate and time remaining.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Bytes per second between the two samples.
    pub bytes_per_sec: f64,
    /// Seconds left, only when the total is known and the rate is positive.
    pub eta_seconds: Option<f64>,
}

/// Computes an estimate from two consecutive samples.
///
/// Returns `None` when no time has elapsed between them.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate(
    previous: ProgressSample,
    current: ProgressSample,
    total_bytes: Option<u64>,
) -> Option<Estimate> {
    let elapsed = current.at.checked_duration_since(previous.at)?.as_secs_f64();
    if elapsed <= 0.0 {
        return None;
    }

    let delta = current.bytes_received.saturating_sub(previous.bytes_received);
    let bytes_per_sec = delta as f64 / elapsed;

    let eta_seconds = match total_bytes {
        Some(total) if total > 0 && bytes_per_sec > 0.0 => {
            Some(total.saturating_sub(current.bytes_received) as f64 / bytes_per_sec)
        }
        _ => None,
    };

    Some(Estimate {
        bytes_per_sec,
        eta_seconds,
    })
}

/// Rate-limits estimation to one sample per interval.
#[derive(Debug, Clone)]
pub struct ProgressSampler {
    last: ProgressSample,
    interval: Duration,
}

impl ProgressSampler {
    /// Starts sampling at zero bytes.
    #[must_use]
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self {
            last: ProgressSample {
                bytes_received: 0,
                at: start,
            },
            interval,
        }
    }

    /// Records the running total and returns an estimate if the interval has passed.
    pub fn observe(
        &mut self,
        bytes_received: u64,
        now: Instant,
        total_bytes: Option<u64>,
    ) -> Option<Estimate> {
        if now.saturating_duration_since(self.last.at) < self.interval {
            return None;
        }
        let current = ProgressSample { bytes_received, at: now };
        let result = estimate(self.last, current, total_bytes);
        self.last = current;
        result
    }
}

/// Formats seconds as `01h 02m 03s`, dropping leading zero units.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_time_remaining(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours >= 1 {
        format!("{hours:02}h {minutes:02}m {secs:02}s")
    } else if minutes >= 1 {
        format!("{minutes:02}m {secs:02}s")
    } else {
        format!("{secs:02}s")
    }
}

/// Percentage complete; `0.0` while the total is unknown.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress_percentage(bytes_received: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }
    bytes_received as f64 * 100.0 / total_bytes as f64
}

/// Human-readable byte count (1024-based, up to GB).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn sample(bytes: u64, at: Instant) -> ProgressSample {
        ProgressSample {
            bytes_received: bytes,
            at,
        }
    }

    #[test]
    fn test_estimate_throughput_and_eta() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(2);
        let est = estimate(sample(0, t0), sample(2_000, t1), Some(10_000)).unwrap();
        assert_eq!(est.bytes_per_sec, 1_000.0);
        assert_eq!(est.eta_seconds, Some(8.0));
    }

    #[test]
    fn test_estimate_unknown_total_has_no_eta() {
        let t0 = Instant::now();
        let est = estimate(
            sample(0, t0),
            sample(500, t0 + Duration::from_secs(1)),
            None,
        )
        .unwrap();
        assert_eq!(est.bytes_per_sec, 500.0);
        assert!(est.eta_seconds.is_none());
    }

    #[test]
    fn test_estimate_zero_throughput_has_no_eta() {
        let t0 = Instant::now();
        let est = estimate(
            sample(100, t0),
            sample(100, t0 + Duration::from_secs(1)),
            Some(1_000),
        )
        .unwrap();
        assert_eq!(est.bytes_per_sec, 0.0);
        assert!(est.eta_seconds.is_none());
    }

    #[test]
    fn test_estimate_same_instant_is_none() {
        let t0 = Instant::now();
        assert!(estimate(sample(0, t0), sample(10, t0), None).is_none());
    }

    #[test]
    fn test_sampler_waits_for_interval() {
        let t0 = Instant::now();
        let mut sampler = ProgressSampler::new(t0, Duration::from_secs(1));

        assert!(
            sampler
                .observe(100, t0 + Duration::from_millis(400), Some(1_000))
                .is_none()
        );
        assert!(
            sampler
                .observe(300, t0 + Duration::from_millis(900), Some(1_000))
                .is_none()
        );

        let est = sampler
            .observe(1_000, t0 + Duration::from_secs(1), Some(4_000))
            .unwrap();
        assert_eq!(est.bytes_per_sec, 1_000.0);
        assert_eq!(est.eta_seconds, Some(3.0));

        // The window restarts at the last emitted sample.
        assert!(
            sampler
                .observe(1_500, t0 + Duration::from_millis(1_500), Some(4_000))
                .is_none()
        );
        let est = sampler
            .observe(3_000, t0 + Duration::from_secs(3), Some(4_000))
            .unwrap();
        assert_eq!(est.bytes_per_sec, 1_000.0);
    }

    #[test]
    fn test_format_time_remaining_drops_leading_units() {
        assert_eq!(format_time_remaining(5.0), "05s");
        assert_eq!(format_time_remaining(65.4), "01m 05s");
        assert_eq!(format_time_remaining(3_723.0), "01h 02m 03s");
        assert_eq!(format_time_remaining(0.0), "00s");
        assert_eq!(format_time_remaining(f64::NAN), "00s");
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(progress_percentage(512_000, 1_024_000), 50.0);
        assert_eq!(progress_percentage(512_000, 0), 0.0);
        assert_eq!(progress_percentage(0, 0), 0.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1_536), "1.5 KB");
        assert_eq!(format_bytes(10_485_760), "10 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }
}
