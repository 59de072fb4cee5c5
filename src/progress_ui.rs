//! Progress UI (spinner) for download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use transfer_deck::{DownloadManager, JobStatus, format_bytes};

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    manager: DownloadManager,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(manager, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    manager: DownloadManager,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            spinner.set_message(status_line(&manager));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}

/// `[done/total] file.zip 45.2% 1.5 MB/s 01m 05s`, describing the first running job.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn status_line(manager: &DownloadManager) -> String {
    let jobs = manager.list_jobs();
    let done = jobs.iter().filter(|job| job.is_terminal()).count();
    let current = jobs
        .iter()
        .find(|job| matches!(job.status, JobStatus::Downloading | JobStatus::Retrying { .. }));

    let Some(job) = current else {
        return format!("[{done}/{}] Waiting...", jobs.len());
    };

    let mut line = format!("[{done}/{}] {}", jobs.len(), job.file_name);
    match job.status {
        JobStatus::Retrying { .. } => {
            line.push(' ');
            line.push_str(&job.status.to_string());
        }
        _ if job.total_bytes > 0 => {
            line.push_str(&format!(" {:.1}%", job.progress_percentage()));
        }
        _ => {
            line.push(' ');
            line.push_str(&format_bytes(job.bytes_received));
        }
    }
    if job.throughput_bytes_per_sec > 0.0 {
        let rate = job.throughput_bytes_per_sec as u64;
        line.push_str(&format!(" {}/s", format_bytes(rate)));
    }
    if let Some(remaining) = job.time_remaining() {
        line.push(' ');
        line.push_str(&remaining);
    }
    line
}
