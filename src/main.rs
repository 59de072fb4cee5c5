//! CLI entry point for the transfer-deck tool.

use std::io::{self, IsTerminal, Read};
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info, warn};
use transfer_deck::{DownloadEvent, DownloadManager, JobStatus, ManagerConfig};

mod cli;
mod progress_ui;

use cli::Args;
use progress_ui::spawn_progress_ui;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = build_config(&args)?;

    // Read input: from positional args or stdin
    let urls: Vec<String> = if !args.urls.is_empty() {
        args.urls.clone()
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        parse_url_lines(&buffer)
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/file.zip' | transfer-deck");
        return Ok(());
    };

    if urls.is_empty() {
        info!("No URLs found in input");
        return Ok(());
    }

    let manager = DownloadManager::with_http_client(config)?;
    info!(
        urls = urls.len(),
        dir = %manager.download_directory().display(),
        "Transfer Deck starting"
    );

    let _logger = manager.events().spawn_handler(|event| {
        if let DownloadEvent::Completed(job) = event {
            match &job.status {
                JobStatus::Failed { message } => {
                    warn!(file = %job.file_name, error = %message, "download failed");
                }
                status => info!(file = %job.file_name, %status, "download finished"),
            }
        }
        Ok(())
    });

    for url in &urls {
        if manager.submit(url, None).is_none() {
            warn!(url = %url, "skipped blank url");
        }
    }

    let use_spinner = !args.quiet && !args.json && io::stderr().is_terminal();
    let (spinner, stop) = spawn_progress_ui(use_spinner, manager.clone());

    tokio::select! {
        () = manager.wait_for_idle() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            warn!("interrupted, cancelling active downloads");
            manager.cancel_all();
            // Let cancellations settle before reporting.
            let _ = tokio::time::timeout(Duration::from_secs(5), manager.wait_for_idle()).await;
        }
    }

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    let jobs = manager.list_jobs();
    let summary = manager.summary();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else if !args.quiet {
        for job in &jobs {
            println!("{}\t{}", job.status, job.destination_path.display());
        }
        println!("{summary}");
    }

    if args.open {
        if let Err(e) = manager.open_download_directory() {
            warn!(error = %e, "could not open download directory");
        }
    }

    if summary.failed > 0 {
        bail!("{} of {} downloads failed", summary.failed, summary.total);
    }
    Ok(())
}

/// Loads the optional config file and applies command-line overrides.
fn build_config(args: &Args) -> Result<ManagerConfig> {
    let mut config = match &args.config {
        Some(path) => ManagerConfig::load_file(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(dir) = &args.output_dir {
        config.download_dir.clone_from(dir);
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrent = usize::from(concurrency);
    }
    if let Some(retries) = args.max_retries {
        config.max_retries = u32::from(retries);
    }
    if let Some(ms) = args.retry_delay_ms {
        config.retry_delay = Duration::from_millis(ms);
    }
    config.validate()?;
    Ok(config)
}

/// One URL per line; blank lines and `#` comments are skipped.
fn parse_url_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
