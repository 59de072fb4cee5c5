//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Download files concurrently with retry and live progress.
///
/// Transfer Deck accepts URLs as arguments or newline-separated on stdin,
/// runs a bounded number of transfers at once and reports each outcome.
#[derive(Parser, Debug)]
#[command(name = "transfer-deck")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (reads stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Delay before each retry in milliseconds (max 60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub retry_delay_ms: Option<u64>,

    /// Directory to save downloads into
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// TOML config file; command-line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Open the download directory when finished
    #[arg(long)]
    pub open: bool,

    /// Print the final job list as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["transfer-deck"]).unwrap();
        assert!(args.urls.is_empty());
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.concurrency.is_none());
        assert!(args.max_retries.is_none());
        assert!(args.config.is_none());
        assert!(!args.open);
        assert!(!args.json);
    }

    #[test]
    fn test_cli_positional_urls() {
        let args = Args::try_parse_from([
            "transfer-deck",
            "https://example.com/a.zip",
            "https://example.com/b.zip",
        ])
        .unwrap();
        assert_eq!(args.urls.len(), 2);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["transfer-deck", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["transfer-deck", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["transfer-deck", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["transfer-deck", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["transfer-deck", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_concurrency_short_flag() {
        let args = Args::try_parse_from(["transfer-deck", "-c", "5"]).unwrap();
        assert_eq!(args.concurrency, Some(5));
    }

    #[test]
    fn test_cli_concurrency_zero_rejected() {
        let err = Args::try_parse_from(["transfer-deck", "-c", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_concurrency_over_max_rejected() {
        let err = Args::try_parse_from(["transfer-deck", "-c", "101"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_max_retries_over_max_rejected() {
        let err = Args::try_parse_from(["transfer-deck", "-r", "11"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_retry_delay_and_output_dir() {
        let args = Args::try_parse_from([
            "transfer-deck",
            "--retry-delay-ms",
            "250",
            "-o",
            "/tmp/dl",
        ])
        .unwrap();
        assert_eq!(args.retry_delay_ms, Some(250));
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/dl")));
    }

    #[test]
    fn test_cli_config_open_and_json_flags() {
        let args =
            Args::try_parse_from(["transfer-deck", "--config", "deck.toml", "--open", "--json"])
                .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("deck.toml")));
        assert!(args.open);
        assert!(args.json);
    }
}
