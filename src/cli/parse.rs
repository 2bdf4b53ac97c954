//! CLI parse: clap types for `atc`. No behavior; definitions only.

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// AI Things Considered - daily six-panel news strip
#[derive(Parser, Debug)]
#[command(name = "atc")]
#[command(about = "Generate the daily six-panel AI Things Considered strip")]
pub struct Cli {
    /// Date to generate (YYYY-MM-DD); defaults to today
    #[arg(value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory for strips and metadata
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Reference manifest (JSON) of known people
    #[arg(long)]
    pub references: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_is_optional_positional() {
        let cli = Cli::try_parse_from(["atc"]).unwrap();
        assert!(cli.date.is_none());

        let cli = Cli::try_parse_from(["atc", "2026-01-16", "--output-dir", "/tmp/out"]).unwrap();
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2026, 1, 16));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn malformed_date_is_rejected() {
        assert!(Cli::try_parse_from(["atc", "16/01/2026"]).is_err());
        assert!(Cli::try_parse_from(["atc", "2026-02-30"]).is_err());
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["atc", "--verbose", "--quiet"]).is_err());
    }
}
