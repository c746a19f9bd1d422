//! # diffloc
//!
//! Diff line counter: lines of code per file, split into changed and unchanged files
//! when the analyzed directory is a git repository.
//!
//! ## Usage
//!
//! ```bash
//! # Analyze the current directory
//! diffloc
//!
//! # Only Go and Python, skipping test files
//! diffloc ./service --ext .go --ext .py --exclude-tests
//!
//! # JSON for scripts
//! diffloc . --output json
//!
//! # Biggest additions first
//! diffloc . --sort additions
//! ```
//!
//! Settings may also come from `.diffloc.yaml` in the current directory (or `--config`);
//! flags given on the command line win.

mod config;
mod progress;
mod render;
mod safety;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use diffloclib::{
    is_repository, AnalyzeOptions, Analyzer, CancellationToken, FilterConfig, SortMode,
    StatsAggregate, MAX_WORKERS,
};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::progress::ProgressReporter;

/// Exit code for a run stopped by SIGINT.
const EXIT_CANCELED: u8 = 130;

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "DIFFLOC_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
}

/// Build the clap Command structure
fn build_command() -> Command {
    Command::new("diffloc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Count lines of code, split into changed and unchanged files against git HEAD")
        .arg(
            Arg::new("path")
                .help("Path to analyze (defaults to current directory)")
                .value_parser(value_parser!(PathBuf))
                .default_value("."),
        )
        .arg(
            Arg::new("no-gitignore")
                .long("no-gitignore")
                .action(ArgAction::SetTrue)
                .help("Ignore .gitignore patterns (always-excluded patterns still apply)"),
        )
        .arg(
            Arg::new("exclude-tests")
                .long("exclude-tests")
                .action(ArgAction::SetTrue)
                .help("Exclude test files (_test.go, test/, tests/, *.test.*, *.spec.*)"),
        )
        .arg(
            Arg::new("exclude")
                .short('e')
                .long("exclude")
                .action(ArgAction::Append)
                .help("Additional exclusion regex (can be repeated)"),
        )
        .arg(
            Arg::new("ext")
                .long("ext")
                .action(ArgAction::Append)
                .help("Override allowed file extensions (can be repeated)"),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_parser(value_parser!(usize))
                .help("Maximum directory depth (0 = unlimited)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default is .diffloc.yaml)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(["table", "json"])
                .default_value("table")
                .help("Output format"),
        )
        .arg(
            Arg::new("no-tui")
                .long("no-tui")
                .action(ArgAction::SetTrue)
                .help("Output JSON (same as --output json)"),
        )
        .arg(
            Arg::new("sort")
                .short('s')
                .long("sort")
                .value_parser(value_parser!(SortMode))
                .default_value("lines")
                .help("Sort files by name, lines, additions or deletions"),
        )
        .arg(
            Arg::new("reverse")
                .short('r')
                .long("reverse")
                .action(ArgAction::SetTrue)
                .help("Reverse the sort order"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_parser(value_parser!(usize))
                .help("Worker threads per pass (default 16)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Log progress to stderr (-v info, -vv debug)"),
        )
}

/// Install the stderr subscriber; `DIFFLOC_LOG` overrides the verbosity flags.
fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Build the filter, loading `.gitignore` from the repository root when enabled.
fn build_filter(settings: &Settings, root: &Path) -> FilterConfig {
    let mut builder = FilterConfig::builder()
        .extensions(settings.ext.iter().cloned())
        .exclude_many(settings.exclude.iter().cloned())
        .exclude_tests(settings.exclude_tests)
        .respect_ignore_file(!settings.no_gitignore);

    if !settings.no_gitignore && is_repository(root) {
        builder = builder.ignore_file_root(root);
    }
    builder.build()
}

fn output_format(matches: &ArgMatches) -> OutputFormat {
    if matches.get_flag("no-tui") {
        return OutputFormat::Json;
    }
    match matches.get_one::<String>("output").map(String::as_str) {
        Some("json") => OutputFormat::Json,
        _ => OutputFormat::Table,
    }
}

/// Numeric columns list the largest first unless reversed; names list A-Z.
fn sort_stats(stats: &mut StatsAggregate, mode: SortMode, reverse: bool) {
    let descending = mode != SortMode::Name;
    stats.sort(mode, descending != reverse);
}

/// SIGINT, plus SIGTERM on unix.
struct ShutdownSignal {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignal {
    /// Registers the handlers; must be called inside the runtime.
    fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let terminate = signal(SignalKind::terminate())
                .map_err(|e| tracing::warn!(error = %e, "cannot listen for SIGTERM"))
                .ok();
            Self { terminate }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// Resolves once a signal arrives; `false` if no signal can be received.
    async fn recv(&mut self) -> bool {
        #[cfg(unix)]
        if let Some(terminate) = self.terminate.as_mut() {
            return tokio::select! {
                res = tokio::signal::ctrl_c() => res.is_ok(),
                got = terminate.recv() => got.is_some(),
            };
        }
        tokio::signal::ctrl_c().await.is_ok()
    }
}

async fn run(matches: &ArgMatches) -> anyhow::Result<ExitCode> {
    let file_config = config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    if let Some((path, _)) = &file_config {
        eprintln!("Using config file: {}", path.display());
    }
    let settings = Settings::resolve(matches, file_config.as_ref().map(|(_, c)| c));

    let path = matches
        .get_one::<PathBuf>("path")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let root = safety::validate_path(&path)?;
    if let Some(warning) = safety::large_directory_warning(&root) {
        eprintln!("{warning}");
    }

    let filter = build_filter(&settings, &root);
    tracing::debug!(
        extensions = filter.allowed_extensions().len(),
        ignore_rules = filter.ignore_rule_count(),
        gitignore = filter.respects_ignore_file(),
        exclude_tests = filter.excludes_tests(),
        "filter ready"
    );

    let token = CancellationToken::new();
    let reporter = ProgressReporter::new();
    let sink = Arc::clone(&reporter);
    let options = AnalyzeOptions::new()
        .workers(matches.get_one::<usize>("jobs").copied().unwrap_or(MAX_WORKERS))
        .max_depth(settings.max_depth)
        .cancel_token(token.clone())
        .on_progress(move |p| sink.update(p));
    let analyzer = Analyzer::new(filter).options(options);

    let signal_token = token.clone();
    let mut shutdown = ShutdownSignal::new();
    let watcher = tokio::spawn(async move {
        if shutdown.recv().await {
            eprintln!("\nReceived interrupt signal, canceling...");
            signal_token.cancel();
        }
    });

    let result = tokio::task::spawn_blocking(move || analyzer.run(&root))
        .await
        .context("analysis task failed")?;
    watcher.abort();
    reporter.finish();

    let mut stats = match result {
        Ok(stats) => stats,
        Err(e) if e.is_canceled() => {
            eprintln!("\nAnalysis canceled by user");
            return Ok(ExitCode::from(EXIT_CANCELED));
        }
        Err(e) => return Err(e.into()),
    };

    let mode = matches
        .get_one::<SortMode>("sort")
        .copied()
        .unwrap_or_default();
    sort_stats(&mut stats, mode, matches.get_flag("reverse"));

    match output_format(matches) {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&stats).context("failed to marshal JSON")?;
            println!("{json}");
        }
        OutputFormat::Table => print!("{}", render::render_stats(&stats)),
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = build_command().get_matches();
    init_tracing(matches.get_count("verbose"));

    match run(&matches).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffloclib::{FileRecord, LineDiff};

    fn parse(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["diffloc"];
        argv.extend_from_slice(args);
        build_command().try_get_matches_from(argv).unwrap()
    }

    #[test]
    fn test_command_is_valid() {
        build_command().debug_assert();
    }

    #[test]
    fn test_output_format() {
        assert_eq!(output_format(&parse(&[])), OutputFormat::Table);
        assert_eq!(output_format(&parse(&["-o", "json"])), OutputFormat::Json);
        assert_eq!(output_format(&parse(&["--no-tui"])), OutputFormat::Json);
        assert!(build_command()
            .try_get_matches_from(["diffloc", "-o", "xml"])
            .is_err());
    }

    #[test]
    fn test_sort_and_jobs_parsing() {
        let matches = parse(&["--sort", "deletions", "-j", "4"]);
        assert_eq!(
            matches.get_one::<SortMode>("sort").copied(),
            Some(SortMode::Deletions)
        );
        assert_eq!(matches.get_one::<usize>("jobs").copied(), Some(4));
        assert!(build_command()
            .try_get_matches_from(["diffloc", "--sort", "size"])
            .is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_signal_is_received() {
        let mut shutdown = ShutdownSignal::new();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), shutdown.recv())
            .await
            .unwrap();
        assert!(received);
    }

    #[test]
    fn test_sort_stats_directions() {
        let mut stats = StatsAggregate::new();
        stats.merge(FileRecord::unchanged("b.go", 1));
        stats.merge(FileRecord::unchanged("a.go", 9));
        stats.merge(FileRecord::changed("c.go", 2, LineDiff::new(2, 0)));
        stats.finalize();

        sort_stats(&mut stats, SortMode::Lines, false);
        assert_eq!(stats.unchanged_files[0].path, "a.go");
        sort_stats(&mut stats, SortMode::Lines, true);
        assert_eq!(stats.unchanged_files[0].path, "b.go");
        sort_stats(&mut stats, SortMode::Name, false);
        assert_eq!(stats.unchanged_files[0].path, "a.go");
    }
}
