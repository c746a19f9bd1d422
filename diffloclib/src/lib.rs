//! # diffloclib
//!
//! A line counter that knows about git: it counts lines per file and, when the
//! analyzed directory is a repository, splits files into changed and unchanged
//! relative to the `HEAD` commit with added/removed line estimates.
//!
//! ## Overview
//!
//! - **Filter**: decides which relative paths are counted (always-excluded
//!   dependency and build trees, optional test files, custom regexes, `.gitignore`
//!   rules, extension allow-list)
//! - **Line counter**: newline count per file, with NUL-based binary detection
//! - **Diff estimator**: frequency-based added/removed line estimate
//! - **Repository resolver**: baseline tree and working-tree status via `gix`
//! - **Analyzer**: bounded worker pools feeding a single aggregating consumer
//!
//! ## Change estimation
//!
//! Added and removed lines are estimated by comparing how often each distinct line
//! occurs in the committed and working versions. This is not a longest-common
//! subsequence diff: a line that only moved is not reported.
//!
//! ## Example
//!
//! ```rust
//! use diffloclib::{analyze, CancellationToken, FilterConfig};
//! use std::fs;
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! fs::write(dir.path().join("main.go"), "package main\n\nfunc main() {}\n").unwrap();
//! fs::write(dir.path().join("notes.txt"), "not counted\n").unwrap();
//!
//! let filter = FilterConfig::builder().exclude_tests(true).build();
//! let stats = analyze(dir.path(), &filter, &CancellationToken::new()).unwrap();
//!
//! assert_eq!(stats.total_files, 1);
//! assert_eq!(stats.total_lines, 3);
//! assert!(stats.changed_files.is_empty());
//! ```

pub mod analyzer;
pub mod counter;
pub mod diff;
pub mod error;
pub mod filter;
pub mod options;
pub mod repo;
pub mod stats;

pub use analyzer::{analyze, AnalysisMode, Analyzer};
pub use counter::{count_bytes, count_lines, count_reader, LineCount};
pub use diff::{estimate, estimate_content, LineDiff};
pub use error::DifflocError;
pub use filter::{
    discover_files, load_ignore_file, FilterBuilder, FilterConfig, GlobRule, PathMatcher,
};
pub use options::{AnalyzeOptions, Pass, Progress, ProgressFn, SortMode, MAX_WORKERS};
pub use repo::{is_repository, repository_root, FileStatus, Repository, RepositoryView};
pub use stats::{FileRecord, StatsAggregate};

pub use tokio_util::sync::CancellationToken;

/// Result type for diffloclib operations
pub type Result<T> = std::result::Result<T, DifflocError>;
