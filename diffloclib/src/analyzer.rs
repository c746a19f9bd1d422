//! Analysis orchestration.
//!
//! Each pass fans its file list out to a bounded rayon pool. Workers send their
//! results over a channel; the calling thread is the only consumer and the only
//! writer of the [`StatsAggregate`].

use std::fs;
use std::path::Path;

use crossbeam_channel::unbounded;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio_util::sync::CancellationToken;

use crate::counter::{count_bytes, count_lines, LineCount};
use crate::diff::{estimate_content, LineDiff};
use crate::error::DifflocError;
use crate::filter::{discover_files, path_depth, FilterConfig};
use crate::options::{AnalyzeOptions, Pass, Progress};
use crate::repo::{is_repository, FileStatus, Repository, RepositoryView};
use crate::stats::{FileRecord, StatsAggregate};
use crate::Result;

/// How the root is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Directory walk; every file is unchanged
    Plain,
    /// Status plus baseline of the repository at the root
    Repository,
}

impl AnalysisMode {
    /// Repository mode iff `root` itself is a repository working directory.
    pub fn detect(root: impl AsRef<Path>) -> Self {
        if is_repository(root) {
            AnalysisMode::Repository
        } else {
            AnalysisMode::Plain
        }
    }
}

/// Analyze `root` with default execution options.
pub fn analyze(
    root: impl AsRef<Path>,
    filter: &FilterConfig,
    cancel: &CancellationToken,
) -> Result<StatsAggregate> {
    Analyzer::new(filter.clone())
        .options(AnalyzeOptions::new().cancel_token(cancel.clone()))
        .run(root)
}

/// Runs analyses with a fixed filter and options.
#[derive(Debug, Clone)]
pub struct Analyzer {
    filter: FilterConfig,
    options: AnalyzeOptions,
}

impl Analyzer {
    pub fn new(filter: FilterConfig) -> Self {
        Self {
            filter,
            options: AnalyzeOptions::default(),
        }
    }

    /// Builder: replace the execution options
    pub fn options(mut self, options: AnalyzeOptions) -> Self {
        self.options = options;
        self
    }

    /// Analyze `root`.
    ///
    /// Returns [`DifflocError::Canceled`] if the token fires before the run completes,
    /// even when some records were already merged.
    pub fn run(&self, root: impl AsRef<Path>) -> Result<StatsAggregate> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DifflocError::PathNotFound(root.to_path_buf()));
        }
        if self.options.cancel.is_cancelled() {
            return Err(DifflocError::Canceled);
        }

        let mode = AnalysisMode::detect(root);
        tracing::debug!(root = %root.display(), ?mode, "starting analysis");

        let mut stats = StatsAggregate::new();
        match mode {
            AnalysisMode::Plain => self.run_plain(root, &mut stats)?,
            AnalysisMode::Repository => self.run_repository(root, &mut stats)?,
        }
        stats.finalize();

        tracing::info!(
            files = stats.total_files,
            changed = stats.changed_count,
            lines = stats.total_lines,
            additions = stats.total_additions,
            deletions = stats.total_deletions,
            "analysis complete"
        );
        Ok(stats)
    }

    fn run_plain(&self, root: &Path, stats: &mut StatsAggregate) -> Result<()> {
        let files = discover_files(
            root,
            &self.filter,
            self.options.max_depth,
            &self.options.cancel,
        )?;
        tracing::debug!(files = files.len(), "plain pass");

        self.run_pass(Pass::Files, files, stats, |path| {
            Ok(count_file(root, path)
                .map(|count| FileRecord::unchanged(path.as_str(), count.lines)))
        })
    }

    fn run_repository(&self, root: &Path, stats: &mut StatsAggregate) -> Result<()> {
        let repo = Repository::open(root)?;
        let view = self
            .build_pool()?
            .install(|| repo.view(&self.filter, self.options.max_depth, &self.options.cancel))?;

        let changed: Vec<(String, FileStatus)> = view
            .status()
            .iter()
            .map(|(path, status)| (path.clone(), *status))
            .collect();
        tracing::debug!(files = changed.len(), "changed pass");
        self.run_pass(Pass::Changed, changed, stats, |(path, status)| {
            changed_record(&view, path, *status)
        })?;

        let unchanged: Vec<String> = view
            .unchanged_paths()
            .filter(|path| self.is_eligible(path))
            .map(str::to_string)
            .collect();
        tracing::debug!(files = unchanged.len(), "unchanged pass");
        self.run_pass(Pass::Unchanged, unchanged, stats, |path| {
            // stale baseline entries have no working copy and are skipped
            Ok(count_file(view.root(), path)
                .map(|count| FileRecord::unchanged(path.as_str(), count.lines)))
        })
    }

    fn is_eligible(&self, path: &str) -> bool {
        self.options
            .max_depth
            .map_or(true, |depth| path_depth(path) <= depth)
            && self.filter.should_include(path)
    }

    fn build_pool(&self) -> Result<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .build()
            .map_err(|e| DifflocError::Io(std::io::Error::other(e)))
    }

    /// Run `task` over `items` on a fresh pool and merge every record into `stats`.
    ///
    /// A task error aborts the pass and is returned; `Ok(None)` skips the item.
    fn run_pass<T, F>(
        &self,
        pass: Pass,
        items: Vec<T>,
        stats: &mut StatsAggregate,
        task: F,
    ) -> Result<()>
    where
        T: Send + Sync,
        F: Fn(&T) -> Result<Option<FileRecord>> + Sync,
    {
        let pool = self.build_pool()?;
        let total = items.len();
        let cancel = &self.options.cancel;
        let pass_token = cancel.child_token();
        let (tx, rx) = unbounded::<Result<Option<FileRecord>>>();
        let mut failure = None;

        std::thread::scope(|s| {
            let task = &task;
            let token = &pass_token;
            s.spawn(move || {
                pool.scope(|scope| {
                    for item in &items {
                        if token.is_cancelled() {
                            break;
                        }
                        let tx = tx.clone();
                        scope.spawn(move |_| {
                            if token.is_cancelled() {
                                return;
                            }
                            let result = task(item);
                            if !token.is_cancelled() {
                                let _ = tx.send(result);
                            }
                        });
                    }
                });
            });

            let mut completed = 0;
            for result in rx.iter() {
                completed += 1;
                match result {
                    Ok(Some(record)) => stats.merge(record),
                    Ok(None) => {}
                    Err(e) => {
                        if failure.is_none() {
                            failure = Some(e);
                        }
                        pass_token.cancel();
                    }
                }
                self.options.report(Progress {
                    pass,
                    completed,
                    total,
                });
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(DifflocError::Canceled);
        }
        Ok(())
    }
}

/// Record for a path with a status entry.
///
/// Repository read failures propagate; working-copy read failures skip the file.
fn changed_record(
    view: &RepositoryView,
    path: &str,
    status: FileStatus,
) -> Result<Option<FileRecord>> {
    let record = match status {
        FileStatus::Deleted => {
            let removed = view
                .read_baseline(path)?
                .map_or(0, |content| count_bytes(&content).lines);
            FileRecord::changed(path, 0, LineDiff::new(0, removed))
        }
        FileStatus::Modified => {
            let working = match fs::read(view.root().join(path)) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!(path, error = %e, "skipping unreadable file");
                    return Ok(None);
                }
            };
            let count = count_bytes(&working);
            if count.binary {
                FileRecord::changed(path, 0, LineDiff::default())
            } else {
                let baseline = view.read_baseline(path)?.unwrap_or_default();
                let diff = estimate_content(
                    &String::from_utf8_lossy(&baseline),
                    &String::from_utf8_lossy(&working),
                );
                FileRecord::changed(path, count.lines, diff)
            }
        }
        FileStatus::Untracked | FileStatus::Added => match count_file(view.root(), path) {
            Some(count) => FileRecord::changed(path, count.lines, LineDiff::new(count.lines, 0)),
            None => return Ok(None),
        },
        FileStatus::Unmodified => match count_file(view.root(), path) {
            Some(count) => FileRecord::unchanged(path, count.lines),
            None => return Ok(None),
        },
    };
    Ok(Some(record))
}

/// Count one file under `root`; per-file errors are logged and skipped.
fn count_file(root: &Path, path: &str) -> Option<LineCount> {
    match count_lines(root.join(path)) {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::debug!(path, error = %e, "skipping file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::tests::{add_submodule, commit_all, git, init_repo, write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn assert_invariants(stats: &StatsAggregate) {
        assert_eq!(
            stats.total_files,
            (stats.changed_files.len() + stats.unchanged_files.len()) as u64
        );
        assert_eq!(stats.total_lines, stats.files().map(|f| f.line_count).sum::<u64>());
        assert_eq!(
            stats.net_change,
            stats.total_additions as i64 - stats.total_deletions as i64
        );
        for file in &stats.unchanged_files {
            assert!(!file.is_changed);
            assert_eq!((file.added, file.removed), (0, 0));
        }
    }

    fn record<'a>(stats: &'a StatsAggregate, path: &str) -> &'a FileRecord {
        stats
            .files()
            .find(|f| f.path == path)
            .unwrap_or_else(|| panic!("no record for {path}"))
    }

    fn run(root: &Path) -> StatsAggregate {
        let stats = analyze(root, &FilterConfig::new(), &CancellationToken::new()).unwrap();
        assert_invariants(&stats);
        stats
    }

    #[test]
    fn test_plain_mode() {
        let temp = tempdir().unwrap();
        write(temp.path(), "main.go", "package main\n\nfunc main() {}\n");
        write(temp.path(), "lib/util.py", "def f():\n    pass\n");
        write(temp.path(), "README.md", "# readme\n");
        write(temp.path(), "node_modules/x/index.js", "module.exports = 1;\n");

        assert_eq!(AnalysisMode::detect(temp.path()), AnalysisMode::Plain);
        let stats = run(temp.path());

        assert!(stats.changed_files.is_empty());
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_lines, 5);
        assert_eq!(record(&stats, "lib/util.py").line_count, 2);
        assert!(!stats.has_changes());
    }

    #[test]
    fn test_plain_mode_max_depth() {
        let temp = tempdir().unwrap();
        write(temp.path(), "a.go", "package a\n");
        write(temp.path(), "b/c.go", "package b\n");
        write(temp.path(), "b/d/e.go", "package d\n");

        let stats = Analyzer::new(FilterConfig::new())
            .options(AnalyzeOptions::new().max_depth(2))
            .run(temp.path())
            .unwrap();

        let mut paths: Vec<&str> = stats.files().map(|f| f.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["a.go", "b/c.go"]);
    }

    #[test]
    fn test_root_must_be_directory() {
        let temp = tempdir().unwrap();
        write(temp.path(), "a.go", "package a\n");

        let missing = analyze(
            temp.path().join("missing"),
            &FilterConfig::new(),
            &CancellationToken::new(),
        );
        assert!(matches!(missing, Err(DifflocError::PathNotFound(_))));

        let file = analyze(
            temp.path().join("a.go"),
            &FilterConfig::new(),
            &CancellationToken::new(),
        );
        assert!(matches!(file, Err(DifflocError::PathNotFound(_))));
    }

    #[test]
    fn test_clean_repository_is_idempotent() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());

        assert_eq!(AnalysisMode::detect(temp.path()), AnalysisMode::Repository);
        let first = run(temp.path());
        let second = run(temp.path());

        assert_eq!(first.total_files, 3);
        assert_eq!(first.total_lines, 14);
        assert!(first.changed_files.is_empty());
        assert_eq!(
            (first.total_files, first.total_lines, first.net_change),
            (second.total_files, second.total_lines, second.net_change)
        );
    }

    #[test]
    fn test_untracked_file() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        write(temp.path(), "new.go", &"x := 1\n".repeat(5));

        let stats = run(temp.path());
        let new = record(&stats, "new.go");

        assert!(new.is_changed);
        assert_eq!((new.line_count, new.added, new.removed), (5, 5, 0));
        assert_eq!(stats.total_additions, 5);
    }

    #[test]
    fn test_staged_new_file_counts_as_added() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        write(temp.path(), "staged.ts", "let a = 1;\nlet b = 2;\n");
        git(temp.path(), &["add", "staged.ts"]);

        let stats = run(temp.path());
        let staged = record(&stats, "staged.ts");

        assert!(staged.is_changed);
        assert_eq!((staged.added, staged.removed), (2, 0));
    }

    #[test]
    fn test_deleted_file() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        fs::remove_file(temp.path().join("old.py")).unwrap();

        let stats = run(temp.path());
        let old = record(&stats, "old.py");

        assert!(old.is_changed);
        assert_eq!((old.line_count, old.added, old.removed), (0, 0, 10));
        assert_eq!(stats.net_change, -10);
        assert_eq!(stats.unchanged_count, 2);
    }

    #[test]
    fn test_modified_file() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        write(
            temp.path(),
            "src/main.go",
            "package main\n\nfunc main() { run() }\n\nfunc run() {}\n",
        );

        let stats = run(temp.path());
        let main = record(&stats, "src/main.go");

        assert!(main.is_changed);
        assert_eq!(main.line_count, 5);
        // "func main() {}" replaced; "func run() {}" and a blank line added
        assert_eq!((main.added, main.removed), (3, 1));
        assert_eq!(stats.changed_count, 1);
        assert_eq!(stats.unchanged_count, 2);
    }

    #[test]
    fn test_git_ignored_files_are_not_counted() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        write(temp.path(), "ignored/a.go", "package a\n");
        write(temp.path(), ".gitignore", "ignored/\n");
        commit_all(temp.path());

        let stats = run(temp.path());
        assert!(stats.files().all(|f| f.path != "ignored/a.go"));
    }

    #[test]
    fn test_clean_submodule_counts_no_changes() {
        let temp = tempdir().unwrap();
        let sub = tempdir().unwrap();
        init_repo(temp.path());
        add_submodule(temp.path(), sub.path());

        let stats = run(temp.path());
        assert!(stats.changed_files.is_empty(), "{:?}", stats.changed_files);
        assert_eq!(stats.total_additions, 0);
        assert_eq!(stats.unchanged_count, 3);
        assert!(stats.files().all(|f| !f.path.starts_with("libsub/")));
    }

    #[test]
    fn test_precanceled_run() {
        let temp = tempdir().unwrap();
        for i in 0..40 {
            write(temp.path(), &format!("f{i}.go"), "package f\n");
        }

        let token = CancellationToken::new();
        token.cancel();
        let result = analyze(temp.path(), &FilterConfig::new(), &token);
        assert!(matches!(result, Err(DifflocError::Canceled)));
    }

    #[test]
    fn test_cancel_mid_run() {
        let temp = tempdir().unwrap();
        for i in 0..200 {
            write(temp.path(), &format!("dir{}/f{i}.go", i % 7), "package f\n\n");
        }

        let token = CancellationToken::new();
        let trigger = token.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let options = AnalyzeOptions::new()
            .workers(2)
            .cancel_token(token)
            .on_progress(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                trigger.cancel();
            });

        let result = Analyzer::new(FilterConfig::new()).options(options).run(temp.path());
        assert!(matches!(result, Err(DifflocError::Canceled)));
        assert!(seen.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_progress_reports_every_file() {
        let temp = tempdir().unwrap();
        for i in 0..20 {
            write(temp.path(), &format!("f{i}.go"), "package f\n");
        }

        let last = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&last);
        let options = AnalyzeOptions::new().on_progress(move |p| {
            assert_eq!(p.pass, Pass::Files);
            assert_eq!(p.total, 20);
            sink.store(p.completed, Ordering::SeqCst);
        });

        let stats = Analyzer::new(FilterConfig::new())
            .options(options)
            .run(temp.path())
            .unwrap();
        assert_eq!(stats.total_files, 20);
        assert_eq!(last.load(Ordering::SeqCst), 20);
    }
}
