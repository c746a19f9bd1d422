//! Input options for an analysis run.
//!
//! Filtering lives in [`crate::filter::FilterConfig`]; this module holds the
//! knobs that control how the run is executed and how results are ordered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Default worker cap for each pass.
pub const MAX_WORKERS: usize = 16;

/// Field to order file records by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Order by path
    Name,
    /// Order by line count
    #[default]
    Lines,
    /// Order by added lines
    Additions,
    /// Order by removed lines
    Deletions,
}

impl SortMode {
    /// Every mode, in display order.
    pub const ALL: [SortMode; 4] = [
        SortMode::Name,
        SortMode::Lines,
        SortMode::Additions,
        SortMode::Deletions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Name => "name",
            SortMode::Lines => "lines",
            SortMode::Additions => "additions",
            SortMode::Deletions => "deletions",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" | "path" => Ok(SortMode::Name),
            "lines" | "line" => Ok(SortMode::Lines),
            "additions" | "added" => Ok(SortMode::Additions),
            "deletions" | "removed" => Ok(SortMode::Deletions),
            _ => Err(format!("Unknown sort mode: {}", s)),
        }
    }
}

/// Which traversal pass a progress update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Plain directory walk
    Files,
    /// Files reported by repository status
    Changed,
    /// Baseline files untouched by status
    Unchanged,
}

/// A progress update, emitted after each merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub pass: Pass,
    pub completed: usize,
    pub total: usize,
}

/// Progress callback. Called from the thread that owns the aggregate.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Execution options for [`crate::Analyzer`].
#[derive(Clone)]
pub struct AnalyzeOptions {
    /// Worker threads per pass
    pub workers: usize,
    /// Maximum path depth counted; `None` means unlimited
    pub max_depth: Option<usize>,
    /// Cooperative cancellation signal
    pub cancel: CancellationToken,
    /// Optional progress side channel
    pub progress: Option<ProgressFn>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            workers: MAX_WORKERS,
            max_depth: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }
}

impl fmt::Debug for AnalyzeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzeOptions")
            .field("workers", &self.workers)
            .field("max_depth", &self.max_depth)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl AnalyzeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the worker cap (at least 1)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Builder: limit path depth; 0 means unlimited
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = (depth > 0).then_some(depth);
        self
    }

    /// Builder: use the caller's cancellation token
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Builder: install a progress callback
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub(crate) fn report(&self, progress: Progress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sort_mode_from_str() {
        assert_eq!("name".parse::<SortMode>().unwrap(), SortMode::Name);
        assert_eq!("LINES".parse::<SortMode>().unwrap(), SortMode::Lines);
        assert_eq!("additions".parse::<SortMode>().unwrap(), SortMode::Additions);
        assert_eq!("deletions".parse::<SortMode>().unwrap(), SortMode::Deletions);
        assert!("size".parse::<SortMode>().is_err());
    }

    #[test]
    fn test_sort_mode_display_round_trips() {
        for mode in SortMode::ALL {
            assert_eq!(mode.to_string().parse::<SortMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_options_defaults() {
        let opts = AnalyzeOptions::new();
        assert_eq!(opts.workers, MAX_WORKERS);
        assert_eq!(opts.max_depth, None);
        assert!(!opts.cancel.is_cancelled());
        assert!(opts.progress.is_none());
    }

    #[test]
    fn test_options_builder() {
        let token = CancellationToken::new();
        let opts = AnalyzeOptions::new()
            .workers(0)
            .max_depth(3)
            .cancel_token(token.clone());

        assert_eq!(opts.workers, 1);
        assert_eq!(opts.max_depth, Some(3));
        token.cancel();
        assert!(opts.cancel.is_cancelled());

        assert_eq!(AnalyzeOptions::new().max_depth(0).max_depth, None);
    }

    #[test]
    fn test_progress_callback() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let opts = AnalyzeOptions::new().on_progress(move |p| {
            counter.fetch_add(p.completed, Ordering::SeqCst);
        });

        opts.report(Progress {
            pass: Pass::Files,
            completed: 2,
            total: 5,
        });
        opts.report(Progress {
            pass: Pass::Files,
            completed: 3,
            total: 5,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
