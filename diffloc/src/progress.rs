//! Progress bar for large runs.

use std::sync::{Arc, Mutex};

use diffloclib::{Pass, Progress};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Passes with at most this many files finish without a bar.
pub const BAR_THRESHOLD: usize = 1000;

/// Shows one stderr bar per pass with more than [`BAR_THRESHOLD`] files.
#[derive(Default)]
pub struct ProgressReporter {
    current: Mutex<Option<(Pass, ProgressBar)>>,
}

impl ProgressReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update(&self, progress: Progress) {
        if progress.total <= BAR_THRESHOLD {
            return;
        }
        let Ok(mut current) = self.current.lock() else {
            return;
        };

        let stale = current
            .as_ref()
            .is_some_and(|(pass, _)| *pass != progress.pass);
        if stale {
            if let Some((_, bar)) = current.take() {
                bar.finish_and_clear();
            }
        }

        let (_, bar) =
            current.get_or_insert_with(|| (progress.pass, new_bar(progress.pass, progress.total)));
        bar.set_position(progress.completed as u64);
    }

    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some((_, bar)) = current.take() {
                bar.finish_and_clear();
            }
        }
    }
}

fn new_bar(pass: Pass, total: usize) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template("{msg:>18} [{bar:40.cyan/blue}] {pos}/{len} files")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message(match pass {
        Pass::Files => "Analyzing files",
        Pass::Changed => "Changed files",
        Pass::Unchanged => "Unchanged files",
    });
    bar
}
