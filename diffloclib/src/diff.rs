//! Line-level change estimation between a baseline and a working version.
//!
//! This is a frequency comparison, not a longest-common-subsequence diff: each
//! distinct line is counted in both versions and the surplus on either side is
//! reported. Reordered lines therefore net to zero, and moving a duplicated line
//! is invisible.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Added and removed line counts for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiff {
    /// Lines present more often in the working version
    pub added: u64,
    /// Lines present more often in the baseline
    pub removed: u64,
}

impl LineDiff {
    pub fn new(added: u64, removed: u64) -> Self {
        Self { added, removed }
    }

    /// Net change (added - removed)
    pub fn net(&self) -> i64 {
        self.added as i64 - self.removed as i64
    }
}

impl std::ops::Add for LineDiff {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            added: self.added + other.added,
            removed: self.removed + other.removed,
        }
    }
}

impl std::ops::AddAssign for LineDiff {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
    }
}

/// Estimate added and removed lines between two sequences of lines.
pub fn estimate<T>(baseline: &[T], working: &[T]) -> LineDiff
where
    T: Eq + Hash,
{
    let old_counts = frequencies(baseline);
    let new_counts = frequencies(working);

    let removed = old_counts
        .iter()
        .map(|(line, &old)| old.saturating_sub(new_counts.get(line).copied().unwrap_or(0)))
        .sum();
    let added = new_counts
        .iter()
        .map(|(line, &new)| new.saturating_sub(old_counts.get(line).copied().unwrap_or(0)))
        .sum();

    LineDiff { added, removed }
}

/// Estimate the change between two file contents.
///
/// Content is split on `\n`, so a trailing newline produces an empty final line in
/// both versions and cancels out.
pub fn estimate_content(baseline: &str, working: &str) -> LineDiff {
    let old: Vec<&str> = baseline.split('\n').collect();
    let new: Vec<&str> = working.split('\n').collect();
    estimate(&old, &new)
}

fn frequencies<T: Eq + Hash>(lines: &[T]) -> HashMap<&T, u64> {
    let mut counts = HashMap::with_capacity(lines.len());
    for line in lines {
        *counts.entry(line).or_insert(0u64) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_addition() {
        let diff = estimate(&["a", "b"], &["a", "b", "c"]);
        assert_eq!(diff, LineDiff::new(1, 0));
    }

    #[test]
    fn test_pure_removal() {
        let diff = estimate(&["a", "b", "c"], &["a", "c"]);
        assert_eq!(diff, LineDiff::new(0, 1));
    }

    #[test]
    fn test_duplicate_removed() {
        let diff = estimate(&["x", "x"], &["x"]);
        assert_eq!(diff, LineDiff::new(0, 1));
    }

    #[test]
    fn test_replacement_counts_both_sides() {
        let diff = estimate(&["fn a() {}", "fn b() {}"], &["fn a() {}", "fn c() {}"]);
        assert_eq!(diff, LineDiff::new(1, 1));
        assert_eq!(diff.net(), 0);
    }

    #[test]
    fn test_reorder_nets_to_zero() {
        let diff = estimate(&["a", "b", "c"], &["c", "b", "a"]);
        assert_eq!(diff, LineDiff::default());
    }

    #[test]
    fn test_identical_and_empty() {
        assert_eq!(estimate(&["a", "b"], &["a", "b"]), LineDiff::default());
        let empty: [&str; 0] = [];
        assert_eq!(estimate(&empty, &["a", "b"]), LineDiff::new(2, 0));
        assert_eq!(estimate(&["a", "b"], &empty), LineDiff::new(0, 2));
    }

    #[test]
    fn test_estimate_content() {
        let diff = estimate_content("a\nb\n", "a\nb\nc\n");
        assert_eq!(diff, LineDiff::new(1, 0));

        // dropping the final newline turns the trailing empty line into "c"
        let diff = estimate_content("a\nb\n", "a\nb\nc");
        assert_eq!(diff, LineDiff::new(1, 1));
    }

    #[test]
    fn test_line_diff_add() {
        let mut total = LineDiff::new(3, 1) + LineDiff::new(2, 2);
        total += LineDiff::new(0, 4);
        assert_eq!(total, LineDiff::new(5, 7));
        assert_eq!(total.net(), -2);
    }
}
