//! Core data structures for per-file and aggregate statistics.
//!
//! Field names serialize in the `PascalCase` shape consumers of the JSON output
//! already read (`ChangedFiles`, `TotalLines`, `Path`, `Lines`, ...).

use serde::{Deserialize, Serialize};

use crate::diff::LineDiff;
use crate::options::SortMode;

/// One analyzed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileRecord {
    /// Slash-normalized path relative to the analysis root
    pub path: String,
    /// Newline count; 0 for binary or deleted files
    #[serde(rename = "Lines")]
    pub line_count: u64,
    /// Lines added relative to the baseline
    #[serde(rename = "Additions")]
    pub added: u64,
    /// Lines removed relative to the baseline
    #[serde(rename = "Deletions")]
    pub removed: u64,
    /// Whether the file differs from the repository baseline
    pub is_changed: bool,
}

impl FileRecord {
    /// A file with no baseline difference.
    pub fn unchanged(path: impl Into<String>, line_count: u64) -> Self {
        Self {
            path: path.into(),
            line_count,
            added: 0,
            removed: 0,
            is_changed: false,
        }
    }

    /// A file that differs from the baseline.
    pub fn changed(path: impl Into<String>, line_count: u64, diff: LineDiff) -> Self {
        Self {
            path: path.into(),
            line_count,
            added: diff.added,
            removed: diff.removed,
            is_changed: true,
        }
    }

    /// Net change (added - removed)
    pub fn net(&self) -> i64 {
        self.added as i64 - self.removed as i64
    }
}

/// Accumulated result of one analysis run.
///
/// Records are appended through [`StatsAggregate::merge`]; the derived counts
/// (`total_files`, `changed_count`, `unchanged_count`, `net_change`) are computed
/// once by [`StatsAggregate::finalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsAggregate {
    pub changed_files: Vec<FileRecord>,
    pub unchanged_files: Vec<FileRecord>,
    pub total_files: u64,
    pub changed_count: u64,
    pub unchanged_count: u64,
    pub total_lines: u64,
    pub total_additions: u64,
    pub total_deletions: u64,
    pub net_change: i64,
}

impl StatsAggregate {
    /// Create a new empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the matching collection and update the running sums.
    pub fn merge(&mut self, record: FileRecord) {
        self.total_lines += record.line_count;
        self.total_additions += record.added;
        self.total_deletions += record.removed;
        if record.is_changed {
            self.changed_files.push(record);
        } else {
            self.unchanged_files.push(record);
        }
    }

    /// Compute the derived totals from the collections and running sums.
    pub fn finalize(&mut self) {
        self.changed_count = self.changed_files.len() as u64;
        self.unchanged_count = self.unchanged_files.len() as u64;
        self.total_files = self.changed_count + self.unchanged_count;
        self.net_change = self.total_additions as i64 - self.total_deletions as i64;
    }

    /// Whether any file differs from the baseline.
    pub fn has_changes(&self) -> bool {
        self.total_additions > 0 || self.total_deletions > 0 || !self.changed_files.is_empty()
    }

    /// All records, changed first.
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.changed_files.iter().chain(self.unchanged_files.iter())
    }

    /// Sort both collections in place.
    ///
    /// Ties on numeric keys fall back to the path so output is stable.
    pub fn sort(&mut self, mode: SortMode, reverse: bool) {
        let compare = |a: &FileRecord, b: &FileRecord| {
            let ord = match mode {
                SortMode::Name => a.path.cmp(&b.path),
                SortMode::Lines => a.line_count.cmp(&b.line_count),
                SortMode::Additions => a.added.cmp(&b.added),
                SortMode::Deletions => a.removed.cmp(&b.removed),
            };
            let ord = if reverse { ord.reverse() } else { ord };
            ord.then_with(|| a.path.cmp(&b.path))
        };
        self.changed_files.sort_by(compare);
        self.unchanged_files.sort_by(compare);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatsAggregate {
        let mut stats = StatsAggregate::new();
        stats.merge(FileRecord::unchanged("b.go", 10));
        stats.merge(FileRecord::changed("a.go", 20, LineDiff::new(5, 2)));
        stats.merge(FileRecord::changed("gone.py", 0, LineDiff::new(0, 8)));
        stats.merge(FileRecord::unchanged("c.ts", 3));
        stats.finalize();
        stats
    }

    #[test]
    fn test_merge_and_finalize() {
        let stats = sample();

        assert_eq!(stats.changed_files.len(), 2);
        assert_eq!(stats.unchanged_files.len(), 2);
        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.changed_count, 2);
        assert_eq!(stats.unchanged_count, 2);
        assert_eq!(stats.total_lines, 33);
        assert_eq!(stats.total_additions, 5);
        assert_eq!(stats.total_deletions, 10);
        assert_eq!(stats.net_change, -5);
        assert!(stats.has_changes());
    }

    #[test]
    fn test_empty_aggregate() {
        let mut stats = StatsAggregate::new();
        stats.finalize();

        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.net_change, 0);
        assert!(!stats.has_changes());
    }

    #[test]
    fn test_sort_modes() {
        let mut stats = sample();

        stats.sort(SortMode::Name, false);
        assert_eq!(stats.changed_files[0].path, "a.go");
        assert_eq!(stats.unchanged_files[0].path, "b.go");

        stats.sort(SortMode::Lines, true);
        assert_eq!(stats.changed_files[0].path, "a.go");
        assert_eq!(stats.unchanged_files[0].path, "b.go");

        stats.sort(SortMode::Lines, false);
        assert_eq!(stats.unchanged_files[0].path, "c.ts");

        stats.sort(SortMode::Deletions, true);
        assert_eq!(stats.changed_files[0].path, "gone.py");

        stats.sort(SortMode::Additions, true);
        assert_eq!(stats.changed_files[0].path, "a.go");
    }

    #[test]
    fn test_json_field_names() {
        let stats = sample();
        let value = serde_json::to_value(&stats).unwrap();

        for key in [
            "ChangedFiles",
            "UnchangedFiles",
            "TotalFiles",
            "ChangedCount",
            "UnchangedCount",
            "TotalLines",
            "TotalAdditions",
            "TotalDeletions",
            "NetChange",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }

        let record = &value["ChangedFiles"][0];
        assert_eq!(record["Path"], "a.go");
        assert_eq!(record["Lines"], 20);
        assert_eq!(record["Additions"], 5);
        assert_eq!(record["Deletions"], 2);
        assert_eq!(record["IsChanged"], true);
    }
}
