//! Repository resolver.
//!
//! Opens a git store exactly at the analysis root, reads the `HEAD` tree as the
//! baseline, and derives a working-tree status map from the baseline, the index
//! and the files on disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ignore::WalkBuilder;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::error::DifflocError;
use crate::filter::{normalize_path, path_depth, relative_path, FilterConfig};
use crate::Result;

/// Status of one path relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    /// On disk, unknown to both baseline and index
    Untracked,
    /// Staged in the index, absent from the baseline
    Added,
    /// Present in the baseline with different content
    Modified,
    /// Tracked but missing from the working tree
    Deleted,
    /// Identical to the baseline
    Unmodified,
}

impl FileStatus {
    /// Whether the path counts as changed.
    pub fn is_changed(&self) -> bool {
        !matches!(self, FileStatus::Unmodified)
    }

    /// Whether the path has no committed version.
    pub fn is_new(&self) -> bool {
        matches!(self, FileStatus::Untracked | FileStatus::Added)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Untracked => "untracked",
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Deleted => "deleted",
            FileStatus::Unmodified => "unmodified",
        }
    }
}

/// Whether `path` itself is the working directory of a git repository.
pub fn is_repository(path: impl AsRef<Path>) -> bool {
    repository_root(path).is_ok()
}

/// Working directory of the repository at `path`.
///
/// No upward discovery is done: a subdirectory of a repository is not a repository.
pub fn repository_root(path: impl AsRef<Path>) -> Result<PathBuf> {
    Repository::open(path).map(|repo| repo.root)
}

/// An opened repository.
pub struct Repository {
    sync: gix::ThreadSafeRepository,
    root: PathBuf,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("root", &self.root).finish()
    }
}

impl Repository {
    /// Open the repository whose working directory is `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = gix::open(path)
            .map_err(|e| DifflocError::GitError(format!("Failed to open git repository: {}", e)))?;

        let root = repo
            .work_dir()
            .ok_or_else(|| DifflocError::GitError("Repository has no work directory".to_string()))?
            .to_path_buf();

        Ok(Self {
            sync: repo.into_sync(),
            root,
        })
    }

    /// Repository working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the baseline and compute the status of every eligible path.
    ///
    /// Paths are eligible when the filter includes them and they are no deeper than
    /// `max_depth`. Content comparisons run on the current rayon pool.
    pub fn view(
        &self,
        filter: &FilterConfig,
        max_depth: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<RepositoryView> {
        let repo = self.sync.to_thread_local();
        let (baseline, mut gitlinks) = read_baseline_tree(&repo)?;
        let index = read_index(&repo)?;
        gitlinks.extend(index.gitlinks.iter().cloned());

        let eligible = |path: &str| {
            max_depth.map_or(true, |depth| path_depth(path) <= depth) && filter.should_include(path)
        };

        let mut status = self.tracked_status(&baseline, &index, &eligible, cancel)?;
        for path in self.untracked(filter, &gitlinks, max_depth, cancel)? {
            if !baseline.contains_key(&path)
                && !index.entries.contains_key(&path)
                && eligible(path.as_str())
            {
                status.insert(path, FileStatus::Untracked);
            }
        }

        if cancel.is_cancelled() {
            return Err(DifflocError::Canceled);
        }

        tracing::debug!(
            baseline = baseline.len(),
            index = index.entries.len(),
            gitlinks = gitlinks.len(),
            changed = status.len(),
            "computed working tree status"
        );

        Ok(RepositoryView {
            sync: self.sync.clone(),
            root: self.root.clone(),
            baseline,
            status,
        })
    }

    fn tracked_status(
        &self,
        baseline: &BTreeMap<String, gix::ObjectId>,
        index: &IndexSnapshot,
        eligible: &(dyn Fn(&str) -> bool + Sync),
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, FileStatus>> {
        let mut tracked: Vec<&String> = baseline
            .keys()
            .chain(index.entries.keys().filter(|p| !baseline.contains_key(*p)))
            .filter(|p| eligible(p.as_str()))
            .collect();
        tracked.sort();

        let results: Vec<Option<(String, FileStatus)>> = tracked
            .par_iter()
            .map_init(
                || self.sync.to_thread_local(),
                |repo, path| -> Result<Option<(String, FileStatus)>> {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    let status = classify_tracked(
                        repo,
                        &self.root,
                        path,
                        baseline.get(*path),
                        index.entries.get(*path),
                        index.written,
                    )?;
                    Ok(status
                        .filter(FileStatus::is_changed)
                        .map(|s| ((*path).clone(), s)))
                },
            )
            .collect::<Result<_>>()?;

        if cancel.is_cancelled() {
            return Err(DifflocError::Canceled);
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Files on disk that git's own ignore rules do not hide.
    ///
    /// Submodules and nested repositories are not descended into.
    fn untracked(
        &self,
        filter: &FilterConfig,
        gitlinks: &HashSet<String>,
        max_depth: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(false)
            .ignore(false)
            .parents(false)
            .git_global(false)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .max_depth(max_depth);

        let root = self.root.clone();
        let prune = filter.clone();
        let gitlinks = gitlinks.clone();
        builder.filter_entry(move |entry| {
            if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
                return true;
            }
            if entry.file_name() == ".git" || entry.path().join(".git").exists() {
                return false;
            }
            relative_path(&root, entry.path())
                .map_or(true, |rel| !gitlinks.contains(&rel) && prune.should_descend(&rel))
        });

        let mut files = Vec::new();
        for entry in builder.build() {
            if cancel.is_cancelled() {
                return Err(DifflocError::Canceled);
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if let Some(rel) = relative_path(&self.root, entry.path()) {
                files.push(rel);
            }
        }
        Ok(files)
    }
}

/// Baseline listing and status map for one run.
pub struct RepositoryView {
    sync: gix::ThreadSafeRepository,
    root: PathBuf,
    baseline: BTreeMap<String, gix::ObjectId>,
    status: BTreeMap<String, FileStatus>,
}

impl std::fmt::Debug for RepositoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryView")
            .field("root", &self.root)
            .field("baseline", &self.baseline.len())
            .field("status", &self.status)
            .finish()
    }
}

impl RepositoryView {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Changed paths with their status, sorted by path.
    pub fn status(&self) -> &BTreeMap<String, FileStatus> {
        &self.status
    }

    /// Status of a single path; paths absent from the map are unmodified.
    pub fn status_of(&self, path: &str) -> FileStatus {
        self.status
            .get(path)
            .copied()
            .unwrap_or(FileStatus::Unmodified)
    }

    /// Every file path in the baseline tree, sorted.
    pub fn baseline_paths(&self) -> impl Iterator<Item = &str> {
        self.baseline.keys().map(String::as_str)
    }

    /// Baseline paths without a status entry.
    pub fn unchanged_paths(&self) -> impl Iterator<Item = &str> {
        self.baseline_paths()
            .filter(move |path| !self.status.contains_key(*path))
    }

    /// Content of `path` at the baseline, or `None` if it is not in the baseline.
    pub fn read_baseline(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.baseline.get(path) {
            Some(&oid) => read_blob(&self.sync.to_thread_local(), oid).map(Some),
            None => Ok(None),
        }
    }
}

/// Size and timestamps as recorded in the index stat cache.
///
/// Values are truncated to 32 bits the same way git stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatSnapshot {
    size: u32,
    mtime: (u32, u32),
    ctime: Option<(u32, u32)>,
}

impl StatSnapshot {
    fn from_index(stat: &gix::index::entry::Stat) -> Self {
        Self {
            size: stat.size,
            mtime: (stat.mtime.secs, stat.mtime.nsecs),
            ctime: Some((stat.ctime.secs, stat.ctime.nsecs)),
        }
    }

    fn from_metadata(meta: &fs::Metadata) -> Option<Self> {
        let mtime = timestamp(meta.modified().ok()?)?;

        #[cfg(unix)]
        let ctime = {
            use std::os::unix::fs::MetadataExt;
            Some((meta.ctime() as u32, meta.ctime_nsec() as u32))
        };
        #[cfg(not(unix))]
        let ctime = None;

        Some(Self {
            size: meta.len() as u32,
            mtime,
            ctime,
        })
    }

    /// Whether this on-disk stat proves the file still matches the `cached` entry.
    ///
    /// Files modified at or after the index write time are racily clean and never trusted.
    fn is_fresh(&self, cached: &StatSnapshot, index_written: Option<(u32, u32)>) -> bool {
        let settled = index_written.is_some_and(|written| self.mtime < written);
        let ctime_matches = match (self.ctime, cached.ctime) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        settled && self.size == cached.size && self.mtime == cached.mtime && ctime_matches
    }
}

fn timestamp(time: SystemTime) -> Option<(u32, u32)> {
    let since = time.duration_since(UNIX_EPOCH).ok()?;
    Some((since.as_secs() as u32, since.subsec_nanos()))
}

/// One blob entry of the index.
#[derive(Debug, Clone, Copy)]
struct Staged {
    id: gix::ObjectId,
    stat: StatSnapshot,
}

/// Blob entries and gitlinks of the index, plus the time it was written.
#[derive(Debug, Default)]
struct IndexSnapshot {
    entries: HashMap<String, Staged>,
    gitlinks: HashSet<String>,
    written: Option<(u32, u32)>,
}

/// Status of one tracked path, or `None` if its working copy cannot be read.
fn classify_tracked(
    repo: &gix::Repository,
    root: &Path,
    path: &str,
    baseline: Option<&gix::ObjectId>,
    staged: Option<&Staged>,
    index_written: Option<(u32, u32)>,
) -> Result<Option<FileStatus>> {
    let abs = root.join(path);
    if !abs.is_file() {
        return Ok(Some(FileStatus::Deleted));
    }

    let Some(&base_oid) = baseline else {
        return Ok(Some(FileStatus::Added));
    };
    if let Some(staged) = staged {
        if staged.id != base_oid {
            return Ok(Some(FileStatus::Modified));
        }
        let fresh = fs::metadata(&abs)
            .ok()
            .and_then(|meta| StatSnapshot::from_metadata(&meta))
            .is_some_and(|current| current.is_fresh(&staged.stat, index_written));
        if fresh {
            return Ok(Some(FileStatus::Unmodified));
        }
    }

    let working = match fs::read(&abs) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(path, error = %e, "skipping unreadable file");
            return Ok(None);
        }
    };
    let committed = read_blob(repo, base_oid)?;

    Ok(Some(if committed == working {
        FileStatus::Unmodified
    } else {
        FileStatus::Modified
    }))
}

/// Blob entries of the `HEAD` tree, plus the paths of submodule gitlinks.
fn read_baseline_tree(
    repo: &gix::Repository,
) -> Result<(BTreeMap<String, gix::ObjectId>, HashSet<String>)> {
    let head_commit = repo
        .head_commit()
        .map_err(|e| DifflocError::GitError(format!("Failed to get HEAD commit: {}", e)))?;

    let head_tree = head_commit
        .tree()
        .map_err(|e| DifflocError::GitError(format!("Failed to get HEAD tree: {}", e)))?;

    let mut entries = BTreeMap::new();
    let mut gitlinks = HashSet::new();
    collect_tree_entries(repo, &head_tree, "", &mut entries, &mut gitlinks)?;
    Ok((entries, gitlinks))
}

/// Recursively collect all blob entries from a tree
fn collect_tree_entries(
    repo: &gix::Repository,
    tree: &gix::Tree<'_>,
    prefix: &str,
    entries: &mut BTreeMap<String, gix::ObjectId>,
    gitlinks: &mut HashSet<String>,
) -> Result<()> {
    for entry in tree.iter() {
        let entry = entry
            .map_err(|e| DifflocError::GitError(format!("Failed to read tree entry: {}", e)))?;

        let name = gix::path::from_bstr(entry.filename());
        let path = if prefix.is_empty() {
            normalize_path(&name.to_string_lossy())
        } else {
            format!("{}/{}", prefix, normalize_path(&name.to_string_lossy()))
        };

        let mode = entry.mode();
        if mode.is_blob() || mode.is_executable() {
            entries.insert(path, entry.oid().to_owned());
        } else if mode.is_commit() {
            gitlinks.insert(path);
        } else if mode.is_tree() {
            let subtree = repo
                .find_object(entry.oid())
                .map_err(|e| DifflocError::GitError(format!("Failed to find tree: {}", e)))?
                .try_into_tree()
                .map_err(|_| DifflocError::GitError("Object is not a tree".to_string()))?;
            collect_tree_entries(repo, &subtree, &path, entries, gitlinks)?;
        }
    }
    Ok(())
}

fn read_index(repo: &gix::Repository) -> Result<IndexSnapshot> {
    use gix::index::entry::Mode;

    let index = repo
        .index_or_empty()
        .map_err(|e| DifflocError::GitError(format!("Failed to read index: {}", e)))?;

    let mut snapshot = IndexSnapshot {
        written: fs::metadata(repo.index_path())
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(timestamp),
        ..IndexSnapshot::default()
    };

    for entry in index.entries() {
        let path = gix::path::from_bstr(entry.path(&index));
        let path = normalize_path(&path.to_string_lossy());
        if entry.mode == Mode::COMMIT {
            snapshot.gitlinks.insert(path);
        } else if entry.mode == Mode::FILE || entry.mode == Mode::FILE_EXECUTABLE {
            snapshot.entries.insert(
                path,
                Staged {
                    id: entry.id,
                    stat: StatSnapshot::from_index(&entry.stat),
                },
            );
        }
    }
    Ok(snapshot)
}

fn read_blob(repo: &gix::Repository, oid: gix::ObjectId) -> Result<Vec<u8>> {
    let object = repo
        .find_object(oid)
        .map_err(|e| DifflocError::GitError(format!("Failed to find object {}: {}", oid, e)))?;

    let blob = object
        .try_into_blob()
        .map_err(|_| DifflocError::GitError(format!("Object {} is not a blob", oid)))?;

    Ok(blob.data.to_vec())
}
