//! File eligibility: exclusion rules, ignore-file rules and the extension allow-list.
//!
//! A [`FilterConfig`] is compiled once through [`FilterBuilder`] and is read-only
//! afterwards, so workers can share it by reference without locking. Patterns that
//! fail to compile are dropped with a warning instead of failing the build.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::DifflocError;
use crate::Result;

/// Extensions counted when the caller supplies none.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".go", ".py", ".js", ".jsx", ".ts", ".tsx", ".vue", ".svelte", ".mjs", ".cjs", ".rs",
];

/// Name of the ignore file read from the repository root.
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// Child name appended to a directory when deciding whether to descend into it.
/// Extension-less so extension-based patterns never prune a whole directory.
const SYNTHETIC_CHILD: &str = "diffloc-probe";

/// Exclusions that apply regardless of any flag.
const ALWAYS_EXCLUDE: &[&str] = &[
    // dependency, cache and build directories
    r"(^|/)node_modules($|/)",
    r"(^|/)venv($|/)",
    r"(^|/)\.venv($|/)",
    r"(^|/)__pycache__($|/)",
    r"(^|/)\.git($|/)",
    r"(^|/)dist($|/)",
    r"(^|/)build($|/)",
    r"(^|/)\.egg-info($|/)",
    r"(^|/)\.tox($|/)",
    r"(^|/)coverage($|/)",
    r"(^|/)\.next($|/)",
    r"(^|/)vendor($|/)",
    r"(^|/)bin($|/)",
    r"(^|/)tmp($|/)",
    r"(^|/)target($|/)",
    // lock files
    r"\.lock$",
    r"-lock\.json$",
    r"-lock\.yaml$",
    r"Pipfile\.lock$",
    r"\.gitignore$",
    // native binaries
    r"\.exe$",
    r"\.so$",
    r"\.dylib$",
    r"\.dll$",
    // images
    r"\.(jpg|jpeg|png|gif|bmp|svg|ico|webp|tiff|tif|psd|raw|heic|avif)$",
    // python
    r"\.pyc$",
    r"\.pyo$",
    r"\.pyd$",
    r"\.egg$",
    r"(^|/)\.eggs($|/)",
    r"(^|/)\.pytest_cache($|/)",
    r"(^|/)\.mypy_cache($|/)",
    // generated go
    r"_templ\.go$",
    r"\.pb\.go$",
    r"_gen\.go$",
    // javascript
    r"\.min\.js$",
    r"\.bundle\.js$",
    r"\.eslintcache",
    r"(^|/)\.nyc_output($|/)",
    r"(^|/)\.yarn($|/)",
    r"(^|/)\.npm($|/)",
    r"(^|/)cypress($|/)",
    r"(^|/)jest-cache($|/)",
];

/// Exclusions applied only when test exclusion is enabled.
const TEST_PATTERNS: &[&str] = &[
    r"_test\.go$",
    r"_test\.rs$",
    r"(^|/)tests?($|/)",
    r"\.test\.(js|ts|jsx|tsx)$",
    r"\.spec\.(js|ts|jsx|tsx)$",
];

/// A compiled path pattern, independent of the engine behind it.
pub trait PathMatcher: fmt::Debug + Send + Sync {
    /// Whether the slash-normalized relative path matches.
    fn is_match(&self, path: &str) -> bool;
}

impl PathMatcher for Regex {
    fn is_match(&self, path: &str) -> bool {
        Regex::is_match(self, path)
    }
}

/// A glob translated from one ignore-file line.
#[derive(Debug, Clone)]
pub struct GlobRule {
    pattern: Pattern,
}

impl GlobRule {
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    /// Compile a glob, returning `None` when the syntax is invalid.
    pub fn new(glob: &str) -> Option<Self> {
        Pattern::new(glob).ok().map(|pattern| Self { pattern })
    }

    /// The translated glob text.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl PathMatcher for GlobRule {
    fn is_match(&self, path: &str) -> bool {
        self.pattern.matches_with(path, Self::OPTIONS)
    }
}

type Matcher = Arc<dyn PathMatcher>;

/// Compiled, immutable file filter.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    allowed_exts: HashSet<String>,
    always_exclude: Vec<Matcher>,
    test_patterns: Vec<Matcher>,
    custom_patterns: Vec<Matcher>,
    ignore_rules: Vec<Matcher>,
    respect_ignore_file: bool,
    exclude_tests: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterConfig {
    /// Default filter: default extensions, ignore-file rules enabled but none loaded.
    pub fn new() -> Self {
        FilterBuilder::new().build()
    }

    /// Start building a filter.
    pub fn builder() -> FilterBuilder {
        FilterBuilder::new()
    }

    /// Whether a file at `path` (relative to the analysis root) should be counted.
    ///
    /// Rules are evaluated in order and the first exclusion wins:
    /// 1. always-exclude patterns
    /// 2. test patterns (only with test exclusion enabled)
    /// 3. custom patterns
    /// 4. ignore-file rules (only when enabled)
    /// 5. extension allow-list
    pub fn should_include(&self, path: &str) -> bool {
        let path = normalize_path(path);
        if self.is_excluded(&path) {
            return false;
        }
        match extension(&path) {
            Some(ext) => self.allowed_exts.contains(&ext.to_lowercase()),
            None => false,
        }
    }

    /// Whether traversal should enter the directory at `dir` (relative to the root).
    ///
    /// Runs the exclusion rules against a synthetic child of the directory; the
    /// extension allow-list does not take part.
    pub fn should_descend(&self, dir: &str) -> bool {
        let dir = normalize_path(dir);
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() || dir == "." {
            return true;
        }
        !self.is_excluded(&format!("{dir}/{SYNTHETIC_CHILD}"))
    }

    fn is_excluded(&self, path: &str) -> bool {
        if self.always_exclude.iter().any(|m| m.is_match(path)) {
            return true;
        }
        if self.exclude_tests && self.test_patterns.iter().any(|m| m.is_match(path)) {
            return true;
        }
        if self.custom_patterns.iter().any(|m| m.is_match(path)) {
            return true;
        }
        self.respect_ignore_file && self.ignore_rules.iter().any(|m| m.is_match(path))
    }

    /// Extensions in the allow-list (lower-case, dot-prefixed).
    pub fn allowed_extensions(&self) -> &HashSet<String> {
        &self.allowed_exts
    }

    /// Number of ignore-file rules loaded.
    pub fn ignore_rule_count(&self) -> usize {
        self.ignore_rules.len()
    }

    /// Whether ignore-file rules are applied.
    pub fn respects_ignore_file(&self) -> bool {
        self.respect_ignore_file
    }

    /// Whether test files are excluded.
    pub fn excludes_tests(&self) -> bool {
        self.exclude_tests
    }
}

/// Builder for [`FilterConfig`].
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    extensions: Vec<String>,
    excludes: Vec<String>,
    exclude_tests: bool,
    respect_ignore_file: bool,
    ignore_root: Option<PathBuf>,
}

impl Default for FilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
            excludes: Vec::new(),
            exclude_tests: false,
            respect_ignore_file: true,
            ignore_root: None,
        }
    }

    /// Add an allowed extension, with or without the leading dot.
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extensions.push(ext.into());
        self
    }

    /// Replace the allowed extensions. An empty list means the defaults.
    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    /// Add a custom exclusion regex.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    /// Add multiple custom exclusion regexes.
    pub fn exclude_many<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Exclude common test files and directories.
    pub fn exclude_tests(mut self, enabled: bool) -> Self {
        self.exclude_tests = enabled;
        self
    }

    /// Apply ignore-file rules.
    pub fn respect_ignore_file(mut self, enabled: bool) -> Self {
        self.respect_ignore_file = enabled;
        self
    }

    /// Directory whose ignore file is loaded at build time.
    pub fn ignore_file_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.ignore_root = Some(root.into());
        self
    }

    /// Compile everything into an immutable [`FilterConfig`].
    pub fn build(self) -> FilterConfig {
        let allowed_exts: HashSet<String> = if self.extensions.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
        } else {
            self.extensions
                .iter()
                .map(|e| e.trim())
                .filter(|e| !e.is_empty())
                .map(|e| {
                    let e = e.to_lowercase();
                    if e.starts_with('.') {
                        e
                    } else {
                        format!(".{e}")
                    }
                })
                .collect()
        };

        let ignore_rules = match (&self.ignore_root, self.respect_ignore_file) {
            (Some(root), true) => load_ignore_file(root)
                .into_iter()
                .map(|rule| Arc::new(rule) as Matcher)
                .collect(),
            _ => Vec::new(),
        };

        FilterConfig {
            allowed_exts,
            always_exclude: compile_regexes(ALWAYS_EXCLUDE.iter().copied()),
            test_patterns: compile_regexes(TEST_PATTERNS.iter().copied()),
            custom_patterns: compile_regexes(self.excludes.iter().map(String::as_str)),
            ignore_rules,
            respect_ignore_file: self.respect_ignore_file,
            exclude_tests: self.exclude_tests,
        }
    }
}

fn compile_regexes<'a>(patterns: impl Iterator<Item = &'a str>) -> Vec<Matcher> {
    patterns
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(Arc::new(re) as Matcher),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "dropping invalid exclusion pattern");
                None
            }
        })
        .collect()
}

/// Read the ignore file in `root` and translate its rules into globs.
///
/// A missing or unreadable file yields no rules.
pub fn load_ignore_file(root: impl AsRef<Path>) -> Vec<GlobRule> {
    let path = root.as_ref().join(IGNORE_FILE_NAME);
    let file = match File::open(&path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };

    let mut rules = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "stopped reading ignore file");
                break;
            }
        };
        if let Some(rule) = translate_ignore_line(&line).and_then(|g| compile_ignore_glob(&g)) {
            rules.push(rule);
        }
    }
    tracing::debug!(path = %path.display(), rules = rules.len(), "loaded ignore rules");
    rules
}

/// Parse ignore-file text into glob rules.
pub fn parse_ignore_rules(text: &str) -> Vec<GlobRule> {
    text.lines()
        .filter_map(translate_ignore_line)
        .filter_map(|g| compile_ignore_glob(&g))
        .collect()
}

fn compile_ignore_glob(glob: &str) -> Option<GlobRule> {
    let rule = GlobRule::new(glob);
    if rule.is_none() {
        tracing::warn!(glob, "dropping invalid ignore rule");
    }
    rule
}

/// Translate one ignore-file line into a glob, or `None` when the line carries no rule.
///
/// Negated rules are skipped. A trailing `/` matches everything beneath the directory.
/// A leading `/` anchors at the root; anything else matches at any depth.
fn translate_ignore_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }

    let mut pattern = line.to_string();
    if pattern.ends_with('/') {
        pattern.push_str("**");
    }

    match pattern.strip_prefix('/') {
        Some(anchored) => Some(anchored.to_string()),
        None => Some(format!("**/{pattern}")),
    }
}

/// Convert platform separators to `/`.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Slash-normalized path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let rel = rel.to_string_lossy();
    if rel.is_empty() {
        return None;
    }
    Some(normalize_path(&rel))
}

/// Extension of the final path component, starting at its last dot.
fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').map(|idx| &name[idx..])
}

/// Number of components in a relative path; a file at the root has depth 1.
pub fn path_depth(path: &str) -> usize {
    path.split('/').filter(|c| !c.is_empty()).count()
}

/// Walk `root` and return the relative paths of every file the filter includes.
///
/// Excluded directories are pruned without being read. `max_depth` of `None`
/// means unlimited. The result is sorted.
pub fn discover_files(
    root: impl AsRef<Path>,
    filter: &FilterConfig,
    max_depth: Option<usize>,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let root = root.as_ref();

    if !root.is_dir() {
        return Err(DifflocError::PathNotFound(root.to_path_buf()));
    }

    let mut walker = WalkDir::new(root);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    let entries = walker.into_iter().filter_entry(|e| {
        if e.depth() == 0 || !e.file_type().is_dir() {
            return true;
        }
        relative_path(root, e.path()).map_or(true, |rel| filter.should_descend(&rel))
    });

    for entry in entries {
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
        // symlinks are followed to files but never to directories
        let is_file = entry.file_type().is_file()
            || (entry.file_type().is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }
        if let Some(rel) = relative_path(root, entry.path()) {
            if filter.should_include(&rel) {
                files.push(rel);
            }
        }
    }

    files.sort();
    Ok(files)
}
