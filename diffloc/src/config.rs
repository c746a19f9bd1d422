//! Optional YAML config file and its merge with command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::parser::ValueSource;
use clap::ArgMatches;
use serde::Deserialize;

/// Looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".diffloc.yaml";

/// Keys accepted in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileConfig {
    pub no_gitignore: Option<bool>,
    pub exclude_tests: Option<bool>,
    pub exclude: Vec<String>,
    pub ext: Vec<String>,
    pub max_depth: Option<usize>,
}

impl FileConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Load the config file.
///
/// An explicitly named file must exist; the default file is optional.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Option<(PathBuf, FileConfig)>> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    if !required && !path.is_file() {
        return Ok(None);
    }

    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = FileConfig::parse(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some((path, config)))
}

/// Effective analysis settings after merging flags over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub no_gitignore: bool,
    pub exclude_tests: bool,
    pub exclude: Vec<String>,
    pub ext: Vec<String>,
    pub max_depth: usize,
}

impl Settings {
    /// Flags given on the command line win; list flags fall back to the file when empty.
    pub fn resolve(matches: &ArgMatches, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        let explicit =
            |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);

        let no_gitignore = if explicit("no-gitignore") {
            matches.get_flag("no-gitignore")
        } else {
            file.no_gitignore.unwrap_or(false)
        };
        let exclude_tests = if explicit("exclude-tests") {
            matches.get_flag("exclude-tests")
        } else {
            file.exclude_tests.unwrap_or(false)
        };

        let list = |id: &str, fallback: Vec<String>| {
            let values: Vec<String> = matches
                .get_many::<String>(id)
                .map(|v| v.cloned().collect())
                .unwrap_or_default();
            if values.is_empty() {
                fallback
            } else {
                values
            }
        };

        let max_depth = if explicit("max-depth") {
            matches.get_one::<usize>("max-depth").copied().unwrap_or(0)
        } else {
            file.max_depth.unwrap_or(0)
        };

        Self {
            no_gitignore,
            exclude_tests,
            exclude: list("exclude", file.exclude),
            ext: list("ext", file.ext),
            max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_command;
    use tempfile::tempdir;

    fn matches(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["diffloc"];
        argv.extend_from_slice(args);
        build_command().try_get_matches_from(argv).unwrap()
    }

    fn file_config() -> FileConfig {
        FileConfig::parse(
            "no-gitignore: true\nexclude-tests: true\nexclude:\n  - generated\next:\n  - .go\nmax-depth: 4\n",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_config() {
        let config = file_config();
        assert_eq!(config.no_gitignore, Some(true));
        assert_eq!(config.exclude_tests, Some(true));
        assert_eq!(config.exclude, vec!["generated"]);
        assert_eq!(config.ext, vec![".go"]);
        assert_eq!(config.max_depth, Some(4));

        assert_eq!(FileConfig::parse("").unwrap(), FileConfig::default());
        assert!(FileConfig::parse("ext: 5\n").is_err());
    }

    #[test]
    fn test_file_values_used_without_flags() {
        let settings = Settings::resolve(&matches(&[]), Some(&file_config()));
        assert!(settings.no_gitignore);
        assert!(settings.exclude_tests);
        assert_eq!(settings.exclude, vec!["generated"]);
        assert_eq!(settings.ext, vec![".go"]);
        assert_eq!(settings.max_depth, 4);
    }

    #[test]
    fn test_flags_override_file() {
        let settings = Settings::resolve(
            &matches(&["--ext", "py", "--exclude", "vendor2", "--max-depth", "2"]),
            Some(&file_config()),
        );
        assert_eq!(settings.ext, vec!["py"]);
        assert_eq!(settings.exclude, vec!["vendor2"]);
        assert_eq!(settings.max_depth, 2);
        assert!(settings.no_gitignore);
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::resolve(&matches(&["--exclude-tests"]), None);
        assert_eq!(
            settings,
            Settings {
                exclude_tests: true,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn test_load_explicit_and_default() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("custom.yaml");
        fs::write(&path, "ext: [.rs]\n").unwrap();

        let (used, config) = load(Some(path.as_path())).unwrap().unwrap();
        assert_eq!(used, path);
        assert_eq!(config.ext, vec![".rs"]);

        assert!(load(Some(temp.path().join("missing.yaml").as_path())).is_err());
    }
}
