//! Path safety gate run before any analysis starts.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};

/// System locations that are never analyzed.
const PROTECTED_DIRS: &[&str] = &[
    "/usr",
    "/etc",
    "/var",
    "/bin",
    "/sbin",
    "/boot",
    "/sys",
    "/proc",
    "/dev",
    "/System",
    "/Library",
    "/Applications",
    "/Volumes",
    "/private",
    "/opt",
    "/root",
    "/tmp",
    "/Windows",
    "/Program Files",
    "/Program Files (x86)",
];

/// Resolve `path` to a clean absolute path and refuse locations too broad to scan.
pub fn validate_path(path: &Path) -> anyhow::Result<PathBuf> {
    let abs = absolute(path)?;
    check_path(&abs, dirs::home_dir().as_deref())?;
    Ok(abs)
}

/// Warning text when `path` is a direct child of the home directory.
pub fn large_directory_warning(path: &Path) -> Option<String> {
    let home = dirs::home_dir()?;
    large_directory_warning_in(path, &home)
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to resolve path")?
            .join(path)
    };
    Ok(clean(&joined))
}

/// Lexically normalize `.` and `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn check_path(path: &Path, home: Option<&Path>) -> anyhow::Result<()> {
    if path.parent().is_none() {
        bail!(
            "refusing to run in root directory ({}). This could scan your entire system",
            path.display()
        );
    }

    if let Some(home) = home {
        if path == home {
            bail!(
                "refusing to run in home directory ({}). Please run in a specific project directory",
                home.display()
            );
        }
    }

    if PROTECTED_DIRS.iter().any(|dir| path == Path::new(dir)) {
        bail!(
            "refusing to run in system directory ({}). This is a protected system location",
            path.display()
        );
    }

    let parent = path.parent();
    let too_broad = parent == Some(Path::new("/"))
        || home.and_then(Path::parent).is_some_and(|p| parent == Some(p));
    if too_broad {
        bail!(
            "refusing to run at ({}). This directory is too broad. Please run in a specific project directory",
            path.display()
        );
    }

    Ok(())
}

fn large_directory_warning_in(path: &Path, home: &Path) -> Option<String> {
    let rel = path.strip_prefix(home).ok()?;
    if rel.components().count() != 1 {
        return None;
    }
    let name = path.file_name()?.to_string_lossy();
    Some(format!(
        "Warning: Analyzing a top-level directory in your home folder ({}). This may take a while.",
        name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(path: &str, home: &str) -> anyhow::Result<()> {
        check_path(Path::new(path), Some(Path::new(home)))
    }

    #[test]
    fn test_root_and_home_refused() {
        assert!(check("/", "/home/dev").is_err());
        let err = check("/home/dev", "/home/dev").unwrap_err();
        assert!(err.to_string().contains("home directory"));
    }

    #[test]
    fn test_system_directories_refused() {
        for dir in ["/usr", "/etc", "/tmp", "/Program Files"] {
            let err = check(dir, "/home/dev").unwrap_err();
            assert!(err.to_string().contains("system directory"), "{dir}");
        }
    }

    #[test]
    fn test_broad_directories_refused() {
        assert!(check("/srv", "/home/dev").is_err());
        // sibling of the home directory
        assert!(check("/home/other", "/home/dev").is_err());
    }

    #[test]
    fn test_project_directories_allowed() {
        assert!(check("/home/dev/src/project", "/home/dev").is_ok());
        assert!(check("/home/dev/project", "/home/dev").is_ok());
        assert!(check("/tmp/build-123/repo", "/home/dev").is_ok());
        assert!(check_path(Path::new("/srv/app/repo"), None).is_ok());
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("/a/b/")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_large_directory_warning() {
        let home = Path::new("/home/dev");
        let warning = large_directory_warning_in(Path::new("/home/dev/Documents"), home).unwrap();
        assert!(warning.contains("(Documents)"));

        assert!(large_directory_warning_in(Path::new("/home/dev/src/project"), home).is_none());
        assert!(large_directory_warning_in(Path::new("/srv/project"), home).is_none());
    }
}
