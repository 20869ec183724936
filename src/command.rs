use std::fmt;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::deep_copy::copy_tree;
use crate::deep_remove::remove_tree;
use crate::error::Result;

/// One patch operation. `add` and `replace` both parse to [`Command::Copy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Deep-copy `patch_root/from` onto `working_root/to`.
    Copy { from: PathBuf, to: PathBuf },
    /// Deep-delete `working_root/path`.
    Remove { path: PathBuf },
}

impl Command {
    /// Run the operation. `patch_root` is the extracted archive, `working_root`
    /// the tree being mutated. Removal never reads `patch_root`.
    pub fn apply(&self, patch_root: &Path, working_root: &Path) -> Result<()> {
        match self {
            Command::Copy { from, to } => {
                let stats = copy_tree(&patch_root.join(from), &working_root.join(to))?;
                debug!(command = %self, files = stats.files_copied, dirs = stats.dirs_created, "applied");
            }
            Command::Remove { path } => {
                let removed = remove_tree(&working_root.join(path))?;
                debug!(command = %self, removed, "applied");
            }
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Copy { from, to } => {
                write!(f, "copy {} -> {}", from.display(), to.display())
            }
            Command::Remove { path } => write!(f, "rm {}", path.display()),
        }
    }
}

/// Turn a descriptor path into a path relative to one of the two roots.
///
/// Leading separators are stripped, so `/foo/bar` and `foo/bar` are the same path.
/// Returns `None` when nothing is left or the path could leave its root.
pub fn normalize_relative(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim_start_matches(['/', '\\']);
    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    #[test]
    fn test_leading_separator_is_stripped() {
        assert_eq!(normalize_relative("/foo/bar"), normalize_relative("foo/bar"));
        assert_eq!(normalize_relative("//foo"), Some(PathBuf::from("foo")));
        assert_eq!(normalize_relative("./a/./b"), Some(PathBuf::from("a/b")));
    }

    #[test]
    fn test_escaping_or_empty_paths_are_rejected() {
        assert_eq!(normalize_relative(""), None);
        assert_eq!(normalize_relative("/"), None);
        assert_eq!(normalize_relative("../etc/passwd"), None);
        assert_eq!(normalize_relative("a/../../b"), None);
    }

    #[test]
    fn test_copy_reads_patch_root_and_writes_working_root() {
        let patch = tempfile::tempdir().unwrap();
        let working = tempfile::tempdir().unwrap();
        fs::write(patch.path().join("hello.txt"), "hello world!").unwrap();

        let command = Command::Copy {
            from: PathBuf::from("hello.txt"),
            to: PathBuf::from("greetings/hello.txt"),
        };
        command.apply(patch.path(), working.path()).unwrap();

        assert_eq!(
            fs::read_to_string(working.path().join("greetings/hello.txt")).unwrap(),
            "hello world!"
        );
        assert!(patch.path().join("hello.txt").exists());
    }

    #[test]
    fn test_remove_only_touches_working_root() {
        let patch = tempfile::tempdir().unwrap();
        let working = tempfile::tempdir().unwrap();
        fs::write(patch.path().join("same.txt"), "patch").unwrap();
        fs::write(working.path().join("same.txt"), "working").unwrap();

        let command = Command::Remove {
            path: PathBuf::from("same.txt"),
        };
        command.apply(patch.path(), working.path()).unwrap();

        assert!(!working.path().join("same.txt").exists());
        assert!(patch.path().join("same.txt").exists());
    }

    #[test]
    fn test_failures_propagate_with_their_kind() {
        let patch = tempfile::tempdir().unwrap();
        let working = tempfile::tempdir().unwrap();

        let copy = Command::Copy {
            from: PathBuf::from("absent.txt"),
            to: PathBuf::from("absent.txt"),
        };
        let remove = Command::Remove {
            path: PathBuf::from("absent.txt"),
        };

        assert_eq!(
            copy.apply(patch.path(), working.path()).unwrap_err().kind(),
            ErrorKind::CopyFailure
        );
        assert_eq!(
            remove.apply(patch.path(), working.path()).unwrap_err().kind(),
            ErrorKind::DeleteFailure
        );
    }
}
