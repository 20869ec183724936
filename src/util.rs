use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, WarupError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub relative_path: String,
    pub kind: EntryKind,
    pub full_path: PathBuf,
    /// Unix permission bits, 0 elsewhere.
    pub mode: u32,
}

/// Walk a directory tree and collect all entries with relative paths, sorted by path.
/// Paths use forward slashes so digests agree across platforms.
pub fn walk_directory(root: &Path) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| digest_error(root, io::Error::from(e)))?;

        let full_path = entry.path().to_path_buf();
        let relative = full_path
            .strip_prefix(root)
            .map_err(|e| digest_error(&full_path, io::Error::other(e)))?;

        let relative_str = relative.to_string_lossy().replace('\\', "/");

        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::File
        };

        let meta = entry
            .metadata()
            .map_err(|e| digest_error(&full_path, io::Error::from(e)))?;

        entries.push(DirEntry {
            relative_path: relative_str,
            kind,
            full_path,
            mode: permission_bits(&meta),
        });
    }

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(entries)
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> u32 {
    0
}

/// Stream-hash a file using BLAKE3.
/// Uses a 256 KB BufReader to reduce syscall overhead vs the default 8 KB.
fn hash_file_streaming(path: &Path) -> Result<blake3::Hash> {
    let file = fs::File::open(path).map_err(|e| digest_error(path, e))?;
    let mut reader = io::BufReader::with_capacity(256 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| digest_error(path, e))?;
    Ok(hasher.finalize())
}

/// Content digest of everything below `root` (the root itself is not included).
///
/// Covers relative paths, entry kinds, file contents, symlink targets and the
/// permission bits of files and directories.
/// File contents are hashed in parallel.
pub fn tree_digest(root: &Path) -> Result<blake3::Hash> {
    let entries = walk_directory(root)?;

    let leaf_hashes: Vec<Option<blake3::Hash>> = entries
        .par_iter()
        .map(|entry| -> Result<Option<blake3::Hash>> {
            match entry.kind {
                EntryKind::Dir => Ok(None),
                EntryKind::File => hash_file_streaming(&entry.full_path).map(Some),
                EntryKind::Symlink => {
                    let link = fs::read_link(&entry.full_path)
                        .map_err(|e| digest_error(&entry.full_path, e))?;
                    Ok(Some(blake3::hash(link.to_string_lossy().as_bytes())))
                }
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let mut hasher = blake3::Hasher::new();
    for (entry, leaf) in entries.iter().zip(&leaf_hashes) {
        let tag: &[u8] = match entry.kind {
            EntryKind::Dir => b"d",
            EntryKind::File => b"f",
            EntryKind::Symlink => b"l",
        };
        hasher.update(tag);
        hasher.update(&(entry.relative_path.len() as u64).to_le_bytes());
        hasher.update(entry.relative_path.as_bytes());
        if entry.kind != EntryKind::Symlink {
            hasher.update(&entry.mode.to_le_bytes());
        }
        if let Some(hash) = leaf {
            hasher.update(hash.as_bytes());
        }
    }
    Ok(hasher.finalize())
}

fn digest_error(path: &Path, source: io::Error) -> WarupError {
    WarupError::Digest {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let full = root.join(rel);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    #[test]
    fn test_walk_sorts_and_uses_forward_slashes() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "b/inner.txt", "x");
        write(temp.path(), "a.txt", "y");

        let paths: Vec<String> = walk_directory(temp.path())
            .unwrap()
            .into_iter()
            .map(|e| e.relative_path)
            .collect();

        assert_eq!(paths, vec!["a.txt", "b", "b/inner.txt"]);
    }

    #[test]
    fn test_identical_trees_have_identical_digests() {
        let left = tempfile::tempdir().unwrap();
        let right = tempfile::tempdir().unwrap();
        for root in [left.path(), right.path()] {
            write(root, "config/settings.json", "{\"version\": 1}");
            write(root, "readme.txt", "Hello");
            fs::create_dir_all(root.join("empty")).unwrap();
        }

        assert_eq!(
            tree_digest(left.path()).unwrap(),
            tree_digest(right.path()).unwrap()
        );
    }

    #[test]
    fn test_digest_detects_content_and_layout_changes() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "readme.txt", "Hello");
        let before = tree_digest(temp.path()).unwrap();

        write(temp.path(), "readme.txt", "Hellp");
        let edited = tree_digest(temp.path()).unwrap();
        assert_ne!(before, edited);

        fs::create_dir_all(temp.path().join("empty")).unwrap();
        assert_ne!(edited, tree_digest(temp.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_digest_detects_directory_mode_changes() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "private/key", "secret");
        fs::set_permissions(temp.path().join("private"), fs::Permissions::from_mode(0o755))
            .unwrap();
        let open = tree_digest(temp.path()).unwrap();

        fs::set_permissions(temp.path().join("private"), fs::Permissions::from_mode(0o700))
            .unwrap();
        assert_ne!(open, tree_digest(temp.path()).unwrap());
    }

    #[test]
    fn test_empty_tree_digest_is_stable() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_eq!(tree_digest(a.path()).unwrap(), tree_digest(b.path()).unwrap());
    }
}
