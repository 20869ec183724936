use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, WarupError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub dirs_created: usize,
    pub files_copied: usize,
}

/// Deep-copy `source` (file or directory) onto `destination`.
///
/// Every path below `source` is relativized against it and re-resolved against
/// `destination`. Directories are created pre-order; existing files are unlinked and replaced.
/// An existing empty directory in the way is replaced, a non-empty one is a conflict.
/// Entries already present under `destination` that are not part of the copy are left alone.
/// Directory permissions are copied once the whole subtree is in place.
pub fn copy_tree(source: &Path, destination: &Path) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    let mut dir_permissions = Vec::new();

    fs::symlink_metadata(source).map_err(|e| WarupError::copy(source, destination, e))?;
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| WarupError::copy(source, destination, e))?;
        }
    }

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| WarupError::copy(source, destination, io::Error::from(e)))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| WarupError::copy(source, destination, io::Error::other(e)))?;
        let target = if relative.as_os_str().is_empty() {
            destination.to_path_buf()
        } else {
            destination.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            prepare_directory(entry.path(), &target)?;
            let meta = entry
                .metadata()
                .map_err(|e| WarupError::copy(entry.path(), &target, io::Error::from(e)))?;
            dir_permissions.push((target, meta.permissions()));
            stats.dirs_created += 1;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            stats.files_copied += 1;
        } else {
            copy_file(entry.path(), &target)?;
            stats.files_copied += 1;
        }
    }

    // Deepest first, so a read-only parent never blocks fixing up its children.
    for (dir, permissions) in dir_permissions.into_iter().rev() {
        fs::set_permissions(&dir, permissions).map_err(|e| WarupError::copy(source, &dir, e))?;
    }

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        dirs = stats.dirs_created,
        files = stats.files_copied,
        "deep copy finished"
    );
    Ok(stats)
}

fn prepare_directory(from: &Path, to: &Path) -> Result<()> {
    match fs::symlink_metadata(to) {
        Ok(meta) if meta.is_dir() => ensure_empty(from, to),
        Ok(_) => {
            fs::remove_file(to).map_err(|e| WarupError::copy(from, to, e))?;
            fs::create_dir(to).map_err(|e| WarupError::copy(from, to, e))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir(to).map_err(|e| WarupError::copy(from, to, e))
        }
        Err(e) => Err(WarupError::copy(from, to, e)),
    }
}

/// Clears whatever occupies `to` so a file or link can take its place.
fn make_room(from: &Path, to: &Path) -> Result<()> {
    match fs::symlink_metadata(to) {
        Ok(meta) if meta.is_dir() => {
            ensure_empty(from, to)?;
            fs::remove_dir(to).map_err(|e| WarupError::copy(from, to, e))
        }
        // Unlink rather than write through: a read-only file or a link must not block the copy.
        Ok(_) => fs::remove_file(to).map_err(|e| WarupError::copy(from, to, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WarupError::copy(from, to, e)),
    }
}

fn ensure_empty(from: &Path, to: &Path) -> Result<()> {
    let mut listing = fs::read_dir(to).map_err(|e| WarupError::copy(from, to, e))?;
    if listing.next().is_some() {
        return Err(WarupError::CopyConflict {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    make_room(from, to)?;
    fs::copy(from, to).map_err(|e| WarupError::copy(from, to, e))?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let link = fs::read_link(from).map_err(|e| WarupError::copy(from, to, e))?;
    make_room(from, to)?;
    std::os::unix::fs::symlink(&link, to).map_err(|e| WarupError::copy(from, to, e))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    copy_file(from, to)
}
