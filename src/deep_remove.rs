use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, WarupError};

/// Delete `path` and, when it is a directory, everything below it.
///
/// Children are always removed strictly before their parent. A missing `path`
/// is an error. The first failing entry aborts the rest of the subtree.
/// Returns the number of entries removed.
pub fn remove_tree(path: &Path) -> Result<usize> {
    let meta = fs::symlink_metadata(path).map_err(|e| WarupError::delete(path, e))?;
    if !meta.is_dir() {
        fs::remove_file(path).map_err(|e| WarupError::delete(path, e))?;
        debug!(path = %path.display(), "removed file");
        return Ok(1);
    }

    let mut removed = 0;
    for entry in WalkDir::new(path).follow_links(false).contents_first(true) {
        let entry = entry.map_err(|e| {
            let failed = e.path().unwrap_or(path).to_path_buf();
            WarupError::delete(&failed, io::Error::from(e))
        })?;
        let result = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        result.map_err(|e| WarupError::delete(entry.path(), e))?;
        removed += 1;
    }

    debug!(path = %path.display(), removed, "deep remove finished");
    Ok(removed)
}

/// Delete every entry inside `dir`, keeping `dir` itself.
pub fn remove_dir_contents(dir: &Path) -> Result<usize> {
    let listing = fs::read_dir(dir).map_err(|e| WarupError::delete(dir, e))?;
    let mut removed = 0;
    for entry in listing {
        let entry = entry.map_err(|e| WarupError::delete(dir, e))?;
        removed += remove_tree(&entry.path())?;
    }
    Ok(removed)
}
