use std::fs::{self, File};
use std::io;
use std::path::Path;

use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{Result, WarupError};

/// Whether `archive` is a zip file with `descriptor_name` at its top level.
///
/// Never fails: a missing file, a non-zip file or any read error means "no".
pub fn contains_descriptor(archive: &Path, descriptor_name: &str) -> bool {
    let Ok(file) = File::open(archive) else {
        return false;
    };
    let Ok(mut zip) = ZipArchive::new(file) else {
        return false;
    };
    // Directory entries end in a slash, so an exact name match is a file.
    zip.index_for_name(descriptor_name).is_some()
}

/// Extract `archive` into a fresh temporary directory under `temp_root`.
///
/// Directory entries are skipped, parent directories are created on first need.
/// The returned directory is removed when dropped.
pub fn extract_to_temp(archive: &Path, temp_root: &Path) -> Result<TempDir> {
    let file = File::open(archive).map_err(|e| WarupError::ArchiveUnreadable {
        path: archive.to_path_buf(),
        source: zip::result::ZipError::Io(e),
    })?;
    let mut zip = ZipArchive::new(file).map_err(|e| WarupError::ArchiveUnreadable {
        path: archive.to_path_buf(),
        source: e,
    })?;

    let extract_dir = tempfile::Builder::new()
        .prefix("warup-patch-")
        .tempdir_in(temp_root)
        .map_err(|e| WarupError::ArchiveExtract {
            path: temp_root.to_path_buf(),
            source: e,
        })?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| WarupError::ArchiveUnreadable {
            path: archive.to_path_buf(),
            source: e,
        })?;
        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            return Err(WarupError::ArchiveEntryUnsafe {
                archive: archive.to_path_buf(),
                entry: entry.name().to_string(),
            });
        };
        let destination = extract_dir.path().join(relative);

        if let Some(parent) = destination.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| WarupError::ArchiveExtract {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let mut output = File::create(&destination).map_err(|e| WarupError::ArchiveExtract {
            path: destination.clone(),
            source: e,
        })?;
        io::copy(&mut entry, &mut output).map_err(|e| WarupError::ArchiveExtract {
            path: destination.clone(),
            source: e,
        })?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&destination, fs::Permissions::from_mode(mode)).map_err(|e| {
                WarupError::ArchiveExtract {
                    path: destination.clone(),
                    source: e,
                }
            })?;
        }

        debug!(entry = %destination.display(), "extracted");
    }

    Ok(extract_dir)
}
