use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::deep_copy::copy_tree;
use crate::deep_remove::remove_dir_contents;
use crate::error::{Result, WarupError};
use crate::extract;
use crate::parser::read_descriptor;
use crate::patch_format::{ApplySummary, DESCRIPTOR_NAME};
use crate::util;

#[derive(Debug, Clone)]
pub struct ApplierConfig {
    /// File name of the batch descriptor at the archive root.
    pub descriptor_name: String,
    /// Where the working copy and the extracted archive are created.
    /// `None` means the platform temp directory.
    pub temp_root: Option<PathBuf>,
    /// Also refuse targets whose listing cannot be read.
    pub require_readable: bool,
    /// Compare tree digests of the working copy and the promoted target.
    pub verify_promotion: bool,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            descriptor_name: DESCRIPTOR_NAME.to_string(),
            temp_root: None,
            require_readable: true,
            verify_promotion: true,
        }
    }
}

impl ApplierConfig {
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn with_descriptor_name(mut self, name: impl Into<String>) -> Self {
        self.descriptor_name = name.into();
        self
    }

    pub fn with_verify_promotion(mut self, verify: bool) -> Self {
        self.verify_promotion = verify;
        self
    }

    pub fn with_require_readable(mut self, readable: bool) -> Self {
        self.require_readable = readable;
        self
    }

    fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Applies patch archives to directory trees.
///
/// The target is copied to a private working tree, the batch runs against that
/// copy, and only a fully successful batch is promoted back onto the target.
/// Any failure before promotion leaves the target exactly as it was.
///
/// Promotion itself (clear target, copy working tree in) is not atomic. A
/// failure there is reported as [`WarupError::Promotion`]; the working tree is
/// then kept on disk and its path is part of the error.
///
/// The applier holds no per-call state, so one instance can serve many calls,
/// but two calls must never target the same directory at the same time.
#[derive(Debug, Clone, Default)]
pub struct PatchApplier {
    config: ApplierConfig,
}

impl PatchApplier {
    pub fn new(config: ApplierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ApplierConfig {
        &self.config
    }

    /// Whether `archive` looks like a patch package: a zip with the descriptor at its root.
    /// Says nothing about whether the patch would apply.
    pub fn accepts(&self, archive: &Path) -> bool {
        extract::contains_descriptor(archive, &self.config.descriptor_name)
    }

    /// Apply the patch archive `archive` to the directory `target`.
    #[tracing::instrument(skip_all, fields(archive = %archive.display(), target = %target.display()))]
    pub fn apply(&self, archive: &Path, target: &Path) -> Result<ApplySummary> {
        self.apply_with(archive, target, promote)
    }

    fn apply_with(&self, archive: &Path, target: &Path, promote: Promote) -> Result<ApplySummary> {
        info!("validating target");
        self.validate_target(target)?;

        let temp_root = self.config.temp_root();

        info!("staging working copy");
        let (working, entries_staged) = stage(target, &temp_root)?;

        // From here on, returning early drops `working` and deletes it.
        info!(working = %working.path().display(), "extracting patch archive");
        let extracted = extract::extract_to_temp(archive, &temp_root)?;

        info!(patch = %extracted.path().display(), "executing batch");
        let (descriptor_path, descriptor) = self.open_descriptor(archive, extracted.path())?;
        let mut executed = 0;
        let mut copies = 0;
        let mut removals = 0;
        for command in read_descriptor(descriptor, &descriptor_path) {
            let step = executed + 1;
            let command = command.inspect_err(|e| {
                error!(step, error = %e, "descriptor line rejected, target left untouched");
            })?;
            debug!(step, %command, "executing");
            if let Err(e) = command.apply(extracted.path(), working.path()) {
                error!(step, %command, error = %e, "command failed, target left untouched");
                return Err(e);
            }
            executed += 1;
            match command {
                Command::Copy { .. } => copies += 1,
                Command::Remove { .. } => removals += 1,
            }
        }
        drop(extracted);

        let expected = if self.config.verify_promotion {
            Some(util::tree_digest(working.path())?)
        } else {
            None
        };

        info!("promoting working copy onto target");
        if let Err(source) = promote(working.path(), target, expected) {
            let staged = working.keep();
            error!(
                staged = %staged.display(),
                error = %source,
                "promotion failed, target may be partially updated"
            );
            return Err(WarupError::Promotion {
                target: target.to_path_buf(),
                staged,
                source: Box::new(source),
            });
        }

        let working_path = working.path().to_path_buf();
        if let Err(e) = working.close() {
            warn!(working = %working_path.display(), error = %e, "could not remove working copy");
        }

        info!(commands = executed, "patch applied");
        Ok(ApplySummary {
            target: target.to_path_buf(),
            commands_executed: executed,
            copies,
            removals,
            entries_staged,
            digest: expected.map(|hash| hash.to_hex().to_string()),
        })
    }

    fn validate_target(&self, target: &Path) -> Result<()> {
        let invalid = |reason| WarupError::TargetInvalid {
            path: target.to_path_buf(),
            reason,
        };

        let meta = fs::metadata(target).map_err(|_| invalid("could not find target to apply to"))?;
        if !meta.is_dir() {
            return Err(invalid("target must be a directory"));
        }
        if meta.permissions().readonly() {
            return Err(invalid("target must be writable"));
        }
        // Mode bits alone say nothing about ownership, so try to create a file.
        if tempfile::tempfile_in(target).is_err() {
            return Err(invalid("target must be writable"));
        }
        if self.config.require_readable && fs::read_dir(target).is_err() {
            return Err(invalid("target must be readable"));
        }
        Ok(())
    }

    /// Find the descriptor among the top-level entries of the extracted archive and open it.
    fn open_descriptor(
        &self,
        archive: &Path,
        patch_root: &Path,
    ) -> Result<(PathBuf, BufReader<File>)> {
        let name = &self.config.descriptor_name;
        let missing = || WarupError::DescriptorMissing {
            archive: archive.to_path_buf(),
            name: name.clone(),
        };

        let listing = fs::read_dir(patch_root).map_err(|e| WarupError::DescriptorUnreadable {
            path: patch_root.to_path_buf(),
            source: e,
        })?;
        let descriptor = listing
            .filter_map(|entry| entry.ok())
            .find(|entry| {
                entry.file_name() == name.as_str()
                    && entry.file_type().is_ok_and(|t| t.is_file())
            })
            .map(|entry| entry.path())
            .ok_or_else(missing)?;

        let file = File::open(&descriptor).map_err(|e| WarupError::DescriptorUnreadable {
            path: descriptor.clone(),
            source: e,
        })?;
        Ok((descriptor, BufReader::new(file)))
    }
}

/// Replaces the target's contents with the working copy's.
type Promote = fn(&Path, &Path, Option<blake3::Hash>) -> Result<()>;

/// Copy `target` into a fresh working directory under `temp_root`.
fn stage(target: &Path, temp_root: &Path) -> Result<(TempDir, usize)> {
    if let (Ok(root), Ok(tree)) = (temp_root.canonicalize(), target.canonicalize()) {
        if root.starts_with(&tree) {
            return Err(WarupError::StagingCreate {
                root: temp_root.to_path_buf(),
                source: std::io::Error::other("temporary directory lies inside the target"),
            });
        }
    }

    let working = tempfile::Builder::new()
        .prefix("warup-staging-")
        .tempdir_in(temp_root)
        .map_err(|e| WarupError::StagingCreate {
            root: temp_root.to_path_buf(),
            source: e,
        })?;

    let stats = copy_tree(target, working.path()).map_err(|e| WarupError::Staging {
        target: target.to_path_buf(),
        staging: working.path().to_path_buf(),
        source: Box::new(e),
    })?;
    // The root of the copy is the working directory itself.
    let entries = stats.files_copied + stats.dirs_created.saturating_sub(1);
    Ok((working, entries))
}

/// Replace the contents of `target` with the contents of `working`.
fn promote(working: &Path, target: &Path, expected: Option<blake3::Hash>) -> Result<()> {
    let removed = remove_dir_contents(target)?;
    debug!(removed, "cleared target");
    copy_tree(working, target)?;

    if let Some(expected) = expected {
        let actual = util::tree_digest(target)?;
        if actual != expected {
            return Err(WarupError::DigestMismatch {
                path: target.to_path_buf(),
                expected: expected.to_hex().to_string(),
                actual: actual.to_hex().to_string(),
            });
        }
    }
    Ok(())
}
