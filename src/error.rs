use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WarupError>;

/// Coarse failure categories, independent of the context attached to each error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TargetInvalid,
    ArchiveUnreadable,
    DescriptorMissing,
    LineUnparseable,
    CopyFailure,
    DeleteFailure,
    StagingFailure,
    /// The target was already being overwritten when the failure happened.
    PromotionFailure,
    Verification,
}

#[derive(Debug, Error)]
pub enum WarupError {
    #[error("{reason}: {}", .path.display())]
    TargetInvalid { path: PathBuf, reason: &'static str },

    #[error("could not read patch archive {}", .path.display())]
    ArchiveUnreadable {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive {} contains an entry outside the extraction root: {entry}", .archive.display())]
    ArchiveEntryUnsafe { archive: PathBuf, entry: String },

    #[error("could not extract archive entry to {}", .path.display())]
    ArchiveExtract {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not find patch file {name} in {}", .archive.display())]
    DescriptorMissing { archive: PathBuf, name: String },

    #[error("could not read patch file {}", .path.display())]
    DescriptorUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Line could not be parsed: {line}")]
    LineUnparseable { line_number: usize, line: String },

    #[error("Line could not be parsed: {line} (path {path:?} escapes its root)")]
    UnsafePath {
        line_number: usize,
        line: String,
        path: String,
    },

    #[error("unable to deep copy {} to {}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to deep copy {} to {}: destination is a non-empty directory", .from.display(), .to.display())]
    CopyConflict { from: PathBuf, to: PathBuf },

    #[error("could not delete {}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not create working copy under {}", .root.display())]
    StagingCreate {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not copy target {} into working copy {}", .target.display(), .staging.display())]
    Staging {
        target: PathBuf,
        staging: PathBuf,
        #[source]
        source: Box<WarupError>,
    },

    #[error(
        "promotion of {} failed, target may be partially updated; staged copy kept at {}",
        .target.display(),
        .staged.display()
    )]
    Promotion {
        target: PathBuf,
        staged: PathBuf,
        #[source]
        source: Box<WarupError>,
    },

    #[error("could not hash {}", .path.display())]
    Digest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tree digest mismatch for {}: expected {expected}, found {actual}", .path.display())]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl WarupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TargetInvalid { .. } => ErrorKind::TargetInvalid,
            Self::ArchiveUnreadable { .. }
            | Self::ArchiveEntryUnsafe { .. }
            | Self::ArchiveExtract { .. }
            | Self::DescriptorUnreadable { .. } => ErrorKind::ArchiveUnreadable,
            Self::DescriptorMissing { .. } => ErrorKind::DescriptorMissing,
            Self::LineUnparseable { .. } | Self::UnsafePath { .. } => ErrorKind::LineUnparseable,
            Self::Copy { .. } | Self::CopyConflict { .. } => ErrorKind::CopyFailure,
            Self::Delete { .. } => ErrorKind::DeleteFailure,
            Self::StagingCreate { .. } | Self::Staging { .. } => ErrorKind::StagingFailure,
            Self::Promotion { .. } => ErrorKind::PromotionFailure,
            Self::Digest { .. } | Self::DigestMismatch { .. } => ErrorKind::Verification,
        }
    }

    /// Whether the target directory is guaranteed to be exactly as it was before the call.
    pub fn target_untouched(&self) -> bool {
        self.kind() != ErrorKind::PromotionFailure
    }

    pub(crate) fn copy(from: &Path, to: &Path, source: io::Error) -> Self {
        Self::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }
    }

    pub(crate) fn delete(path: &Path, source: io::Error) -> Self {
        Self::Delete {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_line_is_echoed_verbatim() {
        let err = WarupError::LineUnparseable {
            line_number: 3,
            line: "i'm not a parseable command!".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Line could not be parsed: i'm not a parseable command!"
        );
        assert_eq!(err.kind(), ErrorKind::LineUnparseable);
        assert!(err.target_untouched());
    }

    #[test]
    fn test_only_promotion_failures_touch_the_target() {
        let inner = WarupError::delete(
            Path::new("/tmp/x"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(inner.target_untouched());

        let err = WarupError::Promotion {
            target: PathBuf::from("/srv/app"),
            staged: PathBuf::from("/tmp/warup-staging-abc"),
            source: Box::new(inner),
        };
        assert_eq!(err.kind(), ErrorKind::PromotionFailure);
        assert!(!err.target_untouched());
        assert!(err.to_string().contains("/tmp/warup-staging-abc"));
    }

    #[test]
    fn test_target_message_names_the_path() {
        let err = WarupError::TargetInvalid {
            path: PathBuf::from("foobar"),
            reason: "could not find target to apply to",
        };
        assert_eq!(err.to_string(), "could not find target to apply to: foobar");
    }
}
