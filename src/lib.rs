//! Staged application of declarative patch archives to directory trees.
//!
//! A patch archive is a zip holding a `batch.warup` descriptor plus payload files.
//! Each descriptor line is one of:
//!
//! ```text
//! add --from=<archive path> --to=<target path>
//! replace --from=<archive path> --to=<target path>
//! rm --from=<target path>
//! ```
//!
//! [`PatchApplier::apply`] runs the batch against a private copy of the target and
//! only copies the result back once every line has succeeded.

pub mod apply;
pub mod command;
pub mod deep_copy;
pub mod deep_remove;
pub mod error;
pub mod extract;
pub mod parser;
pub mod patch_format;
pub mod util;

pub use apply::{ApplierConfig, PatchApplier};
pub use command::Command;
pub use error::{ErrorKind, Result, WarupError};
pub use patch_format::{ApplySummary, DESCRIPTOR_NAME};
