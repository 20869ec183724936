use std::path::PathBuf;

/// Name of the batch descriptor that must sit at the root of every patch archive.
pub const DESCRIPTOR_NAME: &str = "batch.warup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplySummary {
    /// The patched target directory.
    pub target: PathBuf,
    pub commands_executed: usize,
    pub copies: usize,
    pub removals: usize,
    /// Entries copied from the target into the working tree before execution.
    pub entries_staged: usize,
    /// Hex BLAKE3 digest of the promoted tree, when promotion was verified.
    pub digest: Option<String>,
}
