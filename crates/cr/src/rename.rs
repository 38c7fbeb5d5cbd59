use async_trait::async_trait;

use crate::error::Result;
use crate::ops::Op;

/// Chooses the name an entry gets when it has to step aside for a
///  conflicting one
#[async_trait]
pub trait ConflictRenamer: Send + Sync {
    /// # Arguments
    /// * `op` - The op that lost the name
    /// * `original` - The name being given up
    async fn conflict_rename(&self, op: &Op, original: &str) -> Result<String>;
}

/// Names conflicts after the writer of the losing op and the day it
///  was written: `notes.txt` becomes `notes.conflict.alice.2024-03-01.txt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateConflictRenamer;

#[async_trait]
impl ConflictRenamer for DateConflictRenamer {
    async fn conflict_rename(&self, op: &Op, original: &str) -> Result<String> {
        let (base, ext) = split_file_extension(original);
        let writer = &op.writer_info().writer;
        let date = op.common.local_timestamp.format("%Y-%m-%d");
        Ok(format!("{}.conflict.{}.{}{}", base, writer, date, ext))
    }
}

/// Split `name` into base and extension (with its dot). A leading
///  dot doesn't start an extension, so `.bashrc` has none.
pub fn split_file_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}
