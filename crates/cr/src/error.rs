use crate::block::BlockPointer;
use crate::entry::EntryType;

pub type Result<T> = std::result::Result<T, CrError>;

#[derive(Debug, thiserror::Error)]
pub enum CrError {
    /// An op referenced a pointer that no chain was built for.
    ///  This is an internal invariant violation and is never recovered.
    #[error("no chain found for {0}")]
    MissingChain(BlockPointer),
    /// Directory accessor lookup miss
    #[error("no such name: {0}")]
    NoSuchName(String),
    #[error("name already exists: {0}")]
    NameExists(String),
    /// No free disambiguated name within the configured attempts
    #[error("couldn't find a unique name for {0}")]
    UniquifyExhausted(String),
    /// Content copies are only defined for files
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("invalid block update: {0}")]
    InvalidUpdate(String),
    /// Renames are split during chain construction and should never
    ///  reach conflict detection
    #[error("unexpected conflict check on a rename op: {0}")]
    RenameConflictCheck(String),
    #[error("a chain with original {0} already exists")]
    OriginalExists(BlockPointer),
    #[error("unexpected entry type {entry_type:?} for chain {original}")]
    UnexpectedEntryType {
        original: BlockPointer,
        entry_type: EntryType,
    },
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
}

impl CrError {
    /// Whether this is the accessor's "not found" outcome, which
    ///  several callers treat as control flow rather than failure
    pub fn is_no_such_name(&self) -> bool {
        matches!(self, CrError::NoSuchName(_))
    }
}
