use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::{BlockPointer, Revision};

/**
 * Entries
 * =======
 * A directory maps names to entries. An entry is the parent's view
 *  of a child: which pointer holds the child right now, what kind
 *  of node it is, and the handful of attributes that live in the
 *  parent rather than in the child's own blocks.
 * CR only ever reads and writes entries through a directory
 *  accessor, so nothing here knows how directories are stored.
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    File,
    Exec,
    Dir,
    Sym,
}

impl EntryType {
    pub fn is_file(&self) -> bool {
        matches!(self, EntryType::File | EntryType::Exec)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryType::File => "FILE",
            EntryType::Exec => "EXEC",
            EntryType::Dir => "DIR",
            EntryType::Sym => "SYM",
        };
        write!(f, "{}", s)
    }
}

/// A pointer the entry used to have at an earlier revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevRevision {
    pub ptr: BlockPointer,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub ptr: BlockPointer,
    pub entry_type: EntryType,
    pub size: u64,
    pub encoded_size: u64,
    pub mtime: DateTime<Utc>,
    // only meaningful when entry_type is Sym
    pub sym_path: Option<String>,
    pub prev_revisions: Vec<PrevRevision>,
}

impl DirEntry {
    pub fn new(ptr: BlockPointer, entry_type: EntryType) -> Self {
        Self {
            ptr,
            entry_type,
            size: 0,
            encoded_size: 0,
            mtime: DateTime::<Utc>::default(),
            sym_path: None,
            prev_revisions: Vec::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self.encoded_size = size;
        self
    }

    /// Turn this entry into a symlink pointing at `target`
    pub fn convert_to_symlink(&mut self, target: &str) {
        self.entry_type = EntryType::Sym;
        self.sym_path = Some(target.to_string());
    }

    /// Start over from the history of the entry being replaced,
    ///  or from nothing if there was none
    pub fn reset_prev_revisions(&mut self, replaced: Option<&DirEntry>) {
        self.prev_revisions = replaced
            .map(|entry| entry.prev_revisions.clone())
            .unwrap_or_default();
    }
}

/// Which parent-held attribute a set-attribute op changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrChange {
    /// executable bit
    Ex,
    Mtime,
    /// size, which also moves the entry's pointer
    Size,
}

impl fmt::Display for AttrChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttrChange::Ex => "exAttr",
            AttrChange::Mtime => "mtimeAttr",
            AttrChange::Size => "sizeAttr",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symlink_conversion() {
        let mut entry =
            DirEntry::new(BlockPointer::from_content(b"f"), EntryType::Dir).with_size(4096);
        assert!(!entry.entry_type.is_file());
        entry.convert_to_symlink("../x.conflict");

        assert_eq!(entry.entry_type, EntryType::Sym);
        assert_eq!(entry.sym_path.as_deref(), Some("../x.conflict"));
    }

    #[test]
    fn test_reset_prev_revisions() {
        let mut merged =
            DirEntry::new(BlockPointer::from_content(b"merged"), EntryType::File);
        merged.prev_revisions.push(PrevRevision {
            ptr: BlockPointer::from_content(b"older"),
            revision: Revision(3),
        });
        let mut unmerged =
            DirEntry::new(BlockPointer::from_content(b"unmerged"), EntryType::File);
        unmerged.prev_revisions.push(PrevRevision {
            ptr: BlockPointer::from_content(b"local"),
            revision: Revision(9),
        });

        unmerged.reset_prev_revisions(Some(&merged));
        assert_eq!(unmerged.prev_revisions, merged.prev_revisions);

        unmerged.reset_prev_revisions(None);
        assert!(unmerged.prev_revisions.is_empty());
    }
}
