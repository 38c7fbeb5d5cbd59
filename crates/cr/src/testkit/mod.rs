//! In-memory collaborators for exercising conflict resolution
//!
//! [`MemoryFs`] holds one branch's directories as plain maps and
//! implements every collaborator trait against them, so a test can
//! lay out an unmerged tree and a merged tree, run detection and
//! apply, then look at what ended up where.
//!
//! # Example
//!
//! ```rust,ignore
//! use cr::testkit::{fake_ptr, MemoryFs};
//!
//! let merged = MemoryFs::new();
//! merged.insert(fake_ptr(1), "notes.txt", DirEntry::new(fake_ptr(2), EntryType::File));
//! let entry = merged.entry(fake_ptr(1), "notes.txt");
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::block::BlockPointer;
use crate::entry::DirEntry;
use crate::error::{CrError, Result};
use crate::path::CrPath;
use crate::provider::{BlockTypeResolver, ContentCopier, DirectoryAccessor, PathSearch};

/// A deterministic, always initialized pointer for `n`
pub fn fake_ptr(n: u64) -> BlockPointer {
    BlockPointer::from_content(format!("fake-{}", n).as_bytes())
}

/// A record of one content copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    pub name: String,
    pub from: BlockPointer,
    pub to: BlockPointer,
}

type Dir = BTreeMap<String, DirEntry>;

/// One branch's tree, in memory
#[derive(Debug, Default)]
pub struct MemoryFs {
    dirs: RwLock<BTreeMap<BlockPointer, Dir>>,
    paths: RwLock<BTreeMap<BlockPointer, CrPath>>,
    copies: RwLock<Vec<CopyRecord>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `dir` exists, empty if it is new
    pub fn add_dir(&self, dir: BlockPointer) {
        self.dirs.write().entry(dir).or_default();
    }

    pub fn insert(&self, dir: BlockPointer, name: &str, entry: DirEntry) {
        self.dirs
            .write()
            .entry(dir)
            .or_default()
            .insert(name.to_string(), entry);
    }

    /// Register where `ptr` can be found, for path searches
    pub fn set_path(&self, ptr: BlockPointer, path: CrPath) {
        self.paths.write().insert(ptr, path);
    }

    /* Getters */

    pub fn entry(&self, dir: BlockPointer, name: &str) -> Option<DirEntry> {
        self.dirs.read().get(&dir).and_then(|d| d.get(name)).cloned()
    }

    pub fn names(&self, dir: BlockPointer) -> Vec<String> {
        self.dirs
            .read()
            .get(&dir)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn copies(&self) -> Vec<CopyRecord> {
        self.copies.read().clone()
    }

    fn missing_dir(dir: BlockPointer) -> CrError {
        anyhow::anyhow!("no directory {}", dir).into()
    }
}

#[async_trait]
impl DirectoryAccessor for MemoryFs {
    async fn lookup(&self, dir: BlockPointer, name: &str) -> Result<DirEntry> {
        let dirs = self.dirs.read();
        let entries = dirs.get(&dir).ok_or_else(|| Self::missing_dir(dir))?;
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| CrError::NoSuchName(name.to_string()))
    }

    async fn set_entry(
        &self,
        dir: BlockPointer,
        name: &str,
        entry: DirEntry,
    ) -> Result<Vec<BlockPointer>> {
        let mut dirs = self.dirs.write();
        let entries = dirs.get_mut(&dir).ok_or_else(|| Self::missing_dir(dir))?;
        let replaced = entries.insert(name.to_string(), entry.clone());
        Ok(replaced
            .map(|old| old.ptr)
            .filter(|ptr| ptr.is_initialized() && *ptr != entry.ptr)
            .into_iter()
            .collect())
    }

    async fn remove_entry(&self, dir: BlockPointer, name: &str) -> Result<Vec<BlockPointer>> {
        let mut dirs = self.dirs.write();
        let entries = dirs.get_mut(&dir).ok_or_else(|| Self::missing_dir(dir))?;
        let removed = entries
            .remove(name)
            .ok_or_else(|| CrError::NoSuchName(name.to_string()))?;
        Ok(vec![removed.ptr])
    }
}

#[async_trait]
impl ContentCopier for MemoryFs {
    async fn copy(&self, name: &str, ptr: BlockPointer) -> Result<BlockPointer> {
        let mut copies = self.copies.write();
        let to = BlockPointer::from_content(
            format!("copy-{}-{}-{}", copies.len(), name, ptr.to_hex()).as_bytes(),
        );
        copies.push(CopyRecord {
            name: name.to_string(),
            from: ptr,
            to,
        });
        Ok(to)
    }
}

#[async_trait]
impl PathSearch for MemoryFs {
    async fn search_for_paths(
        &self,
        ptrs: &[BlockPointer],
        _root: BlockPointer,
    ) -> Result<BTreeMap<BlockPointer, CrPath>> {
        let paths = self.paths.read();
        Ok(ptrs
            .iter()
            .filter_map(|ptr| paths.get(ptr).map(|path| (*ptr, path.clone())))
            .collect())
    }
}

#[async_trait]
impl BlockTypeResolver for MemoryFs {
    async fn entries_of(&self, dir: BlockPointer) -> Result<BTreeMap<String, DirEntry>> {
        self.dirs
            .read()
            .get(&dir)
            .cloned()
            .ok_or_else(|| Self::missing_dir(dir))
    }
}
