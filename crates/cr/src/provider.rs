use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::block::BlockPointer;
use crate::entry::DirEntry;
use crate::error::Result;
use crate::path::CrPath;

// NOTE: every collaborator here may suspend; the resolution core
//  awaits them one at a time and never holds them across phases.

/// Read and write access to the entries of one branch's directories
#[async_trait]
pub trait DirectoryAccessor: Send + Sync {
    /// Look up an entry by name
    ///
    /// # Arguments
    /// * `dir` - The directory's current pointer
    /// * `name` - The entry name within the directory
    ///
    /// # Returns
    /// * `Ok(DirEntry)` - The entry
    /// * `Err(CrError::NoSuchName)` - No entry has that name
    async fn lookup(&self, dir: BlockPointer, name: &str) -> Result<DirEntry>;

    /// Write an entry, replacing whatever had the name before
    ///
    /// # Returns
    /// * `Ok(Vec<BlockPointer>)` - Blocks no longer referenced because
    ///   the entry was replaced
    async fn set_entry(
        &self,
        dir: BlockPointer,
        name: &str,
        entry: DirEntry,
    ) -> Result<Vec<BlockPointer>>;

    /// Remove an entry
    ///
    /// # Returns
    /// * `Ok(Vec<BlockPointer>)` - Blocks the removal unreferenced
    /// * `Err(CrError::NoSuchName)` - No entry has that name
    async fn remove_entry(&self, dir: BlockPointer, name: &str) -> Result<Vec<BlockPointer>>;
}

/// Deep-copies a file's block tree
#[async_trait]
pub trait ContentCopier: Send + Sync {
    /// Copy the file at `ptr` (known as `name`) and return the new
    ///  top block pointer
    async fn copy(&self, name: &str, ptr: BlockPointer) -> Result<BlockPointer>;
}

/// Locates nodes in a branch's current tree
#[async_trait]
pub trait PathSearch: Send + Sync {
    /// Find the path from `root` to each of `ptrs`
    ///
    /// # Returns
    /// * `Ok(BTreeMap<BlockPointer, CrPath>)` - Paths for the pointers
    ///   that were found. Pointers that weren't may be missing or map
    ///   to an empty path.
    async fn search_for_paths(
        &self,
        ptrs: &[BlockPointer],
        root: BlockPointer,
    ) -> Result<BTreeMap<BlockPointer, CrPath>>;
}

/// Reads the entries of a directory so a node's type can be looked up
#[async_trait]
pub trait BlockTypeResolver: Send + Sync {
    async fn entries_of(&self, dir: BlockPointer) -> Result<BTreeMap<String, DirEntry>>;
}
