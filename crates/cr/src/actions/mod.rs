//! Resolution actions
//!
//! Conflict detection turns every surviving unmerged op into at most
//! one [`CrAction`]. Applying an action happens in two steps: `apply`
//! changes directory content in the merged tree, and `update_ops`
//! patches the op logs of both branches so that replaying them
//! describes what was actually done.

mod apply;
mod collapse;
mod kinds;
mod oplog;

use std::fmt;

pub use apply::{apply_actions, ApplyEnv};
pub use collapse::{ActionList, MERGED_ACTION_PREFIX};
pub use kinds::{
    CopyUnmergedAttr, CopyUnmergedEntry, DropUnmerged, RenameMerged, RenameUnmerged,
    RmMergedEntry,
};

use crate::block::BlockPointer;
use crate::chains::ChainRegistry;
use crate::entry::DirEntry;
use crate::error::{CrError, Result};
use crate::provider::{ContentCopier, DirectoryAccessor};
use crate::rename::split_file_extension;

#[derive(Debug, Clone, PartialEq)]
pub enum CrAction {
    CopyUnmergedEntry(CopyUnmergedEntry),
    CopyUnmergedAttr(CopyUnmergedAttr),
    RmMergedEntry(RmMergedEntry),
    RenameUnmerged(RenameUnmerged),
    RenameMerged(RenameMerged),
    DropUnmerged(DropUnmerged),
}

/// Where `apply` should read the unmerged side of an action from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swap {
    /// The unmerged directory, as usual
    Keep,
    /// The merged directory being written
    MergedDir,
    /// Another merged directory, by its most recent pointer
    Parent(BlockPointer),
}

/// One directory of one branch
#[derive(Clone, Copy)]
pub struct DirHandle<'a> {
    accessor: &'a dyn DirectoryAccessor,
    ptr: BlockPointer,
}

impl<'a> DirHandle<'a> {
    pub fn new(accessor: &'a dyn DirectoryAccessor, ptr: BlockPointer) -> Self {
        Self { accessor, ptr }
    }

    pub fn ptr(&self) -> BlockPointer {
        self.ptr
    }

    /// Re-point at another directory of the same branch
    pub fn at(&self, ptr: BlockPointer) -> Self {
        Self {
            accessor: self.accessor,
            ptr,
        }
    }

    pub async fn lookup(&self, name: &str) -> Result<DirEntry> {
        self.accessor.lookup(self.ptr, name).await
    }

    /// Like `lookup`, with a missing name as `None`
    pub async fn lookup_opt(&self, name: &str) -> Result<Option<DirEntry>> {
        match self.accessor.lookup(self.ptr, name).await {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.is_no_such_name() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn set_entry(&self, name: &str, entry: DirEntry) -> Result<Vec<BlockPointer>> {
        self.accessor.set_entry(self.ptr, name, entry).await
    }

    pub async fn remove_entry(&self, name: &str) -> Result<Vec<BlockPointer>> {
        self.accessor.remove_entry(self.ptr, name).await
    }
}

/// The pointers and directories `update_ops` works against
#[derive(Clone, Copy)]
pub struct UpdateTarget<'a> {
    pub unmerged_most_recent: BlockPointer,
    pub merged_most_recent: BlockPointer,
    pub unmerged_dir: DirHandle<'a>,
    pub merged_dir: DirHandle<'a>,
}

impl CrAction {
    /// The name collapsing groups this action under
    pub fn subject_name(&self) -> &str {
        match self {
            CrAction::CopyUnmergedEntry(a) => &a.from_name,
            CrAction::CopyUnmergedAttr(a) => &a.from_name,
            CrAction::RmMergedEntry(a) => &a.name,
            CrAction::RenameUnmerged(a) => &a.from_name,
            CrAction::RenameMerged(a) => &a.from_name,
            CrAction::DropUnmerged(_) => "",
        }
    }

    /// Decide whether to read from a merged directory instead of the
    ///  unmerged one. Only entry copies ever swap.
    pub async fn swap_unmerged_block(
        &mut self,
        unmerged: &ChainRegistry,
        merged: &ChainRegistry,
        unmerged_dir: DirHandle<'_>,
    ) -> Result<Swap> {
        match self {
            CrAction::CopyUnmergedEntry(a) => {
                a.swap_unmerged_block(unmerged, merged, unmerged_dir)
                    .await
            }
            _ => Ok(Swap::Keep),
        }
    }

    /// Change the merged directory's content. Returns the pointers
    ///  that are no longer referenced as a result.
    pub async fn apply(
        &mut self,
        env: &ApplyEnv<'_>,
        unmerged_dir: DirHandle<'_>,
        merged_dir: DirHandle<'_>,
    ) -> Result<Vec<BlockPointer>> {
        match self {
            CrAction::CopyUnmergedEntry(a) => a.apply(env, unmerged_dir, merged_dir).await,
            CrAction::CopyUnmergedAttr(a) => a.apply(unmerged_dir, merged_dir).await,
            CrAction::RmMergedEntry(a) => a.apply(merged_dir).await,
            CrAction::RenameUnmerged(a) => a.apply(env, unmerged_dir, merged_dir).await,
            CrAction::RenameMerged(a) => a.apply(env, unmerged_dir, merged_dir).await,
            CrAction::DropUnmerged(_) => Ok(Vec::new()),
        }
    }

    /// Patch both branches' op logs to match what `apply` did
    pub async fn update_ops(
        &self,
        target: UpdateTarget<'_>,
        unmerged: &mut ChainRegistry,
        merged: &mut ChainRegistry,
    ) -> Result<()> {
        match self {
            CrAction::CopyUnmergedEntry(a) => a.update_ops(target, unmerged, merged).await,
            CrAction::CopyUnmergedAttr(a) => a.update_ops(target, unmerged),
            CrAction::RmMergedEntry(_) => Ok(()),
            CrAction::RenameUnmerged(a) => a.update_ops(target, unmerged, merged).await,
            CrAction::RenameMerged(a) => a.update_ops(target, unmerged, merged).await,
            CrAction::DropUnmerged(a) => a.update_ops(target, unmerged, merged),
        }
    }
}

impl fmt::Display for CrAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = |s: &Option<String>| s.clone().unwrap_or_default();
        match self {
            CrAction::CopyUnmergedEntry(a) => write!(
                f,
                "copyUnmergedEntry: {} -> {} {}",
                a.from_name,
                a.to_name,
                sym(&a.sym_path)
            ),
            CrAction::CopyUnmergedAttr(a) => {
                write!(f, "copyUnmergedAttr: {} -> {} (", a.from_name, a.to_name)?;
                for (i, attr) in a.attrs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", attr)?;
                }
                write!(f, ")")
            }
            CrAction::RmMergedEntry(a) => write!(f, "rmMergedEntry: {}", a.name),
            CrAction::RenameUnmerged(a) => write!(
                f,
                "renameUnmerged: {} -> {} {}",
                a.from_name,
                a.to_name,
                sym(&a.sym_path)
            ),
            CrAction::RenameMerged(a) => {
                write!(f, "renameMerged: {} -> {}", a.from_name, a.to_name)
            }
            CrAction::DropUnmerged(a) => write!(f, "dropUnmerged: {}", a.op),
        }
    }
}

/// `name` itself if `dir` has no such entry, otherwise the first free
///  `"{base} ({n}){ext}"` for n up to `max_attempts`
pub async fn uniquify_name(dir: DirHandle<'_>, name: &str, max_attempts: u32) -> Result<String> {
    if dir.lookup_opt(name).await?.is_none() {
        return Ok(name.to_string());
    }
    let (base, ext) = split_file_extension(name);
    for i in 1..=max_attempts {
        let candidate = format!("{} ({}){}", base, i, ext);
        if dir.lookup_opt(&candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(CrError::UniquifyExhausted(name.to_string()))
}

/// Copy the file `from` in `from_dir` to a unique name near `to` in
///  `to_dir`, deep-copying its blocks unless it is being turned into
///  a symlink.
///
/// # Returns
/// * `Ok((old_ptr, name, unrefs))` - The source's pointer, the name
///   actually used, and what the write unreferenced
/// * `Err(CrError::NotAFile)` - The source is a directory
pub(crate) async fn copy_file(
    copier: &dyn ContentCopier,
    from: &str,
    to: &str,
    sym_path: Option<&str>,
    from_dir: DirHandle<'_>,
    to_dir: DirHandle<'_>,
    max_attempts: u32,
) -> Result<(BlockPointer, String, Vec<BlockPointer>)> {
    let mut entry = from_dir.lookup(from).await?;
    if let Some(sym_path) = sym_path {
        entry.convert_to_symlink(sym_path);
    }
    if entry.entry_type == crate::entry::EntryType::Dir {
        return Err(CrError::NotAFile(from.to_string()));
    }

    let name = uniquify_name(to_dir, to, max_attempts).await?;
    let old_ptr = entry.ptr;
    entry.ptr = if sym_path.is_none() && entry.ptr.is_initialized() {
        copier.copy(&name, entry.ptr).await?
    } else {
        BlockPointer::ZERO
    };
    let unrefs = to_dir.set_entry(&name, entry).await?;
    Ok((old_ptr, name, unrefs))
}
