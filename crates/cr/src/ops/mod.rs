//! Operation log model
//!
//! Every mutation a branch makes to the tree is recorded as an [`Op`]:
//! a shared [`OpCommon`] base (block references, unreferences, pointer
//! updates, writer metadata) plus an [`OpKind`] payload describing what
//! actually happened.
//!
//! The pointer updates are what let chain construction follow a node
//! through all of its versions. Create, remove and set-attribute ops
//! carry the update of the directory they touched, write-syncs carry the
//! update of the file, and renames carry one update per directory
//! involved (only one if the rename stays inside a directory).

mod conflict;
mod invert;
mod write_range;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::{BlockPointer, BlockUpdate, Revision};
use crate::entry::{AttrChange, EntryType};
use crate::error::{CrError, Result};

pub use write_range::{
    add_to_collapsed_write_range, collapse_write_range, write_ranges_equivalent, WriteRange,
};

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity for one op instance.
///
/// Clones share an id, which is how an action can name "this exact
///  op" even after the chain it lives in has been rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(u64);

impl OpId {
    fn next() -> Self {
        Self(NEXT_OP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Who wrote an op, and in which revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterInfo {
    pub writer: String,
    pub revision: Revision,
}

impl WriterInfo {
    pub fn new(writer: impl Into<String>, revision: Revision) -> Self {
        Self {
            writer: writer.into(),
            revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCommon {
    pub id: OpId,
    /// Blocks first referenced by this op
    pub refs: Vec<BlockPointer>,
    /// Blocks this op stopped referencing
    pub unrefs: Vec<BlockPointer>,
    /// Secondary pointer updates (e.g. ancestors of the touched dir)
    pub updates: Vec<BlockUpdate>,
    pub writer: WriterInfo,
    pub local_timestamp: DateTime<Utc>,
}

impl Default for OpCommon {
    fn default() -> Self {
        Self {
            id: OpId::next(),
            refs: Vec::new(),
            unrefs: Vec::new(),
            updates: Vec::new(),
            writer: WriterInfo::default(),
            local_timestamp: DateTime::<Utc>::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOp {
    pub new_name: String,
    pub dir: BlockUpdate,
    pub entry_type: EntryType,
    /// This create is the second half of a split rename
    pub renamed: bool,
    /// Always copy the entry, even when it looks unchanged
    pub force_copy: bool,
    /// Set when conflict resolution turned this entry into a symlink
    pub cr_sym_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmOp {
    pub old_name: String,
    pub dir: BlockUpdate,
    pub removed_type: EntryType,
    /// Resolution decided this remove should not be replayed
    pub drop_this: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOp {
    pub old_name: String,
    pub old_dir: BlockUpdate,
    pub new_name: String,
    /// Unset when the rename stays within `old_dir`
    pub new_dir: BlockUpdate,
    pub renamed: BlockPointer,
    pub renamed_type: EntryType,
}

impl RenameOp {
    pub fn is_same_dir(&self) -> bool {
        !self.new_dir.is_set()
    }

    /// The update of the directory the node ended up in
    pub fn dest_dir(&self) -> BlockUpdate {
        if self.is_same_dir() {
            self.old_dir
        } else {
            self.new_dir
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOp {
    pub file: BlockUpdate,
    pub writes: Vec<WriteRange>,
    /// On conflict, keep the unmerged name instead of a conflict name
    pub keep_unmerged_tail_name: bool,
}

impl SyncOp {
    /// Fold this op's writes into an already-collapsed range list
    pub fn collapse_write_range(&self, existing: Vec<WriteRange>) -> Vec<WriteRange> {
        collapse_write_range(existing, &self.writes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAttrOp {
    pub name: String,
    pub dir: BlockUpdate,
    pub attr: AttrChange,
    /// Attributes don't change the file's own pointer
    pub file: BlockPointer,
    /// On conflict, keep the unmerged name instead of a conflict name
    pub keep_unmerged_tail_name: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcOp {
    pub latest_rev: Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Create(CreateOp),
    Rm(RmOp),
    Rename(RenameOp),
    Sync(SyncOp),
    SetAttr(SetAttrOp),
    /// Block changes made by an earlier (partial) resolution
    Resolution,
    Rekey,
    Gc(GcOp),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub common: OpCommon,
    pub kind: OpKind,
}

fn require_set(ptr: BlockPointer, what: &str) -> Result<()> {
    if !ptr.is_initialized() {
        return Err(CrError::InvalidUpdate(format!("{} pointer unset", what)));
    }
    Ok(())
}

impl Op {
    fn from_kind(kind: OpKind) -> Self {
        Self {
            common: OpCommon::default(),
            kind,
        }
    }

    pub fn create(
        name: impl Into<String>,
        old_dir: BlockPointer,
        entry_type: EntryType,
    ) -> Result<Self> {
        require_set(old_dir, "create dir")?;
        Ok(Self::from_kind(OpKind::Create(CreateOp {
            new_name: name.into(),
            dir: BlockUpdate::pending(old_dir),
            entry_type,
            renamed: false,
            force_copy: false,
            cr_sym_path: None,
        })))
    }

    pub fn rm(
        name: impl Into<String>,
        old_dir: BlockPointer,
        removed_type: EntryType,
    ) -> Result<Self> {
        require_set(old_dir, "rm dir")?;
        Ok(Self::from_kind(OpKind::Rm(RmOp {
            old_name: name.into(),
            dir: BlockUpdate::pending(old_dir),
            removed_type,
            drop_this: false,
        })))
    }

    /// A rename; `new_dir` equal to `old_dir` means an in-place rename
    pub fn rename(
        old_name: impl Into<String>,
        old_dir: BlockPointer,
        new_name: impl Into<String>,
        new_dir: BlockPointer,
        renamed: BlockPointer,
        renamed_type: EntryType,
    ) -> Result<Self> {
        require_set(old_dir, "rename old dir")?;
        let new_dir = if new_dir == old_dir {
            BlockUpdate::default()
        } else {
            require_set(new_dir, "rename new dir")?;
            BlockUpdate::pending(new_dir)
        };
        Ok(Self::from_kind(OpKind::Rename(RenameOp {
            old_name: old_name.into(),
            old_dir: BlockUpdate::pending(old_dir),
            new_name: new_name.into(),
            new_dir,
            renamed,
            renamed_type,
        })))
    }

    pub fn sync(old_file: BlockPointer) -> Result<Self> {
        require_set(old_file, "sync file")?;
        Ok(Self::from_kind(OpKind::Sync(SyncOp {
            file: BlockUpdate::pending(old_file),
            writes: Vec::new(),
            keep_unmerged_tail_name: false,
        })))
    }

    pub fn set_attr(
        name: impl Into<String>,
        old_dir: BlockPointer,
        attr: AttrChange,
        file: BlockPointer,
    ) -> Result<Self> {
        require_set(old_dir, "setattr dir")?;
        Ok(Self::from_kind(OpKind::SetAttr(SetAttrOp {
            name: name.into(),
            dir: BlockUpdate::pending(old_dir),
            attr,
            file,
            keep_unmerged_tail_name: false,
        })))
    }

    pub fn resolution() -> Self {
        Self::from_kind(OpKind::Resolution)
    }

    pub fn rekey() -> Self {
        Self::from_kind(OpKind::Rekey)
    }

    pub fn gc(latest_rev: Revision) -> Self {
        Self::from_kind(OpKind::Gc(GcOp { latest_rev }))
    }

    /// The same op under a new identity
    pub fn with_fresh_id(mut self) -> Self {
        self.common.id = OpId::next();
        self
    }

    /* Getters */

    pub fn id(&self) -> OpId {
        self.common.id
    }

    pub fn refs(&self) -> &[BlockPointer] {
        &self.common.refs
    }

    pub fn unrefs(&self) -> &[BlockPointer] {
        &self.common.unrefs
    }

    pub fn writer_info(&self) -> &WriterInfo {
        &self.common.writer
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            OpKind::Create(_) => "create",
            OpKind::Rm(_) => "rm",
            OpKind::Rename(_) => "rename",
            OpKind::Sync(_) => "sync",
            OpKind::SetAttr(_) => "setAttr",
            OpKind::Resolution => "resolution",
            OpKind::Rekey => "rekey",
            OpKind::Gc(_) => "gc",
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self.kind, OpKind::Sync(_))
    }

    pub fn is_set_attr(&self) -> bool {
        matches!(self.kind, OpKind::SetAttr(_))
    }

    /// Every update this op carries: the secondary ones first, then
    ///  the primary one(s). For renames the new dir comes before the
    ///  old dir.
    pub fn all_updates(&self) -> Vec<BlockUpdate> {
        let mut updates = self.common.updates.clone();
        match &self.kind {
            OpKind::Create(op) => updates.push(op.dir),
            OpKind::Rm(op) => updates.push(op.dir),
            OpKind::SetAttr(op) => updates.push(op.dir),
            OpKind::Sync(op) => updates.push(op.file),
            OpKind::Rename(op) => {
                if op.new_dir.is_set() {
                    updates.push(op.new_dir);
                }
                updates.push(op.old_dir);
            }
            OpKind::Resolution | OpKind::Rekey | OpKind::Gc(_) => {}
        }
        updates
    }

    /// The update chain construction should follow when anchoring
    ///  this op to a brand new chain
    pub(crate) fn primary_update_mut(&mut self) -> Option<&mut BlockUpdate> {
        match &mut self.kind {
            OpKind::Create(op) => Some(&mut op.dir),
            OpKind::Rm(op) => Some(&mut op.dir),
            OpKind::SetAttr(op) => Some(&mut op.dir),
            OpKind::Sync(op) => Some(&mut op.file),
            OpKind::Rename(_) | OpKind::Resolution | OpKind::Rekey | OpKind::Gc(_) => None,
        }
    }

    /* Mutators */

    /// Record that `old` became `new`. If `old` is the op's primary
    ///  pointer this completes the primary update, otherwise it is
    ///  kept as a secondary update.
    pub fn add_update(&mut self, old: BlockPointer, new: BlockPointer) {
        let primary = match &mut self.kind {
            OpKind::Create(op) if op.dir.old == old => Some(&mut op.dir),
            OpKind::Rm(op) if op.dir.old == old => Some(&mut op.dir),
            OpKind::SetAttr(op) if op.dir.old == old => Some(&mut op.dir),
            OpKind::Sync(op) if op.file.old == old => Some(&mut op.file),
            OpKind::Rename(op) if op.old_dir.old == old => Some(&mut op.old_dir),
            OpKind::Rename(op) if op.new_dir.is_set() && op.new_dir.old == old => {
                Some(&mut op.new_dir)
            }
            _ => None,
        };
        match primary {
            Some(update) => update.new = new,
            None => self.common.updates.push(BlockUpdate { old, new }),
        }
    }

    pub fn add_ref(&mut self, ptr: BlockPointer) {
        self.common.refs.push(ptr);
    }

    pub fn add_unref(&mut self, ptr: BlockPointer) {
        self.common.unrefs.push(ptr);
    }

    pub fn del_ref(&mut self, ptr: BlockPointer) {
        if let Some(i) = self.common.refs.iter().position(|p| *p == ptr) {
            self.common.refs.remove(i);
        }
    }

    pub fn del_unref(&mut self, ptr: BlockPointer) {
        if let Some(i) = self.common.unrefs.iter().position(|p| *p == ptr) {
            self.common.unrefs.remove(i);
        }
    }

    pub fn set_writer_info(&mut self, writer: WriterInfo) {
        self.common.writer = writer;
    }

    pub fn set_local_timestamp(&mut self, ts: DateTime<Utc>) {
        self.common.local_timestamp = ts;
    }

    /// Append a write; a no-op on anything but a sync
    pub fn add_write(&mut self, off: u64, len: u64) {
        if let OpKind::Sync(op) = &mut self.kind {
            op.writes.push(WriteRange::write(off, len));
        }
    }

    pub fn add_truncate(&mut self, off: u64) {
        if let OpKind::Sync(op) = &mut self.kind {
            op.writes.push(WriteRange::truncate(off));
        }
    }

    /// Check that every update this op carries is complete
    pub fn check_valid(&self) -> Result<()> {
        for update in self.all_updates() {
            update.check_valid()?;
        }
        Ok(())
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OpKind::Create(op) => write!(f, "create {} ({})", op.new_name, op.entry_type),
            OpKind::Rm(op) => write!(f, "rm {}", op.old_name),
            OpKind::Rename(op) => write!(f, "rename {} -> {}", op.old_name, op.new_name),
            OpKind::Sync(op) => {
                write!(f, "sync [")?;
                for (i, w) in op.writes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", w)?;
                }
                write!(f, "]")
            }
            OpKind::SetAttr(op) => write!(f, "setAttr {} ({})", op.name, op.attr),
            OpKind::Resolution => write!(f, "resolution"),
            OpKind::Rekey => write!(f, "rekey"),
            OpKind::Gc(op) => write!(f, "gc {}", op.latest_rev),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr(tag: &str) -> BlockPointer {
        BlockPointer::from_content(tag.as_bytes())
    }

    #[test]
    fn test_constructors_reject_unset_dirs() {
        assert!(Op::create("a", BlockPointer::ZERO, EntryType::File).is_err());
        assert!(Op::rm("a", BlockPointer::ZERO, EntryType::File).is_err());
        assert!(Op::sync(BlockPointer::ZERO).is_err());
        let rename = Op::rename("a", ptr("d"), "b", BlockPointer::ZERO, ptr("n"), EntryType::File);
        assert!(rename.is_err());
    }

    #[test]
    fn test_add_update_routes_primary() {
        let mut op = Op::create("a", ptr("dir"), EntryType::File).unwrap();
        op.add_update(ptr("dir"), ptr("dir2"));
        op.add_update(ptr("root"), ptr("root2"));

        let OpKind::Create(create) = &op.kind else {
            panic!("expected create");
        };
        assert_eq!(create.dir.new, ptr("dir2"));
        assert_eq!(op.common.updates.len(), 1);
        assert!(op.check_valid().is_ok());

        let updates = op.all_updates();
        assert_eq!(updates.len(), 2);
        // primary update is last
        assert_eq!(updates[1].old, ptr("dir"));
    }

    #[test]
    fn test_rename_updates() {
        let mut same =
            Op::rename("a", ptr("d"), "b", ptr("d"), ptr("n"), EntryType::File).unwrap();
        same.add_update(ptr("d"), ptr("d2"));
        assert_eq!(same.all_updates().len(), 1);

        let mut cross =
            Op::rename("a", ptr("d"), "b", ptr("e"), ptr("n"), EntryType::File).unwrap();
        cross.add_update(ptr("d"), ptr("d2"));
        cross.add_update(ptr("e"), ptr("e2"));
        let updates = cross.all_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], BlockUpdate::new(ptr("e"), ptr("e2")).unwrap());
        assert_eq!(updates[1], BlockUpdate::new(ptr("d"), ptr("d2")).unwrap());
    }

    #[test]
    fn test_clone_keeps_identity() {
        let op = Op::rm("a", ptr("d"), EntryType::File).unwrap();
        let clone = op.clone();
        assert_eq!(op.id(), clone.id());
        assert_ne!(op.id(), clone.with_fresh_id().id());
    }

    #[test]
    fn test_display() {
        let mut op = Op::sync(ptr("f")).unwrap();
        op.add_write(0, 5);
        op.add_truncate(10);
        assert_eq!(op.to_string(), "sync [{0+5}, {trunc@10}]");
    }
}
