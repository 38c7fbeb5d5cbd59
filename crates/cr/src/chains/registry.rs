use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::chain::{Chain, ChainId, NodeType};
use super::paths::FinalPaths;
use crate::block::{BlockPointer, Revision};
use crate::config::CrConfig;
use crate::entry::{AttrChange, EntryType};
use crate::error::{CrError, Result};
use crate::ops::{Op, OpKind, WriterInfo};
use crate::provider::BlockTypeResolver;

/// Where a renamed node came from and where it ended up. Across
///  several renames on one branch this keeps the first old location
///  and the last new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameInfo {
    pub original_old_parent: BlockPointer,
    pub old_name: String,
    pub original_new_parent: BlockPointer,
    pub new_name: String,
}

impl fmt::Display for RenameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "renameInfo{{old: {}/{}, new: {}/{}}}",
            self.original_old_parent, self.old_name, self.original_new_parent, self.new_name
        )
    }
}

/// The ops one revision contributed to a branch
#[derive(Debug, Clone)]
pub struct RevisionBatch {
    pub revision: Revision,
    pub writer: String,
    pub timestamp: DateTime<Utc>,
    /// Root directory pointer as of this revision
    pub root: BlockPointer,
    pub ops: Vec<Op>,
}

/// Debug view of one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub path: String,
    pub ops: Vec<String>,
}

/// Every chain on one branch, reachable both by the node's original
///  pointer and by its most recent one.
///
/// Chains live in an arena and the two indexes hold handles into it,
///  so re-keying a chain never moves it. The registry is built once
///  per resolution attempt and then threaded by `&mut` through
///  every phase that rewrites it.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    pub(crate) chains: Vec<Option<Chain>>,
    pub(crate) by_original: BTreeMap<BlockPointer, ChainId>,
    pub(crate) by_most_recent: BTreeMap<BlockPointer, ChainId>,
    /// Any pointer seen on the branch, back to its node's original
    pub(crate) originals: BTreeMap<BlockPointer, BlockPointer>,
    pub(crate) created_originals: BTreeSet<BlockPointer>,
    pub(crate) deleted_originals: BTreeSet<BlockPointer>,
    pub(crate) renamed_originals: BTreeMap<BlockPointer, RenameInfo>,
    /// Pointers the resolution must clean up
    pub(crate) to_unref: BTreeSet<BlockPointer>,
    /// Pointers the resolution must keep even if nothing references them
    pub(crate) do_not_unref: BTreeSet<BlockPointer>,
    pub(crate) res_ops: Vec<Op>,
    pub(crate) original_root: Option<BlockPointer>,
    pub(crate) most_recent_root: Option<BlockPointer>,
    /// Writer of the newest batch, for ops resolution adds on its behalf
    pub(crate) most_recent_writer: WriterInfo,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build chains from revision batches (oldest first) and collapse
    ///  them. Types are left unresolved.
    pub fn from_batches(batches: Vec<RevisionBatch>) -> Result<Self> {
        let mut registry = Self::new();
        for batch in batches {
            let writer = WriterInfo::new(batch.writer, batch.revision);
            for mut op in batch.ops {
                op.set_writer_info(writer.clone());
                op.set_local_timestamp(batch.timestamp);
                registry.make_chain_for_op(op)?;
            }
            if registry.original_root.is_none() {
                if let Some(root) = registry.by_most_recent(batch.root) {
                    registry.original_root = Some(root.original);
                }
            }
            registry.most_recent_root = Some(batch.root);
            registry.most_recent_writer = writer;
        }

        let ids: Vec<ChainId> = registry.by_original.values().copied().collect();
        for id in ids {
            // every chain stays even when emptied, to keep the
            //  original <-> most recent mapping around
            let Some(chain) = registry.chains[id.0].as_mut() else {
                continue;
            };
            let to_unref = chain.collapse(&registry.created_originals, &registry.originals);
            registry.to_unref.extend(to_unref);
        }
        Ok(registry)
    }

    /// Build, collapse, and (if configured and a resolver is given)
    ///  classify every chain as file or directory
    pub async fn build(
        batches: Vec<RevisionBatch>,
        resolver: Option<&dyn BlockTypeResolver>,
        config: &CrConfig,
    ) -> Result<Self> {
        let mut registry = Self::from_batches(batches)?;
        if let (true, Some(resolver)) = (config.identify_types, resolver) {
            let ids: Vec<ChainId> = registry.by_original.values().copied().collect();
            for id in ids {
                registry.identify_type(id, resolver).await?;
            }
        }
        debug!(
            "built {} chains ({} created, {} deleted, {} renamed)",
            registry.by_original.len(),
            registry.created_originals.len(),
            registry.deleted_originals.len(),
            registry.renamed_originals.len()
        );
        Ok(registry)
    }

    /* Arena */

    fn insert_chain(&mut self, original: BlockPointer, most_recent: BlockPointer) -> ChainId {
        let id = ChainId(self.chains.len());
        self.chains.push(Some(Chain::new(original, BlockPointer::ZERO)));
        self.by_original.insert(original, id);
        if most_recent.is_initialized() {
            self.advance(id, most_recent);
        }
        id
    }

    /// Move a chain's most recent pointer, keeping the index in step
    pub(crate) fn advance(&mut self, id: ChainId, most_recent: BlockPointer) {
        let Some(chain) = self.chains[id.0].as_mut() else {
            return;
        };
        let previous = chain.most_recent;
        chain.most_recent = most_recent;
        if previous.is_initialized() && self.by_most_recent.get(&previous) == Some(&id) {
            self.by_most_recent.remove(&previous);
        }
        self.by_most_recent.insert(most_recent, id);
    }

    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id.0).and_then(Option::as_ref)
    }

    pub fn chain_mut(&mut self, id: ChainId) -> Option<&mut Chain> {
        self.chains.get_mut(id.0).and_then(Option::as_mut)
    }

    /* Getters */

    pub fn id_by_original(&self, original: BlockPointer) -> Option<ChainId> {
        self.by_original.get(&original).copied()
    }

    pub fn id_by_most_recent(&self, most_recent: BlockPointer) -> Option<ChainId> {
        self.by_most_recent.get(&most_recent).copied()
    }

    pub fn by_original(&self, original: BlockPointer) -> Option<&Chain> {
        self.id_by_original(original).and_then(|id| self.chain(id))
    }

    pub fn by_most_recent(&self, most_recent: BlockPointer) -> Option<&Chain> {
        self.id_by_most_recent(most_recent)
            .and_then(|id| self.chain(id))
    }

    pub fn by_most_recent_mut(&mut self, most_recent: BlockPointer) -> Option<&mut Chain> {
        let id = self.id_by_most_recent(most_recent)?;
        self.chain_mut(id)
    }

    pub fn by_original_mut(&mut self, original: BlockPointer) -> Option<&mut Chain> {
        let id = self.id_by_original(original)?;
        self.chain_mut(id)
    }

    /// Chains in original-pointer order
    pub fn iter(&self) -> impl Iterator<Item = &Chain> + '_ {
        self.by_original.values().filter_map(|id| self.chain(*id))
    }

    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }

    pub fn original_root(&self) -> Option<BlockPointer> {
        self.original_root
    }

    pub fn most_recent_root(&self) -> Option<BlockPointer> {
        self.most_recent_root
    }

    pub fn most_recent_writer(&self) -> &WriterInfo {
        &self.most_recent_writer
    }

    pub fn res_ops(&self) -> &[Op] {
        &self.res_ops
    }

    pub fn to_unref(&self) -> &BTreeSet<BlockPointer> {
        &self.to_unref
    }

    pub fn do_not_unref(&self) -> &BTreeSet<BlockPointer> {
        &self.do_not_unref
    }

    pub fn mark_do_not_unref(&mut self, ptr: BlockPointer) {
        self.do_not_unref.insert(ptr);
    }

    pub fn created_originals(&self) -> &BTreeSet<BlockPointer> {
        &self.created_originals
    }

    pub fn deleted_originals(&self) -> &BTreeSet<BlockPointer> {
        &self.deleted_originals
    }

    pub fn renamed_info(&self, original: BlockPointer) -> Option<&RenameInfo> {
        self.renamed_originals.get(&original)
    }

    /// Trace any pointer seen on this branch back to its original
    pub fn original_of(&self, ptr: BlockPointer) -> BlockPointer {
        self.originals.get(&ptr).copied().unwrap_or(ptr)
    }

    pub fn most_recent_from_original(&self, original: BlockPointer) -> Result<BlockPointer> {
        self.by_original(original)
            .map(|chain| chain.most_recent)
            .ok_or(CrError::MissingChain(original))
    }

    pub fn most_recent_from_original_or_same(&self, original: BlockPointer) -> BlockPointer {
        self.by_original(original)
            .map(|chain| chain.most_recent)
            .unwrap_or(original)
    }

    pub fn original_from_most_recent(&self, most_recent: BlockPointer) -> Result<BlockPointer> {
        self.by_most_recent(most_recent)
            .map(|chain| chain.original)
            .ok_or(CrError::MissingChain(most_recent))
    }

    pub fn original_from_most_recent_or_same(&self, most_recent: BlockPointer) -> BlockPointer {
        self.by_most_recent(most_recent)
            .map(|chain| chain.original)
            .unwrap_or(most_recent)
    }

    pub fn is_created(&self, original: BlockPointer) -> bool {
        self.created_originals.contains(&original)
    }

    pub fn is_deleted(&self, original: BlockPointer) -> bool {
        self.deleted_originals.contains(&original)
    }

    /// The latest parent and name of a node renamed on this branch
    pub fn renamed_parent_and_name(&self, original: BlockPointer) -> Option<(BlockPointer, &str)> {
        self.renamed_originals
            .get(&original)
            .map(|info| (info.original_new_parent, info.new_name.as_str()))
    }

    /* Construction */

    fn add_op(&mut self, ptr: BlockPointer, op: Op) -> Result<()> {
        let chain = self
            .by_most_recent_mut(ptr)
            .ok_or(CrError::MissingChain(ptr))?;
        chain.ops.push(op);
        Ok(())
    }

    /// Thread one op into the chains it touches: follow each of its
    ///  pointer updates, record what it created and deleted, then
    ///  file the op itself under the node it belongs to.
    pub fn make_chain_for_op(&mut self, op: Op) -> Result<()> {
        // gc unrefs mean something else entirely
        if matches!(op.kind, OpKind::Gc(_)) {
            return Ok(());
        }

        for update in op.all_updates() {
            let id = match self.id_by_most_recent(update.old) {
                Some(id) => id,
                None => self.insert_chain(update.old, BlockPointer::ZERO),
            };
            self.advance(id, update.new);
            if let Some(chain) = self.chain(id) {
                if chain.original != update.new {
                    let original = chain.original;
                    self.originals.insert(update.new, original);
                }
            }
        }

        for ptr in op.refs() {
            self.created_originals.insert(*ptr);
        }

        for ptr in op.unrefs() {
            let original = self.original_of(*ptr);
            // An unref of a pointer that has since been superseded on
            //  this branch is ignored rather than marking the node
            //  deleted.
            if let Some(chain) = self.by_original(original) {
                if *ptr != chain.most_recent {
                    continue;
                }
            }
            self.deleted_originals.insert(original);
        }

        match op.kind {
            OpKind::Create(ref create) => {
                let dir = create.dir.new;
                self.add_op(dir, op)
            }
            OpKind::Rm(ref rm) => {
                let dir = rm.dir.new;
                let old_name = rm.old_name.clone();
                let no_unrefs = op.unrefs().is_empty();
                self.add_op(dir, op)?;
                if no_unrefs {
                    // created and removed within one batch; if it was
                    //  renamed in the meantime, it's gone too
                    let parent = self.original_from_most_recent(dir)?;
                    let renamed = self
                        .renamed_originals
                        .iter()
                        .find(|(_, info)| {
                            info.original_new_parent == parent && info.new_name == old_name
                        })
                        .map(|(original, _)| *original);
                    if let Some(original) = renamed {
                        self.deleted_originals.insert(original);
                    }
                }
                Ok(())
            }
            OpKind::Rename(_) => self.split_rename(op),
            OpKind::Sync(ref sync) => {
                let file = sync.file.new;
                self.add_op(file, op)
            }
            OpKind::SetAttr(ref set_attr) => {
                // attributes don't move the file's pointer, so the
                //  file may not have a chain yet
                let file = set_attr.file;
                if self.id_by_most_recent(file).is_none() {
                    self.insert_chain(file, file);
                }
                self.add_op(file, op)
            }
            OpKind::Resolution => {
                self.res_ops.push(op);
                Ok(())
            }
            OpKind::Rekey | OpKind::Gc(_) => Ok(()),
        }
    }

    /// Renames never live in a chain directly. They become a remove
    ///  in the old parent, an overwrite remove in the new parent when
    ///  something was clobbered, and a create in the new parent.
    fn split_rename(&mut self, op: Op) -> Result<()> {
        let OpKind::Rename(rename) = &op.kind else {
            return Ok(());
        };
        let writer = op.common.writer.clone();
        let timestamp = op.common.local_timestamp;

        let mut rm = Op::rm(&rename.old_name, rename.old_dir.old, rename.renamed_type)?;
        rm.set_writer_info(writer.clone());
        rm.set_local_timestamp(timestamp);
        // the new pointer may be unset on post-resolution chains
        if let OpKind::Rm(inner) = &mut rm.kind {
            inner.dir.new = rename.old_dir.new;
        }
        self.add_op(rename.old_dir.new, rm)?;

        let dest = rename.dest_dir();
        if !op.unrefs().is_empty() {
            // something was overwritten: make the removal explicit
            //  so it can be checked for conflicts
            let mut overwrite = Op::rm(&rename.new_name, dest.old, EntryType::File)?;
            overwrite.set_writer_info(writer.clone());
            if let OpKind::Rm(inner) = &mut overwrite.kind {
                inner.dir.new = dest.new;
            }
            for ptr in op.unrefs() {
                overwrite.add_unref(*ptr);
            }
            self.add_op(dest.new, overwrite)?;
        }

        let mut create = Op::create(&rename.new_name, dest.old, rename.renamed_type)?;
        create.set_writer_info(writer);
        create.set_local_timestamp(timestamp);
        if let OpKind::Create(inner) = &mut create.kind {
            inner.renamed = true;
            inner.dir.new = dest.new;
        }

        if rename.renamed.is_initialized() {
            let new_parent = self
                .by_most_recent(dest.new)
                .ok_or(CrError::MissingChain(dest.new))?
                .original;
            let old_parent = self
                .by_most_recent(rename.old_dir.new)
                .ok_or(CrError::MissingChain(rename.old_dir.new))?
                .original;
            let renamed_original = self
                .by_most_recent(rename.renamed)
                .map(|chain| chain.original)
                .unwrap_or(rename.renamed);

            let mut info = self
                .renamed_originals
                .get(&renamed_original)
                .cloned()
                .unwrap_or_else(|| RenameInfo {
                    original_old_parent: old_parent,
                    old_name: rename.old_name.clone(),
                    original_new_parent: BlockPointer::ZERO,
                    new_name: String::new(),
                });
            info.original_new_parent = new_parent;
            info.new_name = rename.new_name.clone();
            self.renamed_originals.insert(renamed_original, info);
            // remember what was moved, in case directories need
            //  merging later
            create.add_ref(renamed_original);
        }

        self.add_op(dest.new, create)
    }

    /// Start a chain at `target` for an op synthesized during
    ///  resolution, whose own pointers aren't real yet. The op's
    ///  primary update is pinned to `target` while the chain is
    ///  made, then restored. Renames are anchored through a stand-in
    ///  create and then swapped back in, unsplit.
    pub fn make_chain_for_new_op(&mut self, target: BlockPointer, op: Op) -> Result<()> {
        match &op.kind {
            OpKind::Rename(rename) => {
                let mut stand_in =
                    Op::create(&rename.new_name, rename.dest_dir().old, EntryType::File)?;
                anchor_primary_update(&mut stand_in, target);
                self.make_chain_for_op(stand_in)?;
                let chain = self
                    .by_most_recent_mut(target)
                    .ok_or(CrError::MissingChain(target))?;
                if chain.ops.len() != 1 {
                    return Err(anyhow::anyhow!(
                        "chain for {} has {} ops after being made",
                        target,
                        chain.ops.len()
                    )
                    .into());
                }
                chain.ops[0] = op;
                Ok(())
            }
            OpKind::Create(_) | OpKind::Rm(_) | OpKind::SetAttr(_) | OpKind::Sync(_) => {
                let original = op.clone();
                let mut anchored = op;
                anchor_primary_update(&mut anchored, target);
                self.make_chain_for_op(anchored)?;
                // put back the op as it was given
                for chain in self.chains.iter_mut().flatten() {
                    if let Some(slot) = chain.ops.iter_mut().find(|o| o.id() == original.id()) {
                        *slot = original;
                        break;
                    }
                }
                Ok(())
            }
            _ => Err(anyhow::anyhow!("can't make a chain for {}", op).into()),
        }
    }

    /* Type identification */

    /// Work out whether a chain is a file or a directory. Syncs and
    ///  non-mtime attribute changes only happen to files; a chain of
    ///  nothing but mtime changes needs its parent's entry for the
    ///  node to tell.
    pub async fn identify_type(
        &mut self,
        id: ChainId,
        resolver: &dyn BlockTypeResolver,
    ) -> Result<()> {
        let Some(chain) = self.chain(id) else {
            return Ok(());
        };
        if chain.ops.is_empty() {
            return Ok(());
        }

        let mut parent_dir = BlockPointer::ZERO;
        for op in &chain.ops {
            match &op.kind {
                OpKind::Sync(_) => return self.set_type(id, NodeType::File),
                OpKind::SetAttr(set_attr) if set_attr.attr != AttrChange::Mtime => {
                    return self.set_type(id, NodeType::File);
                }
                OpKind::SetAttr(set_attr) => parent_dir = set_attr.dir.new,
                _ => return Ok(()),
            }
        }
        let original = chain.original;
        let most_recent = chain.most_recent;

        let parent_original = match self.originals.get(&parent_dir) {
            Some(original) => *original,
            // a parent created inside a batch may never have had an update
            None if self.is_created(parent_dir) => parent_dir,
            None if self.is_deleted(parent_dir) => return Ok(()),
            None => return Err(CrError::MissingChain(parent_dir)),
        };
        // a renamed file lives under its new parent now
        let parent_original = self
            .renamed_parent_and_name(original)
            .map(|(parent, _)| parent)
            .unwrap_or(parent_original);
        let parent_most_recent = self.most_recent_from_original_or_same(parent_original);

        let entries = resolver.entries_of(parent_most_recent).await?;
        let Some(entry) = entries.values().find(|entry| entry.ptr == most_recent) else {
            // already gone, so nothing can conflict with it
            self.deleted_originals.insert(original);
            return Ok(());
        };
        match entry.entry_type {
            EntryType::Dir => self.set_type(id, NodeType::Dir),
            EntryType::File | EntryType::Exec => self.set_type(id, NodeType::File),
            entry_type => Err(CrError::UnexpectedEntryType {
                original,
                entry_type,
            }),
        }
    }

    fn set_type(&mut self, id: ChainId, node_type: NodeType) -> Result<()> {
        if let Some(chain) = self.chain_mut(id) {
            chain.node_type = node_type;
        }
        Ok(())
    }

    /* Mutation */

    pub fn remove_chain(&mut self, ptr: BlockPointer) {
        match self.by_most_recent(ptr).map(|chain| chain.original) {
            Some(original) => {
                self.by_original.remove(&original);
            }
            None => {
                self.by_original.remove(&ptr);
            }
        }
        self.by_most_recent.remove(&ptr);
    }

    /// Drop every op written at `revision`; returns the chains that lost any
    pub fn remove_revision(&mut self, revision: Revision) -> Vec<ChainId> {
        let ids: Vec<ChainId> = self.by_original.values().copied().collect();
        ids.into_iter()
            .filter(|id| {
                self.chain_mut(*id)
                    .map(|chain| chain.remove_revision(revision))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// A copy of `op` under a new identity, with each of its own
    ///  pointer fields traced back to the original pointer
    pub fn copy_op_and_revert_unrefs_to_originals(&self, op: &Op) -> Op {
        let mut copy = op.clone().with_fresh_id();
        let revert = |ptr: &mut BlockPointer| {
            let mut seen = BTreeSet::new();
            while let Some(original) = self.originals.get(ptr) {
                if !seen.insert(*ptr) {
                    break;
                }
                *ptr = *original;
            }
        };
        match &mut copy.kind {
            OpKind::Create(create) => revert(&mut create.dir.old),
            OpKind::Rm(rm) => revert(&mut rm.dir.old),
            OpKind::Rename(rename) => {
                revert(&mut rename.old_dir.old);
                revert(&mut rename.new_dir.old);
                revert(&mut rename.renamed);
            }
            OpKind::Sync(sync) => revert(&mut sync.file.old),
            OpKind::SetAttr(set_attr) => {
                revert(&mut set_attr.dir.old);
                revert(&mut set_attr.file);
            }
            OpKind::Resolution | OpKind::Rekey | OpKind::Gc(_) => {}
        }
        copy
    }

    /// Re-key the chain for `old` under `new`, an original that came
    ///  from some other branch. Deletion and rename records follow the
    ///  chain; its created status does not.
    pub fn change_original(&mut self, old: BlockPointer, new: BlockPointer) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let id = self.id_by_original(old).ok_or(CrError::MissingChain(old))?;
        if self.by_original.contains_key(&new) {
            return Err(CrError::OriginalExists(new));
        }

        self.by_original.remove(&old);
        if let Some(chain) = self.chain_mut(id) {
            chain.original = new;
        }
        self.by_original.insert(new, id);
        self.originals.insert(old, new);

        if self.deleted_originals.remove(&old) {
            self.deleted_originals.insert(new);
        }
        self.created_originals.remove(&old);
        if let Some(info) = self.renamed_originals.remove(&old) {
            self.renamed_originals.insert(new, info);
        }
        for info in self.renamed_originals.values_mut() {
            if info.original_old_parent == old {
                info.original_old_parent = new;
            }
            if info.original_new_parent == old {
                info.original_new_parent = new;
            }
        }
        Ok(())
    }

    /// Put renames from an earlier partial resolution back together:
    ///  the split-off remove goes away and the rename replaces its
    ///  create half. Renames whose remove half has no known path were
    ///  created and renamed in one go and are left split.
    pub fn revert_renames(&mut self, old_ops: &[Op], finals: &mut FinalPaths) {
        for op in old_ops {
            let OpKind::Rename(rename) = &op.kind else {
                continue;
            };
            let Some(old_id) = self.id_by_most_recent(rename.old_dir.new) else {
                continue;
            };
            let old_path = finals.get(rename.old_dir.new).cloned();

            let removed = self.chain_mut(old_id).is_some_and(|chain| {
                // earlier matches were collapsed away, so the first is it
                let pos = chain.ops.iter().position(|o| {
                    matches!(&o.kind, OpKind::Rm(rm) if rm.old_name == rename.old_name)
                });
                pos.map(|i| chain.ops.remove(i)).is_some()
            });
            let Some(old_path) = old_path.filter(|p| removed && p.is_valid()) else {
                continue;
            };
            finals.set_old_path(op.id(), old_path);

            let new_id = if rename.is_same_dir() {
                Some(old_id)
            } else {
                self.id_by_most_recent(rename.new_dir.new)
            };
            let Some(chain) = new_id.and_then(|id| self.chain_mut(id)) else {
                warn!("no chain for the new parent of {}", op);
                continue;
            };
            if let Some(slot) = chain.ops.iter_mut().find(|o| {
                matches!(&o.kind, OpKind::Create(c) if c.renamed && c.new_name == rename.new_name)
            }) {
                *slot = op.clone();
            }
        }
    }

    pub fn summary(&self, finals: &FinalPaths) -> Vec<ChainSummary> {
        self.iter()
            .map(|chain| ChainSummary {
                path: finals
                    .get(chain.most_recent)
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| format!("Unknown path: {}", chain.most_recent)),
                ops: chain.ops.iter().map(|op| op.to_string()).collect(),
            })
            .collect()
    }
}

// the chain made from an anchored op starts and ends at `target`
fn anchor_primary_update(op: &mut Op, target: BlockPointer) {
    if let Some(update) = op.primary_update_mut() {
        update.old = target;
        update.new = target;
    }
}
