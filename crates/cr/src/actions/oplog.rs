//! Op log patching helpers used by the actions' `update_ops` step

use tracing::debug;

use super::DirHandle;
use crate::block::{BlockPointer, BlockUpdate};
use crate::chains::ChainRegistry;
use crate::entry::EntryType;
use crate::error::{CrError, Result};
use crate::ops::{Op, OpKind};

impl ChainRegistry {
    /// Put `ops` at the front of the chain whose most recent pointer
    ///  is `most_recent`, making that chain first if needed
    pub(crate) fn prepend_ops(
        &mut self,
        most_recent: BlockPointer,
        mut ops: Vec<Op>,
    ) -> Result<()> {
        let Some(first) = ops.first().cloned() else {
            return Ok(());
        };
        if self.id_by_most_recent(most_recent).is_none() {
            self.make_chain_for_new_op(most_recent, first)?;
            if let Some(chain) = self.by_most_recent_mut(most_recent) {
                chain.ops.clear();
            }
        }

        let chain = self
            .by_most_recent_mut(most_recent)
            .ok_or(CrError::MissingChain(most_recent))?;
        ops.append(&mut chain.ops);
        chain.ops = ops;
        Ok(())
    }

    /// Record that a directory entry became a symlink
    pub(crate) fn convert_symlink(&mut self, most_recent: BlockPointer, name: &str) -> Result<()> {
        let create = Op::create(name, most_recent, EntryType::Sym)?;
        debug!("creating symlink {} in directory {}", name, most_recent);
        match self.by_most_recent_mut(most_recent) {
            Some(chain) => {
                chain.ops.push(create);
                Ok(())
            }
            None => self.prepend_ops(most_recent, vec![create]),
        }
    }

    /// Point creates and attribute changes for `from` at `to` instead.
    ///  A renamed create also moves its rename record.
    pub(crate) fn fixup_names(&mut self, most_recent: BlockPointer, from: &str, to: &str) {
        let Some(id) = self.id_by_most_recent(most_recent) else {
            return;
        };
        let Some(chain) = self.chains.get_mut(id.0).and_then(Option::as_mut) else {
            return;
        };
        for op in chain.ops.iter_mut() {
            match &mut op.kind {
                OpKind::Create(create) if create.new_name == from => {
                    create.new_name = to.to_string();
                    if !create.renamed {
                        continue;
                    }
                    let Some(first) = op.common.refs.first().copied() else {
                        continue;
                    };
                    let original = self.originals.get(&first).copied().unwrap_or(first);
                    if let Some(info) = self.renamed_originals.get_mut(&original) {
                        info.new_name = to.to_string();
                    }
                }
                OpKind::SetAttr(set_attr) if set_attr.name == from => {
                    set_attr.name = to.to_string();
                }
                _ => {}
            }
        }
    }

    /// Tell live handles on this side that `from` moved to `to`
    pub(crate) async fn make_local_rename_op_for_copy_action(
        &mut self,
        dir: DirHandle<'_>,
        most_recent: BlockPointer,
        from: &str,
        to: &str,
    ) -> Result<()> {
        let entry = dir.lookup(to).await?;
        let rename = Op::rename(from, most_recent, to, most_recent, entry.ptr, entry.entry_type)?;
        self.prepend_ops(most_recent, vec![rename])
    }

    /// Blocks that the syncs of a copied file made live have to show
    ///  up on the create that brings the file into the merged tree
    pub(crate) fn track_sync_ptr_changes_in_create(
        &mut self,
        dir_most_recent: BlockPointer,
        target: BlockPointer,
        to_name: &str,
    ) {
        let Some(target_chain) = self.by_most_recent(target) else {
            return;
        };
        if !target_chain.is_file() {
            return;
        }

        let mut refs = Vec::new();
        let mut unrefs = Vec::new();
        for op in target_chain.ops() {
            let OpKind::Sync(sync) = &op.kind else {
                continue;
            };
            refs.extend(op.refs().iter().filter(|ptr| !self.is_deleted(**ptr)));
            unrefs.extend_from_slice(op.unrefs());
            let file = sync.file.new;
            if self.id_by_most_recent(file).is_some() && !self.is_deleted(file) {
                refs.push(file);
            }
        }
        if refs.is_empty() {
            return;
        }

        let Some(dir_chain) = self.by_most_recent_mut(dir_most_recent) else {
            return;
        };
        let create = dir_chain.ops.iter_mut().find(|op| {
            matches!(&op.kind, OpKind::Create(create) if create.new_name == to_name)
        });
        if let Some(create) = create {
            for ptr in refs {
                create.add_ref(ptr);
            }
            for ptr in unrefs {
                create.add_unref(ptr);
            }
        }
    }

    /// Drop removes of `name` from the chain started at `original`
    pub(crate) fn remove_rm_ops(&mut self, original: BlockPointer, name: &str) {
        if let Some(chain) = self.by_original_mut(original) {
            chain
                .ops
                .retain(|op| !matches!(&op.kind, OpKind::Rm(rm) if rm.old_name == name));
        }
    }

    /// Move syncs and attribute changes of the node `original` onto
    ///  `new_ptr`. Retargeted syncs no longer reference anything.
    pub(crate) fn retarget_file_ops(
        &mut self,
        most_recent: BlockPointer,
        original: BlockPointer,
        new_ptr: BlockPointer,
    ) {
        let Some(chain) = self.by_most_recent(most_recent) else {
            return;
        };
        let matching: Vec<_> = chain
            .ops()
            .iter()
            .filter(|op| match &op.kind {
                OpKind::Sync(sync) => {
                    self.original_from_most_recent_or_same(sync.file.new) == original
                }
                OpKind::SetAttr(set_attr) => {
                    self.original_from_most_recent_or_same(set_attr.file) == original
                }
                _ => false,
            })
            .map(Op::id)
            .collect();

        let Some(chain) = self.by_most_recent_mut(most_recent) else {
            return;
        };
        for op in chain.ops.iter_mut().filter(|op| matching.contains(&op.id())) {
            match &mut op.kind {
                OpKind::Sync(sync) => {
                    sync.file = BlockUpdate {
                        old: new_ptr,
                        new: new_ptr,
                    };
                    op.common.refs.clear();
                }
                OpKind::SetAttr(set_attr) => set_attr.file = new_ptr,
                _ => {}
            }
        }
    }
}
