use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::block::{BlockPointer, Revision};
use crate::ops::{Op, OpKind, WriteRange};

/// Stable handle for a chain inside a [`super::ChainRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub(crate) usize);

/// What kind of node a chain describes, once known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeType {
    #[default]
    Unknown,
    File,
    Dir,
}

/// The ordered op history of one node on one branch, from the
///  pointer it had when the branch started (`original`) to the one
///  it has now (`most_recent`).
#[derive(Debug, Clone)]
pub struct Chain {
    pub(crate) original: BlockPointer,
    pub(crate) most_recent: BlockPointer,
    pub(crate) ops: Vec<Op>,
    pub(crate) node_type: NodeType,
}

impl Chain {
    pub(crate) fn new(original: BlockPointer, most_recent: BlockPointer) -> Self {
        Self {
            original,
            most_recent,
            ops: Vec::new(),
            node_type: NodeType::Unknown,
        }
    }

    /* Getters */

    pub fn original(&self) -> BlockPointer {
        self.original
    }

    pub fn most_recent(&self) -> BlockPointer {
        self.most_recent
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn ops_mut(&mut self) -> &mut Vec<Op> {
        &mut self.ops
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Unresolved chains count as directories
    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.node_type = node_type;
    }

    pub fn has_sync_op(&self) -> bool {
        self.ops.iter().any(Op::is_sync)
    }

    pub fn has_set_attr_op(&self) -> bool {
        self.ops.iter().any(Op::is_set_attr)
    }

    /// The combined effect of every sync in the chain. Only files
    ///  have one.
    pub fn collapsed_write_range(&self) -> Vec<WriteRange> {
        if !self.is_file() {
            return Vec::new();
        }
        self.ops
            .iter()
            .fold(Vec::new(), |acc, op| match &op.kind {
                OpKind::Sync(sync) => sync.collapse_write_range(acc),
                _ => acc,
            })
    }

    pub fn remove_sync_ops(&mut self) {
        self.ops.retain(|op| !op.is_sync());
    }

    /// Drop every op written at `revision`, returning whether any
    ///  were removed. The chain's pointers are left alone.
    pub fn remove_revision(&mut self, revision: Revision) -> bool {
        let before = self.ops.len();
        let most_recent = self.most_recent;
        self.ops.retain(|op| {
            let keep = op.writer_info().revision != revision;
            if !keep {
                debug!("removing op {} from chain with most recent {}", op, most_recent);
            }
            keep
        });
        self.ops.len() != before
    }

    /// Cancel out complementary ops in a single pass:
    ///
    /// - a create that is half of a rename replaces an earlier create
    ///   of the same name
    /// - a remove cancels an earlier create of the same name, and is
    ///   itself dropped if everything it unreferenced was created on
    ///   this branch; those pointers are returned for cleanup
    /// - all syncs fold into the position of the last one, which
    ///   carries the collapsed write range and every ref and unref
    pub fn collapse(
        &mut self,
        created_originals: &BTreeSet<BlockPointer>,
        originals: &BTreeMap<BlockPointer, BlockPointer>,
    ) -> Vec<BlockPointer> {
        let mut to_unref = Vec::new();
        let mut creates_seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut to_remove: BTreeSet<usize> = BTreeSet::new();
        let mut writes: Vec<WriteRange> = Vec::new();
        let mut last_sync: Option<usize> = None;
        let mut sync_refs: Vec<BlockPointer> = Vec::new();
        let mut sync_unrefs: Vec<BlockPointer> = Vec::new();

        for (i, op) in self.ops.iter().enumerate() {
            match &op.kind {
                OpKind::Create(create) => {
                    if let Some(prev) = creates_seen.get(&create.new_name) {
                        if create.renamed {
                            to_remove.insert(*prev);
                        }
                    }
                    creates_seen.insert(create.new_name.clone(), i);
                }
                OpKind::Rm(rm) => {
                    let Some(prev) = creates_seen.remove(&rm.old_name) else {
                        continue;
                    };
                    to_remove.insert(prev);
                    let all_created_here = op.unrefs().iter().all(|unref| {
                        let original = originals.get(unref).unwrap_or(unref);
                        created_originals.contains(original)
                    });
                    if all_created_here {
                        to_remove.insert(i);
                        to_unref.extend_from_slice(op.unrefs());
                    }
                }
                OpKind::Sync(sync) => {
                    writes = sync.collapse_write_range(writes);
                    to_remove.insert(i);
                    last_sync = Some(i);
                    for ptr in op.refs() {
                        if !sync_refs.contains(ptr) {
                            sync_refs.push(*ptr);
                        }
                    }
                    for ptr in op.unrefs() {
                        if !sync_unrefs.contains(ptr) {
                            sync_unrefs.push(*ptr);
                        }
                    }
                }
                _ => {}
            }
        }

        if to_remove.is_empty() {
            return to_unref;
        }

        let ops = std::mem::take(&mut self.ops);
        self.ops = ops
            .into_iter()
            .enumerate()
            .filter_map(|(i, mut op)| {
                if Some(i) == last_sync {
                    if let OpKind::Sync(sync) = &mut op.kind {
                        sync.writes = writes.clone();
                    }
                    op.common.refs = sync_refs.clone();
                    op.common.unrefs = sync_unrefs.clone();
                    Some(op)
                } else if to_remove.contains(&i) {
                    None
                } else {
                    Some(op)
                }
            })
            .collect();
        to_unref
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryType;

    fn ptr(tag: &str) -> BlockPointer {
        BlockPointer::from_content(tag.as_bytes())
    }

    fn chain_with(ops: Vec<Op>) -> Chain {
        let mut chain = Chain::new(ptr("dir"), ptr("dir"));
        chain.ops = ops;
        chain
    }

    #[test]
    fn test_create_then_rm_of_branch_local_blocks_empties_chain() {
        let create = Op::create("a", ptr("dir"), EntryType::File).unwrap();
        let mut rm = Op::rm("a", ptr("dir"), EntryType::File).unwrap();
        rm.add_unref(ptr("a-v1"));

        let mut created = BTreeSet::new();
        created.insert(ptr("a-v0"));
        let mut originals = BTreeMap::new();
        originals.insert(ptr("a-v1"), ptr("a-v0"));

        let mut chain = chain_with(vec![create, rm]);
        let to_unref = chain.collapse(&created, &originals);

        assert!(chain.ops().is_empty());
        assert_eq!(to_unref, vec![ptr("a-v1")]);
    }

    #[test]
    fn test_rm_of_pre_existing_blocks_survives() {
        let create = Op::create("a", ptr("dir"), EntryType::File).unwrap();
        let mut rm = Op::rm("a", ptr("dir"), EntryType::File).unwrap();
        rm.add_unref(ptr("old"));

        let mut chain = chain_with(vec![create, rm]);
        let to_unref = chain.collapse(&BTreeSet::new(), &BTreeMap::new());

        assert!(to_unref.is_empty());
        assert_eq!(chain.ops().len(), 1);
        assert!(matches!(chain.ops()[0].kind, OpKind::Rm(_)));
    }

    #[test]
    fn test_renamed_create_replaces_earlier_create() {
        let first = Op::create("a", ptr("dir"), EntryType::File).unwrap();
        let mut second = Op::create("a", ptr("dir"), EntryType::File).unwrap();
        if let OpKind::Create(create) = &mut second.kind {
            create.renamed = true;
        }
        let second_id = second.id();

        let mut chain = chain_with(vec![first, second]);
        chain.collapse(&BTreeSet::new(), &BTreeMap::new());

        assert_eq!(chain.ops().len(), 1);
        assert_eq!(chain.ops()[0].id(), second_id);
    }

    #[test]
    fn test_syncs_fold_into_last() {
        let mut s1 = Op::sync(ptr("f")).unwrap();
        s1.add_write(0, 5);
        s1.add_ref(ptr("b1"));
        let attr = Op::set_attr("f", ptr("dir"), crate::entry::AttrChange::Ex, ptr("f")).unwrap();
        let mut s2 = Op::sync(ptr("f")).unwrap();
        s2.add_write(5, 5);
        s2.add_ref(ptr("b2"));
        s2.add_unref(ptr("b0"));
        let s2_id = s2.id();

        let mut chain = chain_with(vec![s1, attr, s2]);
        chain.set_node_type(NodeType::File);
        chain.collapse(&BTreeSet::new(), &BTreeMap::new());

        assert_eq!(chain.ops().len(), 2);
        assert!(chain.ops()[0].is_set_attr());
        let last = &chain.ops()[1];
        assert_eq!(last.id(), s2_id);
        assert_eq!(last.refs(), &[ptr("b1"), ptr("b2")]);
        assert_eq!(last.unrefs(), &[ptr("b0")]);
        assert_eq!(chain.collapsed_write_range(), vec![WriteRange::write(0, 10)]);
    }

    #[test]
    fn test_remove_revision() {
        let mut a = Op::create("a", ptr("dir"), EntryType::File).unwrap();
        a.set_writer_info(crate::ops::WriterInfo::new("alice", Revision(2)));
        let mut b = Op::create("b", ptr("dir"), EntryType::File).unwrap();
        b.set_writer_info(crate::ops::WriterInfo::new("alice", Revision(3)));

        let mut chain = chain_with(vec![a, b]);
        assert!(chain.remove_revision(Revision(2)));
        assert!(!chain.remove_revision(Revision(2)));
        assert_eq!(chain.ops().len(), 1);
        assert_eq!(chain.original(), ptr("dir"));
    }
}
