//! Chain fixups that run before detection
//!
//! Detection only compares ops on one node across the two branches.
//! Some situations span nodes: a directory one branch removed while the
//! other kept changing things inside it, or a rename that would put a
//! directory inside itself. These passes rewrite the chains so that
//! plain op-by-op detection does the right thing.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::MergedPaths;
use crate::block::BlockPointer;
use crate::chains::{Chain, ChainRegistry, RenameInfo};
use crate::entry::EntryType;
use crate::error::{CrError, Result};
use crate::ops::{Op, OpKind};
use crate::path::CrPath;

/// A create the unmerged branch needs ahead of its own ops, because
///  the merged branch removed a directory those ops live under
#[derive(Debug, Clone)]
pub struct RecreateOp {
    /// Create of the removed node, in the directory it lived in. The
    ///  op's directory update points from and to that directory's
    ///  original pointer.
    pub op: Op,
    /// Unmerged path of that directory
    pub parent_path: CrPath,
}

impl RecreateOp {
    /// Recreate `name` inside the directory whose original is `parent`
    pub fn new(
        name: impl Into<String>,
        parent: BlockPointer,
        entry_type: EntryType,
        node: BlockPointer,
        parent_path: CrPath,
    ) -> Result<Self> {
        let mut op = Op::create(name, parent, entry_type)?;
        op.add_update(parent, parent);
        op.add_ref(node);
        Ok(Self { op, parent_path })
    }
}

/// Put each recreate at the front of the unmerged chain for its
///  directory, and give that chain a merged path if it has none.
///
/// # Returns
/// * `Ok(paths)` - Unmerged paths of directories whose chains were
///   empty before, which now have something to apply
pub fn add_recreate_ops_to_unmerged_chains(
    unmerged: &mut ChainRegistry,
    merged: &ChainRegistry,
    recreate_ops: Vec<RecreateOp>,
    merged_paths: &mut MergedPaths,
) -> Result<Vec<CrPath>> {
    if recreate_ops.is_empty() {
        return Ok(Vec::new());
    }

    // every pointer on a merged path -> the key of that path
    let mut keys: BTreeMap<BlockPointer, BlockPointer> = BTreeMap::new();
    for (key, path) in merged_paths.iter() {
        for node in path.nodes() {
            keys.insert(node.ptr, *key);
        }
    }

    let mut new_unmerged_paths = Vec::new();
    for recreate in recreate_ops {
        let OpKind::Create(create) = &recreate.op.kind else {
            return Err(anyhow::anyhow!("recreate {} is not a create", recreate.op).into());
        };
        let target = merged.original_from_most_recent_or_same(create.dir.old);
        let chain = unmerged
            .by_original_mut(target)
            .ok_or_else(|| anyhow::anyhow!("recreate for {} has no chain", target))?;
        if chain.ops.is_empty() {
            new_unmerged_paths.push(recreate.parent_path.clone());
        }
        debug!("recreating with {} in {}", recreate.op, target);
        chain.ops.insert(0, recreate.op);

        let (original, most_recent) = (chain.original, chain.most_recent);
        if merged_paths.contains_key(&most_recent) {
            continue;
        }
        let merged_most_recent = match merged.by_original(original) {
            Some(merged_chain) if !merged.is_deleted(original) => merged_chain.most_recent(),
            _ => original,
        };
        let key = keys.get(&merged_most_recent).ok_or_else(|| {
            anyhow::anyhow!("no merged path contains recreate target {}", merged_most_recent)
        })?;
        let Some(mut path) = merged_paths.get(key).cloned() else {
            continue;
        };
        while path.tail_pointer() != merged_most_recent {
            match path.parent_path() {
                Some(parent) => path = parent,
                None => break,
            }
        }
        merged_paths.insert(most_recent, path);
    }
    Ok(new_unmerged_paths)
}

/// Whether both branches wrote to the node, or both changed its
///  attributes. Attribute changes are assumed to collide even when
///  they touch different attributes.
fn quick_conflict_check(unmerged: Option<&Chain>, merged: Option<&Chain>) -> bool {
    match (unmerged, merged) {
        (Some(u), Some(m)) => {
            (u.has_sync_op() && m.has_sync_op()) || (u.has_set_attr_op() && m.has_set_attr_op())
        }
        _ => false,
    }
}

/// Turn unmerged renames that would move a directory underneath itself
///  in the merged tree into symlinks back up to it (or forced copies,
///  for files).
///
/// If the merged side did `mv b a/` and the unmerged side did `mv a b/`,
///  the result is `a/b/a`, where the inner `a` is a symlink to `../`.
///
/// Nodes renamed on both branches to different places, renamed nodes
///  both branches edited, and renames into directories created on the
///  unmerged branch are logged and left alone.
pub fn fix_rename_conflicts(
    unmerged: &mut ChainRegistry,
    merged: &mut ChainRegistry,
    merged_paths: &MergedPaths,
) -> Result<()> {
    let renames: Vec<(BlockPointer, RenameInfo)> = unmerged
        .renamed_originals
        .iter()
        .map(|(ptr, info)| (*ptr, info.clone()))
        .collect();

    let mut remove_renames = Vec::new();
    for (ptr, info) in renames {
        if unmerged.is_deleted(ptr) {
            continue;
        }
        if let Some(merged_info) = merged.renamed_info(ptr) {
            if merged_info.original_new_parent != info.original_new_parent
                || merged_info.new_name != info.new_name
            {
                warn!("{} renamed differently on both branches, not merging", ptr);
                continue;
            }
        }
        if quick_conflict_check(unmerged.by_original(ptr), merged.by_original(ptr)) {
            warn!("{} renamed with conflicting edits, not forking", ptr);
            continue;
        }

        let parent = unmerged.most_recent_from_original(info.original_new_parent)?;
        let Some(merged_path) = merged_paths.get(&parent) else {
            if !unmerged.is_created(info.original_new_parent) {
                return Err(anyhow::anyhow!("no merged path for rename target {}", parent).into());
            }
            debug!("{} moved into new directory {}, no cycle check", ptr, parent);
            continue;
        };

        let nodes = merged_path.nodes();
        let cycle_at = nodes
            .iter()
            .position(|node| merged.original_from_most_recent_or_same(node.ptr) == ptr);
        let Some(x) = cycle_at else {
            continue;
        };

        let walk_back = nodes.len() - 1 - x;
        let sym_path = format!("./{}", "../".repeat(walk_back));
        debug!("making {} a symlink to {} in {}", info.new_name, sym_path, merged_path);
        convert_create_into_symlink_or_copy(unmerged, merged, ptr, &info, parent, &sym_path)?;
        remove_renames.push(ptr);
    }

    for ptr in remove_renames {
        unmerged.renamed_originals.remove(&ptr);
    }
    Ok(())
}

/// Rewrite the create half of a rename in the chain at `parent`:
///  directories become a symlink to `sym_path`, files become a forced
///  copy. The merged branch is made to look like it moved the node
///  back, and the remove half in the old parent is dropped.
fn convert_create_into_symlink_or_copy(
    unmerged: &mut ChainRegistry,
    merged: &mut ChainRegistry,
    ptr: BlockPointer,
    info: &RenameInfo,
    parent: BlockPointer,
    sym_path: &str,
) -> Result<()> {
    let chain = unmerged
        .by_most_recent_mut(parent)
        .ok_or(CrError::MissingChain(parent))?;
    let found = chain.ops.iter_mut().find(|op| {
        matches!(&op.kind, OpKind::Create(c) if c.renamed && c.new_name == info.new_name)
    });
    let Some(op) = found else {
        return Err(anyhow::anyhow!(
            "no rename create for {} named {}",
            ptr,
            info.new_name
        )
        .into());
    };

    let OpKind::Create(create) = &mut op.kind else {
        return Ok(());
    };
    let old_type = create.entry_type;
    let is_dir = old_type == EntryType::Dir;
    if is_dir {
        create.entry_type = EntryType::Sym;
        create.cr_sym_path = Some(sym_path.to_string());
    } else {
        create.force_copy = true;
    }
    create.renamed = false;
    let new_type = create.entry_type;
    if is_dir {
        op.common.refs.clear();
    }

    let new_info = match merged.renamed_info(ptr) {
        // already moved on the merged branch: make that move start
        //  from the unmerged location
        Some(merged_info) => RenameInfo {
            original_old_parent: info.original_new_parent,
            old_name: info.new_name.clone(),
            ..merged_info.clone()
        },
        None => {
            let mut invert_create = Op::rm(&info.new_name, info.original_new_parent, old_type)?;
            invert_create.add_update(info.original_new_parent, info.original_new_parent);
            let mut invert_rm = Op::create(&info.old_name, info.original_old_parent, new_type)?;
            invert_rm.add_update(info.original_old_parent, info.original_old_parent);
            if let OpKind::Create(inner) = &mut invert_rm.kind {
                inner.renamed = true;
            }
            invert_rm.add_ref(ptr);

            let merged_new = merged.most_recent_from_original_or_same(info.original_new_parent);
            let merged_old = merged.most_recent_from_original_or_same(info.original_old_parent);
            merged.prepend_ops(merged_old, vec![invert_rm])?;
            merged.prepend_ops(merged_new, vec![invert_create])?;
            RenameInfo {
                original_old_parent: info.original_new_parent,
                old_name: info.new_name.clone(),
                original_new_parent: info.original_old_parent,
                new_name: info.old_name.clone(),
            }
        }
    };
    debug!("merged rename info for {} is now {}", ptr, new_info);
    merged.renamed_originals.insert(ptr, new_info);

    // the remove half must not be replayed
    let old_parent = unmerged
        .by_original_mut(info.original_old_parent)
        .ok_or(CrError::MissingChain(info.original_old_parent))?;
    for op in old_parent.ops.iter_mut() {
        if let OpKind::Rm(rm) = &mut op.kind {
            if rm.old_name == info.old_name {
                rm.drop_this = true;
                break;
            }
        }
    }
    Ok(())
}

/// Drop unmerged removes of nodes the merged branch kept changing,
///  and put a create of each such node at the front of its merged
///  parent's chain, so detection pairs the remove with it.
pub fn add_merged_recreates(
    unmerged: &mut ChainRegistry,
    merged: &mut ChainRegistry,
) -> Result<()> {
    let writer = merged.most_recent_writer().clone();
    let ids: Vec<_> = unmerged.by_most_recent.values().copied().collect();

    for id in ids {
        let Some(chain) = unmerged.chain(id) else {
            continue;
        };
        let parent_original = chain.original();
        let removes: Vec<(usize, String, Vec<BlockPointer>)> = chain
            .ops()
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match &op.kind {
                OpKind::Rm(rm) => Some((i, rm.old_name.clone(), op.unrefs().to_vec())),
                _ => None,
            })
            .collect();

        for (i, old_name, mut unrefs) in removes {
            if unrefs.is_empty() {
                // renamed here from elsewhere before being removed
                let moved = unmerged
                    .renamed_originals
                    .iter()
                    .find(|(original, info)| {
                        info.original_old_parent == parent_original
                            && info.old_name == old_name
                            && unmerged.is_deleted(**original)
                    })
                    .map(|(original, _)| *original);
                if let Some(original) = moved {
                    unrefs.push(original);
                    if let Some(op) = unmerged.chain_mut(id).and_then(|c| c.ops.get_mut(i)) {
                        op.add_unref(original);
                    }
                }
            }

            for ptr in unrefs {
                let unref_original = unmerged.original_from_most_recent_or_same(ptr);
                let Some(merged_chain) = merged.by_original(unref_original) else {
                    continue;
                };
                let entry_type = if merged_chain.is_file() {
                    EntryType::File
                } else {
                    EntryType::Dir
                };
                let merged_most_recent = merged_chain.most_recent();

                if let Some(op) = unmerged.chain_mut(id).and_then(|c| c.ops.get_mut(i)) {
                    if let OpKind::Rm(rm) = &mut op.kind {
                        rm.drop_this = true;
                    }
                }

                let (parent, name) = match merged.renamed_parent_and_name(unref_original) {
                    Some((parent, name)) => (parent, name.to_string()),
                    None => match unmerged.renamed_info(unref_original) {
                        Some(info) => (info.original_old_parent, info.old_name.clone()),
                        None => (parent_original, old_name.clone()),
                    },
                };

                let mut create = Op::create(&name, parent, entry_type)?;
                create.add_update(parent, parent);
                create.add_ref(merged_most_recent);
                create.set_writer_info(writer.clone());
                let parent_chain = merged.by_original_mut(parent).ok_or_else(|| {
                    anyhow::anyhow!("no merged chain for {}, parent of {}", parent, unref_original)
                })?;
                debug!("recreating merged {} with {} in {}", unref_original, create, parent);
                parent_chain.ops.insert(0, create);
            }
        }
    }
    Ok(())
}
