//! Conflict detection
//!
//! Every unmerged chain with a counterpart in the merged tree is
//! compared op by op against the merged chain for the same node. The
//! resulting actions are filed under the merged directory they will
//! be applied in, keyed by that directory's pointer.

mod prepare;

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::actions::{ActionList, CrAction};
use crate::block::BlockPointer;
use crate::chains::{Chain, ChainRegistry, FinalPaths};
use crate::entry::AttrChange;
use crate::error::Result;
use crate::ops::write_ranges_equivalent;
use crate::path::CrPath;
use crate::rename::ConflictRenamer;

pub use prepare::{
    add_merged_recreates, add_recreate_ops_to_unmerged_chains, fix_rename_conflicts, RecreateOp,
};

/// Actions per merged directory, by the directory's most recent pointer
pub type ActionMap = BTreeMap<BlockPointer, ActionList>;

/// Where each unmerged node lives in the merged tree, by the node's
///  unmerged most recent pointer
pub type MergedPaths = BTreeMap<BlockPointer, CrPath>;

impl Chain {
    /// Work out the actions that bring this unmerged chain's ops into
    ///  the merged tree. Each op gets the first conflict found against
    ///  `merged_chain`, or its default action if there is none.
    ///
    /// If both chains left a file with the same collapsed write range,
    ///  the unmerged syncs are dropped first.
    pub async fn actions_to_merge(
        &mut self,
        renamer: &dyn ConflictRenamer,
        unmerged_path: &CrPath,
        merged_path: &CrPath,
        merged_chain: Option<&Chain>,
    ) -> Result<ActionList> {
        if let Some(merged_chain) = merged_chain.filter(|_| self.is_file()) {
            let mine = self.collapsed_write_range();
            let theirs = merged_chain.collapsed_write_range();
            if write_ranges_equivalent(&mine, &theirs) {
                debug!("dropping equivalent syncs for {}", unmerged_path);
                self.remove_sync_ops();
            }
        }

        let is_file = self.is_file();
        let mut actions = ActionList::new();
        for op in self.ops() {
            let mut conflict = None;
            if let Some(merged_chain) = merged_chain {
                for merged_op in merged_chain.ops() {
                    conflict = op
                        .check_conflict(renamer, unmerged_path, merged_op, merged_path, is_file)
                        .await?;
                    if conflict.is_some() {
                        break;
                    }
                }
            }
            let action = match conflict {
                Some(action) => Some(action),
                None => op.default_action(unmerged_path, merged_path),
            };
            if let Some(action) = action {
                actions.push(action);
            }
        }
        Ok(actions)
    }
}

/// Detect the actions for every unmerged chain that has a merged
///  path, filed under that path's tail pointer.
///
/// # Arguments
/// * `unmerged_finals` - Final paths from unmerged path discovery
/// * `merged_paths` - Merged path per unmerged most recent pointer
pub async fn get_actions_to_merge(
    unmerged: &mut ChainRegistry,
    merged: &ChainRegistry,
    renamer: &dyn ConflictRenamer,
    unmerged_finals: &FinalPaths,
    merged_paths: &MergedPaths,
) -> Result<ActionMap> {
    let mut action_map = ActionMap::new();
    let ids: Vec<_> = unmerged
        .by_most_recent
        .iter()
        .map(|(most_recent, id)| (*most_recent, *id))
        .collect();

    for (most_recent, id) in ids {
        // created or deleted on the unmerged side
        let Some(merged_path) = merged_paths.get(&most_recent) else {
            continue;
        };
        if !merged_path.is_valid() {
            warn!("ignoring empty merged path for {}", most_recent);
            continue;
        }
        let unmerged_path = match unmerged_finals.get(most_recent) {
            Some(path) => path,
            None => {
                warn!("no unmerged path for {}, using the merged one", most_recent);
                merged_path
            }
        };
        let Some(chain) = unmerged.chain_mut(id) else {
            continue;
        };
        let merged_chain = merged.by_original(chain.original());

        let actions = chain
            .actions_to_merge(renamer, unmerged_path, merged_path, merged_chain)
            .await?;
        if !actions.is_empty() {
            debug!("actions for {}: {}", merged_path, actions);
            action_map.insert(merged_path.tail_pointer(), actions);
        }
    }
    Ok(action_map)
}

/// Merge file actions into their parent directory's list, along with
///  directory actions caused by mtime changes, then collapse every
///  list. Merged paths of files are moved to their parent.
///
/// Returns the unmerged parent paths that now have actions but were
///  not among `unmerged_paths`' directories before.
pub fn collapse_actions(
    unmerged: &ChainRegistry,
    unmerged_paths: &[CrPath],
    merged_paths: &mut MergedPaths,
    action_map: &mut ActionMap,
) -> Vec<CrPath> {
    let mut new_unmerged_paths = Vec::new();

    for (most_recent, id) in unmerged.by_most_recent.iter() {
        let Some(chain) = unmerged.chain(*id) else {
            continue;
        };
        let Some(path) = merged_paths.get(most_recent).cloned() else {
            continue;
        };
        let Some(parent_path) = path.parent_path() else {
            continue;
        };
        let key = path.tail_pointer();
        let mut node_actions = action_map.get(&key).cloned().unwrap_or_default();

        if !chain.is_file() {
            // only mtime changes of a directory belong to its parent
            let mut parent_actions = ActionList::new();
            let mut own_actions = ActionList::new();
            for action in node_actions {
                match action {
                    CrAction::CopyUnmergedAttr(mut a)
                        if a.attrs.first() == Some(&AttrChange::Mtime) && !a.moved =>
                    {
                        a.moved = true;
                        parent_actions.push(CrAction::CopyUnmergedAttr(a));
                    }
                    CrAction::RenameUnmerged(mut a)
                        if a.caused_by_attr == Some(AttrChange::Mtime) && !a.moved =>
                    {
                        a.moved = true;
                        parent_actions.push(CrAction::RenameUnmerged(a));
                    }
                    other => own_actions.push(other),
                }
            }
            if parent_actions.is_empty() {
                continue;
            }
            node_actions = parent_actions;
            if own_actions.is_empty() {
                action_map.remove(&key);
            } else {
                action_map.insert(key, own_actions);
            }
        } else {
            for action in node_actions.0.iter_mut() {
                if let CrAction::CopyUnmergedAttr(a) = action {
                    a.moved = true;
                }
            }
        }

        let merged_parent = parent_path.tail_pointer();
        let had_parent_actions = action_map.contains_key(&merged_parent);
        action_map
            .entry(merged_parent)
            .or_default()
            .extend(node_actions);
        if chain.is_file() {
            merged_paths.insert(*most_recent, parent_path.clone());
            action_map.remove(&key);
        }

        if had_parent_actions {
            continue;
        }
        // the parent wasn't going to be visited; find its unmerged path
        let Some(unmerged_parent_path) = unmerged_paths
            .iter()
            .find(|p| p.tail_pointer() == *most_recent)
            .and_then(CrPath::parent_path)
        else {
            continue;
        };
        let unmerged_parent = unmerged_parent_path.tail_pointer();
        // a file's parent without ops of its own would only leave
        //  stray blocks behind
        let parent_has_ops = unmerged
            .by_most_recent(unmerged_parent)
            .is_some_and(|parent| !parent.ops().is_empty());
        if !chain.is_file() || parent_has_ops {
            new_unmerged_paths.push(unmerged_parent_path);
        }
        if !chain.is_file() {
            merged_paths.insert(unmerged_parent, parent_path);
        }
    }

    for list in action_map.values_mut() {
        *list = std::mem::take(list).collapse();
    }
    new_unmerged_paths
}

/// Chain fixups, detection, then collapsing
///
/// # Arguments
/// * `recreate_ops` - Creates of directories the merged branch
///   removed but the unmerged branch still changes things under
///
/// # Returns
/// * `Ok((action_map, new_unmerged_paths))` - Unmerged paths that
///   gained actions besides `unmerged_paths`, from the recreates and
///   from `collapse_actions`
pub async fn compute_actions(
    unmerged: &mut ChainRegistry,
    merged: &mut ChainRegistry,
    renamer: &dyn ConflictRenamer,
    unmerged_finals: &FinalPaths,
    unmerged_paths: &[CrPath],
    merged_paths: &mut MergedPaths,
    recreate_ops: Vec<RecreateOp>,
) -> Result<(ActionMap, Vec<CrPath>)> {
    let mut new_paths =
        add_recreate_ops_to_unmerged_chains(unmerged, merged, recreate_ops, merged_paths)?;
    fix_rename_conflicts(unmerged, merged, merged_paths)?;
    add_merged_recreates(unmerged, merged)?;

    let mut action_map =
        get_actions_to_merge(unmerged, merged, renamer, unmerged_finals, merged_paths).await?;
    new_paths.extend(collapse_actions(unmerged, unmerged_paths, merged_paths, &mut action_map));
    Ok((action_map, new_paths))
}
