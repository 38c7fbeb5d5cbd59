use std::collections::BTreeSet;

use tracing::debug;

use super::{DirHandle, Swap, UpdateTarget};
use crate::block::BlockPointer;
use crate::chains::ChainRegistry;
use crate::config::CrConfig;
use crate::detect::{ActionMap, MergedPaths};
use crate::error::{CrError, Result};
use crate::path::CrPath;
use crate::provider::{ContentCopier, DirectoryAccessor};

/// Collaborators for applying actions: a directory accessor per
///  branch, and the copier that duplicates unmerged file contents
pub struct ApplyEnv<'a> {
    pub unmerged_dirs: &'a dyn DirectoryAccessor,
    pub merged_dirs: &'a dyn DirectoryAccessor,
    pub unmerged_copier: &'a dyn ContentCopier,
    pub config: &'a CrConfig,
}

/// Apply every action in `action_map` and patch both registries'
///  op logs to match.
///
/// # Arguments
/// * `unmerged_paths` - Paths of the unmerged chains with actions,
///   deepest first
/// * `merged_paths` - Merged path for each unmerged most recent
///   pointer; files map to their parent directory
/// * `action_map` - Collapsed actions per merged directory. Names an
///   action settles on during apply are written back here.
///
/// Each directory's actions are applied once, however many unmerged
///  paths lead to it, but their op log patch runs for each path.
pub async fn apply_actions(
    env: &ApplyEnv<'_>,
    unmerged: &mut ChainRegistry,
    merged: &mut ChainRegistry,
    unmerged_paths: &[CrPath],
    merged_paths: &MergedPaths,
    action_map: &mut ActionMap,
) -> Result<()> {
    let mut done: BTreeSet<BlockPointer> = BTreeSet::new();

    for path in unmerged_paths {
        let unmerged_most_recent = path.tail_pointer();
        let chain = unmerged
            .by_most_recent(unmerged_most_recent)
            .ok_or(CrError::MissingChain(unmerged_most_recent))?;
        let unmerged_original = chain.original();
        let is_file = chain.is_file();

        // created or deleted on the unmerged side, so nothing lines up
        let Some(merged_path) = merged_paths.get(&unmerged_most_recent) else {
            continue;
        };
        let unmerged_dir_ptr = if is_file {
            path.parent_pointer()
                .ok_or_else(|| anyhow::anyhow!("file path {} has no parent", path))?
        } else {
            unmerged_most_recent
        };
        let merged_dir_ptr = merged_path.tail_pointer();
        let unmerged_dir = DirHandle::new(env.unmerged_dirs, unmerged_dir_ptr);
        let merged_dir = DirHandle::new(env.merged_dirs, merged_dir_ptr);

        let Some(actions) = action_map.get_mut(&merged_dir_ptr) else {
            continue;
        };

        if !actions.is_empty() && done.insert(merged_dir_ptr) {
            for action in actions.0.iter_mut() {
                let swap = action
                    .swap_unmerged_block(unmerged, merged, unmerged_dir)
                    .await?;
                let source = match swap {
                    Swap::Keep => unmerged_dir,
                    Swap::MergedDir => merged_dir,
                    Swap::Parent(ptr) => merged_dir.at(ptr),
                };
                if swap != Swap::Keep {
                    debug!("swapping in {} for {}", source.ptr(), unmerged_dir_ptr);
                }

                let unrefs = action.apply(env, source, merged_dir).await?;
                unmerged.to_unref.extend(unrefs);
            }
        }

        // the merged path may be the parent, so look the node up
        let merged_most_recent = merged.most_recent_from_original_or_same(unmerged_original);
        for action in actions.iter() {
            let target = UpdateTarget {
                unmerged_most_recent,
                merged_most_recent,
                unmerged_dir,
                merged_dir,
            };
            action.update_ops(target, unmerged, merged).await?;
        }
    }
    Ok(())
}
