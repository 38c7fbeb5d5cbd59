use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::registry::ChainRegistry;
use crate::block::BlockPointer;
use crate::error::Result;
use crate::ops::{OpId, OpKind};
use crate::path::{CrPath, PathNode};
use crate::provider::PathSearch;

/// The final path of each chain, keyed by the chain's most recent
///  pointer, plus the old parent path of renames that were put back
///  together.
#[derive(Debug, Clone, Default)]
pub struct FinalPaths {
    by_ptr: BTreeMap<BlockPointer, CrPath>,
    rename_old_paths: BTreeMap<OpId, CrPath>,
}

impl FinalPaths {
    pub fn get(&self, most_recent: BlockPointer) -> Option<&CrPath> {
        self.by_ptr.get(&most_recent)
    }

    pub fn insert(&mut self, most_recent: BlockPointer, path: CrPath) {
        self.by_ptr.insert(most_recent, path);
    }

    pub fn old_path_for(&self, op: OpId) -> Option<&CrPath> {
        self.rename_old_paths.get(&op)
    }

    pub fn set_old_path(&mut self, op: OpId, path: CrPath) {
        self.rename_old_paths.insert(op, path);
    }

    pub fn len(&self) -> usize {
        self.by_ptr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ptr.is_empty()
    }
}

/// Result of locating every changed node in the current tree
#[derive(Debug, Clone, Default)]
pub struct PathDiscovery {
    /// Found paths, deepest first
    pub sorted: Vec<CrPath>,
    pub finals: FinalPaths,
}

impl ChainRegistry {
    /// Find the current path of every chain that has ops and is
    ///  neither created (unless `include_creates`) nor deleted, plus
    ///  the old parents of cross-directory renames. Chains that can't
    ///  be found are dropped. Deleted nodes, and created nodes when
    ///  they weren't searched for, get a path synthesized from the op
    ///  that removed or added them.
    pub async fn get_paths(
        &mut self,
        search: &dyn PathSearch,
        include_creates: bool,
    ) -> Result<PathDiscovery> {
        let root = self
            .most_recent_root
            .ok_or_else(|| anyhow::anyhow!("no root pointer to search from"))?;

        let mut requested: BTreeSet<BlockPointer> = BTreeSet::new();
        let mut ptrs = Vec::new();
        let mut renames_by_old_dir: BTreeMap<BlockPointer, Vec<OpId>> = BTreeMap::new();

        for chain in self.iter() {
            if chain.ops.is_empty()
                || (!include_creates && self.is_created(chain.original))
                || self.is_deleted(chain.original)
            {
                continue;
            }
            if requested.insert(chain.most_recent) {
                ptrs.push(chain.most_recent);
            }
            // a rename's old parent may have no ops of its own, but its
            //  path is still needed
            for op in &chain.ops {
                let OpKind::Rename(rename) = &op.kind else {
                    continue;
                };
                if rename.is_same_dir() {
                    continue;
                }
                let old_dir = rename.old_dir.new;
                if requested.insert(old_dir) {
                    ptrs.push(old_dir);
                }
                renames_by_old_dir.entry(old_dir).or_default().push(op.id());
            }
        }

        let found = search.search_for_paths(&ptrs, root).await?;

        let mut discovery = PathDiscovery::default();
        for ptr in ptrs {
            match found.get(&ptr) {
                Some(path) if path.is_valid() => {
                    discovery.sorted.push(path.clone());
                    discovery.finals.insert(ptr, path.clone());
                    for op in renames_by_old_dir.get(&ptr).into_iter().flatten() {
                        discovery.finals.set_old_path(*op, path.clone());
                    }
                }
                _ => {
                    debug!("ignoring pointer with no found path: {}", ptr);
                    self.remove_chain(ptr);
                }
            }
        }

        let deleted: Vec<BlockPointer> = self.deleted_originals.iter().copied().collect();
        for original in deleted {
            let Some(most_recent) = self.by_original(original).map(|c| c.most_recent) else {
                continue;
            };
            let path = self.find_path_for_deleted(most_recent, root, &discovery.finals);
            discovery.finals.insert(most_recent, path);
        }

        if !include_creates {
            let created: Vec<BlockPointer> = self.created_originals.iter().copied().collect();
            for original in created {
                let Some(most_recent) = self.by_original(original).map(|c| c.most_recent) else {
                    continue;
                };
                let path = self.find_path_for_created(most_recent, root, &discovery.finals);
                discovery.finals.insert(most_recent, path);
            }
        }

        discovery.sorted.sort_by(|a, b| b.len().cmp(&a.len()));
        Ok(discovery)
    }

    /// Path of a deleted node: the path of the directory whose remove
    ///  unreferenced it, plus the removed name
    pub fn find_path_for_deleted(
        &self,
        most_recent: BlockPointer,
        root: BlockPointer,
        finals: &FinalPaths,
    ) -> CrPath {
        self.find_path_via(most_recent, root, finals, &mut BTreeSet::new(), true)
    }

    /// Path of a created node: the path of the directory whose create
    ///  referenced it, plus the created name
    pub fn find_path_for_created(
        &self,
        most_recent: BlockPointer,
        root: BlockPointer,
        finals: &FinalPaths,
    ) -> CrPath {
        self.find_path_via(most_recent, root, finals, &mut BTreeSet::new(), false)
    }

    fn find_path_via(
        &self,
        ptr: BlockPointer,
        root: BlockPointer,
        finals: &FinalPaths,
        visited: &mut BTreeSet<BlockPointer>,
        deleted: bool,
    ) -> CrPath {
        if visited.insert(ptr) {
            for (parent, id) in &self.by_most_recent {
                let Some(chain) = self.chain(*id) else {
                    continue;
                };
                for op in &chain.ops {
                    let name = match &op.kind {
                        OpKind::Rm(rm) if deleted && op.unrefs().contains(&ptr) => &rm.old_name,
                        OpKind::Create(create) if !deleted && op.refs().contains(&ptr) => {
                            &create.new_name
                        }
                        _ => continue,
                    };
                    let parent_path = match finals.get(*parent) {
                        Some(path) if path.is_valid() => path.clone(),
                        _ => self.find_path_via(*parent, root, finals, visited, deleted),
                    };
                    return parent_path.child_path(name.clone(), ptr);
                }
            }
        }
        // unknown; hang it off the root under its own pointer
        CrPath::from_nodes(vec![PathNode::new(root, ptr.to_string())])
    }
}
