//! Shared test utilities for conflict resolution integration tests
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use cr::prelude::*;
use cr::testkit::MemoryFs;

/// Day every test batch is written on, as the conflict renamer prints it
pub const DAY: &str = "2024-03-01";

/// Pointer for one version of a node, e.g. `ptr("d", "u1")`.
///  Version "0" is the common ancestor of both branches.
pub fn ptr(node: &str, version: &str) -> BlockPointer {
    BlockPointer::from_content(format!("{}@{}", node, version).as_bytes())
}

pub fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Install a subscriber once per test binary; `RUST_LOG=cr=debug` to see it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn batch(writer: &str, revision: u64, root: BlockPointer, ops: Vec<Op>) -> RevisionBatch {
    RevisionBatch {
        revision: Revision(revision),
        writer: writer.to_string(),
        timestamp: timestamp(),
        root,
        ops,
    }
}

/// Attach the directory and root updates every op in these tests makes
pub fn touch(
    mut op: Op,
    dir: (BlockPointer, BlockPointer),
    root: (BlockPointer, BlockPointer),
) -> Op {
    op.add_update(dir.0, dir.1);
    op.add_update(root.0, root.1);
    op
}

/// `/d` under the given root version
pub fn dir_path(root: BlockPointer, dir: BlockPointer) -> CrPath {
    CrPath::root(root).child_path("d", dir)
}

pub fn file_entry(ptr: BlockPointer, size: u64) -> DirEntry {
    DirEntry::new(ptr, EntryType::File).with_size(size)
}

/// Display form of every op in the chain now at `most_recent`
pub fn op_log(registry: &ChainRegistry, most_recent: BlockPointer) -> Vec<String> {
    registry
        .by_most_recent(most_recent)
        .map(|chain| chain.ops().iter().map(|op| op.to_string()).collect())
        .unwrap_or_default()
}

/// Everything `apply_actions` needs; content copies come out of the
///  unmerged tree
pub fn apply_env<'a>(
    unmerged_fs: &'a MemoryFs,
    merged_fs: &'a MemoryFs,
    config: &'a CrConfig,
) -> ApplyEnv<'a> {
    ApplyEnv {
        unmerged_dirs: unmerged_fs,
        merged_dirs: merged_fs,
        unmerged_copier: unmerged_fs,
        config,
    }
}

/// One branch's registry from a single batch at revision 2
pub async fn build(
    writer: &str,
    root: BlockPointer,
    ops: Vec<Op>,
    resolver: Option<&MemoryFs>,
) -> ChainRegistry {
    let resolver = resolver.map(|fs| fs as &dyn BlockTypeResolver);
    let batches = vec![batch(writer, 2, root, ops)];
    ChainRegistry::build(batches, resolver, &CrConfig::default())
        .await
        .unwrap()
}

/// Path discovery, detection and collapsing for the unmerged branch,
///  then apply. Returns the unmerged paths that were visited.
pub async fn resolve(
    unmerged: &mut ChainRegistry,
    merged: &mut ChainRegistry,
    unmerged_fs: &MemoryFs,
    merged_fs: &MemoryFs,
    merged_paths: &mut MergedPaths,
) -> (ActionMap, Vec<CrPath>) {
    let config = CrConfig::default();
    let discovery = unmerged
        .get_paths(unmerged_fs, config.include_creates)
        .await
        .unwrap();
    let (mut action_map, new_paths) = compute_actions(
        unmerged,
        merged,
        &DateConflictRenamer,
        &discovery.finals,
        &discovery.sorted,
        merged_paths,
        Vec::new(),
    )
    .await
    .unwrap();

    let mut paths = discovery.sorted;
    paths.extend(new_paths);
    let env = apply_env(unmerged_fs, merged_fs, &config);
    apply_actions(&env, unmerged, merged, &paths, merged_paths, &mut action_map)
        .await
        .unwrap();
    (action_map, paths)
}
