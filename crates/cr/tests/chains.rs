//! Integration tests for chain construction and registry bookkeeping

mod common;

use common::{batch, build, dir_path, file_entry, op_log, ptr, timestamp, touch};
use cr::chains::NodeType;
use cr::prelude::*;
use cr::testkit::MemoryFs;
use serde_json::json;

#[test]
fn test_batches_stamp_writer_and_track_roots() {
    let (d0, d1, r0, r1) = (ptr("d", "0"), ptr("d", "1"), ptr("root", "0"), ptr("root", "1"));
    let create = touch(Op::create("a", d0, EntryType::File).unwrap(), (d0, d1), (r0, r1));

    let registry = ChainRegistry::from_batches(vec![batch("alice", 7, r1, vec![create])]).unwrap();

    assert_eq!(registry.original_root(), Some(r0));
    assert_eq!(registry.most_recent_root(), Some(r1));
    assert_eq!(registry.most_recent_from_original(d0).unwrap(), d1);
    assert_eq!(registry.original_from_most_recent(d1).unwrap(), d0);
    assert_eq!(registry.original_of(d1), d0);
    assert!(registry.most_recent_from_original(ptr("nope", "0")).is_err());

    let op = &registry.by_original(d0).unwrap().ops()[0];
    assert_eq!(op.writer_info(), &WriterInfo::new("alice", Revision(7)));
    assert_eq!(op.common.local_timestamp, timestamp());
}

#[test]
fn test_rename_is_split_and_identity_can_move() {
    let (d0, d1, e0, e1, e2) = (
        ptr("d", "0"),
        ptr("d", "1"),
        ptr("e", "0"),
        ptr("e", "1"),
        ptr("e", "2"),
    );
    let (r0, r1, r2, a0) = (ptr("root", "0"), ptr("root", "1"), ptr("root", "2"), ptr("a", "0"));

    let rename = Op::rename("a", d0, "b", e0, a0, EntryType::File).unwrap();
    let mut rename = touch(rename, (d0, d1), (r0, r1));
    rename.add_update(e0, e1);
    let set_attr = Op::set_attr("b", e1, AttrChange::Ex, a0).unwrap();
    let set_attr = touch(set_attr, (e1, e2), (r1, r2));

    let mut registry =
        ChainRegistry::from_batches(vec![batch("alice", 2, r2, vec![rename, set_attr])]).unwrap();

    assert_eq!(op_log(&registry, d1), vec!["rm a"]);
    assert_eq!(op_log(&registry, e2), vec!["create b (FILE)"]);
    assert_eq!(op_log(&registry, a0), vec!["setAttr b (exAttr)"]);
    let info = registry.renamed_info(a0).unwrap();
    assert_eq!((info.original_old_parent, info.old_name.as_str()), (d0, "a"));
    assert_eq!(registry.renamed_parent_and_name(a0), Some((e0, "b")));

    let (z, y) = (ptr("z", "0"), ptr("y", "0"));
    registry.change_original(a0, z).unwrap();
    assert_eq!(registry.by_original(z).unwrap().most_recent(), a0);
    assert!(registry.by_original(a0).is_none());
    assert!(registry.renamed_info(a0).is_none());
    assert_eq!(registry.renamed_info(z).unwrap().new_name, "b");

    // rename records follow their parents too
    registry.change_original(e0, y).unwrap();
    assert_eq!(registry.renamed_parent_and_name(z), Some((y, "b")));

    assert!(matches!(
        registry.change_original(z, d0),
        Err(CrError::OriginalExists(_))
    ));
    assert!(matches!(
        registry.change_original(a0, ptr("w", "0")),
        Err(CrError::MissingChain(_))
    ));
}

#[test]
fn test_create_then_remove_of_new_file_cancels_out() {
    let (d0, d1, d2) = (ptr("d", "0"), ptr("d", "1"), ptr("d", "2"));
    let (r0, r1, r2, tmp) = (ptr("root", "0"), ptr("root", "1"), ptr("root", "2"), ptr("tmp", "1"));

    let mut create = touch(Op::create("tmp", d0, EntryType::File).unwrap(), (d0, d1), (r0, r1));
    create.add_ref(tmp);
    let mut remove = touch(Op::rm("tmp", d1, EntryType::File).unwrap(), (d1, d2), (r1, r2));
    remove.add_unref(tmp);

    let registry = ChainRegistry::from_batches(vec![
        batch("alice", 1, r1, vec![create]),
        batch("alice", 2, r2, vec![remove]),
    ])
    .unwrap();

    let chain = registry.by_original(d0).unwrap();
    assert!(chain.ops().is_empty());
    assert_eq!(chain.most_recent(), d2);
    assert!(registry.to_unref().contains(&tmp));
    assert!(registry.is_created(tmp));
}

#[test]
fn test_unref_of_superseded_pointer_is_ignored() {
    let (f0, f1, d0, d1, d2) = (
        ptr("f", "0"),
        ptr("f", "1"),
        ptr("d", "0"),
        ptr("d", "1"),
        ptr("d", "2"),
    );
    let mut sync = Op::sync(f0).unwrap();
    sync.add_update(f0, f1);
    sync.add_update(d0, d1);
    let mut stale = Op::rm("f", d1, EntryType::File).unwrap();
    stale.add_update(d1, d2);
    stale.add_unref(f0);

    let batches = vec![batch("alice", 1, d2, vec![sync.clone(), stale])];
    let registry = ChainRegistry::from_batches(batches).unwrap();
    assert!(!registry.is_deleted(f0));

    let mut current = Op::rm("f", d1, EntryType::File).unwrap();
    current.add_update(d1, d2);
    current.add_unref(f1);
    let registry =
        ChainRegistry::from_batches(vec![batch("alice", 1, d2, vec![sync, current])]).unwrap();
    assert!(registry.is_deleted(f0));
}

#[test]
fn test_remove_revision() {
    let (d0, d1, d2) = (ptr("d", "0"), ptr("d", "1"), ptr("d", "2"));
    let (r0, r1, r2) = (ptr("root", "0"), ptr("root", "1"), ptr("root", "2"));
    let first = touch(Op::create("a", d0, EntryType::File).unwrap(), (d0, d1), (r0, r1));
    let second = touch(Op::create("b", d1, EntryType::File).unwrap(), (d1, d2), (r1, r2));

    let mut registry = ChainRegistry::from_batches(vec![
        batch("alice", 1, r1, vec![first]),
        batch("alice", 2, r2, vec![second]),
    ])
    .unwrap();

    assert_eq!(registry.remove_revision(Revision(2)).len(), 1);
    assert_eq!(op_log(&registry, d2), vec!["create a (FILE)"]);
    assert!(registry.remove_revision(Revision(2)).is_empty());
}

#[test]
fn test_copy_reverts_pointers_to_originals() {
    let (d0, d1, d2) = (ptr("d", "0"), ptr("d", "1"), ptr("d", "2"));
    let first = touch(
        Op::create("a", d0, EntryType::File).unwrap(),
        (d0, d1),
        (ptr("root", "0"), ptr("root", "1")),
    );
    let second = touch(
        Op::create("b", d1, EntryType::File).unwrap(),
        (d1, d2),
        (ptr("root", "1"), ptr("root", "2")),
    );
    let registry =
        ChainRegistry::from_batches(vec![batch("alice", 1, ptr("root", "2"), vec![first, second])])
            .unwrap();

    let rm = Op::rm("a", d2, EntryType::File).unwrap();
    let copy = registry.copy_op_and_revert_unrefs_to_originals(&rm);
    assert_ne!(copy.id(), rm.id());
    let OpKind::Rm(copied) = &copy.kind else {
        panic!("expected rm");
    };
    assert_eq!(copied.dir.old, d0);
}

#[test]
fn test_chain_for_synthesized_rename() {
    let target = ptr("d", "9");
    let rename = Op::rename("a", target, "b", target, ptr("a", "0"), EntryType::File).unwrap();

    let mut registry = ChainRegistry::new();
    registry.make_chain_for_new_op(target, rename.clone()).unwrap();

    let chain = registry.by_most_recent(target).unwrap();
    assert_eq!(chain.original(), target);
    assert_eq!(chain.ops(), &[rename]);
}

#[test]
fn test_revert_renames() {
    let (d0, d1, e0, e1) = (ptr("d", "0"), ptr("d", "1"), ptr("e", "0"), ptr("e", "1"));
    let mut rename = Op::rename("a", d0, "b", e0, ptr("a", "0"), EntryType::File).unwrap();
    rename.add_update(d0, d1);
    rename.add_update(e0, e1);
    let mut registry =
        ChainRegistry::from_batches(vec![batch("alice", 1, d1, vec![rename.clone()])]).unwrap();

    let old_parent = dir_path(ptr("root", "1"), d1);
    let mut finals = FinalPaths::default();
    finals.insert(d1, old_parent.clone());
    registry.revert_renames(&[rename.clone()], &mut finals);

    assert!(op_log(&registry, d1).is_empty());
    assert_eq!(registry.by_most_recent(e1).unwrap().ops(), &[rename.clone()]);
    assert_eq!(finals.old_path_for(rename.id()), Some(&old_parent));
}

#[test]
fn test_summary_serializes() {
    let (d0, d1, r0, r1) = (ptr("d", "0"), ptr("d", "1"), ptr("root", "0"), ptr("root", "1"));
    let create = touch(Op::create("a", d0, EntryType::File).unwrap(), (d0, d1), (r0, r1));
    let registry = ChainRegistry::from_batches(vec![batch("alice", 1, r1, vec![create])]).unwrap();

    let mut finals = FinalPaths::default();
    finals.insert(d1, dir_path(r1, d1));
    let summary = serde_json::to_value(registry.summary(&finals)).unwrap();

    let chains = summary.as_array().unwrap();
    assert_eq!(chains.len(), 2);
    assert!(chains.contains(&json!({ "path": "/d", "ops": ["create a (FILE)"] })));
    assert!(chains.contains(&json!({ "path": format!("Unknown path: {}", r1), "ops": [] })));
}

#[tokio::test]
async fn test_mtime_only_chains_are_typed_from_their_parent() {
    let (d0, d1, d2, d3) = (ptr("d", "0"), ptr("d", "1"), ptr("d", "2"), ptr("d", "3"));
    let (r0, r1, r2, r3) = (ptr("root", "0"), ptr("root", "1"), ptr("root", "2"), ptr("root", "3"));
    let (a, b, c) = (ptr("a", "0"), ptr("b", "0"), ptr("c", "0"));
    let ops = vec![
        touch(Op::set_attr("a", d0, AttrChange::Mtime, a).unwrap(), (d0, d1), (r0, r1)),
        touch(Op::set_attr("b", d1, AttrChange::Mtime, b).unwrap(), (d1, d2), (r1, r2)),
        touch(Op::set_attr("c", d2, AttrChange::Mtime, c).unwrap(), (d2, d3), (r2, r3)),
    ];

    let fs = MemoryFs::new();
    fs.insert(d3, "a", DirEntry::new(a, EntryType::Dir));
    fs.insert(d3, "b", file_entry(b, 1));

    let registry = build("alice", r3, ops, Some(&fs)).await;

    assert_eq!(registry.by_original(a).unwrap().node_type(), NodeType::Dir);
    assert!(registry.by_original(b).unwrap().is_file());
    // not in its parent any more
    assert!(registry.is_deleted(c));
}

#[tokio::test]
async fn test_type_identification_can_be_switched_off() {
    let (f0, f1) = (ptr("f", "0"), ptr("f", "1"));
    let mut sync = Op::sync(f0).unwrap();
    sync.add_update(f0, f1);
    let config = CrConfig {
        identify_types: false,
        ..CrConfig::default()
    };

    let fs = MemoryFs::new();
    let registry = ChainRegistry::build(vec![batch("alice", 1, f1, vec![sync])], Some(&fs), &config)
        .await
        .unwrap();
    assert!(!registry.by_original(f0).unwrap().is_file());
}

#[tokio::test]
async fn test_paths_for_found_lost_and_deleted_nodes() {
    let (d0, d1, d2) = (ptr("d", "0"), ptr("d", "1"), ptr("d", "2"));
    let (g0, g1, e0, e1) = (ptr("g", "0"), ptr("g", "1"), ptr("e", "0"), ptr("e", "1"));
    let (r0, r1, r2, r3) = (ptr("root", "0"), ptr("root", "1"), ptr("root", "2"), ptr("root", "3"));

    let mut sync = touch(Op::sync(g0).unwrap(), (d0, d1), (r0, r1));
    sync.add_update(g0, g1);
    let mut remove = touch(Op::rm("gone", d1, EntryType::File).unwrap(), (d1, d2), (r1, r2));
    remove.add_unref(g1);
    let elsewhere = touch(Op::create("y", e0, EntryType::File).unwrap(), (e0, e1), (r2, r3));

    let mut registry = ChainRegistry::from_batches(vec![
        batch("alice", 1, r1, vec![sync]),
        batch("alice", 2, r3, vec![remove, elsewhere]),
    ])
    .unwrap();
    assert!(registry.is_deleted(g0));

    let fs = MemoryFs::new();
    fs.set_path(d2, dir_path(r3, d2));
    let discovery = registry.get_paths(&fs, false).await.unwrap();

    assert_eq!(discovery.sorted, vec![dir_path(r3, d2)]);
    let gone = discovery.finals.get(g1).unwrap();
    assert_eq!(gone.to_string(), "/d/gone");
    assert_eq!(gone.tail_pointer(), g1);
    // never found, so dropped
    assert!(registry.by_most_recent(e1).is_none());
}
