//! Integration tests for applying single actions to in-memory trees

mod common;

use common::{apply_env, build, file_entry, op_log, ptr, touch};
use cr::actions::{
    uniquify_name, CopyUnmergedAttr, CopyUnmergedEntry, DirHandle, DropUnmerged, RenameMerged,
    RenameUnmerged, RmMergedEntry, Swap, UpdateTarget,
};
use cr::prelude::*;
use cr::testkit::MemoryFs;

#[tokio::test]
async fn test_uniquify_name() {
    let fs = MemoryFs::new();
    let dir = ptr("d", "0");
    fs.insert(dir, "a.txt", file_entry(ptr("a", "0"), 1));
    fs.insert(dir, "a (1).txt", file_entry(ptr("a", "1"), 1));
    let handle = DirHandle::new(&fs, dir);

    assert_eq!(uniquify_name(handle, "b.txt", 100).await.unwrap(), "b.txt");
    assert_eq!(uniquify_name(handle, "a.txt", 100).await.unwrap(), "a (2).txt");
    assert!(matches!(
        uniquify_name(handle, "a.txt", 1).await,
        Err(CrError::UniquifyExhausted(name)) if name == "a.txt"
    ));
}

#[tokio::test]
async fn test_remove_of_missing_entry_is_done() {
    let (unmerged_fs, merged_fs, config) = (MemoryFs::new(), MemoryFs::new(), CrConfig::default());
    let env = apply_env(&unmerged_fs, &merged_fs, &config);
    let dm = ptr("d", "m1");
    merged_fs.insert(dm, "a", file_entry(ptr("a", "0"), 1));
    let unmerged_dir = DirHandle::new(&unmerged_fs, dm);
    let merged_dir = DirHandle::new(&merged_fs, dm);

    let mut remove = CrAction::RmMergedEntry(RmMergedEntry::new("a"));
    let unrefs = remove.apply(&env, unmerged_dir, merged_dir).await.unwrap();
    assert_eq!(unrefs, vec![ptr("a", "0")]);
    assert!(remove.apply(&env, unmerged_dir, merged_dir).await.unwrap().is_empty());

    // a missing directory is a real failure
    let elsewhere = merged_dir.at(ptr("nowhere", "0"));
    assert!(remove.apply(&env, unmerged_dir, elsewhere).await.is_err());
}

#[tokio::test]
async fn test_copy_entry_with_unique_name() {
    let (unmerged_fs, merged_fs, config) = (MemoryFs::new(), MemoryFs::new(), CrConfig::default());
    let env = apply_env(&unmerged_fs, &merged_fs, &config);
    let (du, dm) = (ptr("d", "u1"), ptr("d", "m1"));
    unmerged_fs.insert(du, "a", file_entry(ptr("a", "u1"), 4));
    merged_fs.insert(dm, "a", file_entry(ptr("a", "m1"), 2));

    let mut copy = CrAction::CopyUnmergedEntry(CopyUnmergedEntry::new("a", "a", None, true));
    let unrefs = copy
        .apply(&env, DirHandle::new(&unmerged_fs, du), DirHandle::new(&merged_fs, dm))
        .await
        .unwrap();

    assert!(unrefs.is_empty());
    assert_eq!(merged_fs.names(dm), vec!["a".to_string(), "a (1)".to_string()]);
    assert_eq!(merged_fs.entry(dm, "a").unwrap().ptr, ptr("a", "m1"));
    assert_eq!(merged_fs.entry(dm, "a (1)").unwrap().ptr, ptr("a", "u1"));
    assert_eq!(copy.to_string(), "copyUnmergedEntry: a -> a (1) ");
}

#[tokio::test]
async fn test_copy_entry_as_symlink() {
    let (unmerged_fs, merged_fs, config) = (MemoryFs::new(), MemoryFs::new(), CrConfig::default());
    let env = apply_env(&unmerged_fs, &merged_fs, &config);
    let (du, dm) = (ptr("d", "u1"), ptr("d", "m1"));
    unmerged_fs.insert(du, "a", DirEntry::new(ptr("a", "u1"), EntryType::Dir));
    merged_fs.add_dir(dm);

    let action = CopyUnmergedEntry::new("a", "a", Some("a.conflict".to_string()), false);
    CrAction::CopyUnmergedEntry(action)
        .apply(&env, DirHandle::new(&unmerged_fs, du), DirHandle::new(&merged_fs, dm))
        .await
        .unwrap();

    let entry = merged_fs.entry(dm, "a").unwrap();
    assert_eq!(entry.entry_type, EntryType::Sym);
    assert_eq!(entry.sym_path.as_deref(), Some("a.conflict"));
}

#[tokio::test]
async fn test_directories_are_never_content_copied() {
    let (unmerged_fs, merged_fs, config) = (MemoryFs::new(), MemoryFs::new(), CrConfig::default());
    let env = apply_env(&unmerged_fs, &merged_fs, &config);
    let (du, dm) = (ptr("d", "u1"), ptr("d", "m1"));
    unmerged_fs.insert(du, "a", DirEntry::new(ptr("a", "u1"), EntryType::Dir));
    merged_fs.add_dir(dm);

    let mut rename = CrAction::RenameUnmerged(RenameUnmerged::new("a", "b", None));
    let result = rename
        .apply(&env, DirHandle::new(&unmerged_fs, du), DirHandle::new(&merged_fs, dm))
        .await;

    assert!(matches!(result, Err(CrError::NotAFile(name)) if name == "a"));
    assert!(unmerged_fs.copies().is_empty());
}

#[tokio::test]
async fn test_copy_attributes() {
    let (unmerged_fs, merged_fs, config) = (MemoryFs::new(), MemoryFs::new(), CrConfig::default());
    let env = apply_env(&unmerged_fs, &merged_fs, &config);
    let (du, dm) = (ptr("d", "u1"), ptr("d", "m1"));
    unmerged_fs.insert(du, "a", DirEntry::new(ptr("a", "u1"), EntryType::Exec).with_size(9));
    merged_fs.insert(dm, "a", file_entry(ptr("a", "m1"), 2));
    let unmerged_dir = DirHandle::new(&unmerged_fs, du);
    let merged_dir = DirHandle::new(&merged_fs, dm);

    let mut ex = CrAction::CopyUnmergedAttr(CopyUnmergedAttr::new("a", "a", vec![AttrChange::Ex]));
    ex.apply(&env, unmerged_dir, merged_dir).await.unwrap();
    let entry = merged_fs.entry(dm, "a").unwrap();
    assert_eq!(entry.entry_type, EntryType::Exec);
    assert_eq!((entry.ptr, entry.size), (ptr("a", "m1"), 2));

    let size = CopyUnmergedAttr::new("a", "a", vec![AttrChange::Size]);
    let mut size = CrAction::CopyUnmergedAttr(size);
    let unrefs = size.apply(&env, unmerged_dir, merged_dir).await.unwrap();
    let entry = merged_fs.entry(dm, "a").unwrap();
    assert_eq!((entry.ptr, entry.size), (ptr("a", "u1"), 9));
    assert_eq!(unrefs, vec![ptr("a", "m1")]);
}

#[tokio::test]
async fn test_attribute_only_change_reads_the_merged_entry() {
    let (d0, r0, a0) = (ptr("d", "0"), ptr("root", "0"), ptr("a", "0"));
    let (du, ru) = (ptr("d", "u1"), ptr("root", "u1"));
    let (dm, rm, am) = (ptr("d", "m1"), ptr("root", "m1"), ptr("a", "m1"));

    let set_attr = Op::set_attr("a", d0, AttrChange::Ex, a0).unwrap();
    let set_attr = touch(set_attr, (d0, du), (r0, ru));
    let mut sync = touch(Op::sync(a0).unwrap(), (d0, dm), (r0, rm));
    sync.add_update(a0, am);
    sync.add_write(0, 7);
    let unmerged = build("alice", ru, vec![set_attr], None).await;
    let merged = build("bob", rm, vec![sync], None).await;

    let (unmerged_fs, merged_fs, config) = (MemoryFs::new(), MemoryFs::new(), CrConfig::default());
    unmerged_fs.insert(du, "a", DirEntry::new(a0, EntryType::Exec).with_size(3));
    merged_fs.insert(dm, "a", file_entry(am, 7));
    let env = apply_env(&unmerged_fs, &merged_fs, &config);
    let merged_dir = DirHandle::new(&merged_fs, dm);

    let mut copy = CrAction::CopyUnmergedEntry(CopyUnmergedEntry::new("a", "a", None, false));
    let swap = copy
        .swap_unmerged_block(&unmerged, &merged, DirHandle::new(&unmerged_fs, du))
        .await
        .unwrap();
    assert_eq!(swap, Swap::MergedDir);
    let CrAction::CopyUnmergedEntry(inner) = &copy else {
        unreachable!()
    };
    assert!(inner.is_size_only());

    // the merged content wins
    copy.apply(&env, merged_dir, merged_dir).await.unwrap();
    let entry = merged_fs.entry(dm, "a").unwrap();
    assert_eq!((entry.ptr, entry.size), (am, 7));
}

#[tokio::test]
async fn test_rename_merged_moves_the_merged_file_aside() {
    let (d0, r0) = (ptr("d", "0"), ptr("root", "0"));
    let (du, ru, xu) = (ptr("d", "u1"), ptr("root", "u1"), ptr("x", "u1"));
    let (dm, rm, xm) = (ptr("d", "m1"), ptr("root", "m1"), ptr("x", "m1"));

    let unmerged_create = touch(Op::create("x", d0, EntryType::Dir).unwrap(), (d0, du), (r0, ru));
    let merged_create = touch(Op::create("x", d0, EntryType::File).unwrap(), (d0, dm), (r0, rm));
    let mut unmerged = build("alice", ru, vec![unmerged_create], None).await;
    let mut merged = build("bob", rm, vec![merged_create], None).await;

    let (unmerged_fs, merged_fs, config) = (MemoryFs::new(), MemoryFs::new(), CrConfig::default());
    unmerged_fs.insert(du, "x", DirEntry::new(xu, EntryType::Dir));
    merged_fs.insert(dm, "x", file_entry(xm, 5));
    let env = apply_env(&unmerged_fs, &merged_fs, &config);
    let unmerged_dir = DirHandle::new(&unmerged_fs, du);
    let merged_dir = DirHandle::new(&merged_fs, dm);

    let mut action = CrAction::RenameMerged(RenameMerged::new("x", "x.conflict", None));
    action.apply(&env, unmerged_dir, merged_dir).await.unwrap();
    assert_eq!(merged_fs.entry(dm, "x").unwrap().entry_type, EntryType::Dir);
    assert_eq!(merged_fs.entry(dm, "x.conflict").unwrap().ptr, xm);

    let target = UpdateTarget {
        unmerged_most_recent: du,
        merged_most_recent: dm,
        unmerged_dir,
        merged_dir,
    };
    action.update_ops(target, &mut unmerged, &mut merged).await.unwrap();

    assert_eq!(op_log(&unmerged, du), vec!["rename x -> x.conflict", "create x (DIR)"]);
    assert_eq!(op_log(&merged, dm), vec!["create x.conflict (FILE)"]);
}

#[tokio::test]
async fn test_drop_unmerged_shows_the_undo_on_the_merged_side() {
    let (d0, r0) = (ptr("d", "0"), ptr("root", "0"));
    let (du, ru, dm, rm) = (ptr("d", "u1"), ptr("root", "u1"), ptr("d", "m1"), ptr("root", "m1"));

    let remove = touch(Op::rm("a", d0, EntryType::File).unwrap(), (d0, du), (r0, ru));
    let merged_create = touch(Op::create("b", d0, EntryType::File).unwrap(), (d0, dm), (r0, rm));
    let mut unmerged = build("alice", ru, vec![remove], None).await;
    let mut merged = build("bob", rm, vec![merged_create], None).await;
    let dropped = unmerged.by_most_recent(du).unwrap().ops()[0].clone();

    let (unmerged_fs, merged_fs) = (MemoryFs::new(), MemoryFs::new());
    let target = UpdateTarget {
        unmerged_most_recent: du,
        merged_most_recent: dm,
        unmerged_dir: DirHandle::new(&unmerged_fs, du),
        merged_dir: DirHandle::new(&merged_fs, dm),
    };
    CrAction::DropUnmerged(DropUnmerged::new(dropped))
        .update_ops(target, &mut unmerged, &mut merged)
        .await
        .unwrap();

    assert!(op_log(&unmerged, du).is_empty());
    assert_eq!(op_log(&merged, dm), vec!["create a (FILE)", "create b (FILE)"]);
    let OpKind::Create(undo) = &merged.by_most_recent(dm).unwrap().ops()[0].kind else {
        panic!("expected a create");
    };
    assert_eq!((undo.dir.old, undo.dir.new), (du, d0));
}
