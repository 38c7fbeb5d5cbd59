use super::{copy_file, uniquify_name, ApplyEnv, DirHandle, Swap, UpdateTarget};
use crate::block::BlockPointer;
use crate::chains::ChainRegistry;
use crate::entry::{AttrChange, DirEntry};
use crate::error::{CrError, Result};
use crate::ops::{Op, OpKind};

/// Copy the unmerged entry `from_name` into the merged directory as
///  `to_name`.
///
/// If the unmerged side never really changed the node (its chain is
///  empty or only sets attributes) and the merged side did, the copy
///  swaps to reading the merged entry instead and only carries size
///  and pointer across, re-applying the unmerged attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyUnmergedEntry {
    pub from_name: String,
    pub to_name: String,
    pub sym_path: Option<String>,
    /// Pick a free name near `to_name` if it is taken
    pub unique: bool,
    pub(crate) size_only: bool,
    pub(crate) unmerged_entry: Option<DirEntry>,
    pub(crate) attrs: Vec<AttrChange>,
}

impl CopyUnmergedEntry {
    pub fn new(
        from_name: impl Into<String>,
        to_name: impl Into<String>,
        sym_path: Option<String>,
        unique: bool,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            to_name: to_name.into(),
            sym_path,
            unique,
            ..Default::default()
        }
    }

    pub fn is_size_only(&self) -> bool {
        self.size_only
    }

    pub(super) async fn swap_unmerged_block(
        &mut self,
        unmerged: &ChainRegistry,
        merged: &ChainRegistry,
        unmerged_dir: DirHandle<'_>,
    ) -> Result<Swap> {
        if self.sym_path.is_some() {
            return Ok(Swap::Keep);
        }

        let entry = unmerged_dir.lookup(&self.from_name).await?;
        let mut ptr = entry.ptr;
        if let Some(chain) = unmerged.by_most_recent(ptr) {
            // attribute changes survive the swap; anything else means
            //  the unmerged content really changed
            let mut attrs = Vec::new();
            for op in chain.ops() {
                match &op.kind {
                    OpKind::SetAttr(set_attr) => attrs.push(set_attr.attr),
                    _ => return Ok(Swap::Keep),
                }
            }
            self.attrs.extend(attrs);
            ptr = chain.original();
        }
        if merged.by_original(ptr).is_none() || merged.is_deleted(ptr) {
            return Ok(Swap::Keep);
        }

        self.unmerged_entry = Some(entry);
        self.size_only = true;
        let (parent, name) = match merged.renamed_parent_and_name(ptr) {
            Some((parent, name)) => (parent, name.to_string()),
            None => match unmerged.renamed_info(ptr) {
                Some(info) => (info.original_old_parent, info.old_name.clone()),
                None => return Ok(Swap::MergedDir),
            },
        };
        self.from_name = name;
        Ok(Swap::Parent(merged.most_recent_from_original_or_same(parent)))
    }

    pub(super) async fn apply(
        &mut self,
        env: &ApplyEnv<'_>,
        unmerged_dir: DirHandle<'_>,
        merged_dir: DirHandle<'_>,
    ) -> Result<Vec<BlockPointer>> {
        let mut entry = unmerged_dir.lookup(&self.from_name).await?;
        if let Some(sym_path) = &self.sym_path {
            entry.convert_to_symlink(sym_path);
        }
        if self.unique {
            self.to_name =
                uniquify_name(merged_dir, &self.to_name, env.config.max_unique_attempts).await?;
        }

        let merged_entry = merged_dir.lookup_opt(&self.to_name).await?;
        if self.size_only {
            if let Some(mut merged_entry) = merged_entry {
                merged_entry.size = entry.size;
                merged_entry.encoded_size = entry.encoded_size;
                merged_entry.ptr = entry.ptr;
                return merged_dir.set_entry(&self.to_name, merged_entry).await;
            }
            if let Some(saved) = &self.unmerged_entry {
                for attr in &self.attrs {
                    match attr {
                        AttrChange::Ex => entry.entry_type = saved.entry_type,
                        AttrChange::Mtime => entry.mtime = saved.mtime,
                        AttrChange::Size => {}
                    }
                }
            }
        }

        // history restarts from whatever the merged side had here
        entry.reset_prev_revisions(merged_entry.as_ref());
        merged_dir.set_entry(&self.to_name, entry).await
    }

    pub(super) async fn update_ops(
        &self,
        target: UpdateTarget<'_>,
        unmerged: &mut ChainRegistry,
        merged: &mut ChainRegistry,
    ) -> Result<()> {
        let umr = target.unmerged_most_recent;
        let mmr = target.merged_most_recent;
        let is_file = unmerged
            .by_most_recent(umr)
            .ok_or(CrError::MissingChain(umr))?
            .is_file();

        if self.sym_path.is_some() && !is_file {
            merged.convert_symlink(mmr, &self.to_name)?;
        }

        if self.from_name != self.to_name {
            unmerged.fixup_names(umr, &self.from_name, &self.to_name);
            if self.unique || self.sym_path.is_some() {
                // live handles on the merged side need to see the
                //  entry move before the new one appears
                merged
                    .make_local_rename_op_for_copy_action(
                        target.merged_dir,
                        mmr,
                        &self.from_name,
                        &self.to_name,
                    )
                    .await?;
            }
        }

        let merged_entry = target.merged_dir.lookup(&self.to_name).await?;
        unmerged.track_sync_ptr_changes_in_create(umr, merged_entry.ptr, &self.to_name);
        Ok(())
    }
}

/// Copy selected attributes of the unmerged entry onto the merged
///  entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyUnmergedAttr {
    pub from_name: String,
    pub to_name: String,
    pub attrs: Vec<AttrChange>,
    /// Already moved up to the parent directory's list
    pub(crate) moved: bool,
}

impl CopyUnmergedAttr {
    pub fn new(
        from_name: impl Into<String>,
        to_name: impl Into<String>,
        attrs: Vec<AttrChange>,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            to_name: to_name.into(),
            attrs,
            moved: false,
        }
    }

    pub(super) async fn apply(
        &self,
        unmerged_dir: DirHandle<'_>,
        merged_dir: DirHandle<'_>,
    ) -> Result<Vec<BlockPointer>> {
        let unmerged_entry = unmerged_dir.lookup(&self.from_name).await?;
        let mut merged_entry = merged_dir.lookup(&self.to_name).await?;
        for attr in &self.attrs {
            match attr {
                AttrChange::Ex => merged_entry.entry_type = unmerged_entry.entry_type,
                AttrChange::Mtime => merged_entry.mtime = unmerged_entry.mtime,
                AttrChange::Size => {
                    merged_entry.size = unmerged_entry.size;
                    merged_entry.encoded_size = unmerged_entry.encoded_size;
                    merged_entry.ptr = unmerged_entry.ptr;
                }
            }
        }
        merged_dir.set_entry(&self.to_name, merged_entry).await
    }

    pub(super) fn update_ops(
        &self,
        target: UpdateTarget<'_>,
        unmerged: &mut ChainRegistry,
    ) -> Result<()> {
        let umr = target.unmerged_most_recent;
        if unmerged.by_most_recent(umr).is_none() {
            return Err(CrError::MissingChain(umr));
        }
        if self.from_name != self.to_name {
            unmerged.fixup_names(umr, &self.from_name, &self.to_name);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RmMergedEntry {
    pub name: String,
}

impl RmMergedEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Already gone counts as done
    pub(super) async fn apply(&self, merged_dir: DirHandle<'_>) -> Result<Vec<BlockPointer>> {
        match merged_dir.remove_entry(&self.name).await {
            Ok(unrefs) => Ok(unrefs),
            Err(e) if e.is_no_such_name() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Move the unmerged copy of an entry aside: its content is copied
///  into the merged directory under a new name, leaving the merged
///  entry where it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameUnmerged {
    pub from_name: String,
    pub to_name: String,
    pub sym_path: Option<String>,
    /// Set when a conflicting attribute change caused the rename
    pub caused_by_attr: Option<AttrChange>,
    pub(crate) moved: bool,
    /// Both set for a file-vs-file conflict, so the op log patch
    ///  lands in the parent directories' chains
    pub unmerged_parent_most_recent: Option<BlockPointer>,
    pub merged_parent_most_recent: Option<BlockPointer>,
}

impl RenameUnmerged {
    pub fn new(
        from_name: impl Into<String>,
        to_name: impl Into<String>,
        sym_path: Option<String>,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            to_name: to_name.into(),
            sym_path,
            ..Default::default()
        }
    }

    pub(super) async fn apply(
        &mut self,
        env: &ApplyEnv<'_>,
        unmerged_dir: DirHandle<'_>,
        merged_dir: DirHandle<'_>,
    ) -> Result<Vec<BlockPointer>> {
        let (_, name, unrefs) = copy_file(
            env.unmerged_copier,
            &self.from_name,
            &self.to_name,
            self.sym_path.as_deref(),
            unmerged_dir,
            merged_dir,
            env.config.max_unique_attempts,
        )
        .await?;
        self.to_name = name;
        Ok(unrefs)
    }

    pub(super) async fn update_ops(
        &self,
        target: UpdateTarget<'_>,
        unmerged: &mut ChainRegistry,
        merged: &mut ChainRegistry,
    ) -> Result<()> {
        let mut umr = target.unmerged_most_recent;
        let mut mmr = target.merged_most_recent;
        let is_file = unmerged
            .by_most_recent(umr)
            .ok_or(CrError::MissingChain(umr))?
            .is_file();

        let unmerged_entry = target.unmerged_dir.lookup(&self.from_name).await?;
        let original = unmerged.original_from_most_recent_or_same(unmerged_entry.ptr);

        if self.sym_path.is_some() && !is_file {
            merged.convert_symlink(mmr, &self.to_name)?;
        }
        unmerged.fixup_names(umr, &self.from_name, &self.to_name);

        let new_merged_entry = target.merged_dir.lookup(&self.to_name).await?;
        let new_ptr = new_merged_entry.ptr;

        if is_file {
            unmerged.retarget_file_ops(umr, original, new_ptr);
            let (Some(unmerged_parent), Some(merged_parent)) =
                (self.unmerged_parent_most_recent, self.merged_parent_most_recent)
            else {
                // not a write/write conflict
                return Ok(());
            };
            if unmerged.by_most_recent(unmerged_parent).is_none() {
                return Err(CrError::MissingChain(unmerged_parent));
            }
            umr = unmerged_parent;
            mmr = merged_parent;
        }

        let merged_entry = target.merged_dir.lookup(&self.from_name).await?;

        if self.to_name == self.from_name && merged.renamed_info(original).is_some() {
            // the merged copy is the one that moved; its rename only
            //  needs the create half
            let unmerged_original = unmerged.original_from_most_recent_or_same(umr);
            merged.remove_rm_ops(unmerged_original, &self.to_name);
            if self.sym_path.is_none() {
                let mut sync = Op::sync(unmerged_entry.ptr)?;
                sync.add_update(unmerged_entry.ptr, new_ptr);
                merged.prepend_ops(unmerged_entry.ptr, vec![sync])?;
            }
        } else {
            let mut rename = Op::rename(
                &self.from_name,
                mmr,
                &self.to_name,
                mmr,
                new_ptr,
                new_merged_entry.entry_type,
            )?;
            if self.sym_path.is_none() {
                rename.add_update(unmerged_entry.ptr, new_ptr);
            }
            let create = Op::create(&self.from_name, mmr, merged_entry.entry_type)?;
            merged.prepend_ops(mmr, vec![rename, create])?;
        }

        let chain = unmerged
            .by_most_recent_mut(umr)
            .ok_or(CrError::MissingChain(umr))?;
        let existing = chain.ops_mut().iter_mut().find(|op| {
            matches!(&op.kind, OpKind::Create(create) if create.new_name == self.to_name)
        });
        let create_id = match existing {
            Some(create) => {
                if let Some(first) = create.common.refs.first_mut() {
                    *first = new_ptr;
                }
                create.id()
            }
            None => {
                let mut create = Op::create(&self.to_name, umr, merged_entry.entry_type)?;
                if self.sym_path.is_none() {
                    create.add_ref(new_ptr);
                }
                let id = create.id();
                unmerged.prepend_ops(umr, vec![create])?;
                id
            }
        };

        // a real copy with a new name leaves the old block behind
        if unmerged_entry.ptr != new_ptr
            && self.from_name != self.to_name
            && self.sym_path.is_none()
        {
            if let Some(create) = unmerged
                .by_most_recent_mut(umr)
                .and_then(|chain| chain.ops_mut().iter_mut().find(|op| op.id() == create_id))
            {
                create.add_unref(unmerged_entry.ptr);
            }
            let old_original = unmerged.original_of(unmerged_entry.ptr);
            unmerged.deleted_originals.insert(old_original);
        }
        Ok(())
    }
}

/// Move the merged entry aside within the merged directory and put
///  the unmerged entry in its place. Only happens when the unmerged
///  side is a directory (or becoming a symlink), so the two never
///  share blocks and nothing needs copying.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameMerged {
    pub from_name: String,
    pub to_name: String,
    /// Applies to the unmerged entry taking over `from_name`
    pub sym_path: Option<String>,
}

impl RenameMerged {
    pub fn new(
        from_name: impl Into<String>,
        to_name: impl Into<String>,
        sym_path: Option<String>,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            to_name: to_name.into(),
            sym_path,
        }
    }

    pub(super) async fn apply(
        &mut self,
        env: &ApplyEnv<'_>,
        unmerged_dir: DirHandle<'_>,
        merged_dir: DirHandle<'_>,
    ) -> Result<Vec<BlockPointer>> {
        let merged_entry = merged_dir.lookup(&self.from_name).await?;
        self.to_name =
            uniquify_name(merged_dir, &self.to_name, env.config.max_unique_attempts).await?;
        let unrefs = merged_dir.set_entry(&self.to_name, merged_entry).await?;

        let mut unmerged_entry = unmerged_dir.lookup(&self.from_name).await?;
        if let Some(sym_path) = &self.sym_path {
            unmerged_entry.convert_to_symlink(sym_path);
        }
        unmerged_entry.reset_prev_revisions(None);
        // what this replaces still lives on under `to_name`
        merged_dir.set_entry(&self.from_name, unmerged_entry).await?;
        Ok(unrefs)
    }

    pub(super) async fn update_ops(
        &self,
        target: UpdateTarget<'_>,
        unmerged: &mut ChainRegistry,
        merged: &mut ChainRegistry,
    ) -> Result<()> {
        let umr = target.unmerged_most_recent;
        let mmr = target.merged_most_recent;
        let is_file = unmerged
            .by_most_recent(umr)
            .ok_or(CrError::MissingChain(umr))?
            .is_file();

        if self.sym_path.is_some() && !is_file {
            merged.convert_symlink(mmr, &self.from_name)?;
        }
        merged.fixup_names(mmr, &self.from_name, &self.to_name);

        if is_file {
            return Ok(());
        }

        let merged_entry = target.merged_dir.lookup(&self.to_name).await?;
        let rename = Op::rename(
            &self.from_name,
            umr,
            &self.to_name,
            umr,
            merged_entry.ptr,
            merged_entry.entry_type,
        )?;
        unmerged.prepend_ops(umr, vec![rename])?;

        // replaying the merged ops needs the moved entry to exist
        let has_create = merged.by_most_recent(mmr).is_some_and(|chain| {
            chain.ops().iter().any(|op| {
                matches!(&op.kind, OpKind::Create(create) if create.new_name == self.to_name)
            })
        });
        if !has_create {
            let create = Op::create(&self.to_name, mmr, merged_entry.entry_type)?;
            merged.prepend_ops(mmr, vec![create])?;
        }
        Ok(())
    }
}

/// Throw away one unmerged op
#[derive(Debug, Clone, PartialEq)]
pub struct DropUnmerged {
    pub op: Op,
}

impl DropUnmerged {
    pub fn new(op: Op) -> Self {
        Self { op }
    }

    pub(super) fn update_ops(
        &self,
        target: UpdateTarget<'_>,
        unmerged: &mut ChainRegistry,
        merged: &mut ChainRegistry,
    ) -> Result<()> {
        let umr = target.unmerged_most_recent;
        let chain = unmerged
            .by_most_recent_mut(umr)
            .ok_or(CrError::MissingChain(umr))?;
        let Some(pos) = chain.ops().iter().position(|op| op.id() == self.op.id()) else {
            return Ok(());
        };
        chain.ops_mut().remove(pos);

        // local watchers saw the op happen, so show them its undoing
        let inverted = self.op.invert_for_local_notifications()?;
        merged.prepend_ops(target.merged_most_recent, vec![inverted])
    }
}
