use super::{Op, OpKind};
use crate::actions::{
    CopyUnmergedAttr, CopyUnmergedEntry, CrAction, DropUnmerged, RenameMerged, RenameUnmerged,
    RmMergedEntry,
};
use crate::entry::{AttrChange, EntryType};
use crate::error::{CrError, Result};
use crate::path::CrPath;
use crate::rename::ConflictRenamer;

impl Op {
    /// Compare this unmerged op against one op from the matching
    ///  merged chain, returning the action that reconciles them if
    ///  they collide.
    ///
    /// # Arguments
    /// * `renamer` - Picks names for entries that have to step aside
    /// * `unmerged_path` - Final path of this op's chain
    /// * `merged` - The merged op to compare against
    /// * `merged_path` - Final path of the merged op's chain
    /// * `is_file` - Whether the node both chains describe is a file
    ///
    /// # Returns
    /// * `Ok(None)` - No conflict
    /// * `Err(CrError::RenameConflictCheck)` - Called on a rename,
    ///   which chain construction should have split up
    pub async fn check_conflict(
        &self,
        renamer: &dyn ConflictRenamer,
        unmerged_path: &CrPath,
        merged: &Op,
        merged_path: &CrPath,
        is_file: bool,
    ) -> Result<Option<CrAction>> {
        match (&self.kind, &merged.kind) {
            (OpKind::Create(co), OpKind::Create(other)) if co.new_name == other.new_name => {
                let both_dirs =
                    co.entry_type == EntryType::Dir && other.entry_type == EntryType::Dir;
                if !both_dirs {
                    // the unmerged side is (or is becoming) a directory, so
                    //  the merged non-directory moves out of its way
                    if other.entry_type != EntryType::Dir
                        && (co.entry_type == EntryType::Dir || co.cr_sym_path.is_some())
                    {
                        let to_name = renamer.conflict_rename(merged, &co.new_name).await?;
                        return Ok(Some(CrAction::RenameMerged(RenameMerged::new(
                            &co.new_name,
                            to_name,
                            co.cr_sym_path.clone(),
                        ))));
                    }
                    let to_name = renamer.conflict_rename(self, &co.new_name).await?;
                    return Ok(Some(CrAction::RenameUnmerged(RenameUnmerged {
                        from_name: co.new_name.clone(),
                        to_name,
                        sym_path: co.cr_sym_path.clone(),
                        ..Default::default()
                    })));
                }
                if co.renamed || other.renamed {
                    // two directories, one moved here: the unmerged one
                    //  gets a fresh name
                    let to_name = renamer.conflict_rename(self, &co.new_name).await?;
                    return Ok(Some(CrAction::CopyUnmergedEntry(CopyUnmergedEntry::new(
                        &co.new_name,
                        to_name,
                        co.cr_sym_path.clone(),
                        true,
                    ))));
                }
                Ok(None)
            }
            (OpKind::Create(_), _) => Ok(None),

            // the merged branch already removed it, or removed and
            //  re-created it; either way this remove has nothing to do
            (OpKind::Rm(rm), OpKind::Create(other)) if other.new_name == rm.old_name => {
                Ok(Some(CrAction::DropUnmerged(DropUnmerged::new(self.clone()))))
            }
            (OpKind::Rm(rm), OpKind::Rm(other)) if other.old_name == rm.old_name => {
                Ok(Some(CrAction::DropUnmerged(DropUnmerged::new(self.clone()))))
            }
            (OpKind::Rm(_), _) => Ok(None),

            (OpKind::Rename(_), _) => Err(CrError::RenameConflictCheck(self.to_string())),

            // concurrent writes to one file are never merged
            (OpKind::Sync(so), OpKind::Sync(_)) => {
                let to_name = if so.keep_unmerged_tail_name {
                    unmerged_path.tail_name().to_string()
                } else {
                    renamer.conflict_rename(self, merged_path.tail_name()).await?
                };
                Ok(Some(CrAction::RenameUnmerged(RenameUnmerged {
                    from_name: unmerged_path.tail_name().to_string(),
                    to_name,
                    unmerged_parent_most_recent: unmerged_path.parent_pointer(),
                    merged_parent_most_recent: merged_path.parent_pointer(),
                    ..Default::default()
                })))
            }
            (OpKind::Sync(_), OpKind::SetAttr(_)) => {
                Ok(Some(CrAction::CopyUnmergedAttr(CopyUnmergedAttr::new(
                    unmerged_path.tail_name(),
                    merged_path.tail_name(),
                    vec![AttrChange::Size],
                ))))
            }
            (OpKind::Sync(_), _) => Ok(None),

            (OpKind::SetAttr(sao), OpKind::SetAttr(other)) if sao.attr == other.attr => {
                // a directory can't be renamed aside by copying, so it
                //  becomes a symlink to the merged entry instead
                let (sym_path, caused_by_attr) = if is_file {
                    (None, None)
                } else {
                    (Some(merged_path.tail_name().to_string()), Some(other.attr))
                };
                let to_name = if sao.keep_unmerged_tail_name {
                    unmerged_path.tail_name().to_string()
                } else {
                    renamer.conflict_rename(self, unmerged_path.tail_name()).await?
                };
                Ok(Some(CrAction::RenameUnmerged(RenameUnmerged {
                    from_name: unmerged_path.tail_name().to_string(),
                    to_name,
                    sym_path,
                    caused_by_attr,
                    unmerged_parent_most_recent: unmerged_path.parent_pointer(),
                    merged_parent_most_recent: merged_path.parent_pointer(),
                    ..Default::default()
                })))
            }
            (OpKind::SetAttr(_), _) => Ok(None),

            (OpKind::Resolution | OpKind::Rekey | OpKind::Gc(_), _) => Ok(None),
        }
    }

    /// What to do with this unmerged op when nothing in the merged
    ///  chain conflicts with it
    pub fn default_action(&self, unmerged_path: &CrPath, merged_path: &CrPath) -> Option<CrAction> {
        match &self.kind {
            OpKind::Create(co) if co.force_copy => Some(CrAction::RenameUnmerged(RenameUnmerged {
                from_name: co.new_name.clone(),
                to_name: co.new_name.clone(),
                sym_path: co.cr_sym_path.clone(),
                ..Default::default()
            })),
            OpKind::Create(co) => Some(CrAction::CopyUnmergedEntry(CopyUnmergedEntry::new(
                &co.new_name,
                &co.new_name,
                co.cr_sym_path.clone(),
                false,
            ))),
            OpKind::Rm(rm) if rm.drop_this => {
                Some(CrAction::DropUnmerged(DropUnmerged::new(self.clone())))
            }
            OpKind::Rm(rm) => Some(CrAction::RmMergedEntry(RmMergedEntry::new(&rm.old_name))),
            OpKind::Sync(_) => Some(CrAction::CopyUnmergedEntry(CopyUnmergedEntry::new(
                unmerged_path.tail_name(),
                merged_path.tail_name(),
                None,
                false,
            ))),
            OpKind::SetAttr(sao) => Some(CrAction::CopyUnmergedAttr(CopyUnmergedAttr::new(
                unmerged_path.tail_name(),
                merged_path.tail_name(),
                vec![sao.attr],
            ))),
            OpKind::Rename(_) | OpKind::Resolution | OpKind::Rekey | OpKind::Gc(_) => None,
        }
    }
}
