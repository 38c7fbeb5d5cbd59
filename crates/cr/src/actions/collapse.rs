use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::CrAction;

/// Keeps merged-side actions apart from unmerged ones with the same
///  subject name. Never a valid unmerged name.
pub const MERGED_ACTION_PREFIX: &str = ".crfs_merged_";

/// The actions for one merged directory, in the order detection
///  produced them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionList(pub Vec<CrAction>);

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: CrAction) {
        self.0.push(action);
    }

    pub fn extend(&mut self, other: ActionList) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CrAction> {
        self.0.iter()
    }

    /// Drop actions made irrelevant by later ones for the same name.
    ///  Per name, a rename of the unmerged entry beats a copy of it,
    ///  which beats copying its attributes; attribute copies merge.
    ///
    /// File actions must already have been moved into their parent
    ///  directory's list.
    pub fn collapse(self) -> ActionList {
        // subject name -> index of the action currently on top
        let mut top: BTreeMap<String, usize> = BTreeMap::new();
        let mut remove: BTreeSet<usize> = BTreeSet::new();
        let mut actions = self.0;

        for i in 0..actions.len() {
            let (name, outranked, merge_into) = {
                let action = &actions[i];
                let name = match action {
                    CrAction::RenameMerged(a) => format!("{}{}", MERGED_ACTION_PREFIX, a.from_name),
                    CrAction::RmMergedEntry(_) | CrAction::DropUnmerged(_) => continue,
                    other => other.subject_name().to_string(),
                };
                let current = top.get(&name).map(|j| (*j, &actions[*j]));
                match (action, current) {
                    (CrAction::CopyUnmergedEntry(_), Some((_, CrAction::RenameUnmerged(_)))) => {
                        (name, true, None)
                    }
                    (
                        CrAction::CopyUnmergedAttr(_),
                        Some((_, CrAction::RenameUnmerged(_) | CrAction::CopyUnmergedEntry(_))),
                    ) => (name, true, None),
                    (CrAction::CopyUnmergedAttr(_), Some((j, CrAction::CopyUnmergedAttr(_)))) => {
                        (name, true, Some(j))
                    }
                    _ => (name, false, None),
                }
            };

            if let Some(j) = merge_into {
                let attrs = match &actions[i] {
                    CrAction::CopyUnmergedAttr(a) => a.attrs.clone(),
                    _ => Vec::new(),
                };
                if let CrAction::CopyUnmergedAttr(top_action) = &mut actions[j] {
                    for attr in attrs {
                        if !top_action.attrs.contains(&attr) {
                            top_action.attrs.push(attr);
                        }
                    }
                }
            }

            if outranked {
                remove.insert(i);
            } else if let Some(prev) = top.insert(name, i) {
                remove.insert(prev);
            }
        }

        if remove.is_empty() {
            return ActionList(actions);
        }
        ActionList(
            actions
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !remove.contains(i))
                .map(|(_, action)| action)
                .collect(),
        )
    }
}

impl From<Vec<CrAction>> for ActionList {
    fn from(actions: Vec<CrAction>) -> Self {
        Self(actions)
    }
}

impl IntoIterator for ActionList {
    type Item = CrAction;
    type IntoIter = std::vec::IntoIter<CrAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ActionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, action) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", action)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{CopyUnmergedAttr, CopyUnmergedEntry, RenameMerged, RenameUnmerged};
    use crate::entry::AttrChange;

    #[test]
    fn test_rename_unmerged_wins() {
        let list = ActionList(vec![
            CrAction::CopyUnmergedAttr(CopyUnmergedAttr::new("a", "a", vec![AttrChange::Ex])),
            CrAction::CopyUnmergedEntry(CopyUnmergedEntry::new("a", "a", None, false)),
            CrAction::RenameUnmerged(RenameUnmerged::new("a", "a.conflict", None)),
            CrAction::CopyUnmergedEntry(CopyUnmergedEntry::new("b", "b", None, false)),
        ]);

        let collapsed = list.collapse();
        assert_eq!(collapsed.len(), 2);
        assert!(matches!(collapsed.0[0], CrAction::RenameUnmerged(_)));
        assert_eq!(collapsed.0[1].subject_name(), "b");
    }

    #[test]
    fn test_attrs_merge_in_first_appearance_order() {
        let list = ActionList(vec![
            CrAction::CopyUnmergedAttr(CopyUnmergedAttr::new("a", "a", vec![AttrChange::Mtime])),
            CrAction::CopyUnmergedAttr(CopyUnmergedAttr::new(
                "a",
                "a",
                vec![AttrChange::Ex, AttrChange::Mtime],
            )),
        ]);

        let collapsed = list.collapse();
        assert_eq!(collapsed.len(), 1);
        let CrAction::CopyUnmergedAttr(attr) = &collapsed.0[0] else {
            panic!("expected copyUnmergedAttr");
        };
        assert_eq!(attr.attrs, vec![AttrChange::Mtime, AttrChange::Ex]);
    }

    #[test]
    fn test_merged_renames_kept_apart() {
        let list = ActionList(vec![
            CrAction::RenameMerged(RenameMerged::new("a", "a.conflict", None)),
            CrAction::CopyUnmergedEntry(CopyUnmergedEntry::new("a", "a", None, false)),
        ]);
        assert_eq!(list.clone().collapse(), list);
    }
}
