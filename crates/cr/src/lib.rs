/**
 * Resolution actions: what to do in the merged tree
 *  for each unmerged change, and how to apply it.
 */
pub mod actions;
/**
 * Opaque block pointers and the old-to-new updates
 *  that tie a node's versions together.
 */
pub mod block;
/**
 * Per-node op histories for one branch, and the
 *  registry that indexes them both ways.
 */
pub mod chains;
pub mod config;
/**
 * Conflict detection over a pair of registries,
 *  producing per-directory action lists.
 */
pub mod detect;
pub mod entry;
pub mod error;
/**
 * The op log model: what a branch did,
 *  op by op, and how ops conflict.
 */
pub mod ops;
pub mod path;
/**
 * Collaborator contracts. Everything that touches
 *  storage goes through one of these.
 */
pub mod provider;
pub mod rename;
/**
 * In-memory collaborators for tests.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::actions::{apply_actions, ActionList, ApplyEnv, CrAction};
    pub use crate::block::{BlockPointer, BlockUpdate, Revision};
    pub use crate::chains::{Chain, ChainRegistry, FinalPaths, PathDiscovery, RevisionBatch};
    pub use crate::config::CrConfig;
    pub use crate::detect::{collapse_actions, compute_actions, ActionMap, MergedPaths};
    pub use crate::entry::{AttrChange, DirEntry, EntryType};
    pub use crate::error::{CrError, Result};
    pub use crate::ops::{Op, OpKind, WriterInfo};
    pub use crate::path::CrPath;
    pub use crate::provider::{BlockTypeResolver, ContentCopier, DirectoryAccessor, PathSearch};
    pub use crate::rename::{ConflictRenamer, DateConflictRenamer};
}
