//! Per-node op chains
//!
//! A branch's op log is regrouped into one [`Chain`] per node that
//! changed, each following the node from the pointer it had when the
//! branch diverged to the pointer it has now. Renames are split into
//! a remove in the source directory and a create in the destination,
//! so every op lives in exactly one chain. The [`ChainRegistry`] owns
//! all chains of one branch and the bookkeeping that goes with them.

mod chain;
mod paths;
mod registry;

pub use chain::{Chain, ChainId, NodeType};
pub use paths::{FinalPaths, PathDiscovery};
pub use registry::{ChainRegistry, ChainSummary, RenameInfo, RevisionBatch};
