use std::fmt;

use serde::{Deserialize, Serialize};

use crate::block::BlockPointer;

/// One step of a path: the node's pointer and the name its parent
///  knows it by. The root's name is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    pub ptr: BlockPointer,
    pub name: String,
}

impl PathNode {
    pub fn new(ptr: BlockPointer, name: impl Into<String>) -> Self {
        Self {
            ptr,
            name: name.into(),
        }
    }
}

/// A root-to-node path through one branch of the tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrPath {
    nodes: Vec<PathNode>,
}

impl CrPath {
    pub fn root(ptr: BlockPointer) -> Self {
        Self {
            nodes: vec![PathNode::new(ptr, "")],
        }
    }

    pub fn from_nodes(nodes: Vec<PathNode>) -> Self {
        Self { nodes }
    }

    /* Getters */

    pub fn nodes(&self) -> &[PathNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn tail_name(&self) -> &str {
        self.nodes.last().map(|n| n.name.as_str()).unwrap_or("")
    }

    pub fn tail_pointer(&self) -> BlockPointer {
        self.nodes.last().map(|n| n.ptr).unwrap_or_default()
    }

    /// The path of the parent directory, if this path has one
    pub fn parent_path(&self) -> Option<CrPath> {
        if self.nodes.len() < 2 {
            return None;
        }
        Some(Self {
            nodes: self.nodes[..self.nodes.len() - 1].to_vec(),
        })
    }

    /// Pointer of the immediate parent, if there is one
    pub fn parent_pointer(&self) -> Option<BlockPointer> {
        let len = self.nodes.len();
        if len < 2 {
            return None;
        }
        Some(self.nodes[len - 2].ptr)
    }

    pub fn child_path(&self, name: impl Into<String>, ptr: BlockPointer) -> CrPath {
        let mut nodes = self.nodes.clone();
        nodes.push(PathNode::new(ptr, name));
        Self { nodes }
    }

    /// Replace the pointer of the final node, keeping its name
    pub fn with_tail_pointer(mut self, ptr: BlockPointer) -> Self {
        if let Some(last) = self.nodes.last_mut() {
            last.ptr = ptr;
        }
        self
    }
}

impl fmt::Display for CrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nodes.len() <= 1 {
            return write!(f, "/");
        }
        for node in &self.nodes[1..] {
            write!(f, "/{}", node.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr(tag: &str) -> BlockPointer {
        BlockPointer::from_content(tag.as_bytes())
    }

    #[test]
    fn test_child_and_parent() {
        let root = CrPath::root(ptr("root"));
        let dir = root.child_path("a", ptr("a"));
        let file = dir.child_path("b.txt", ptr("b"));

        assert_eq!(file.len(), 3);
        assert_eq!(file.tail_name(), "b.txt");
        assert_eq!(file.tail_pointer(), ptr("b"));
        assert_eq!(file.parent_pointer(), Some(ptr("a")));
        assert_eq!(file.parent_path(), Some(dir));
        assert_eq!(file.to_string(), "/a/b.txt");

        assert!(root.parent_path().is_none());
        assert!(root.parent_pointer().is_none());
        assert_eq!(root.to_string(), "/");
    }

    #[test]
    fn test_empty_path() {
        let path = CrPath::default();
        assert!(!path.is_valid());
        assert_eq!(path.tail_name(), "");
        assert!(!path.tail_pointer().is_initialized());
    }
}
