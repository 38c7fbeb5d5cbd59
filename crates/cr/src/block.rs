use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CrError, Result};

pub const POINTER_SIZE: usize = 32;

/// Opaque identifier for one version of a node.
///
/// Every mutation of a node produces a new pointer, so the same node
///  is reachable under many pointers over its lifetime on a branch.
///  The all-zero pointer means "unset".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockPointer([u8; POINTER_SIZE]);

impl BlockPointer {
    pub const ZERO: BlockPointer = BlockPointer([0u8; POINTER_SIZE]);

    pub fn from_bytes(bytes: [u8; POINTER_SIZE]) -> Self {
        Self(bytes)
    }

    /// Derive a pointer from block content
    pub fn from_content(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let mut buff = [0; POINTER_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("block pointer hex decode error"))?;
        Ok(Self(buff))
    }

    /* Getters */

    pub fn as_bytes(&self) -> &[u8; POINTER_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_initialized(&self) -> bool {
        *self != Self::ZERO
    }
}

impl From<[u8; POINTER_SIZE]> for BlockPointer {
    fn from(bytes: [u8; POINTER_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is plenty for logs
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPointer({})", self)
    }
}

/// A metadata revision number
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// An old-identity to new-identity transition for one node.
///
/// Ops are often built knowing only the old pointer; the new one is
///  filled in later via `Op::add_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockUpdate {
    pub old: BlockPointer,
    pub new: BlockPointer,
}

impl BlockUpdate {
    /// Build a complete update, rejecting unset pointers on either side
    pub fn new(old: BlockPointer, new: BlockPointer) -> Result<Self> {
        let update = Self { old, new };
        update.check_valid()?;
        Ok(update)
    }

    /// An update that only knows its old pointer so far
    pub fn pending(old: BlockPointer) -> Self {
        Self {
            old,
            new: BlockPointer::ZERO,
        }
    }

    pub fn check_valid(&self) -> Result<()> {
        if !self.old.is_initialized() {
            return Err(CrError::InvalidUpdate(format!(
                "old pointer unset (new = {})",
                self.new
            )));
        }
        if !self.new.is_initialized() {
            return Err(CrError::InvalidUpdate(format!(
                "new pointer unset (old = {})",
                self.old
            )));
        }
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.old.is_initialized()
    }

    /// The same transition, backwards
    pub fn reversed(&self) -> Self {
        Self {
            old: self.new,
            new: self.old,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_and_short_display() {
        let ptr = BlockPointer::from_content(b"some block");
        let parsed = BlockPointer::from_hex(&ptr.to_hex()).unwrap();
        assert_eq!(parsed, ptr);
        assert_eq!(ptr.to_string().len(), 16);
    }

    #[test]
    fn test_update_requires_both_sides() {
        let a = BlockPointer::from_content(b"a");
        let b = BlockPointer::from_content(b"b");

        assert!(BlockUpdate::new(a, b).is_ok());
        assert!(matches!(
            BlockUpdate::new(BlockPointer::ZERO, b),
            Err(CrError::InvalidUpdate(_))
        ));
        assert!(matches!(
            BlockUpdate::new(a, BlockPointer::ZERO),
            Err(CrError::InvalidUpdate(_))
        ));
        assert!(BlockUpdate::pending(a).check_valid().is_err());
    }

    #[test]
    fn test_reversed() {
        let a = BlockPointer::from_content(b"a");
        let b = BlockPointer::from_content(b"b");
        let update = BlockUpdate::new(a, b).unwrap().reversed();
        assert_eq!(update.old, b);
        assert_eq!(update.new, a);
    }
}
