use std::fmt;

use serde::{Deserialize, Serialize};

/// A byte interval written to a file, or a truncation point when
///  `len` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WriteRange {
    pub off: u64,
    pub len: u64,
}

impl WriteRange {
    pub fn write(off: u64, len: u64) -> Self {
        Self { off, len }
    }

    pub fn truncate(off: u64) -> Self {
        Self { off, len: 0 }
    }

    pub fn is_truncate(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte written. Truncates have no end, so
    ///  this is only meaningful for writes.
    pub fn end(&self) -> u64 {
        debug_assert!(!self.is_truncate(), "truncates don't have an end");
        self.off + self.len
    }

    /// Whether the regions touched by `self` and `other` overlap:
    ///  two writes that overlap or touch, a truncate that lands
    ///  inside or before a write, or two truncates.
    pub fn affects(&self, other: &WriteRange) -> bool {
        match (self.is_truncate(), other.is_truncate()) {
            (true, true) => true,
            (true, false) => other.end() > self.off,
            (false, true) => self.end() > other.off,
            (false, false) => {
                (self.off <= other.end() && other.end() <= self.end())
                    || (other.off <= self.end() && self.end() <= other.end())
            }
        }
    }
}

impl fmt::Display for WriteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_truncate() {
            write!(f, "{{trunc@{}}}", self.off)
        } else {
            write!(f, "{{{}+{}}}", self.off, self.len)
        }
    }
}

/// Merge a new write with the head and tail of the already-collapsed
///  writes it affects. A trailing truncate in `existing` survives,
///  moved to the end of the merged write.
fn coalesce_writes(existing: &[WriteRange], new: WriteRange) -> Vec<WriteRange> {
    let (Some(old_head), Some(old_tail)) = (existing.first(), existing.last()) else {
        return vec![new];
    };

    let mut new_off = new.off;
    let mut new_end = new.end();
    if !old_tail.is_truncate() && old_tail.end() > new_end {
        new_end = old_tail.end();
    }
    if !old_head.is_truncate() && old_head.off < new_off {
        new_off = old_head.off;
    }

    let mut ret = vec![WriteRange::write(new_off, new_end - new_off)];
    if old_tail.is_truncate() {
        ret.push(WriteRange::truncate(new_end));
    }
    ret
}

/// Fold `new` into `writes`, which must already be collapsed: a
///  sequence of non-overlapping writes with strictly increasing
///  offsets and maybe one trailing truncate beyond them.
pub fn add_to_collapsed_write_range(
    mut writes: Vec<WriteRange>,
    new: WriteRange,
) -> Vec<WriteRange> {
    // head: the prefix that sits before `new` and is untouched by it
    let head_end = writes
        .iter()
        .position(|old| old.off >= new.off || new.affects(old))
        .unwrap_or(writes.len());

    if new.is_truncate() {
        // a truncate affects the whole suffix, so there is no tail
        let mid = writes.split_off(head_end);
        let mut head = writes;
        match mid.first() {
            None => head.push(new),
            Some(first) if first.is_truncate() => {
                if first.off < new.off {
                    // growing past an earlier truncate zero-fills the gap
                    let zero_len = new.off - first.off;
                    match head.last_mut() {
                        Some(last) if last.off + last.len == first.off => {
                            last.len += zero_len;
                        }
                        _ => head.push(WriteRange::write(first.off, zero_len)),
                    }
                }
                head.push(new);
            }
            Some(first) if first.off < new.off => {
                // keep the part of the write that precedes the cut
                head.push(WriteRange::write(first.off, new.off - first.off));
                head.push(new);
            }
            Some(_) => head.push(new),
        }
        return head;
    }

    let mid_end = writes[head_end..]
        .iter()
        .position(|old| !new.affects(old))
        .map(|i| head_end + i)
        .unwrap_or(writes.len());

    let tail = writes.split_off(mid_end);
    let mid = writes.split_off(head_end);
    let mut head = writes;
    head.extend(coalesce_writes(&mid, new));
    head.extend(tail);
    head
}

/// Fold every range in `new_writes`, in order, into `existing`
pub fn collapse_write_range(
    existing: Vec<WriteRange>,
    new_writes: &[WriteRange],
) -> Vec<WriteRange> {
    new_writes
        .iter()
        .fold(existing, |acc, w| add_to_collapsed_write_range(acc, *w))
}

/// Two collapsed sequences describe the same end state only if
///  neither wrote anything, or both are the same lone truncate.
///  Anything else is treated as divergent.
pub fn write_ranges_equivalent(a: &[WriteRange], b: &[WriteRange]) -> bool {
    match (a, b) {
        ([], []) => true,
        ([x], [y]) => x.is_truncate() && y.is_truncate() && x.off == y.off,
        _ => false,
    }
}
