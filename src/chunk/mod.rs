//! Chunk planning
//!
//! Splits a file of known size into fixed-size, disjoint byte ranges.
//! Chunks are plain descriptors and never own file bytes.

mod planner;

pub use planner::{chunk_count, plan};

use serde::{Deserialize, Serialize};

/// One contiguous byte range of the file being transferred
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChunkSpec {
    /// 0-based position in the plan
    pub index: u64,
    /// Byte offset in both source and destination
    pub offset: u64,
    /// Number of bytes in this chunk
    pub length: usize,
}

impl ChunkSpec {
    /// Offset one past the last byte of this chunk
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }

    /// Check whether two chunks share any byte
    pub fn overlaps(&self, other: &ChunkSpec) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}
