//! Fixed-size chunk planner
//!
//! Turns `(file_size, chunk_size)` into an ordered list of chunk
//! descriptors. Pure and deterministic; never touches the filesystem.

use super::ChunkSpec;
use crate::error::{Error, Result};

/// Number of chunks needed to cover `file_size` bytes
pub fn chunk_count(file_size: u64, chunk_size: u64) -> Result<u64> {
    if chunk_size == 0 {
        return Err(Error::InvalidConfiguration(
            "Chunk size must be greater than 0".to_string(),
        ));
    }
    Ok(file_size.div_ceil(chunk_size))
}

/// Split a file into fixed-size chunks
///
/// Every chunk is `chunk_size` bytes long except the last one, which holds
/// the remainder and is always in `(0, chunk_size]`. A zero-length file
/// yields no chunks.
pub fn plan(file_size: u64, chunk_size: u64) -> Result<Vec<ChunkSpec>> {
    let count = chunk_count(file_size, chunk_size)?;

    if usize::try_from(chunk_size).is_err() {
        return Err(Error::InvalidConfiguration(format!(
            "Chunk size {} does not fit in memory",
            chunk_size
        )));
    }

    let mut chunks = Vec::with_capacity(count as usize);
    for index in 0..count {
        let offset = index * chunk_size;
        let length = chunk_size.min(file_size - offset);
        chunks.push(ChunkSpec {
            index,
            offset,
            length: length as usize,
        });
    }

    Ok(chunks)
}
