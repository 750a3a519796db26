//! Single-chunk copy and verification

use super::destination::{read_full, Destination};
use super::{ChunkResult, ChunkStatus};
use crate::chunk::ChunkSpec;
use crate::error::{Error, Result};
use crate::hash::{fast_digest, to_hex};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, error, warn};

/// Copy one chunk from `source` into `destination` and verify it
///
/// The chunk is read from the source, then written and read back from the
/// destination until the read-back digest matches, at most `max_attempts`
/// times. A persistent mismatch is returned as a `FailedAfterRetries`
/// result rather than an error. Only the chunk's own byte range of the
/// destination is touched.
///
/// # Errors
/// * `IoUnreadable` if the source cannot be read in full for this chunk
/// * `ShortRead` if the destination returns fewer bytes than were written
/// * `InvalidConfiguration` if `max_attempts` is 0
pub fn transfer_chunk(
    chunk: &ChunkSpec,
    source: &Path,
    destination: &dyn Destination,
    max_attempts: u32,
) -> Result<ChunkResult> {
    if max_attempts == 0 {
        return Err(Error::InvalidConfiguration(
            "At least one write attempt is required".to_string(),
        ));
    }

    let data = read_source(chunk, source)?;
    let source_digest = fast_digest(&data);
    let digest_hex = to_hex(&source_digest);

    let mut read_back = vec![0u8; chunk.length];

    for attempt in 1..=max_attempts {
        let n = destination.write_and_read_back(chunk.offset, &data, &mut read_back)?;
        if n != chunk.length {
            return Err(Error::ShortRead {
                index: chunk.index,
                expected: chunk.length,
                actual: n,
            });
        }

        if fast_digest(&read_back) == source_digest {
            debug!(
                "Chunk {} verified at offset {} (attempt {})",
                chunk.index, chunk.offset, attempt
            );
            return Ok(ChunkResult::new(chunk, digest_hex, ChunkStatus::Verified, attempt));
        }

        warn!(
            "Chunk {} read-back digest does not match source (attempt {}/{})",
            chunk.index, attempt, max_attempts
        );
    }

    error!(
        "Chunk {} at offset {} failed verification after {} attempts",
        chunk.index, chunk.offset, max_attempts
    );
    Ok(ChunkResult::new(
        chunk,
        digest_hex,
        ChunkStatus::FailedAfterRetries,
        max_attempts,
    ))
}

fn read_source(chunk: &ChunkSpec, source: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(source).map_err(|e| Error::unreadable(source, e))?;
    file.seek(SeekFrom::Start(chunk.offset))
        .map_err(|e| Error::unreadable(source, e))?;

    let mut data = vec![0u8; chunk.length];
    let n = read_full(&mut file, &mut data).map_err(|e| Error::unreadable(source, e))?;
    if n != chunk.length {
        return Err(Error::IoUnreadable {
            path: source.to_path_buf(),
            reason: format!(
                "chunk {} expected {} bytes at offset {}, got {}",
                chunk.index, chunk.length, chunk.offset, n
            ),
        });
    }

    Ok(data)
}
