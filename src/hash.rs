//! Chunk and whole-file digests
//!
//! Chunks are compared with BLAKE3, which is only used as a fast equality
//! check between two reads of the same data. Whole files are compared with
//! SHA-256, streamed so the file is never held in memory.

use crate::error::{Error, Result};
use ring::digest::{Context, SHA256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Length of a fast digest in bytes
pub const FAST_DIGEST_LEN: usize = blake3::OUT_LEN;

/// Read buffer used when streaming a file through the strong hash
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Fast digest of an in-memory buffer (may be empty)
pub fn fast_digest(data: &[u8]) -> [u8; FAST_DIGEST_LEN] {
    *blake3::hash(data).as_bytes()
}

/// SHA-256 of an in-memory buffer, rendered as hex
pub fn strong_digest_bytes(data: &[u8]) -> String {
    to_hex(ring::digest::digest(&SHA256, data).as_ref())
}

/// SHA-256 of a whole file, rendered as hex
///
/// Any failure to open or read the file is reported as `IoUnreadable`.
pub fn strong_digest<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| Error::unreadable(path, e))?;

    let mut context = Context::new(&SHA256);
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => context.update(&buffer[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::unreadable(path, e)),
        }
    }

    Ok(to_hex(context.finish().as_ref()))
}

/// Lowercase hex, two characters per byte, no separators
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
