//! Chunked transfer with read-back verification
//!
//! A transfer copies one source file to one destination file chunk by
//! chunk. Each chunk is written, flushed, read back and compared against
//! the source before it counts as done; the whole file is then compared
//! with a strong digest.

mod destination;
mod orchestrator;
mod worker;

pub use destination::{Destination, IsolationStrategy, PerChunkDestination, SharedDestination};
pub use orchestrator::{
    AccessPolicy, Orchestrator, ProgressCallback, TransferProgress, DEFAULT_MAX_CONCURRENT_CHUNKS,
};
pub use worker::transfer_chunk;

use crate::chunk::ChunkSpec;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default number of write/verify attempts per chunk
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Input of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    source: PathBuf,
    destination: PathBuf,
    file_size: u64,
    chunk_size: u64,
}

impl TransferRequest {
    /// Create a request for a source of known size
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        file_size: u64,
        chunk_size: u64,
    ) -> Result<Self> {
        let request = TransferRequest {
            source: source.into(),
            destination: destination.into(),
            file_size,
            chunk_size,
        };
        request.validate()?;
        Ok(request)
    }

    /// Create a request, taking the file size from the source's metadata
    pub fn for_source(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        chunk_size: u64,
    ) -> Result<Self> {
        let source = source.into();
        let metadata = std::fs::metadata(&source).map_err(|e| Error::unreadable(&source, e))?;
        if !metadata.is_file() {
            return Err(Error::IoUnreadable {
                path: source,
                reason: "not a regular file".to_string(),
            });
        }
        TransferRequest::new(source, destination, metadata.len(), chunk_size)
    }

    /// Check the request before any I/O happens
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfiguration(
                "Chunk size must be greater than 0".to_string(),
            ));
        }
        if crate::paths::same_file(&self.source, &self.destination) {
            return Err(Error::InvalidConfiguration(format!(
                "Destination {:?} is the same as the source",
                self.destination
            )));
        }
        Ok(())
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

/// Final state of one chunk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Read-back digest matched the source digest
    Verified,
    /// Digests still differed when the retry budget ran out
    FailedAfterRetries,
}

/// Per-chunk record produced by a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkResult {
    /// Chunk index in the plan
    pub index: u64,
    /// Byte offset of the chunk
    pub offset: u64,
    /// Chunk length in bytes
    pub length: usize,
    /// Fast digest of the source bytes (hex)
    pub digest: String,
    /// Verification outcome
    pub status: ChunkStatus,
    /// Number of write/verify attempts used
    pub attempts: u32,
}

impl ChunkResult {
    pub(crate) fn new(
        chunk: &ChunkSpec,
        digest: String,
        status: ChunkStatus,
        attempts: u32,
    ) -> Self {
        ChunkResult {
            index: chunk.index,
            offset: chunk.offset,
            length: chunk.length,
            digest,
            status,
            attempts,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == ChunkStatus::Verified
    }
}

impl fmt::Display for ChunkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}) position = {}, hash = {}", self.index, self.offset, self.digest)
    }
}

/// Whole-file SHA-256 digests of both sides (hex)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDigests {
    pub source: String,
    pub destination: String,
}

impl FileDigests {
    pub fn matches(&self) -> bool {
        self.source == self.destination
    }
}

/// Terminal artifact of one transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Whole-file digests, computed only when every chunk verified
    pub digests: Option<FileDigests>,
    /// Whether the whole-file digests are equal
    pub digests_match: bool,
    /// Per-chunk records, ordered by chunk index
    pub chunks: Vec<ChunkResult>,
    /// Overall success
    pub success: bool,
}

impl TransferOutcome {
    /// Chunks that exhausted their retry budget
    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkResult> {
        self.chunks.iter().filter(|c| !c.is_verified())
    }

    /// Total bytes covered by verified chunks
    pub fn verified_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.is_verified())
            .map(|c| c.length as u64)
            .sum()
    }

    /// Render the outcome as a pretty-printed JSON report
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize outcome: {}", e)))
    }

    /// Parse a report written by [`TransferOutcome::to_json`]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfiguration(format!("Invalid outcome report: {}", e)))
    }
}
