//! chunkcopy - Chunked file copy with read-back verification
//!
//! This library copies one file to another in fixed-size chunks. Every
//! chunk is read back from the destination and compared against the source
//! before it counts as copied, and the finished file is checked with a
//! whole-file SHA-256 comparison.

pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod paths;
pub mod transfer;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::transfer::{
        AccessPolicy, ChunkResult, ChunkStatus, Orchestrator, TransferOutcome, TransferRequest,
    };
}
