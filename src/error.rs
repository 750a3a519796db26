//! Error types for chunkcopy

use crate::transfer::TransferOutcome;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using chunkcopy's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning, copying or verifying a transfer
#[derive(Debug, Error)]
pub enum Error {
    /// Non-positive chunk size or an otherwise malformed request
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A file could not be opened, or returned fewer bytes than planned
    #[error("Cannot read {}: {reason}", .path.display())]
    IoUnreadable { path: PathBuf, reason: String },

    /// Destination read-back returned fewer bytes than were just written
    #[error("Short read-back on chunk {index}: expected {expected} bytes, got {actual}")]
    ShortRead {
        index: u64,
        expected: usize,
        actual: usize,
    },

    /// Whole-file digests differ although every chunk verified
    #[error("The files do not match: {}", mismatch_summary(.0))]
    Mismatch(Box<TransferOutcome>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an `IoUnreadable` error from an I/O failure on `path`
    pub fn unreadable(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Error::IoUnreadable {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

fn mismatch_summary(outcome: &TransferOutcome) -> String {
    match &outcome.digests {
        Some(d) => format!("source {} != destination {}", d.source, d.destination),
        None => "whole-file digests unavailable".to_string(),
    }
}
