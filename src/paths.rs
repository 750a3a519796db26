//! Source and destination path resolution
//!
//! The destination is given as a directory; the copied file keeps the
//! source's file name inside it.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Check that `source` names an existing regular file
pub fn validate_source(source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(Error::InvalidPath(format!(
            "The file {:?} doesn't exist",
            source
        )));
    }
    Ok(source.to_path_buf())
}

/// Build the destination file path for `source` inside `destination_dir`
///
/// Fails if the directory does not exist or if the result would be the
/// source file itself.
pub fn resolve_destination(source: &Path, destination_dir: &Path) -> Result<PathBuf> {
    if !destination_dir.is_dir() {
        return Err(Error::InvalidPath(format!(
            "Destination folder {:?} does not exist",
            destination_dir
        )));
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| Error::InvalidPath(format!("{:?} has no file name", source)))?;

    let destination = destination_dir.join(file_name);
    if same_file(source, &destination) {
        return Err(Error::InvalidPath(
            "The destination file path cannot be the same as the source file path".to_string(),
        ));
    }

    Ok(destination)
}

/// Whether `a` and `b` name the same file once both are resolved
pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
