//! Destination file access
//!
//! Many chunk workers write to the same destination file. Whatever the
//! strategy, the read-back that follows a chunk's write must observe that
//! chunk's own bytes and never another chunk's in-flight write.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Destination that can write a chunk and read it straight back
pub trait Destination: Send + Sync {
    /// Write `data` at `offset`, flush, then read the same range back into
    /// `read_back`
    ///
    /// Returns the number of bytes read back, which is less than
    /// `read_back.len()` only when the file ended early.
    fn write_and_read_back(&self, offset: u64, data: &[u8], read_back: &mut [u8])
        -> io::Result<usize>;
}

/// How concurrent chunk workers share the destination file
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationStrategy {
    /// One handle; each chunk's write + read-back runs under a mutex
    #[default]
    SharedHandle,
    /// Every chunk opens its own read-write handle
    PerChunkHandle,
}

impl IsolationStrategy {
    /// Create or open the destination and wrap it for this strategy
    ///
    /// With `truncate` set, any previous content is discarded and the file
    /// is sized to `file_size` up front.
    pub fn open(self, path: &Path, file_size: u64, truncate: bool) -> Result<Arc<dyn Destination>> {
        let file = prepare(path, file_size, truncate)?;
        let destination: Arc<dyn Destination> = match self {
            IsolationStrategy::SharedHandle => Arc::new(SharedDestination::new(file)),
            IsolationStrategy::PerChunkHandle => {
                drop(file);
                Arc::new(PerChunkDestination::new(path))
            }
        };
        Ok(destination)
    }
}

impl FromStr for IsolationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" | "shared-handle" => Ok(IsolationStrategy::SharedHandle),
            "per-chunk" | "per-chunk-handle" => Ok(IsolationStrategy::PerChunkHandle),
            other => Err(Error::InvalidConfiguration(format!(
                "Unknown isolation strategy: {}",
                other
            ))),
        }
    }
}

/// Single destination handle guarded by a mutex
pub struct SharedDestination {
    file: Mutex<File>,
}

impl SharedDestination {
    pub fn new(file: File) -> Self {
        SharedDestination {
            file: Mutex::new(file),
        }
    }
}

impl Destination for SharedDestination {
    fn write_and_read_back(
        &self,
        offset: u64,
        data: &[u8],
        read_back: &mut [u8],
    ) -> io::Result<usize> {
        let mut file = self.file.lock();
        write_then_read(&mut *file, offset, data, read_back)
    }
}

/// Destination opened afresh for every chunk
pub struct PerChunkDestination {
    path: PathBuf,
}

impl PerChunkDestination {
    pub fn new(path: &Path) -> Self {
        PerChunkDestination {
            path: path.to_path_buf(),
        }
    }
}

impl Destination for PerChunkDestination {
    fn write_and_read_back(
        &self,
        offset: u64,
        data: &[u8],
        read_back: &mut [u8],
    ) -> io::Result<usize> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        write_then_read(&mut file, offset, data, read_back)
    }
}

fn prepare(path: &Path, file_size: u64, truncate: bool) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path)?;

    if truncate {
        file.set_len(file_size)?;
    }

    Ok(file)
}

fn write_then_read<F: Read + Write + Seek>(
    file: &mut F,
    offset: u64,
    data: &[u8],
    read_back: &mut [u8],
) -> io::Result<usize> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    file.flush()?;

    file.seek(SeekFrom::Start(offset))?;
    read_full(file, read_back)
}

/// Read until `buf` is full or the reader hits end-of-file
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
