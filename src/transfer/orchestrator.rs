//! Transfer orchestration
//!
//! Plans the chunks of a request, runs the chunk workers with bounded
//! concurrency, and finishes with a whole-file digest comparison.

use super::destination::{Destination, IsolationStrategy};
use super::worker::transfer_chunk;
use super::{ChunkResult, FileDigests, TransferOutcome, TransferRequest, DEFAULT_MAX_ATTEMPTS};
use crate::chunk;
use crate::error::{Error, Result};
use crate::hash::strong_digest;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of chunks processed at the same time
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 4;

/// How a transfer may use the destination file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Upper bound on chunks in flight
    pub max_concurrent_chunks: usize,
    /// How workers share the destination
    pub isolation: IsolationStrategy,
    /// Write/verify attempts per chunk before it is declared failed
    pub max_attempts: u32,
    /// Discard existing destination content before copying
    pub truncate_destination: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy {
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            isolation: IsolationStrategy::SharedHandle,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            truncate_destination: true,
        }
    }
}

impl AccessPolicy {
    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_chunks == 0 {
            return Err(Error::InvalidConfiguration(
                "At least one concurrent chunk is required".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfiguration(
                "At least one write attempt is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Progress information reported after each chunk completes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Number of chunks in the plan
    pub total_chunks: u64,
    /// Chunks that finished, verified or not
    pub completed_chunks: u64,
    /// Chunks that exhausted their retry budget
    pub failed_chunks: u64,
    /// Bytes in verified chunks
    pub bytes_verified: u64,
}

impl TransferProgress {
    /// Get progress as percentage (0 to 100)
    pub fn progress_percent(&self) -> u8 {
        if self.total_chunks == 0 {
            return 100;
        }
        (self.completed_chunks * 100 / self.total_chunks) as u8
    }
}

/// Type alias for progress callback
pub type ProgressCallback = Box<dyn Fn(&TransferProgress) + Send + Sync>;

/// Drives chunk workers for one transfer at a time
pub struct Orchestrator {
    policy: AccessPolicy,
    progress_callback: Option<ProgressCallback>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given access policy
    pub fn new(policy: AccessPolicy) -> Self {
        Orchestrator {
            policy,
            progress_callback: None,
        }
    }

    /// Report progress to `callback` after every chunk
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Get the access policy
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Copy and verify `request.source()` into `request.destination()`
    ///
    /// Returns an unsuccessful outcome when a chunk fails verification, and
    /// `Error::Mismatch` when every chunk verified but the whole files
    /// still differ.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome> {
        self.preflight(request)?;

        let destination = self.policy.isolation.open(
            request.destination(),
            request.file_size(),
            self.policy.truncate_destination,
        )?;

        self.run(request, destination).await
    }

    /// Like [`Orchestrator::transfer`], writing through an already opened
    /// destination
    pub async fn transfer_with_destination(
        &self,
        request: &TransferRequest,
        destination: Arc<dyn Destination>,
    ) -> Result<TransferOutcome> {
        self.preflight(request)?;
        self.run(request, destination).await
    }

    fn preflight(&self, request: &TransferRequest) -> Result<()> {
        request.validate()?;
        self.policy.validate()?;
        std::fs::File::open(request.source()).map_err(|e| Error::unreadable(request.source(), e))?;
        Ok(())
    }

    async fn run(
        &self,
        request: &TransferRequest,
        destination: Arc<dyn Destination>,
    ) -> Result<TransferOutcome> {
        let plan = chunk::plan(request.file_size(), request.chunk_size())?;

        info!(
            "Transferring {:?} -> {:?}: {} bytes in {} chunks of {} bytes",
            request.source(),
            request.destination(),
            request.file_size(),
            plan.len(),
            request.chunk_size()
        );

        let mut progress = TransferProgress {
            total_chunks: plan.len() as u64,
            ..Default::default()
        };

        let source = Arc::new(request.source().to_path_buf());
        let max_attempts = self.policy.max_attempts;

        let mut completions = stream::iter(plan)
            .map(|chunk| {
                let source = Arc::clone(&source);
                let destination = Arc::clone(&destination);
                async move {
                    let result = tokio::task::spawn_blocking(move || {
                        transfer_chunk(&chunk, &source, destination.as_ref(), max_attempts)
                    })
                    .await
                    .map_err(|e| {
                        Error::Internal(format!("Chunk {} worker failed: {}", chunk.index, e))
                    })
                    .and_then(|r| r);
                    (chunk.index, result)
                }
            })
            .buffer_unordered(self.policy.max_concurrent_chunks);

        let mut results: Vec<(u64, Result<ChunkResult>)> = Vec::new();
        while let Some((index, result)) = completions.next().await {
            progress.completed_chunks += 1;
            match &result {
                Ok(done) if done.is_verified() => progress.bytes_verified += done.length as u64,
                Ok(_) => progress.failed_chunks += 1,
                Err(e) => debug!("Chunk {} aborted: {}", index, e),
            }
            if let Some(ref cb) = self.progress_callback {
                cb(&progress);
            }
            results.push((index, result));
        }
        drop(completions);
        drop(destination);

        results.sort_by_key(|(index, _)| *index);

        let mut chunks = Vec::with_capacity(results.len());
        for (_, result) in results {
            chunks.push(result?);
        }

        if progress.failed_chunks > 0 {
            warn!(
                "Transfer incomplete: {}/{} chunks failed verification",
                progress.failed_chunks, progress.total_chunks
            );
            return Ok(TransferOutcome {
                digests: None,
                digests_match: false,
                chunks,
                success: false,
            });
        }

        let (source_digest, destination_digest) = tokio::join!(
            digest_file(request.source().to_path_buf()),
            digest_file(request.destination().to_path_buf())
        );
        let digests = FileDigests {
            source: source_digest?,
            destination: destination_digest?,
        };

        info!("Source SHA256: {}", digests.source);
        info!("Destination SHA256: {}", digests.destination);

        let digests_match = digests.matches();
        let outcome = TransferOutcome {
            digests: Some(digests),
            digests_match,
            chunks,
            success: digests_match,
        };

        if !digests_match {
            return Err(Error::Mismatch(Box::new(outcome)));
        }

        info!("Transfer verified: {} chunks", outcome.chunks.len());
        Ok(outcome)
    }
}

async fn digest_file(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || strong_digest(&path))
        .await
        .map_err(|e| Error::Internal(format!("Digest task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::strong_digest_bytes;
    use crate::transfer::ChunkStatus;
    use rand::RngCore;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Corrupts every read-back of the chunk starting at `offset`
    struct CorruptAt {
        inner: Arc<dyn Destination>,
        offset: u64,
        hits: AtomicUsize,
    }

    impl Destination for CorruptAt {
        fn write_and_read_back(
            &self,
            offset: u64,
            data: &[u8],
            read_back: &mut [u8],
        ) -> io::Result<usize> {
            let n = self.inner.write_and_read_back(offset, data, read_back)?;
            if offset == self.offset {
                self.hits.fetch_add(1, Ordering::SeqCst);
                read_back[0] = read_back[0].wrapping_add(1);
            }
            Ok(n)
        }
    }

    /// Tracks the highest number of simultaneous writers
    struct ConcurrencyTracker {
        inner: Arc<dyn Destination>,
        active: AtomicU64,
        peak: AtomicU64,
    }

    impl Destination for ConcurrencyTracker {
        fn write_and_read_back(
            &self,
            offset: u64,
            data: &[u8],
            read_back: &mut [u8],
        ) -> io::Result<usize> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            let result = self.inner.write_and_read_back(offset, data, read_back);
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn random_file(dir: &TempDir, name: &str, size: usize) -> (std::path::PathBuf, Vec<u8>) {
        let mut data = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut data);
        let path = dir.path().join(name);
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }

    fn request(source: &Path, dest: &Path, chunk_size: u64) -> TransferRequest {
        TransferRequest::for_source(source, dest, chunk_size).unwrap()
    }

    #[tokio::test]
    async fn test_transfer_copies_and_verifies() {
        let dir = TempDir::new().unwrap();
        let (source, data) = random_file(&dir, "source.bin", 51225);
        let dest = dir.path().join("dest.bin");

        let outcome = Orchestrator::new(AccessPolicy::default())
            .transfer(&request(&source, &dest, 1024))
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.digests_match);
        assert_eq!(outcome.chunks.len(), 51);
        assert_eq!(outcome.chunks.last().unwrap().length, 25);
        assert!(outcome.chunks.iter().all(|c| c.status == ChunkStatus::Verified));
        assert_eq!(std::fs::read(&dest).unwrap(), data);

        let digests = outcome.digests.unwrap();
        assert_eq!(digests.source, strong_digest_bytes(&data));
        assert_eq!(digests.source, digests.destination);
    }

    #[tokio::test]
    async fn test_results_ordered_by_index() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "source.bin", 40_000);
        let dest = dir.path().join("dest.bin");
        let policy = AccessPolicy {
            max_concurrent_chunks: 8,
            isolation: IsolationStrategy::PerChunkHandle,
            ..Default::default()
        };

        let outcome = Orchestrator::new(policy)
            .transfer(&request(&source, &dest, 1000))
            .await
            .unwrap();

        let indices: Vec<u64> = outcome.chunks.iter().map(|c| c.index).collect();
        let expected: Vec<u64> = (0..40).collect();
        assert_eq!(indices, expected);
    }

    #[tokio::test]
    async fn test_round_trip_various_sizes() {
        let dir = TempDir::new().unwrap();
        let cases = [
            (1usize, 1u64),
            (17, 4),
            (4096, 1024),
            (4097, 1024),
            (10_000, 7777),
            (3, 8192),
        ];

        for (i, (size, chunk_size)) in cases.iter().enumerate() {
            let (source, data) = random_file(&dir, &format!("source_{}.bin", i), *size);
            let dest = dir.path().join(format!("dest_{}.bin", i));

            let outcome = Orchestrator::new(AccessPolicy::default())
                .transfer(&request(&source, &dest, *chunk_size))
                .await
                .unwrap();

            assert!(outcome.success, "size {} chunk {}", size, chunk_size);
            assert_eq!(std::fs::read(&dest).unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_empty_file_trivially_succeeds() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "empty.bin", 0);
        let dest = dir.path().join("dest.bin");

        let outcome = Orchestrator::new(AccessPolicy::default())
            .transfer(&request(&source, &dest, 1024))
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.chunks.is_empty());
        assert!(dest.exists());
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_transfer_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "source.bin", 9000);
        let dest = dir.path().join("dest.bin");
        let orchestrator = Orchestrator::new(AccessPolicy::default());
        let req = request(&source, &dest, 2048);

        let first = orchestrator.transfer(&req).await.unwrap();
        let second = orchestrator.transfer(&req).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_isolation_strategies_agree() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "source.bin", 20_000);

        let mut outcomes = Vec::new();
        for (name, isolation) in [
            ("shared.bin", IsolationStrategy::SharedHandle),
            ("per_chunk.bin", IsolationStrategy::PerChunkHandle),
        ] {
            let policy = AccessPolicy {
                isolation,
                ..Default::default()
            };
            let outcome = Orchestrator::new(policy)
                .transfer(&request(&source, &dir.path().join(name), 1500))
                .await
                .unwrap();
            outcomes.push(outcome);
        }

        assert_eq!(outcomes[0], outcomes[1]);
    }

    #[tokio::test]
    async fn test_persistent_corruption_fails_one_chunk() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "source.bin", 5000);
        let dest = dir.path().join("dest.bin");
        let req = request(&source, &dest, 1024);

        let corrupt = Arc::new(CorruptAt {
            inner: IsolationStrategy::SharedHandle.open(&dest, 5000, true).unwrap(),
            offset: 2048,
            hits: AtomicUsize::new(0),
        });

        let outcome = Orchestrator::new(AccessPolicy::default())
            .transfer_with_destination(&req, corrupt.clone())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(!outcome.digests_match);
        assert!(outcome.digests.is_none());
        assert_eq!(corrupt.hits.load(Ordering::SeqCst), 3);

        let failed: Vec<_> = outcome.failed_chunks().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 2);
        assert_eq!(failed[0].status, ChunkStatus::FailedAfterRetries);
        assert_eq!(failed[0].attempts, 3);

        let verified = outcome.chunks.iter().filter(|c| c.is_verified()).count();
        assert_eq!(verified, 4);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "source.bin", 64 * 256);
        let dest = dir.path().join("dest.bin");
        let req = request(&source, &dest, 256);

        let tracker = Arc::new(ConcurrencyTracker {
            inner: IsolationStrategy::PerChunkHandle
                .open(&dest, 64 * 256, true)
                .unwrap(),
            active: AtomicU64::new(0),
            peak: AtomicU64::new(0),
        });
        let policy = AccessPolicy {
            max_concurrent_chunks: 3,
            isolation: IsolationStrategy::PerChunkHandle,
            ..Default::default()
        };

        let outcome = Orchestrator::new(policy)
            .transfer_with_destination(&req, tracker.clone())
            .await
            .unwrap();

        assert!(outcome.success);
        let peak = tracker.peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak concurrency {}", peak);
    }

    #[tokio::test]
    async fn test_stale_destination_without_truncate_mismatches() {
        let dir = TempDir::new().unwrap();
        let (source, data) = random_file(&dir, "source.bin", 3000);
        let dest = dir.path().join("dest.bin");
        std::fs::write(&dest, vec![0xAAu8; 5000]).unwrap();

        let policy = AccessPolicy {
            truncate_destination: false,
            ..Default::default()
        };
        let result = Orchestrator::new(policy)
            .transfer(&request(&source, &dest, 1024))
            .await;

        match result {
            Err(Error::Mismatch(outcome)) => {
                assert!(!outcome.success);
                assert!(!outcome.digests_match);
                assert!(outcome.chunks.iter().all(|c| c.is_verified()));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
        assert_eq!(&std::fs::read(&dest).unwrap()[..3000], &data[..]);
    }

    #[tokio::test]
    async fn test_stale_destination_with_truncate_succeeds() {
        let dir = TempDir::new().unwrap();
        let (source, data) = random_file(&dir, "source.bin", 3000);
        let dest = dir.path().join("dest.bin");
        std::fs::write(&dest, vec![0xAAu8; 5000]).unwrap();

        let outcome = Orchestrator::new(AccessPolicy::default())
            .transfer(&request(&source, &dest, 1024))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn test_progress_reported_per_chunk() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "source.bin", 10_000);
        let dest = dir.path().join("dest.bin");
        let calls = Arc::new(AtomicU64::new(0));
        let last = Arc::new(parking_lot::Mutex::new(TransferProgress::default()));

        let calls_cb = Arc::clone(&calls);
        let last_cb = Arc::clone(&last);
        let orchestrator = Orchestrator::new(AccessPolicy::default()).with_progress(Box::new(
            move |p: &TransferProgress| {
                calls_cb.fetch_add(1, Ordering::SeqCst);
                *last_cb.lock() = p.clone();
            },
        ));

        orchestrator
            .transfer(&request(&source, &dest, 1024))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        let last = last.lock();
        assert_eq!(last.completed_chunks, 10);
        assert_eq!(last.bytes_verified, 10_000);
        assert_eq!(last.progress_percent(), 100);
    }

    #[tokio::test]
    async fn test_missing_source_aborts_before_work() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.bin");
        let req = TransferRequest::new(dir.path().join("missing.bin"), &dest, 100, 10).unwrap();

        let result = Orchestrator::new(AccessPolicy::default()).transfer(&req).await;

        assert!(matches!(result, Err(Error::IoUnreadable { .. })));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_destination_linked_to_source_is_left_untouched() {
        let dir = TempDir::new().unwrap();
        let (source, data) = random_file(&dir, "source.bin", 4096);
        let dest = dir.path().join("dest.bin");
        let req = request(&source, &dest, 1024);

        std::os::unix::fs::symlink(&source, &dest).unwrap();
        let result = Orchestrator::new(AccessPolicy::default()).transfer(&req).await;

        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
        assert_eq!(std::fs::read(&source).unwrap(), data);
    }

    #[tokio::test]
    async fn test_invalid_policy_rejected() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "source.bin", 10);
        let dest = dir.path().join("dest.bin");
        let policy = AccessPolicy {
            max_concurrent_chunks: 0,
            ..Default::default()
        };

        let result = Orchestrator::new(policy)
            .transfer(&request(&source, &dest, 4))
            .await;

        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_source_shorter_than_planned_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let (source, _) = random_file(&dir, "source.bin", 100);
        let dest = dir.path().join("dest.bin");
        let req = TransferRequest::new(&source, &dest, 300, 64).unwrap();

        let result = Orchestrator::new(AccessPolicy::default()).transfer(&req).await;
        assert!(matches!(result, Err(Error::IoUnreadable { .. })));
    }
}
