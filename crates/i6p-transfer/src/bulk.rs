//! Bulk send and receive.
//!
//! `BulkSender` runs the whole outbound pipeline: split, hash, commit,
//! compress, then dispatch through the parallel writer. `BulkReceiver`
//! accumulates chunks in any order and re-verifies the Merkle commitment
//! at assembly time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::batch::Batch;
use crate::chunker::{Chunk, Chunker, DEFAULT_CHUNK_SIZE};
use crate::compress::{compress_chunk, decompress_chunk, CompressedChunk, CompressionLevel};
use crate::merkle::MerkleTree;
use crate::pool::{ParallelWriter, StreamOpener, StreamPool};
use crate::TransferError;

/// Knobs for one bulk transfer endpoint.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// Bytes per chunk.
    pub chunk_size: usize,
    pub compression: CompressionLevel,
    /// Erasure data shards; zero disables erasure coding.
    pub erasure_data: usize,
    pub erasure_parity: usize,
    /// Upper bound on concurrently open streams.
    pub parallel_streams: usize,
    /// Writer worker tasks.
    pub parallel_workers: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: CompressionLevel::Fast,
            erasure_data: 0,
            erasure_parity: 0,
            parallel_streams: 8,
            parallel_workers: 4,
        }
    }
}

/// Counters shared across the lifetime of a sender or receiver.
#[derive(Debug, Default)]
pub struct TransferStats {
    pub total_bytes: AtomicU64,
    pub compressed_bytes: AtomicU64,
    pub chunks_sent: AtomicU64,
    pub chunks_received: AtomicU64,
    pub errors: AtomicU64,
}

impl TransferStats {
    /// Original size over wire size; 1.0 before anything was compressed.
    pub fn compression_ratio(&self) -> f64 {
        let compressed = self.compressed_bytes.load(Ordering::Relaxed);
        if compressed == 0 {
            return 1.0;
        }
        self.total_bytes.load(Ordering::Relaxed) as f64 / compressed as f64
    }
}

// ── BulkSender ────────────────────────────────────────────────────────────────

/// Sends large payloads through the full pipeline.
pub struct BulkSender<O: StreamOpener> {
    config: TransferConfig,
    pool: Arc<StreamPool<O>>,
    chunker: Chunker,
    stats: TransferStats,
}

impl<O: StreamOpener> BulkSender<O> {
    pub fn new(opener: O, config: TransferConfig) -> Self {
        Self {
            pool: Arc::new(StreamPool::new(opener, config.parallel_streams)),
            chunker: Chunker::new(config.chunk_size),
            config,
            stats: TransferStats::default(),
        }
    }

    /// Transmits `data` and returns the Merkle root committing to it.
    pub async fn send(
        &self,
        data: &[u8],
        cancel: CancellationToken,
    ) -> Result<[u8; 32], TransferError> {
        let chunks = self.chunker.split(data);
        self.stats
            .total_bytes
            .store(data.len() as u64, Ordering::Relaxed);
        self.dispatch(chunks, cancel).await
    }

    /// Like [`BulkSender::send`], reading the payload from `reader`.
    pub async fn send_reader<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        cancel: CancellationToken,
    ) -> Result<[u8; 32], TransferError> {
        let chunks = self.chunker.split_reader(reader).await?;
        let total: u64 = chunks.iter().map(|c| c.data.len() as u64).sum();
        self.stats.total_bytes.store(total, Ordering::Relaxed);
        self.dispatch(chunks, cancel).await
    }

    async fn dispatch(
        &self,
        chunks: Vec<Chunk>,
        cancel: CancellationToken,
    ) -> Result<[u8; 32], TransferError> {
        let hashes: Vec<[u8; 32]> = chunks.iter().map(|chunk| chunk.hash).collect();
        let tree = MerkleTree::build(&hashes)?;

        let mut compressed_size = 0u64;
        let compressed: Vec<CompressedChunk> = chunks
            .iter()
            .map(|chunk| {
                let cc = compress_chunk(chunk, self.config.compression);
                compressed_size += cc.data.len() as u64;
                cc
            })
            .collect();
        self.stats
            .compressed_bytes
            .store(compressed_size, Ordering::Relaxed);

        let mut writer = ParallelWriter::start(
            Arc::clone(&self.pool),
            self.config.parallel_workers,
            cancel,
        );
        for cc in compressed {
            writer.send(cc).await?;
            self.stats.chunks_sent.fetch_add(1, Ordering::Relaxed);
        }
        writer.wait().await?;

        tracing::debug!(
            chunks = chunks.len(),
            root = %tree.root_hex(),
            ratio = self.stats.compression_ratio(),
            "bulk send complete"
        );
        Ok(tree.root())
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn pool(&self) -> &Arc<StreamPool<O>> {
        &self.pool
    }

    /// Closes the underlying stream pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ── BulkReceiver ──────────────────────────────────────────────────────────────

/// Accumulates chunks in any order and assembles them once complete.
#[derive(Default)]
pub struct BulkReceiver {
    chunks: Mutex<HashMap<u32, Chunk>>,
    expected_chunks: AtomicUsize,
    stats: TransferStats,
}

impl BulkReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompresses, verifies, and stores one chunk.
    pub fn receive_chunk(&self, cc: &CompressedChunk) -> Result<(), TransferError> {
        let chunk = decompress_chunk(cc).inspect_err(|_| {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
        })?;
        self.chunks.lock().insert(chunk.index, chunk);
        self.stats.chunks_received.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn receive_batch(&self, batch: &Batch) -> Result<(), TransferError> {
        for cc in &batch.chunks {
            self.receive_chunk(cc)?;
        }
        Ok(())
    }

    /// Expected chunk count; required for `progress` and `is_complete`.
    pub fn set_expected_chunks(&self, count: usize) {
        self.expected_chunks.store(count, Ordering::Relaxed);
    }

    /// Fraction received, 0.0 to 1.0. Zero until the expectation is set.
    pub fn progress(&self) -> f64 {
        let expected = self.expected_chunks.load(Ordering::Relaxed);
        if expected == 0 {
            return 0.0;
        }
        self.chunks.lock().len() as f64 / expected as f64
    }

    pub fn is_complete(&self) -> bool {
        let expected = self.expected_chunks.load(Ordering::Relaxed);
        expected != 0 && self.chunks.lock().len() == expected
    }

    /// Sorts a snapshot of the received chunks by index, optionally
    /// re-verifies the Merkle commitment, and concatenates. Any mismatch
    /// fails and no partial output is produced.
    pub fn assemble(&self, expected_root: Option<&[u8; 32]>) -> Result<Vec<u8>, TransferError> {
        let mut chunks: Vec<Chunk> = self.chunks.lock().values().cloned().collect();
        chunks.sort_unstable_by_key(|chunk| chunk.index);

        if let Some(root) = expected_root {
            let hashes: Vec<[u8; 32]> = chunks.iter().map(|chunk| chunk.hash).collect();
            let tree = MerkleTree::build(&hashes)?;
            if &tree.root() != root {
                return Err(TransferError::IntegrityCheckFailed);
            }
        }

        let total = chunks.iter().map(|chunk| chunk.data.len()).sum();
        let mut out = Vec::with_capacity(total);
        for chunk in &chunks {
            out.extend_from_slice(&chunk.data);
        }
        Ok(out)
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
