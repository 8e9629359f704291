//! i6p-transfer — the bulk transfer pipeline.
//!
//! Data moves through the stages in order: the chunker splits it into
//! fixed-size hashed chunks, a Merkle tree commits to the whole object,
//! each chunk is LZ4-compressed when that actually shrinks it, chunks are
//! framed into batches, and a bounded pool of parallel streams carries the
//! batches. `BulkSender` and `BulkReceiver` wire the stages together.

use thiserror::Error;

pub mod batch;
pub mod bulk;
pub mod chunker;
pub mod compress;
pub mod erasure;
pub mod merkle;
pub mod pool;

pub use batch::{Batch, BATCH_MAGIC, MAX_BATCH_SIZE};
pub use bulk::{BulkReceiver, BulkSender, TransferConfig, TransferStats};
pub use chunker::{Chunk, Chunker, DEFAULT_CHUNK_SIZE};
pub use compress::{CompressedChunk, CompressionLevel};
pub use erasure::{Codec as ErasureCodec, ErasureError};
pub use merkle::{MerkleError, MerkleTree, Proof};
pub use pool::{ParallelReader, ParallelWriter, StreamOpener, StreamPool};

/// Errors from the transfer pipeline. Integrity failures stay distinct from
/// transport errors so callers can tell tampering from a broken link.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("lz4 compression failed")]
    CompressionFailed,
    #[error("lz4 decompression failed")]
    DecompressionFailed,
    #[error("chunk hash mismatch after decompression")]
    ChunkHashMismatch,
    #[error("batch exceeds maximum serialized size")]
    BatchTooLarge,
    #[error("batch truncated")]
    BatchTruncated,
    #[error("invalid batch magic")]
    InvalidBatchMagic,
    #[error("invalid chunk hash length in batch")]
    InvalidHashLength,
    #[error("stream pool closed")]
    PoolClosed,
    #[error("no available streams")]
    PoolExhausted,
    #[error("operation cancelled")]
    Cancelled,
    #[error("merkle root mismatch, integrity check failed")]
    IntegrityCheckFailed,
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
