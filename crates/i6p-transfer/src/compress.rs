//! LZ4 chunk compression.
//!
//! Chunks are compressed individually in block mode. If compression does
//! not shrink a chunk it is carried uncompressed; either way the chunk
//! keeps `orig_hash`, the SHA-256 of the uncompressed bytes, and
//! decompression re-hashes and compares before handing data up.

use bytes::Bytes;
use lz4::block::{self, CompressionMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunker::{hash_chunk, Chunk};
use crate::TransferError;

/// Speed/ratio tradeoff. LZ4 is here for its speed on commodity hardware;
/// Fast is the default for bulk transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    #[default]
    Fast,
    Default,
    Best,
}

#[derive(Debug, Error)]
#[error("unknown compression level: {0}")]
pub struct UnknownCompressionLevel(String);

impl std::str::FromStr for CompressionLevel {
    type Err = UnknownCompressionLevel;

    /// Accepts the same lowercase names the serde form uses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "default" => Ok(Self::Default),
            "best" => Ok(Self::Best),
            other => Err(UnknownCompressionLevel(other.to_string())),
        }
    }
}

fn mode(level: CompressionLevel) -> Option<CompressionMode> {
    match level {
        CompressionLevel::Fast => Some(CompressionMode::FAST(1)),
        CompressionLevel::Default => Some(CompressionMode::DEFAULT),
        CompressionLevel::Best => Some(CompressionMode::HIGHCOMPRESSION(9)),
    }
}

/// LZ4 block compression with a size prefix for decompression.
pub fn compress(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>, TransferError> {
    block::compress(data, mode(level), true).map_err(|_| TransferError::CompressionFailed)
}

/// Inverse of [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, TransferError> {
    block::decompress(data, None).map_err(|_| TransferError::DecompressionFailed)
}

/// A chunk as it travels on the wire. `orig_hash` always refers to the
/// uncompressed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedChunk {
    pub index: u32,
    pub compressed: bool,
    pub data: Bytes,
    pub orig_hash: [u8; 32],
}

/// Compresses a chunk when that actually helps; otherwise stores it raw.
pub fn compress_chunk(chunk: &Chunk, level: CompressionLevel) -> CompressedChunk {
    match compress(&chunk.data, level) {
        Ok(compressed) if compressed.len() < chunk.data.len() => CompressedChunk {
            index: chunk.index,
            compressed: true,
            data: Bytes::from(compressed),
            orig_hash: chunk.hash,
        },
        _ => CompressedChunk {
            index: chunk.index,
            compressed: false,
            data: chunk.data.clone(),
            orig_hash: chunk.hash,
        },
    }
}

/// Decompresses (when flagged) and verifies the chunk against `orig_hash`.
pub fn decompress_chunk(cc: &CompressedChunk) -> Result<Chunk, TransferError> {
    let data = if cc.compressed {
        Bytes::from(decompress(&cc.data)?)
    } else {
        cc.data.clone()
    };
    let hash = hash_chunk(&data);
    if hash != cc.orig_hash {
        return Err(TransferError::ChunkHashMismatch);
    }
    Ok(Chunk {
        index: cc.index,
        data,
        hash,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;

    fn chunk_of(data: &[u8]) -> Chunk {
        Chunker::new(data.len().max(1)).split(data).remove(0)
    }

    #[test]
    fn compressible_chunk_round_trips() {
        let chunk = chunk_of(&vec![b'a'; 4096]);
        let cc = compress_chunk(&chunk, CompressionLevel::Fast);
        assert!(cc.compressed);
        assert!(cc.data.len() < chunk.data.len());
        assert_eq!(decompress_chunk(&cc).unwrap(), chunk);
    }

    #[test]
    fn incompressible_chunk_stays_raw() {
        use rand::RngCore;
        let mut data = vec![0u8; 512];
        rand::thread_rng().fill_bytes(&mut data);
        let chunk = chunk_of(&data);
        let cc = compress_chunk(&chunk, CompressionLevel::Fast);
        assert!(!cc.compressed);
        assert_eq!(cc.data, chunk.data);
        assert_eq!(decompress_chunk(&cc).unwrap(), chunk);
    }

    #[test]
    fn all_levels_round_trip() {
        let chunk = chunk_of(b"hello hello hello hello hello hello hello hello");
        for level in [
            CompressionLevel::Fast,
            CompressionLevel::Default,
            CompressionLevel::Best,
        ] {
            let cc = compress_chunk(&chunk, level);
            assert_eq!(decompress_chunk(&cc).unwrap(), chunk);
        }
    }

    #[test]
    fn corrupted_raw_chunk_fails_hash_check() {
        let chunk = chunk_of(b"some payload bytes here");
        let mut cc = compress_chunk(&chunk, CompressionLevel::Fast);
        let mut data = cc.data.to_vec();
        data[0] ^= 0xff;
        cc.data = Bytes::from(data);
        assert!(matches!(
            decompress_chunk(&cc).unwrap_err(),
            TransferError::ChunkHashMismatch | TransferError::DecompressionFailed
        ));
    }

    #[test]
    fn wrong_orig_hash_is_detected() {
        let chunk = chunk_of(&vec![b'z'; 1024]);
        let mut cc = compress_chunk(&chunk, CompressionLevel::Fast);
        cc.orig_hash[4] ^= 0x01;
        assert!(matches!(
            decompress_chunk(&cc).unwrap_err(),
            TransferError::ChunkHashMismatch
        ));
    }

    #[test]
    fn level_names_parse() {
        assert_eq!(
            "fast".parse::<CompressionLevel>().unwrap(),
            CompressionLevel::Fast
        );
        assert_eq!(
            "best".parse::<CompressionLevel>().unwrap(),
            CompressionLevel::Best
        );
        assert!("zstd".parse::<CompressionLevel>().is_err());
    }

    #[test]
    fn empty_data_round_trips() {
        let compressed = compress(b"", CompressionLevel::Fast).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), b"");
    }
}
