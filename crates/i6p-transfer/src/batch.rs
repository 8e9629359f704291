//! Batched chunk framing.
//!
//! Grouping chunks into a single wire unit amortizes framing overhead and
//! syscalls. Wire layout, all integers big-endian:
//!
//!   magic(u32) || count(u32)
//!   per chunk: index(u32) || compressed(u8) || hash len(u16) || hash
//!              || data len(u32) || data
//!
//! On streams a batch is preceded by a u32 length prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::compress::CompressedChunk;
use crate::TransferError;

/// Maximum serialized batch size (4 MiB).
pub const MAX_BATCH_SIZE: usize = 4 * 1024 * 1024;
/// "I6PB".
pub const BATCH_MAGIC: u32 = 0x4936_5042;

#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub chunks: Vec<CompressedChunk>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, chunk: CompressedChunk) {
        self.chunks.push(chunk);
    }

    /// Exact size of [`Batch::encode`]'s output.
    pub fn serialized_size(&self) -> usize {
        8 + self
            .chunks
            .iter()
            .map(|chunk| 4 + 1 + 2 + chunk.orig_hash.len() + 4 + chunk.data.len())
            .sum::<usize>()
    }

    pub fn encode(&self) -> Result<Bytes, TransferError> {
        let size = self.serialized_size();
        if size > MAX_BATCH_SIZE {
            return Err(TransferError::BatchTooLarge);
        }
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u32(BATCH_MAGIC);
        buf.put_u32(self.chunks.len() as u32);
        for chunk in &self.chunks {
            buf.put_u32(chunk.index);
            buf.put_u8(u8::from(chunk.compressed));
            buf.put_u16(chunk.orig_hash.len() as u16);
            buf.put_slice(&chunk.orig_hash);
            buf.put_u32(chunk.data.len() as u32);
            buf.put_slice(&chunk.data);
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, TransferError> {
        if data.remaining() < 8 {
            return Err(TransferError::BatchTruncated);
        }
        if data.get_u32() != BATCH_MAGIC {
            return Err(TransferError::InvalidBatchMagic);
        }
        let count = data.get_u32();
        // Cap the preallocation; a hostile count is caught by truncation below.
        let mut chunks = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            if data.remaining() < 4 + 1 + 2 {
                return Err(TransferError::BatchTruncated);
            }
            let index = data.get_u32();
            let compressed = data.get_u8() == 1;
            let hash_len = data.get_u16() as usize;
            if hash_len != 32 {
                return Err(TransferError::InvalidHashLength);
            }
            if data.remaining() < hash_len + 4 {
                return Err(TransferError::BatchTruncated);
            }
            let mut orig_hash = [0u8; 32];
            data.copy_to_slice(&mut orig_hash);
            let data_len = data.get_u32() as usize;
            if data.remaining() < data_len {
                return Err(TransferError::BatchTruncated);
            }
            let chunk_data = data.copy_to_bytes(data_len);
            chunks.push(CompressedChunk {
                index,
                compressed,
                data: chunk_data,
                orig_hash,
            });
        }
        Ok(Self { chunks })
    }
}

/// Writes `len(u32 BE) || batch` and flushes.
pub async fn write_batch<W: AsyncWrite + Unpin>(
    writer: &mut W,
    batch: &Batch,
) -> Result<(), TransferError> {
    let data = batch.encode()?;
    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed batch.
pub async fn read_batch<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Batch, TransferError> {
    match try_read_batch(reader).await? {
        Some(batch) => Ok(batch),
        None => Err(TransferError::Io(std::io::ErrorKind::UnexpectedEof.into())),
    }
}

/// Like [`read_batch`], but a stream that ends cleanly before the next
/// length prefix yields `Ok(None)` instead of an error.
pub async fn try_read_batch<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Batch>, TransferError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_BATCH_SIZE {
        return Err(TransferError::BatchTooLarge);
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(Batch::decode(&data)?))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
