//! Fixed-size chunking with per-chunk SHA-256 hashes.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default chunk size (256 KiB), sized for high-bandwidth links.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// One slice of the transfer payload. `hash = SHA-256(data)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub data: Bytes,
    pub hash: [u8; 32],
}

pub fn hash_chunk(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Splits payloads into fixed-size chunks; the final chunk may be short.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
}

impl Chunker {
    /// Zero falls back to [`DEFAULT_CHUNK_SIZE`].
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: if chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                chunk_size
            },
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Splits a slice. Empty input yields zero chunks.
    pub fn split(&self, data: &[u8]) -> Vec<Chunk> {
        data.chunks(self.chunk_size)
            .enumerate()
            .map(|(index, piece)| Chunk {
                index: index as u32,
                data: Bytes::copy_from_slice(piece),
                hash: hash_chunk(piece),
            })
            .collect()
    }

    /// Splits everything a reader produces until EOF. A trailing short chunk
    /// is permitted.
    pub async fn split_reader<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> std::io::Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let filled = read_full(reader, &mut buf).await?;
            if filled > 0 {
                chunks.push(Chunk {
                    index: chunks.len() as u32,
                    data: Bytes::copy_from_slice(&buf[..filled]),
                    hash: hash_chunk(&buf[..filled]),
                });
            }
            if filled < self.chunk_size {
                return Ok(chunks);
            }
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Concatenates chunks in index order, whatever order they arrived in.
pub fn reassemble(chunks: &[Chunk]) -> Vec<u8> {
    let mut sorted: Vec<&Chunk> = chunks.iter().collect();
    sorted.sort_unstable_by_key(|chunk| chunk.index);
    let total = sorted.iter().map(|chunk| chunk.data.len()).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in sorted {
        out.extend_from_slice(&chunk.data);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn split_produces_hashed_chunks() {
        let chunker = Chunker::new(4);
        let chunks = chunker.split(b"abcdefghij");
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[0].data[..], b"abcd");
        assert_eq!(&chunks[2].data[..], b"ij");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u32);
            assert_eq!(chunk.hash, hash_chunk(&chunk.data));
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunker = Chunker::new(1024);
        assert!(chunker.split(b"").is_empty());
        assert!(reassemble(&[]).is_empty());
    }

    #[test]
    fn reassemble_any_order() {
        let chunker = Chunker::new(3);
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut chunks = chunker.split(data);
        chunks.reverse();
        assert_eq!(reassemble(&chunks), data);
    }

    #[test]
    fn zero_chunk_size_uses_default() {
        assert_eq!(Chunker::new(0).chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn split_reader_matches_split() {
        let chunker = Chunker::new(7);
        let data: Vec<u8> = (0..100u8).collect();
        let from_reader = chunker.split_reader(&mut &data[..]).await.unwrap();
        let from_slice = chunker.split(&data);
        assert_eq!(from_reader, from_slice);
    }

    #[tokio::test]
    async fn split_reader_empty_input() {
        let chunker = Chunker::new(16);
        let chunks = chunker.split_reader(&mut &[][..]).await.unwrap();
        assert!(chunks.is_empty());
    }

    proptest! {
        #[test]
        fn split_reassemble_round_trip(
            data in prop::collection::vec(any::<u8>(), 0..4096),
            chunk_size in 1usize..1024,
        ) {
            let chunker = Chunker::new(chunk_size);
            let chunks = chunker.split(&data);
            prop_assert_eq!(reassemble(&chunks), data);
        }

        #[test]
        fn chunk_count_is_ceiling_division(
            data in prop::collection::vec(any::<u8>(), 1..4096),
            chunk_size in 1usize..1024,
        ) {
            let chunker = Chunker::new(chunk_size);
            let chunks = chunker.split(&data);
            prop_assert_eq!(chunks.len(), data.len().div_ceil(chunk_size));
        }
    }
}
