//! Reed-Solomon erasure coding.
//!
//! A thin wrapper over the Reed-Solomon codec: with `data + parity` shards
//! any `parity` of them may be lost and the payload still reconstructs.
//! Lost shards are marked `None`; `join` truncates the zero padding back
//! off using the caller-supplied original size.

use reed_solomon_erasure::galois_8::ReedSolomon;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("invalid data/parity shard configuration")]
    InvalidConfig,
    #[error("input too short to shard")]
    ShortData,
    #[error("too many shards lost, cannot recover")]
    TooManyLost,
    #[error("shard sizes do not match")]
    ShardSizeMismatch,
    #[error("reed-solomon: {0:?}")]
    Codec(reed_solomon_erasure::Error),
}

#[derive(Debug)]
pub struct Codec {
    rs: ReedSolomon,
    data_shards: usize,
    parity_shards: usize,
}

impl Codec {
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self, ErasureError> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(ErasureError::InvalidConfig);
        }
        let rs = ReedSolomon::new(data_shards, parity_shards).map_err(ErasureError::Codec)?;
        Ok(Self {
            rs,
            data_shards,
            parity_shards,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Shard size for a payload of `data_size` bytes.
    pub fn shard_size(&self, data_size: usize) -> usize {
        data_size.div_ceil(self.data_shards)
    }

    /// Total bytes across all shards for a payload of `data_size` bytes.
    pub fn encoded_size(&self, data_size: usize) -> usize {
        self.shard_size(data_size) * self.total_shards()
    }

    /// Storage overhead ratio, e.g. 1.4 for a 10+4 configuration.
    pub fn overhead(&self) -> f64 {
        self.total_shards() as f64 / self.data_shards as f64
    }

    /// Splits into data shards, zero-padding the tail. Parity is not
    /// computed here.
    pub fn split(&self, data: &[u8]) -> Result<Vec<Vec<u8>>, ErasureError> {
        if data.is_empty() {
            return Err(ErasureError::ShortData);
        }
        let size = self.shard_size(data.len());
        let mut shards = Vec::with_capacity(self.data_shards);
        for i in 0..self.data_shards {
            let start = (i * size).min(data.len());
            let end = ((i + 1) * size).min(data.len());
            let mut shard = vec![0u8; size];
            shard[..end - start].copy_from_slice(&data[start..end]);
            shards.push(shard);
        }
        Ok(shards)
    }

    /// Splits and computes parity; returns all `total_shards()` shards.
    pub fn encode_data(&self, data: &[u8]) -> Result<Vec<Vec<u8>>, ErasureError> {
        let mut shards = self.split(data)?;
        let size = shards[0].len();
        shards.resize_with(self.total_shards(), || vec![0u8; size]);
        self.rs.encode(&mut shards).map_err(map_codec_err)?;
        Ok(shards)
    }

    /// Checks parity consistency without reconstructing anything.
    pub fn verify(&self, shards: &[Vec<u8>]) -> Result<bool, ErasureError> {
        self.rs.verify(shards).map_err(map_codec_err)
    }

    /// Reconstructs every missing shard in place. Missing shards are `None`.
    pub fn reconstruct(&self, shards: &mut Vec<Option<Vec<u8>>>) -> Result<(), ErasureError> {
        self.rs.reconstruct(shards).map_err(map_codec_err)
    }

    /// Reconstructs only the data shards; cheaper when parity is not needed.
    pub fn reconstruct_data(&self, shards: &mut Vec<Option<Vec<u8>>>) -> Result<(), ErasureError> {
        self.rs.reconstruct_data(shards).map_err(map_codec_err)
    }

    /// Joins the data shards back into `out_size` bytes of payload.
    pub fn join(&self, shards: &[Option<Vec<u8>>], out_size: usize) -> Result<Vec<u8>, ErasureError> {
        let mut out = Vec::with_capacity(out_size);
        for shard in shards.iter().take(self.data_shards) {
            let shard = shard.as_ref().ok_or(ErasureError::TooManyLost)?;
            let remaining = out_size - out.len();
            if remaining == 0 {
                break;
            }
            out.extend_from_slice(&shard[..remaining.min(shard.len())]);
        }
        Ok(out)
    }
}

fn map_codec_err(err: reed_solomon_erasure::Error) -> ErasureError {
    match err {
        reed_solomon_erasure::Error::TooFewShardsPresent => ErasureError::TooManyLost,
        reed_solomon_erasure::Error::IncorrectShardSize => ErasureError::ShardSizeMismatch,
        other => ErasureError::Codec(other),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 253) as u8).collect()
    }

    #[test]
    fn encode_verify_round_trip() {
        let codec = Codec::new(4, 2).unwrap();
        let data = payload(1000);
        let shards = codec.encode_data(&data).unwrap();
        assert_eq!(shards.len(), 6);
        assert!(codec.verify(&shards).unwrap());

        let opt: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        assert_eq!(codec.join(&opt, data.len()).unwrap(), data);
    }

    /// 10+4 configuration, 1 MiB payload, shards 0, 5, 10, and 13 lost.
    #[test]
    fn recovers_with_max_losses() {
        let codec = Codec::new(10, 4).unwrap();
        let data = payload(1024 * 1024);
        let shards = codec.encode_data(&data).unwrap();

        let mut damaged: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        for lost in [0usize, 5, 10, 13] {
            damaged[lost] = None;
        }
        codec.reconstruct(&mut damaged).unwrap();

        let recovered = codec.join(&damaged, data.len()).unwrap();
        assert_eq!(recovered, data);

        let full: Vec<Vec<u8>> = damaged.into_iter().map(|s| s.unwrap()).collect();
        assert!(codec.verify(&full).unwrap());
    }

    #[test]
    fn too_many_losses_fail() {
        let codec = Codec::new(10, 4).unwrap();
        let shards = codec.encode_data(&payload(4096)).unwrap();
        let mut damaged: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        for lost in [0usize, 1, 2, 3, 4] {
            damaged[lost] = None;
        }
        assert!(matches!(
            codec.reconstruct(&mut damaged).unwrap_err(),
            ErasureError::TooManyLost
        ));
    }

    #[test]
    fn reconstruct_data_skips_parity() {
        let codec = Codec::new(3, 2).unwrap();
        let data = payload(300);
        let shards = codec.encode_data(&data).unwrap();
        let mut damaged: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        damaged[1] = None;
        damaged[4] = None;
        codec.reconstruct_data(&mut damaged).unwrap();
        // Data shard came back, the parity shard was left alone.
        assert!(damaged[1].is_some());
        assert!(damaged[4].is_none());
        assert_eq!(codec.join(&damaged, data.len()).unwrap(), data);
    }

    #[test]
    fn sizing_helpers() {
        let codec = Codec::new(10, 4).unwrap();
        assert_eq!(codec.shard_size(1000), 100);
        assert_eq!(codec.shard_size(1001), 101);
        assert_eq!(codec.encoded_size(1000), 1400);
        assert!((codec.overhead() - 1.4).abs() < 1e-9);
    }

    #[test]
    fn invalid_configurations_rejected() {
        assert!(matches!(
            Codec::new(0, 4).unwrap_err(),
            ErasureError::InvalidConfig
        ));
        assert!(matches!(
            Codec::new(10, 0).unwrap_err(),
            ErasureError::InvalidConfig
        ));
        let codec = Codec::new(2, 1).unwrap();
        assert!(matches!(
            codec.split(b"").unwrap_err(),
            ErasureError::ShortData
        ));
    }

    #[test]
    fn padding_is_truncated_by_join() {
        let codec = Codec::new(4, 2).unwrap();
        let data = payload(10); // pads to 4 shards of 3 bytes
        let shards = codec.encode_data(&data).unwrap();
        assert_eq!(shards[0].len(), 3);
        let opt: Vec<Option<Vec<u8>>> = shards.into_iter().map(Some).collect();
        assert_eq!(codec.join(&opt, 10).unwrap(), data);
    }
}
