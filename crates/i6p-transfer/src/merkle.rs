//! Merkle commitment over chunk hashes.
//!
//! Leaves are chunk hashes padded with `SHA-256("")` to the next power of
//! two; an internal node is `SHA-256(left || right)`. The whole tree lives
//! in a flat array of `2n - 1` nodes with the leaves at `[n-1 .. 2n-2]`.
//! The root commits to the entire object before any chunk arrives, so a
//! receiver can verify chunks one proof at a time.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("no chunk hashes provided")]
    Empty,
    #[error("chunk index out of range")]
    IndexOutOfRange,
    #[error("proof verification failed")]
    ProofFailed,
}

fn pad_leaf() -> [u8; 32] {
    Sha256::digest([]).into()
}

fn combine(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[derive(Debug)]
pub struct MerkleTree {
    leaves: Vec<[u8; 32]>,
    nodes: Vec<[u8; 32]>,
}

impl MerkleTree {
    pub fn build(chunk_hashes: &[[u8; 32]]) -> Result<Self, MerkleError> {
        if chunk_hashes.is_empty() {
            return Err(MerkleError::Empty);
        }
        let n = chunk_hashes.len().next_power_of_two();
        let mut leaves = Vec::with_capacity(n);
        leaves.extend_from_slice(chunk_hashes);
        leaves.resize(n, pad_leaf());

        let mut nodes = vec![[0u8; 32]; 2 * n - 1];
        nodes[n - 1..].copy_from_slice(&leaves);
        for i in (0..n - 1).rev() {
            nodes[i] = combine(&nodes[2 * i + 1], &nodes[2 * i + 2]);
        }
        Ok(Self { leaves, nodes })
    }

    pub fn root(&self) -> [u8; 32] {
        self.nodes[0]
    }

    /// Root as 64 lowercase hex characters.
    pub fn root_hex(&self) -> String {
        hex::encode(self.nodes[0])
    }

    /// Padded leaf count (a power of two).
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Proof for the leaf at `chunk_index`: the sibling at each level from
    /// the leaf up to the root.
    pub fn generate_proof(&self, chunk_index: usize) -> Result<Proof, MerkleError> {
        let n = self.leaves.len();
        if chunk_index >= n {
            return Err(MerkleError::IndexOutOfRange);
        }
        let mut siblings = Vec::new();
        let mut is_left = Vec::new();
        let mut idx = n - 1 + chunk_index;
        while idx > 0 {
            let sibling = if idx % 2 == 1 { idx + 1 } else { idx - 1 };
            siblings.push(self.nodes[sibling]);
            is_left.push(idx % 2 == 0);
            idx = (idx - 1) / 2;
        }
        Ok(Proof {
            chunk_index,
            chunk_hash: self.leaves[chunk_index],
            siblings,
            is_left,
        })
    }
}

/// Inclusion proof: siblings ordered leaf to root; `is_left[i]` says the
/// sibling is the left input at level `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub chunk_index: usize,
    pub chunk_hash: [u8; 32],
    pub siblings: Vec<[u8; 32]>,
    pub is_left: Vec<bool>,
}

/// Recomputes the root from the proof and compares.
pub fn verify_proof(proof: &Proof, expected_root: &[u8; 32]) -> Result<(), MerkleError> {
    let mut current = proof.chunk_hash;
    for (sibling, sibling_is_left) in proof.siblings.iter().zip(&proof.is_left) {
        current = if *sibling_is_left {
            combine(sibling, &current)
        } else {
            combine(&current, sibling)
        };
    }
    if &current != expected_root {
        return Err(MerkleError::ProofFailed);
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
