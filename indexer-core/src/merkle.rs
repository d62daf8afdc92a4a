//! Binary Merkle tree with Keccak-256 sorted-pair hashing.
//!
//! The tree is stored as a flat array of `2n - 1` nodes: internal nodes in
//! `[0, n-1)`, sorted leaves in `[n-1, 2n-1)`. Leaves are sorted before
//! placement, which makes proofs position-independent (a pair is always
//! hashed in sorted order) and enables binary search by leaf hash.

use sha3::{Digest, Keccak256};
use thiserror::Error;

/// A 32-byte node hash.
pub type Hash32 = [u8; 32];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MerkleError {
    #[error("empty tree")]
    EmptyTree,

    #[error("invalid leaf index")]
    InvalidIndex,

    #[error("hash not found in tree")]
    HashNotFound,

    #[error("invalid hex value: {0}")]
    InvalidHex(String),
}

/// Compute the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash a pair of nodes in sorted order: `keccak256(min(x, y) || max(x, y))`.
///
/// Byte-wise ordering of the raw hashes is identical to lexicographic
/// ordering of their lowercase hex rendering.
pub fn sorted_hash_pair(x: Hash32, y: Hash32) -> Hash32 {
    let mut hasher = Keccak256::new();
    if x <= y {
        hasher.update(x);
        hasher.update(y);
    } else {
        hasher.update(y);
        hasher.update(x);
    }
    hasher.finalize().into()
}

/// Merkle tree over a set of 32-byte hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree(Vec<Hash32>);

impl Tree {
    /// Build a tree from the given leaf hashes. With `initial_hash` each leaf
    /// is first replaced by its own Keccak-256 digest.
    pub fn build(hashes: &[Hash32], initial_hash: bool) -> Self {
        let mut leaves: Vec<Hash32> = if initial_hash {
            hashes.iter().map(|h| keccak256(h)).collect()
        } else {
            hashes.to_vec()
        };

        let n = leaves.len();
        if n == 0 {
            return Tree(Vec::new());
        }

        leaves.sort_unstable();

        let mut tree = vec![[0u8; 32]; 2 * n - 1];
        tree[n - 1..].copy_from_slice(&leaves);

        for i in (0..n - 1).rev() {
            tree[i] = sorted_hash_pair(tree[2 * i + 1], tree[2 * i + 2]);
        }

        Tree(tree)
    }

    /// Build a tree from hex-encoded leaf hashes, skipping consecutive
    /// duplicates of the input sequence.
    pub fn from_hex<S: AsRef<str>>(
        hex_values: &[S],
        initial_hash: bool,
    ) -> Result<Self, MerkleError> {
        let mut hashes = Vec::with_capacity(hex_values.len());
        for (i, value) in hex_values.iter().enumerate() {
            if i > 0 && value.as_ref() == hex_values[i - 1].as_ref() {
                continue;
            }
            hashes.push(parse_hex_hash(value.as_ref())?);
        }

        Ok(Self::build(&hashes, initial_hash))
    }

    /// The Merkle root.
    pub fn root(&self) -> Result<Hash32, MerkleError> {
        self.0.first().copied().ok_or(MerkleError::EmptyTree)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            (self.0.len() + 1) / 2
        }
    }

    /// The sorted leaf hashes.
    pub fn leaves(&self) -> &[Hash32] {
        let n = self.leaf_count();
        &self.0[self.0.len() - n..]
    }

    /// The `i`-th leaf in sorted order.
    pub fn leaf(&self, i: usize) -> Result<Hash32, MerkleError> {
        self.leaves()
            .get(i)
            .copied()
            .ok_or(MerkleError::InvalidIndex)
    }

    /// Merkle proof for the `i`-th leaf: the sibling hash at every level from
    /// the leaf up to (excluding) the root.
    pub fn proof(&self, i: usize) -> Result<Vec<Hash32>, MerkleError> {
        let n = self.leaf_count();
        if i >= n {
            return Err(MerkleError::InvalidIndex);
        }

        let mut proof = Vec::new();
        let mut pos = self.0.len() - n + i;
        while pos > 0 {
            let sibling = if pos % 2 == 1 { pos + 1 } else { pos - 1 };
            proof.push(self.0[sibling]);
            pos = (pos - 1) / 2;
        }

        Ok(proof)
    }

    /// Merkle proof for the leaf holding `hash`, located by binary search.
    pub fn proof_for_hash(&self, hash: Hash32) -> Result<Vec<Hash32>, MerkleError> {
        let i = self
            .leaves()
            .binary_search(&hash)
            .map_err(|_| MerkleError::HashNotFound)?;

        self.proof(i)
    }
}

/// Verify a Merkle proof for `leaf` against `root`.
pub fn verify_proof(leaf: Hash32, proof: &[Hash32], root: Hash32) -> bool {
    let mut hash = leaf;
    for pair in proof {
        hash = sorted_hash_pair(*pair, hash);
    }

    hash == root
}

fn parse_hex_hash(value: &str) -> Result<Hash32, MerkleError> {
    let hex_str = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    if hex_str.len() > 64 {
        return Err(MerkleError::InvalidHex(value.to_string()));
    }

    // Left-pad short values to a full 32 bytes.
    let padded = format!("{hex_str:0>64}");
    let bytes = hex::decode(&padded).map_err(|_| MerkleError::InvalidHex(value.to_string()))?;

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}
