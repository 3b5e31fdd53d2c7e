//! Keccak Merkle tree over settlement ids.
//!
//! Compatible with the common EVM proof verifier:
//!
//! ```text
//! leaf   = keccak256( uint256(settlement_id) )
//! parent = keccak256( min(a, b) || max(a, b) )
//! ```
//!
//! Pairs are hashed in sorted order, so a proof is just the list of sibling
//! hashes with no left/right flags. An unpaired node at the end of a level
//! is carried up unchanged. A single-leaf tree's root is the leaf itself and
//! its proof is empty.

use custody_types::{Hash32, SettlementId};
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

fn keccak(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    Hash32(out)
}

/// Leaf hash of a settlement id.
#[must_use]
pub fn leaf_hash(id: SettlementId) -> Hash32 {
    keccak(&[&id.to_word()])
}

/// Sorted-pair parent hash.
#[must_use]
pub fn hash_pair(a: &Hash32, b: &Hash32) -> Hash32 {
    if a <= b {
        keccak(&[a.as_bytes(), b.as_bytes()])
    } else {
        keccak(&[b.as_bytes(), a.as_bytes()])
    }
}

/// Merkle tree with every level retained for proof generation.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves, the last level holds the root.
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Build from settlement ids in leaf order.
    #[must_use]
    pub fn from_settlements(ids: &[SettlementId]) -> Self {
        Self::build(ids.iter().map(|id| leaf_hash(*id)).collect())
    }

    /// Build from leaf hashes. An empty tree has root [`Hash32::ZERO`].
    #[must_use]
    pub fn build(leaves: Vec<Hash32>) -> Self {
        let mut levels = vec![leaves];
        while levels.last().is_some_and(|level| level.len() > 1) {
            let below = &levels[levels.len() - 1];
            let above: Vec<Hash32> = below
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(a, b),
                    [single] => *single,
                    _ => Hash32::ZERO,
                })
                .collect();
            levels.push(above);
        }
        Self { levels }
    }

    #[must_use]
    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Hash32::ZERO)
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Inclusion proof for the leaf at `index`.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf = *self.levels.first()?.get(index)?;
        let mut siblings = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = idx ^ 1;
            if let Some(hash) = level.get(sibling) {
                siblings.push(*hash);
            }
            idx /= 2;
        }
        Some(MerkleProof { leaf, siblings })
    }
}

/// Sibling path from a leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: Hash32,
    pub siblings: Vec<Hash32>,
}

impl MerkleProof {
    #[must_use]
    pub fn compute_root(&self) -> Hash32 {
        self.siblings
            .iter()
            .fold(self.leaf, |acc, sibling| hash_pair(&acc, sibling))
    }

    #[must_use]
    pub fn verify(&self, root: &Hash32) -> bool {
        self.compute_root() == *root
    }
}
