//! Sorted-pair keccak Merkle tree, compatible with on-chain
//! `MerkleProof.verify` style verifiers.

use alloy_primitives::{Address, B256, U256, keccak256};

/// `keccak256(abi.encodePacked(address, uint256))`
pub fn leaf_hash(address: &Address, value: &U256) -> B256 {
    let mut packed = [0u8; 52];
    packed[..20].copy_from_slice(address.as_slice());
    packed[20..].copy_from_slice(&value.to_be_bytes::<32>());
    keccak256(packed)
}

/// Hashes two nodes in canonical order, so the result does not depend on
/// which side each child sits on.
pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(low.as_slice());
    buf[32..].copy_from_slice(high.as_slice());
    keccak256(buf)
}

pub fn verify(leaf: &B256, proof: &[B256], root: &B256) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |node, sibling| hash_pair(&node, sibling));
    computed == *root
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<B256>>,
}

impl MerkleTree {
    pub fn build(leaves: Vec<B256>) -> Self {
        let mut levels = vec![leaves];

        while levels.last().map_or(0, Vec::len) > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<B256> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    // odd node is promoted unchanged
                    _ => pair[0],
                })
                .collect();
            levels.push(next);
        }

        MerkleTree { levels }
    }

    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a Address, &'a U256)>,
    {
        Self::build(
            entries
                .into_iter()
                .map(|(address, value)| leaf_hash(address, value))
                .collect(),
        )
    }

    /// Zero hash for an empty tree.
    pub fn root(&self) -> B256 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(B256::ZERO)
    }

    pub fn leaves(&self) -> &[B256] {
        &self.levels[0]
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Sibling hashes from leaf `index` up to the root. Levels where the
    /// node was promoted without a sibling contribute nothing.
    pub fn proof(&self, index: usize) -> Option<Vec<B256>> {
        if index >= self.len() {
            return None;
        }

        let mut proof = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            if let Some(node) = level.get(sibling) {
                proof.push(*node);
            }
            position /= 2;
        }
        Some(proof)
    }

    pub fn proofs(&self) -> Vec<Vec<B256>> {
        (0..self.len())
            .filter_map(|index| self.proof(index))
            .collect()
    }
}
