use cred_types::Digest;
use serde::{Deserialize, Serialize};

use crate::hasher::ContentHasher;

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Binary Merkle tree over an ordered list of leaves.
///
/// Leaf nodes are `H(leaf)`, parents are `H(left || right)`. A level with an
/// odd number of nodes pairs its last node with itself. The tree is built
/// once and never mutated.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// Level 0 = leaf digests, last level = `[root]`.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from raw leaf values. Fails on an empty leaf set.
    pub fn build<L: AsRef<[u8]>>(leaves: &[L]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::Empty);
        }

        let mut current: Vec<Digest> = leaves
            .iter()
            .map(|leaf| ContentHasher::raw_hash(leaf.as_ref()))
            .collect();
        let mut levels = Vec::new();

        while current.len() > 1 {
            let next = parent_level(&current);
            levels.push(current);
            current = next;
        }
        levels.push(current);

        Ok(Self { levels })
    }

    pub fn root(&self) -> Digest {
        // build() guarantees the last level holds exactly one node
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(Digest::null)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Number of hashing rounds between a leaf and the root.
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut idx = index;

        for level in &self.levels[..self.depth()] {
            let (sibling, side) = if idx % 2 == 0 {
                // Odd level: the last node is its own sibling
                let sibling = level.get(idx + 1).copied().unwrap_or(level[idx]);
                (sibling, Side::Right)
            } else {
                (level[idx - 1], Side::Left)
            };
            path.push((sibling, side));
            idx /= 2;
        }

        Some(MerkleProof { path })
    }
}

/// Merkle inclusion proof: sibling digests from leaf to root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// `(sibling, side of the sibling)` pairs, leaf level first.
    pub path: Vec<(Digest, Side)>,
}

impl MerkleProof {
    /// Recompute the root starting from an already-hashed leaf.
    pub fn compute_root(&self, leaf_digest: Digest) -> Digest {
        self.path
            .iter()
            .fold(leaf_digest, |current, (sibling, side)| match side {
                Side::Left => hash_pair(sibling, &current),
                Side::Right => hash_pair(&current, sibling),
            })
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Generate an inclusion proof for `leaves[index]`.
///
/// Returns `None` for an empty leaf set or an out-of-range index. The result
/// is identical to `MerkleTree::build(leaves)?.proof(index)`.
pub fn generate_proof<L: AsRef<[u8]>>(leaves: &[L], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }

    let mut level: Vec<Digest> = leaves
        .iter()
        .map(|leaf| ContentHasher::raw_hash(leaf.as_ref()))
        .collect();
    let mut idx = index;
    let mut path = Vec::new();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level[level.len() - 1]);
        }
        if idx % 2 == 0 {
            path.push((level[idx + 1], Side::Right));
        } else {
            path.push((level[idx - 1], Side::Left));
        }
        idx /= 2;
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }

    Some(MerkleProof { path })
}

/// Check that `leaf` is committed to by `root` through `proof`.
pub fn verify_proof(leaf: &[u8], proof: &MerkleProof, root: &Digest) -> bool {
    proof.compute_root(ContentHasher::raw_hash(leaf)) == *root
}

fn parent_level(level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [single] => hash_pair(single, single),
            _ => unreachable!("chunks(2) yields one or two nodes"),
        })
        .collect()
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest::from_hash(*hasher.finalize().as_bytes())
}

/// Errors from Merkle tree construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a Merkle tree without leaves")]
    Empty,
}
