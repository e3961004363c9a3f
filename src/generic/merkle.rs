use crate::crypto::hash::FieldHash;
use ark_ff::PrimeField;
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("tree of capacity {capacity} is full")]
    TreeFull { capacity: usize },
    #[error("leaf index {index} out of range (bound {bound})")]
    IndexOutOfRange { index: usize, bound: usize },
    #[error("tree arity must be at least 2, got {0}")]
    InvalidArity(usize),
}

/// An inclusion proof, laid out level by level from the leaf up.
///
/// At level `l`, `siblings[l]` holds the `arity - 1` other children of the node on the path, in
/// order with the path node removed, and `path_indices[l]` is the position the path node takes
/// among its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof<F> {
    pub root: F,
    pub leaf: F,
    pub siblings: Vec<Vec<F>>,
    pub path_indices: Vec<usize>,
}

impl<F: PrimeField> MerkleProof<F> {
    /// The root the path leads to from `leaf`, ignoring `root`. `None` for a malformed path.
    pub fn compute_root<H: FieldHash<F>>(&self) -> Option<F> {
        if self.siblings.len() != self.path_indices.len() {
            return None;
        }
        let mut node = self.leaf;
        for (siblings, &pos) in self.siblings.iter().zip(&self.path_indices) {
            if pos > siblings.len() {
                return None;
            }
            let mut children = siblings.clone();
            children.insert(pos, node);
            node = H::hash(&children);
        }
        Some(node)
    }

    /// Recomputes the root from the leaf and the path, and compares it against `root`.
    pub fn verify<H: FieldHash<F>>(&self) -> bool {
        self.compute_root::<H>() == Some(self.root)
    }
}

/// Append only Merkle tree of fixed depth and arity.
///
/// Nodes are cached per level, and only the populated prefix of each level is stored. Everything
/// to the right of it is the zero subtree of that level, so an empty tree of depth 32 costs
/// `depth + 1` hashes to build.
#[derive(Debug, Clone)]
pub struct IncrementalMerkleTree<F, H> {
    depth: usize,
    arity: usize,
    zeros: Vec<F>,
    levels: Vec<Vec<F>>,
    _hash: PhantomData<H>,
}

impl<F: PrimeField, H: FieldHash<F>> IncrementalMerkleTree<F, H> {
    /// Binary tree with zero leaves.
    pub fn new(depth: usize) -> Self {
        Self::build(depth, 2, F::zero())
    }

    pub fn with_arity(depth: usize, arity: usize, zero: F) -> Result<Self, MerkleError> {
        if arity < 2 {
            return Err(MerkleError::InvalidArity(arity));
        }
        Ok(Self::build(depth, arity, zero))
    }

    fn build(depth: usize, arity: usize, zero: F) -> Self {
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(zero);
        for l in 0..depth {
            zeros.push(H::hash(&vec![zeros[l]; arity]));
        }
        Self {
            depth,
            arity,
            zeros,
            levels: vec![Vec::new(); depth + 1],
            _hash: PhantomData,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// `arity^depth`, saturating at `usize::MAX`.
    pub fn capacity(&self) -> usize {
        (self.arity).checked_pow(self.depth as u32).unwrap_or(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn leaves(&self) -> &[F] {
        &self.levels[0]
    }

    pub fn root(&self) -> F {
        self.node(self.depth, 0)
    }

    /// Position of the first leaf equal to `leaf`.
    pub fn index_of(&self, leaf: &F) -> Option<usize> {
        self.levels[0].iter().position(|l| l == leaf)
    }

    /// Appends a leaf, returning its index.
    pub fn insert(&mut self, leaf: F) -> Result<usize, MerkleError> {
        let index = self.len();
        if index >= self.capacity() {
            return Err(MerkleError::TreeFull {
                capacity: self.capacity(),
            });
        }
        self.levels[0].push(leaf);

        let mut idx = index;
        for l in 0..self.depth {
            let parent = idx / self.arity;
            let start = parent * self.arity;
            let children = (start..start + self.arity)
                .map(|i| self.node(l, i))
                .collect::<Vec<_>>();
            let hash = H::hash(&children);

            let next = &mut self.levels[l + 1];
            if parent < next.len() {
                next[parent] = hash;
            } else {
                next.push(hash);
            }
            idx = parent;
        }
        Ok(index)
    }

    /// Proof for an inserted leaf.
    pub fn create_proof(&self, index: usize) -> Result<MerkleProof<F>, MerkleError> {
        if index >= self.len() {
            return Err(MerkleError::IndexOutOfRange {
                index,
                bound: self.len(),
            });
        }
        self.padded_proof(index)
    }

    /// Proof for any slot below capacity. Slots past the last insert hold the zero leaf.
    pub fn padded_proof(&self, index: usize) -> Result<MerkleProof<F>, MerkleError> {
        if index >= self.capacity() {
            return Err(MerkleError::IndexOutOfRange {
                index,
                bound: self.capacity(),
            });
        }

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut idx = index;
        for l in 0..self.depth {
            let pos = idx % self.arity;
            let start = idx - pos;
            siblings.push(
                (start..start + self.arity)
                    .filter(|&i| i != idx)
                    .map(|i| self.node(l, i))
                    .collect(),
            );
            path_indices.push(pos);
            idx /= self.arity;
        }

        Ok(MerkleProof {
            root: self.root(),
            leaf: self.node(0, index),
            siblings,
            path_indices,
        })
    }

    fn node(&self, level: usize, index: usize) -> F {
        self.levels[level]
            .get(index)
            .copied()
            .unwrap_or(self.zeros[level])
    }
}
