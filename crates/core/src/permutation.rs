//! Validated index permutations.
//!
//! The hierarchical placement composes several reindexing stages: the group
//! permutation that lays experts out node-locally, and the per-node slot
//! permutation that spreads physical slots across GPUs. Expressing each
//! stage as a named [`Permutation`] value keeps the construction auditable
//! and testable stage by stage, instead of chaining raw index arithmetic.

use crate::error::{EplbError, Result};

/// A bijection over `0..len`.
///
/// `apply(i)` answers "which source index feeds position `i`"; [`gather`]
/// reindexes a whole slice under that reading.
///
/// [`gather`]: Permutation::gather
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    forward: Vec<usize>,
}

impl Permutation {
    /// Build a permutation from its forward map, verifying it is a bijection.
    pub fn new(forward: Vec<usize>) -> Result<Self> {
        let len = forward.len();
        let mut seen = vec![false; len];
        for (position, &value) in forward.iter().enumerate() {
            if value >= len || seen[value] {
                return Err(EplbError::NotAPermutation {
                    len,
                    position,
                    value,
                });
            }
            seen[value] = true;
        }
        Ok(Self { forward })
    }

    /// The identity permutation over `0..len`.
    pub fn identity(len: usize) -> Self {
        Self {
            forward: (0..len).collect(),
        }
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the permutation is empty.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Map position `i` to its source index.
    #[inline]
    pub fn apply(&self, i: usize) -> usize {
        self.forward[i]
    }

    /// The inverse permutation: `inv.apply(self.apply(i)) == i`.
    pub fn inverse(&self) -> Permutation {
        let mut inv = vec![0usize; self.forward.len()];
        for (i, &j) in self.forward.iter().enumerate() {
            inv[j] = i;
        }
        Permutation { forward: inv }
    }

    /// Composition `(self ∘ inner)`: the result maps `i` to
    /// `self.apply(inner.apply(i))`.
    ///
    /// # Panics
    ///
    /// Panics when the two permutations have different lengths.
    pub fn compose(&self, inner: &Permutation) -> Permutation {
        assert_eq!(
            self.len(),
            inner.len(),
            "cannot compose permutations of different lengths"
        );
        Permutation {
            forward: inner.forward.iter().map(|&j| self.forward[j]).collect(),
        }
    }

    /// Reindex a slice: `out[i] = src[self.apply(i)]`.
    ///
    /// # Panics
    ///
    /// Panics when `src` is shorter than the permutation.
    pub fn gather<T: Copy>(&self, src: &[T]) -> Vec<T> {
        self.forward.iter().map(|&j| src[j]).collect()
    }

    /// The raw forward map.
    pub fn as_slice(&self) -> &[usize] {
        &self.forward
    }
}
