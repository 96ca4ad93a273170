//! Error types for expert placement computation.
//!
//! All variants are configuration errors in the sense of the failure model:
//! shape or divisibility preconditions that must be fixed by the caller.
//! Degenerate numeric inputs (zero or tied weights) are *not* errors; they
//! resolve through deterministic lowest-index tie-breaks.

use thiserror::Error;

/// Errors that can occur while computing an expert placement.
#[derive(Error, Debug)]
pub enum EplbError {
    /// The weight matrix has no layers or no experts.
    #[error("weight matrix must have at least one layer and one expert")]
    EmptyWeightMatrix,

    /// The weight matrix rows have inconsistent lengths.
    #[error("weight matrix is ragged: layer {layer} has {actual} columns, expected {expected}")]
    RaggedWeightMatrix {
        layer: usize,
        expected: usize,
        actual: usize,
    },

    /// Items cannot be split evenly into the requested number of packs.
    #[error("{items} items cannot be packed into {packs} equal packs: item count must be a multiple of the pack count")]
    UnevenPacking { items: usize, packs: usize },

    /// Fewer physical slots than logical experts.
    #[error("{physical} physical slots cannot hold {logical} logical experts: every expert needs at least one slot")]
    NotEnoughSlots { logical: usize, physical: usize },

    /// Logical experts cannot be split evenly into groups.
    #[error("{experts} experts cannot be split into {groups} equal groups")]
    UnevenGrouping { experts: usize, groups: usize },

    /// GPUs cannot be spread evenly across nodes.
    #[error("{gpus} GPUs cannot be spread evenly across {nodes} nodes")]
    UnevenGpuSplit { gpus: usize, nodes: usize },

    /// Physical slots cannot be spread evenly across GPUs.
    #[error("{slots} physical slots cannot be spread evenly across {gpus} GPUs")]
    UnevenSlotSplit { slots: usize, gpus: usize },

    /// A topology field is zero or otherwise unusable.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// An index map handed to [`crate::Permutation`] is not a bijection.
    #[error("index map of length {len} is not a permutation: value {value} at position {position} is out of range or repeated")]
    NotAPermutation {
        len: usize,
        position: usize,
        value: usize,
    },

    /// Reading or writing a placement snapshot file failed.
    #[error("snapshot I/O failed: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// A placement snapshot document could not be parsed or serialized.
    #[error("snapshot (de)serialization failed: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EplbError>;
