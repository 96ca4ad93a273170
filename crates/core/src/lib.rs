//! Expert-Parallel Load Balancing (EPLB).
//!
//! In expert parallelism, experts naturally become load-imbalanced: some
//! experts receive far more tokens than others. This crate computes the
//! placement tables that flatten that skew:
//!
//! 1. Hot experts are **replicated** across several physical slots so their
//!    load is split ([`replicate_experts`]).
//! 2. Expert groups are **packed** onto nodes and physical slots onto GPUs so
//!    that aggregate load per locality domain stays balanced
//!    ([`balanced_packing`]).
//! 3. Both steps compose into a hierarchical, locality-aware placement
//!    ([`rebalance_experts`]), falling back to a flat placement when the
//!    group count does not divide across nodes.
//!
//! The output is a set of per-layer tables: `phy2log` (which logical expert a
//! physical slot serves), `phyrank` (the replica ordinal of that binding),
//! `logcnt` (replicas per logical expert) and the reverse lookup `log2phy`.
//! The token-remap and dispatch layers that consume these tables, as well as
//! the GPU kernels that execute the experts, live outside this crate.
//!
//! ## Submodules
//!
//! - [`packing`]: balanced greedy packing of weighted groups into fixed-size packs
//! - [`replicate`]: replica assignment relieving the most-loaded expert first
//! - [`permutation`]: validated index permutations used to compose the stages
//! - [`rebalance`]: hierarchical (node → GPU) placement and the flat fallback
//! - [`mapping`]: logical → physical reverse-lookup table assembly
//! - [`stats`]: sliding-window expert load tracking and rebalance gating
//! - [`snapshot`]: on-disk load snapshot for precomputing a placement offline
//!
//! The whole pipeline is synchronous, deterministic CPU computation: identical
//! input weight matrices always yield identical tables.

pub mod config;
pub mod error;
pub mod mapping;
mod matrix;
pub mod packing;
pub mod permutation;
pub mod rebalance;
pub mod replicate;
pub mod snapshot;
pub mod stats;

pub use config::ClusterTopology;
pub use error::{EplbError, Result};
pub use mapping::build_log2phy;
pub use packing::{balanced_packing, BalancedPacking};
pub use permutation::Permutation;
pub use rebalance::{rebalance_experts, ExpertPlacement, PlacementTables};
pub use replicate::{replicate_experts, Replication};
pub use snapshot::PlacementSnapshot;
pub use stats::{ExpertLoadTracker, LoadTrackerConfig};
