//! Locality-aware expert rebalancing.
//!
//! Produces the global placement tables from a `[layer][expert]` load matrix
//! and a [`ClusterTopology`]. Two policies:
//!
//! - **Hierarchical** (when expert groups divide evenly across nodes): expert
//!   groups are packed onto nodes by aggregate load, experts are replicated
//!   *within* each node, and each node's physical slots are packed onto its
//!   GPUs by per-slot average load. Whole groups stay on one node, which
//!   keeps group-limited routing traffic node-local.
//! - **Flat fallback** (otherwise): experts are replicated over all physical
//!   slots with no locality structure. Replica-count and placement invariants
//!   still hold; only cross-node traffic minimization is lost. The fallback
//!   is logged at WARN so asymmetric topologies are visible to operators.
//!
//! Both policies are deterministic: identical inputs yield identical tables.

use crate::config::ClusterTopology;
use crate::error::{EplbError, Result};
use crate::mapping;
use crate::matrix;
use crate::packing::pack_layer;
use crate::permutation::Permutation;
use crate::replicate::{replicate_experts, replicate_layer};

/// The forward placement tables, indexed `[layer][...]`.
///
/// Global physical slot ids are `gpu_id * slots_per_gpu + rank_on_gpu`, with
/// GPUs numbered node-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementTables {
    /// Logical expert served by each physical slot, `[layer][P]`.
    pub phy2log: Vec<Vec<usize>>,
    /// Replica ordinal of each slot among slots serving the same expert,
    /// `[layer][P]`.
    pub phyrank: Vec<Vec<usize>>,
    /// Replica count per logical expert, `[layer][E]`.
    pub logcnt: Vec<Vec<usize>>,
}

/// A complete placement: forward tables plus the reverse lookup.
///
/// Recomputed wholesale on every rebalance; consumers swap the whole value
/// atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpertPlacement {
    /// Logical expert served by each physical slot, `[layer][P]`.
    pub phy2log: Vec<Vec<usize>>,
    /// Replica ordinal of each slot, `[layer][P]`.
    pub phyrank: Vec<Vec<usize>>,
    /// Replica count per logical expert, `[layer][E]`.
    pub logcnt: Vec<Vec<usize>>,
    /// Reverse lookup, `[layer][E][max_replicas]`; `None` marks unused depth.
    pub log2phy: Vec<Vec<Vec<Option<usize>>>>,
}

impl ExpertPlacement {
    /// Number of model layers covered by the placement.
    pub fn num_layers(&self) -> usize {
        self.phy2log.len()
    }

    /// Total physical slots per layer.
    pub fn num_physical(&self) -> usize {
        self.phy2log.first().map_or(0, Vec::len)
    }

    /// Logical experts per layer.
    pub fn num_logical(&self) -> usize {
        self.logcnt.first().map_or(0, Vec::len)
    }

    /// Depth of the reverse table: the highest replica count over all
    /// layers and experts.
    pub fn max_replicas(&self) -> usize {
        self.log2phy
            .first()
            .and_then(|layer| layer.first())
            .map_or(0, Vec::len)
    }
}

/// Compute a full placement for the given load matrix and topology.
///
/// Chooses the hierarchical policy when `num_groups` divides evenly across
/// `num_nodes`, the flat fallback otherwise, then assembles the reverse
/// lookup table.
///
/// # Errors
///
/// Configuration errors for empty/ragged weight matrices, zero topology
/// fields, fewer physical slots than experts, or (on the hierarchical path)
/// any violated divisibility constraint. Error messages carry the offending
/// dimensions. Zero or tied weights are valid inputs, resolved by
/// lowest-index tie-breaks.
pub fn rebalance_experts(
    weight: &[Vec<f64>],
    topology: &ClusterTopology,
) -> Result<ExpertPlacement> {
    let (_, num_logical) = matrix::dims(weight)?;
    topology.validate()?;
    if topology.num_physical_experts < num_logical {
        return Err(EplbError::NotEnoughSlots {
            logical: num_logical,
            physical: topology.num_physical_experts,
        });
    }

    let tables = if topology.supports_hierarchical() {
        rebalance_hierarchical(weight, topology)?
    } else {
        tracing::warn!(
            num_groups = topology.num_groups,
            num_nodes = topology.num_nodes,
            "expert groups do not divide evenly across nodes; \
             using global placement without locality"
        );
        let rep = replicate_experts(weight, topology.num_physical_experts)?;
        PlacementTables {
            phy2log: rep.phy2log,
            phyrank: rep.phyrank,
            logcnt: rep.logcnt,
        }
    };

    let log2phy = mapping::build_log2phy(&tables.phy2log, &tables.phyrank, &tables.logcnt);
    Ok(ExpertPlacement {
        phy2log: tables.phy2log,
        phyrank: tables.phyrank,
        logcnt: tables.logcnt,
        log2phy,
    })
}

/// Static per-layer dimensions of the hierarchical decomposition.
struct HierarchicalDims {
    num_logical: usize,
    num_groups: usize,
    group_size: usize,
    num_nodes: usize,
    groups_per_node: usize,
    gpus_per_node: usize,
    slots_per_gpu: usize,
    /// Physical slots per node: `slots_per_gpu * gpus_per_node`.
    slots_per_node: usize,
    /// Node-local logical experts per node: `num_logical / num_nodes`.
    logicals_per_node: usize,
}

/// Two-level placement: groups onto nodes, replicas within nodes, slots onto
/// GPUs. Caller has verified `num_groups % num_nodes == 0` and `P >= E`.
fn rebalance_hierarchical(
    weight: &[Vec<f64>],
    topology: &ClusterTopology,
) -> Result<PlacementTables> {
    let (_, num_logical) = matrix::dims(weight)?;
    debug_assert!(topology.supports_hierarchical());

    if num_logical % topology.num_groups != 0 {
        return Err(EplbError::UnevenGrouping {
            experts: num_logical,
            groups: topology.num_groups,
        });
    }
    let gpus_per_node = topology.gpus_per_node()?;
    let slots_per_gpu = topology.slots_per_gpu()?;

    let dims = HierarchicalDims {
        num_logical,
        num_groups: topology.num_groups,
        group_size: num_logical / topology.num_groups,
        num_nodes: topology.num_nodes,
        groups_per_node: topology.num_groups / topology.num_nodes,
        gpus_per_node,
        slots_per_gpu,
        slots_per_node: slots_per_gpu * gpus_per_node,
        logicals_per_node: num_logical / topology.num_nodes,
    };

    let mut phy2log = Vec::with_capacity(weight.len());
    let mut phyrank = Vec::with_capacity(weight.len());
    let mut logcnt = Vec::with_capacity(weight.len());
    for row in weight {
        let (p2l, rank, cnt) = rebalance_layer(row, &dims)?;
        phy2log.push(p2l);
        phyrank.push(rank);
        logcnt.push(cnt);
    }
    Ok(PlacementTables {
        phy2log,
        phyrank,
        logcnt,
    })
}

fn rebalance_layer(
    weights: &[f64],
    dims: &HierarchicalDims,
) -> Result<(Vec<usize>, Vec<usize>, Vec<usize>)> {
    // Stage 1: aggregate load per expert group and pack groups onto nodes.
    let group_load: Vec<f64> = (0..dims.num_groups)
        .map(|g| {
            weights[g * dims.group_size..(g + 1) * dims.group_size]
                .iter()
                .sum()
        })
        .collect();
    let (group_pack, group_rank) = pack_layer(&group_load, dims.num_nodes, dims.groups_per_node);

    // Stage 2: the group permutation. Concatenating groups in (node, rank)
    // order gives every node a contiguous range of "node-local" logical ids;
    // each group contributes its experts in original order.
    let mut forward = vec![0usize; dims.num_logical];
    for g in 0..dims.num_groups {
        let base = (group_pack[g] * dims.groups_per_node + group_rank[g]) * dims.group_size;
        for offset in 0..dims.group_size {
            forward[g * dims.group_size + offset] = base + offset;
        }
    }
    let log2mlog = Permutation::new(forward)?;
    let mlog2log = log2mlog.inverse();
    let node_local_load = mlog2log.gather(weights);

    let total_slots = dims.slots_per_node * dims.num_nodes;
    let mut phy2log = vec![0usize; total_slots];
    let mut phyrank = vec![0usize; total_slots];
    let mut node_local_cnt = vec![0usize; dims.num_logical];

    for node in 0..dims.num_nodes {
        let log_base = node * dims.logicals_per_node;
        let slot_base = node * dims.slots_per_node;
        let node_load = &node_local_load[log_base..log_base + dims.logicals_per_node];

        // Stage 3: replicate hot experts within the node.
        let (slot2local, slot_rank, local_cnt) = replicate_layer(node_load, dims.slots_per_node);

        // Stage 4: pack the node's slots onto its GPUs by average load.
        let slot_load: Vec<f64> = slot2local
            .iter()
            .map(|&m| node_load[m] / local_cnt[m] as f64)
            .collect();
        let (gpu_pack, gpu_rank) = pack_layer(&slot_load, dims.gpus_per_node, dims.slots_per_gpu);
        let slot2packed = Permutation::new(
            gpu_pack
                .iter()
                .zip(&gpu_rank)
                .map(|(&gpu, &rank)| gpu * dims.slots_per_gpu + rank)
                .collect(),
        )?;
        let packed2slot = slot2packed.inverse();

        // Stage 5: compose back to global ids.
        for packed in 0..dims.slots_per_node {
            let slot = packed2slot.apply(packed);
            let mlog = log_base + slot2local[slot];
            phy2log[slot_base + packed] = mlog2log.apply(mlog);
            phyrank[slot_base + packed] = slot_rank[slot];
        }
        node_local_cnt[log_base..log_base + dims.logicals_per_node].copy_from_slice(&local_cnt);
    }

    let logcnt = log2mlog.gather(&node_local_cnt);
    Ok((phy2log, phyrank, logcnt))
}
