//! Cluster topology configuration for expert placement.

use serde::{Deserialize, Serialize};

use crate::error::{EplbError, Result};

/// Physical topology the placement is computed for.
///
/// All divisibility constraints between these fields and the weight matrix
/// are checked by [`crate::rebalance_experts`]; this struct only carries the
/// scalars and rejects zero-valued fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    /// Total number of physical expert slots across the whole cluster.
    /// Must be at least the number of logical experts.
    pub num_physical_experts: usize,
    /// Number of expert groups the model's router uses. Hierarchical
    /// placement keeps whole groups on one node.
    pub num_groups: usize,
    /// Number of server nodes.
    pub num_nodes: usize,
    /// Total number of GPUs across all nodes.
    pub num_gpus: usize,
}

impl ClusterTopology {
    /// Create a topology, rejecting zero-valued fields.
    pub fn new(
        num_physical_experts: usize,
        num_groups: usize,
        num_nodes: usize,
        num_gpus: usize,
    ) -> Result<Self> {
        let topo = Self {
            num_physical_experts,
            num_groups,
            num_nodes,
            num_gpus,
        };
        topo.validate()?;
        Ok(topo)
    }

    /// Reject topologies with zero-valued fields.
    pub fn validate(&self) -> Result<()> {
        if self.num_physical_experts == 0 {
            return Err(EplbError::InvalidTopology(
                "num_physical_experts must be > 0".into(),
            ));
        }
        if self.num_groups == 0 {
            return Err(EplbError::InvalidTopology("num_groups must be > 0".into()));
        }
        if self.num_nodes == 0 {
            return Err(EplbError::InvalidTopology("num_nodes must be > 0".into()));
        }
        if self.num_gpus == 0 {
            return Err(EplbError::InvalidTopology("num_gpus must be > 0".into()));
        }
        Ok(())
    }

    /// Whether expert groups divide evenly across nodes, i.e. whether the
    /// hierarchical placement policy applies.
    pub fn supports_hierarchical(&self) -> bool {
        self.num_groups % self.num_nodes == 0
    }

    /// Physical slots hosted by each GPU, when they divide evenly.
    pub fn slots_per_gpu(&self) -> Result<usize> {
        if self.num_physical_experts % self.num_gpus != 0 {
            return Err(EplbError::UnevenSlotSplit {
                slots: self.num_physical_experts,
                gpus: self.num_gpus,
            });
        }
        Ok(self.num_physical_experts / self.num_gpus)
    }

    /// GPUs hosted by each node, when they divide evenly.
    pub fn gpus_per_node(&self) -> Result<usize> {
        if self.num_gpus % self.num_nodes != 0 {
            return Err(EplbError::UnevenGpuSplit {
                gpus: self.num_gpus,
                nodes: self.num_nodes,
            });
        }
        Ok(self.num_gpus / self.num_nodes)
    }
}
