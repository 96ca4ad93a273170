//! On-disk load snapshot for offline placement.
//!
//! A deployment can dump observed expert loads to a JSON document and
//! precompute the placement before a run starts, instead of waiting for the
//! online tracker to fill its window. The document carries the load matrix
//! together with the model-side grouping it was observed under:
//!
//! ```json
//! { "num_groups": 8, "num_nodes": 2, "weight": [[12.0, 3.5, ...], ...] }
//! ```
//!
//! This is the only on-disk format the placement core knows about.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ClusterTopology;
use crate::error::Result;
use crate::rebalance::{rebalance_experts, ExpertPlacement};

/// A persisted expert-load snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementSnapshot {
    /// Expert groups the loads were observed under.
    pub num_groups: usize,
    /// Nodes the loads were observed under.
    pub num_nodes: usize,
    /// Observed load per layer and logical expert.
    pub weight: Vec<Vec<f64>>,
}

impl PlacementSnapshot {
    /// Parse a snapshot from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the snapshot to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Write the snapshot to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Compute a placement from the stored loads, completing the topology
    /// with the slot and GPU counts of the target deployment.
    pub fn rebalance(
        &self,
        num_physical_experts: usize,
        num_gpus: usize,
    ) -> Result<ExpertPlacement> {
        let topology =
            ClusterTopology::new(num_physical_experts, self.num_groups, self.num_nodes, num_gpus)?;
        rebalance_experts(&self.weight, &topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let snapshot = PlacementSnapshot {
            num_groups: 2,
            num_nodes: 2,
            weight: vec![vec![1.0, 2.0, 3.0, 4.0]],
        };
        let json = snapshot.to_json().unwrap();
        let parsed = PlacementSnapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn parses_the_documented_field_names() {
        let json = r#"{"num_groups": 2, "num_nodes": 1, "weight": [[5.0, 1.0]]}"#;
        let snapshot = PlacementSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.num_groups, 2);
        assert_eq!(snapshot.num_nodes, 1);
        assert_eq!(snapshot.weight, vec![vec![5.0, 1.0]]);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(PlacementSnapshot::from_json("{\"num_groups\": 2}").is_err());
        assert!(PlacementSnapshot::from_json("not json").is_err());
    }

    #[test]
    fn rebalance_from_snapshot() {
        let snapshot = PlacementSnapshot {
            num_groups: 2,
            num_nodes: 2,
            weight: vec![vec![100.0, 1.0, 1.0, 1.0]],
        };
        let placement = snapshot.rebalance(6, 2).unwrap();
        assert_eq!(placement.logcnt[0].iter().sum::<usize>(), 6);
        assert_eq!(placement.logcnt[0], vec![2, 1, 2, 1]);
    }
}
