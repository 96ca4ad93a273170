//! Replica assignment for logical experts.
//!
//! Maps `E` logical experts onto `P >= E` physical slots. Every expert gets
//! one mandatory primary replica; each of the `P - E` redundant slots goes to
//! the expert whose *current average load* (`weight / replica count`) is
//! highest, so the hottest expert is always relieved next. This is exact for
//! the single "place one more replica" step and a greedy approximation
//! overall; no backtracking.
//!
//! The per-step maximum is taken from a priority queue keyed by average load
//! with ties broken toward the lowest expert index, `O((P−E)·log E)` per
//! layer. Only the chosen expert's average changes per step, so the queue
//! never holds stale entries and the result is identical to a full rescan.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{EplbError, Result};
use crate::matrix;

/// Result of [`replicate_experts`], indexed `[layer][...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replication {
    /// Logical expert served by each physical slot, `[layer][P]`.
    pub phy2log: Vec<Vec<usize>>,
    /// Replica ordinal of each binding among slots serving the same expert,
    /// `[layer][P]`.
    pub phyrank: Vec<Vec<usize>>,
    /// Replica count per logical expert, `[layer][E]`.
    /// `sum == P` and every entry is at least 1.
    pub logcnt: Vec<Vec<usize>>,
}

/// Candidate in the max-priority queue: highest average load wins, ties go
/// to the lowest expert index.
#[derive(Debug)]
struct Candidate {
    avg_load: f64,
    expert: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.avg_load
            .total_cmp(&other.avg_load)
            .then_with(|| other.expert.cmp(&self.expert))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Assign `num_physical` slots to logical experts, per layer.
///
/// # Errors
///
/// Returns a configuration error when the weight matrix is empty or ragged,
/// or when `num_physical` is smaller than the number of logical experts.
pub fn replicate_experts(weight: &[Vec<f64>], num_physical: usize) -> Result<Replication> {
    let (num_layers, num_logical) = matrix::dims(weight)?;
    if num_physical < num_logical {
        return Err(EplbError::NotEnoughSlots {
            logical: num_logical,
            physical: num_physical,
        });
    }

    let mut phy2log = Vec::with_capacity(num_layers);
    let mut phyrank = Vec::with_capacity(num_layers);
    let mut logcnt = Vec::with_capacity(num_layers);
    for row in weight {
        let (p2l, rank, cnt) = replicate_layer(row, num_physical);
        phy2log.push(p2l);
        phyrank.push(rank);
        logcnt.push(cnt);
    }
    Ok(Replication {
        phy2log,
        phyrank,
        logcnt,
    })
}

/// Replicate a single layer. Caller guarantees `num_physical >= weights.len()`.
pub(crate) fn replicate_layer(
    weights: &[f64],
    num_physical: usize,
) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let num_logical = weights.len();
    debug_assert!(num_physical >= num_logical);

    // Mandatory primaries: the first E slots map identically.
    let mut phy2log: Vec<usize> = (0..num_logical).collect();
    let mut phyrank = vec![0usize; num_logical];
    let mut logcnt = vec![1usize; num_logical];
    phy2log.reserve(num_physical - num_logical);
    phyrank.reserve(num_physical - num_logical);

    let mut queue: BinaryHeap<Candidate> = (0..num_logical)
        .map(|expert| Candidate {
            avg_load: weights[expert],
            expert,
        })
        .collect();

    for _slot in num_logical..num_physical {
        // The queue is seeded with one entry per expert and every pop is
        // followed by a push, so it is never empty here.
        let Candidate { expert, .. } = queue.pop().expect("queue holds one entry per expert");
        phy2log.push(expert);
        phyrank.push(logcnt[expert]);
        logcnt[expert] += 1;
        queue.push(Candidate {
            avg_load: weights[expert] / logcnt[expert] as f64,
            expert,
        });
    }

    (phy2log, phyrank, logcnt)
}
