//! Expert load tracking and rebalance gating.
//!
//! Accumulates per-layer, per-expert token counts over a sliding window of
//! forward passes and exposes the two things the scheduling loop needs:
//! the windowed-mean load matrix to feed [`crate::rebalance_experts`], and a
//! signal for *when* re-running the placement is worthwhile (high imbalance
//! at a configured step interval).
//!
//! The tracker is an owned value: counters live in the session that created
//! it, can be reset, and never leak into process-wide state. It performs no
//! synchronization: the caller aggregates counts across ranks before
//! recording, and hands the placement core one consistent snapshot.

use std::collections::VecDeque;

/// Configuration for [`ExpertLoadTracker`].
#[derive(Debug, Clone)]
pub struct LoadTrackerConfig {
    /// Number of MoE layers tracked.
    pub num_layers: usize,
    /// Logical experts per layer.
    pub num_experts: usize,
    /// Sliding window depth in steps; loads are averaged over the last
    /// `window_size` committed steps. Minimum 1.
    pub window_size: usize,
    /// Steps between rebalance checks. 0 disables rebalance signalling.
    pub rebalance_interval: usize,
    /// Imbalance ratio (`max_load / mean_load`, worst layer) above which
    /// rebalancing is recommended. Must be >= 1.0.
    pub imbalance_threshold: f64,
}

impl LoadTrackerConfig {
    /// Default parameters: window of 10 steps, check every 100 steps,
    /// trigger when the hottest expert sees twice the mean load.
    pub fn new(num_layers: usize, num_experts: usize) -> Self {
        Self {
            num_layers,
            num_experts,
            window_size: 10,
            rebalance_interval: 100,
            imbalance_threshold: 2.0,
        }
    }
}

/// Sliding-window token counters for all MoE layers.
pub struct ExpertLoadTracker {
    config: LoadTrackerConfig,
    /// Committed steps, oldest first; each entry is `[layer][expert]` counts.
    window: VecDeque<Vec<Vec<u64>>>,
    /// Accumulator for the step currently in flight.
    current: Vec<Vec<u64>>,
    /// Total committed steps since creation or the last reset.
    step_count: usize,
}

impl ExpertLoadTracker {
    /// Create a tracker.
    ///
    /// # Panics
    ///
    /// Panics when `num_layers`, `num_experts` or `window_size` is zero, or
    /// when `imbalance_threshold < 1.0`.
    pub fn new(config: LoadTrackerConfig) -> Self {
        assert!(config.num_layers > 0, "num_layers must be > 0");
        assert!(config.num_experts > 0, "num_experts must be > 0");
        assert!(config.window_size > 0, "window_size must be > 0");
        assert!(
            config.imbalance_threshold >= 1.0,
            "imbalance_threshold must be >= 1.0, got {}",
            config.imbalance_threshold
        );
        let current = vec![vec![0u64; config.num_experts]; config.num_layers];
        Self {
            config,
            window: VecDeque::new(),
            current,
            step_count: 0,
        }
    }

    /// Record routed tokens for one layer in the current step.
    ///
    /// `expert_ids` holds the logical expert chosen for each dispatched
    /// token (one entry per token-expert pair under top-k routing).
    /// `weights`, when given, contributes each token's routing weight
    /// instead of a flat 1.
    ///
    /// Out-of-range expert ids are ignored; validating router output is the
    /// router's job.
    pub fn record(&mut self, layer: usize, expert_ids: &[usize], weights: Option<&[f64]>) {
        debug_assert!(layer < self.config.num_layers, "layer out of range");
        debug_assert!(
            weights.is_none_or(|w| w.len() == expert_ids.len()),
            "weights length must match expert_ids length"
        );
        let counts = &mut self.current[layer];
        for (i, &expert) in expert_ids.iter().enumerate() {
            if expert < self.config.num_experts {
                counts[expert] += weights.map_or(1, |w| w[i].round() as u64);
            }
        }
    }

    /// Commit the current step into the window and reset the accumulator.
    /// Call once per forward pass, after all [`record`][Self::record] calls.
    pub fn step(&mut self) {
        let committed = std::mem::replace(
            &mut self.current,
            vec![vec![0u64; self.config.num_experts]; self.config.num_layers],
        );
        self.window.push_back(committed);
        if self.window.len() > self.config.window_size {
            self.window.pop_front();
        }
        self.step_count += 1;
    }

    /// Windowed mean load per layer and expert: the weight matrix consumed
    /// by [`crate::rebalance_experts`]. All zeros before the first committed
    /// step.
    pub fn load_matrix(&self) -> Vec<Vec<f64>> {
        let (l, e) = (self.config.num_layers, self.config.num_experts);
        if self.window.is_empty() {
            return vec![vec![0.0; e]; l];
        }
        let mut sums = vec![vec![0u64; e]; l];
        for step in &self.window {
            for (layer_sums, layer_counts) in sums.iter_mut().zip(step) {
                for (s, &c) in layer_sums.iter_mut().zip(layer_counts) {
                    *s += c;
                }
            }
        }
        let steps = self.window.len() as f64;
        sums.into_iter()
            .map(|layer| layer.into_iter().map(|s| s as f64 / steps).collect())
            .collect()
    }

    /// Worst per-layer imbalance ratio `max_load / mean_load` over the
    /// window. 1.0 when there is no data or every layer is perfectly flat.
    pub fn max_load_imbalance(&self) -> f64 {
        let load = self.load_matrix();
        let mut worst = 1.0f64;
        for layer in &load {
            let mean = layer.iter().sum::<f64>() / layer.len() as f64;
            if mean < 1e-9 {
                continue;
            }
            let max = layer.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            worst = worst.max(max / mean);
        }
        worst
    }

    /// Whether recomputing the placement is recommended now: rebalancing is
    /// enabled, the step count is a positive multiple of the interval, and
    /// the imbalance ratio exceeds the threshold.
    pub fn should_rebalance(&self) -> bool {
        let interval = self.config.rebalance_interval;
        if interval == 0 || self.step_count == 0 || self.step_count % interval != 0 {
            return false;
        }
        self.max_load_imbalance() > self.config.imbalance_threshold
    }

    /// Total committed steps since creation or the last reset.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Drop all recorded data, e.g. after a placement swap.
    pub fn reset(&mut self) {
        self.window.clear();
        for layer in &mut self.current {
            layer.fill(0);
        }
        self.step_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(num_layers: usize, num_experts: usize) -> ExpertLoadTracker {
        ExpertLoadTracker::new(LoadTrackerConfig {
            num_layers,
            num_experts,
            window_size: 5,
            rebalance_interval: 10,
            imbalance_threshold: 2.0,
        })
    }

    #[test]
    fn load_is_zero_before_first_step() {
        let t = tracker(2, 4);
        let load = t.load_matrix();
        assert_eq!(load.len(), 2);
        assert!(load.iter().flatten().all(|&x| x == 0.0));
        assert_eq!(t.max_load_imbalance(), 1.0);
    }

    #[test]
    fn record_accumulates_per_layer() {
        let mut t = tracker(2, 4);
        t.record(0, &[0, 0, 2], None);
        t.record(1, &[3], None);
        t.step();

        let load = t.load_matrix();
        assert_eq!(load[0], vec![2.0, 0.0, 1.0, 0.0]);
        assert_eq!(load[1], vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn weighted_recording() {
        let mut t = tracker(1, 2);
        t.record(0, &[0, 1], Some(&[3.0, 1.0]));
        t.step();
        assert_eq!(t.load_matrix()[0], vec![3.0, 1.0]);
    }

    #[test]
    fn window_evicts_oldest_step() {
        let mut t = ExpertLoadTracker::new(LoadTrackerConfig {
            num_layers: 1,
            num_experts: 2,
            window_size: 2,
            rebalance_interval: 0,
            imbalance_threshold: 2.0,
        });
        t.record(0, &[0; 10], None);
        t.step();
        t.record(0, &[0; 10], None);
        t.step();
        t.record(0, &[1; 10], None);
        t.step();

        // Window holds steps 2 and 3: expert 0 averages 5, expert 1 averages 5.
        let load = t.load_matrix();
        assert!((load[0][0] - 5.0).abs() < 1e-9);
        assert!((load[0][1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn imbalance_takes_worst_layer() {
        let mut t = tracker(2, 4);
        // Layer 0 balanced, layer 1 heavily skewed.
        t.record(0, &[0, 1, 2, 3], None);
        t.record(1, &[0; 9], None);
        t.record(1, &[1, 2, 3], None);
        t.step();

        // Layer 1: mean 3, max 9 → ratio 3.
        assert!((t.max_load_imbalance() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rebalance_only_at_interval_and_above_threshold() {
        let mut t = ExpertLoadTracker::new(LoadTrackerConfig {
            num_layers: 1,
            num_experts: 4,
            window_size: 5,
            rebalance_interval: 2,
            imbalance_threshold: 2.0,
        });
        t.record(0, &[0; 100], None);
        t.step();
        assert!(!t.should_rebalance(), "step 1 is not a multiple of 2");
        t.record(0, &[0; 100], None);
        t.step();
        assert!(t.should_rebalance(), "skewed load at the interval boundary");
    }

    #[test]
    fn rebalance_disabled_with_zero_interval() {
        let mut t = ExpertLoadTracker::new(LoadTrackerConfig {
            num_layers: 1,
            num_experts: 4,
            window_size: 5,
            rebalance_interval: 0,
            imbalance_threshold: 1.0,
        });
        t.record(0, &[0; 1000], None);
        t.step();
        assert!(!t.should_rebalance());
    }

    #[test]
    fn out_of_range_expert_ids_are_ignored() {
        let mut t = tracker(1, 2);
        t.record(0, &[0, 7], None);
        t.step();
        assert_eq!(t.load_matrix()[0], vec![1.0, 0.0]);
    }

    #[test]
    fn reset_clears_everything() {
        let mut t = tracker(1, 2);
        t.record(0, &[0, 1], None);
        t.step();
        t.reset();
        assert_eq!(t.step_count(), 0);
        assert!(t.load_matrix()[0].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn load_matrix_feeds_rebalance() {
        // End-to-end: tracked counts produce a valid placement.
        let mut t = tracker(1, 4);
        t.record(0, &[0; 50], None);
        t.record(0, &[1, 2, 3], None);
        t.step();

        let topo = crate::ClusterTopology::new(8, 2, 1, 2).unwrap();
        let placement = crate::rebalance_experts(&t.load_matrix(), &topo).unwrap();
        assert_eq!(placement.logcnt[0].iter().sum::<usize>(), 8);
        // The hot expert ends up with the most replicas.
        let max = placement.logcnt[0].iter().max().unwrap();
        assert_eq!(placement.logcnt[0][0], *max);
    }
}
