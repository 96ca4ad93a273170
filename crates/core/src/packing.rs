//! Balanced packing of weighted groups into fixed-size packs.
//!
//! Partitions `G` weighted groups into `num_packs` packs of exactly
//! `G / num_packs` items each, keeping the aggregate weight per pack as flat
//! as a greedy pass allows. Used twice by the hierarchical placement: first
//! to spread expert groups across nodes, then to spread a node's physical
//! slots across its GPUs.
//!
//! Balanced partition is NP-hard; this is the classic longest-processing-time
//! greedy (`O(G log G + G · num_packs)` per layer). It does not guarantee the
//! minimal spread, but it is deterministic: the sort is stable and every
//! tie is broken by the lowest index.

use crate::error::{EplbError, Result};
use crate::matrix;

/// Result of [`balanced_packing`], indexed `[layer][group]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancedPacking {
    /// Pack each group was assigned to, in `0..num_packs`.
    pub pack_index: Vec<Vec<usize>>,
    /// Position of the group inside its pack, in `0..groups_per_pack`.
    pub rank_in_pack: Vec<Vec<usize>>,
}

/// Pack weighted groups into `num_packs` equal-size packs, per layer.
///
/// # Errors
///
/// Returns a configuration error when the weight matrix is empty or ragged,
/// when `num_packs` is zero, or when the group count is not a multiple of
/// `num_packs`; partial packs are never produced.
pub fn balanced_packing(weight: &[Vec<f64>], num_packs: usize) -> Result<BalancedPacking> {
    let (num_layers, num_groups) = matrix::dims(weight)?;
    if num_packs == 0 || num_groups % num_packs != 0 {
        return Err(EplbError::UnevenPacking {
            items: num_groups,
            packs: num_packs,
        });
    }
    let groups_per_pack = num_groups / num_packs;

    let mut pack_index = Vec::with_capacity(num_layers);
    let mut rank_in_pack = Vec::with_capacity(num_layers);
    for row in weight {
        let (packs, ranks) = pack_layer(row, num_packs, groups_per_pack);
        pack_index.push(packs);
        rank_in_pack.push(ranks);
    }
    Ok(BalancedPacking {
        pack_index,
        rank_in_pack,
    })
}

/// Pack a single layer's groups. Caller guarantees
/// `weights.len() == num_packs * groups_per_pack`.
pub(crate) fn pack_layer(
    weights: &[f64],
    num_packs: usize,
    groups_per_pack: usize,
) -> (Vec<usize>, Vec<usize>) {
    let num_groups = weights.len();
    debug_assert_eq!(num_groups, num_packs * groups_per_pack);

    // One group per pack: identity assignment, no balancing to do.
    if groups_per_pack == 1 {
        return ((0..num_groups).collect(), vec![0; num_groups]);
    }

    // Stable sort, heaviest first; tied groups keep ascending index order.
    let mut order: Vec<usize> = (0..num_groups).collect();
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));

    let mut pack_index = vec![0usize; num_groups];
    let mut rank_in_pack = vec![0usize; num_groups];
    let mut pack_weight = vec![0.0f64; num_packs];
    let mut pack_items = vec![0usize; num_packs];

    for &group in &order {
        // Lightest pack that still has room; strict `<` keeps the lowest
        // pack index on ties, which downstream determinism depends on.
        let mut chosen: Option<usize> = None;
        for pack in 0..num_packs {
            if pack_items[pack] == groups_per_pack {
                continue;
            }
            match chosen {
                Some(c) if pack_weight[pack] >= pack_weight[c] => {}
                _ => chosen = Some(pack),
            }
        }
        // Total capacity equals the group count, so a free pack always exists.
        let pack = chosen.expect("a pack with free capacity always exists");
        pack_index[group] = pack;
        rank_in_pack[group] = pack_items[pack];
        pack_weight[pack] += weights[group];
        pack_items[pack] += 1;
    }

    (pack_index, rank_in_pack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_one_group_per_pack() {
        let weight = vec![vec![5.0, 1.0, 3.0, 2.0]];
        let packing = balanced_packing(&weight, 4).unwrap();
        assert_eq!(packing.pack_index[0], vec![0, 1, 2, 3]);
        assert_eq!(packing.rank_in_pack[0], vec![0, 0, 0, 0]);
    }

    #[test]
    fn tied_weights_alternate_packs() {
        // All weights equal: the greedy pass alternates between the two packs
        // and fills ranks in index order.
        let weight = vec![vec![10.0; 6]];
        let packing = balanced_packing(&weight, 2).unwrap();
        assert_eq!(packing.pack_index[0], vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(packing.rank_in_pack[0], vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn heaviest_groups_spread_first() {
        // Weights 8,7,6,5: 8 and 7 must land in different packs.
        let weight = vec![vec![8.0, 7.0, 6.0, 5.0]];
        let packing = balanced_packing(&weight, 2).unwrap();
        let p = &packing.pack_index[0];
        assert_ne!(p[0], p[1]);
        // Greedy pairs the heaviest with the lightest: {8,5} and {7,6}.
        assert_eq!(p[0], p[3]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn every_pack_gets_exactly_groups_per_pack_items() {
        let weight = vec![vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0]];
        let num_packs = 4;
        let packing = balanced_packing(&weight, num_packs).unwrap();

        let mut counts = vec![0usize; num_packs];
        let mut seen_ranks = vec![Vec::new(); num_packs];
        for g in 0..8 {
            let p = packing.pack_index[0][g];
            counts[p] += 1;
            seen_ranks[p].push(packing.rank_in_pack[0][g]);
        }
        for p in 0..num_packs {
            assert_eq!(counts[p], 2, "pack {p} item count");
            seen_ranks[p].sort_unstable();
            assert_eq!(seen_ranks[p], vec![0, 1], "pack {p} ranks");
        }
    }

    #[test]
    fn layers_are_packed_independently() {
        let weight = vec![vec![9.0, 1.0, 1.0, 9.0], vec![1.0, 9.0, 9.0, 1.0]];
        let packing = balanced_packing(&weight, 2).unwrap();
        // Layer 0: heavy groups 0 and 3 split across packs.
        assert_ne!(packing.pack_index[0][0], packing.pack_index[0][3]);
        // Layer 1: heavy groups 1 and 2 split across packs.
        assert_ne!(packing.pack_index[1][1], packing.pack_index[1][2]);
    }

    #[test]
    fn all_zero_weights_are_valid() {
        // Adding a zero-weight group keeps a pack tied for lightest, so the
        // lowest-index pack fills up completely before the next one starts.
        let weight = vec![vec![0.0; 4]];
        let packing = balanced_packing(&weight, 2).unwrap();
        assert_eq!(packing.pack_index[0], vec![0, 0, 1, 1]);
        assert_eq!(packing.rank_in_pack[0], vec![0, 1, 0, 1]);
    }

    #[test]
    fn uneven_group_count_is_rejected() {
        let weight = vec![vec![1.0, 2.0, 3.0]];
        match balanced_packing(&weight, 2) {
            Err(EplbError::UnevenPacking { items, packs }) => {
                assert_eq!((items, packs), (3, 2));
            }
            other => panic!("expected uneven-packing error, got {other:?}"),
        }
    }

    #[test]
    fn zero_packs_is_rejected() {
        let weight = vec![vec![1.0, 2.0]];
        assert!(balanced_packing(&weight, 0).is_err());
    }
}
