//! Reverse-lookup table assembly.
//!
//! The token-remap layer picks a logical expert per token and then needs one
//! of that expert's physical replicas. [`build_log2phy`] builds the table it
//! consults: `log2phy[layer][expert][rank]` is the physical slot holding
//! replica `rank` of `expert`, or `None` beyond the expert's replica count.
//! How a replica is chosen per token (e.g. hash of the token id modulo the
//! replica count) is the consumer's business.

/// Build the `[layer][expert][max_replicas]` reverse table from the forward
/// tables.
///
/// The table depth is the highest replica count over *all* layers and
/// experts, so every layer shares one rectangular shape; unused depth is
/// `None`. The function is pure: re-running it on the same inputs always
/// reproduces the identical table.
///
/// Inputs are trusted to be mutually consistent, as produced by
/// [`crate::rebalance_experts`] or [`crate::replicate_experts`].
pub fn build_log2phy(
    phy2log: &[Vec<usize>],
    phyrank: &[Vec<usize>],
    logcnt: &[Vec<usize>],
) -> Vec<Vec<Vec<Option<usize>>>> {
    let max_replicas = logcnt
        .iter()
        .flat_map(|layer| layer.iter().copied())
        .max()
        .unwrap_or(0);

    phy2log
        .iter()
        .zip(phyrank)
        .zip(logcnt)
        .map(|((p2l, ranks), cnt)| {
            let mut table = vec![vec![None; max_replicas]; cnt.len()];
            for (slot, (&expert, &rank)) in p2l.iter().zip(ranks).enumerate() {
                table[expert][rank] = Some(slot);
            }
            table
        })
        .collect()
}
