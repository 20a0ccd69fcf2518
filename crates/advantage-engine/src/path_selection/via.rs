//! Via-relay inflation (spec.md §4.1 step 4).
//!
//! spec.md §9 warns that the vanilla and latency-aware via-inflation
//! formulas must stay two distinct code paths rather than merge into one,
//! since the latency-aware variant's formula has "a slightly different
//! structure". This module holds the shared plumbing (computing the
//! per-relay entry/exit probability sums a via candidate needs) plus the
//! two distinct `inflate_*` entry points variant `build` functions call.

use crate::path_selection::Eligibility;
use netdir_sim::NetworkSnapshot;
use tracing::warn;

/// The vanilla via-relay inflation formula: for every relay `i` appearing
/// as a via candidate, force it enabled as middle and scale its middle
/// weight by
/// `1 + sum_{(g', x') in via[i]} (entryProb(g') + exitProb(x')) / middleProb(i)`,
/// where `entryProb`/`exitProb`/`middleProb` are evaluated against the
/// *pre-inflation* weight vectors (passed in as `exit_w`/`entry_w`, with
/// `middle_w` mutated in place).
pub fn inflate_vanilla(
    snap: &NetworkSnapshot,
    elig: &mut Eligibility,
    exit_w: &[f64],
    entry_w: &[f64],
    middle_w: &mut [f64],
) {
    if !snap.has_via_map() {
        return;
    }
    let sum_exit: f64 = exit_w.iter().sum();
    let sum_entry: f64 = entry_w.iter().sum();
    if sum_exit <= 0.0 || sum_entry <= 0.0 {
        return;
    }
    for i in 0..snap.len() {
        let candidates = snap.via_candidates(i);
        if candidates.is_empty() {
            continue;
        }
        elig.may_middle[i] = true;
        if middle_w[i] <= 0.0 {
            // No baseline middle weight to scale: the relay had no
            // independent middle probability before inflation, so treat
            // it as contributing only through via usage, at unit weight.
            warn!(relay = i, "via candidate has zero middle weight, falling back to unit weight");
            middle_w[i] = 1.0;
        }
        let middle_prob_i = middle_w[i] / middle_w.iter().sum::<f64>();
        if middle_prob_i <= 0.0 {
            continue;
        }
        let extra: f64 = candidates
            .iter()
            .map(|&(g, x)| (entry_w[g] / sum_entry) + (exit_w[x] / sum_exit))
            .sum();
        middle_w[i] *= 1.0 + extra / middle_prob_i;
    }
}

/// The latency-aware (geo-clustered) via-relay inflation formula. Unlike
/// the vanilla formula, the latency-aware model's `entryProb`/`exitProb`
/// are per-cluster probabilities divided uniformly among cluster members
/// (spec.md §4.1 step 2); the inflation here is expressed directly in
/// terms of the caller-supplied per-relay probabilities (already
/// uniform-divided) rather than re-deriving them from raw weights, which
/// is the "slightly different structure" spec.md §9 calls out.
pub fn inflate_geo_clustered(
    snap: &NetworkSnapshot,
    elig: &mut Eligibility,
    entry_prob: &[f64],
    exit_prob: &[f64],
    middle_w: &mut [f64],
) {
    if !snap.has_via_map() {
        return;
    }
    for i in 0..snap.len() {
        let candidates = snap.via_candidates(i);
        if candidates.is_empty() {
            continue;
        }
        elig.may_middle[i] = true;
        if middle_w[i] <= 0.0 {
            middle_w[i] = 1.0;
        }
        let sum_middle: f64 = middle_w.iter().sum();
        let middle_prob_i = middle_w[i] / sum_middle;
        if middle_prob_i <= 0.0 {
            continue;
        }
        let extra: f64 = candidates
            .iter()
            .map(|&(g, x)| entry_prob.get(g).copied().unwrap_or(0.0) + exit_prob.get(x).copied().unwrap_or(0.0))
            .sum();
        middle_w[i] *= 1.0 + extra / middle_prob_i;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path_selection::{compute_eligibility, EligibilityConfig};
    use netdir_sim::{testnet, RelationshipPolicy};

    #[test]
    fn vanilla_inflation_is_noop_without_via_map() {
        let snap = testnet::small_snapshot();
        let policy = RelationshipPolicy::subnet_only();
        let cfg = EligibilityConfig::standard(vec![443]);
        let sender = "1.2.3.4".parse().unwrap();
        let recipient = "5.6.7.8".parse().unwrap();
        let mut elig = compute_eligibility(&snap, &policy, &cfg, sender, recipient);
        let exit_w = vec![1.0; snap.len()];
        let entry_w = vec![1.0; snap.len()];
        let mut middle_w = vec![1.0; snap.len()];
        let before = middle_w.clone();
        inflate_vanilla(&snap, &mut elig, &exit_w, &entry_w, &mut middle_w);
        assert_eq!(before, middle_w);
    }
}
