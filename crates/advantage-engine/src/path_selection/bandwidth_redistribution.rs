//! The bandwidth-redistribution path-selection variant (spec.md §4.1 step
//! 2): cap total exit weight to `target_fraction` of the eligible exit
//! bandwidth, sorting ascending and solving at each step for the smallest
//! cap that reaches the target sum, exactly as spec.md §10 calls for. The
//! bandwidth clipped off the exit sum spills into entry weights by raising
//! the lowest-bandwidth eligible entries up to a common floor — the mirror
//! image of the capping search — and any budget entry can't absorb spills
//! into middle weights the same way.

use crate::err::Error;
use crate::path_selection::{compute_eligibility, via, EligibilityConfig, PathSelection};
use netdir_sim::{NetworkSnapshot, RelationshipPolicy};
use std::net::IpAddr;

/// Smallest `cap` such that `sum(min(b, cap) for b in bandwidths) == target`.
/// `bandwidths` must be sorted ascending. Returns `f64::INFINITY` if
/// `target` is at or above the uncapped sum.
fn solve_cap(bandwidths: &[f64], target: f64) -> f64 {
    let k = bandwidths.len();
    let mut prefix = 0.0;
    for (i, &b) in bandwidths.iter().enumerate() {
        let remaining = (k - i) as f64;
        let candidate = prefix + remaining * b;
        if candidate >= target {
            return (target - prefix) / remaining;
        }
        prefix += b;
    }
    f64::INFINITY
}

/// Smallest `floor` such that raising every `b < floor` up to `floor` adds
/// exactly `budget` in total. `bandwidths` must be sorted ascending.
/// Returns `(floor, leftover)`: `leftover` is whatever `budget` couldn't be
/// absorbed even by raising every relay to the largest bandwidth present.
fn spill_into(bandwidths: &[f64], budget: f64) -> (f64, f64) {
    let k = bandwidths.len();
    if k == 0 || budget <= 0.0 {
        return (bandwidths.last().copied().unwrap_or(0.0), budget.max(0.0));
    }
    let mut prefix = 0.0; // sum of bandwidths[0..i]
    for (i, &b) in bandwidths.iter().enumerate() {
        if i > 0 {
            let raised = i as f64 * b - prefix;
            if budget <= raised {
                return ((budget + prefix) / i as f64, 0.0);
            }
        }
        prefix += b;
    }
    let max_b = bandwidths[k - 1];
    let total_possible = k as f64 * max_b - prefix;
    (max_b, (budget - total_possible).max(0.0))
}

fn sorted_eligible(raw: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = raw.iter().copied().filter(|&b| b > 0.0).collect();
    v.sort_by(|a, b| a.partial_cmp(b).expect("bandwidth is finite"));
    v
}

/// Build a bandwidth-redistribution `PathSelection`: exit weight is capped
/// to `target_fraction` of the eligible exit bandwidth, and the clipped
/// mass spills into entry weight first, then middle.
pub fn build(
    snap: &NetworkSnapshot,
    policy: &RelationshipPolicy,
    cfg: &EligibilityConfig,
    target_fraction: f64,
    sender_addr: IpAddr,
    recipient_addr: IpAddr,
) -> Result<PathSelection, Error> {
    if !(0.0..=1.0).contains(&target_fraction) || !target_fraction.is_finite() {
        return Err(Error::InvalidBandwidthFraction(target_fraction));
    }
    let mut elig = compute_eligibility(snap, policy, cfg, sender_addr, recipient_addr);
    let n = snap.len();

    let raw = |eligible: &[bool]| -> Vec<f64> {
        (0..n)
            .map(|i| {
                if eligible[i] {
                    snap.relay(i).effective_bandwidth() as f64
                } else {
                    0.0
                }
            })
            .collect()
    };
    let raw_exit = raw(&elig.may_exit);
    let raw_entry = raw(&elig.may_entry);
    let raw_middle = raw(&elig.may_middle);

    let exit_sorted = sorted_eligible(&raw_exit);
    let total_exit: f64 = exit_sorted.iter().sum();
    let target_exit_sum = target_fraction * total_exit;
    let cap = solve_cap(&exit_sorted, target_exit_sum);
    let exit_w: Vec<f64> = raw_exit
        .iter()
        .map(|&b| if b > 0.0 { b.min(cap) } else { 0.0 })
        .collect();
    let excess = (total_exit - exit_w.iter().sum::<f64>()).max(0.0);

    let entry_sorted = sorted_eligible(&raw_entry);
    let (entry_floor, leftover_after_entry) = spill_into(&entry_sorted, excess);
    let entry_w: Vec<f64> = raw_entry
        .iter()
        .map(|&b| if b > 0.0 { b.max(entry_floor) } else { 0.0 })
        .collect();

    let middle_sorted = sorted_eligible(&raw_middle);
    let (middle_floor, _unabsorbed) = spill_into(&middle_sorted, leftover_after_entry);
    let mut middle_w: Vec<f64> = raw_middle
        .iter()
        .map(|&b| if b > 0.0 { b.max(middle_floor) } else { 0.0 })
        .collect();

    via::inflate_vanilla(snap, &mut elig, &exit_w, &entry_w, &mut middle_w);

    PathSelection::assemble(
        snap,
        policy,
        elig,
        exit_w,
        entry_w,
        middle_w,
        sender_addr,
        recipient_addr,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use float_eq::assert_float_eq;
    use netdir_sim::testnet;

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let snap = testnet::small_snapshot();
        let policy = RelationshipPolicy::subnet_only();
        let cfg = EligibilityConfig::standard(vec![443]);
        let sender = "1.2.3.4".parse().unwrap();
        let recipient = "5.6.7.8".parse().unwrap();
        let err = build(&snap, &policy, &cfg, 1.5, sender, recipient).unwrap_err();
        assert!(matches!(err, Error::InvalidBandwidthFraction(_)));
    }

    #[test]
    fn full_fraction_leaves_exit_weights_unchanged() {
        let snap = testnet::small_snapshot();
        let policy = RelationshipPolicy::subnet_only();
        let cfg = EligibilityConfig::standard(vec![443]);
        let sender = "1.2.3.4".parse().unwrap();
        let recipient = "5.6.7.8".parse().unwrap();
        let ps = build(&snap, &policy, &cfg, 1.0, sender, recipient).unwrap();
        let total: f64 = (0..ps.len()).map(|x| ps.exit_prob(x)).sum();
        assert_float_eq!(total, 1.0, abs <= 1e-9);
    }

    #[test]
    fn solve_cap_matches_manual_example() {
        let bandwidths = vec![10.0, 20.0, 40.0];
        // capping to sum 40: smallest cap c with 10+20+c>=... actually
        // solve directly for a sum reachable between b_1 and b_2 boundary.
        let cap = solve_cap(&bandwidths, 45.0);
        let achieved: f64 = bandwidths.iter().map(|&b| b.min(cap)).sum();
        assert_float_eq!(achieved, 45.0, abs <= 1e-9);
    }

    #[test]
    fn spill_into_conserves_budget_when_absorbable() {
        let bandwidths = vec![5.0, 10.0, 50.0];
        let (floor, leftover) = spill_into(&bandwidths, 12.0);
        assert_float_eq!(leftover, 0.0, abs <= 1e-9);
        let added: f64 = bandwidths.iter().map(|&b| b.max(floor) - b).sum();
        assert_float_eq!(added, 12.0, abs <= 1e-9);
    }
}
