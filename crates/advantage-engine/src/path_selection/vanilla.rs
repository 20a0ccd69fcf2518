//! The vanilla weighted path-selection variant (spec.md §4.1 step 2):
//! `weight = bandwidth · multiplier(role, flags)`, grounded in
//! `original_source/.../ps_tor.cpp` and in `tor-netdir`'s
//! `WeightRole`-keyed bandwidth-weight lookup.

use crate::err::Error;
use crate::path_selection::{compute_eligibility, via, EligibilityConfig, PathSelection};
use netdir_sim::{FlagSubset, NetworkSnapshot, RelationshipPolicy, RelayFlags, Role};
use std::net::IpAddr;

fn role_weight(relay: &netdir_sim::Relay, role: Role, multipliers: &netdir_sim::MultiplierTable) -> f64 {
    let flags = FlagSubset::classify(
        relay.has_flag(RelayFlags::GUARD),
        relay.has_flag(RelayFlags::EXIT),
    );
    relay.effective_bandwidth() as f64 * multipliers.get(role, flags)
}

/// Build a vanilla-weighted `PathSelection` over `snap` for the given
/// sender/recipient pair.
pub fn build(
    snap: &NetworkSnapshot,
    policy: &RelationshipPolicy,
    cfg: &EligibilityConfig,
    sender_addr: IpAddr,
    recipient_addr: IpAddr,
) -> Result<PathSelection, Error> {
    let mut elig = compute_eligibility(snap, policy, cfg, sender_addr, recipient_addr);
    let n = snap.len();
    let multipliers = snap.multipliers();

    let exit_w: Vec<f64> = (0..n)
        .map(|i| {
            if elig.may_exit[i] {
                role_weight(snap.relay(i), Role::Exit, multipliers)
            } else {
                0.0
            }
        })
        .collect();
    let entry_w: Vec<f64> = (0..n)
        .map(|i| {
            if elig.may_entry[i] {
                role_weight(snap.relay(i), Role::Entry, multipliers)
            } else {
                0.0
            }
        })
        .collect();
    let mut middle_w: Vec<f64> = (0..n)
        .map(|i| {
            if elig.may_middle[i] {
                role_weight(snap.relay(i), Role::Middle, multipliers)
            } else {
                0.0
            }
        })
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
    fn exit_probabilities_sum_to_one() {
        let snap = testnet::small_snapshot();
        let policy = RelationshipPolicy::subnet_only();
        let cfg = EligibilityConfig::standard(vec![443]);
        let sender = "1.2.3.4".parse().unwrap();
        let recipient = "5.6.7.8".parse().unwrap();
        let ps = build(&snap, &policy, &cfg, sender, recipient).unwrap();
        let total: f64 = (0..ps.len()).map(|x| ps.exit_prob(x)).sum();
        assert_float_eq!(total, 1.0, abs <= 1e-9);
    }
}
