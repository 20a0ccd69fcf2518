//! The uniform path-selection variant (spec.md §4.1 step 2): every
//! eligible relay gets weight 1 regardless of bandwidth or flag subset,
//! the baseline used by testable property 5 (scenario S3).

use crate::err::Error;
use crate::path_selection::{compute_eligibility, via, EligibilityConfig, PathSelection};
use netdir_sim::{NetworkSnapshot, RelationshipPolicy};
use std::net::IpAddr;

/// Build a uniform-weighted `PathSelection` over `snap`.
pub fn build(
    snap: &NetworkSnapshot,
    policy: &RelationshipPolicy,
    cfg: &EligibilityConfig,
    sender_addr: IpAddr,
    recipient_addr: IpAddr,
) -> Result<PathSelection, Error> {
    let mut elig = compute_eligibility(snap, policy, cfg, sender_addr, recipient_addr);
    let n = snap.len();

    let weight_of = |eligible: &[bool]| -> Vec<f64> {
        (0..n).map(|i| if eligible[i] { 1.0 } else { 0.0 }).collect()
    };
    let exit_w = weight_of(&elig.may_exit);
    let entry_w = weight_of(&elig.may_entry);
    let mut middle_w = weight_of(&elig.may_middle);

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
    fn uniform_over_all_eligible_exits_is_one_over_n() {
        let snap = testnet::uniform_snapshot(500);
        let policy = RelationshipPolicy::subnet_only();
        let cfg = EligibilityConfig::standard(vec![443]);
        let sender = "1.2.3.4".parse().unwrap();
        let recipient = "5.6.7.8".parse().unwrap();
        let ps = build(&snap, &policy, &cfg, sender, recipient).unwrap();
        let n_eligible = (0..ps.len()).filter(|&x| ps.exit_prob(x) > 0.0).count();
        assert_eq!(n_eligible, 500);
        for x in 0..ps.len() {
            assert_float_eq!(ps.exit_prob(x), 1.0 / 500.0, abs <= 1e-9);
        }
    }
}
