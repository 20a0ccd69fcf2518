//! The exit-country-restricted variant (spec.md §4.1 step 2): vanilla
//! weighting, but `exitW[i] = 0` unless relay `i` is geolocated to the
//! configured country (scenario S5).

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

/// Build a `PathSelection` restricted to exits geolocated in `country`
/// (a two-letter ISO code, compared case-sensitively against
/// [`netdir_sim::GeoLocation::country_str`]).
pub fn build(
    snap: &NetworkSnapshot,
    policy: &RelationshipPolicy,
    cfg: &EligibilityConfig,
    country: &str,
    sender_addr: IpAddr,
    recipient_addr: IpAddr,
) -> Result<PathSelection, Error> {
    let mut elig = compute_eligibility(snap, policy, cfg, sender_addr, recipient_addr);
    let n = snap.len();
    let multipliers = snap.multipliers();

    let exit_w: Vec<f64> = (0..n)
        .map(|i| {
            if !elig.may_exit[i] {
                return 0.0;
            }
            let in_country = snap
                .relay(i)
                .geo
                .map(|g| g.country_str() == country)
                .unwrap_or(false);
            if !in_country {
                elig.may_exit[i] = false;
                return 0.0;
            }
            role_weight(snap.relay(i), Role::Exit, multipliers)
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
    use netdir_sim::testnet;

    #[test]
    fn exit_probability_is_zero_outside_target_country() {
        let snap = testnet::small_snapshot();
        let policy = RelationshipPolicy::subnet_only();
        let cfg = EligibilityConfig::standard(vec![443]);
        let sender = "1.2.3.4".parse().unwrap();
        let recipient = "5.6.7.8".parse().unwrap();
        let ps = build(&snap, &policy, &cfg, "US", sender, recipient);
        match ps {
            Ok(ps) => {
                for x in 0..ps.len() {
                    if snap
                        .relay(x)
                        .geo
                        .map(|g| g.country_str() != "US")
                        .unwrap_or(true)
                    {
                        assert_eq!(ps.exit_prob(x), 0.0);
                    }
                }
            }
            Err(Error::EmptyEntryMass) => {
                // no relay in the test network is geolocated to "US";
                // an empty exit set failing construction is acceptable.
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
