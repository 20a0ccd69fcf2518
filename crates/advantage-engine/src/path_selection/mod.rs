//! Path-selection probability models.
//!
//! spec.md §9 calls for a "tagged variant" in place of an inheritance
//! hierarchy of path-selection algorithms: every variant shares the same
//! [`PathSelection`] probability-query surface (`exit_prob`, `entry_prob`,
//! `middle_prob`) and differs only in how its weight vectors were built.
//! Each variant lives in its own submodule as a `build` function that
//! returns a plain [`PathSelection`]; there is no trait object or vtable,
//! just five free functions funnelling into the shared
//! [`Eligibility`]/related-mass machinery below (spec.md §4.1 steps 1 and
//! 3), grounded in `tor-netdir`'s `Relay::is_flagged_*`/`WeightRole`
//! idiom and in `original_source/.../ps_tor.cpp`/`ps_uniform.cpp`.

pub mod bandwidth_redistribution;
pub mod country_restricted;
pub mod geo_clustered;
pub mod uniform;
pub mod vanilla;
mod via;

use crate::err::Error;
use crate::matrix::TriMatrix;
use netdir_sim::{NetworkSnapshot, RelationshipPolicy};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Role-eligibility configuration shared by every variant (spec.md §4.1
/// step 1): which flags are required outright, and which recipient ports
/// count as "long-lived" (triggering the Stable requirement).
#[derive(Clone, Debug)]
pub struct EligibilityConfig {
    /// Flags every eligible relay, in any role, must carry.
    pub required_flags: netdir_sim::RelayFlags,
    /// Ports considered long-lived; if the recipient opens any of these,
    /// every role additionally requires the Stable flag.
    pub long_lived_ports: BTreeSet<u16>,
    /// The recipient's open ports, used for exit-support eligibility and
    /// the Stable-requirement trigger above.
    pub recipient_ports: Vec<u16>,
}

impl EligibilityConfig {
    /// The usual Tor defaults: Valid+Running required, the classic
    /// "long-lived" port set (80 is deliberately excluded — see
    /// `tor-circmgr`'s `LongLivedPorts` list, which this mirrors).
    pub fn standard(recipient_ports: Vec<u16>) -> Self {
        let mut long_lived = BTreeSet::new();
        for p in [21, 22, 706, 1863, 5050, 5190, 5222, 5223, 6523, 6667, 6697, 8300] {
            long_lived.insert(p);
        }
        EligibilityConfig {
            required_flags: netdir_sim::RelayFlags::VALID | netdir_sim::RelayFlags::RUNNING,
            long_lived_ports: long_lived,
            recipient_ports,
        }
    }

    fn needs_stable(&self) -> bool {
        self.recipient_ports
            .iter()
            .any(|p| self.long_lived_ports.contains(p))
    }
}

/// The three per-role eligibility vectors computed by spec.md §4.1 step 1.
#[derive(Clone, Debug)]
pub struct Eligibility {
    /// `may_exit[i]` — relay `i` may serve as the circuit's exit.
    pub may_exit: Vec<bool>,
    /// `may_entry[i]` — relay `i` may serve as the circuit's entry/guard.
    pub may_entry: Vec<bool>,
    /// `may_middle[i]` — relay `i` may serve as the circuit's middle hop.
    pub may_middle: Vec<bool>,
}

/// Compute role eligibility for every relay in `snap`, given `cfg`, the
/// `policy` used to test "is this relay AS-related to every guard
/// candidate", and the sender/recipient addresses the AS check needs.
pub fn compute_eligibility(
    snap: &NetworkSnapshot,
    policy: &RelationshipPolicy,
    cfg: &EligibilityConfig,
    sender_addr: IpAddr,
    recipient_addr: IpAddr,
) -> Eligibility {
    use netdir_sim::RelayFlags as F;
    let n = snap.len();
    let needs_stable = cfg.needs_stable();

    let base_ok: Vec<bool> = (0..n)
        .map(|i| {
            let r = snap.relay(i);
            r.flags.contains(cfg.required_flags) && (!needs_stable || r.has_flag(F::STABLE))
        })
        .collect();

    // Provisional entry set, ignoring the "not the unique guard" exit
    // condition (which depends on this set).
    let provisional_entry: Vec<bool> = (0..n)
        .map(|i| base_ok[i] && snap.relay(i).has_flag(F::GUARD))
        .collect();
    let guard_candidates: Vec<usize> = (0..n).filter(|&i| provisional_entry[i]).collect();

    let may_middle: Vec<bool> = (0..n)
        .map(|i| {
            let r = snap.relay(i);
            // "non-guard-only": a relay dedicated solely to guard duty
            // (Guard flag, no Fast flag) is reserved for the entry role.
            let guard_only = r.has_flag(F::GUARD) && !r.has_flag(F::FAST);
            base_ok[i] && !guard_only
        })
        .collect();

    let may_exit: Vec<bool> = (0..n)
        .map(|i| {
            let r = snap.relay(i);
            if !base_ok[i] || !r.has_flag(F::EXIT) || r.has_flag(F::BAD_EXIT) {
                return false;
            }
            if cfg
                .recipient_ports
                .iter()
                .filter(|&&p| r.policy.permits(recipient_addr, p))
                .count()
                == 0
            {
                return false;
            }
            if guard_candidates.len() == 1 && guard_candidates[0] == i {
                return false; // the unique guard can't double as exit
            }
            let related_to_every_guard = !guard_candidates.is_empty()
                && guard_candidates
                    .iter()
                    .all(|&g| !policy.may_exit_entry(snap, i, g, sender_addr, recipient_addr));
            !related_to_every_guard
        })
        .collect();

    // Exit-support tie-break: keep only the relays matching the largest
    // recipient-port-support cardinality among exit candidates.
    let support_count = |i: usize| -> usize {
        snap.relay(i)
            .policy
            .supported_port_count(&cfg.recipient_ports, recipient_addr)
    };
    let max_support = (0..n).filter(|&i| may_exit[i]).map(support_count).max();
    let may_exit: Vec<bool> = match max_support {
        Some(max_support) => (0..n)
            .map(|i| may_exit[i] && support_count(i) == max_support)
            .collect(),
        None => may_exit,
    };

    Eligibility {
        may_exit,
        may_entry: provisional_entry,
        may_middle,
    }
}

/// The three related-mass vectors/matrices of spec.md §4.1 step 3, plus
/// the baked "may these two hops coexist" tables the query methods use
/// instead of re-consulting the policy (which needs a `&NetworkSnapshot`
/// that `PathSelection` itself doesn't retain).
#[derive(Clone, Debug)]
pub struct RelatedMass {
    /// For every exit `x`, the sum of entry weights of relays related to
    /// `x` (and hence excluded from the entry denominator for that exit).
    pub related_entry_mass: Vec<f64>,
    /// For every `(entry, exit)` pair, the sum of middle weights related
    /// to either hop.
    pub related_middle_mass: TriMatrix<f64>,
    /// `entry_exit_allowed[x][g]` — whether exit `x` and entry `g` may
    /// coexist in a circuit.
    pub entry_exit_allowed: Vec<Vec<bool>>,
    /// `exit_middle_allowed[x][m]` — whether exit `x` and middle `m` may
    /// coexist.
    pub exit_middle_allowed: Vec<Vec<bool>>,
    /// `entry_middle_allowed[g][m]` — whether entry `g` and middle `m`
    /// may coexist.
    pub entry_middle_allowed: Vec<Vec<bool>>,
}

/// Compute the related-mass precomputation, chunked over the outer (exit)
/// index the way spec.md describes ("parallelised over index chunks") —
/// here expressed as a plain sequential fold, since path-selection
/// construction runs once per corner and is not the hot sweep the engines
/// are.
pub fn compute_related_mass(
    snap: &NetworkSnapshot,
    policy: &RelationshipPolicy,
    elig: &Eligibility,
    entry_w: &[f64],
    middle_w: &[f64],
    sender_addr: IpAddr,
    recipient_addr: IpAddr,
) -> RelatedMass {
    let n = snap.len();

    let entry_exit_allowed: Vec<Vec<bool>> = (0..n)
        .map(|x| {
            (0..n)
                .map(|g| {
                    elig.may_exit[x]
                        && elig.may_entry[g]
                        && g != x
                        && policy.may_exit_entry(snap, x, g, sender_addr, recipient_addr)
                })
                .collect()
        })
        .collect();
    let exit_middle_allowed: Vec<Vec<bool>> = (0..n)
        .map(|x| {
            (0..n)
                .map(|m| {
                    elig.may_exit[x] && elig.may_middle[m] && m != x && policy.may_exit_middle(snap, x, m)
                })
                .collect()
        })
        .collect();
    let entry_middle_allowed: Vec<Vec<bool>> = (0..n)
        .map(|g| {
            (0..n)
                .map(|m| {
                    elig.may_entry[g] && elig.may_middle[m] && m != g && policy.may_entry_middle(snap, g, m)
                })
                .collect()
        })
        .collect();

    let related_entry_mass: Vec<f64> = (0..n)
        .map(|x| {
            if !elig.may_exit[x] {
                return 0.0;
            }
            (0..n)
                .filter(|&g| elig.may_entry[g] && g != x && !entry_exit_allowed[x][g])
                .map(|g| entry_w[g])
                .sum()
        })
        .collect();

    let mut related_middle_mass: TriMatrix<f64> = TriMatrix::new(n.max(2));
    for g in 0..n {
        if !elig.may_entry[g] {
            continue;
        }
        for x in 0..n {
            if g == x || !elig.may_exit[x] {
                continue;
            }
            let mass: f64 = (0..n)
                .filter(|&m| {
                    elig.may_middle[m]
                        && m != g
                        && m != x
                        && (!exit_middle_allowed[x][m] || !entry_middle_allowed[g][m])
                })
                .map(|m| middle_w[m])
                .sum();
            related_middle_mass.set(g, x, mass);
        }
    }

    RelatedMass {
        related_entry_mass,
        related_middle_mass,
        entry_exit_allowed,
        exit_middle_allowed,
        entry_middle_allowed,
    }
}

/// A constructed path-selection probability model: three boolean
/// eligibility vectors, three weight vectors, and the derived quantities
/// needed to answer `exit_prob`/`entry_prob`/`middle_prob` in O(1).
#[derive(Clone, Debug)]
pub struct PathSelection {
    may_exit: Vec<bool>,
    may_entry: Vec<bool>,
    may_middle: Vec<bool>,
    exit_w: Vec<f64>,
    entry_w: Vec<f64>,
    middle_w: Vec<f64>,
    sum_exit: f64,
    sum_entry: f64,
    related_entry_mass: Vec<f64>,
    related_middle_mass: TriMatrix<f64>,
    sum_middle: f64,
    entry_exit_allowed: Vec<Vec<bool>>,
    exit_middle_allowed: Vec<Vec<bool>>,
    entry_middle_allowed: Vec<Vec<bool>>,
}

impl PathSelection {
    /// Assemble a `PathSelection` from its precomputed pieces. Used by
    /// every variant's `build` function once it has its weight vectors.
    pub(crate) fn assemble(
        snap: &NetworkSnapshot,
        policy: &RelationshipPolicy,
        elig: Eligibility,
        exit_w: Vec<f64>,
        entry_w: Vec<f64>,
        middle_w: Vec<f64>,
        sender_addr: IpAddr,
        recipient_addr: IpAddr,
    ) -> Result<Self, Error> {
        let sum_exit: f64 = exit_w.iter().sum();
        let sum_middle: f64 = middle_w.iter().sum();
        if sum_exit <= 0.0 {
            return Err(Error::EmptyEntryMass);
        }
        let related = compute_related_mass(
            snap,
            policy,
            &elig,
            &entry_w,
            &middle_w,
            sender_addr,
            recipient_addr,
        );
        let sum_entry: f64 = entry_w.iter().sum();
        if related
            .related_entry_mass
            .iter()
            .zip(elig.may_exit.iter())
            .any(|(&mass, &allowed)| allowed && (sum_entry - mass) <= 0.0)
        {
            return Err(Error::EmptyEntryMass);
        }
        Ok(PathSelection {
            may_exit: elig.may_exit,
            may_entry: elig.may_entry,
            may_middle: elig.may_middle,
            exit_w,
            entry_w,
            middle_w,
            sum_exit,
            sum_entry,
            related_entry_mass: related.related_entry_mass,
            related_middle_mass: related.related_middle_mass,
            sum_middle,
            entry_exit_allowed: related.entry_exit_allowed,
            exit_middle_allowed: related.exit_middle_allowed,
            entry_middle_allowed: related.entry_middle_allowed,
        })
    }

    /// `exitProb(x)` of spec.md §3.
    pub fn exit_prob(&self, x: usize) -> f64 {
        if !self.may_exit[x] {
            return 0.0;
        }
        self.exit_w[x] / self.sum_exit
    }

    /// `entryProb(g, x)` of spec.md §3.
    pub fn entry_prob(&self, g: usize, x: usize) -> f64 {
        if g == x || !self.entry_exit_allowed[x][g] {
            return 0.0;
        }
        let denom = self.sum_entry - self.related_entry_mass[x];
        if denom <= 0.0 {
            return 0.0;
        }
        self.entry_w[g] / denom
    }

    /// `middleProb(m, g, x)` of spec.md §3.
    pub fn middle_prob(&self, m: usize, g: usize, x: usize) -> f64 {
        if g == x || m == g || m == x {
            return 0.0;
        }
        if !self.exit_middle_allowed[x][m] || !self.entry_middle_allowed[g][m] {
            return 0.0;
        }
        let related_mass = *self.related_middle_mass.get(g, x);
        let denom = self.sum_middle - related_mass;
        if denom <= 0.0 {
            return 0.0;
        }
        self.middle_w[m] / denom
    }

    /// Number of relays this path selection was built over.
    pub fn len(&self) -> usize {
        self.may_exit.len()
    }

    /// Relay eligibility vectors, for diagnostics and tests.
    pub fn eligibility(&self) -> (&[bool], &[bool], &[bool]) {
        (&self.may_exit, &self.may_entry, &self.may_middle)
    }
}
