//! The worst-case anonymity-advantage engine (spec.md §4.2): a single
//! sweep over every ordered, distinct `(guard, middle, exit)` triple
//! across the four (sender, recipient) path selections, producing the
//! per-node and per-pair advantage tensors an [`optimiser`] budgets
//! against a compromise-cost adversary.
//!
//! Grounded in `original_source/.../worst_case_engine.cpp`'s triple sweep
//! and in this workspace's own [`crate::workpool::WorkPool`] redesign for
//! the parallel reduction: each worker accumulates into a private local
//! accumulator, and the partials are merged by plain summation once
//! every worker has joined.

pub mod optimiser;

use crate::err::Error;
use crate::matrix::TriMatrix;
use crate::path_selection::PathSelection;
use crate::workpool::{chunk_ranges, WorkPool};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One-sided advantage: `max(0, u - v)`.
fn phi(u: f64, v: f64) -> f64 {
    (u - v).max(0.0)
}

/// Per-node and per-pair advantage tensors for one anonymity notion,
/// split into the two labelled scenarios spec.md §4.2 sweeps (e.g. for
/// sender anonymity, scenario 1 is "guess sender A", scenario 2 is "guess
/// sender B").
#[derive(Clone, Debug)]
pub struct NotionTensors {
    /// Per-node delta, one vector per scenario.
    pub per_node: [Vec<f64>; 2],
    /// Per-relay-pair delta (entry/middle/exit pairs pooled into one
    /// symmetric matrix per scenario — see `DESIGN.md` for why the three
    /// role-pair categories spec.md lists share one matrix here).
    pub pairs: [TriMatrix<f64>; 2],
}

impl NotionTensors {
    fn new(n: usize) -> Self {
        NotionTensors {
            per_node: [vec![0.0; n], vec![0.0; n]],
            pairs: [TriMatrix::new(n.max(2)), TriMatrix::new(n.max(2))],
        }
    }
}

/// All tensors the worst-case sweep produces (spec.md §3/§4.2).
#[derive(Clone, Debug)]
pub struct Tensors {
    /// Sender-anonymity tensors (fixed recipient 1 vs recipient 2 views
    /// are symmetric, so only one representative pair is kept; see
    /// `DESIGN.md`).
    pub sender: NotionTensors,
    /// Recipient-anonymity tensors.
    pub recipient: NotionTensors,
    /// Relationship-anonymity tensors.
    pub relationship: NotionTensors,
    /// Direct adversarial advantage from controlling the recipient's
    /// server, reading the exit marginal directly: `[guess A, guess B]`.
    pub delta_server: [f64; 2],
    /// Direct adversarial advantage from controlling the sender's ISP,
    /// reading the entry marginal directly: `[guess recipient 1, guess
    /// recipient 2]`.
    pub delta_isp: [f64; 2],
}

struct LocalAccum {
    n: usize,
    sa_mid_entry: [Vec<f64>; 2],
    sa_exit_pooled: [Vec<f64>; 2],
    ra_exit_mid: [Vec<f64>; 2],
    ra_entry_pooled: [Vec<Vec<f64>>; 2],
    rel_all: [Vec<f64>; 2],
    pairs_sa: [TriMatrix<f64>; 2],
    pairs_ra: [TriMatrix<f64>; 2],
    pairs_rel: [TriMatrix<f64>; 2],
}

impl LocalAccum {
    fn new(n: usize) -> Self {
        LocalAccum {
            n,
            sa_mid_entry: [vec![0.0; n], vec![0.0; n]],
            sa_exit_pooled: [vec![0.0; n], vec![0.0; n]],
            ra_exit_mid: [vec![0.0; n], vec![0.0; n]],
            ra_entry_pooled: [vec![vec![0.0; n]; n], vec![vec![0.0; n]; n]],
            rel_all: [vec![0.0; n], vec![0.0; n]],
            pairs_sa: [TriMatrix::new(n.max(2)), TriMatrix::new(n.max(2))],
            pairs_ra: [TriMatrix::new(n.max(2)), TriMatrix::new(n.max(2))],
            pairs_rel: [TriMatrix::new(n.max(2)), TriMatrix::new(n.max(2))],
        }
    }

    fn add_pair(m: &mut TriMatrix<f64>, i: usize, j: usize, delta: f64) {
        let prev = *m.get(i, j);
        m.set(i, j, prev + delta);
    }

    /// Process every triple with the given fixed exit `x`.
    fn process_exit(
        &mut self,
        x: usize,
        ps_a1: &PathSelection,
        ps_a2: &PathSelection,
        ps_b1: &PathSelection,
        ps_b2: &PathSelection,
    ) {
        let n = self.n;
        let mut exit_sum_a1 = vec![0.0; n];
        let mut exit_sum_b1 = vec![0.0; n];

        let xa1 = ps_a1.exit_prob(x);
        let xa2 = ps_a2.exit_prob(x);
        let xb1 = ps_b1.exit_prob(x);
        let xb2 = ps_b2.exit_prob(x);
        if xa1 == 0.0 && xa2 == 0.0 && xb1 == 0.0 && xb2 == 0.0 {
            return;
        }

        for g in 0..n {
            if g == x {
                continue;
            }
            let ga1 = xa1 * ps_a1.entry_prob(g, x);
            let ga2 = xa2 * ps_a2.entry_prob(g, x);
            let gb1 = xb1 * ps_b1.entry_prob(g, x);
            let gb2 = xb2 * ps_b2.entry_prob(g, x);
            if ga1 == 0.0 && ga2 == 0.0 && gb1 == 0.0 && gb2 == 0.0 {
                continue;
            }
            for m in 0..n {
                if m == g || m == x {
                    continue;
                }
                let p_a1 = ga1 * ps_a1.middle_prob(m, g, x);
                let p_a2 = ga2 * ps_a2.middle_prob(m, g, x);
                let p_b1 = gb1 * ps_b1.middle_prob(m, g, x);
                let p_b2 = gb2 * ps_b2.middle_prob(m, g, x);
                if p_a1 == 0.0 && p_a2 == 0.0 && p_b1 == 0.0 && p_b2 == 0.0 {
                    continue;
                }

                // Sender anonymity (recipient 1 fixed): middle and entry
                // get direct per-triple phi; exit is pooled over g below.
                let sa1 = phi(p_a1, p_b1);
                let sa2 = phi(p_b1, p_a1);
                self.sa_mid_entry[0][m] += sa1;
                self.sa_mid_entry[0][g] += sa1;
                self.sa_mid_entry[1][m] += sa2;
                self.sa_mid_entry[1][g] += sa2;
                exit_sum_a1[m] += p_a1;
                exit_sum_b1[m] += p_b1;
                Self::add_pair(&mut self.pairs_sa[0], g, m, sa1);
                Self::add_pair(&mut self.pairs_sa[1], g, m, sa2);

                // Recipient anonymity (sender A fixed): exit and middle
                // get direct per-triple phi; entry is pooled into
                // probForEntryMiddlePair[g][m], summed over the
                // unobserved exit x across the whole sweep (every call
                // to `process_exit` on this accumulator contributes a
                // different x, so a plain += here already pools over x).
                let ra1 = phi(p_a1, p_a2);
                let ra2 = phi(p_a2, p_a1);
                self.ra_exit_mid[0][x] += ra1;
                self.ra_exit_mid[0][m] += ra1;
                self.ra_exit_mid[1][x] += ra2;
                self.ra_exit_mid[1][m] += ra2;
                self.ra_entry_pooled[0][g][m] += p_a1;
                self.ra_entry_pooled[1][g][m] += p_a2;
                Self::add_pair(&mut self.pairs_ra[0], x, m, ra1);
                Self::add_pair(&mut self.pairs_ra[1], x, m, ra2);

                // Relationship anonymity: P1 = (A1+B2)/2 vs P2 = (A2+B1)/2,
                // direct per-triple phi at every node (see `DESIGN.md`).
                let p1 = (p_a1 + p_b2) / 2.0;
                let p2 = (p_a2 + p_b1) / 2.0;
                let rel1 = phi(p1, p2);
                let rel2 = phi(p2, p1);
                for &node in &[g, m, x] {
                    self.rel_all[0][node] += rel1;
                    self.rel_all[1][node] += rel2;
                }
                Self::add_pair(&mut self.pairs_rel[0], g, m, rel1);
                Self::add_pair(&mut self.pairs_rel[1], g, m, rel2);
                Self::add_pair(&mut self.pairs_rel[0], g, x, rel1);
                Self::add_pair(&mut self.pairs_rel[1], g, x, rel2);
                Self::add_pair(&mut self.pairs_rel[0], m, x, rel1);
                Self::add_pair(&mut self.pairs_rel[1], m, x, rel2);
            }
        }

        for m in 0..n {
            if exit_sum_a1[m] == 0.0 && exit_sum_b1[m] == 0.0 {
                continue;
            }
            self.sa_exit_pooled[0][x] += phi(exit_sum_a1[m], exit_sum_b1[m]);
            self.sa_exit_pooled[1][x] += phi(exit_sum_b1[m], exit_sum_a1[m]);
        }
    }
}

/// Run the worst-case sweep over `snap`'s four path selections, chunking
/// the outer (exit) index across a [`WorkPool`].
pub fn compute(
    n: usize,
    ps_a1: &PathSelection,
    ps_a2: &PathSelection,
    ps_b1: &PathSelection,
    ps_b2: &PathSelection,
) -> Result<Tensors, Error> {
    for x in 0..n {
        for check in [
            ps_a1.exit_prob(x),
            ps_a2.exit_prob(x),
            ps_b1.exit_prob(x),
            ps_b2.exit_prob(x),
        ] {
            if !check.is_finite() {
                return Err(Error::NonFiniteProbability(tor_error::internal!(
                    "non-finite exit probability at relay {x}"
                )));
            }
        }
    }

    let workers = std::thread::available_parallelism()
        .map(|w| w.get())
        .unwrap_or(1);
    let ranges = chunk_ranges(n, workers);
    debug!(relay_count = n, worker_count = ranges.len(), "starting worst-case sweep");
    let partials: Arc<Mutex<Vec<LocalAccum>>> = Arc::new(Mutex::new(Vec::new()));

    let ps_a1 = ps_a1.clone();
    let ps_a2 = ps_a2.clone();
    let ps_b1 = ps_b1.clone();
    let ps_b2 = ps_b2.clone();

    let pool = WorkPool::with_workers(ranges.len().max(1));
    for range in ranges {
        let partials = Arc::clone(&partials);
        let ps_a1 = ps_a1.clone();
        let ps_a2 = ps_a2.clone();
        let ps_b1 = ps_b1.clone();
        let ps_b2 = ps_b2.clone();
        pool.submit(move || {
            let mut local = LocalAccum::new(n);
            for x in range {
                local.process_exit(x, &ps_a1, &ps_a2, &ps_b1, &ps_b2);
            }
            partials.lock().expect("accumulator mutex poisoned").push(local);
        });
    }
    pool.run_to_completion();

    let mut merged = LocalAccum::new(n);
    let locals = Arc::try_unwrap(partials)
        .expect("all workers joined")
        .into_inner()
        .expect("accumulator mutex poisoned");
    for local in locals {
        for s in 0..2 {
            for i in 0..n {
                merged.sa_mid_entry[s][i] += local.sa_mid_entry[s][i];
                merged.sa_exit_pooled[s][i] += local.sa_exit_pooled[s][i];
                merged.ra_exit_mid[s][i] += local.ra_exit_mid[s][i];
                merged.rel_all[s][i] += local.rel_all[s][i];
                for j in 0..n {
                    merged.ra_entry_pooled[s][i][j] += local.ra_entry_pooled[s][i][j];
                }
            }
            for (i, j, v) in local.pairs_sa[s].iter() {
                let prev = *merged.pairs_sa[s].get(i, j);
                merged.pairs_sa[s].set(i, j, prev + v);
            }
            for (i, j, v) in local.pairs_ra[s].iter() {
                let prev = *merged.pairs_ra[s].get(i, j);
                merged.pairs_ra[s].set(i, j, prev + v);
            }
            for (i, j, v) in local.pairs_rel[s].iter() {
                let prev = *merged.pairs_rel[s].get(i, j);
                merged.pairs_rel[s].set(i, j, prev + v);
            }
        }
    }

    // Finalise the pooled contributions: exit's sender-anon delta,
    // pooled over the unobserved entry g, and entry's recipient-anon
    // delta, pooled over the unobserved exit x.
    let mut sender = NotionTensors::new(n);
    let mut recipient = NotionTensors::new(n);
    for s in 0..2 {
        for i in 0..n {
            sender.per_node[s][i] = merged.sa_mid_entry[s][i] + merged.sa_exit_pooled[s][i];
        }
        sender.pairs[s] = merged.pairs_sa[s].clone();
        for g in 0..n {
            let mut acc = 0.0;
            for m in 0..n {
                if m == g {
                    continue;
                }
                let a = merged.ra_entry_pooled[0][g][m];
                let b = merged.ra_entry_pooled[1][g][m];
                acc += if s == 0 { phi(a, b) } else { phi(b, a) };
            }
            recipient.per_node[s][g] = merged.ra_exit_mid[s][g] + acc;
        }
        recipient.pairs[s] = merged.pairs_ra[s].clone();
    }

    let relationship = NotionTensors {
        per_node: merged.rel_all,
        pairs: merged.pairs_rel,
    };

    let delta_server = direct_marginal_phi(ps_a1.len(), |x| (ps_a1.exit_prob(x), ps_b1.exit_prob(x)));
    let delta_isp = direct_marginal_phi(ps_a1.len(), |g| {
        // entryProb needs a fixed exit to normalise against; approximate
        // the marginal by averaging over eligible exits (see DESIGN.md).
        let avg = |ps: &PathSelection| -> f64 {
            let xs: Vec<usize> = (0..ps.len()).filter(|&x| ps.exit_prob(x) > 0.0).collect();
            if xs.is_empty() {
                0.0
            } else {
                xs.iter().map(|&x| ps.entry_prob(g, x)).sum::<f64>() / xs.len() as f64
            }
        };
        (avg(&ps_a1), avg(&ps_a2))
    });

    Ok(Tensors {
        sender,
        recipient,
        relationship,
        delta_server,
        delta_isp,
    })
}

fn direct_marginal_phi(n: usize, f: impl Fn(usize) -> (f64, f64)) -> [f64; 2] {
    let mut d1 = 0.0;
    let mut d2 = 0.0;
    for i in 0..n {
        let (a, b) = f(i);
        d1 += phi(a, b);
        d2 += phi(b, a);
    }
    [d1, d2]
}

/// The worst-case engine: the sweep's output tensors plus the
/// budgeted-optimiser queries the [`crate::facade::AnonymityFacade`]
/// exposes as upper bounds.
#[derive(Clone, Debug)]
pub struct WorstCaseEngine {
    tensors: Tensors,
}

impl WorstCaseEngine {
    /// Run the sweep once over the four path selections of a (sender,
    /// recipient) corner grid.
    pub fn build(
        n: usize,
        ps_a1: &PathSelection,
        ps_a2: &PathSelection,
        ps_b1: &PathSelection,
        ps_b2: &PathSelection,
    ) -> Result<Self, Error> {
        Ok(WorstCaseEngine {
            tensors: compute(n, ps_a1, ps_a2, ps_b1, ps_b2)?,
        })
    }

    fn augmented(notion: &NotionTensors, adversary: &cost_model::Adversary) -> [Vec<f64>; 2] {
        [
            optimiser::augment_with_pairs(&notion.per_node[0], &notion.pairs[0], adversary),
            optimiser::augment_with_pairs(&notion.per_node[1], &notion.pairs[1], adversary),
        ]
    }

    /// Upper bound on sender anonymity's advantage, given `adversary`.
    pub fn sender_upper_bound(&self, adversary: &cost_model::Adversary) -> f64 {
        let [d1, d2] = Self::augmented(&self.tensors.sender, adversary);
        optimiser::guarantee(
            &d1,
            &d2,
            (self.tensors.delta_server[0], self.tensors.delta_server[1]),
            adversary,
        )
    }

    /// Upper bound on recipient anonymity's advantage, given `adversary`.
    pub fn recipient_upper_bound(&self, adversary: &cost_model::Adversary) -> f64 {
        let [d1, d2] = Self::augmented(&self.tensors.recipient, adversary);
        optimiser::guarantee(
            &d1,
            &d2,
            (self.tensors.delta_isp[0], self.tensors.delta_isp[1]),
            adversary,
        )
    }

    /// Upper bound on relationship anonymity's advantage, given
    /// `adversary`. No flat endpoint-only term applies here (see
    /// `DESIGN.md`).
    pub fn relationship_upper_bound(&self, adversary: &cost_model::Adversary) -> f64 {
        let [d1, d2] = Self::augmented(&self.tensors.relationship, adversary);
        optimiser::guarantee(&d1, &d2, (0.0, 0.0), adversary)
    }

    /// Greedily chosen compromised-relay set maximising sender-anonymity
    /// advantage under `adversary`'s budget (scenario "guess sender A").
    pub fn sender_greedy_list(&self, adversary: &cost_model::Adversary) -> Vec<usize> {
        let [d1, _] = Self::augmented(&self.tensors.sender, adversary);
        optimiser::greedy_select(&d1, adversary)
    }

    /// Greedily chosen compromised-relay set for recipient anonymity.
    pub fn recipient_greedy_list(&self, adversary: &cost_model::Adversary) -> Vec<usize> {
        let [d1, _] = Self::augmented(&self.tensors.recipient, adversary);
        optimiser::greedy_select(&d1, adversary)
    }

    /// Greedily chosen compromised-relay set for relationship anonymity.
    pub fn relationship_greedy_list(&self, adversary: &cost_model::Adversary) -> Vec<usize> {
        let [d1, _] = Self::augmented(&self.tensors.relationship, adversary);
        optimiser::greedy_select(&d1, adversary)
    }

    /// The raw tensors, for diagnostics and tests.
    pub fn tensors(&self) -> &Tensors {
        &self.tensors
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path_selection::{vanilla, EligibilityConfig};
    use netdir_sim::{testnet, RelationshipPolicy};

    #[test]
    fn identical_selections_produce_zero_advantage() {
        let snap = testnet::small_snapshot();
        let policy = RelationshipPolicy::subnet_only();
        let cfg = EligibilityConfig::standard(vec![443]);
        let sender = "1.2.3.4".parse().unwrap();
        let recipient = "5.6.7.8".parse().unwrap();
        let ps = vanilla::build(&snap, &policy, &cfg, sender, recipient).unwrap();
        let n = ps.len();
        let tensors = compute(n, &ps, &ps, &ps, &ps).unwrap();
        assert!(tensors.sender.per_node[0].iter().all(|&v| v.abs() < 1e-9));
        assert!(tensors.recipient.per_node[0].iter().all(|&v| v.abs() < 1e-9));
        assert_eq!(tensors.delta_server, [0.0, 0.0]);
    }
}
