//! [`CostMap`]: the materialized per-relay cost vector produced by
//! composing an ordered list of [`Pcf`]s.

use crate::err::Error;
use crate::pcf::Pcf;
use netdir_sim::Relay;
use tracing::debug;

/// Per-relay scalar cost, obtained by composing an ordered list of
/// programmable cost functions. Cost `0` denotes "free to compromise."
///
/// Commit semantics (spec.md §4.4): for each relay, starting from cost
/// `1`, every PCF whose predicate matches applies its effect in list
/// order; the final value is stored. Calling [`CostMap::commit`] again
/// with the same PCF list and the same relays reproduces the same costs
/// (testable property 6) because it always restarts from the cost-1
/// baseline rather than mutating in place.
#[derive(Clone, Debug, Default)]
pub struct CostMap {
    pcfs: Vec<Pcf>,
    costs: Vec<f64>,
}

impl CostMap {
    /// An empty cost map: every relay costs `1` until PCFs are added and
    /// committed.
    pub fn new() -> Self {
        CostMap::default()
    }

    /// Parse and append a `;`-separated PCF list to this map's PCF list.
    /// The new entries are ignored until [`CostMap::commit`] runs.
    pub fn add_pcfs(&mut self, expression: &str) -> Result<(), Error> {
        let mut parsed = Pcf::parse_list(expression)?;
        self.pcfs.append(&mut parsed);
        Ok(())
    }

    /// Remove all PCFs. Ignored until the next [`CostMap::commit`].
    pub fn reset(&mut self) {
        self.pcfs.clear();
    }

    /// `true` if this map has no PCFs at all (every relay costs 1).
    pub fn is_constant(&self) -> bool {
        self.pcfs.is_empty()
    }

    /// Recompute `costs` for every given relay, starting each relay from
    /// the cost-1 baseline and applying the PCF list in order.
    pub fn commit(&mut self, relays: &[Relay]) {
        debug!(pcf_count = self.pcfs.len(), relay_count = relays.len(), "committing cost map");
        self.costs = relays
            .iter()
            .map(|relay| {
                let mut cost = 1.0;
                for pcf in &self.pcfs {
                    cost = pcf.apply(relay, cost);
                }
                cost
            })
            .collect();
    }

    /// The committed cost of relay `index`. Returns `1.0` (the baseline)
    /// for an index that hasn't been committed yet, the way the original
    /// `Costmap::operator[]` initializes on first access.
    pub fn cost(&self, index: usize) -> f64 {
        self.costs.get(index).copied().unwrap_or(1.0)
    }

    /// `true` if `commit` has produced at least `expected_len` entries.
    pub fn is_initialized(&self, expected_len: usize) -> bool {
        self.costs.len() >= expected_len
    }

    /// The full committed cost vector.
    pub fn costs(&self) -> &[f64] {
        &self.costs
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use netdir_sim::testnet;

    #[test]
    fn commit_is_deterministic() {
        let relays = testnet::small_relay_vec();
        let mut map = CostMap::new();
        map.add_pcfs(r#"COUNTRY == "US" ? MUL 2"#).unwrap();
        map.commit(&relays);
        let first: Vec<f64> = map.costs().to_vec();
        map.commit(&relays);
        let second: Vec<f64> = map.costs().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn default_cost_is_one() {
        let map = CostMap::new();
        assert_eq!(map.cost(0), 1.0);
    }

    #[test]
    fn reset_clears_pcfs_but_not_committed_costs_until_next_commit() {
        let relays = testnet::small_relay_vec();
        let mut map = CostMap::new();
        map.add_pcfs("ANY ? SET 5").unwrap();
        map.commit(&relays);
        assert_eq!(map.cost(0), 5.0);
        map.reset();
        assert_eq!(map.cost(0), 5.0); // unaffected until recommit
        map.commit(&relays);
        assert_eq!(map.cost(0), 1.0);
    }
}
