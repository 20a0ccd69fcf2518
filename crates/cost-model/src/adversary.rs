//! The budgeted adversary: a budget plus a [`CostMap`].

use crate::cost_map::CostMap;

/// A resource-bounded adversary: a nonnegative budget and the [`CostMap`]
/// it uses to price relay compromise.
#[derive(Clone, Debug, Default)]
pub struct Adversary {
    budget: f64,
    cost_map: CostMap,
}

impl Adversary {
    /// Construct an adversary with the given budget and an empty cost map.
    pub fn new(budget: f64) -> Self {
        debug_assert!(budget >= 0.0, "adversary budget must be nonnegative");
        Adversary {
            budget,
            cost_map: CostMap::new(),
        }
    }

    /// Convenience constructor mirroring the original's `KofNAdversary`:
    /// every relay costs exactly `1`, regardless of any PCFs later added
    /// to [`Adversary::cost_map_mut`].
    pub fn flat(budget: f64) -> Self {
        let mut a = Adversary::new(budget);
        a.cost_map.add_pcfs("ANY ? SET 1").expect("built-in PCF always parses");
        a
    }

    /// The adversary's budget.
    pub fn budget(&self) -> f64 {
        self.budget
    }

    /// Set the adversary's budget.
    pub fn set_budget(&mut self, budget: f64) {
        debug_assert!(budget >= 0.0, "adversary budget must be nonnegative");
        self.budget = budget;
    }

    /// Read-only access to the cost map.
    pub fn cost_map(&self) -> &CostMap {
        &self.cost_map
    }

    /// Mutable access to the cost map, for adding PCFs before committing.
    pub fn cost_map_mut(&mut self) -> &mut CostMap {
        &mut self.cost_map
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use netdir_sim::testnet;

    #[test]
    fn flat_adversary_costs_one_everywhere() {
        let mut adv = Adversary::flat(100.0);
        let relays = testnet::small_relay_vec();
        adv.cost_map_mut().commit(&relays);
        for i in 0..relays.len() {
            assert_eq!(adv.cost_map().cost(i), 1.0);
        }
    }
}
