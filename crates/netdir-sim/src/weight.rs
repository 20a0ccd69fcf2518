//! Role-weight multiplier table.
//!
//! The consensus assigns every relay a multiplier for each of the three
//! circuit-position roles, keyed by which of {Guard, Exit} flags the relay
//! carries. This mirrors `tor-netdir`'s `WeightRole`/bandwidth-weight
//! machinery, simplified to the eleven entries this system's scenario
//! actually needs (no `BeginDir`/`HsIntro`/`Unweighted` roles, since those
//! don't appear in the two-sender/two-recipient scenario).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A circuit position a relay might be selected to fill.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Role {
    /// The first hop of the circuit.
    Entry,
    /// The second hop of the circuit.
    Middle,
    /// The last hop of the circuit, facing the recipient.
    Exit,
}

/// Which subset of {Guard, Exit} flags a relay carries, for multiplier lookup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FlagSubset {
    /// Relay has both the Guard and Exit flags.
    GuardAndExit,
    /// Relay has the Guard flag only.
    GuardOnly,
    /// Relay has the Exit flag only.
    ExitOnly,
    /// Relay has neither flag.
    Neither,
}

impl FlagSubset {
    /// Classify a relay's (guard, exit) flag pair.
    pub fn classify(is_guard: bool, is_exit: bool) -> Self {
        match (is_guard, is_exit) {
            (true, true) => FlagSubset::GuardAndExit,
            (true, false) => FlagSubset::GuardOnly,
            (false, true) => FlagSubset::ExitOnly,
            (false, false) => FlagSubset::Neither,
        }
    }
}

/// A key into the role-weight multiplier table: one of the eleven entries
/// the consensus provides (role × flag-subset, less the nonsensical
/// "Entry, ExitOnly" combination which the consensus never actually weighs
/// differently from "Entry, Neither").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultiplierKey {
    /// The role being weighted for.
    pub role: Role,
    /// The relay's flag subset.
    pub flags: FlagSubset,
}

impl MultiplierKey {
    /// Construct a new lookup key.
    pub fn new(role: Role, flags: FlagSubset) -> Self {
        MultiplierKey { role, flags }
    }
}

/// The eleven-entry table of role-weight multipliers derived from the
/// consensus's bandwidth-weights line.
///
/// Lookups for a key the table doesn't carry fall back to `1.0`, matching
/// `tor-netdir::weight`'s behavior of treating an absent weight as neutral
/// rather than failing the whole snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MultiplierTable {
    entries: HashMap<MultiplierKey, f64>,
}

impl MultiplierTable {
    /// Construct an empty table; every lookup returns `1.0` until entries
    /// are inserted.
    pub fn new() -> Self {
        MultiplierTable {
            entries: HashMap::new(),
        }
    }

    /// Insert (or overwrite) one multiplier entry.
    pub fn insert(&mut self, key: MultiplierKey, multiplier: f64) {
        self.entries.insert(key, multiplier);
    }

    /// Look up the multiplier for a (role, flag-subset) pair.
    pub fn get(&self, role: Role, flags: FlagSubset) -> f64 {
        self.entries
            .get(&MultiplierKey::new(role, flags))
            .copied()
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unset_multiplier_is_neutral() {
        let t = MultiplierTable::new();
        assert_eq!(t.get(Role::Exit, FlagSubset::GuardAndExit), 1.0);
    }

    #[test]
    fn insert_then_get() {
        let mut t = MultiplierTable::new();
        t.insert(MultiplierKey::new(Role::Entry, FlagSubset::GuardOnly), 0.8);
        assert_eq!(t.get(Role::Entry, FlagSubset::GuardOnly), 0.8);
        assert_eq!(t.get(Role::Entry, FlagSubset::Neither), 1.0);
    }
}
