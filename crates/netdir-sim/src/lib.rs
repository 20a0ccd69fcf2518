//! Read-only view of a routing-consensus snapshot.
//!
//! A [`NetworkSnapshot`] owns an ordered vector of [`Relay`] records, a
//! symmetric family/subnet relation, an optional via-pair map, and the
//! eleven-entry role-weight multiplier table. It is built once from parsed
//! consensus/descriptor/via-pair input (parsing itself is out of scope
//! here, per spec.md §6) and is read-only thereafter; cross-references
//! within the crate are plain `usize` indices rather than pointers, so a
//! `NetworkSnapshot` never needs to hand out self-referential borrows.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod as_oracle;
pub mod err;
pub mod policy;
pub mod relay;
#[cfg(any(test, feature = "testing"))]
pub mod testnet;
pub mod weight;

pub use as_oracle::{AsPathOracle, StubAsOracle};
pub use err::Error;
pub use policy::RelationshipPolicy;
pub use relay::{ExitPolicy, GeoLocation, PolicyLine, Relay, RelayFlags};
pub use weight::{FlagSubset, MultiplierKey, MultiplierTable, Role};

use std::collections::HashMap;
use std::time::SystemTime;

/// A via-pair entry: a relay index that is a candidate intermediate hop
/// for the ordered (guard, exit) pairs listed.
pub type ViaMap = HashMap<usize, Vec<(usize, usize)>>;

/// Read-only view of relays with flags, bandwidth, family/subnet/AS
/// relations, and role-weight multipliers, as specified by spec.md §3.
#[derive(Clone, Debug)]
pub struct NetworkSnapshot {
    relays: Vec<Relay>,
    /// `related[i][j]` is `true` iff relays `i` and `j` share a family or
    /// subnet. Always symmetric and irreflexive-by-convention (the
    /// diagonal is never consulted).
    related: Vec<Vec<bool>>,
    multipliers: MultiplierTable,
    valid_after: SystemTime,
    via: ViaMap,
}

impl NetworkSnapshot {
    /// Build a snapshot from its constituent parts. Returns
    /// [`Error::MalformedSnapshot`] if `related` isn't a square, symmetric
    /// matrix matching `relays.len()`, or if any `via` entry names an
    /// out-of-range index.
    pub fn new(
        relays: Vec<Relay>,
        related: Vec<Vec<bool>>,
        multipliers: MultiplierTable,
        valid_after: SystemTime,
        via: ViaMap,
    ) -> Result<Self, Error> {
        let n = relays.len();
        if related.len() != n || related.iter().any(|row| row.len() != n) {
            return Err(Error::MalformedSnapshot(format!(
                "related matrix must be {n}x{n}"
            )));
        }
        for i in 0..n {
            for j in 0..n {
                if related[i][j] != related[j][i] {
                    return Err(Error::MalformedSnapshot(
                        "related matrix must be symmetric".into(),
                    ));
                }
            }
        }
        for (&via_idx, pairs) in &via {
            if via_idx >= n {
                return Err(Error::MalformedSnapshot(format!(
                    "via entry references out-of-range index {via_idx}"
                )));
            }
            for &(g, x) in pairs {
                if g >= n || x >= n {
                    return Err(Error::MalformedSnapshot(format!(
                        "via entry for {via_idx} references out-of-range pair ({g}, {x})"
                    )));
                }
            }
        }
        for (idx, relay) in relays.iter().enumerate() {
            if relay.index != idx {
                return Err(Error::MalformedSnapshot(format!(
                    "relay at position {idx} carries index {}",
                    relay.index
                )));
            }
        }
        Ok(NetworkSnapshot {
            relays,
            related,
            multipliers,
            valid_after,
            via,
        })
    }

    /// Number of relays in this snapshot.
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// `true` if this snapshot has no relays.
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Iterate over all relays in index order.
    pub fn relays(&self) -> impl Iterator<Item = &Relay> {
        self.relays.iter()
    }

    /// Fetch the relay at `index`.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`: an out-of-range relay index
    /// anywhere in this system is a programming error (spec.md §7's
    /// `OutOfRangeIndex`, fatal and non-recoverable), not a value to
    /// propagate as a `Result`.
    pub fn relay(&self, index: usize) -> &Relay {
        &self.relays[index]
    }

    /// `true` iff relays `i` and `j` share a family or subnet.
    pub fn related(&self, i: usize, j: usize) -> bool {
        self.related[i][j]
    }

    /// The role-weight multiplier table.
    pub fn multipliers(&self) -> &MultiplierTable {
        &self.multipliers
    }

    /// Consensus valid-after timestamp.
    pub fn valid_after(&self) -> SystemTime {
        self.valid_after
    }

    /// Via-pair candidates for relay `i`: the ordered (guard, exit) pairs
    /// for which `i` may serve as the forced/allowed middle hop.
    pub fn via_candidates(&self, i: usize) -> &[(usize, usize)] {
        self.via.get(&i).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `true` if this snapshot carries any via-pair entries at all.
    pub fn has_via_map(&self) -> bool {
        !self.via.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testnet;

    #[test]
    fn rejects_asymmetric_related_matrix() {
        let relays = testnet::small_relay_vec();
        let n = relays.len();
        let mut related = vec![vec![false; n]; n];
        related[0][1] = true; // not mirrored at [1][0]
        let err = NetworkSnapshot::new(
            relays,
            related,
            MultiplierTable::new(),
            std::time::UNIX_EPOCH,
            ViaMap::new(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_out_of_range_via_entry() {
        let relays = testnet::small_relay_vec();
        let n = relays.len();
        let related = vec![vec![false; n]; n];
        let mut via = ViaMap::new();
        via.insert(0, vec![(0, n + 1)]);
        let err = NetworkSnapshot::new(
            relays,
            related,
            MultiplierTable::new(),
            std::time::UNIX_EPOCH,
            via,
        );
        assert!(err.is_err());
    }

    #[test]
    fn accepts_well_formed_snapshot() {
        let snap = testnet::small_snapshot();
        assert!(snap.len() > 0);
        assert!(!snap.related(0, 2));
    }

    #[test]
    fn valid_after_round_trips_a_human_readable_timestamp() {
        let relays = testnet::small_relay_vec();
        let n = relays.len();
        let related = vec![vec![false; n]; n];
        let valid_after = humantime::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let snap = NetworkSnapshot::new(
            relays,
            related,
            MultiplierTable::new(),
            valid_after,
            ViaMap::new(),
        )
        .expect("fixture snapshot must be well-formed");
        assert_eq!(snap.valid_after(), valid_after);
    }
}
