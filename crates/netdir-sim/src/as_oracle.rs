//! The autonomous-system path-intersection collaborator seam.
//!
//! spec.md §6 names `ASPathOracle` as an external collaborator "currently
//! stubbed to the empty set"; §9 flags concrete AS-path lookup as an open
//! question not to be guessed at. This module preserves exactly that seam:
//! a trait any real lookup can implement, plus the always-empty stub that
//! ships here.

use std::collections::BTreeSet;
use std::net::IpAddr;

/// Given a pair of endpoints, returns the set of AS numbers any path
/// between them is known to cross.
pub trait AsPathOracle: Send + Sync {
    /// Look up the AS numbers on some path between `a` and `b`.
    fn as_path(&self, a: IpAddr, b: IpAddr) -> BTreeSet<u32>;
}

/// The stub shipped by this crate: always returns the empty set, so the
/// AS-path relationship predicate degrades to "never related via AS path"
/// until a real oracle is plugged in.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubAsOracle;

impl AsPathOracle for StubAsOracle {
    fn as_path(&self, _a: IpAddr, _b: IpAddr) -> BTreeSet<u32> {
        BTreeSet::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stub_is_always_empty() {
        let oracle = StubAsOracle;
        let a = "1.2.3.4".parse().unwrap();
        let b = "5.6.7.8".parse().unwrap();
        assert!(oracle.as_path(a, b).is_empty());
    }
}
