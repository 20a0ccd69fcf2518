//! Synthetic snapshot fixtures shared by this crate's own tests and by
//! downstream crates' tests, mirroring `tor-netdir::testnet`.

use crate::relay::{ExitPolicy, GeoLocation, PolicyLine, Relay, RelayFlags};
use crate::weight::{FlagSubset, MultiplierKey, MultiplierTable, Role};
use crate::{NetworkSnapshot, ViaMap};
use std::net::IpAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The fixed valid-after timestamp every fixture snapshot below uses.
fn fixture_valid_after() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

/// Build a small, fixed vector of relays exercising every role
/// combination: a guard+exit, a guard-only, an exit-only, a middle-only,
/// a bad exit, and a relay with no usable flags at all.
pub fn small_relay_vec() -> Vec<Relay> {
    let addr = |s: &str| -> IpAddr { s.parse().unwrap() };
    let open_all = ExitPolicy::new(vec![PolicyLine {
        accept: true,
        subnet: None,
        port_range: (1, 65535),
    }]);
    vec![
        Relay {
            index: 0,
            nickname: "GuardExit".into(),
            fingerprint: "AAAA".into(),
            address: addr("10.0.0.1"),
            bandwidth: 1_000_000,
            avg_bandwidth: None,
            flags: RelayFlags::GUARD | RelayFlags::EXIT | RelayFlags::VALID | RelayFlags::RUNNING,
            policy: open_all.clone(),
            geo: Some(GeoLocation::new("US", 40.0, -75.0)),
            as_number: Some(100),
            as_name: Some("AS-A".into()),
            platform: "Tor 0.4.8.9 on Linux".into(),
            version: "0.4.8.9".into(),
            published: 1_700_000_000,
        },
        Relay {
            index: 1,
            nickname: "GuardOnly".into(),
            fingerprint: "BBBB".into(),
            address: addr("10.0.0.2"),
            bandwidth: 500_000,
            avg_bandwidth: None,
            flags: RelayFlags::GUARD
                | RelayFlags::STABLE
                | RelayFlags::VALID
                | RelayFlags::RUNNING,
            policy: ExitPolicy::default(),
            geo: Some(GeoLocation::new("US", 41.0, -76.0)),
            as_number: Some(100),
            as_name: Some("AS-A".into()),
            platform: "Tor 0.4.8.9 on Linux".into(),
            version: "0.4.8.9".into(),
            published: 1_700_000_000,
        },
        Relay {
            index: 2,
            nickname: "ExitOnly".into(),
            fingerprint: "CCCC".into(),
            address: addr("10.0.1.1"),
            bandwidth: 800_000,
            avg_bandwidth: None,
            flags: RelayFlags::EXIT | RelayFlags::VALID | RelayFlags::RUNNING,
            policy: open_all.clone(),
            geo: Some(GeoLocation::new("DE", 52.0, 13.0)),
            as_number: Some(200),
            as_name: Some("AS-B".into()),
            platform: "Tor 0.4.8.9 on Linux".into(),
            version: "0.4.8.9".into(),
            published: 1_700_000_000,
        },
        Relay {
            index: 3,
            nickname: "MiddleOnly".into(),
            fingerprint: "DDDD".into(),
            address: addr("10.0.2.1"),
            bandwidth: 300_000,
            avg_bandwidth: None,
            flags: RelayFlags::VALID | RelayFlags::RUNNING | RelayFlags::FAST,
            policy: ExitPolicy::default(),
            geo: Some(GeoLocation::new("FR", 48.0, 2.0)),
            as_number: Some(300),
            as_name: Some("AS-C".into()),
            platform: "Tor 0.4.8.9 on Linux".into(),
            version: "0.4.8.9".into(),
            published: 1_700_000_000,
        },
        Relay {
            index: 4,
            nickname: "BadExit".into(),
            fingerprint: "EEEE".into(),
            address: addr("10.0.3.1"),
            bandwidth: 900_000,
            avg_bandwidth: None,
            flags: RelayFlags::EXIT
                | RelayFlags::BAD_EXIT
                | RelayFlags::VALID
                | RelayFlags::RUNNING,
            policy: open_all,
            geo: Some(GeoLocation::new("US", 37.0, -122.0)),
            as_number: Some(400),
            as_name: Some("AS-D".into()),
            platform: "Tor 0.4.8.9 on Linux".into(),
            version: "0.4.8.9".into(),
            published: 1_700_000_000,
        },
        Relay {
            index: 5,
            nickname: "Useless".into(),
            fingerprint: "FFFF".into(),
            address: addr("10.0.4.1"),
            bandwidth: 100_000,
            avg_bandwidth: None,
            flags: RelayFlags::empty(),
            policy: ExitPolicy::default(),
            geo: Some(GeoLocation::new("US", 39.0, -77.0)),
            as_number: Some(100),
            as_name: Some("AS-A".into()),
            platform: "Tor 0.4.8.9 on Linux".into(),
            version: "0.4.8.9".into(),
            published: 1_700_000_000,
        },
    ]
}

/// The standard role-weight multiplier table used by fixture snapshots:
/// all multipliers are `1.0` except a reduced weight for guard+exit relays
/// in the exit role, matching the consensus's usual discouragement of
/// double-duty relays.
pub fn small_multiplier_table() -> MultiplierTable {
    let mut t = MultiplierTable::new();
    t.insert(
        MultiplierKey::new(Role::Exit, FlagSubset::GuardAndExit),
        0.5,
    );
    t.insert(
        MultiplierKey::new(Role::Entry, FlagSubset::GuardAndExit),
        1.0,
    );
    t
}

/// Build a small snapshot with relays 0 and 1 marked family/subnet-related
/// to each other, and nothing else related.
pub fn small_snapshot() -> NetworkSnapshot {
    let relays = small_relay_vec();
    let n = relays.len();
    let mut related = vec![vec![false; n]; n];
    related[0][1] = true;
    related[1][0] = true;
    NetworkSnapshot::new(
        relays,
        related,
        small_multiplier_table(),
        fixture_valid_after(),
        ViaMap::new(),
    )
    .expect("fixture snapshot must be well-formed")
}

/// A larger uniform-bandwidth snapshot of `n` all-eligible relays, used by
/// the uniform-variant degeneracy property (spec.md §8 property 5 / S3).
pub fn uniform_snapshot(n: usize) -> NetworkSnapshot {
    let addr = |i: usize| -> IpAddr { format!("10.{}.{}.1", i / 256, i % 256).parse().unwrap() };
    let open_all = ExitPolicy::new(vec![PolicyLine {
        accept: true,
        subnet: None,
        port_range: (1, 65535),
    }]);
    let relays: Vec<Relay> = (0..n)
        .map(|i| Relay {
            index: i,
            nickname: format!("R{i}"),
            fingerprint: format!("{i:040X}"),
            address: addr(i),
            bandwidth: 1000,
            avg_bandwidth: None,
            flags: RelayFlags::GUARD
                | RelayFlags::EXIT
                | RelayFlags::VALID
                | RelayFlags::RUNNING
                | RelayFlags::STABLE
                | RelayFlags::FAST,
            policy: open_all.clone(),
            geo: Some(GeoLocation::new("US", 0.0, 0.0)),
            as_number: Some(i as u32),
            as_name: None,
            platform: "Tor 0.4.8.9 on Linux".into(),
            version: "0.4.8.9".into(),
            published: 1_700_000_000,
        })
        .collect();
    let related = vec![vec![false; n]; n];
    NetworkSnapshot::new(relays, related, MultiplierTable::new(), fixture_valid_after(), ViaMap::new())
        .expect("fixture snapshot must be well-formed")
}
