//! Relay records and the flags/policy types attached to them.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

bitflags! {
    /// Flags a relay may carry in the consensus. Purely additive: a relay's
    /// eligibility for a role only ever narrows as more flags are examined,
    /// never depends on the *absence* of an unrelated flag.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RelayFlags: u16 {
        /// Directory authority.
        const AUTHORITY = 1 << 0;
        /// Useless, or actively harmful, as an exit.
        const BAD_EXIT  = 1 << 1;
        /// Usable as an exit.
        const EXIT      = 1 << 2;
        /// Fast enough for high-bandwidth circuits.
        const FAST      = 1 << 3;
        /// Usable as a guard (entry) relay.
        const GUARD     = 1 << 4;
        /// Serves as a hidden-service directory.
        const HS_DIR    = 1 << 5;
        /// Has a registered nickname.
        const NAMED     = 1 << 6;
        /// Stable enough for long-lived circuits.
        const STABLE    = 1 << 7;
        /// Currently reachable and running.
        const RUNNING   = 1 << 8;
        /// Nickname is claimed by another relay too.
        const UNNAMED   = 1 << 9;
        /// Validated by the directory authorities.
        const VALID     = 1 << 10;
        /// Supports the v2 directory protocol.
        const V2_DIR    = 1 << 11;
    }
}

/// One line of a relay's exit policy: accept or reject a subnet/port range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyLine {
    /// Whether this line accepts or rejects matching traffic.
    pub accept: bool,
    /// The subnet this line applies to, in CIDR form. `None` matches any
    /// address (a bare `*`).
    pub subnet: Option<(IpAddr, u8)>,
    /// Inclusive port range this line applies to.
    pub port_range: (u16, u16),
}

/// A relay's exit policy: an ordered, first-match list of [`PolicyLine`]s.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExitPolicy {
    lines: Vec<PolicyLine>,
}

impl ExitPolicy {
    /// Build a policy from its ordered lines.
    pub fn new(lines: Vec<PolicyLine>) -> Self {
        ExitPolicy { lines }
    }

    /// Evaluate whether this policy permits traffic to `addr:port`,
    /// first-match among the policy's lines. An exit policy with no
    /// matching line rejects by default.
    pub fn permits(&self, addr: IpAddr, port: u16) -> bool {
        for line in &self.lines {
            let addr_matches = match line.subnet {
                None => true,
                Some((net, prefix)) => addr_in_subnet(addr, net, prefix),
            };
            let port_matches = port >= line.port_range.0 && port <= line.port_range.1;
            if addr_matches && port_matches {
                return line.accept;
            }
        }
        false
    }

    /// Number of distinct recipient ports (as opposed to the whole policy)
    /// this exit supports, out of a candidate port list. Used for the
    /// exit-support tie-break of spec.md §4.1 step 1.
    pub fn supported_port_count(&self, candidate_ports: &[u16], probe_addr: IpAddr) -> usize {
        candidate_ports
            .iter()
            .filter(|&&p| self.permits(probe_addr, p))
            .count()
    }
}

fn addr_in_subnet(addr: IpAddr, net: IpAddr, prefix: u8) -> bool {
    match (addr, net) {
        (IpAddr::V4(a), IpAddr::V4(n)) => {
            let mask = if prefix == 0 {
                0u32
            } else {
                u32::MAX << (32 - prefix.min(32))
            };
            (u32::from(a) & mask) == (u32::from(n) & mask)
        }
        (IpAddr::V6(a), IpAddr::V6(n)) => {
            let mask = if prefix == 0 {
                0u128
            } else {
                u128::MAX << (128 - prefix.min(128))
            };
            (u128::from(a) & mask) == (u128::from(n) & mask)
        }
        _ => false,
    }
}

/// Geographic location of a relay, as reported by the descriptor store's
/// geolocation lookup.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code, e.g. `"US"`.
    pub country: [u8; 2],
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoLocation {
    /// Build a location from a two-letter country code and coordinates.
    pub fn new(country: &str, lat: f64, lon: f64) -> Self {
        let bytes = country.as_bytes();
        let mut code = [b'?', b'?'];
        if bytes.len() == 2 {
            code[0] = bytes[0];
            code[1] = bytes[1];
        }
        GeoLocation {
            country: code,
            lat,
            lon,
        }
    }

    /// The country code as a `&str`.
    pub fn country_str(&self) -> &str {
        std::str::from_utf8(&self.country).unwrap_or("??")
    }
}

/// One relay in the network snapshot.
///
/// Identified by its position (`index`) in the snapshot's relay vector;
/// all cross-references inside this crate are by index rather than by
/// pointer or `Arc`, per spec.md §9's back-reference redesign note.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Relay {
    /// Position of this relay within its owning [`crate::NetworkSnapshot`].
    pub index: usize,
    /// Relay nickname.
    pub nickname: String,
    /// Hex-encoded relay fingerprint, without a leading `0x`.
    pub fingerprint: String,
    /// Relay's advertised address.
    pub address: IpAddr,
    /// Bandwidth assigned by the consensus. Always `>= 0`.
    pub bandwidth: u64,
    /// Averaged bandwidth from the descriptor store, when available.
    pub avg_bandwidth: Option<u64>,
    /// Flags carried in the consensus.
    pub flags: RelayFlags,
    /// Ordered, first-match exit policy.
    pub policy: ExitPolicy,
    /// Geolocation, when known.
    pub geo: Option<GeoLocation>,
    /// Autonomous system number, when known.
    pub as_number: Option<u32>,
    /// Autonomous system name, when known.
    pub as_name: Option<String>,
    /// Platform string (e.g. `"Tor 0.4.8.9 on Linux"`), for PCF predicates.
    pub platform: String,
    /// Tor version string, for PCF predicates.
    pub version: String,
    /// Unix timestamp at which the descriptor was published.
    pub published: i64,
}

impl Relay {
    /// `true` if this relay carries `flag`.
    pub fn has_flag(&self, flag: RelayFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Bandwidth to use for weighting: the descriptor-store average when
    /// present, otherwise the consensus bandwidth.
    pub fn effective_bandwidth(&self) -> u64 {
        self.avg_bandwidth.unwrap_or(self.bandwidth)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn policy_first_match() {
        let policy = ExitPolicy::new(vec![
            PolicyLine {
                accept: false,
                subnet: None,
                port_range: (25, 25),
            },
            PolicyLine {
                accept: true,
                subnet: None,
                port_range: (1, 65535),
            },
        ]);
        assert!(!policy.permits("1.2.3.4".parse().unwrap(), 25));
        assert!(policy.permits("1.2.3.4".parse().unwrap(), 443));
    }

    #[test]
    fn policy_no_match_rejects() {
        let policy = ExitPolicy::new(vec![PolicyLine {
            accept: true,
            subnet: None,
            port_range: (443, 443),
        }]);
        assert!(!policy.permits("1.2.3.4".parse().unwrap(), 80));
    }

    #[test]
    fn subnet_match_v4() {
        let net: IpAddr = "10.0.0.0".parse().unwrap();
        assert!(addr_in_subnet("10.0.0.42".parse().unwrap(), net, 24));
        assert!(!addr_in_subnet("10.0.1.42".parse().unwrap(), net, 24));
    }
}
