//! The latency-aware, geo-clustered path-selection variant (spec.md §4.1
//! step 2): partition eligible relays into latitude/longitude cells,
//! weight (exit-cluster, entry-cluster, middle-cluster) triples by
//! `(maxGreatCircleDistance − circuitDistance)^(1−α)`, prune entry
//! clusters outside the nearest `(20 + 80·α)%` by great-circle distance to
//! the sender, and fail with [`Error::NoReachableEntry`] if pruning leaves
//! nothing. [`PathSelection`] needs independent `exitW`/`entryW`/`middleW`
//! vectors rather than a joint triple distribution, so the per-cluster
//! joint weight is marginalised over the other two dimensions before
//! being divided uniformly among a cluster's eligible members — see
//! `DESIGN.md` for why that approximation is the right fit here.

use crate::err::Error;
use crate::path_selection::{compute_eligibility, via, EligibilityConfig, PathSelection};
use netdir_sim::{GeoLocation, NetworkSnapshot, RelationshipPolicy};
use std::collections::HashMap;
use std::net::IpAddr;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers.
fn haversine_km(a: GeoLocation, b: GeoLocation) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

fn cell_key(geo: GeoLocation, side: f64) -> (i64, i64) {
    ((geo.lat / side).floor() as i64, (geo.lon / side).floor() as i64)
}

fn centroid(points: &[GeoLocation]) -> GeoLocation {
    let n = points.len() as f64;
    let lat = points.iter().map(|g| g.lat).sum::<f64>() / n;
    let lon = points.iter().map(|g| g.lon).sum::<f64>() / n;
    GeoLocation::new("??", lat, lon)
}

/// Configuration specific to the geo-clustered variant.
#[derive(Clone, Copy, Debug)]
pub struct GeoClusterConfig {
    /// Side length, in degrees, of each latitude/longitude grid cell.
    pub cell_side_degrees: f64,
    /// Interpolation parameter in `[0, 1]` between "pure latency" (1) and
    /// "pure bandwidth-style spread" (0) — spec.md §4.1's `α`.
    pub alpha: f64,
    /// Sender's approximate geolocation, used for the entry-cluster
    /// pruning step.
    pub sender_geo: GeoLocation,
    /// Recipient's approximate geolocation, used in circuit-distance
    /// weighting.
    pub recipient_geo: GeoLocation,
}

struct Clusters {
    /// cluster key -> member relay indices eligible in the given role.
    members: HashMap<(i64, i64), Vec<usize>>,
    centroid: HashMap<(i64, i64), GeoLocation>,
}

fn build_clusters(snap: &NetworkSnapshot, eligible: &[bool], side: f64) -> Clusters {
    let mut members: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for i in 0..snap.len() {
        if !eligible[i] {
            continue;
        }
        if let Some(geo) = snap.relay(i).geo {
            members.entry(cell_key(geo, side)).or_default().push(i);
        }
    }
    let centroid = members
        .iter()
        .map(|(&key, idxs)| {
            let points: Vec<GeoLocation> = idxs
                .iter()
                .filter_map(|&i| snap.relay(i).geo)
                .collect();
            (key, centroid(&points))
        })
        .collect();
    Clusters { members, centroid }
}

/// Build a geo-clustered `PathSelection`.
pub fn build(
    snap: &NetworkSnapshot,
    policy: &RelationshipPolicy,
    cfg: &EligibilityConfig,
    geo_cfg: &GeoClusterConfig,
    sender_addr: IpAddr,
    recipient_addr: IpAddr,
) -> Result<PathSelection, Error> {
    let alpha = geo_cfg.alpha.clamp(0.0, 1.0);
    let mut elig = compute_eligibility(snap, policy, cfg, sender_addr, recipient_addr);
    let n = snap.len();

    let exit_clusters = build_clusters(snap, &elig.may_exit, geo_cfg.cell_side_degrees);
    let entry_clusters = build_clusters(snap, &elig.may_entry, geo_cfg.cell_side_degrees);
    let middle_clusters = build_clusters(snap, &elig.may_middle, geo_cfg.cell_side_degrees);

    // Entry-cluster pruning: keep only the nearest (20 + 80*alpha)% of
    // entry clusters by great-circle distance to the sender.
    let mut entry_keys: Vec<(i64, i64)> = entry_clusters.members.keys().copied().collect();
    entry_keys.sort_by(|a, b| {
        let da = haversine_km(geo_cfg.sender_geo, entry_clusters.centroid[a]);
        let db = haversine_km(geo_cfg.sender_geo, entry_clusters.centroid[b]);
        da.partial_cmp(&db).expect("distance is finite")
    });
    let keep_fraction = (0.20 + 0.80 * alpha).clamp(0.0, 1.0);
    let keep_count = ((entry_keys.len() as f64) * keep_fraction).ceil() as usize;
    let keep_count = keep_count.max(1).min(entry_keys.len());
    let kept_entry_keys: std::collections::HashSet<(i64, i64)> =
        entry_keys.into_iter().take(keep_count).collect();
    if kept_entry_keys.is_empty() {
        return Err(Error::NoReachableEntry);
    }

    // All cluster centroids (across roles) set the normalisation constant.
    let all_centroids: Vec<GeoLocation> = exit_clusters
        .centroid
        .values()
        .chain(entry_clusters.centroid.values())
        .chain(middle_clusters.centroid.values())
        .copied()
        .collect();
    let max_gcd = all_centroids
        .iter()
        .flat_map(|&a| all_centroids.iter().map(move |&b| haversine_km(a, b)))
        .fold(0.0_f64, f64::max);

    let weight_of = |circuit_distance: f64| -> f64 {
        if max_gcd <= 0.0 {
            return 1.0;
        }
        (max_gcd - circuit_distance).max(0.0).powf(1.0 - alpha)
    };

    // Joint triple weight, marginalised per role (see module docs).
    let mut exit_cluster_weight: HashMap<(i64, i64), f64> = HashMap::new();
    let mut entry_cluster_weight: HashMap<(i64, i64), f64> = HashMap::new();
    let mut middle_cluster_weight: HashMap<(i64, i64), f64> = HashMap::new();

    for (&ek, &ec) in &entry_clusters.centroid {
        if !kept_entry_keys.contains(&ek) {
            continue;
        }
        for (&mk, &mc) in &middle_clusters.centroid {
            for (&xk, &xc) in &exit_clusters.centroid {
                let circuit_distance = haversine_km(geo_cfg.sender_geo, ec)
                    + haversine_km(ec, mc)
                    + haversine_km(mc, xc)
                    + haversine_km(xc, geo_cfg.recipient_geo);
                let w = weight_of(circuit_distance);
                *entry_cluster_weight.entry(ek).or_insert(0.0) += w;
                *middle_cluster_weight.entry(mk).or_insert(0.0) += w;
                *exit_cluster_weight.entry(xk).or_insert(0.0) += w;
            }
        }
    }

    let spread = |clusters: &Clusters, cluster_weight: &HashMap<(i64, i64), f64>| -> Vec<f64> {
        let mut w = vec![0.0; n];
        for (key, idxs) in &clusters.members {
            let cw = cluster_weight.get(key).copied().unwrap_or(0.0);
            if cw <= 0.0 || idxs.is_empty() {
                continue;
            }
            let share = cw / idxs.len() as f64;
            for &i in idxs {
                w[i] = share;
            }
        }
        w
    };

    // Entry weight is zero for relays whose cluster got pruned.
    for (key, idxs) in &entry_clusters.members {
        if !kept_entry_keys.contains(key) {
            for &i in idxs {
                elig.may_entry[i] = false;
            }
        }
    }

    let exit_w = spread(&exit_clusters, &exit_cluster_weight);
    let entry_w = spread(&entry_clusters, &entry_cluster_weight);
    let mut middle_w = spread(&middle_clusters, &middle_cluster_weight);

    let sum_exit: f64 = exit_w.iter().sum();
    let sum_entry: f64 = entry_w.iter().sum();
    let exit_prob: Vec<f64> = exit_w
        .iter()
        .map(|&w| if sum_exit > 0.0 { w / sum_exit } else { 0.0 })
        .collect();
    let entry_prob: Vec<f64> = entry_w
        .iter()
        .map(|&w| if sum_entry > 0.0 { w / sum_entry } else { 0.0 })
        .collect();
    via::inflate_geo_clustered(snap, &mut elig, &entry_prob, &exit_prob, &mut middle_w);

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
    fn haversine_of_identical_points_is_zero() {
        let a = GeoLocation::new("US", 40.0, -75.0);
        assert_eq!(haversine_km(a, a), 0.0);
    }

    #[test]
    fn builds_a_selection_or_reports_no_reachable_entry() {
        let snap = testnet::small_snapshot();
        let policy = RelationshipPolicy::subnet_only();
        let cfg = EligibilityConfig::standard(vec![443]);
        let geo_cfg = GeoClusterConfig {
            cell_side_degrees: 5.0,
            alpha: 0.5,
            sender_geo: GeoLocation::new("US", 40.0, -75.0),
            recipient_geo: GeoLocation::new("DE", 52.0, 13.0),
        };
        let sender = "1.2.3.4".parse().unwrap();
        let recipient = "5.6.7.8".parse().unwrap();
        match build(&snap, &policy, &cfg, &geo_cfg, sender, recipient) {
            Ok(ps) => {
                let total: f64 = (0..ps.len()).map(|x| ps.exit_prob(x)).sum();
                assert!((total - 1.0).abs() < 1e-6 || total == 0.0);
            }
            Err(Error::NoReachableEntry) | Err(Error::EmptyEntryMass) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
