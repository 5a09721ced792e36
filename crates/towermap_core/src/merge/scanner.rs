//! Whole-store proximity scan feeding the merge engine.
//!
//! # Responsibility
//! - Partition a position snapshot into connected components at a distance
//!   threshold and merge every multi-member component.
//!
//! # Invariants
//! - Component membership is transitive: a marker joins when it is within
//!   the threshold of any current member, so chains A-B-C collapse even
//!   when A and C are further apart than the threshold.
//! - A component whose merge fails is skipped, not fatal; the survivorless
//!   cluster stays in place and the next scan picks it up again.

use crate::geo::haversine_m;
use crate::merge::engine::{MergeEngine, MergeResult};
use crate::model::marker::MarkerId;
use crate::repo::marker_repo::{MarkerPosition, MarkerRepository};
use log::{error, info};

/// Store-wide merge sweep bound to one marker repository.
pub struct ClusterScanner<'a, M: MarkerRepository> {
    markers: &'a M,
}

impl<'a, M: MarkerRepository> ClusterScanner<'a, M> {
    pub fn new(markers: &'a M) -> Self {
        Self { markers }
    }

    /// Merges every proximity cluster at `threshold_m` and returns how many
    /// markers were eliminated (sum of cluster size minus one).
    ///
    /// Clusters are computed on a snapshot taken at entry, then merged one
    /// by one; a failing cluster is logged and skipped so the rest of the
    /// sweep still runs.
    pub fn scan(&self, threshold_m: f64) -> MergeResult<u64> {
        let positions = self.markers.list_positions()?;
        let clusters = cluster_positions(&positions, threshold_m);
        info!(
            "event=merge_scan module=merge status=start threshold_m={} markers={} clusters={}",
            threshold_m,
            positions.len(),
            clusters.len()
        );

        let engine = MergeEngine::new(self.markers);
        let mut eliminated: u64 = 0;
        for cluster in &clusters {
            match engine.merge_markers(cluster) {
                Ok(Some(_)) => {
                    eliminated += (cluster.len() - 1) as u64;
                }
                Ok(None) => {}
                Err(err) => {
                    error!(
                        "event=merge_scan module=merge status=error error_code=cluster_merge_failed cluster_head={} cluster_size={} error={}",
                        cluster[0],
                        cluster.len(),
                        err
                    );
                }
            }
        }

        info!(
            "event=merge_scan module=merge status=ok threshold_m={} eliminated={}",
            threshold_m, eliminated
        );
        Ok(eliminated)
    }
}

/// Groups positions into connected components by iterative expansion.
///
/// Only components with more than one member are returned; member order is
/// discovery order, so the first marker of a component leads its cluster.
pub fn cluster_positions(positions: &[MarkerPosition], threshold_m: f64) -> Vec<Vec<MarkerId>> {
    let mut used = vec![false; positions.len()];
    let mut clusters = Vec::new();

    for seed in 0..positions.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut members = vec![seed];

        let mut added = true;
        while added {
            added = false;
            for candidate in 0..positions.len() {
                if used[candidate] {
                    continue;
                }
                let reachable = members.iter().any(|&member| {
                    haversine_m(positions[member].point(), positions[candidate].point())
                        <= threshold_m
                });
                if reachable {
                    used[candidate] = true;
                    members.push(candidate);
                    added = true;
                }
            }
        }

        if members.len() > 1 {
            clusters.push(
                members
                    .into_iter()
                    .map(|index| positions[index].id)
                    .collect(),
            );
        }
    }

    clusters
}
