//! Density-based clustering of geolocated records (DBSCAN).
//!
//! Points are scanned in input order. A point with at least `min_points`
//! neighbors within `epsilon_km` becomes a core point and seeds a cluster,
//! which grows breadth-first through the neighbors of every core point it
//! absorbs. Points without enough neighbors are labeled noise, but a noise
//! point reached during another cluster's expansion is reclaimed as a
//! border member of that cluster. Finished clusters smaller than
//! `min_cluster_size` are dissolved back into noise.
//!
//! Iteration order fixes discovery order, and a border point reachable
//! from two density-connected clusters goes to whichever claims it first.
//! That makes results fully deterministic for a fixed input order, and
//! only the ambiguous border assignments move when the input is reordered.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::core::records::{GeoPoint, Label, SpatialRecord};
use crate::processors::neighbors::{KdTreeSearch, LinearSearch, NeighborSearch};
use crate::processors::postprocess::{group_records, renumber_labels, ClusteringResult};
use crate::processors::{ClusterParams, ClusterSink, ClusteringError, NullSink};

/// One-shot DBSCAN run over an immutable record snapshot.
///
/// The engine owns its label buffer for the duration of the run and
/// `run` consumes `self`, so a run can neither be re-entered nor repeated
/// on stale state; construct a fresh engine per run.
pub struct DbscanEngine<'a, R: SpatialRecord> {
    records: &'a [R],
    params: ClusterParams,
    use_spatial_index: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, R: SpatialRecord> DbscanEngine<'a, R> {
    /// Creates an engine over a record snapshot, rejecting invalid
    /// parameters before any point is touched.
    pub fn new(records: &'a [R], params: ClusterParams) -> Result<Self, ClusteringError> {
        params.validate()?;
        Ok(Self {
            records,
            params,
            use_spatial_index: true,
            cancel: None,
        })
    }

    /// Switches neighbor queries to the naive linear scan.
    ///
    /// The KD-tree index is the default; the linear scan exists as the
    /// correctness baseline and for tiny inputs.
    pub fn with_linear_search(mut self) -> Self {
        self.use_spatial_index = false;
        self
    }

    /// Installs a cooperative cancellation flag, polled once per scanned
    /// point. A cancelled run returns [`ClusteringError::Cancelled`].
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Runs the clustering and returns the grouped result.
    pub fn run(self) -> Result<ClusteringResult<R>, ClusteringError> {
        self.run_with_sink(&mut NullSink)
    }

    /// Runs the clustering, emitting each finished, size-filtered cluster
    /// to `sink` before moving on.
    pub fn run_with_sink(
        self,
        sink: &mut dyn ClusterSink<R>,
    ) -> Result<ClusteringResult<R>, ClusteringError> {
        let n = self.records.len();
        if n == 0 {
            return Ok(ClusteringResult::empty());
        }

        let started = Instant::now();
        let points: Vec<GeoPoint> = self.records.iter().map(|r| r.point()).collect();

        // The index is built once per run; both searchers answer queries
        // identically.
        let kdtree;
        let linear;
        let search: &dyn NeighborSearch = if self.use_spatial_index {
            kdtree = KdTreeSearch::new(&points);
            &kdtree
        } else {
            linear = LinearSearch::new(&points);
            &linear
        };

        let epsilon = self.params.epsilon_km;
        let min_points = self.params.min_points;
        let min_cluster_size = self.params.effective_min_cluster_size();

        let mut labels = vec![Label::Unvisited; n];
        let mut next_raw_id: u32 = 0;
        let mut emitted: u32 = 0;
        let mut queue: VecDeque<usize> = VecDeque::new();

        for i in 0..n {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(ClusteringError::Cancelled);
                }
            }
            if labels[i] != Label::Unvisited {
                continue;
            }

            let seeds = search.neighbors(i, epsilon);
            if seeds.len() < min_points {
                // Provisional: may be reclaimed as a border point later.
                labels[i] = Label::Noise;
                continue;
            }

            next_raw_id += 1;
            let raw_id = next_raw_id;
            labels[i] = Label::Cluster(raw_id);
            let mut members = vec![i];

            queue.clear();
            queue.extend(seeds);

            while let Some(j) = queue.pop_front() {
                // Points already owned by a cluster stay put; unvisited
                // and noise points are absorbed.
                if matches!(labels[j], Label::Cluster(_)) {
                    continue;
                }
                labels[j] = Label::Cluster(raw_id);
                members.push(j);

                let expansion = search.neighbors(j, epsilon);
                if expansion.len() >= min_points {
                    for &k in &expansion {
                        if matches!(labels[k], Label::Unvisited | Label::Noise) {
                            queue.push_back(k);
                        }
                    }
                }
            }

            if members.len() < min_cluster_size {
                // Dissolve the cluster; its raw id is retired, never reused.
                for &m in &members {
                    labels[m] = Label::Noise;
                }
                debug!(
                    "cluster {} dissolved: {} members < min size {}",
                    raw_id,
                    members.len(),
                    min_cluster_size
                );
                continue;
            }

            // Emission order equals discovery order, so the running count
            // is exactly the dense id the post-processor will assign.
            emitted += 1;
            let payloads: Vec<R> = members.iter().map(|&m| self.records[m].clone()).collect();
            sink.on_cluster_found(emitted, &payloads);
            debug!("cluster {}: {} members", emitted, members.len());
        }

        let cluster_count = renumber_labels(&mut labels);
        debug_assert_eq!(cluster_count, emitted);

        let result = group_records(self.records, labels);
        info!(
            "dbscan: {} points, {} clusters, {} noise in {:.1?}",
            n,
            result.cluster_count(),
            result.noise_count(),
            started.elapsed()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Offsets are in degrees; 0.001 degrees of latitude is about 111 m.
    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon)
    }

    fn run_dbscan(
        points: &[GeoPoint],
        params: ClusterParams,
    ) -> ClusteringResult<GeoPoint> {
        DbscanEngine::new(points, params).unwrap().run().unwrap()
    }

    #[test]
    fn test_three_mutual_points_form_one_cluster() {
        // Scenario: 3 points within ~10 m of each other.
        let points = vec![
            point(38.4400, -122.7100),
            point(38.44005, -122.7100),
            point(38.4400, -122.71006),
        ];
        let result = run_dbscan(&points, ClusterParams::new(0.05, 2));
        assert_eq!(result.cluster_count(), 1);
        assert_eq!(result.clusters[&1].len(), 3);
        assert_eq!(result.noise_count(), 0);
    }

    #[test]
    fn test_two_distant_points_are_noise() {
        // Scenario: 2 points roughly 100 km apart, epsilon 1 km.
        let points = vec![point(38.0, -122.0), point(38.9, -122.0)];
        let result = run_dbscan(&points, ClusterParams::new(1.0, 2));
        assert_eq!(result.cluster_count(), 0);
        assert_eq!(result.noise_count(), 2);
        assert!(result.labels.iter().all(Label::is_noise));
    }

    #[test]
    fn test_tight_group_plus_outlier() {
        // Scenario: 10 points within ~10 m, 1 point far away.
        let mut points: Vec<GeoPoint> = (0..10)
            .map(|i| point(38.44 + i as f64 * 0.00001, -122.71))
            .collect();
        points.push(point(39.5, -121.0));

        let params = ClusterParams::new(0.02, 3).with_min_cluster_size(3);
        let result = run_dbscan(&points, params);
        assert_eq!(result.cluster_count(), 1);
        assert_eq!(result.clusters[&1].len(), 10);
        assert_eq!(result.noise_count(), 1);
        assert!(result.labels[10].is_noise());
    }

    #[test]
    fn test_empty_input() {
        let points: Vec<GeoPoint> = Vec::new();
        let mut events = 0;
        let result = DbscanEngine::new(&points, ClusterParams::new(1.0, 2))
            .unwrap()
            .run_with_sink(&mut |_id: u32, _members: &[GeoPoint]| events += 1)
            .unwrap();
        assert_eq!(result.cluster_count(), 0);
        assert_eq!(result.noise_count(), 0);
        assert_eq!(events, 0);
    }

    #[test]
    fn test_no_point_left_unvisited() {
        let points: Vec<GeoPoint> = (0..40)
            .map(|i| point(38.0 + (i % 7) as f64 * 0.03, -122.0 + (i / 7) as f64 * 0.04))
            .collect();
        let result = run_dbscan(&points, ClusterParams::new(2.0, 3));
        assert_eq!(result.labels.len(), points.len());
        assert!(result
            .labels
            .iter()
            .all(|l| *l != Label::Unvisited));
    }

    #[test]
    fn test_determinism_across_runs() {
        let points: Vec<GeoPoint> = (0..60)
            .map(|i| {
                point(
                    38.0 + (i % 8) as f64 * 0.012,
                    -122.0 + (i / 8) as f64 * 0.017,
                )
            })
            .collect();
        let params = ClusterParams::new(1.5, 3);
        let first = run_dbscan(&points, params);
        let second = run_dbscan(&points, params);
        assert_eq!(first.labels, second.labels);
    }

    #[test]
    fn test_linear_and_indexed_runs_agree() {
        let points: Vec<GeoPoint> = (0..50)
            .map(|i| {
                point(
                    38.0 + (i % 10) as f64 * 0.009,
                    -122.0 + (i / 10) as f64 * 0.013,
                )
            })
            .collect();
        let params = ClusterParams::new(1.2, 3);
        let indexed = run_dbscan(&points, params);
        let linear = DbscanEngine::new(&points, params)
            .unwrap()
            .with_linear_search()
            .run()
            .unwrap();
        assert_eq!(indexed.labels, linear.labels);
    }

    #[test]
    fn test_epsilon_monotonicity() {
        // Growing epsilon never turns a clustered point into noise.
        let points: Vec<GeoPoint> = (0..30)
            .map(|i| {
                point(
                    38.0 + (i % 6) as f64 * 0.02,
                    -122.0 + (i / 6) as f64 * 0.025,
                )
            })
            .collect();

        let mut previous_clustered = 0;
        for eps in [0.5, 1.0, 2.0, 4.0, 8.0] {
            let result = run_dbscan(&points, ClusterParams::new(eps, 3));
            let clustered = points.len() - result.noise_count();
            assert!(
                clustered >= previous_clustered,
                "clustered count dropped from {} to {} at eps {}",
                previous_clustered,
                clustered,
                eps
            );
            previous_clustered = clustered;
        }
    }

    #[test]
    fn test_growing_epsilon_only_merges_clusters() {
        // Every pair of points sharing a cluster keeps sharing one at
        // each larger epsilon; clusters may merge but never split.
        //
        // Two 3x3 blocks of ~1.1 km spacing about 5.6 km apart: separate
        // clusters at epsilon 1.5 and 3, merged at 6 and beyond.
        let mut points = Vec::new();
        for block in 0..2 {
            for i in 0..3 {
                for j in 0..3 {
                    points.push(point(
                        38.0 + block as f64 * 0.07 + i as f64 * 0.01,
                        -122.0 + j as f64 * 0.012,
                    ));
                }
            }
        }

        let epsilons = [1.5, 3.0, 6.0, 12.0];
        let runs: Vec<ClusteringResult<GeoPoint>> = epsilons
            .iter()
            .map(|&eps| run_dbscan(&points, ClusterParams::new(eps, 3)))
            .collect();

        for w in runs.windows(2) {
            let (smaller, larger) = (&w[0], &w[1]);
            for i in 0..points.len() {
                for j in i + 1..points.len() {
                    let together = smaller.labels[i].cluster_id().is_some()
                        && smaller.labels[i] == smaller.labels[j];
                    if together {
                        assert_eq!(
                            larger.labels[i], larger.labels[j],
                            "points {} and {} split apart as epsilon grew",
                            i, j
                        );
                        assert!(larger.labels[i].cluster_id().is_some());
                    }
                }
            }
        }
    }

    #[test]
    fn test_min_cluster_size_dissolves_small_clusters() {
        // Two tight pairs: with min_points 1 each pair forms a cluster of
        // 2, but min_cluster_size 3 dissolves both into noise.
        let points = vec![
            point(38.44, -122.71),
            point(38.44001, -122.71),
            point(38.60, -122.40),
            point(38.60001, -122.40),
        ];
        let params = ClusterParams::new(0.1, 1).with_min_cluster_size(3);
        let result = run_dbscan(&points, params);
        assert_eq!(result.cluster_count(), 0);
        assert_eq!(result.noise_count(), 4);
    }

    #[test]
    fn test_all_returned_clusters_meet_min_size() {
        let points: Vec<GeoPoint> = (0..45)
            .map(|i| {
                point(
                    38.0 + (i % 9) as f64 * 0.011,
                    -122.0 + (i / 9) as f64 * 0.014,
                )
            })
            .collect();
        let params = ClusterParams::new(1.3, 2).with_min_cluster_size(4);
        let result = run_dbscan(&points, params);
        for members in result.clusters.values() {
            assert!(members.len() >= 4);
        }
    }

    #[test]
    fn test_noise_reclaimed_as_border_point() {
        // The lone point sits within epsilon of the dense group's edge but
        // has too few neighbors of its own. Scanned first, it is labeled
        // noise, then reclaimed during the group's expansion.
        let mut points = vec![point(38.4409, -122.71)];
        points.extend((0..5).map(|i| point(38.4400 + i as f64 * 0.0001, -122.71)));

        let params = ClusterParams::new(0.06, 3).with_min_cluster_size(3);
        let result = run_dbscan(&points, params);
        assert_eq!(result.cluster_count(), 1);
        assert_eq!(result.noise_count(), 0);
        assert_eq!(result.labels[0], Label::Cluster(1));
    }

    #[test]
    fn test_events_match_final_result() {
        let points: Vec<GeoPoint> = (0..24)
            .map(|i| {
                point(
                    38.0 + (i % 4) as f64 * 0.001 + (i / 12) as f64 * 2.0,
                    -122.0 + ((i / 4) % 3) as f64 * 0.001,
                )
            })
            .collect();
        let params = ClusterParams::new(0.5, 3);

        let mut events: Vec<(u32, usize)> = Vec::new();
        let result = DbscanEngine::new(&points, params)
            .unwrap()
            .run_with_sink(&mut |id: u32, members: &[GeoPoint]| {
                events.push((id, members.len()));
            })
            .unwrap();

        assert_eq!(events.len(), result.cluster_count());
        for (id, size) in events {
            assert_eq!(result.clusters[&id].len(), size);
        }
    }

    #[test]
    fn test_cluster_ids_increase_in_discovery_order() {
        // Two groups far apart; the group whose first point appears first
        // in the input must receive id 1.
        let mut points: Vec<GeoPoint> =
            (0..4).map(|i| point(38.0 + i as f64 * 0.0001, -122.0)).collect();
        points.extend((0..4).map(|i| point(40.0 + i as f64 * 0.0001, -120.0)));

        let result = run_dbscan(&points, ClusterParams::new(0.1, 2));
        assert_eq!(result.cluster_count(), 2);
        assert_eq!(result.labels[0], Label::Cluster(1));
        assert_eq!(result.labels[4], Label::Cluster(2));
    }

    #[test]
    fn test_cancellation() {
        let points: Vec<GeoPoint> =
            (0..20).map(|i| point(38.0 + i as f64 * 0.001, -122.0)).collect();
        let flag = Arc::new(AtomicBool::new(true));
        let outcome = DbscanEngine::new(&points, ClusterParams::new(1.0, 2))
            .unwrap()
            .with_cancel_flag(flag)
            .run();
        assert!(matches!(outcome, Err(ClusteringError::Cancelled)));
    }

    #[test]
    fn test_invalid_params_rejected_before_run() {
        let points = vec![point(38.0, -122.0)];
        assert!(DbscanEngine::new(&points, ClusterParams::new(-1.0, 2)).is_err());
        assert!(DbscanEngine::new(&points, ClusterParams::new(1.0, 0)).is_err());
    }

    #[test]
    fn test_nan_point_degrades_to_noise() {
        let mut points: Vec<GeoPoint> =
            (0..5).map(|i| point(38.44 + i as f64 * 0.0001, -122.71)).collect();
        points.push(GeoPoint::new(f64::NAN, f64::NAN));

        let result = run_dbscan(&points, ClusterParams::new(0.1, 2));
        assert_eq!(result.cluster_count(), 1);
        assert!(result.labels[5].is_noise());
    }
}
