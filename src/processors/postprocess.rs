//! Label post-processing and result assembly.
//!
//! Clustering engines hand raw label arrays to this module: ids are
//! positive and strictly increasing in discovery order but may contain
//! gaps where an undersized cluster was discarded. [`renumber_labels`]
//! compacts them to a dense `1..=K` sequence and [`group_records`] turns
//! labels plus records into the final [`ClusteringResult`].

use std::collections::{BTreeMap, HashMap};

use crate::core::records::{Label, SpatialRecord};

/// Final output of a clustering run.
///
/// Cluster ids are dense (`1..=K`) in first-discovery order. Noise keeps
/// its own reserved bucket rather than a magic id. `labels` parallels the
/// engine's input order and is handed out read-only once the run is done.
#[derive(Debug, Clone)]
pub struct ClusteringResult<R> {
    /// Terminal label per input point, in input order.
    pub labels: Vec<Label>,
    /// Cluster id to its member records, in discovery order per cluster.
    pub clusters: BTreeMap<u32, Vec<R>>,
    /// Records labeled noise, in input order.
    pub noise: Vec<R>,
}

impl<R> ClusteringResult<R> {
    /// An empty result, as produced for empty input.
    pub fn empty() -> Self {
        Self {
            labels: Vec::new(),
            clusters: BTreeMap::new(),
            noise: Vec::new(),
        }
    }

    /// Number of non-noise clusters.
    #[inline]
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Number of noise points.
    #[inline]
    pub fn noise_count(&self) -> usize {
        self.noise.len()
    }
}

/// Renumbers live cluster ids to a dense `1..=K` sequence.
///
/// First-discovery order is preserved: the cluster whose id appears first
/// in the array becomes 1, the next distinct id becomes 2, and so on.
/// Noise entries are left untouched. Running this on an already-dense
/// labeling is a no-op. Returns the number of live clusters.
pub fn renumber_labels(labels: &mut [Label]) -> u32 {
    let mut mapping: HashMap<u32, u32> = HashMap::new();
    let mut next_id: u32 = 0;

    for label in labels.iter_mut() {
        if let Label::Cluster(raw) = *label {
            let dense = *mapping.entry(raw).or_insert_with(|| {
                next_id += 1;
                next_id
            });
            *label = Label::Cluster(dense);
        }
    }

    next_id
}

/// Groups records by their final labels into a [`ClusteringResult`].
///
/// `labels` must be terminal (no `Unvisited`) and parallel to `records`;
/// violations are programming faults, not runtime conditions.
pub fn group_records<R: SpatialRecord>(
    records: &[R],
    labels: Vec<Label>,
) -> ClusteringResult<R> {
    assert_eq!(
        records.len(),
        labels.len(),
        "label array must parallel the input records"
    );

    let mut clusters: BTreeMap<u32, Vec<R>> = BTreeMap::new();
    let mut noise = Vec::new();

    for (record, label) in records.iter().zip(labels.iter()) {
        match label {
            Label::Cluster(id) => {
                clusters.entry(*id).or_default().push(record.clone());
            }
            Label::Noise => noise.push(record.clone()),
            Label::Unvisited => {
                unreachable!("point left unvisited after a completed run")
            }
        }
    }

    ClusteringResult {
        labels,
        clusters,
        noise,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::GeoPoint;

    #[test]
    fn test_renumber_compacts_gaps() {
        let mut labels = vec![
            Label::Cluster(3),
            Label::Noise,
            Label::Cluster(7),
            Label::Cluster(3),
            Label::Cluster(12),
        ];
        let count = renumber_labels(&mut labels);
        assert_eq!(count, 3);
        assert_eq!(
            labels,
            vec![
                Label::Cluster(1),
                Label::Noise,
                Label::Cluster(2),
                Label::Cluster(1),
                Label::Cluster(3),
            ]
        );
    }

    #[test]
    fn test_renumber_preserves_first_discovery_order() {
        // Id 9 appears before id 2 in the array, so 9 becomes 1.
        let mut labels = vec![Label::Cluster(9), Label::Cluster(2)];
        renumber_labels(&mut labels);
        assert_eq!(labels, vec![Label::Cluster(1), Label::Cluster(2)]);
    }

    #[test]
    fn test_renumber_is_idempotent() {
        let mut labels = vec![
            Label::Cluster(5),
            Label::Cluster(1),
            Label::Noise,
            Label::Cluster(5),
        ];
        renumber_labels(&mut labels);
        let first_pass = labels.clone();
        renumber_labels(&mut labels);
        assert_eq!(labels, first_pass);
    }

    #[test]
    fn test_renumber_all_noise() {
        let mut labels = vec![Label::Noise; 4];
        assert_eq!(renumber_labels(&mut labels), 0);
        assert!(labels.iter().all(Label::is_noise));
    }

    #[test]
    fn test_group_records_partitions_input() {
        let records = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(2.0, 2.0),
            GeoPoint::new(3.0, 3.0),
        ];
        let labels = vec![
            Label::Cluster(1),
            Label::Noise,
            Label::Cluster(1),
            Label::Cluster(2),
        ];

        let result = group_records(&records, labels);
        assert_eq!(result.cluster_count(), 2);
        assert_eq!(result.noise_count(), 1);
        assert_eq!(result.clusters[&1].len(), 2);
        assert_eq!(result.clusters[&2].len(), 1);
        // Cluster membership keeps input order.
        assert_eq!(result.clusters[&1][0].lat, 0.0);
        assert_eq!(result.clusters[&1][1].lat, 2.0);
    }

    #[test]
    fn test_group_records_empty() {
        let records: Vec<GeoPoint> = Vec::new();
        let result = group_records(&records, Vec::new());
        assert_eq!(result.cluster_count(), 0);
        assert_eq!(result.noise_count(), 0);
    }
}
