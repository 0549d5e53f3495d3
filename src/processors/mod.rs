//! Clustering engines and their supporting pieces.

pub mod dbscan;
pub mod distance;
pub mod hierarchy;
pub mod neighbors;
pub mod postprocess;

use thiserror::Error;

/// Errors that can occur when configuring or running a clustering engine.
#[derive(Debug, Error)]
pub enum ClusteringError {
    #[error("epsilon must be positive, got {0}")]
    InvalidEpsilon(f64),

    #[error("min_points must be at least 1, got {0}")]
    InvalidMinPoints(usize),

    #[error("min_cluster_size must be at least 1, got {0}")]
    InvalidMinClusterSize(usize),

    #[error("clustering run was cancelled")]
    Cancelled,
}

/// Shared configuration for both clustering engines.
///
/// `epsilon_km` and `min_points` drive DBSCAN directly; the hierarchical
/// engine uses `min_points` for core distances and ignores `epsilon_km`.
/// `min_cluster_size` defaults to `min_points` when unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Neighborhood radius in kilometers.
    pub epsilon_km: f64,
    /// Minimum neighbors (excluding the point itself) for a core point.
    pub min_points: usize,
    /// Minimum members for a cluster to survive; `None` means `min_points`.
    pub min_cluster_size: Option<usize>,
}

impl ClusterParams {
    /// Creates parameters with `min_cluster_size` defaulted.
    pub fn new(epsilon_km: f64, min_points: usize) -> Self {
        Self {
            epsilon_km,
            min_points,
            min_cluster_size: None,
        }
    }

    /// Sets an explicit minimum cluster size.
    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = Some(size);
        self
    }

    /// The size threshold actually applied to finished clusters.
    #[inline]
    pub fn effective_min_cluster_size(&self) -> usize {
        self.min_cluster_size.unwrap_or(self.min_points)
    }

    /// Rejects invalid configurations before any point is processed.
    pub fn validate(&self) -> Result<(), ClusteringError> {
        if !(self.epsilon_km > 0.0) {
            return Err(ClusteringError::InvalidEpsilon(self.epsilon_km));
        }
        if self.min_points < 1 {
            return Err(ClusteringError::InvalidMinPoints(self.min_points));
        }
        if let Some(size) = self.min_cluster_size {
            if size < 1 {
                return Err(ClusteringError::InvalidMinClusterSize(size));
            }
        }
        Ok(())
    }
}

/// Receives finished clusters as they are discovered.
///
/// Events fire synchronously on the calling thread, strictly in discovery
/// order, and strictly before the run returns. Every event corresponds to
/// a size-filtered cluster in the final result; none is ever retracted.
pub trait ClusterSink<R> {
    /// Called once per finished cluster with its final id and members.
    fn on_cluster_found(&mut self, cluster_id: u32, members: &[R]);
}

impl<R, F> ClusterSink<R> for F
where
    F: FnMut(u32, &[R]),
{
    fn on_cluster_found(&mut self, cluster_id: u32, members: &[R]) {
        self(cluster_id, members)
    }
}

/// Discards all cluster events.
pub struct NullSink;

impl<R> ClusterSink<R> for NullSink {
    fn on_cluster_found(&mut self, _cluster_id: u32, _members: &[R]) {}
}

pub use dbscan::DbscanEngine;
pub use distance::{haversine_km, EARTH_RADIUS_KM, KM_PER_DEGREE};
pub use hierarchy::HierarchyEngine;
pub use neighbors::{KdTreeSearch, LinearSearch, NeighborSearch, NEIGHBOR_CAP};
pub use postprocess::{group_records, renumber_labels, ClusteringResult};
