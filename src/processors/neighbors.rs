//! Radius neighbor search over geographic points.
//!
//! Two interchangeable strategies sit behind [`NeighborSearch`]:
//! - [`LinearSearch`]: O(n) scan per query, the correctness baseline.
//! - [`KdTreeSearch`]: a `kiddo` KD-tree over raw degree coordinates,
//!   queried with a conservative degree-space radius and re-filtered with
//!   exact haversine distances.
//!
//! Both return the same neighbor list for the same input, so the index is
//! purely a performance optimization.

use kiddo::{ImmutableKdTree, SquaredEuclidean};

use crate::core::records::GeoPoint;
use crate::processors::distance::{haversine_km, KM_PER_DEGREE};

/// Hard cap on neighbors returned by a single query.
///
/// Once a query has accepted this many neighbors it stops scanning further
/// candidates. This bounds worst-case time and memory in pathologically
/// dense regions at the cost of approximate completeness there; with fewer
/// than this many true neighbors the result is exact.
pub const NEIGHBOR_CAP: usize = 1000;

/// Radius search over a fixed snapshot of points.
///
/// `neighbors(i, eps)` returns every index `j != i` whose haversine
/// distance to point `i` is at most `eps` kilometers, in ascending index
/// order, truncated at [`NEIGHBOR_CAP`].
pub trait NeighborSearch {
    /// All points within `epsilon_km` of the point at `query`, excluding
    /// the query point itself.
    fn neighbors(&self, query: usize, epsilon_km: f64) -> Vec<usize>;

    /// Number of points in the snapshot.
    fn len(&self) -> usize;

    /// Returns true if the snapshot is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Naive O(n)-per-query scan over all points.
pub struct LinearSearch<'a> {
    points: &'a [GeoPoint],
}

impl<'a> LinearSearch<'a> {
    /// Creates a linear searcher over a point snapshot.
    pub fn new(points: &'a [GeoPoint]) -> Self {
        Self { points }
    }
}

impl NeighborSearch for LinearSearch<'_> {
    fn neighbors(&self, query: usize, epsilon_km: f64) -> Vec<usize> {
        let origin = self.points[query];
        let mut found = Vec::new();

        for (j, &candidate) in self.points.iter().enumerate() {
            if j == query {
                continue;
            }
            // NaN distances fail this comparison, so degenerate points
            // are skipped rather than faulting.
            if haversine_km(origin, candidate) <= epsilon_km {
                found.push(j);
                if found.len() >= NEIGHBOR_CAP {
                    break;
                }
            }
        }

        found
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

/// KD-tree accelerated search over degree coordinates.
///
/// The tree stores (lat, lon) in raw degrees and is queried with a radius
/// of `epsilon / 111.32` degrees, widened by the inverse cosine of the
/// query latitude (a degree of longitude shrinks to `111.32 * cos(lat)`
/// km away from the equator) and scaled up to circumscribe the degree
/// bounding box of the kilometer radius. The window over-selects
/// candidates, which the exact haversine filter then prunes, so the final
/// neighbor list matches [`LinearSearch`] exactly.
///
/// Points with non-finite coordinates are left out of the tree entirely;
/// they are never returned and querying from one yields no neighbors.
pub struct KdTreeSearch<'a> {
    points: &'a [GeoPoint],
    tree: Option<ImmutableKdTree<f64, 2>>,
    /// Maps tree item positions back to indices into `points`.
    tree_to_point: Vec<usize>,
}

impl<'a> KdTreeSearch<'a> {
    /// Builds the index once over a point snapshot.
    pub fn new(points: &'a [GeoPoint]) -> Self {
        let mut coords: Vec<[f64; 2]> = Vec::with_capacity(points.len());
        let mut tree_to_point = Vec::with_capacity(points.len());

        for (i, p) in points.iter().enumerate() {
            if p.is_finite() {
                coords.push([p.lat, p.lon]);
                tree_to_point.push(i);
            }
        }

        let tree = if coords.is_empty() {
            None
        } else {
            Some(ImmutableKdTree::new_from_slice(&coords))
        };

        Self {
            points,
            tree,
            tree_to_point,
        }
    }
}

impl NeighborSearch for KdTreeSearch<'_> {
    fn neighbors(&self, query: usize, epsilon_km: f64) -> Vec<usize> {
        let origin = self.points[query];
        if !origin.is_finite() {
            return Vec::new();
        }
        let tree = match &self.tree {
            Some(tree) => tree,
            None => return Vec::new(),
        };

        // Degree window for the kilometer radius. Longitude degrees
        // shrink by cos(lat) away from the equator, so the window must
        // grow by the inverse; sqrt(2) then circumscribes the widened
        // bounding box so no corner candidate is missed.
        let base_deg = epsilon_km / KM_PER_DEGREE;
        let cos_lat = origin.lat.to_radians().cos().abs();
        let radius_deg = if cos_lat > 1e-3 {
            base_deg * std::f64::consts::SQRT_2 / cos_lat
        } else {
            // Close enough to a pole that every longitude is nearby.
            360.0 + base_deg * std::f64::consts::SQRT_2
        };
        let candidates = tree.within::<SquaredEuclidean>(
            &[origin.lat, origin.lon],
            radius_deg * radius_deg,
        );

        // Restore input order so the capped result is identical to the
        // linear scan's.
        let mut indices: Vec<usize> = candidates
            .iter()
            .map(|nn| self.tree_to_point[nn.item as usize])
            .collect();
        indices.sort_unstable();

        let mut found = Vec::new();
        for j in indices {
            if j == query {
                continue;
            }
            if haversine_km(origin, self.points[j]) <= epsilon_km {
                found.push(j);
                if found.len() >= NEIGHBOR_CAP {
                    break;
                }
            }
        }

        found
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}
