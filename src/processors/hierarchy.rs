//! Hierarchical density clustering (HDBSCAN-style).
//!
//! Instead of a fixed epsilon, this engine derives a density hierarchy:
//! each point's core distance (distance to its `min_points`-th nearest
//! neighbor) feeds a mutual-reachability metric, a minimum spanning tree
//! over that metric becomes a single-linkage dendrogram, the dendrogram is
//! condensed by `min_cluster_size`, and the clusters with the highest
//! excess-of-mass stability are selected as the final answer.
//!
//! The root of the condensed tree is never selected, matching the common
//! HDBSCAN convention: data that never splits into two viable clusters
//! comes back as all noise rather than one all-encompassing cluster.
//!
//! `epsilon_km` is accepted in [`ClusterParams`] for contract uniformity
//! with [`DbscanEngine`](crate::processors::DbscanEngine) but plays no
//! role here; the hierarchy spans every scale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::core::records::{GeoPoint, Label, SpatialRecord};
use crate::processors::distance::haversine_km;
use crate::processors::postprocess::{group_records, ClusteringResult};
use crate::processors::{ClusterParams, ClusterSink, ClusteringError, NullSink};

/// Distances at or below this are clamped before inverting into density,
/// so coincident points do not produce infinite lambda values.
const MIN_SPLIT_DISTANCE_KM: f64 = 1e-12;

/// Plain union-find with path compression.
///
/// Tracks which dendrogram node currently represents each component while
/// the single-linkage tree is assembled bottom-up.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Attaches two component roots beneath a freshly created node.
    fn attach(&mut self, a: usize, b: usize, node: usize) {
        self.parent[a] = node;
        self.parent[b] = node;
    }
}

/// Internal node of the single-linkage dendrogram.
///
/// Node ids `0..n` are the input points; id `n + i` refers to
/// `nodes[i]`.
struct DendroNode {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// A cluster of the condensed tree.
struct CondensedCluster {
    parent: Option<usize>,
    children: Vec<usize>,
    birth_lambda: f64,
    birth_size: usize,
    /// Points that left this cluster as sub-threshold spill, with the
    /// lambda at which they left.
    fallout: Vec<(usize, f64)>,
    /// Set when the cluster split into two viable children.
    split: Option<(f64, usize)>,
}

/// One-shot hierarchical clustering run over an immutable snapshot.
///
/// Same contract as `DbscanEngine`: consume-on-run, validated parameters,
/// synchronous in-order sink events, one fresh engine per run.
pub struct HierarchyEngine<'a, R: SpatialRecord> {
    records: &'a [R],
    params: ClusterParams,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, R: SpatialRecord> HierarchyEngine<'a, R> {
    /// Creates an engine over a record snapshot, rejecting invalid
    /// parameters before any point is touched.
    pub fn new(records: &'a [R], params: ClusterParams) -> Result<Self, ClusteringError> {
        params.validate()?;
        Ok(Self {
            records,
            params,
            cancel: None,
        })
    }

    /// Installs a cooperative cancellation flag, polled once per spanning
    /// tree growth step.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Runs the clustering and returns the grouped result.
    pub fn run(self) -> Result<ClusteringResult<R>, ClusteringError> {
        self.run_with_sink(&mut NullSink)
    }

    /// Runs the clustering, emitting each selected cluster to `sink` in
    /// first-discovery order before returning.
    pub fn run_with_sink(
        self,
        sink: &mut dyn ClusterSink<R>,
    ) -> Result<ClusteringResult<R>, ClusteringError> {
        let n = self.records.len();
        if n == 0 {
            return Ok(ClusteringResult::empty());
        }
        if n == 1 {
            return Ok(group_records(self.records, vec![Label::Noise]));
        }

        let started = Instant::now();
        let points: Vec<GeoPoint> = self.records.iter().map(|r| r.point()).collect();
        // The condensed tree needs at least two points per viable cluster.
        let min_cluster_size = self.params.effective_min_cluster_size().max(2);

        let core = core_distances(&points, self.params.min_points);
        let edges = self.spanning_tree(&points, &core)?;
        let nodes = build_dendrogram(n, edges);
        let clusters = condense_tree(n, &nodes, min_cluster_size);
        let selected = select_clusters(&clusters);

        let labels = assign_labels(n, &clusters, &selected);
        let (labels, member_lists) = densify(labels);

        for (id, members) in member_lists.iter().enumerate() {
            debug_assert!(members.len() >= min_cluster_size);
            let payloads: Vec<R> = members.iter().map(|&m| self.records[m].clone()).collect();
            sink.on_cluster_found(id as u32 + 1, &payloads);
            debug!("cluster {}: {} members", id + 1, members.len());
        }

        let result = group_records(self.records, labels);
        info!(
            "hierarchy: {} points, {} clusters, {} noise in {:.1?}",
            n,
            result.cluster_count(),
            result.noise_count(),
            started.elapsed()
        );
        Ok(result)
    }

    /// Prim's algorithm over the mutual-reachability metric.
    ///
    /// O(n²) time, O(n) memory; distances are recomputed on the fly
    /// rather than materializing the full matrix.
    fn spanning_tree(
        &self,
        points: &[GeoPoint],
        core: &[f64],
    ) -> Result<Vec<(f64, usize, usize)>, ClusteringError> {
        let n = points.len();
        let mut in_tree = vec![false; n];
        let mut best = vec![f64::INFINITY; n];
        let mut best_from = vec![usize::MAX; n];
        let mut edges = Vec::with_capacity(n - 1);

        best[0] = 0.0;
        for _ in 0..n {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(ClusteringError::Cancelled);
                }
            }

            let mut u = usize::MAX;
            let mut u_dist = f64::INFINITY;
            for v in 0..n {
                if !in_tree[v] && (u == usize::MAX || best[v] < u_dist) {
                    u = v;
                    u_dist = best[v];
                }
            }

            in_tree[u] = true;
            if best_from[u] != usize::MAX {
                edges.push((best[u], best_from[u], u));
            }

            for v in 0..n {
                if in_tree[v] {
                    continue;
                }
                let w = mutual_reachability(points, core, u, v);
                if w < best[v] {
                    best[v] = w;
                    best_from[v] = u;
                }
            }
        }

        Ok(edges)
    }
}

/// Distance to each point's `min_points`-th nearest neighbor.
///
/// Points with fewer than `min_points` other points, or with non-finite
/// coordinates, get an infinite core distance and end up as noise.
fn core_distances(points: &[GeoPoint], min_points: usize) -> Vec<f64> {
    let n = points.len();
    points
        .par_iter()
        .enumerate()
        .map(|(i, &p)| {
            if !p.is_finite() || n - 1 < min_points {
                return f64::INFINITY;
            }
            let mut dists: Vec<f64> = (0..n)
                .filter(|&j| j != i)
                .map(|j| haversine_km(p, points[j]))
                .collect();
            // NaN distances order last under total_cmp, behaving as
            // infinitely far.
            let (_, kth, _) =
                dists.select_nth_unstable_by(min_points - 1, |a, b| a.total_cmp(b));
            if kth.is_finite() {
                *kth
            } else {
                f64::INFINITY
            }
        })
        .collect()
}

/// `max(core(a), core(b), d(a, b))`; NaN raw distances are absorbed by
/// `f64::max`, so degenerate coordinates yield an infinite edge instead
/// of poisoning the tree.
#[inline]
fn mutual_reachability(points: &[GeoPoint], core: &[f64], a: usize, b: usize) -> f64 {
    haversine_km(points[a], points[b]).max(core[a]).max(core[b])
}

/// Density level for a merge distance; larger means denser.
#[inline]
fn lambda_of(distance: f64) -> f64 {
    if distance.is_finite() {
        1.0 / distance.max(MIN_SPLIT_DISTANCE_KM)
    } else {
        0.0
    }
}

/// Folds sorted MST edges into a single-linkage dendrogram.
fn build_dendrogram(n: usize, mut edges: Vec<(f64, usize, usize)>) -> Vec<DendroNode> {
    edges.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut uf = UnionFind::new(2 * n - 1);
    let mut nodes: Vec<DendroNode> = Vec::with_capacity(n - 1);

    for (distance, a, b) in edges {
        let ra = uf.find(a);
        let rb = uf.find(b);
        let node_id = n + nodes.len();
        let size = subtree_size(n, &nodes, ra) + subtree_size(n, &nodes, rb);
        uf.attach(ra, rb, node_id);
        nodes.push(DendroNode {
            left: ra,
            right: rb,
            distance,
            size,
        });
    }

    nodes
}

#[inline]
fn subtree_size(n: usize, nodes: &[DendroNode], node: usize) -> usize {
    if node < n {
        1
    } else {
        nodes[node - n].size
    }
}

/// All leaf point indices beneath a dendrogram node.
fn collect_leaves(n: usize, nodes: &[DendroNode], root: usize) -> Vec<usize> {
    let mut leaves = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node < n {
            leaves.push(node);
        } else {
            let inner = &nodes[node - n];
            stack.push(inner.left);
            stack.push(inner.right);
        }
    }
    leaves
}

/// Condenses the dendrogram by `min_cluster_size`.
///
/// Walking top-down, a split where both sides hold at least
/// `min_cluster_size` points births two child clusters; a split where one
/// side is smaller spills that side's points out of the current cluster
/// at the split's lambda and carries on down the larger side.
fn condense_tree(
    n: usize,
    nodes: &[DendroNode],
    min_cluster_size: usize,
) -> Vec<CondensedCluster> {
    let root = 2 * n - 2;
    let mut clusters = vec![CondensedCluster {
        parent: None,
        children: Vec::new(),
        birth_lambda: 0.0,
        birth_size: n,
        fallout: Vec::new(),
        split: None,
    }];

    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
    while let Some((node, cluster)) = stack.pop() {
        if node < n {
            // A bare leaf can only reach here when the whole input is a
            // single point, which is handled before condensing.
            let birth = clusters[cluster].birth_lambda;
            clusters[cluster].fallout.push((node, birth));
            continue;
        }

        let inner = &nodes[node - n];
        let lambda = lambda_of(inner.distance);
        let left_size = subtree_size(n, nodes, inner.left);
        let right_size = subtree_size(n, nodes, inner.right);

        if left_size >= min_cluster_size && right_size >= min_cluster_size {
            clusters[cluster].split = Some((lambda, left_size + right_size));
            for (child, size) in [(inner.left, left_size), (inner.right, right_size)] {
                let child_cluster = clusters.len();
                clusters.push(CondensedCluster {
                    parent: Some(cluster),
                    children: Vec::new(),
                    birth_lambda: lambda,
                    birth_size: size,
                    fallout: Vec::new(),
                    split: None,
                });
                clusters[cluster].children.push(child_cluster);
                stack.push((child, child_cluster));
            }
        } else {
            for (child, size) in [(inner.left, left_size), (inner.right, right_size)] {
                if size >= min_cluster_size {
                    stack.push((child, cluster));
                } else {
                    for leaf in collect_leaves(n, nodes, child) {
                        clusters[cluster].fallout.push((leaf, lambda));
                    }
                }
            }
        }
    }

    clusters
}

/// Excess-of-mass stability: how long the cluster's points persisted
/// beyond its birth density.
fn stability(cluster: &CondensedCluster) -> f64 {
    let birth = cluster.birth_lambda;
    let mut total: f64 = cluster
        .fallout
        .iter()
        .map(|&(_, lambda)| lambda - birth)
        .sum();
    if let Some((split_lambda, remaining)) = cluster.split {
        total += remaining as f64 * (split_lambda - birth);
    }
    total
}

/// Bottom-up excess-of-mass selection.
///
/// A cluster beats its children when its own stability exceeds the sum of
/// their best, in which case every descendant is deselected. The root
/// (index 0) never competes.
fn select_clusters(clusters: &[CondensedCluster]) -> Vec<bool> {
    let m = clusters.len();
    let mut selected = vec![false; m];
    let mut best = vec![0.0f64; m];

    // Children always have higher indices than their parent.
    for c in (0..m).rev() {
        let own = stability(&clusters[c]);
        if clusters[c].children.is_empty() {
            if c != 0 {
                selected[c] = true;
            }
            best[c] = own;
            continue;
        }

        let child_sum: f64 = clusters[c].children.iter().map(|&ch| best[ch]).sum();
        if c != 0 && own > child_sum {
            selected[c] = true;
            best[c] = own;
            deselect_descendants(clusters, &mut selected, c);
        } else {
            best[c] = child_sum;
        }
    }

    selected
}

fn deselect_descendants(clusters: &[CondensedCluster], selected: &mut [bool], from: usize) {
    let mut stack: Vec<usize> = clusters[from].children.clone();
    while let Some(c) = stack.pop() {
        selected[c] = false;
        stack.extend(clusters[c].children.iter().copied());
    }
}

/// Maps every point to its nearest selected ancestor cluster, or noise.
///
/// Every point exits the condensed tree exactly once via some cluster's
/// fallout list; walking parent links from there finds the selected
/// cluster that owns it, if any. The returned labels carry raw condensed
/// cluster indices, densified afterwards.
fn assign_labels(n: usize, clusters: &[CondensedCluster], selected: &[bool]) -> Vec<Label> {
    let mut owner = vec![usize::MAX; n];
    for (c, cluster) in clusters.iter().enumerate() {
        for &(p, _) in &cluster.fallout {
            debug_assert_eq!(owner[p], usize::MAX, "point exited the tree twice");
            owner[p] = c;
        }
    }

    let mut labels = vec![Label::Noise; n];
    for p in 0..n {
        let mut c = owner[p];
        debug_assert_ne!(c, usize::MAX, "point never exited the tree");
        loop {
            if selected[c] {
                labels[p] = Label::Cluster(c as u32 + 1);
                break;
            }
            match clusters[c].parent {
                Some(parent) => c = parent,
                None => break,
            }
        }
    }
    labels
}

/// Renumbers raw condensed ids densely in first-appearance order and
/// collects member indices per dense id.
fn densify(mut labels: Vec<Label>) -> (Vec<Label>, Vec<Vec<usize>>) {
    use std::collections::HashMap;

    let mut mapping: HashMap<u32, u32> = HashMap::new();
    let mut members: Vec<Vec<usize>> = Vec::new();

    for (p, label) in labels.iter_mut().enumerate() {
        if let Label::Cluster(raw) = *label {
            let next = members.len() as u32 + 1;
            let dense = *mapping.entry(raw).or_insert_with(|| {
                members.push(Vec::new());
                next
            });
            members[dense as usize - 1].push(p);
            *label = Label::Cluster(dense);
        }
    }

    (labels, members)
}
