/////////////////////////////////////////////////////////////////////////////////////////////
//
// Generates quasi-uniform node sets inside polygonal domains and derives ghost nodes.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Node generation for meshless discretisations.
//!
//! A [`NodeSet`] stores the node coordinates together with, for each node,
//! the index of the boundary edge it lies on or `-1` for interior nodes.
//!
//! [`NodeGenerator`] places nodes along every edge with spacing that follows
//! a density function, fills the interior by rejection sampling and then
//! evens the interior out with a few rounds of nearest-neighbour repulsion.
//!
//! ```
//! use rbf_fd::{geometry::PolygonDomain, nodes::NodeGenerator, config::NodeParams};
//!
//! let nodes = NodeGenerator::builder(PolygonDomain::l_shape(), 500)
//!     .params(NodeParams::builder().seed(1).build())
//!     .build()
//!     .generate()
//!     .unwrap();
//!
//! assert_eq!(nodes.len(), 500);
//! assert!(nodes.num_boundary() > 0);
//! ```

use crate::{
    common::seeded_rng,
    config::NodeParams,
    geometry::{GeometryError, PolygonDomain},
    kdtree::{self, KDTree},
    progress::{report, ProgressMsg, ProgressSink},
};
use faer::Mat;
use rand::Rng;
use rayon::prelude::*;
use rbf_fd_utils::select_mat_rows;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt, sync::Arc};

/// Node density `rho(x)`; spacing scales like `rho^(-1/2)`.
pub type DensityFn = Arc<dyn Fn([f64; 2]) -> f64 + Send + Sync>;

// Resolution of the grid used to integrate the density.
const DENSITY_GRID: usize = 128;
// Subintervals per edge when placing boundary nodes.
const EDGE_SAMPLES: usize = 64;

/// Failures of node generation.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeError {
    /// The requested count cannot cover the boundary and leave interior nodes.
    TooFewNodes { requested: usize, minimum: usize },
    /// The domain itself is invalid.
    Geometry(GeometryError),
    /// Rejection sampling did not produce enough interior nodes.
    Sampling { accepted: usize, requested: usize },
    /// Points and edge ids passed to [`NodeSet::from_parts`] differ in length.
    LengthMismatch { points: usize, simplex_ids: usize },
    /// A node refers to an edge the domain does not have.
    UnknownSimplex { node: usize, simplex: i64 },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::TooFewNodes { requested, minimum } => write!(
                f,
                "{requested} nodes requested but at least {minimum} are needed"
            ),
            NodeError::Geometry(e) => write!(f, "invalid domain: {e}"),
            NodeError::Sampling {
                accepted,
                requested,
            } => write!(
                f,
                "rejection sampling produced {accepted} of {requested} interior nodes"
            ),
            NodeError::LengthMismatch {
                points,
                simplex_ids,
            } => write!(f, "{points} points but {simplex_ids} edge ids"),
            NodeError::UnknownSimplex { node, simplex } => {
                write!(f, "node {node} lies on unknown edge {simplex}")
            }
        }
    }
}

impl Error for NodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NodeError::Geometry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GeometryError> for NodeError {
    fn from(e: GeometryError) -> Self {
        NodeError::Geometry(e)
    }
}

/// Node coordinates with the boundary edge of each node (`-1` if interior).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSet {
    points: Mat<f64>,
    simplex_ids: Vec<i64>,
}

impl NodeSet {
    /// Wraps externally supplied nodes.
    pub fn from_parts(points: Mat<f64>, simplex_ids: Vec<i64>) -> Result<Self, NodeError> {
        if points.nrows() != simplex_ids.len() {
            return Err(NodeError::LengthMismatch {
                points: points.nrows(),
                simplex_ids: simplex_ids.len(),
            });
        }
        Ok(Self {
            points,
            simplex_ids,
        })
    }

    pub fn points(&self) -> &Mat<f64> {
        &self.points
    }

    pub fn simplex_ids(&self) -> &[i64] {
        &self.simplex_ids
    }

    pub fn len(&self) -> usize {
        self.simplex_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.simplex_ids.is_empty()
    }

    pub fn interior_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.simplex_ids[i] < 0).collect()
    }

    pub fn boundary_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.simplex_ids[i] >= 0).collect()
    }

    pub fn num_interior(&self) -> usize {
        self.simplex_ids.iter().filter(|&&s| s < 0).count()
    }

    pub fn num_boundary(&self) -> usize {
        self.len() - self.num_interior()
    }

    /// Same nodes ordered interior first, then boundary. Relative order within
    /// each group is preserved.
    pub fn reorder_interior_first(&self) -> NodeSet {
        let order: Vec<usize> = self
            .interior_indices()
            .into_iter()
            .chain(self.boundary_indices())
            .collect();
        NodeSet {
            points: select_mat_rows(&self.points, &order),
            simplex_ids: order.iter().map(|&i| self.simplex_ids[i]).collect(),
        }
    }

    /// Outward unit normal of each boundary node, in `boundary_indices` order.
    pub fn boundary_normals(&self, domain: &PolygonDomain) -> Result<Mat<f64>, NodeError> {
        let edge_normals = domain.outward_normals();
        let boundary = self.boundary_indices();
        let mut normals = Mat::<f64>::zeros(boundary.len(), 2);
        for (row, &node) in boundary.iter().enumerate() {
            let simplex = self.simplex_ids[node];
            if simplex as usize >= domain.num_edges() {
                return Err(NodeError::UnknownSimplex { node, simplex });
            }
            normals[(row, 0)] = edge_normals[(simplex as usize, 0)];
            normals[(row, 1)] = edge_normals[(simplex as usize, 1)];
        }
        Ok(normals)
    }
}

/// Shortest distance between any two rows of `points`.
pub fn min_spacing(points: &Mat<f64>) -> f64 {
    assert!(points.nrows() >= 2, "spacing needs at least two points");
    let (_, distances) = kdtree::neighbors(points, 2);
    distances
        .col(1)
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Points displaced by `offset` along `normals` from the `boundary` rows of
/// `nodes`. Row `i` of the result belongs to `boundary[i]`.
pub fn ghost_nodes(nodes: &Mat<f64>, boundary: &[usize], normals: &Mat<f64>, offset: f64) -> Mat<f64> {
    assert_eq!(boundary.len(), normals.nrows());
    assert_eq!(nodes.ncols(), normals.ncols());
    Mat::from_fn(boundary.len(), nodes.ncols(), |i, d| {
        nodes[(boundary[i], d)] + offset * normals[(i, d)]
    })
}

/// Builder for [`NodeGenerator`].
pub struct NodeGeneratorBuilder {
    domain: PolygonDomain,
    num_nodes: usize,
    params: NodeParams,
    density: Option<DensityFn>,
    progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl NodeGeneratorBuilder {
    /// Sets dispersal and sampling parameters.
    pub fn params(mut self, params: NodeParams) -> Self {
        self.params = params;
        self
    }

    /// Sets a non-negative node density; uniform when not given.
    pub fn density<F>(mut self, density: F) -> Self
    where
        F: Fn([f64; 2]) -> f64 + Send + Sync + 'static,
    {
        self.density = Some(Arc::new(density));
        self
    }

    /// Attaches a progress sink for dispersal updates.
    pub fn progress_callback(mut self, progress_callback: Arc<dyn ProgressSink>) -> Self {
        self.progress_callback = Some(progress_callback);
        self
    }

    pub fn build(self) -> NodeGenerator {
        NodeGenerator {
            domain: self.domain,
            num_nodes: self.num_nodes,
            params: self.params,
            density: self.density.unwrap_or_else(|| Arc::new(|_| 1.0)),
            progress_callback: self.progress_callback,
        }
    }
}

/// Places a requested number of nodes in a polygonal domain.
pub struct NodeGenerator {
    domain: PolygonDomain,
    num_nodes: usize,
    params: NodeParams,
    density: DensityFn,
    progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl NodeGenerator {
    /// Starts a generator for `num_nodes` nodes in `domain`.
    pub fn builder(domain: PolygonDomain, num_nodes: usize) -> NodeGeneratorBuilder {
        NodeGeneratorBuilder {
            domain,
            num_nodes,
            params: NodeParams::default(),
            density: None,
            progress_callback: None,
        }
    }

    /// Produces the node set, interior nodes first.
    pub fn generate(&self) -> Result<NodeSet, NodeError> {
        let domain = PolygonDomain::new(
            self.domain.vertices().clone(),
            self.domain.simplices().to_vec(),
        )?;

        let (area, rho_max) = self.weighted_area(&domain);
        let length: f64 = (0..domain.num_edges())
            .map(|s| self.edge_cumulative(&domain, s, 1.0).last().copied().unwrap_or(0.0))
            .sum();

        if rho_max <= 0.0 || !rho_max.is_finite() || area <= 0.0 {
            return Err(NodeError::Sampling {
                accepted: 0,
                requested: self.num_nodes,
            });
        }

        // Spacing `h` with area / h^2 + length / h = num_nodes.
        let n = self.num_nodes.max(1) as f64;
        let spacing = (length + (length * length + 4.0 * area * n).sqrt()) / (2.0 * n);

        let (boundary_points, boundary_ids) = self.boundary_nodes(&domain, spacing);
        let num_boundary = boundary_ids.len();
        if self.num_nodes <= num_boundary {
            return Err(NodeError::TooFewNodes {
                requested: self.num_nodes,
                minimum: num_boundary + 1,
            });
        }
        let num_interior = self.num_nodes - num_boundary;

        let interior = self.sample_interior(&domain, num_interior, rho_max)?;

        let mut points = Mat::<f64>::zeros(self.num_nodes, 2);
        for (i, p) in interior.iter().chain(boundary_points.iter()).enumerate() {
            points[(i, 0)] = p[0];
            points[(i, 1)] = p[1];
        }
        self.disperse(&domain, &mut points, num_interior);

        let simplex_ids = std::iter::repeat(-1)
            .take(num_interior)
            .chain(boundary_ids)
            .collect();

        NodeSet::from_parts(points, simplex_ids)
    }

    /// Integral of the density over the domain and its largest sampled value.
    fn weighted_area(&self, domain: &PolygonDomain) -> (f64, f64) {
        let ext = domain.extents();
        let (dx, dy) = (
            (ext[2] - ext[0]) / DENSITY_GRID as f64,
            (ext[3] - ext[1]) / DENSITY_GRID as f64,
        );

        let mut sum = 0.0;
        let mut inside = 0usize;
        let mut rho_max = 0.0f64;
        for i in 0..DENSITY_GRID {
            for j in 0..DENSITY_GRID {
                let p = [ext[0] + (i as f64 + 0.5) * dx, ext[1] + (j as f64 + 0.5) * dy];
                if domain.contains_point(p) {
                    let rho = (self.density)(p);
                    sum += rho;
                    inside += 1;
                    rho_max = rho_max.max(rho);
                }
            }
        }

        let mean = match inside {
            0 => 0.0,
            _ => sum / inside as f64,
        };
        (domain.area() * mean, rho_max)
    }

    /// Cumulative `int sqrt(rho) / spacing` along edge `s` at its sample points.
    fn edge_cumulative(&self, domain: &PolygonDomain, s: usize, spacing: f64) -> Vec<f64> {
        let (a, b) = domain.edge_endpoints(s);
        let dl = domain.edge_length(s) / EDGE_SAMPLES as f64;

        let mut cumulative = Vec::with_capacity(EDGE_SAMPLES + 1);
        cumulative.push(0.0);
        let mut total = 0.0;
        for k in 0..EDGE_SAMPLES {
            let t = (k as f64 + 0.5) / EDGE_SAMPLES as f64;
            let p = [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])];
            total += (self.density)(p).max(0.0).sqrt() * dl / spacing;
            cumulative.push(total);
        }
        cumulative
    }

    fn boundary_nodes(&self, domain: &PolygonDomain, spacing: f64) -> (Vec<[f64; 2]>, Vec<i64>) {
        let mut points = Vec::new();
        let mut ids = Vec::new();

        for s in 0..domain.num_edges() {
            let (a, b) = domain.edge_endpoints(s);
            let cumulative = self.edge_cumulative(domain, s, spacing);
            let total = cumulative[EDGE_SAMPLES];
            let count = (total.round() as usize).max(1);

            // Nodes sit at the middle of equal-mass pieces so none lands on a vertex.
            let mut k = 0;
            for node in 0..count {
                let target = (node as f64 + 0.5) / count as f64 * total;
                while k + 1 < EDGE_SAMPLES && cumulative[k + 1] < target {
                    k += 1;
                }
                let piece = cumulative[k + 1] - cumulative[k];
                let frac = match piece > 0.0 {
                    true => (target - cumulative[k]) / piece,
                    false => 0.5,
                };
                let t = ((k as f64 + frac) / EDGE_SAMPLES as f64).clamp(0.0, 1.0);
                points.push([a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])]);
                ids.push(s as i64);
            }
        }

        (points, ids)
    }

    fn sample_interior(
        &self,
        domain: &PolygonDomain,
        count: usize,
        rho_max: f64,
    ) -> Result<Vec<[f64; 2]>, NodeError> {
        let ext = domain.extents();
        let mut rng = seeded_rng(self.params.seed);
        let mut accepted = Vec::with_capacity(count);
        let batch = count.max(64);

        for _ in 0..self.params.max_sampling_rounds {
            for _ in 0..batch {
                let p = [
                    rng.random_range(ext[0]..ext[2]),
                    rng.random_range(ext[1]..ext[3]),
                ];
                let keep = rng.random::<f64>() * rho_max < (self.density)(p);
                if keep && domain.contains_point(p) {
                    accepted.push(p);
                    if accepted.len() == count {
                        return Ok(accepted);
                    }
                }
            }
        }

        Err(NodeError::Sampling {
            accepted: accepted.len(),
            requested: count,
        })
    }

    /// Pushes the first `num_interior` rows apart; the remaining rows are fixed.
    fn disperse(&self, domain: &PolygonDomain, points: &mut Mat<f64>, num_interior: usize) {
        let total = self.params.iterations;
        let k = (self.params.neighbours + 1).min(points.nrows());
        if k < 2 {
            return;
        }

        for iteration in 0..total {
            let tree = KDTree::new(points);
            let interior = Mat::from_fn(num_interior, 2, |i, d| points[(i, d)]);
            let (ids, distances) =
                tree.k_nearest_neighbors_batch(&interior, k);

            let snapshot = &*points;
            let moves: Vec<Option<[f64; 2]>> = (0..num_interior)
                .into_par_iter()
                .map(|i| {
                    let x = [snapshot[(i, 0)], snapshot[(i, 1)]];
                    let mut force = [0.0, 0.0];
                    let mut nearest = f64::INFINITY;
                    for j in 0..k {
                        let r = *distances.get(i, j);
                        if r == 0.0 {
                            continue;
                        }
                        nearest = nearest.min(r);
                        let other = *ids.get(i, j);
                        for d in 0..2 {
                            force[d] += (x[d] - snapshot[(other, d)]) / r.powi(3);
                        }
                    }
                    let magnitude = (force[0] * force[0] + force[1] * force[1]).sqrt();
                    if magnitude == 0.0 || !nearest.is_finite() {
                        return None;
                    }

                    let scale = self.params.step * nearest / magnitude;
                    let candidate = [x[0] + scale * force[0], x[1] + scale * force[1]];
                    let stays_inside = domain.contains_point(candidate)
                        && domain.intersection(x, candidate).is_none();
                    stays_inside.then_some(candidate)
                })
                .collect();

            for (i, m) in moves.into_iter().enumerate() {
                if let Some(p) = m {
                    points[(i, 0)] = p[0];
                    points[(i, 1)] = p[1];
                }
            }

            report(
                &self.progress_callback,
                ProgressMsg::NodeDispersal {
                    iteration: iteration + 1,
                    total,
                },
            );
        }
    }
}

/// Grid nodes on the unit square without the corners, interior first, and
/// the outward normals of the boundary nodes.
#[cfg(test)]
pub(crate) fn square_grid(m: usize) -> (NodeSet, Mat<f64>) {
    let grid = crate::common::create_evaluation_grid(&[(0.0, 1.0), (0.0, 1.0)], &[m, m]);
    let on_edge = |v: f64| v.abs() < 1e-12 || (v - 1.0).abs() < 1e-12;

    let mut keep = Vec::new();
    let mut ids = Vec::new();
    for i in 0..grid.nrows() {
        let (x, y) = (grid[(i, 0)], grid[(i, 1)]);
        let id = match (on_edge(x), on_edge(y)) {
            (true, true) => continue,
            (false, false) => -1,
            (false, true) => if y < 0.5 { 0 } else { 2 },
            (true, false) => if x > 0.5 { 1 } else { 3 },
        };
        keep.push(i);
        ids.push(id);
    }

    let nodes = NodeSet::from_parts(select_mat_rows(&grid, &keep), ids)
        .unwrap()
        .reorder_interior_first();
    let normals = nodes
        .boundary_normals(&PolygonDomain::unit_square())
        .unwrap();
    (nodes, normals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;
    use std::sync::Mutex;

    fn generate(domain: PolygonDomain, n: usize) -> NodeSet {
        NodeGenerator::builder(domain, n)
            .params(NodeParams::builder().seed(7).build())
            .build()
            .generate()
            .unwrap()
    }

    #[test]
    fn l_shape_nodes_are_inside_and_labelled() {
        let domain = PolygonDomain::l_shape();
        let nodes = generate(domain.clone(), 800);

        assert_eq!(nodes.len(), 800);
        assert_eq!(nodes.num_interior() + nodes.num_boundary(), 800);

        let interior = select_mat_rows(nodes.points(), &nodes.interior_indices());
        assert!(domain.contains(&interior).into_iter().all(|inside| inside));

        // Interior nodes come first.
        assert!(nodes.simplex_ids()[..nodes.num_interior()].iter().all(|&s| s == -1));
    }

    #[test]
    fn boundary_nodes_lie_on_their_edge_away_from_vertices() {
        let domain = PolygonDomain::l_shape();
        let nodes = generate(domain.clone(), 400);

        for i in nodes.boundary_indices() {
            let s = nodes.simplex_ids()[i] as usize;
            let (a, b) = domain.edge_endpoints(s);
            let p = [nodes.points()[(i, 0)], nodes.points()[(i, 1)]];
            let cross = (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
            assert!(cross.abs() < 1e-12);

            for v in [a, b] {
                let dist = ((p[0] - v[0]).powi(2) + (p[1] - v[1]).powi(2)).sqrt();
                assert!(dist > 1e-3);
            }
        }
    }

    #[test]
    fn boundary_count_tracks_the_perimeter() {
        let nodes = generate(PolygonDomain::unit_square(), 1000);
        // h = (4 + sqrt(16 + 4000)) / 2000 gives 30 nodes per side.
        assert_eq!(nodes.num_boundary(), 120);
        assert_eq!(nodes.num_interior(), 880);
    }

    #[test]
    fn dispersal_increases_minimum_spacing() {
        let domain = PolygonDomain::unit_square();
        let raw = NodeGenerator::builder(domain.clone(), 500)
            .params(NodeParams::builder().seed(3).iterations(0).build())
            .build()
            .generate()
            .unwrap();
        let dispersed = NodeGenerator::builder(domain, 500)
            .params(NodeParams::builder().seed(3).iterations(30).build())
            .build()
            .generate()
            .unwrap();
        assert!(min_spacing(dispersed.points()) > min_spacing(raw.points()));
    }

    #[test]
    fn density_concentrates_nodes() {
        let nodes = NodeGenerator::builder(PolygonDomain::unit_square(), 2000)
            .params(NodeParams::builder().seed(9).iterations(5).build())
            .density(|p| if p[0] < 0.5 { 4.0 } else { 1.0 })
            .build()
            .generate()
            .unwrap();

        let interior = nodes.interior_indices();
        let left = interior.iter().filter(|&&i| nodes.points()[(i, 0)] < 0.5).count();
        let right = interior.len() - left;
        assert!(left as f64 > 2.5 * right as f64);
    }

    #[test]
    fn generation_is_reproducible_with_a_seed() {
        let a = generate(PolygonDomain::l_shape(), 300);
        let b = generate(PolygonDomain::l_shape(), 300);
        assert_eq!(a, b);
    }

    #[test]
    fn too_few_nodes_is_an_error() {
        let err = NodeGenerator::builder(PolygonDomain::l_shape(), 5)
            .build()
            .generate()
            .unwrap_err();
        assert!(matches!(err, NodeError::TooFewNodes { requested: 5, .. }));
    }

    #[test]
    fn dispersal_reports_progress() {
        #[derive(Debug, Default)]
        struct Collect(Mutex<Vec<ProgressMsg>>);
        impl ProgressSink for Collect {
            fn emit(&self, msg: ProgressMsg) {
                self.0.lock().unwrap().push(msg);
            }
        }

        let sink = Arc::new(Collect::default());
        NodeGenerator::builder(PolygonDomain::unit_square(), 100)
            .params(NodeParams::builder().seed(1).iterations(4).build())
            .progress_callback(sink.clone())
            .build()
            .generate()
            .unwrap();

        let msgs = sink.0.lock().unwrap();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[3], ProgressMsg::NodeDispersal { iteration: 4, total: 4 });
    }

    #[test]
    fn reorder_and_normals() {
        let points = mat![[0.5, 0.0], [0.5, 0.5], [1.0, 0.5], [0.25, 0.25]];
        let nodes = NodeSet::from_parts(points, vec![0, -1, 1, -1]).unwrap();
        let ordered = nodes.reorder_interior_first();

        assert_eq!(ordered.simplex_ids(), &[-1, -1, 0, 1]);
        assert_eq!(ordered.points()[(1, 0)], 0.25);

        let normals = ordered.boundary_normals(&PolygonDomain::unit_square()).unwrap();
        assert_eq!(normals, mat![[0.0, -1.0], [1.0, 0.0]]);

        let ghosts = ghost_nodes(ordered.points(), &ordered.boundary_indices(), &normals, 0.1);
        assert!((ghosts[(0, 1)] + 0.1).abs() < 1e-15);
        assert!((ghosts[(1, 0)] - 1.1).abs() < 1e-15);

        assert_eq!(
            NodeSet::from_parts(Mat::zeros(2, 2), vec![-1]).unwrap_err(),
            NodeError::LengthMismatch { points: 2, simplex_ids: 1 }
        );
    }

    #[test]
    fn min_spacing_of_a_grid() {
        let points = mat![[0.0, 0.0], [0.1, 0.0], [0.0, 0.3], [1.0, 1.0]];
        assert!((min_spacing(&points) - 0.1).abs() < 1e-15);
    }
}
