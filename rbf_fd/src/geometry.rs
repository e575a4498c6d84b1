/////////////////////////////////////////////////////////////////////////////////////////////
//
// Describes closed polygonal domains and answers containment, normal and crossing queries.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Two-dimensional polygonal domains.
//!
//! A domain is a vertex matrix (`n_v x 2`) and a list of edges ("simplices"),
//! each a pair of vertex indices. The edges must form a closed, simple
//! boundary; the region may be non-convex.
//!
//! ```
//! use rbf_fd::geometry::PolygonDomain;
//! use faer::mat;
//!
//! let domain = PolygonDomain::l_shape();
//! assert_eq!(domain.area(), 3.0);
//!
//! let inside = domain.contains(&mat![[0.5, 0.5], [1.5, 1.5f64]]);
//! assert_eq!(inside, vec![true, false]);
//! ```

use faer::{Mat, mat};
use rbf_fd_utils::get_pointarray_extents;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Invalid or degenerate domain descriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Vertices must be two-dimensional.
    WrongDimension { found: usize },
    /// An edge refers to a vertex that does not exist.
    InvalidIndex { simplex: usize, vertex: usize },
    /// An edge has zero length.
    DegenerateEdge { simplex: usize },
    /// A closed boundary needs at least three edges.
    TooFewEdges { found: usize },
    /// The enclosed area is zero.
    ZeroArea,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::WrongDimension { found } => {
                write!(f, "domain vertices must be 2-D, found {found} columns")
            }
            GeometryError::InvalidIndex { simplex, vertex } => {
                write!(f, "edge {simplex} refers to missing vertex {vertex}")
            }
            GeometryError::DegenerateEdge { simplex } => {
                write!(f, "edge {simplex} has zero length")
            }
            GeometryError::TooFewEdges { found } => {
                write!(f, "a closed boundary needs at least 3 edges, found {found}")
            }
            GeometryError::ZeroArea => f.write_str("domain encloses zero area"),
        }
    }
}

impl Error for GeometryError {}

/// Closed polygonal region in the plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonDomain {
    vertices: Mat<f64>,
    simplices: Vec<[usize; 2]>,
}

impl PolygonDomain {
    /// Validates and wraps a vertex matrix and edge list.
    pub fn new(vertices: Mat<f64>, simplices: Vec<[usize; 2]>) -> Result<Self, GeometryError> {
        if vertices.ncols() != 2 {
            return Err(GeometryError::WrongDimension {
                found: vertices.ncols(),
            });
        }
        if simplices.len() < 3 {
            return Err(GeometryError::TooFewEdges {
                found: simplices.len(),
            });
        }
        for (s, edge) in simplices.iter().enumerate() {
            for &v in edge {
                if v >= vertices.nrows() {
                    return Err(GeometryError::InvalidIndex {
                        simplex: s,
                        vertex: v,
                    });
                }
            }
        }

        let domain = Self {
            vertices,
            simplices,
        };

        for s in 0..domain.num_edges() {
            if domain.edge_length(s) == 0.0 {
                return Err(GeometryError::DegenerateEdge { simplex: s });
            }
        }
        if domain.area() == 0.0 {
            return Err(GeometryError::ZeroArea);
        }

        Ok(domain)
    }

    /// The L-shaped domain `[0,2]^2` minus `(1,2]^2`.
    pub fn l_shape() -> Self {
        Self {
            vertices: mat![
                [0.0, 0.0],
                [2.0, 0.0],
                [2.0, 1.0],
                [1.0, 1.0],
                [1.0, 2.0],
                [0.0, 2.0f64],
            ],
            simplices: vec![[0, 1], [1, 2], [2, 3], [3, 4], [4, 5], [5, 0]],
        }
    }

    /// The unit square `[0,1]^2`.
    pub fn unit_square() -> Self {
        Self {
            vertices: mat![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0f64]],
            simplices: vec![[0, 1], [1, 2], [2, 3], [3, 0]],
        }
    }

    pub fn vertices(&self) -> &Mat<f64> {
        &self.vertices
    }

    pub fn simplices(&self) -> &[[usize; 2]] {
        &self.simplices
    }

    pub fn num_edges(&self) -> usize {
        self.simplices.len()
    }

    /// Start and end point of edge `s`.
    #[inline]
    pub fn edge_endpoints(&self, s: usize) -> ([f64; 2], [f64; 2]) {
        let [a, b] = self.simplices[s];
        (
            [self.vertices[(a, 0)], self.vertices[(a, 1)]],
            [self.vertices[(b, 0)], self.vertices[(b, 1)]],
        )
    }

    pub fn edge_length(&self, s: usize) -> f64 {
        let (a, b) = self.edge_endpoints(s);
        ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt()
    }

    pub fn perimeter(&self) -> f64 {
        (0..self.num_edges()).map(|s| self.edge_length(s)).sum()
    }

    /// Enclosed area by the shoelace formula over the edges.
    pub fn area(&self) -> f64 {
        let twice: f64 = (0..self.num_edges())
            .map(|s| {
                let (a, b) = self.edge_endpoints(s);
                a[0] * b[1] - b[0] * a[1]
            })
            .sum();
        0.5 * twice.abs()
    }

    /// Bounding box as `[xmin, ymin, xmax, ymax]`.
    pub fn extents(&self) -> Vec<f64> {
        get_pointarray_extents(&self.vertices)
    }

    /// Even-odd test for a single point.
    pub fn contains_point(&self, p: [f64; 2]) -> bool {
        let mut inside = false;
        for s in 0..self.num_edges() {
            let (a, b) = self.edge_endpoints(s);
            if (a[1] > p[1]) != (b[1] > p[1]) {
                let x_cross = a[0] + (p[1] - a[1]) * (b[0] - a[0]) / (b[1] - a[1]);
                if p[0] < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Even-odd ray casting for every row of `points`.
    pub fn contains(&self, points: &Mat<f64>) -> Vec<bool> {
        assert_eq!(points.ncols(), 2);
        (0..points.nrows())
            .map(|i| self.contains_point([points[(i, 0)], points[(i, 1)]]))
            .collect()
    }

    /// Unit outward normal of every edge, one row per edge.
    pub fn outward_normals(&self) -> Mat<f64> {
        let ext = self.extents();
        let size = (ext[2] - ext[0]).max(ext[3] - ext[1]);
        let nudge = 1e-6 * size;

        let mut normals = Mat::<f64>::zeros(self.num_edges(), 2);
        for s in 0..self.num_edges() {
            let (a, b) = self.edge_endpoints(s);
            let length = self.edge_length(s);
            let mut n = [(b[1] - a[1]) / length, -(b[0] - a[0]) / length];

            let mid = [0.5 * (a[0] + b[0]), 0.5 * (a[1] + b[1])];
            if self.contains_point([mid[0] + nudge * n[0], mid[1] + nudge * n[1]]) {
                n = [-n[0], -n[1]];
            }
            normals[(s, 0)] = n[0];
            normals[(s, 1)] = n[1];
        }
        normals
    }

    /// Nearest crossing of the segment `start -> end` with the boundary, as
    /// the crossing point and the edge it lies on.
    pub fn intersection(&self, start: [f64; 2], end: [f64; 2]) -> Option<([f64; 2], usize)> {
        let d = [end[0] - start[0], end[1] - start[1]];
        let mut best: Option<(f64, usize)> = None;

        for s in 0..self.num_edges() {
            let (a, b) = self.edge_endpoints(s);
            let e = [b[0] - a[0], b[1] - a[1]];
            let denom = d[0] * e[1] - d[1] * e[0];
            if denom == 0.0 {
                continue;
            }
            let w = [a[0] - start[0], a[1] - start[1]];
            let t = (w[0] * e[1] - w[1] * e[0]) / denom;
            let u = (w[0] * d[1] - w[1] * d[0]) / denom;
            let closer = best.map_or(true, |(t_best, _)| t < t_best);
            if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) && closer {
                best = Some((t, s));
            }
        }

        best.map(|(t, s)| ([start[0] + t * d[0], start[1] + t * d[1]], s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l_shape_measures() {
        let domain = PolygonDomain::l_shape();
        assert_eq!(domain.area(), 3.0);
        assert_eq!(domain.perimeter(), 8.0);
        assert_eq!(domain.extents(), vec![0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn containment_handles_the_reentrant_corner() {
        let domain = PolygonDomain::l_shape();
        let points = mat![
            [0.5, 0.5],
            [1.5, 0.5],
            [0.5, 1.5],
            [1.5, 1.5],
            [-0.1, 0.5],
            [2.5, 0.5f64],
        ];
        assert_eq!(
            domain.contains(&points),
            vec![true, true, true, false, false, false]
        );
    }

    #[test]
    fn normals_point_outward() {
        let domain = PolygonDomain::l_shape();
        let normals = domain.outward_normals();
        let expected = [
            [0.0, -1.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [-1.0, 0.0],
        ];
        for (s, n) in expected.iter().enumerate() {
            assert!((normals[(s, 0)] - n[0]).abs() < 1e-12);
            assert!((normals[(s, 1)] - n[1]).abs() < 1e-12);
        }
    }

    #[test]
    fn normals_do_not_depend_on_orientation() {
        let clockwise = PolygonDomain::new(
            mat![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0f64]],
            vec![[0, 1], [1, 2], [2, 3], [3, 0]],
        )
        .unwrap();
        let normals = clockwise.outward_normals();
        // Edge 0 is the left side, x = 0.
        assert!((normals[(0, 0)] + 1.0).abs() < 1e-12);
        assert!(normals[(0, 1)].abs() < 1e-12);
    }

    #[test]
    fn segment_crossing_returns_nearest_edge() {
        let domain = PolygonDomain::unit_square();
        let (point, edge) = domain.intersection([0.5, 0.5], [0.5, 3.0]).unwrap();
        assert_eq!(edge, 2);
        assert!((point[1] - 1.0).abs() < 1e-12);
        assert!(domain.intersection([0.2, 0.2], [0.8, 0.8]).is_none());
    }

    #[test]
    fn degenerate_descriptions_are_rejected() {
        let vertices = mat![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0f64]];
        assert_eq!(
            PolygonDomain::new(vertices.clone(), vec![[0, 1], [1, 2]]).unwrap_err(),
            GeometryError::TooFewEdges { found: 2 }
        );
        assert_eq!(
            PolygonDomain::new(vertices.clone(), vec![[0, 1], [1, 2], [2, 7]]).unwrap_err(),
            GeometryError::InvalidIndex { simplex: 2, vertex: 7 }
        );
        assert_eq!(
            PolygonDomain::new(vertices.clone(), vec![[0, 1], [1, 1], [2, 0]]).unwrap_err(),
            GeometryError::DegenerateEdge { simplex: 1 }
        );

        let collinear = mat![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0f64]];
        assert_eq!(
            PolygonDomain::new(collinear, vec![[0, 1], [1, 2], [2, 0]]).unwrap_err(),
            GeometryError::ZeroArea
        );
    }
}
