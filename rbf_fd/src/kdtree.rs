/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides a simple KD-tree implementation for nearest-neighbour queries on node sets.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! KD-tree over the rows of a point matrix.
//!
//! Used to pick RBF-FD stencils, to measure node spacing and to drive node
//! dispersal.

use faer::{Mat, RowRef};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[inline(always)]
fn distance(a: RowRef<f64>, b: RowRef<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// A node in the KDTree
#[derive(Debug)]
struct Node {
    index: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

#[derive(Debug, PartialEq)]
struct Neighbour {
    distance: f64,
    index: usize,
}

impl Eq for Neighbour {}

impl PartialOrd for Neighbour {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Max-heap on distance, so the heap top is the current worst candidate.
impl Ord for Neighbour {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then(self.index.cmp(&other.index))
    }
}

/// The KDTree structure
#[derive(Debug)]
pub struct KDTree {
    points: Mat<f64>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl KDTree {
    /// Constructs a new KDTree from a Mat of points (one point per row).
    pub fn new(points: &Mat<f64>) -> Self {
        let mut indices: Vec<usize> = (0..points.nrows()).collect();
        let mut tree = KDTree {
            points: points.clone(),
            nodes: Vec::with_capacity(points.nrows()),
            root: None,
        };
        tree.root = tree.build_tree(&mut indices, 0);
        tree
    }

    /// Number of points stored in the tree.
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Recursively builds the KDTree and stores nodes in a flat vector.
    fn build_tree(&mut self, indices: &mut [usize], depth: usize) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }

        let axis = depth % self.points.ncols().max(1);
        let mid = indices.len() / 2;
        let points = &self.points;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            points[(a, axis)]
                .partial_cmp(&points[(b, axis)])
                .unwrap_or(Ordering::Equal)
        });

        let node_index = self.nodes.len();
        self.nodes.push(Node {
            index: indices[mid],
            axis,
            left: None,
            right: None,
        });

        let (lower, upper) = indices.split_at_mut(mid);
        let left = self.build_tree(lower, depth + 1);
        let right = self.build_tree(&mut upper[1..], depth + 1);
        self.nodes[node_index].left = left;
        self.nodes[node_index].right = right;

        Some(node_index)
    }

    /// Returns the `k` nearest points to `target` as `(index, distance)`,
    /// nearest first.
    pub fn k_nearest_neighbors(
        &self,
        target: RowRef<f64>,
        k: usize,
    ) -> Vec<(usize, f64)> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = self.root {
            self.k_nearest_impl(root, target, k, &mut heap);
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|n| (n.index, n.distance))
            .collect()
    }

    /// Batched k-nearest-neighbour query, one query per row of `query_points`.
    ///
    /// Returns `(indices, distances)`, each of shape `(num_queries, k)` and
    /// sorted nearest first along each row.
    pub fn k_nearest_neighbors_batch(
        &self,
        query_points: &Mat<f64>,
        k: usize,
    ) -> (Mat<usize>, Mat<f64>) {
        assert!(
            k <= self.len(),
            "requested {k} neighbours from a tree of {} points",
            self.len()
        );

        let neighbours: Vec<Vec<(usize, f64)>> = (0..query_points.nrows())
            .into_par_iter()
            .map(|i| self.k_nearest_neighbors(query_points.row(i), k))
            .collect();

        let ids = Mat::from_fn(query_points.nrows(), k, |i, j| neighbours[i][j].0);
        let dists = Mat::from_fn(query_points.nrows(), k, |i, j| neighbours[i][j].1);
        (ids, dists)
    }

    fn k_nearest_impl(
        &self,
        node_index: usize,
        target: RowRef<f64>,
        k: usize,
        heap: &mut BinaryHeap<Neighbour>,
    ) {
        let node = &self.nodes[node_index];
        let point = self.points.row(node.index);
        let dist = distance(target, point);

        let worst = heap.peek().map(|n| n.distance).unwrap_or(f64::INFINITY);
        if heap.len() < k {
            heap.push(Neighbour {
                distance: dist,
                index: node.index,
            });
        } else if dist < worst {
            heap.pop();
            heap.push(Neighbour {
                distance: dist,
                index: node.index,
            });
        }

        let diff = target[node.axis] - point[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near) = near {
            self.k_nearest_impl(near, target, k, heap);
        }

        if let Some(far) = far {
            let worst = heap.peek().map(|n| n.distance).unwrap_or(f64::INFINITY);
            if heap.len() < k || diff.abs() <= worst {
                self.k_nearest_impl(far, target, k, heap);
            }
        }
    }
}

/// The `k` nearest neighbours of every point in `points` among `points`
/// itself, Euclidean distance.
///
/// Column 0 is each point itself at distance zero (ties with duplicates
/// aside), so `neighbors(points, 2).1` column 1 holds the distance to the
/// closest other node.
pub fn neighbors(points: &Mat<f64>, k: usize) -> (Mat<usize>, Mat<f64>) {
    KDTree::new(points).k_nearest_neighbors_batch(points, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, dim: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Mat::from_fn(n, dim, |_, _| rng.random_range(0.0..1.0))
    }

    fn brute_force_knn(
        points: &Mat<f64>,
        target: RowRef<f64>,
        k: usize,
    ) -> Vec<(usize, f64)> {
        let mut all: Vec<(usize, f64)> = (0..points.nrows())
            .map(|i| (i, distance(target, points.row(i))))
            .collect();
        all.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        all.truncate(k);
        all
    }

    #[test]
    fn knn_matches_bruteforce_in_1d_2d_3d() {
        for (n, d, seed) in [(200, 1, 42u64), (300, 2, 123u64), (400, 3, 999u64)] {
            let points = random_points(n, d, seed);
            let queries = random_points(20, d, seed + 1);
            let tree = KDTree::new(&points);

            for q in 0..queries.nrows() {
                let got = tree.k_nearest_neighbors(queries.row(q), 7);
                let expected = brute_force_knn(&points, queries.row(q), 7);
                let got_d: Vec<f64> = got.iter().map(|n| n.1).collect();
                let exp_d: Vec<f64> = expected.iter().map(|n| n.1).collect();
                assert_eq!(got_d, exp_d);
            }
        }
    }

    #[test]
    fn batch_query_puts_each_point_first() {
        let points = random_points(100, 2, 7);
        let (ids, dists) = neighbors(&points, 3);

        assert_eq!(ids.nrows(), 100);
        assert_eq!(ids.ncols(), 3);
        for i in 0..100 {
            assert_eq!(*ids.get(i, 0), i);
            assert_eq!(*dists.get(i, 0), 0.0);
            assert!(dists.get(i, 1) <= dists.get(i, 2));
        }
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let points = Mat::<f64>::zeros(0, 2);
        let tree = KDTree::new(&points);
        let q = Mat::<f64>::zeros(1, 2);
        assert!(tree.is_empty());
        assert!(tree.k_nearest_neighbors(q.row(0), 3).is_empty());
    }

    #[test]
    fn fewer_points_than_k_returns_all() {
        let points = random_points(4, 2, 3);
        let tree = KDTree::new(&points);
        let got = tree.k_nearest_neighbors(points.row(0), 10);
        assert_eq!(got.len(), 4);
        assert_eq!(got[0].0, 0);
    }
}
