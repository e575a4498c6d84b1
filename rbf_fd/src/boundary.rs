/////////////////////////////////////////////////////////////////////////////////////////////
//
// Enforces boundary conditions by solving for ghost node values with a cached factorisation.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Ghost node boundary conditions
//!
//! Every boundary node owns one ghost node just outside the domain. The
//! boundary rows of a condition `B u = g` involve the physical ("known")
//! nodes and the ghost nodes:
//!
//! ```text
//! B[:, known] u_known + B[:, ghost] u_ghost = g
//! ```
//!
//! so the ghost values follow from a square sparse solve. The ghost block is
//! factorised once by [`GhostSystem`] and reused for every solve.

use crate::linalg::{LinalgError, SparseLu, SparseOperator};
use std::{error::Error, fmt};

/// Failures while setting up or solving the ghost system.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryError {
    /// The ghost block must have one ghost column per boundary row.
    NotSquare { rows: usize, ghosts: usize },
    /// Known values or a full field have the wrong length.
    StateLength { expected: usize, found: usize },
    /// Prescribed values do not match the number of boundary nodes.
    TargetLength { expected: usize, found: usize },
    /// A Robin condition needs a non-zero derivative coefficient.
    DegenerateRobin,
    /// Factorisation or solve of the ghost block failed.
    Linalg(LinalgError),
}

impl fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryError::NotSquare { rows, ghosts } => write!(
                f,
                "{rows} boundary rows but {ghosts} ghost columns"
            ),
            BoundaryError::StateLength { expected, found } => {
                write!(f, "expected {expected} values, found {found}")
            }
            BoundaryError::TargetLength { expected, found } => write!(
                f,
                "expected {expected} boundary values, found {found}"
            ),
            BoundaryError::DegenerateRobin => {
                f.write_str("Robin condition needs a non-zero normal derivative coefficient")
            }
            BoundaryError::Linalg(e) => write!(f, "ghost solve failed: {e}"),
        }
    }
}

impl Error for BoundaryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BoundaryError::Linalg(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LinalgError> for BoundaryError {
    fn from(e: LinalgError) -> Self {
        BoundaryError::Linalg(e)
    }
}

/// Condition imposed on the boundary nodes.
///
/// Dirichlet conditions are not offered: they do not involve the ghost
/// values, which would leave the ghost system singular.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BoundaryCondition {
    /// `du/dn = 0`, a free reflecting surface.
    #[default]
    Free,
    /// `du/dn = values`.
    Neumann { values: Vec<f64> },
    /// `alpha u + beta du/dn = values`.
    Robin {
        alpha: f64,
        beta: f64,
        values: Vec<f64>,
    },
}

impl BoundaryCondition {
    /// Right-hand side `g` for `num_boundary` boundary nodes.
    pub fn targets(&self, num_boundary: usize) -> Result<Vec<f64>, BoundaryError> {
        let values = match self {
            BoundaryCondition::Free => return Ok(vec![0.0; num_boundary]),
            BoundaryCondition::Neumann { values } => values,
            BoundaryCondition::Robin { values, .. } => values,
        };
        if values.len() != num_boundary {
            return Err(BoundaryError::TargetLength {
                expected: num_boundary,
                found: values.len(),
            });
        }
        Ok(values.clone())
    }

    /// Boundary operator `B` built from the normal derivative operator.
    ///
    /// Row `i` of `normal_derivative` belongs to the boundary node stored in
    /// column `boundary_columns[i]`.
    pub fn operator(
        &self,
        normal_derivative: &SparseOperator,
        boundary_columns: &[usize],
    ) -> Result<SparseOperator, BoundaryError> {
        match self {
            BoundaryCondition::Free | BoundaryCondition::Neumann { .. } => {
                Ok(normal_derivative.clone())
            }
            BoundaryCondition::Robin { alpha, beta, .. } => {
                if *beta == 0.0 {
                    return Err(BoundaryError::DegenerateRobin);
                }
                if boundary_columns.len() != normal_derivative.nrows() {
                    return Err(BoundaryError::TargetLength {
                        expected: normal_derivative.nrows(),
                        found: boundary_columns.len(),
                    });
                }
                let mut triplets: Vec<(usize, usize, f64)> = normal_derivative
                    .to_triplets()
                    .into_iter()
                    .map(|(i, j, v)| (i, j, beta * v))
                    .collect();
                triplets.extend(
                    boundary_columns
                        .iter()
                        .enumerate()
                        .map(|(i, &j)| (i, j, *alpha)),
                );
                Ok(SparseOperator::from_triplets(
                    normal_derivative.nrows(),
                    normal_derivative.ncols(),
                    &triplets,
                )?)
            }
        }
    }
}

/// Boundary operator split into known and ghost columns, with the ghost
/// block factorised.
#[derive(Debug)]
pub struct GhostSystem {
    operator: SparseOperator,
    known: SparseOperator,
    ghost_lu: SparseLu,
    targets: Vec<f64>,
    num_known: usize,
    fingerprint: u64,
}

impl GhostSystem {
    /// `operator` has one row per boundary node; its first `num_known`
    /// columns are physical nodes and the rest are ghost nodes.
    pub fn new(
        operator: SparseOperator,
        num_known: usize,
        targets: Vec<f64>,
    ) -> Result<Self, BoundaryError> {
        if targets.len() != operator.nrows() {
            return Err(BoundaryError::TargetLength {
                expected: operator.nrows(),
                found: targets.len(),
            });
        }
        let (known, ghost_lu) = Self::factor(&operator, num_known)?;
        let fingerprint = operator.fingerprint();

        Ok(Self {
            operator,
            known,
            ghost_lu,
            targets,
            num_known,
            fingerprint,
        })
    }

    /// Builds the system for `condition` from a normal derivative operator.
    pub fn from_condition(
        normal_derivative: &SparseOperator,
        num_known: usize,
        boundary_columns: &[usize],
        condition: &BoundaryCondition,
    ) -> Result<Self, BoundaryError> {
        let operator = condition.operator(normal_derivative, boundary_columns)?;
        let targets = condition.targets(operator.nrows())?;
        Self::new(operator, num_known, targets)
    }

    fn factor(
        operator: &SparseOperator,
        num_known: usize,
    ) -> Result<(SparseOperator, SparseLu), BoundaryError> {
        let ghosts = operator.ncols().saturating_sub(num_known);
        if num_known > operator.ncols() || ghosts != operator.nrows() {
            return Err(BoundaryError::NotSquare {
                rows: operator.nrows(),
                ghosts,
            });
        }
        let (known, ghost) = operator.split_columns(num_known)?;
        let ghost_lu = SparseLu::factor(&ghost)?;
        Ok((known, ghost_lu))
    }

    /// Swaps in a new boundary operator. The ghost block is refactorised only
    /// when the operator differs from the cached one; returns whether it was.
    pub fn replace_operator(&mut self, operator: SparseOperator) -> Result<bool, BoundaryError> {
        let fingerprint = operator.fingerprint();
        if fingerprint == self.fingerprint && operator == self.operator {
            return Ok(false);
        }
        if operator.nrows() != self.targets.len() {
            return Err(BoundaryError::TargetLength {
                expected: operator.nrows(),
                found: self.targets.len(),
            });
        }
        let (known, ghost_lu) = Self::factor(&operator, self.num_known)?;
        self.operator = operator;
        self.known = known;
        self.ghost_lu = ghost_lu;
        self.fingerprint = fingerprint;
        Ok(true)
    }

    /// Fingerprint of the operator whose ghost block is factorised.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn operator(&self) -> &SparseOperator {
        &self.operator
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn num_known(&self) -> usize {
        self.num_known
    }

    pub fn num_ghost(&self) -> usize {
        self.operator.nrows()
    }

    /// Ghost values satisfying the condition exactly for the given
    /// physical values.
    pub fn solve_ghosts(&self, u_known: &[f64]) -> Result<Vec<f64>, BoundaryError> {
        if u_known.len() != self.num_known {
            return Err(BoundaryError::StateLength {
                expected: self.num_known,
                found: u_known.len(),
            });
        }
        let rhs: Vec<f64> = self
            .known
            .apply(u_known)
            .into_iter()
            .zip(&self.targets)
            .map(|(bu, g)| g - bu)
            .collect();
        Ok(self.ghost_lu.solve(&rhs)?)
    }

    /// `B u - g` for a full field (physical then ghost values).
    pub fn residual(&self, u_full: &[f64]) -> Result<Vec<f64>, BoundaryError> {
        if u_full.len() != self.operator.ncols() {
            return Err(BoundaryError::StateLength {
                expected: self.operator.ncols(),
                found: u_full.len(),
            });
        }
        Ok(self
            .operator
            .apply(u_full)
            .into_iter()
            .zip(&self.targets)
            .map(|(bu, g)| bu - g)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::StencilParams,
        fd::{weight_matrix, DifferentialOperator},
        nodes::{ghost_nodes, square_grid, NodeSet},
        rbf_test_functions::RBFTestFunctions,
    };
    use faer::Mat;

    struct Setup {
        all: Mat<f64>,
        ghosts: Mat<f64>,
        normals: Mat<f64>,
        num_physical: usize,
        boundary: Vec<usize>,
        dd: SparseOperator,
    }

    fn setup(m: usize) -> Setup {
        let (nodes, normals): (NodeSet, Mat<f64>) = square_grid(m);
        let h = 1.0 / (m - 1) as f64;
        let boundary = nodes.boundary_indices();
        let ghosts = ghost_nodes(nodes.points(), &boundary, &normals, 0.5 * h);

        let num_physical = nodes.len();
        let all = Mat::from_fn(num_physical + ghosts.nrows(), 2, |i, d| {
            if i < num_physical {
                nodes.points()[(i, d)]
            } else {
                ghosts[(i - num_physical, d)]
            }
        });
        let boundary_points = rbf_fd_utils::select_mat_rows(nodes.points(), &boundary);
        let dd = weight_matrix(
            &boundary_points,
            &all,
            &DifferentialOperator::directional(&normals),
            &StencilParams::default(),
        )
        .unwrap();

        Setup {
            all,
            ghosts,
            normals,
            num_physical,
            boundary,
            dd,
        }
    }

    fn sample(points: &Mat<f64>, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        (0..points.nrows()).map(|i| f(points[(i, 0)], points[(i, 1)])).collect()
    }

    #[test]
    fn free_condition_reproduces_even_extension() {
        let s = setup(21);
        let system = GhostSystem::from_condition(
            &s.dd,
            s.num_physical,
            &s.boundary,
            &BoundaryCondition::Free,
        )
        .unwrap();

        let physical = Mat::from_fn(s.num_physical, 2, |i, d| s.all[(i, d)]);
        let u_known = RBFTestFunctions::cos_product(&physical);
        let ghosts = system.solve_ghosts(&u_known).unwrap();

        // cos(pi x) cos(pi y) is even about every side of the square.
        let exact = RBFTestFunctions::cos_product(&s.ghosts);
        let worst = ghosts
            .iter()
            .zip(&exact)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(worst < 5e-2, "{worst}");

        let full: Vec<f64> = u_known.iter().chain(&ghosts).copied().collect();
        for r in system.residual(&full).unwrap() {
            assert!(r.abs() < 1e-8);
        }
    }

    #[test]
    fn neumann_condition_is_exact_for_linear_fields() {
        let s = setup(11);
        let values: Vec<f64> = (0..s.normals.nrows())
            .map(|i| 2.0 * s.normals[(i, 0)] + 3.0 * s.normals[(i, 1)])
            .collect();
        let system = GhostSystem::from_condition(
            &s.dd,
            s.num_physical,
            &s.boundary,
            &BoundaryCondition::Neumann { values },
        )
        .unwrap();

        let linear = |x: f64, y: f64| 1.0 + 2.0 * x + 3.0 * y;
        let physical = Mat::from_fn(s.num_physical, 2, |i, d| s.all[(i, d)]);
        let ghosts = system.solve_ghosts(&sample(&physical, linear)).unwrap();
        for (g, e) in ghosts.iter().zip(sample(&s.ghosts, linear)) {
            assert!((g - e).abs() < 1e-8);
        }
    }

    #[test]
    fn robin_condition_is_exact_for_linear_fields() {
        let s = setup(11);
        let linear = |x: f64, y: f64| 0.5 - x + 2.0 * y;
        let (alpha, beta) = (2.0, 0.5);

        let values: Vec<f64> = s
            .boundary
            .iter()
            .enumerate()
            .map(|(i, &b)| {
                let u = linear(s.all[(b, 0)], s.all[(b, 1)]);
                let dudn = -s.normals[(i, 0)] + 2.0 * s.normals[(i, 1)];
                alpha * u + beta * dudn
            })
            .collect();

        let system = GhostSystem::from_condition(
            &s.dd,
            s.num_physical,
            &s.boundary,
            &BoundaryCondition::Robin { alpha, beta, values },
        )
        .unwrap();

        let physical = Mat::from_fn(s.num_physical, 2, |i, d| s.all[(i, d)]);
        let ghosts = system.solve_ghosts(&sample(&physical, linear)).unwrap();
        for (g, e) in ghosts.iter().zip(sample(&s.ghosts, linear)) {
            assert!((g - e).abs() < 1e-8);
        }
    }

    #[test]
    fn factorisation_is_cached_until_the_operator_changes() {
        let s = setup(11);
        let mut system = GhostSystem::from_condition(
            &s.dd,
            s.num_physical,
            &s.boundary,
            &BoundaryCondition::Free,
        )
        .unwrap();
        let before = system.fingerprint();

        assert!(!system.replace_operator(s.dd.clone()).unwrap());
        assert_eq!(system.fingerprint(), before);

        assert!(system.replace_operator(s.dd.scale(2.0)).unwrap());
        assert_ne!(system.fingerprint(), before);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let s = setup(11);
        let nb = s.boundary.len();

        let err = GhostSystem::new(s.dd.clone(), s.num_physical - 1, vec![0.0; nb]).unwrap_err();
        assert_eq!(err, BoundaryError::NotSquare { rows: nb, ghosts: nb + 1 });

        let err = GhostSystem::new(s.dd.clone(), s.num_physical, vec![0.0; 3]).unwrap_err();
        assert_eq!(err, BoundaryError::TargetLength { expected: nb, found: 3 });

        let err = BoundaryCondition::Robin { alpha: 1.0, beta: 0.0, values: vec![0.0; nb] }
            .operator(&s.dd, &s.boundary)
            .unwrap_err();
        assert_eq!(err, BoundaryError::DegenerateRobin);

        let system = GhostSystem::from_condition(
            &s.dd,
            s.num_physical,
            &s.boundary,
            &BoundaryCondition::Free,
        )
        .unwrap();
        let err = system.solve_ghosts(&[1.0, 2.0]).unwrap_err();
        assert_eq!(err, BoundaryError::StateLength { expected: s.num_physical, found: 2 });
    }

    #[test]
    fn degenerate_ghost_blocks_are_rejected() {
        // Two known columns, then two ghost columns. The second ghost is
        // referenced by no boundary row.
        let unreferenced =
            SparseOperator::from_triplets(2, 4, &[(0, 0, 1.0), (0, 2, 1.0), (1, 1, 1.0), (1, 2, 2.0)])
                .unwrap();
        let err = GhostSystem::new(unreferenced, 2, vec![0.0; 2]).unwrap_err();
        assert_eq!(err, BoundaryError::Linalg(LinalgError::Singular));

        // Both rows see the ghosts almost identically.
        let nearly_parallel = SparseOperator::from_triplets(
            2,
            4,
            &[(0, 0, 1.0), (0, 2, 1.0), (0, 3, 1.0), (1, 1, 1.0), (1, 2, 1.0), (1, 3, 1.0 + 1e-15)],
        )
        .unwrap();
        let err = GhostSystem::new(nearly_parallel, 2, vec![1.0, 0.0]).unwrap_err();
        assert_eq!(err, BoundaryError::Linalg(LinalgError::Singular));

        // A cached system keeps its factorisation when the swap is refused.
        let s = setup(11);
        let mut system = GhostSystem::from_condition(
            &s.dd,
            s.num_physical,
            &s.boundary,
            &BoundaryCondition::Free,
        )
        .unwrap();
        let before = system.fingerprint();
        let err = system.replace_operator(s.dd.scale(0.0)).unwrap_err();
        assert_eq!(err, BoundaryError::Linalg(LinalgError::Singular));
        assert_eq!(system.fingerprint(), before);
    }
}
