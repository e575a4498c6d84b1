/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds RBF-FD differentiation weights and assembles them into sparse operators.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # RBF-FD weights
//!
//! For each target point the `n` nearest source nodes form a stencil. The
//! weights `w` that approximate a linear differential operator `L` at the
//! target solve the local saddle point system
//!
//! ```text
//! [ Phi  P ] [ w ]   [ L Phi ]
//! [ P^T  0 ] [ v ] = [ L P   ]
//! ```
//!
//! where `Phi` is the kernel matrix of the stencil and `P` the monomial
//! basis. The system is formed in coordinates shifted to the target and
//! divided by the stencil radius, which keeps it well scaled whatever the
//! node spacing; the right-hand side of each term of `L` is rescaled by
//! `radius^-|alpha|` to undo the change of variables.
//!
//! # References
//! 1. B. Fornberg and N. Flyer. A Primer on Radial Basis Functions with
//!    Applications to the Geosciences. SIAM, 2015.
//! 2. V. Bayona, N. Flyer, B. Fornberg and G. A. Barnett. On the role of
//!    polynomials in RBF-FD approximations: II. J. Comput. Phys. 332, 2017.

use crate::{
    config::StencilParams,
    kdtree::KDTree,
    linalg::{self, LinalgError, SparseOperator},
    polynomials,
};
use faer::Mat;
use rayon::prelude::*;
use rbf_fd_utils::{get_a_matrix, kernel_diff, kernel_max_derivative_order};
use std::{error::Error, fmt};

/// Failures while building differentiation weights.
#[derive(Debug, Clone, PartialEq)]
pub enum StencilError {
    /// Points or derivative orders do not share the operator's dimension.
    DimensionMismatch { expected: usize, found: usize },
    /// Not enough source nodes for the stencil size or polynomial basis.
    TooFewSources { required: usize, available: usize },
    /// The kernel is not smooth enough for the requested derivative.
    UnsupportedDerivativeOrder { order: usize, max: usize },
    /// Per-target coefficients do not match the number of targets.
    CoefficientLength { expected: usize, found: usize },
    /// The local system of this target could not be solved.
    SingularStencil { target_index: usize },
    /// Assembly of the sparse operator failed.
    Linalg(LinalgError),
}

impl fmt::Display for StencilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StencilError::DimensionMismatch { expected, found } => {
                write!(f, "expected {expected}-dimensional input, found {found}")
            }
            StencilError::TooFewSources {
                required,
                available,
            } => write!(
                f,
                "stencil needs {required} source nodes but only {available} are available"
            ),
            StencilError::UnsupportedDerivativeOrder { order, max } => write!(
                f,
                "derivative order {order} exceeds the kernel limit of {max}"
            ),
            StencilError::CoefficientLength { expected, found } => {
                write!(f, "expected {expected} coefficients, found {found}")
            }
            StencilError::SingularStencil { target_index } => {
                write!(f, "singular stencil system at target {target_index}")
            }
            StencilError::Linalg(e) => write!(f, "operator assembly failed: {e}"),
        }
    }
}

impl Error for StencilError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StencilError::Linalg(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LinalgError> for StencilError {
    fn from(e: LinalgError) -> Self {
        StencilError::Linalg(e)
    }
}

/// Coefficient multiplying one derivative term.
#[derive(Debug, Clone, PartialEq)]
pub enum Coefficient {
    /// Same value at every target.
    Constant(f64),
    /// One value per target point.
    PerTarget(Vec<f64>),
}

/// A single term `c * d^orders`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffTerm {
    pub coefficient: Coefficient,
    pub orders: Vec<usize>,
}

/// Linear differential operator `sum_t c_t d^{alpha_t}`.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialOperator {
    dim: usize,
    terms: Vec<DiffTerm>,
}

impl DifferentialOperator {
    /// Builds an operator from explicit terms.
    pub fn from_terms(dim: usize, terms: Vec<DiffTerm>) -> Result<Self, StencilError> {
        for term in &terms {
            if term.orders.len() != dim {
                return Err(StencilError::DimensionMismatch {
                    expected: dim,
                    found: term.orders.len(),
                });
            }
        }
        Ok(Self { dim, terms })
    }

    /// Single derivative `d^orders` with unit coefficient.
    pub fn derivative(orders: &[usize]) -> Self {
        Self {
            dim: orders.len(),
            terms: vec![DiffTerm {
                coefficient: Coefficient::Constant(1.0),
                orders: orders.to_vec(),
            }],
        }
    }

    /// `sum_d d^order / dx_d^order`.
    pub fn pure(dim: usize, order: usize) -> Self {
        let terms = (0..dim)
            .map(|d| {
                let mut orders = vec![0; dim];
                orders[d] = order;
                DiffTerm {
                    coefficient: Coefficient::Constant(1.0),
                    orders,
                }
            })
            .collect();
        Self { dim, terms }
    }

    /// The Laplacian.
    pub fn laplacian(dim: usize) -> Self {
        Self::pure(dim, 2)
    }

    /// Directional first derivative, one direction per target (row of
    /// `directions`). With outward unit normals this is `du/dn`.
    pub fn directional(directions: &Mat<f64>) -> Self {
        let dim = directions.ncols();
        let terms = (0..dim)
            .map(|d| {
                let mut orders = vec![0; dim];
                orders[d] = 1;
                DiffTerm {
                    coefficient: Coefficient::PerTarget(directions.col(d).iter().copied().collect()),
                    orders,
                }
            })
            .collect();
        Self { dim, terms }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn terms(&self) -> &[DiffTerm] {
        &self.terms
    }

    /// Highest total derivative order over the terms.
    pub fn max_order(&self) -> usize {
        self.terms
            .iter()
            .map(|t| t.orders.iter().sum::<usize>())
            .max()
            .unwrap_or(0)
    }

    /// Checks per-target coefficients against the number of targets.
    pub fn check_targets(&self, num_targets: usize) -> Result<(), StencilError> {
        for term in &self.terms {
            if let Coefficient::PerTarget(values) = &term.coefficient {
                if values.len() != num_targets {
                    return Err(StencilError::CoefficientLength {
                        expected: num_targets,
                        found: values.len(),
                    });
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn coefficient(&self, term: &DiffTerm, target_index: usize) -> f64 {
        match &term.coefficient {
            Coefficient::Constant(c) => *c,
            Coefficient::PerTarget(values) => values[target_index],
        }
    }
}

/// RBF-FD weights approximating `op` at one target from a stencil of nodes.
///
/// `target_index` selects the per-target coefficients of `op` and labels
/// errors. Returns one weight per row of `stencil`.
pub fn weights(
    target: &[f64],
    stencil: &Mat<f64>,
    op: &DifferentialOperator,
    target_index: usize,
    params: &StencilParams,
) -> Result<Vec<f64>, StencilError> {
    let dim = op.dim();
    if target.len() != dim || stencil.ncols() != dim {
        return Err(StencilError::DimensionMismatch {
            expected: dim,
            found: if target.len() != dim {
                target.len()
            } else {
                stencil.ncols()
            },
        });
    }

    let max_order = op.max_order();
    if let Some(max) = kernel_max_derivative_order(&params.kernel) {
        if max_order > max {
            return Err(StencilError::UnsupportedDerivativeOrder {
                order: max_order,
                max,
            });
        }
    }

    let powers = polynomials::monomial_powers(params.resolved_degree(max_order), dim);
    let n = stencil.nrows();
    let m = powers.len();
    if n < m {
        return Err(StencilError::TooFewSources {
            required: m,
            available: n,
        });
    }

    // Shift to the target and scale by the stencil radius.
    let mut radius = 0.0f64;
    for i in 0..n {
        let r: f64 = (0..dim)
            .map(|d| (stencil[(i, d)] - target[d]).powi(2))
            .sum::<f64>()
            .sqrt();
        radius = radius.max(r);
    }
    if radius == 0.0 {
        radius = 1.0;
    }
    let local = Mat::from_fn(n, dim, |i, d| (stencil[(i, d)] - target[d]) / radius);

    let phi = get_a_matrix(&local, &local, &vec![0; dim], &params.kernel);
    let poly = polynomials::evaluate_monomials(&local, &powers);

    let mut lhs = Mat::<f64>::zeros(n + m, n + m);
    lhs.submatrix_mut(0, 0, n, n).copy_from(&phi);
    lhs.submatrix_mut(0, n, n, m).copy_from(&poly);
    lhs.submatrix_mut(n, 0, m, n).copy_from(poly.transpose());

    let mut rhs = Mat::<f64>::zeros(n + m, 1);
    let mut displacement = vec![0.0; dim];
    for term in op.terms() {
        let order: usize = term.orders.iter().sum();
        let c = op.coefficient(term, target_index) * radius.powi(-(order as i32));
        if c == 0.0 {
            continue;
        }
        for i in 0..n {
            for d in 0..dim {
                displacement[d] = -local[(i, d)];
            }
            rhs[(i, 0)] += c * kernel_diff(&displacement, &term.orders, &params.kernel);
        }
        for (j, v) in polynomials::monomial_diff_at_origin(&powers, &term.orders)
            .into_iter()
            .enumerate()
        {
            rhs[(n + j, 0)] += c * v;
        }
    }

    let solution = linalg::solve_dense(&lhs, &rhs)
        .map_err(|_| StencilError::SingularStencil { target_index })?;

    Ok((0..n).map(|i| solution[(i, 0)]).collect())
}

/// Sparse matrix of RBF-FD weights: row `i` approximates `op` at
/// `targets[i]` from its `params.n` nearest `sources`.
///
/// # Examples
///
/// ```
/// use rbf_fd::{fd::{weight_matrix, DifferentialOperator}, config::StencilParams};
/// use rbf_fd::generate_random_points;
///
/// let nodes = generate_random_points(200, 2, Some(3));
/// let d2 = weight_matrix(
///     &nodes,
///     &nodes,
///     &DifferentialOperator::laplacian(2),
///     &StencilParams::builder(20).build(),
/// )
/// .unwrap();
///
/// // The Laplacian of x^2 + y^2 is 4 everywhere.
/// let u: Vec<f64> = (0..200)
///     .map(|i| nodes[(i, 0)].powi(2) + nodes[(i, 1)].powi(2))
///     .collect();
/// assert!(d2.apply(&u).iter().all(|v| (v - 4.0).abs() < 1e-6));
/// ```
pub fn weight_matrix(
    targets: &Mat<f64>,
    sources: &Mat<f64>,
    op: &DifferentialOperator,
    params: &StencilParams,
) -> Result<SparseOperator, StencilError> {
    let dim = op.dim();
    for found in [targets.ncols(), sources.ncols()] {
        if found != dim {
            return Err(StencilError::DimensionMismatch {
                expected: dim,
                found,
            });
        }
    }
    if params.n > sources.nrows() {
        return Err(StencilError::TooFewSources {
            required: params.n,
            available: sources.nrows(),
        });
    }
    op.check_targets(targets.nrows())?;

    let tree = KDTree::new(sources);
    let (ids, _) = tree.k_nearest_neighbors_batch(targets, params.n);

    let rows: Vec<Vec<(usize, usize, f64)>> = (0..targets.nrows())
        .into_par_iter()
        .map(|i| {
            let stencil_ids: Vec<usize> = (0..params.n).map(|j| *ids.get(i, j)).collect();
            let stencil = rbf_fd_utils::select_mat_rows(sources, &stencil_ids);
            let target: Vec<f64> = targets.row(i).iter().copied().collect();
            let w = weights(&target, &stencil, op, i, params)?;
            Ok(stencil_ids
                .into_iter()
                .zip(w)
                .map(|(j, wj)| (i, j, wj))
                .collect())
        })
        .collect::<Result<_, StencilError>>()?;

    let triplets: Vec<(usize, usize, f64)> = rows.into_iter().flatten().collect();
    Ok(SparseOperator::from_triplets(
        targets.nrows(),
        sources.nrows(),
        &triplets,
    )?)
}
