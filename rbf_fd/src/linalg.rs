/////////////////////////////////////////////////////////////////////////////////////////////
//
// Adds sparse operator storage, sparse LU and Cholesky factorisations and checked dense solves.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # linalg
//!
//! Helper linear algebra functionality.
//!
//! Differentiation matrices are stored as faer row-major sparse matrices,
//! which makes the matrix-vector products of the time stepper a single pass
//! over the stored entries. Square systems are handed to faer's sparse LU,
//! symmetric positive definite ones to its sparse Cholesky, and the
//! factorisation is kept for repeated solves.
//!
//! Every solve is guarded by a condition number estimate. Inverse iteration
//! on the factorisation gives a lower bound on `||A^-1||_2`, and the largest
//! stored magnitude is a lower bound on `||A||_2`, so the product never
//! overestimates `cond_2(A)`. Systems whose estimate exceeds
//! [`MAX_CONDITION`] are reported as [`LinalgError::Singular`].

use faer::{
    Accum, Mat, MatMut, MatRef, Par, Side,
    linalg::solvers::Solve,
    sparse::{
        CreationError, SparseRowMat, SparseRowMatRef, Triplet,
        linalg::{
            LltError, LuError,
            matmul::{dense_sparse_matmul, sparse_sparse_matmul},
            solvers::{Llt, Lu},
        },
    },
};
use std::{error::Error, fmt};

/// Largest accepted estimate of the 2-norm condition number.
pub const MAX_CONDITION: f64 = 1e13;

/// Inverse iteration steps used by the condition estimate.
const CONDITION_ITERATIONS: usize = 3;

/// Failures of the sparse and dense solvers.
#[derive(Debug, Clone, PartialEq)]
pub enum LinalgError {
    /// A factorisation was requested for a non-square matrix.
    NotSquare { rows: usize, cols: usize },
    /// An operand does not have the expected length.
    ShapeMismatch { expected: usize, found: usize },
    /// The underlying factorisation routine reported a failure.
    Factorization { reason: String },
    /// A Cholesky factorisation met a non-positive pivot.
    NotPositiveDefinite,
    /// The system is singular or too ill-conditioned to solve.
    Singular,
}

impl fmt::Display for LinalgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinalgError::NotSquare { rows, cols } => {
                write!(f, "expected a square matrix, found {rows} x {cols}")
            }
            LinalgError::ShapeMismatch { expected, found } => {
                write!(f, "expected length {expected}, found {found}")
            }
            LinalgError::Factorization { reason } => write!(f, "factorisation failed: {reason}"),
            LinalgError::NotPositiveDefinite => f.write_str("matrix is not positive definite"),
            LinalgError::Singular => f.write_str("matrix is singular or ill-conditioned"),
        }
    }
}

impl Error for LinalgError {}

fn faer_failure(e: impl fmt::Debug) -> LinalgError {
    LinalgError::Factorization {
        reason: format!("{e:?}"),
    }
}

impl From<LuError> for LinalgError {
    fn from(e: LuError) -> Self {
        match e {
            LuError::SymbolicSingular { .. } => LinalgError::Singular,
            LuError::Generic(e) => faer_failure(e),
        }
    }
}

impl From<LltError> for LinalgError {
    fn from(e: LltError) -> Self {
        match e {
            LltError::Numeric(_) => LinalgError::NotPositiveDefinite,
            LltError::Generic(e) => faer_failure(e),
        }
    }
}

/// Immutable sparse matrix, a thin wrapper over faer's row-major storage.
///
/// Column indices are sorted within each row and duplicates are merged.
#[derive(Debug, Clone)]
pub struct SparseOperator {
    mat: SparseRowMat<usize, f64>,
}

impl SparseOperator {
    /// Assembles a matrix from `(row, col, value)` entries, summing duplicates.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, LinalgError> {
        let entries: Vec<Triplet<usize, usize, f64>> = triplets
            .iter()
            .map(|&(i, j, v)| Triplet::new(i, j, v))
            .collect();
        let mat = SparseRowMat::<usize, f64>::try_new_from_triplets(nrows, ncols, &entries)
            .map_err(|e| match e {
                CreationError::OutOfBounds { row, .. } if row >= nrows => {
                    LinalgError::ShapeMismatch {
                        expected: nrows,
                        found: row + 1,
                    }
                }
                CreationError::OutOfBounds { col, .. } => LinalgError::ShapeMismatch {
                    expected: ncols,
                    found: col + 1,
                },
                CreationError::Generic(e) => faer_failure(e),
            })?;
        Ok(Self { mat })
    }

    /// Square diagonal matrix.
    pub fn from_diagonal(diagonal: &[f64]) -> Result<Self, LinalgError> {
        let n = diagonal.len();
        let triplets: Vec<(usize, usize, f64)> =
            diagonal.iter().enumerate().map(|(i, &d)| (i, i, d)).collect();
        Self::from_triplets(n, n, &triplets)
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.mat.symbolic().nrows()
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.mat.symbolic().ncols()
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.mat.symbolic().compute_nnz()
    }

    /// Column indices and values of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        (
            self.mat.symbolic().col_idx_of_row_raw(i),
            self.mat.val_of_row(i),
        )
    }

    /// Borrowed faer view of the storage.
    pub fn as_faer(&self) -> SparseRowMatRef<'_, usize, f64> {
        self.mat.as_ref()
    }

    /// `y = A x`.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.nrows()];
        self.apply_into(x, &mut y);
        y
    }

    /// `y = A x`, writing into an existing buffer.
    pub fn apply_into(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.ncols(), "operand length does not match columns");
        assert_eq!(y.len(), self.nrows(), "output length does not match rows");

        // As row vectors, y^T = x^T A^T, and A^T in column-major form shares
        // the row-major storage of A.
        dense_sparse_matmul(
            MatMut::from_row_major_slice_mut(y, 1, self.nrows()),
            Accum::Replace,
            MatRef::from_row_major_slice(x, 1, self.ncols()),
            self.mat.as_ref().transpose(),
            1.0,
            Par::Seq,
        );
    }

    /// Splits the columns into `[0, at)` and `[at, ncols)`.
    pub fn split_columns(&self, at: usize) -> Result<(SparseOperator, SparseOperator), LinalgError> {
        assert!(at <= self.ncols());
        let (left, right): (Vec<_>, Vec<_>) = self.to_triplets().into_iter().partition(|t| t.1 < at);
        let right: Vec<_> = right.into_iter().map(|(i, j, v)| (i, j - at, v)).collect();
        Ok((
            Self::from_triplets(self.nrows(), at, &left)?,
            Self::from_triplets(self.nrows(), self.ncols() - at, &right)?,
        ))
    }

    /// `A^T A`.
    pub fn gram(&self) -> Result<SparseOperator, LinalgError> {
        let col_major = self.mat.to_col_major().map_err(faer_failure)?;
        let product = sparse_sparse_matmul(
            self.mat.as_ref().transpose(),
            col_major.as_ref(),
            1.0,
            Par::Seq,
        )
        .map_err(faer_failure)?;
        Ok(Self {
            mat: product.to_row_major().map_err(faer_failure)?,
        })
    }

    /// `alpha * A`.
    pub fn scale(&self, alpha: f64) -> SparseOperator {
        let mut mat = self.mat.clone();
        mat.val_mut().iter_mut().for_each(|v| *v *= alpha);
        Self { mat }
    }

    /// `A + diag(diagonal)`; the matrix must be square.
    pub fn add_diagonal(&self, diagonal: &[f64]) -> Result<SparseOperator, LinalgError> {
        if self.nrows() != self.ncols() {
            return Err(LinalgError::NotSquare {
                rows: self.nrows(),
                cols: self.ncols(),
            });
        }
        if diagonal.len() != self.nrows() {
            return Err(LinalgError::ShapeMismatch {
                expected: self.nrows(),
                found: diagonal.len(),
            });
        }
        let mut triplets = self.to_triplets();
        triplets.extend(diagonal.iter().enumerate().map(|(i, &d)| (i, i, d)));
        Self::from_triplets(self.nrows(), self.ncols(), &triplets)
    }

    /// Stored entries as `(row, col, value)`, in row-major order.
    pub fn to_triplets(&self) -> Vec<(usize, usize, f64)> {
        let mut out = Vec::with_capacity(self.nnz());
        for i in 0..self.nrows() {
            let (cols, vals) = self.row(i);
            out.extend(cols.iter().zip(vals).map(|(&j, &v)| (i, j, v)));
        }
        out
    }

    /// Dense copy, for inspection and tests.
    pub fn to_dense(&self) -> Mat<f64> {
        self.mat.to_dense()
    }

    /// Largest stored magnitude.
    pub fn max_abs(&self) -> f64 {
        self.mat.val().iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }

    /// Cheap structural fingerprint: shape, sparsity pattern and values.
    pub fn fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.nrows().hash(&mut hasher);
        self.ncols().hash(&mut hasher);
        for i in 0..self.nrows() {
            let (cols, vals) = self.row(i);
            cols.len().hash(&mut hasher);
            cols.hash(&mut hasher);
            for v in vals {
                v.to_bits().hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

impl PartialEq for SparseOperator {
    fn eq(&self, other: &Self) -> bool {
        self.nrows() == other.nrows()
            && self.ncols() == other.ncols()
            && (0..self.nrows()).all(|i| self.row(i) == other.row(i))
    }
}

fn check_square(a: &SparseOperator) -> Result<(), LinalgError> {
    if a.nrows() != a.ncols() {
        return Err(LinalgError::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }
    Ok(())
}

/// Lower bound on `cond_2(A)` from inverse iteration.
///
/// `solve_in_place` overwrites its argument with `A^-1` times it, and
/// `max_abs` is the largest entry magnitude of `A`.
fn condition_estimate(n: usize, max_abs: f64, solve_in_place: impl Fn(&mut Mat<f64>)) -> f64 {
    if n == 0 {
        return 1.0;
    }
    // Uneven start so the vector is not orthogonal to a structured null space.
    let mut x = Mat::from_fn(n, 1, |i, _| 1.0 + i as f64 / n as f64);
    let mut growth = 0.0f64;
    for _ in 0..CONDITION_ITERATIONS {
        let before = x.as_ref().norm_l2();
        solve_in_place(&mut x);
        let after = x.as_ref().norm_l2();
        if !after.is_finite() || after == 0.0 {
            return f64::INFINITY;
        }
        growth = growth.max(after / before);
        for i in 0..n {
            x[(i, 0)] /= after;
        }
    }
    max_abs * growth
}

fn check_conditioning(estimate: f64) -> Result<(), LinalgError> {
    if estimate.is_finite() && estimate <= MAX_CONDITION {
        Ok(())
    } else {
        Err(LinalgError::Singular)
    }
}

fn solve_vector(
    n: usize,
    b: &[f64],
    solve_in_place: impl Fn(&mut Mat<f64>),
) -> Result<Vec<f64>, LinalgError> {
    if b.len() != n {
        return Err(LinalgError::ShapeMismatch {
            expected: n,
            found: b.len(),
        });
    }
    let mut x = Mat::from_fn(n, 1, |i, _| b[i]);
    solve_in_place(&mut x);
    let out: Vec<f64> = x.col(0).iter().copied().collect();
    if out.iter().all(|v| v.is_finite()) {
        Ok(out)
    } else {
        Err(LinalgError::Singular)
    }
}

/// Sparse LU factorisation of a square [`SparseOperator`], reusable across solves.
pub struct SparseLu {
    lu: Lu<usize, f64>,
    n: usize,
    condition: f64,
}

impl fmt::Debug for SparseLu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseLu")
            .field("n", &self.n)
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}

impl SparseLu {
    /// Factorises `a`, failing with [`LinalgError::Singular`] when `a` is
    /// singular or its condition estimate exceeds [`MAX_CONDITION`].
    pub fn factor(a: &SparseOperator) -> Result<Self, LinalgError> {
        check_square(a)?;
        let lu = a.as_faer().sp_lu()?;
        let n = a.nrows();
        let condition = condition_estimate(n, a.max_abs(), |x| lu.solve_in_place(x.as_mut()));
        check_conditioning(condition)?;
        Ok(Self { lu, n, condition })
    }

    /// Order of the factorised matrix.
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Lower bound on the 2-norm condition number found at factorisation.
    pub fn condition_estimate(&self) -> f64 {
        self.condition
    }

    /// Solves `A x = b`.
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
        solve_vector(self.n, b, |x| self.lu.solve_in_place(x.as_mut()))
    }
}

/// Sparse Cholesky factorisation of a symmetric positive definite
/// [`SparseOperator`]. Only the lower triangle is read.
pub struct SparseCholesky {
    llt: Llt<usize, f64>,
    n: usize,
    condition: f64,
}

impl fmt::Debug for SparseCholesky {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseCholesky")
            .field("n", &self.n)
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}

impl SparseCholesky {
    /// Factorises `a`. Fails with [`LinalgError::NotPositiveDefinite`] on a
    /// non-positive pivot and with [`LinalgError::Singular`] when the
    /// condition estimate exceeds [`MAX_CONDITION`].
    pub fn factor(a: &SparseOperator) -> Result<Self, LinalgError> {
        check_square(a)?;
        let llt = a.as_faer().sp_cholesky(Side::Lower)?;
        let n = a.nrows();
        let condition = condition_estimate(n, a.max_abs(), |x| llt.solve_in_place(x.as_mut()));
        check_conditioning(condition)?;
        Ok(Self { llt, n, condition })
    }

    /// Order of the factorised matrix.
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Lower bound on the 2-norm condition number found at factorisation.
    pub fn condition_estimate(&self) -> f64 {
        self.condition
    }

    /// Solves `A x = b`.
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
        solve_vector(self.n, b, |x| self.llt.solve_in_place(x.as_mut()))
    }
}

/// Solves the dense system `a x = b` with partially pivoted LU.
///
/// Fails with [`LinalgError::Singular`] when `a` is singular or its
/// condition estimate exceeds [`MAX_CONDITION`].
pub fn solve_dense(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, LinalgError> {
    if a.nrows() != a.ncols() {
        return Err(LinalgError::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }
    if b.nrows() != a.nrows() {
        return Err(LinalgError::ShapeMismatch {
            expected: a.nrows(),
            found: b.nrows(),
        });
    }

    let lu = a.partial_piv_lu();
    let condition = condition_estimate(a.nrows(), a.as_ref().norm_max(), |x| {
        lu.solve_in_place(x.as_mut())
    });
    check_conditioning(condition)?;

    let x = lu.solve(b);
    let finite = (0..x.ncols()).all(|j| x.col(j).iter().all(|v| v.is_finite()));
    if !finite {
        return Err(LinalgError::Singular);
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use equator::assert;
    use faer::{mat, utils::approx::*};

    fn example() -> SparseOperator {
        // [[1, 0, 2],
        //  [0, 3, 0]]
        SparseOperator::from_triplets(2, 3, &[(0, 2, 1.5), (1, 1, 3.0), (0, 0, 1.0), (0, 2, 0.5)])
            .unwrap()
    }

    fn tridiagonal(n: usize) -> SparseOperator {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 4.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        SparseOperator::from_triplets(n, n, &triplets).unwrap()
    }

    fn nearly_singular() -> SparseOperator {
        SparseOperator::from_triplets(2, 2, &[(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 1.0 + 1e-15)])
            .unwrap()
    }

    #[test]
    fn triplets_are_sorted_and_merged() {
        let a = example();
        assert_eq!(a.nnz(), 3);
        assert_eq!(a.row(0), (&[0usize, 2][..], &[1.0, 2.0][..]));
        assert_eq!(a.apply(&[1.0, 1.0, 1.0]), vec![3.0, 3.0]);
        assert_eq!(a.to_dense(), mat![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0f64]]);
    }

    #[test]
    fn out_of_range_entries_are_rejected() {
        let err = SparseOperator::from_triplets(2, 2, &[(0, 5, 1.0)]).unwrap_err();
        assert_eq!(err, LinalgError::ShapeMismatch { expected: 2, found: 6 });
        let err = SparseOperator::from_triplets(2, 2, &[(3, 0, 1.0)]).unwrap_err();
        assert_eq!(err, LinalgError::ShapeMismatch { expected: 2, found: 4 });
    }

    #[test]
    fn split_columns_partitions_entries() {
        let a = example();
        let (left, right) = a.split_columns(2).unwrap();
        assert_eq!(left.ncols(), 2);
        assert_eq!(right.ncols(), 1);
        assert_eq!(left.apply(&[1.0, 1.0]), vec![1.0, 3.0]);
        assert_eq!(right.apply(&[1.0]), vec![2.0, 0.0]);
    }

    #[test]
    fn gram_matches_dense_product() {
        let a = SparseOperator::from_triplets(
            3,
            3,
            &[(0, 0, 2.0), (0, 1, -1.0), (1, 1, 4.0), (2, 0, 1.0), (2, 2, 3.0)],
        )
        .unwrap();
        let dense = a.to_dense();
        let expected = dense.transpose() * dense.as_ref();

        let approx_eq = CwiseMat(ApproxEq::eps() * 128.0 * 3.0);
        assert!(&a.gram().unwrap().to_dense() ~ &expected);
    }

    #[test]
    fn sparse_lu_solves_tridiagonal_system() {
        let a = tridiagonal(20);
        let x_true: Vec<f64> = (0..20).map(|i| (i as f64).sin()).collect();
        let b = a.apply(&x_true);

        let lu = SparseLu::factor(&a).unwrap();
        let x = lu.solve(&b).unwrap();
        for (xi, ti) in x.iter().zip(&x_true) {
            assert!((xi - ti).abs() < 1e-12);
        }
        // Eigenvalues lie in (2, 6), so 4 * ||A^-1|| stays below 2.
        assert!(lu.condition_estimate() > 0.5);
        assert!(lu.condition_estimate() < 2.1);
    }

    #[test]
    fn sparse_cholesky_solves_normal_equations() {
        let a = SparseOperator::from_triplets(
            4,
            3,
            &[(0, 0, 1.0), (1, 0, 1.0), (1, 1, -2.0), (2, 1, 1.0), (2, 2, 0.5), (3, 2, 2.0)],
        )
        .unwrap();
        let normal = a.gram().unwrap().add_diagonal(&[1.0, 1.0, 1.0]).unwrap();
        let x_true = [0.5, -1.0, 2.0];
        let b = normal.apply(&x_true);

        let llt = SparseCholesky::factor(&normal).unwrap();
        let x = llt.solve(&b).unwrap();
        for (xi, ti) in x.iter().zip(&x_true) {
            assert!((xi - ti).abs() < 1e-12);
        }
        assert_eq!(llt.dim(), 3);
    }

    #[test]
    fn sparse_cholesky_rejects_indefinite_matrices() {
        let a = SparseOperator::from_diagonal(&[1.0, -1.0]).unwrap();
        assert_eq!(SparseCholesky::factor(&a).unwrap_err(), LinalgError::NotPositiveDefinite);
    }

    #[test]
    fn sparse_solvers_reject_rectangular_matrices() {
        let err = SparseLu::factor(&example()).unwrap_err();
        assert_eq!(err, LinalgError::NotSquare { rows: 2, cols: 3 });
        let err = SparseCholesky::factor(&example()).unwrap_err();
        assert_eq!(err, LinalgError::NotSquare { rows: 2, cols: 3 });
    }

    #[test]
    fn sparse_lu_rejects_empty_columns() {
        let a = SparseOperator::from_triplets(2, 2, &[(0, 0, 1.0), (1, 0, 2.0)]).unwrap();
        assert_eq!(SparseLu::factor(&a).unwrap_err(), LinalgError::Singular);
    }

    #[test]
    fn ill_conditioned_systems_are_rejected() {
        // Exact arithmetic would give x = [1e15, -1e15].
        let a = nearly_singular();
        assert_eq!(SparseLu::factor(&a).unwrap_err(), LinalgError::Singular);

        let dense = a.to_dense();
        let b = mat![[1.0], [0.0f64]];
        assert_eq!(solve_dense(&dense, &b).unwrap_err(), LinalgError::Singular);
    }

    #[test]
    fn add_diagonal_and_scale() {
        let a = SparseOperator::from_diagonal(&[1.0, 2.0]).unwrap().scale(2.0);
        let b = a.add_diagonal(&[1.0, 1.0]).unwrap();
        assert_eq!(b.apply(&[1.0, 1.0]), vec![3.0, 5.0]);
        assert_eq!(b.max_abs(), 5.0);
    }

    #[test]
    fn dense_solve_detects_singular_systems() {
        let a = mat![[1.0, 2.0], [3.0, 4.0f64]];
        let b = mat![[5.0], [6.0f64]];
        let x = solve_dense(&a, &b).unwrap();
        let approx_eq = CwiseMat(ApproxEq::eps() * 128.0 * 2.0);
        assert!(&x ~ &mat![[-4.0], [4.5f64]]);

        let singular = Mat::<f64>::zeros(2, 2);
        assert_eq!(solve_dense(&singular, &b).unwrap_err(), LinalgError::Singular);
    }

    #[test]
    fn fingerprint_tracks_values() {
        let a = example();
        assert_eq!(a.fingerprint(), example().fingerprint());
        assert_eq!(a, example());
        assert_ne!(a.fingerprint(), a.scale(2.0).fingerprint());
        assert_ne!(a, a.scale(2.0));
    }
}
