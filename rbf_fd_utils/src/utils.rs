/////////////////////////////////////////////////////////////////////////////////////////////
//
// Supplies general-purpose utilities for matrices, distances and kernel dispatch.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{KernelFromParams, KernelParams, RadialKernel};
use faer::Mat;
use serde::{Deserialize, Serialize};

/// Returns an owned `Mat<T>` from a subset of row indices.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use rbf_fd_utils::select_mat_rows;
///
/// let matrix = mat![
///     [0.0, 1.0],
///     [1.0, 1.0],
///     [2.0, 2.0],
///     [3.0, 3.0f64],
/// ];
///
/// let sub_matrix = select_mat_rows(&matrix, &[0usize, 2]);
///
/// assert_eq!(
///     sub_matrix,
///     mat![
///         [0.0, 1.0],
///         [2.0, 2.0f64],
///     ]
/// );
/// ```
#[inline(always)]
pub fn select_mat_rows<T>(existing_mat: &Mat<T>, row_indices: &[usize]) -> Mat<T>
where
    T: Clone,
{
    Mat::from_fn(row_indices.len(), existing_mat.ncols(), |i, j| {
        existing_mat.get(row_indices[i], j).clone()
    })
}

/// Computes the axis aligned bounding box (AABB) extents of a matrix of points.
///
/// The result is arranged as `[min_0, ..., min_n, max_0, ..., max_n]`
/// where `n` is the number of columns in the matrix.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use rbf_fd_utils::get_pointarray_extents;
///
/// let points = mat![
///     [1.0, 2.0],
///     [3.0, -1.0],
///     [0.5, 4.0f64]
/// ];
/// let extents = get_pointarray_extents(&points);
/// assert_eq!(extents, vec![0.5, -1.0, 3.0, 4.0]);
/// ```
#[inline(always)]
pub fn get_pointarray_extents<T>(points: &Mat<T>) -> Vec<T>
where
    T: PartialOrd + Clone,
{
    let ncols = points.ncols();

    let mut extents: Vec<T> = Vec::with_capacity(2 * ncols);
    for _ in 0..2 {
        for col in 0..ncols {
            extents.push(points.get(0, col).clone());
        }
    }

    for row in points.row_iter() {
        for (col, item) in row.iter().enumerate() {
            if item < &extents[col] {
                extents[col] = item.clone();
            }
            if item > &extents[col + ncols] {
                extents[col + ncols] = item.clone();
            }
        }
    }

    extents
}

/// `n!` as a float.
///
/// ```
/// use rbf_fd_utils::factorial;
///
/// assert_eq!(factorial(0), 1.0);
/// assert_eq!(factorial(5), 120.0);
/// ```
#[inline(always)]
pub fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

/// Builds a dense matrix of kernel derivatives using a typed kernel.
///
/// Entry `(i, j)` holds `d^orders phi` evaluated at `target_i - source_j`.
/// Passing all zero orders gives the plain kernel matrix.
#[inline(always)]
pub fn get_a_matrix_typed<K>(
    target_points: &Mat<f64>,
    source_points: &Mat<f64>,
    orders: &[usize],
    kernel: &K,
) -> Mat<f64>
where
    K: RadialKernel,
{
    let m = target_points.nrows();
    let n = source_points.nrows();
    let dim = target_points.ncols();
    assert_eq!(dim, source_points.ncols());
    assert_eq!(dim, orders.len());

    let mut a_matrix = Mat::<f64>::zeros(m, n);
    let mut displacement = vec![0.0; dim];

    for j in 0..n {
        for i in 0..m {
            for d in 0..dim {
                displacement[d] = target_points[(i, d)] - source_points[(j, d)];
            }
            a_matrix[(i, j)] = kernel.diff(&displacement, orders);
        }
    }

    a_matrix
}

// K-free dispatcher generated from the kernel registry below.
// Assumes each kernel type implements `KernelFromParams` and `RadialKernel`.
macro_rules! for_each_kernel {
    ( registry = [ $( ($V:ident, $Kty:path) ),* $(,)? ] ) => {

        /// Runtime kernel selector built from the kernel registry
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum KernelType {
            $( $V, )*
        }

        /// Builds a dense matrix of kernel derivatives for the selected [`KernelType`].
        #[inline(always)]
        pub fn get_a_matrix(
            target_points: &Mat<f64>,
            source_points: &Mat<f64>,
            orders: &[usize],
            params: &KernelParams,
        ) -> Mat<f64> {
            match params.kernel_type {
                $(
                    KernelType::$V => {
                        let k = <$Kty as KernelFromParams>::from_params(params);
                        get_a_matrix_typed(target_points, source_points, orders, &k)
                    }
                ),*
            }
        }

        /// Evaluates the mixed partial derivative `d^orders phi` at `displacement`.
        #[inline(always)]
        pub fn kernel_diff(
            displacement: &[f64],
            orders: &[usize],
            params: &KernelParams,
        ) -> f64 {
            match params.kernel_type {
                $(
                    KernelType::$V => {
                        let k = <$Kty as KernelFromParams>::from_params(params);
                        k.diff(displacement, orders)
                    }
                ),*
            }
        }

        /// Highest total derivative order the selected kernel supports, if limited.
        #[inline(always)]
        pub fn kernel_max_derivative_order(params: &KernelParams) -> Option<usize> {
            match params.kernel_type {
                $(
                    KernelType::$V => {
                        let k = <$Kty as KernelFromParams>::from_params(params);
                        k.max_derivative_order()
                    }
                ),*
            }
        }
    };
}

for_each_kernel! {
    registry = [
        (Phs3,     crate::kernels::Phs3RbfKernel),
        (Phs5,     crate::kernels::Phs5RbfKernel),
        (Phs7,     crate::kernels::Phs7RbfKernel),
        (Gaussian, crate::kernels::GaussianRbfKernel),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn kernel_matrix_is_symmetric_for_zero_orders() {
        let points = mat![[0.0, 0.0], [1.0, 0.5], [-0.3, 2.0f64]];
        let params = KernelParams::builder(KernelType::Phs5).build();
        let a = get_a_matrix(&points, &points, &[0, 0], &params);

        for i in 0..3 {
            assert_eq!(a[(i, i)], 0.0);
            for j in 0..3 {
                assert_eq!(a[(i, j)], a[(j, i)]);
            }
        }
        let r = (1.0f64 + 0.25).sqrt();
        assert!((a[(0, 1)] - r.powi(5)).abs() < 1e-12);
    }

    #[test]
    fn first_derivative_matrix_is_antisymmetric() {
        let points = mat![[0.0, 0.0], [1.0, 0.5], [-0.3, 2.0f64]];
        let params = KernelParams::builder(KernelType::Gaussian).shape(0.7).build();
        let a = get_a_matrix(&points, &points, &[1, 0], &params);

        for i in 0..3 {
            for j in 0..3 {
                assert!((a[(i, j)] + a[(j, i)]).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn derivative_limits_follow_kernel_power() {
        let phs3 = KernelParams::builder(KernelType::Phs3).build();
        let phs7 = KernelParams::builder(KernelType::Phs7).build();
        let gauss = KernelParams::builder(KernelType::Gaussian).build();
        assert_eq!(kernel_max_derivative_order(&phs3), Some(2));
        assert_eq!(kernel_max_derivative_order(&phs7), Some(6));
        assert_eq!(kernel_max_derivative_order(&gauss), None);
        assert_eq!(get_a_matrix(&mat![[2.0, 0.0f64]], &mat![[0.0, 0.0f64]], &[0, 0], &phs3)[(0, 0)], 8.0);
    }
}
