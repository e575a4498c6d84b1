/////////////////////////////////////////////////////////////////////////////////////////////
//
// Evaluates monomial bases and their derivatives for polynomial-augmented RBF-FD stencils.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Monomial bases `x^p = prod_i x_i^(p_i)`.
//!
//! A basis is described by its list of exponent multi-indices (`powers`),
//! ordered by total degree, so degree 2 in two dimensions is
//! `[1, x, y, x^2, xy, y^2]`.

use faer::Mat;
use itertools::Itertools;
use rbf_fd_utils::factorial;

/// Number of monomials of total degree `<= degree` in `dim` dimensions.
pub fn basis_size(degree: usize, dim: usize) -> usize {
    // binomial(degree + dim, dim)
    (1..=dim).fold(1usize, |acc, i| acc * (degree + i) / i)
}

/// Exponent multi-indices of every monomial with total degree `<= degree`.
///
/// ```
/// use rbf_fd::polynomials::monomial_powers;
///
/// let powers = monomial_powers(2, 2);
/// assert_eq!(
///     powers,
///     vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![2, 0], vec![1, 1], vec![0, 2]]
/// );
/// ```
pub fn monomial_powers(degree: usize, dim: usize) -> Vec<Vec<usize>> {
    assert!(dim > 0, "monomials need at least one dimension");

    (0..dim)
        .map(|_| 0..=degree)
        .multi_cartesian_product()
        .filter(|p| p.iter().sum::<usize>() <= degree)
        .sorted_by(|a, b| {
            let (sa, sb) = (a.iter().sum::<usize>(), b.iter().sum::<usize>());
            sa.cmp(&sb).then_with(|| b.cmp(a))
        })
        .collect()
}

/// Evaluates every monomial in `powers` at every row of `points`.
pub fn evaluate_monomials(points: &Mat<f64>, powers: &[Vec<usize>]) -> Mat<f64> {
    let (n, d) = points.shape();
    assert!(powers.iter().all(|p| p.len() == d));

    Mat::from_fn(n, powers.len(), |i, j| {
        powers[j]
            .iter()
            .enumerate()
            .fold(1.0, |acc, (k, &e)| acc * points[(i, k)].powi(e as i32))
    })
}

/// `d^orders` of each monomial evaluated at the origin.
///
/// Only the monomial whose exponents equal `orders` survives, with value
/// `orders!` (the product of the per-axis factorials).
pub fn monomial_diff_at_origin(powers: &[Vec<usize>], orders: &[usize]) -> Vec<f64> {
    powers
        .iter()
        .map(|p| {
            if p.as_slice() == orders {
                orders.iter().map(|&a| factorial(a)).product()
            } else {
                0.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use equator::assert;
    use faer::{mat, utils::approx::*, Mat};

    fn run_case(points: Mat<f64>, degree: usize, expected: Mat<f64>) {
        let d = points.ncols();
        let powers = monomial_powers(degree, d);
        assert_eq!(powers.len(), basis_size(degree, d));

        let monomials = evaluate_monomials(&points, &powers);

        let approx_eq = CwiseMat(ApproxEq::eps() * 128.0 * (2 as f64));
        assert!(&monomials ~ &expected);
    }

    #[test]
    fn monomials_constant_1d() {
        let points = mat![[1.0], [2.0]];
        let expected = mat![[1.0], [1.0]];
        run_case(points, 0, expected);
    }

    #[test]
    fn monomials_quadratic_1d() {
        let points = mat![[1.0], [2.0]];
        // Basis: [1, x, x^2]
        let expected = mat![[1.0, 1.0, 1.0], [1.0, 2.0, 4.0]];
        run_case(points, 2, expected);
    }

    #[test]
    fn monomials_linear_2d() {
        let points = mat![[1.0, 2.0], [3.0, 4.0]];
        // Basis: [1, x, y]
        let expected = mat![[1.0, 1.0, 2.0], [1.0, 3.0, 4.0]];
        run_case(points, 1, expected);
    }

    #[test]
    fn monomials_quadratic_2d() {
        let points = mat![[1.0, 2.0], [3.0, 4.0]];
        // Basis: [1, x, y, x^2, x*y, y^2]
        let expected = mat![
            [1.0, 1.0, 2.0,  1.0,  2.0,  4.0],
            [1.0, 3.0, 4.0,  9.0, 12.0, 16.0],
        ];
        run_case(points, 2, expected);
    }

    #[test]
    fn monomials_cubic_2d() {
        let points = mat![[2.0, -1.0]];
        // Basis: [1, x, y, x^2, xy, y^2, x^3, x^2 y, x y^2, y^3]
        let expected = mat![[1.0, 2.0, -1.0, 4.0, -2.0, 1.0, 8.0, -4.0, 2.0, -1.0]];
        run_case(points, 3, expected);
    }

    #[test]
    fn monomials_quadratic_3d() {
        let points = mat![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        // Basis: [1, x, y, z, x^2, x*y, x*z, y^2, y*z, z^2]
        let expected = mat![
            [1.0, 1.0, 2.0, 3.0,  1.0,  2.0,  3.0,  4.0,  6.0,  9.0],
            [1.0, 4.0, 5.0, 6.0, 16.0, 20.0, 24.0, 25.0, 30.0, 36.0],
        ];
        run_case(points, 2, expected);
    }

    #[test]
    fn basis_sizes() {
        assert_eq!(basis_size(0, 2), 1);
        assert_eq!(basis_size(1, 2), 3);
        assert_eq!(basis_size(3, 2), 10);
        assert_eq!(basis_size(2, 3), 10);
    }

    #[test]
    fn derivative_at_origin_picks_matching_power() {
        let powers = monomial_powers(3, 2);
        let d = monomial_diff_at_origin(&powers, &[2, 0]);
        // Only x^2 survives with 2! = 2.
        assert_eq!(d, vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let d = monomial_diff_at_origin(&powers, &[2, 1]);
        assert_eq!(d[7], 2.0);
        assert_eq!(d.iter().sum::<f64>(), 2.0);
    }
}
