/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides smooth and piecewise test fields for checking RBF-FD operators and the filter.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Two-dimensional test fields sampled at the rows of a point matrix.
use faer::Mat;
use std::f64::consts::PI;

/// Collection of 2D fields used to validate differentiation weights and to
/// demonstrate the low-pass filter.
pub struct RBFTestFunctions;

impl RBFTestFunctions {
    /// Franke's two-dimensional test function:
    /// <div>
    /// $$
    /// \begin{aligned}
    /// F(x,y) &=
    /// \tfrac{3}{4}\exp\!\left[
    ///     -\frac{(9x-2)^2 + (9y-2)^2}{4}
    /// \right] \\[6pt]
    /// &\quad+ \tfrac{3}{4}\exp\!\left[
    ///     -\frac{(9x+1)^2}{49}
    ///     -\frac{(9y+1)^2}{10}
    /// \right] \\[6pt]
    /// &\quad+ \tfrac{1}{2}\exp\!\left[
    ///     -\frac{(9x-7)^2 + (9y-3)^2}{4}
    /// \right] \\[6pt]
    /// &\quad- \tfrac{1}{5}\exp\!\left[
    ///     -(9x-4)^2 - (9y-7)^2
    /// \right]
    /// \end{aligned}
    /// $$
    /// </div>
    pub fn franke_2d(points: &Mat<f64>) -> Vec<f64> {
        assert_eq!(points.ncols(), 2);

        (0..points.nrows())
            .map(|i| {
                let nx = 9.0 * points[(i, 0)];
                let ny = 9.0 * points[(i, 1)];

                let term1 = 0.75 * (-((nx - 2.0).powi(2) + (ny - 2.0).powi(2)) / 4.0).exp();
                let term2 = 0.75 * (-(nx + 1.0).powi(2) / 49.0 - (ny + 1.0).powi(2) / 10.0).exp();
                let term3 = 0.5 * (-((nx - 7.0).powi(2) + (ny - 3.0).powi(2)) / 4.0).exp();
                let term4 = -0.2 * (-(nx - 4.0).powi(2) - (ny - 7.0).powi(2)).exp();

                term1 + term2 + term3 + term4
            })
            .collect()
    }

    /// `cos(pi x) cos(pi y)`.
    ///
    /// Its normal derivative vanishes on the unit square, which makes it a
    /// convenient check for free boundary conditions.
    pub fn cos_product(points: &Mat<f64>) -> Vec<f64> {
        assert_eq!(points.ncols(), 2);
        (0..points.nrows())
            .map(|i| (PI * points[(i, 0)]).cos() * (PI * points[(i, 1)]).cos())
            .collect()
    }

    /// Piecewise-constant synthetic image on the unit square: a bright disc,
    /// a darker bar and a uniform background, with unit step heights.
    ///
    /// Sharp edges carry energy at every frequency, so filtered output
    /// shows how much detail survives a given cutoff.
    pub fn synthetic_image(points: &Mat<f64>) -> Vec<f64> {
        assert_eq!(points.ncols(), 2);
        (0..points.nrows())
            .map(|i| {
                let (x, y) = (points[(i, 0)], points[(i, 1)]);
                let in_disc = (x - 0.35).powi(2) + (y - 0.6).powi(2) < 0.15f64.powi(2);
                let in_bar = (0.55..0.85).contains(&x) && (0.2..0.35).contains(&y);
                match (in_disc, in_bar) {
                    (true, _) => 2.0,
                    (false, true) => 1.0,
                    (false, false) => 0.0,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn franke_known_value() {
        let pts = mat![[0.0, 0.0]];
        let v = RBFTestFunctions::franke_2d(&pts)[0];
        let expected = 0.75 * (-2.0f64).exp()
            + 0.75 * (-1.0 / 49.0 - 1.0 / 10.0f64).exp()
            + 0.5 * (-(49.0 + 9.0) / 4.0f64).exp()
            - 0.2 * (-(16.0 + 49.0f64)).exp();
        assert!((v - expected).abs() < 1e-12);
    }

    #[test]
    fn cos_product_corners() {
        let pts = mat![[0.0, 0.0], [1.0, 0.0], [0.5, 0.25]];
        let v = RBFTestFunctions::cos_product(&pts);
        assert!((v[0] - 1.0).abs() < 1e-12);
        assert!((v[1] + 1.0).abs() < 1e-12);
        assert!(v[2].abs() < 1e-12);
    }

    #[test]
    fn synthetic_image_levels() {
        let pts = mat![[0.35, 0.6], [0.7, 0.3], [0.05, 0.05]];
        assert_eq!(RBFTestFunctions::synthetic_image(&pts), vec![2.0, 1.0, 0.0]);
    }
}
