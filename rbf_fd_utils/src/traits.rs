/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares traits shared by radial kernels and their parameter sets.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{kernel_helpers::KernelParams, utils::factorial};

/// Converts a shared [`KernelParams`] configuration into a concrete kernel type.
pub trait KernelFromParams: Sized {
    /// Constructs `Self` from a set of uniform kernel parameters.
    fn from_params(p: &KernelParams) -> Self;
}

/// A radial kernel `phi(r)`, also viewed as `g(s) = phi(sqrt(s))` with `s = r^2`.
///
/// Writing the kernel in terms of `s` makes every mixed partial derivative
/// available in closed form, since `s = sum_i d_i^2` separates over the
/// coordinates of the displacement `d = x - c`.
pub trait RadialKernel {
    /// Kernel value at distance `r`.
    fn phi(&self, r: f64) -> f64;

    /// The `m`-th derivative of `g(s)` evaluated at `s > 0`.
    fn phi_s(&self, s: f64, m: usize) -> f64;

    /// Highest total derivative order that is well defined at `r = 0`, or
    /// `None` for kernels that are smooth everywhere.
    fn max_derivative_order(&self) -> Option<usize>;

    /// Mixed partial derivative `d^alpha phi(|x - c|)` evaluated at the
    /// displacement `x - c`.
    ///
    /// Uses
    /// `d^a g(s) = sum_{j <= a/2} prod_i a_i! / (j_i! (a_i - 2 j_i)!) (2 d_i)^(a_i - 2 j_i) g^(|a| - |j|)(s)`.
    fn diff(&self, displacement: &[f64], orders: &[usize]) -> f64 {
        assert_eq!(
            displacement.len(),
            orders.len(),
            "displacement and derivative orders must have the same dimension"
        );

        let s: f64 = displacement.iter().map(|d| d * d).sum();

        // Every derivative below the smoothness limit of a kernel with a
        // singular origin vanishes at r = 0.
        if s == 0.0 && self.max_derivative_order().is_some() {
            return 0.0;
        }

        let dim = orders.len();
        let total: usize = orders.iter().sum();
        if total == 0 {
            return self.phi(s.sqrt());
        }
        let limits: Vec<usize> = orders.iter().map(|a| a / 2).collect();
        let mut j = vec![0usize; dim];
        let mut value = 0.0;

        loop {
            let mut coefficient = 1.0;
            let mut j_sum = 0usize;

            for i in 0..dim {
                let a = orders[i];
                let ji = j[i];
                coefficient *= factorial(a) / (factorial(ji) * factorial(a - 2 * ji));
                coefficient *= (2.0 * displacement[i]).powi((a - 2 * ji) as i32);
                j_sum += ji;
            }

            value += coefficient * self.phi_s(s, total - j_sum);

            // Advance the multi-index j in mixed radix.
            let mut i = 0;
            loop {
                if i == dim {
                    return value;
                }
                if j[i] < limits[i] {
                    j[i] += 1;
                    break;
                }
                j[i] = 0;
                i += 1;
            }
        }
    }
}
