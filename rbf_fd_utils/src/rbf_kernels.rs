/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the concrete radial kernels and their derivatives in squared distance.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{KernelFromParams, KernelParams, RadialKernel};
use std::marker::PhantomData;

/// Compile-time marker for the odd power of a polyharmonic spline.
pub trait PhsSpec {
    const POW: i32;
}

#[doc(hidden)]
#[derive(Copy, Clone, Debug)]
pub struct Power3;

#[doc(hidden)]
#[derive(Copy, Clone, Debug)]
pub struct Power5;

#[doc(hidden)]
#[derive(Copy, Clone, Debug)]
pub struct Power7;

impl PhsSpec for Power3 {
    const POW: i32 = 3;
}
impl PhsSpec for Power5 {
    const POW: i32 = 5;
}
impl PhsSpec for Power7 {
    const POW: i32 = 7;
}

/// Polyharmonic spline kernel `phi(r) = r^k` for odd `k`.
///
/// In squared distance, `g(s) = s^(k/2)` and
/// `g^(m)(s) = prod_{i<m} (k/2 - i) s^(k/2 - m)`.
#[derive(Clone, Debug, Copy)]
pub struct PolyharmonicRbfKernel<S: PhsSpec> {
    _spec: PhantomData<S>,
}

impl<S: PhsSpec> PolyharmonicRbfKernel<S> {
    #[inline(always)]
    pub fn new() -> Self {
        Self { _spec: PhantomData }
    }
}

impl<S: PhsSpec> Default for PolyharmonicRbfKernel<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PhsSpec> RadialKernel for PolyharmonicRbfKernel<S> {
    #[inline(always)]
    fn phi(&self, r: f64) -> f64 {
        r.abs().powi(S::POW)
    }

    fn phi_s(&self, s: f64, m: usize) -> f64 {
        if s <= 0.0 {
            return 0.0;
        }
        let half = S::POW as f64 / 2.0;
        let mut coefficient = 1.0;
        for i in 0..m {
            coefficient *= half - i as f64;
        }
        coefficient * s.powf(half - m as f64)
    }

    #[inline(always)]
    fn max_derivative_order(&self) -> Option<usize> {
        Some(S::POW as usize - 1)
    }
}

impl<S: PhsSpec> KernelFromParams for PolyharmonicRbfKernel<S> {
    #[inline(always)]
    fn from_params(_: &KernelParams) -> Self {
        Self::new()
    }
}

/// Cubic polyharmonic spline, `phi(r) = r^3`.
pub type Phs3RbfKernel = PolyharmonicRbfKernel<Power3>;
/// Quintic polyharmonic spline, `phi(r) = r^5`.
pub type Phs5RbfKernel = PolyharmonicRbfKernel<Power5>;
/// Septic polyharmonic spline, `phi(r) = r^7`.
pub type Phs7RbfKernel = PolyharmonicRbfKernel<Power7>;

/// Gaussian kernel `phi(r) = exp(-(eps r)^2)`.
#[derive(Clone, Debug, Copy)]
pub struct GaussianRbfKernel {
    pub shape: f64,
    eps2: f64,
}

impl GaussianRbfKernel {
    #[inline(always)]
    pub fn new(shape: f64) -> Self {
        Self {
            shape,
            eps2: shape * shape,
        }
    }
}

impl RadialKernel for GaussianRbfKernel {
    #[inline(always)]
    fn phi(&self, r: f64) -> f64 {
        (-self.eps2 * r * r).exp()
    }

    #[inline(always)]
    fn phi_s(&self, s: f64, m: usize) -> f64 {
        (-self.eps2).powi(m as i32) * (-self.eps2 * s).exp()
    }

    #[inline(always)]
    fn max_derivative_order(&self) -> Option<usize> {
        None
    }
}

impl KernelFromParams for GaussianRbfKernel {
    #[inline(always)]
    fn from_params(p: &KernelParams) -> Self {
        Self::new(p.shape)
    }
}
