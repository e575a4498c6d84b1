/////////////////////////////////////////////////////////////////////////////////////////////
//
// Re-exports kernel utilities and helper functions used across the rbf_fd crates.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities for the [`rbf_fd`] crate
//!
//! Provides the radial kernels used to build RBF-FD stencils, their mixed
//! partial derivatives, and a handful of small matrix helpers.
//!
//! ```
//! use rbf_fd_utils::{kernel_diff, KernelParams, KernelType};
//!
//! let params = KernelParams::builder(KernelType::Phs3).build();
//!
//! // d/dx of r^3 at displacement (1, 0) is 3 r x = 3.
//! let dx = kernel_diff(&[1.0, 0.0], &[1, 0], &params);
//! assert!((dx - 3.0).abs() < 1e-12);
//! ```
//!
//! [`rbf_fd`]: https://docs.rs/rbf_fd
mod rbf_kernels;
mod traits;
mod utils;
mod kernel_helpers;

/// Implemented kernels for use in the `rbf_fd` crate.
pub mod kernels {
    pub use super::rbf_kernels::*;
}

pub use {
    kernel_helpers::{KernelParams, KernelParamsBuilder},
    utils::{
        KernelType, factorial, get_a_matrix, get_pointarray_extents, kernel_diff,
        kernel_max_derivative_order, select_mat_rows,
    },
    traits::{KernelFromParams, RadialKernel},
};
