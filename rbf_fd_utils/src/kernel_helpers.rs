/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides parameter and builder types for configuring radial kernels.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use serde::{Deserialize, Serialize};
use crate::utils::KernelType;

/// Defines the [`KernelType`] to use, along with the shape parameter
/// for smooth kernels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct KernelParams {
    /// KernelType enum variant to use.
    pub kernel_type: KernelType,

    /// Shape parameter `eps` of the Gaussian kernel. Larger values give a
    /// narrower kernel and a better conditioned but less accurate stencil.
    ///
    /// Ignored by the polyharmonic splines, which are scale free.
    pub shape: f64,
}

impl Default for KernelParams {
    fn default() -> Self {
        KernelParams::builder(KernelType::Phs3).build()
    }
}

impl KernelParams {
    /// Begins building a [`KernelParams`] instance for the given kernel type.
    pub fn builder(kernel_type: KernelType) -> KernelParamsBuilder {
        KernelParamsBuilder {
            kernel_type,
            shape: 1.0,
        }
    }
}

/// Builder for [`KernelParams`] that provides sensible defaults.
#[derive(Debug, Clone, Copy)]
pub struct KernelParamsBuilder {
    kernel_type: KernelType,
    shape: f64,
}

impl KernelParamsBuilder {
    /// Sets the Gaussian `shape` parameter on the builder.
    pub fn shape(mut self, v: f64) -> Self {
        self.shape = v;
        self
    }

    /// Finalises the builder into a [`KernelParams`] value.
    pub fn build(self) -> KernelParams {
        assert!(self.shape > 0.0, "kernel shape parameter must be positive");
        KernelParams {
            kernel_type: self.kernel_type,
            shape: self.shape,
        }
    }
}
