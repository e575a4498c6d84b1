/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares configuration types for node generation, stencils, time integration and filtering.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Declares configuration types for node generation, stencils, time integration and filtering.
use rbf_fd_utils::{KernelParams, KernelType};
use serde::{Deserialize, Serialize};

/// Parameters controlling **node generation**.
///
/// Interior nodes are first drawn by rejection sampling and then pushed
/// apart by a short-range repulsion between each node and its nearest
/// neighbours. Boundary nodes never move.
///
/// ### Default Values
/// - `iterations`: `20`
/// - `neighbours`: `3`
/// - `step`: `0.1`
/// - `seed`: `None`
/// - `max_sampling_rounds`: `1000`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct NodeParams {
    /// Number of dispersal rounds.
    pub iterations: usize,

    /// Number of neighbours that repel each node.
    pub neighbours: usize,

    /// Step length of each round, as a fraction of the distance to the
    /// nearest neighbour.
    pub step: f64,

    /// Optional random seed. `None` seeds from the operating system.
    pub seed: Option<u64>,

    /// Upper bound on rejection sampling rounds before giving up.
    pub max_sampling_rounds: usize,
}

impl Default for NodeParams {
    fn default() -> Self {
        NodeParams {
            iterations: 20,
            neighbours: 3,
            step: 0.1,
            seed: None,
            max_sampling_rounds: 1000,
        }
    }
}

impl NodeParams {
    /// Returns a new [`NodeParamsBuilder`] populated with defaults.
    pub fn builder() -> NodeParamsBuilder {
        NodeParamsBuilder {
            params: NodeParams::default(),
        }
    }
}

/// Builder for [`NodeParams`].
#[derive(Debug, Clone)]
pub struct NodeParamsBuilder {
    params: NodeParams,
}

impl NodeParamsBuilder {
    /// Sets the number of dispersal rounds.
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.params.iterations = iterations;
        self
    }

    /// Sets the number of repelling neighbours.
    pub fn neighbours(mut self, neighbours: usize) -> Self {
        self.params.neighbours = neighbours;
        self
    }

    /// Sets the relative step length.
    pub fn step(mut self, step: f64) -> Self {
        self.params.step = step;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.params.seed = Some(seed);
        self
    }

    /// Sets the rejection sampling budget.
    pub fn max_sampling_rounds(mut self, rounds: usize) -> Self {
        self.params.max_sampling_rounds = rounds;
        self
    }

    pub fn build(self) -> NodeParams {
        assert!(self.params.neighbours >= 1, "at least one neighbour is required");
        assert!(self.params.step > 0.0, "dispersal step must be positive");
        self.params
    }
}

/// Parameters of an RBF-FD **stencil**: the kernel, the number of nodes per
/// stencil and the degree of the appended polynomial.
///
/// ### Default Values
/// - `kernel`: cubic polyharmonic spline (`KernelType::Phs3`)
/// - `n`: `30`
/// - `poly_degree`: `None`, meaning one more than the highest derivative
///   order of the operator (and at least 1)
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct StencilParams {
    /// Radial kernel used in the local interpolation problems.
    pub kernel: KernelParams,

    /// Number of nearest source nodes in each stencil.
    pub n: usize,

    /// Degree of the polynomial appended to each stencil.
    pub poly_degree: Option<usize>,
}

impl Default for StencilParams {
    fn default() -> Self {
        StencilParams {
            kernel: KernelParams::builder(KernelType::Phs3).build(),
            n: 30,
            poly_degree: None,
        }
    }
}

impl StencilParams {
    /// Begins building [`StencilParams`] with stencil size `n`.
    pub fn builder(n: usize) -> StencilParamsBuilder {
        StencilParamsBuilder {
            params: StencilParams {
                n,
                ..StencilParams::default()
            },
        }
    }

    /// Polynomial degree for an operator whose highest derivative order is
    /// `max_order`.
    pub fn resolved_degree(&self, max_order: usize) -> usize {
        self.poly_degree.unwrap_or((max_order + 1).max(1))
    }
}

/// Builder for [`StencilParams`].
#[derive(Debug, Clone)]
pub struct StencilParamsBuilder {
    params: StencilParams,
}

impl StencilParamsBuilder {
    /// Sets the radial kernel.
    pub fn kernel(mut self, kernel: KernelParams) -> Self {
        self.params.kernel = kernel;
        self
    }

    /// Sets an explicit polynomial degree.
    pub fn poly_degree(mut self, degree: usize) -> Self {
        self.params.poly_degree = Some(degree);
        self
    }

    pub fn build(self) -> StencilParams {
        assert!(self.params.n >= 1, "stencils need at least one node");
        self.params
    }
}

/// Step size control of the adaptive **Dormand-Prince** integrator.
///
/// ### Default Values
/// - `rtol`: `1e-6`
/// - `atol`: `1e-12`
/// - `max_steps`: `1000` (per call to `integrate`)
/// - `safety`: `0.9`
/// - `min_factor`: `0.2`
/// - `max_factor`: `10.0`
/// - `initial_step`: `None` (estimated automatically)
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct IntegratorParams {
    /// Relative error tolerance.
    pub rtol: f64,

    /// Absolute error tolerance.
    pub atol: f64,

    /// Maximum number of accepted and rejected steps per call.
    pub max_steps: usize,

    /// Safety factor applied to the optimal step size.
    pub safety: f64,

    /// Smallest allowed ratio between consecutive step sizes.
    pub min_factor: f64,

    /// Largest allowed ratio between consecutive step sizes.
    pub max_factor: f64,

    /// First trial step; estimated when `None`.
    pub initial_step: Option<f64>,
}

impl Default for IntegratorParams {
    fn default() -> Self {
        IntegratorParams {
            rtol: 1e-6,
            atol: 1e-12,
            max_steps: 1000,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
            initial_step: None,
        }
    }
}

impl IntegratorParams {
    /// Returns a new [`IntegratorParamsBuilder`] populated with defaults.
    pub fn builder() -> IntegratorParamsBuilder {
        IntegratorParamsBuilder {
            params: IntegratorParams::default(),
        }
    }
}

/// Builder for [`IntegratorParams`].
#[derive(Debug, Clone)]
pub struct IntegratorParamsBuilder {
    params: IntegratorParams,
}

impl IntegratorParamsBuilder {
    /// Sets relative and absolute tolerances.
    pub fn tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.params.rtol = rtol;
        self.params.atol = atol;
        self
    }

    /// Sets the step budget per call.
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.params.max_steps = max_steps;
        self
    }

    /// Sets the safety factor.
    pub fn safety(mut self, safety: f64) -> Self {
        self.params.safety = safety;
        self
    }

    /// Sets the limits on step size change.
    pub fn step_factors(mut self, min_factor: f64, max_factor: f64) -> Self {
        self.params.min_factor = min_factor;
        self.params.max_factor = max_factor;
        self
    }

    /// Sets the first trial step.
    pub fn initial_step(mut self, h: f64) -> Self {
        self.params.initial_step = Some(h);
        self
    }

    pub fn build(self) -> IntegratorParams {
        let p = self.params;
        assert!(p.rtol >= 0.0 && p.atol >= 0.0 && p.rtol + p.atol > 0.0);
        assert!(p.min_factor > 0.0 && p.min_factor < 1.0 && p.max_factor > 1.0);
        assert!(p.safety > 0.0 && p.safety <= 1.0);
        p
    }
}

#[doc = include_str!("../docs/wave_params.md")]
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct WaveParams {
    /// Wave propagation speed `c`.
    pub wave_speed: f64,

    /// Ghost node offset along the outward normal, in units of the minimum
    /// node spacing.
    pub ghost_offset: f64,

    /// Stencils of the Laplacian operator.
    pub laplacian: StencilParams,

    /// Stencils of the boundary (normal derivative) operator.
    pub boundary: StencilParams,

    /// Time integration settings.
    pub integrator: IntegratorParams,
}

impl Default for WaveParams {
    fn default() -> Self {
        WaveParams {
            wave_speed: 1.0,
            ghost_offset: 0.5,
            laplacian: StencilParams::default(),
            boundary: StencilParams::default(),
            integrator: IntegratorParams::default(),
        }
    }
}

impl WaveParams {
    /// Returns a new [`WaveParamsBuilder`] populated with defaults.
    pub fn builder() -> WaveParamsBuilder {
        WaveParamsBuilder {
            params: WaveParams::default(),
        }
    }
}

/// A convenience builder for constructing a [`WaveParams`] instance.
///
/// See [`WaveParams`] for details on each field.
#[derive(Debug, Clone)]
pub struct WaveParamsBuilder {
    params: WaveParams,
}

impl WaveParamsBuilder {
    /// Sets the wave speed.
    pub fn wave_speed(mut self, c: f64) -> Self {
        self.params.wave_speed = c;
        self
    }

    /// Sets the ghost node offset factor.
    pub fn ghost_offset(mut self, factor: f64) -> Self {
        self.params.ghost_offset = factor;
        self
    }

    /// Uses the same stencil parameters for both operators.
    pub fn stencil(mut self, stencil: StencilParams) -> Self {
        self.params.laplacian = stencil;
        self.params.boundary = stencil;
        self
    }

    /// Sets the Laplacian stencil parameters.
    pub fn laplacian(mut self, stencil: StencilParams) -> Self {
        self.params.laplacian = stencil;
        self
    }

    /// Sets the boundary operator stencil parameters.
    pub fn boundary(mut self, stencil: StencilParams) -> Self {
        self.params.boundary = stencil;
        self
    }

    /// Sets the integrator parameters.
    pub fn integrator(mut self, integrator: IntegratorParams) -> Self {
        self.params.integrator = integrator;
        self
    }

    pub fn build(self) -> WaveParams {
        assert!(self.params.wave_speed > 0.0, "wave speed must be positive");
        assert!(self.params.ghost_offset > 0.0, "ghost offset must be positive");
        self.params
    }
}

#[doc = include_str!("../docs/filter_params.md")]
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct FilterParams {
    /// Cutoff frequency `f_c`.
    pub cutoff: f64,

    /// Order of the penalised derivative; also sets the roll-off.
    pub order: usize,

    /// Stencils of the penalty operator.
    pub stencil: StencilParams,

    /// Number of bootstrap samples for the uncertainty estimate.
    pub samples: usize,

    /// Optional seed for the bootstrap noise.
    pub seed: Option<u64>,
}

impl FilterParams {
    /// Begins building [`FilterParams`] for the given cutoff frequency.
    pub fn builder(cutoff: f64) -> FilterParamsBuilder {
        FilterParamsBuilder {
            params: FilterParams {
                cutoff,
                order: 2,
                stencil: StencilParams::builder(20).build(),
                samples: 100,
                seed: None,
            },
        }
    }
}

/// Builder for [`FilterParams`].
#[derive(Debug, Clone)]
pub struct FilterParamsBuilder {
    params: FilterParams,
}

impl FilterParamsBuilder {
    /// Sets the derivative order of the penalty.
    pub fn order(mut self, order: usize) -> Self {
        self.params.order = order;
        self
    }

    /// Sets the stencil size.
    pub fn n(mut self, n: usize) -> Self {
        self.params.stencil.n = n;
        self
    }

    /// Sets the full stencil parameters.
    pub fn stencil(mut self, stencil: StencilParams) -> Self {
        self.params.stencil = stencil;
        self
    }

    /// Sets the number of bootstrap samples; `0` disables the uncertainty.
    pub fn samples(mut self, samples: usize) -> Self {
        self.params.samples = samples;
        self
    }

    /// Sets the bootstrap seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.params.seed = Some(seed);
        self
    }

    pub fn build(self) -> FilterParams {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_degree_defaults_to_one_above_operator_order() {
        let params = StencilParams::default();
        assert_eq!(params.resolved_degree(2), 3);
        assert_eq!(params.resolved_degree(0), 1);

        let explicit = StencilParams::builder(20).poly_degree(1).build();
        assert_eq!(explicit.resolved_degree(2), 1);
    }

    #[test]
    fn params_roundtrip_through_json() {
        let params = WaveParams::builder()
            .wave_speed(2.0)
            .stencil(
                StencilParams::builder(12)
                    .kernel(KernelParams::builder(KernelType::Gaussian).shape(2.0).build())
                    .build(),
            )
            .build();
        let text = serde_json::to_string(&params).unwrap();
        let back: WaveParams = serde_json::from_str(&text).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn filter_builder_defaults() {
        let params = FilterParams::builder(60.0).n(20).samples(0).build();
        assert_eq!(params.order, 2);
        assert_eq!(params.stencil.n, 20);
        assert_eq!(params.samples, 0);
        assert_eq!(params.seed, None);
    }
}
