/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the adaptive Dormand-Prince 5(4) Runge-Kutta integrator used for time stepping.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Explicit adaptive Runge-Kutta integration of `y' = f(t, y)`.
//!
//! [`Dopri5`] is the embedded 5(4) pair of Dormand and Prince with the
//! first-same-as-last property, local extrapolation and an RMS error norm
//! weighted by `atol + rtol * |y|`. The right-hand side writes into a
//! caller-supplied buffer and may fail with its own error type.
//!
//! ```
//! use rbf_fd::{config::IntegratorParams, ode::Dopri5};
//!
//! let mut solver = Dopri5::new(IntegratorParams::builder().tolerances(1e-10, 1e-12).build());
//! let mut y = vec![1.0];
//! solver
//!     .integrate(
//!         |_t, y: &[f64], dy: &mut [f64]| -> Result<(), std::convert::Infallible> {
//!             dy[0] = -y[0];
//!             Ok(())
//!         },
//!         0.0,
//!         1.0,
//!         &mut y,
//!     )
//!     .unwrap();
//! assert!((y[0] - (-1.0f64).exp()).abs() < 1e-8);
//! ```
//!
//! # References
//! 1. E. Hairer, S. P. Norsett and G. Wanner. Solving Ordinary Differential
//!    Equations I: Nonstiff Problems. Springer, 1993.

use crate::config::IntegratorParams;
use std::{error::Error, fmt};

const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const A: [[f64; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];

// Difference between the 5th and embedded 4th order weights.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Failures of an integration call.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationError<E> {
    /// The step budget ran out before reaching the end time.
    TooManySteps { time: f64, steps: usize },
    /// The step size shrank below what floating point can resolve.
    StepSizeUnderflow { time: f64, step: f64 },
    /// The solution stopped being finite and shrinking the step did not help.
    NonFinite { time: f64 },
    /// The right-hand side reported an error.
    Rhs(E),
}

impl<E: fmt::Display> fmt::Display for IntegrationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationError::TooManySteps { time, steps } => {
                write!(f, "step budget of {steps} exhausted at t = {time}")
            }
            IntegrationError::StepSizeUnderflow { time, step } => {
                write!(f, "step size {step:e} too small at t = {time}")
            }
            IntegrationError::NonFinite { time } => {
                write!(f, "solution is not finite at t = {time}")
            }
            IntegrationError::Rhs(e) => write!(f, "right-hand side failed: {e}"),
        }
    }
}

impl<E: Error + 'static> Error for IntegrationError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IntegrationError::Rhs(e) => Some(e),
            _ => None,
        }
    }
}

/// Counters of one integration call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub accepted: usize,
    pub rejected: usize,
    pub evaluations: usize,
}

impl Stats {
    pub fn steps(&self) -> usize {
        self.accepted + self.rejected
    }
}

/// Dormand-Prince 5(4) integrator.
///
/// The last proposed step size is kept between calls so integrating over
/// consecutive output intervals continues smoothly.
#[derive(Debug, Clone)]
pub struct Dopri5 {
    params: IntegratorParams,
    next_step: Option<f64>,
}

impl Dopri5 {
    pub fn new(params: IntegratorParams) -> Self {
        Self {
            params,
            next_step: None,
        }
    }

    pub fn params(&self) -> &IntegratorParams {
        &self.params
    }

    /// Forgets the step size carried over from the previous call.
    pub fn reset(&mut self) {
        self.next_step = None;
    }

    fn error_norm(&self, err: &[f64], y0: &[f64], y1: &[f64]) -> f64 {
        let n = err.len().max(1) as f64;
        let sum: f64 = err
            .iter()
            .zip(y0.iter().zip(y1))
            .map(|(e, (a, b))| {
                let scale = self.params.atol + self.params.rtol * a.abs().max(b.abs());
                (e / scale).powi(2)
            })
            .sum();
        (sum / n).sqrt()
    }

    /// Hairer's starting step heuristic for a 5th order method.
    fn initial_step<F, Er>(
        &self,
        f: &mut F,
        t0: f64,
        y0: &[f64],
        f0: &[f64],
        direction: f64,
        stats: &mut Stats,
    ) -> Result<f64, IntegrationError<Er>>
    where
        F: FnMut(f64, &[f64], &mut [f64]) -> Result<(), Er>,
    {
        let d0 = self.error_norm(y0, y0, y0);
        let d1 = self.error_norm(f0, y0, y0);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };

        let y1: Vec<f64> = y0
            .iter()
            .zip(f0)
            .map(|(y, dy)| y + direction * h0 * dy)
            .collect();
        let mut f1 = vec![0.0; y0.len()];
        f(t0 + direction * h0, &y1, &mut f1).map_err(IntegrationError::Rhs)?;
        stats.evaluations += 1;

        let diff: Vec<f64> = f1.iter().zip(f0).map(|(a, b)| a - b).collect();
        let d2 = self.error_norm(&diff, y0, y0) / h0;

        let dmax = d1.max(d2);
        let h1 = if dmax <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / dmax).powf(1.0 / 5.0)
        };

        Ok((100.0 * h0).min(h1))
    }

    /// Advances `y` from `t0` to exactly `t1`.
    ///
    /// `f(t, y, dy)` must write `y'(t)` into `dy`. Integration backwards in
    /// time is supported.
    pub fn integrate<F, Er>(
        &mut self,
        mut f: F,
        t0: f64,
        t1: f64,
        y: &mut [f64],
    ) -> Result<Stats, IntegrationError<Er>>
    where
        F: FnMut(f64, &[f64], &mut [f64]) -> Result<(), Er>,
    {
        let mut stats = Stats::default();
        if t1 == t0 {
            return Ok(stats);
        }

        let n = y.len();
        let direction = (t1 - t0).signum();
        let span = (t1 - t0).abs();

        let mut k: [Vec<f64>; 7] = std::array::from_fn(|_| vec![0.0; n]);
        let mut stage = vec![0.0; n];
        let mut y_new = vec![0.0; n];
        let mut err = vec![0.0; n];

        f(t0, &*y, &mut k[0]).map_err(IntegrationError::Rhs)?;
        stats.evaluations += 1;

        let mut h = match self.next_step.or(self.params.initial_step) {
            Some(h) => h.abs(),
            None => self.initial_step(&mut f, t0, &*y, &k[0], direction, &mut stats)?,
        };
        h = h.min(span);

        let mut t = t0;
        let mut rejected_last = false;

        while (t1 - t) * direction > 0.0 {
            if stats.steps() >= self.params.max_steps {
                return Err(IntegrationError::TooManySteps {
                    time: t,
                    steps: stats.steps(),
                });
            }
            if h <= 16.0 * f64::EPSILON * t.abs().max(1.0) {
                return Err(IntegrationError::StepSizeUnderflow { time: t, step: h });
            }

            let unclipped = h;
            let last = (t + direction * h - t1) * direction >= 0.0;
            if last {
                h = (t1 - t).abs();
            }
            let hs = direction * h;

            for s in 1..7 {
                for i in 0..n {
                    let mut acc = y[i];
                    for (j, kj) in k.iter().enumerate().take(s) {
                        acc += hs * A[s][j] * kj[i];
                    }
                    stage[i] = acc;
                }
                f(t + C[s] * hs, &stage, &mut k[s]).map_err(IntegrationError::Rhs)?;
                stats.evaluations += 1;
            }
            // Stage 7 is evaluated at the 5th order solution.
            y_new.copy_from_slice(&stage);

            for i in 0..n {
                err[i] = hs * (0..7).map(|s| E[s] * k[s][i]).sum::<f64>();
            }
            let error = self.error_norm(&err, &*y, &y_new);

            if !error.is_finite() || y_new.iter().any(|v| !v.is_finite()) {
                stats.rejected += 1;
                h *= self.params.min_factor;
                rejected_last = true;
                if h <= 16.0 * f64::EPSILON * t.abs().max(1.0) {
                    return Err(IntegrationError::NonFinite { time: t });
                }
                continue;
            }

            let mut factor = if error == 0.0 {
                self.params.max_factor
            } else {
                (self.params.safety * error.powf(-1.0 / 5.0))
                    .clamp(self.params.min_factor, self.params.max_factor)
            };

            if error <= 1.0 {
                stats.accepted += 1;
                t = if last { t1 } else { t + hs };
                y.copy_from_slice(&y_new);
                k.swap(0, 6);

                if rejected_last {
                    factor = factor.min(1.0);
                }
                rejected_last = false;
                h = if last {
                    unclipped.max(h) * factor
                } else {
                    h * factor
                };
            } else {
                stats.rejected += 1;
                rejected_last = true;
                h *= factor.min(1.0);
            }
        }

        self.next_step = Some(h);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn decay(_t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), Infallible> {
        dy[0] = -y[0];
        Ok(())
    }

    fn oscillator(_t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), Infallible> {
        dy[0] = y[1];
        dy[1] = -y[0];
        Ok(())
    }

    #[test]
    fn exponential_decay_matches_exact_solution() {
        let mut solver = Dopri5::new(IntegratorParams::builder().tolerances(1e-9, 1e-12).build());
        let mut y = vec![2.0];
        let stats = solver.integrate(decay, 0.0, 3.0, &mut y).unwrap();
        assert!((y[0] - 2.0 * (-3.0f64).exp()).abs() < 1e-8);
        assert!(stats.accepted > 0);
        assert!(stats.evaluations >= 6 * stats.steps());
    }

    #[test]
    fn harmonic_oscillator_over_several_intervals() {
        let mut solver = Dopri5::new(IntegratorParams::builder().tolerances(1e-10, 1e-12).build());
        let mut y = vec![1.0, 0.0];
        let outputs = [0.5, 1.0, 2.0, 2.0 * std::f64::consts::PI];
        let mut t = 0.0;
        for &t_next in &outputs {
            solver.integrate(oscillator, t, t_next, &mut y).unwrap();
            assert!((y[0] - t_next.cos()).abs() < 1e-7);
            assert!((y[1] + t_next.sin()).abs() < 1e-7);
            t = t_next;
        }
    }

    #[test]
    fn integrates_backwards() {
        let mut solver = Dopri5::new(IntegratorParams::builder().tolerances(1e-10, 1e-12).build());
        let mut y = vec![(-1.0f64).exp()];
        solver.integrate(decay, 1.0, 0.0, &mut y).unwrap();
        assert!((y[0] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn empty_interval_is_a_no_op() {
        let mut solver = Dopri5::new(IntegratorParams::default());
        let mut y = vec![5.0];
        let stats = solver.integrate(decay, 1.0, 1.0, &mut y).unwrap();
        assert_eq!(stats, Stats::default());
        assert_eq!(y[0], 5.0);
    }

    #[test]
    fn step_budget_is_enforced() {
        let params = IntegratorParams::builder()
            .tolerances(1e-12, 1e-14)
            .max_steps(3)
            .build();
        let mut solver = Dopri5::new(params);
        let mut y = vec![1.0, 0.0];
        let err = solver.integrate(oscillator, 0.0, 100.0, &mut y).unwrap_err();
        assert!(matches!(err, IntegrationError::TooManySteps { steps: 3, .. }));
    }

    #[test]
    fn rhs_errors_are_propagated() {
        let mut solver = Dopri5::new(IntegratorParams::default());
        let mut y = vec![1.0];
        let err = solver
            .integrate(
                |t, _y: &[f64], _dy: &mut [f64]| if t > 0.5 { Err("boom") } else { Ok(()) },
                0.0,
                1.0,
                &mut y,
            )
            .unwrap_err();
        assert_eq!(err, IntegrationError::Rhs("boom"));
    }

    #[test]
    fn blow_up_is_reported() {
        let params = IntegratorParams::builder().max_steps(100_000).build();
        let mut solver = Dopri5::new(params);
        let mut y = vec![1.0];
        let err = solver
            .integrate(
                |_t, y: &[f64], dy: &mut [f64]| -> Result<(), Infallible> {
                    dy[0] = y[0] * y[0];
                    Ok(())
                },
                0.0,
                2.0,
                &mut y,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            IntegrationError::StepSizeUnderflow { .. }
                | IntegrationError::NonFinite { .. }
                | IntegrationError::TooManySteps { .. }
        ));
    }
}
