/////////////////////////////////////////////////////////////////////////////////////////////
//
// Solves the 2D wave equation with RBF-FD operators, ghost nodes and adaptive time stepping.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Wave equation
//!
//! `u_tt = c^2 (u_xx + u_yy)` is written as the first order system
//! `u_t = v`, `v_t = c^2 Lap(u)` on the physical nodes (interior then
//! boundary). The state vector is `[u; v]`. Ghost nodes outside the
//! boundary carry no state: at every evaluation their values are solved
//! from the boundary condition, and the Laplacian stencils of the physical
//! nodes reach into them.
//!
//! ```no_run
//! use rbf_fd::{geometry::PolygonDomain, wave::WaveSimulation};
//!
//! let sim = WaveSimulation::builder(PolygonDomain::l_shape(), 5_000).build()?;
//! let u0 = sim.radial_bump([0.5, 0.5], 0.05);
//! let state = sim.initial_state(&u0, &vec![0.0; u0.len()])?;
//! let solution = sim.run(&state, &[0.0, 0.5, 1.0])?;
//! solution.save_json("wave.json")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::{
    boundary::{BoundaryCondition, BoundaryError, GhostSystem},
    config::{NodeParams, WaveParams},
    fd::{weight_matrix, DifferentialOperator, StencilError},
    geometry::PolygonDomain,
    linalg::SparseOperator,
    nodes::{ghost_nodes, min_spacing, NodeError, NodeGenerator, NodeSet},
    ode::{Dopri5, IntegrationError},
    progress::{progress_from_time, report, ProgressMsg, ProgressSink},
};
use csv::Writer;
use faer::Mat;
use rbf_fd_utils::select_mat_rows;
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

/// Failures while building or running a wave simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveError {
    /// A state or output buffer has the wrong length.
    StateLength { expected: usize, found: usize },
    /// Operators do not fit the node counts.
    OperatorShape { expected: (usize, usize), found: (usize, usize) },
    /// Normals do not match the boundary nodes.
    NormalsLength { expected: usize, found: usize },
    /// Output times must be non-empty, finite and strictly increasing.
    InvalidTimes,
    Nodes(NodeError),
    Stencil(StencilError),
    Boundary(BoundaryError),
    Integration(Box<IntegrationError<WaveError>>),
}

impl fmt::Display for WaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveError::StateLength { expected, found } => {
                write!(f, "state has length {found}, expected {expected}")
            }
            WaveError::OperatorShape { expected, found } => write!(
                f,
                "operator is {} x {}, expected {} x {}",
                found.0, found.1, expected.0, expected.1
            ),
            WaveError::NormalsLength { expected, found } => {
                write!(f, "{found} normals for {expected} boundary nodes")
            }
            WaveError::InvalidTimes => {
                f.write_str("output times must be finite and strictly increasing")
            }
            WaveError::Nodes(e) => write!(f, "node generation failed: {e}"),
            WaveError::Stencil(e) => write!(f, "operator assembly failed: {e}"),
            WaveError::Boundary(e) => write!(f, "boundary condition failed: {e}"),
            WaveError::Integration(e) => write!(f, "time integration failed: {e}"),
        }
    }
}

impl Error for WaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WaveError::Nodes(e) => Some(e),
            WaveError::Stencil(e) => Some(e),
            WaveError::Boundary(e) => Some(e),
            WaveError::Integration(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<NodeError> for WaveError {
    fn from(e: NodeError) -> Self {
        WaveError::Nodes(e)
    }
}

impl From<StencilError> for WaveError {
    fn from(e: StencilError) -> Self {
        WaveError::Stencil(e)
    }
}

impl From<BoundaryError> for WaveError {
    fn from(e: BoundaryError) -> Self {
        WaveError::Boundary(e)
    }
}

impl From<IntegrationError<WaveError>> for WaveError {
    fn from(e: IntegrationError<WaveError>) -> Self {
        match e {
            IntegrationError::Rhs(inner) => inner,
            other => WaveError::Integration(Box::new(other)),
        }
    }
}

/// Everything the time derivative needs, built once and never mutated.
#[derive(Debug)]
pub struct WaveContext {
    num_interior: usize,
    num_boundary: usize,
    laplacian: SparseOperator,
    ghost: GhostSystem,
    wave_speed: f64,
}

impl WaveContext {
    /// `laplacian` maps physical plus ghost values to the Laplacian at the
    /// physical nodes; `ghost` solves the ghost values from physical ones.
    pub fn new(
        num_interior: usize,
        num_boundary: usize,
        laplacian: SparseOperator,
        ghost: GhostSystem,
        wave_speed: f64,
    ) -> Result<Self, WaveError> {
        let physical = num_interior + num_boundary;
        let expected = (physical, physical + ghost.num_ghost());
        let found = (laplacian.nrows(), laplacian.ncols());
        if found != expected || ghost.num_known() != physical {
            return Err(WaveError::OperatorShape { expected, found });
        }
        Ok(Self {
            num_interior,
            num_boundary,
            laplacian,
            ghost,
            wave_speed,
        })
    }

    pub fn num_interior(&self) -> usize {
        self.num_interior
    }

    pub fn num_boundary(&self) -> usize {
        self.num_boundary
    }

    pub fn num_physical(&self) -> usize {
        self.num_interior + self.num_boundary
    }

    /// Length of the `[u; v]` state.
    pub fn state_len(&self) -> usize {
        2 * self.num_physical()
    }

    pub fn laplacian(&self) -> &SparseOperator {
        &self.laplacian
    }

    pub fn ghost_system(&self) -> &GhostSystem {
        &self.ghost
    }

    pub fn wave_speed(&self) -> f64 {
        self.wave_speed
    }

    /// Physical displacements followed by the ghost values they imply.
    pub fn full_displacement(&self, u: &[f64]) -> Result<Vec<f64>, WaveError> {
        let ghosts = self.ghost.solve_ghosts(u)?;
        let mut full = Vec::with_capacity(u.len() + ghosts.len());
        full.extend_from_slice(u);
        full.extend(ghosts);
        Ok(full)
    }

    /// Writes `d/dt [u; v] = [v; c^2 Lap(u)]` into `out`.
    pub fn evaluate_into(&self, _t: f64, state: &[f64], out: &mut [f64]) -> Result<(), WaveError> {
        let n = self.num_physical();
        for found in [state.len(), out.len()] {
            if found != 2 * n {
                return Err(WaveError::StateLength {
                    expected: 2 * n,
                    found,
                });
            }
        }

        let (u, v) = state.split_at(n);
        let full = self.full_displacement(u)?;

        let (du, dv) = out.split_at_mut(n);
        du.copy_from_slice(v);
        self.laplacian.apply_into(&full, dv);
        let c2 = self.wave_speed * self.wave_speed;
        dv.iter_mut().for_each(|a| *a *= c2);
        Ok(())
    }

    /// Allocating form of [`WaveContext::evaluate_into`].
    pub fn time_derivative(&self, t: f64, state: &[f64]) -> Result<Vec<f64>, WaveError> {
        let mut out = vec![0.0; state.len()];
        self.evaluate_into(t, state, &mut out)?;
        Ok(out)
    }
}

enum NodeSource {
    Generate {
        domain: PolygonDomain,
        num_nodes: usize,
    },
    Given {
        nodes: NodeSet,
        normals: Mat<f64>,
    },
}

/// Builder for [`WaveSimulation`].
pub struct WaveSimulationBuilder {
    source: NodeSource,
    params: WaveParams,
    boundary_condition: BoundaryCondition,
    node_params: NodeParams,
    progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl WaveSimulationBuilder {
    fn new(source: NodeSource) -> Self {
        Self {
            source,
            params: WaveParams::default(),
            boundary_condition: BoundaryCondition::Free,
            node_params: NodeParams::default(),
            progress_callback: None,
        }
    }

    /// Sets wave speed, stencil and integrator parameters.
    pub fn params(mut self, params: WaveParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the boundary condition; free by default.
    pub fn boundary_condition(mut self, condition: BoundaryCondition) -> Self {
        self.boundary_condition = condition;
        self
    }

    /// Sets node generation parameters. Ignored for supplied nodes.
    pub fn node_params(mut self, params: NodeParams) -> Self {
        self.node_params = params;
        self
    }

    pub fn progress_callback(mut self, progress_callback: Arc<dyn ProgressSink>) -> Self {
        self.progress_callback = Some(progress_callback);
        self
    }

    /// Places nodes if needed and assembles every operator.
    pub fn build(self) -> Result<WaveSimulation, WaveError> {
        let (nodes, normals) = match self.source {
            NodeSource::Generate { domain, num_nodes } => {
                let mut generator = NodeGenerator::builder(domain.clone(), num_nodes)
                    .params(self.node_params);
                if let Some(sink) = &self.progress_callback {
                    generator = generator.progress_callback(sink.clone());
                }
                let nodes = generator.build().generate()?.reorder_interior_first();
                let normals = nodes.boundary_normals(&domain)?;
                (nodes, normals)
            }
            NodeSource::Given { nodes, normals } => {
                if normals.nrows() != nodes.num_boundary() || normals.ncols() != 2 {
                    return Err(WaveError::NormalsLength {
                        expected: nodes.num_boundary(),
                        found: normals.nrows(),
                    });
                }
                (nodes.reorder_interior_first(), normals)
            }
        };

        let num_interior = nodes.num_interior();
        let num_boundary = nodes.num_boundary();
        let num_physical = nodes.len();
        let boundary: Vec<usize> = (num_interior..num_physical).collect();

        let spacing = min_spacing(nodes.points());
        let ghosts = ghost_nodes(
            nodes.points(),
            &boundary,
            &normals,
            self.params.ghost_offset * spacing,
        );
        let all = Mat::from_fn(num_physical + num_boundary, 2, |i, d| {
            if i < num_physical {
                nodes.points()[(i, d)]
            } else {
                ghosts[(i - num_physical, d)]
            }
        });

        let laplacian = weight_matrix(
            nodes.points(),
            &all,
            &DifferentialOperator::laplacian(2),
            &self.params.laplacian,
        )?;
        report(
            &self.progress_callback,
            ProgressMsg::OperatorAssembled {
                name: "laplacian".into(),
                rows: laplacian.nrows(),
                nnz: laplacian.nnz(),
            },
        );

        let boundary_points = select_mat_rows(nodes.points(), &boundary);
        let normal_derivative = weight_matrix(
            &boundary_points,
            &all,
            &DifferentialOperator::directional(&normals),
            &self.params.boundary,
        )?;
        report(
            &self.progress_callback,
            ProgressMsg::OperatorAssembled {
                name: "normal_derivative".into(),
                rows: normal_derivative.nrows(),
                nnz: normal_derivative.nnz(),
            },
        );

        let ghost = GhostSystem::from_condition(
            &normal_derivative,
            num_physical,
            &boundary,
            &self.boundary_condition,
        )?;
        let context = WaveContext::new(
            num_interior,
            num_boundary,
            laplacian,
            ghost,
            self.params.wave_speed,
        )?;

        Ok(WaveSimulation {
            nodes,
            normals,
            ghosts,
            spacing,
            context,
            params: self.params,
            progress_callback: self.progress_callback,
        })
    }
}

/// Assembled wave problem: nodes, operators and integrator settings.
pub struct WaveSimulation {
    nodes: NodeSet,
    normals: Mat<f64>,
    ghosts: Mat<f64>,
    spacing: f64,
    context: WaveContext,
    params: WaveParams,
    progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl WaveSimulation {
    /// Generates `num_nodes` nodes in `domain` at build time.
    pub fn builder(domain: PolygonDomain, num_nodes: usize) -> WaveSimulationBuilder {
        WaveSimulationBuilder::new(NodeSource::Generate { domain, num_nodes })
    }

    /// Uses supplied nodes; `normals` holds one outward unit normal per
    /// boundary node, in the order the boundary nodes appear in `nodes`.
    pub fn from_nodes(nodes: NodeSet, normals: Mat<f64>) -> WaveSimulationBuilder {
        WaveSimulationBuilder::new(NodeSource::Given { nodes, normals })
    }

    /// Physical nodes, interior first.
    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    pub fn normals(&self) -> &Mat<f64> {
        &self.normals
    }

    pub fn ghost_nodes(&self) -> &Mat<f64> {
        &self.ghosts
    }

    /// Smallest distance between physical nodes.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn context(&self) -> &WaveContext {
        &self.context
    }

    pub fn params(&self) -> &WaveParams {
        &self.params
    }

    /// Stacks displacement and velocity into a state vector.
    pub fn initial_state(&self, u0: &[f64], v0: &[f64]) -> Result<Vec<f64>, WaveError> {
        let n = self.context.num_physical();
        for found in [u0.len(), v0.len()] {
            if found != n {
                return Err(WaveError::StateLength { expected: n, found });
            }
        }
        Ok(u0.iter().chain(v0).copied().collect())
    }

    /// `1 / (1 + (r / width)^4)` about `center` at every physical node.
    pub fn radial_bump(&self, center: [f64; 2], width: f64) -> Vec<f64> {
        let points = self.nodes.points();
        (0..points.nrows())
            .map(|i| {
                let r = ((points[(i, 0)] - center[0]).powi(2)
                    + (points[(i, 1)] - center[1]).powi(2))
                .sqrt();
                1.0 / (1.0 + (r / width).powi(4))
            })
            .collect()
    }

    /// Integrates from `times[0]` through every later time and records the
    /// displacement at each of them.
    pub fn run(&self, initial_state: &[f64], times: &[f64]) -> Result<WaveSolution, WaveError> {
        let expected = self.context.state_len();
        if initial_state.len() != expected {
            return Err(WaveError::StateLength {
                expected,
                found: initial_state.len(),
            });
        }
        let increasing = times.windows(2).all(|w| w[1] > w[0]);
        if times.is_empty() || !increasing || times.iter().any(|t| !t.is_finite()) {
            return Err(WaveError::InvalidTimes);
        }

        let n = self.context.num_physical();
        let (start, end) = (times[0], times[times.len() - 1]);
        let mut solver = Dopri5::new(self.params.integrator);
        let mut state = initial_state.to_vec();
        let mut displacements = Vec::with_capacity(times.len() - 1);
        let mut steps = 0;

        for w in times.windows(2) {
            let stats = solver.integrate(
                |t, y: &[f64], dy: &mut [f64]| self.context.evaluate_into(t, y, dy),
                w[0],
                w[1],
                &mut state,
            )?;
            steps += stats.steps();
            displacements.push(state[..n].to_vec());

            report(
                &self.progress_callback,
                ProgressMsg::IntegrationCheckpoint {
                    time: w[1],
                    steps,
                    progress: progress_from_time(w[1], start, end),
                },
            );
        }

        Ok(WaveSolution {
            times: times[1..].to_vec(),
            nodes: self.nodes.points().clone(),
            displacements,
        })
    }
}

const JSON_FORMAT_NAME: &str = "rbf_fd.wave_solution.json";
const JSON_VERSION: u32 = 1;

/// Borrowing envelope for saving.
#[derive(Serialize)]
struct JsonEnvelopeRef<'a, T: ?Sized> {
    format: &'static str,
    version: u32,
    #[serde(flatten)]
    solution: &'a T,
}

/// Owning envelope for loading.
#[derive(Deserialize)]
struct JsonEnvelopeOwned<T> {
    format: String,
    version: u32,
    #[serde(flatten)]
    solution: T,
}

type SolutionIOResult<T> = std::result::Result<T, SolutionIOError>;

/// Displacement snapshots of a wave simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveSolution {
    /// Output times, excluding the initial time.
    pub times: Vec<f64>,
    /// Physical node coordinates, one row per node.
    pub nodes: Mat<f64>,
    /// Displacement at every node for each output time.
    pub displacements: Vec<Vec<f64>>,
}

impl WaveSolution {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Displacement at output time `i`.
    pub fn snapshot(&self, i: usize) -> Option<&[f64]> {
        self.displacements.get(i).map(Vec::as_slice)
    }

    /// Saves to a versioned JSON envelope `{ format, version, ... }`.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> SolutionIOResult<()> {
        let path_ref = path.as_ref();
        let file = File::create(path_ref).map_err(|e| SolutionIOError::Create {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        let mut w = BufWriter::new(file);

        let env = JsonEnvelopeRef {
            format: JSON_FORMAT_NAME,
            version: JSON_VERSION,
            solution: self,
        };

        serde_json::to_writer(&mut w, &env).map_err(|e| SolutionIOError::Serialize {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        w.flush().map_err(|e| SolutionIOError::Flush {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Loads a solution written by [`WaveSolution::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> SolutionIOResult<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| SolutionIOError::Open {
            path: path_ref.to_path_buf(),
            source: e,
        })?;

        let env: JsonEnvelopeOwned<Self> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SolutionIOError::Parse {
                path: path_ref.to_path_buf(),
                source: e,
            })?;

        if env.format != JSON_FORMAT_NAME {
            return Err(SolutionIOError::FormatMismatch {
                path: path_ref.to_path_buf(),
                found: env.format,
                expected: JSON_FORMAT_NAME,
            });
        }
        if env.version != JSON_VERSION {
            return Err(SolutionIOError::VersionMismatch {
                path: path_ref.to_path_buf(),
                found: env.version,
                expected: JSON_VERSION,
            });
        }

        Ok(env.solution)
    }

    /// Writes one `X,Y,U` table per output time as `<dir>/<stem>_<i>.csv`
    /// and returns the paths.
    pub fn write_csv<P: AsRef<Path>>(&self, dir: P, stem: &str) -> SolutionIOResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.len());
        for (i, u) in self.displacements.iter().enumerate() {
            let path = dir.as_ref().join(format!("{stem}_{i}.csv"));
            let csv_err = |e: csv::Error| SolutionIOError::Csv {
                path: path.clone(),
                source: e,
            };

            let mut wtr = Writer::from_path(&path).map_err(csv_err)?;
            wtr.write_record(["X", "Y", "U"]).map_err(csv_err)?;
            for (j, value) in u.iter().enumerate() {
                wtr.write_record(&[
                    self.nodes[(j, 0)].to_string(),
                    self.nodes[(j, 1)].to_string(),
                    value.to_string(),
                ])
                .map_err(csv_err)?;
            }
            wtr.flush().map_err(|e| SolutionIOError::Flush {
                path: path.clone(),
                source: e,
            })?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Errors raised while saving or loading a [`WaveSolution`].
#[derive(Debug)]
pub enum SolutionIOError {
    /// Failed to create the target file.
    Create { path: PathBuf, source: io::Error },
    /// Failed to open an existing file for reading.
    Open { path: PathBuf, source: io::Error },
    /// Failed to flush buffered output.
    Flush { path: PathBuf, source: io::Error },
    /// Error serializing the solution to JSON.
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Error parsing JSON from disk.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Error writing a CSV table.
    Csv { path: PathBuf, source: csv::Error },
    /// The JSON `format` field is not a wave solution.
    FormatMismatch {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },
    /// The JSON `version` field is not supported.
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

impl fmt::Display for SolutionIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolutionIOError::Create { path, source } => {
                write!(f, "creating {}: {}", path.display(), source)
            }
            SolutionIOError::Open { path, source } => {
                write!(f, "opening {}: {}", path.display(), source)
            }
            SolutionIOError::Flush { path, source } => {
                write!(f, "flushing {}: {}", path.display(), source)
            }
            SolutionIOError::Serialize { path, source } => {
                write!(f, "serializing JSON to {}: {}", path.display(), source)
            }
            SolutionIOError::Parse { path, source } => {
                write!(f, "parsing JSON in {}: {}", path.display(), source)
            }
            SolutionIOError::Csv { path, source } => {
                write!(f, "writing CSV {}: {}", path.display(), source)
            }
            SolutionIOError::FormatMismatch {
                path,
                found,
                expected,
            } => write!(
                f,
                "unsupported format {:?} (expected {:?}) in {}",
                found,
                expected,
                path.display()
            ),
            SolutionIOError::VersionMismatch {
                path,
                found,
                expected,
            } => write!(
                f,
                "unsupported version {} (expected {}) in {}",
                found,
                expected,
                path.display()
            ),
        }
    }
}

impl Error for SolutionIOError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SolutionIOError::Create { source, .. }
            | SolutionIOError::Open { source, .. }
            | SolutionIOError::Flush { source, .. } => Some(source),
            SolutionIOError::Serialize { source, .. } | SolutionIOError::Parse { source, .. } => {
                Some(source)
            }
            SolutionIOError::Csv { source, .. } => Some(source),
            SolutionIOError::FormatMismatch { .. } | SolutionIOError::VersionMismatch { .. } => {
                None
            }
        }
    }
}
