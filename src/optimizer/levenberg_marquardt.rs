//! Levenberg-Marquardt driver over the factor graph
//!
//! Residuals and central-difference Jacobians are evaluated per edge (in
//! parallel), assembled into a sparse system and solved through the damped
//! normal equations. Steps that increase the weighted cost are rolled back
//! and the damping is raised; accepted steps lower it.
//!
//! Fixed vertices (band endpoints, the approach target) receive no columns,
//! so the solver can never move them.

use std::collections::HashMap;

use faer::sparse::{SparseColMat, Triplet};
use faer::Mat;
use faer_ext::IntoFaer;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::graph::{BandState, BandStateMut, Graph, VertexKind, VertexRef};
use crate::optimizer::{OptimizationStatus, SolveSummary, SparseCholeskySolver};

/// Step size of the central-difference Jacobian.
const JACOBIAN_DELTA: f64 = 1e-6;

/// Tuning knobs of the inner solver.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtConfig {
    /// Maximum iterations per solve
    pub max_iterations: usize,
    /// Stop when an accepted step changes the cost by less than this
    pub cost_tolerance: f64,
    /// Initial damping parameter
    pub initial_damping: f64,
    pub damping_min: f64,
    pub damping_max: f64,
    /// Multiplier applied after a rejected step
    pub damping_increase_factor: f64,
    /// Multiplier applied after an accepted step
    pub damping_decrease_factor: f64,
    /// Emit per-iteration debug output
    pub verbose: bool,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            cost_tolerance: 1e-6,
            initial_damping: 1e-4,
            damping_min: 1e-12,
            damping_max: 1e12,
            damping_increase_factor: 10.0,
            damping_decrease_factor: 1.0 / 3.0,
            verbose: false,
        }
    }
}

/// View of the band state with one variable perturbed; used for numeric
/// differentiation without mutating the underlying bands.
struct Perturbed<'a, S: ?Sized> {
    base: &'a S,
    target: VertexRef,
    delta: [f64; 3],
}

impl<S: BandState + ?Sized> BandState for Perturbed<'_, S> {
    fn pose(&self, vref: VertexRef) -> crate::se2::PoseSE2 {
        let mut pose = self.base.pose(vref);
        if vref == self.target {
            pose.plus(self.delta[0], self.delta[1], self.delta[2]);
        }
        pose
    }

    fn time_diff(&self, vref: VertexRef) -> f64 {
        let dt = self.base.time_diff(vref);
        if vref == self.target {
            dt + self.delta[0]
        } else {
            dt
        }
    }
}

/// Column layout of the free variables.
struct Layout {
    /// (vertex, first column, tangent dimension) in registration order
    free: Vec<(VertexRef, usize, usize)>,
    columns: HashMap<VertexRef, usize>,
    total_cols: usize,
}

/// Levenberg-Marquardt solver over one built graph.
pub struct LevenbergMarquardt {
    config: LevenbergMarquardtConfig,
    damping: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::with_config(LevenbergMarquardtConfig::default())
    }

    pub fn with_config(config: LevenbergMarquardtConfig) -> Self {
        let damping = config.initial_damping;
        Self { config, damping }
    }

    fn build_layout(graph: &Graph) -> Layout {
        let mut free = Vec::new();
        let mut columns = HashMap::new();
        let mut col = 0;
        for entry in graph.vertices() {
            if entry.fixed {
                continue;
            }
            let dim = entry.vref.dimension();
            free.push((entry.vref, col, dim));
            columns.insert(entry.vref, col);
            col += dim;
        }
        Layout {
            free,
            columns,
            total_cols: col,
        }
    }

    /// Stack all edge residuals at the current state.
    fn evaluate_residuals<S: BandState + Sync>(graph: &Graph, state: &S) -> DVector<f64> {
        let blocks: Vec<DVector<f64>> = graph
            .edges()
            .par_iter()
            .map(|edge| edge.residual(state))
            .collect();
        let total: usize = blocks.iter().map(|b| b.len()).sum();
        let mut stacked = DVector::zeros(total);
        let mut row = 0;
        for block in blocks {
            stacked.rows_mut(row, block.len()).copy_from(&block);
            row += block.len();
        }
        stacked
    }

    /// Central-difference Jacobian of one edge with respect to one variable.
    fn edge_jacobian_block<S: BandState + Sync>(
        edge: &crate::graph::Edge,
        state: &S,
        vref: VertexRef,
    ) -> DMatrix<f64> {
        let dim = vref.dimension();
        let rows = edge.dimension();
        let mut jacobian = DMatrix::zeros(rows, dim);
        for c in 0..dim {
            let mut delta = [0.0; 3];
            delta[c] = JACOBIAN_DELTA;
            let plus = edge.residual(&Perturbed {
                base: state,
                target: vref,
                delta,
            });
            delta[c] = -JACOBIAN_DELTA;
            let minus = edge.residual(&Perturbed {
                base: state,
                target: vref,
                delta,
            });
            for r in 0..rows {
                jacobian[(r, c)] = (plus[r] - minus[r]) / (2.0 * JACOBIAN_DELTA);
            }
        }
        jacobian
    }

    /// Residual vector and sparse Jacobian triplets over the free columns.
    fn linearize<S: BandState + Sync>(
        graph: &Graph,
        state: &S,
        layout: &Layout,
        row_offsets: &[usize],
        total_rows: usize,
    ) -> (DVector<f64>, Vec<Triplet<usize, usize, f64>>) {
        let per_edge: Vec<(DVector<f64>, Vec<(usize, DMatrix<f64>)>)> = graph
            .edges()
            .par_iter()
            .map(|edge| {
                let residual = edge.residual(state);
                let mut blocks = Vec::new();
                for vref in edge.vertices() {
                    if let Some(&col) = layout.columns.get(&vref) {
                        blocks.push((col, Self::edge_jacobian_block(edge, state, vref)));
                    }
                }
                (residual, blocks)
            })
            .collect();

        let mut residuals = DVector::zeros(total_rows);
        let mut triplets = Vec::new();
        for (edge_idx, (residual, blocks)) in per_edge.into_iter().enumerate() {
            let row0 = row_offsets[edge_idx];
            residuals.rows_mut(row0, residual.len()).copy_from(&residual);
            for (col0, jacobian) in blocks {
                for r in 0..jacobian.nrows() {
                    for c in 0..jacobian.ncols() {
                        let value = jacobian[(r, c)];
                        if value != 0.0 {
                            triplets.push(Triplet::new(row0 + r, col0 + c, value));
                        }
                    }
                }
            }
        }
        (residuals, triplets)
    }

    fn weighted_cost(residuals: &DVector<f64>, weights: &[f64]) -> f64 {
        residuals
            .iter()
            .zip(weights.iter())
            .map(|(r, w)| w * r * r)
            .sum()
    }

    fn apply_step<S: BandStateMut>(state: &mut S, layout: &Layout, step: &Mat<f64>, scale: f64) {
        for (vref, col, _) in &layout.free {
            match vref.kind {
                VertexKind::Pose => state.apply_pose_step(
                    *vref,
                    scale * step[(*col, 0)],
                    scale * step[(*col + 1, 0)],
                    scale * step[(*col + 2, 0)],
                ),
                VertexKind::TimeDiff => {
                    state.apply_time_diff_step(*vref, scale * step[(*col, 0)])
                }
            }
        }
    }

    /// Run up to `max_iterations` damped Gauss-Newton steps on `state`.
    ///
    /// Returns the solve summary; `iterations == 0` means the solver could
    /// not complete a single iteration and the caller must treat the solve
    /// as failed.
    pub fn optimize<S: BandStateMut + Sync>(&mut self, graph: &Graph, state: &mut S) -> SolveSummary {
        let layout = Self::build_layout(graph);
        if layout.total_cols == 0 || graph.num_edges() == 0 {
            return SolveSummary::empty();
        }

        let mut row_offsets = Vec::with_capacity(graph.num_edges());
        let mut weights = Vec::new();
        let mut total_rows = 0;
        for edge in graph.edges() {
            row_offsets.push(total_rows);
            total_rows += edge.dimension();
            weights.extend_from_slice(edge.information());
        }

        self.damping = self.config.initial_damping;
        let solver = SparseCholeskySolver::new();
        let weights_mat = Mat::from_fn(total_rows, 1, |i, _| weights[i]);

        let initial_residuals = Self::evaluate_residuals(graph, state);
        let mut current_cost = Self::weighted_cost(&initial_residuals, &weights);
        let initial_cost = current_cost;

        let mut iterations = 0;
        let mut accepted_steps = 0;
        let mut rejected_steps = 0;
        let mut status = OptimizationStatus::MaxIterationsReached;

        while iterations < self.config.max_iterations {
            let (residuals, triplets) =
                Self::linearize(graph, state, &layout, &row_offsets, total_rows);

            let jacobian = match SparseColMat::try_new_from_triplets(
                total_rows,
                layout.total_cols,
                &triplets,
            ) {
                Ok(j) => j,
                Err(_) => {
                    status = OptimizationStatus::SolverFailed;
                    break;
                }
            };

            let residuals_faer: Mat<f64> =
                residuals.view_range(.., ..).into_faer().to_owned();

            let step = match solver.solve_augmented_equation(
                &residuals_faer,
                &jacobian,
                &weights_mat,
                self.damping,
            ) {
                Some(step) => step,
                None => {
                    status = OptimizationStatus::SolverFailed;
                    break;
                }
            };

            Self::apply_step(state, &layout, &step, 1.0);
            let new_residuals = Self::evaluate_residuals(graph, state);
            let new_cost = Self::weighted_cost(&new_residuals, &weights);
            iterations += 1;

            if new_cost < current_cost {
                let reduction = current_cost - new_cost;
                current_cost = new_cost;
                accepted_steps += 1;
                self.damping =
                    (self.damping * self.config.damping_decrease_factor).max(self.config.damping_min);
                if self.config.verbose {
                    tracing::debug!(
                        iteration = iterations,
                        cost = new_cost,
                        reduction,
                        damping = self.damping,
                        "step accepted"
                    );
                }
                if reduction < self.config.cost_tolerance {
                    status = OptimizationStatus::Converged;
                    break;
                }
            } else {
                Self::apply_step(state, &layout, &step, -1.0);
                rejected_steps += 1;
                self.damping =
                    (self.damping * self.config.damping_increase_factor).min(self.config.damping_max);
                if self.config.verbose {
                    tracing::debug!(
                        iteration = iterations,
                        cost = new_cost,
                        damping = self.damping,
                        "step rejected"
                    );
                }
                if self.damping >= self.config.damping_max {
                    status = OptimizationStatus::Converged;
                    break;
                }
            }
        }

        SolveSummary {
            initial_cost,
            final_cost: current_cost,
            iterations,
            accepted_steps,
            rejected_steps,
            final_damping: self.damping,
            status,
        }
    }
}
