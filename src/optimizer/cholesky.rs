//! Sparse Cholesky solve of the damped normal equations
//!
//! Solves `(J^T W J + lambda I) dx = -J^T W r` with faer's sparse LLT. The
//! damped system is positive definite for any `lambda > 0`, so the Cholesky
//! path suffices; a factorization failure is reported as `None` and handled
//! by the caller through damping adaptation.

use std::ops::Mul;

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers;
use faer::sparse::{SparseColMat, Triplet};
use faer::Mat;

/// Thin wrapper over faer's sparse LLT for the augmented system.
#[derive(Debug, Default, Clone)]
pub struct SparseCholeskySolver;

impl SparseCholeskySolver {
    pub fn new() -> Self {
        SparseCholeskySolver
    }

    /// Solve `(J^T W J + lambda I) dx = -J^T W r`.
    ///
    /// `weights` is the diagonal of W, one entry per residual row. Returns
    /// `None` when the factorization fails.
    pub fn solve_augmented_equation(
        &self,
        residuals: &Mat<f64>,
        jacobian: &SparseColMat<usize, f64>,
        weights: &Mat<f64>,
        lambda: f64,
    ) -> Option<Mat<f64>> {
        let m = jacobian.nrows();
        let n = jacobian.ncols();

        let mut w_triplets = Vec::with_capacity(m);
        for i in 0..m {
            w_triplets.push(Triplet::new(i, i, weights[(i, 0)]));
        }
        let weights_diag = SparseColMat::try_new_from_triplets(m, m, &w_triplets).ok()?;

        // H = J^T * W * J
        let hessian = jacobian
            .as_ref()
            .transpose()
            .to_col_major()
            .ok()?
            .mul(weights_diag.as_ref().mul(jacobian.as_ref()));

        // g = J^T * W * -r
        let gradient = jacobian
            .as_ref()
            .transpose()
            .mul(weights_diag.as_ref().mul(-residuals));

        // H_aug = H + lambda * I
        let mut lambda_triplets = Vec::with_capacity(n);
        for i in 0..n {
            lambda_triplets.push(Triplet::new(i, i, lambda));
        }
        let lambda_i = SparseColMat::try_new_from_triplets(n, n, &lambda_triplets).ok()?;
        let augmented_hessian = hessian + lambda_i;

        // the sparsity of the damped Hessian changes with the graph, so the
        // symbolic analysis is redone per solve
        let symbolic =
            solvers::SymbolicLlt::try_new(augmented_hessian.symbolic(), faer::Side::Lower).ok()?;
        match solvers::Llt::try_new_with_symbolic(
            symbolic,
            augmented_hessian.as_ref(),
            faer::Side::Lower,
        ) {
            Ok(cholesky) => Some(cholesky.solve(gradient)),
            Err(_) => None,
        }
    }
}
