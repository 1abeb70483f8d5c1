//! Dense linear algebra needed by the solver.
//!
//! Thin layer over [`nalgebra`] decompositions that adds the checks the
//! solver relies on (e.g., Cholesky factorization of a singular matrix is
//! reported as a failure) and bounds the number of iterations of the
//! iterative decompositions.

use nalgebra::{
    convert, storage::Storage, Cholesky, ComplexField, Dyn, OMatrix, OVector, RealField as _,
    SymmetricEigen, Vector, SVD,
};
use thiserror::Error;

use crate::core::RealField;

/// Error returned from decompositions that can fail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LinalgError {
    /// Symmetric eigendecomposition did not converge.
    #[error("symmetric eigendecomposition did not converge")]
    EigenNoConvergence,
    /// Singular value decomposition did not converge.
    #[error("singular value decomposition did not converge")]
    SvdNoConvergence,
    /// The matrix is not positive definite.
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,
}

impl LinalgError {
    /// Name of the routine that failed.
    pub fn name(&self) -> &'static str {
        match self {
            LinalgError::EigenNoConvergence => "all_eig_symm",
            LinalgError::SvdNoConvergence => "get_svd_j",
            LinalgError::NotPositiveDefinite => "solve_spd",
        }
    }

    /// Nonzero code of the failure.
    pub fn code(&self) -> i32 {
        match self {
            LinalgError::EigenNoConvergence => 1,
            LinalgError::SvdNoConvergence => 2,
            LinalgError::NotPositiveDefinite => 3,
        }
    }
}

fn max_sweeps(n: usize) -> usize {
    1000.max(30 * n)
}

/// Computes `out = J x`.
pub fn mult_j<F, Sx>(
    jac: &OMatrix<F, Dyn, Dyn>,
    x: &Vector<F, Dyn, Sx>,
    out: &mut OVector<F, Dyn>,
) where
    F: RealField,
    Sx: Storage<F, Dyn>,
{
    jac.mul_to(x, out);
}

/// Computes `out = J^T x`.
pub fn mult_jt<F, Sx>(
    jac: &OMatrix<F, Dyn, Dyn>,
    x: &Vector<F, Dyn, Sx>,
    out: &mut OVector<F, Dyn>,
) where
    F: RealField,
    Sx: Storage<F, Dyn>,
{
    jac.tr_mul_to(x, out);
}

/// Computes `out = J^T J`.
pub fn matmult_inner<F: RealField>(jac: &OMatrix<F, Dyn, Dyn>, out: &mut OMatrix<F, Dyn, Dyn>) {
    jac.tr_mul_to(jac, out);
}

/// Computes `out = A + sigma I`.
pub fn shift_matrix<F: RealField>(
    a: &OMatrix<F, Dyn, Dyn>,
    sigma: F,
    out: &mut OMatrix<F, Dyn, Dyn>,
) {
    out.copy_from(a);
    for i in 0..a.nrows() {
        out[(i, i)] += sigma;
    }
}

/// Computes `A += alpha x y^T`.
pub fn outer_product_update<F: RealField>(
    a: &mut OMatrix<F, Dyn, Dyn>,
    alpha: F,
    x: &OVector<F, Dyn>,
    y: &OVector<F, Dyn>,
) {
    a.ger(alpha, x, y, convert(1.0));
}

/// Solves `A x = b` for symmetric positive definite `A` by Cholesky
/// factorization.
///
/// Returns the factorization on success, which can be reused for solving
/// triangular systems with the factor. Returns `None` if `A` is not
/// (numerically) positive definite, in which case `x` is left unchanged.
pub fn solve_spd<F: RealField>(
    a: &OMatrix<F, Dyn, Dyn>,
    b: &OVector<F, Dyn>,
    x: &mut OVector<F, Dyn>,
) -> Option<Cholesky<F, Dyn>> {
    let zero: F = convert(0.0);

    let chol = Cholesky::new(a.clone_owned())?;

    // The factorization does not fail on a zero pivot, which would lead to
    // infinities in the solution.
    let is_pd = chol
        .l_dirty()
        .diagonal()
        .iter()
        .all(|lii| lii.is_finite() && *lii > zero);

    if !is_pd {
        return None;
    }

    x.copy_from(b);
    chol.solve_mut(x);
    Some(chol)
}

/// Computes all eigenvalues and eigenvectors of a symmetric matrix.
///
/// The eigenvalues are not sorted.
pub fn all_eig_symm<F: RealField>(
    a: &OMatrix<F, Dyn, Dyn>,
) -> Result<SymmetricEigen<F, Dyn>, LinalgError> {
    SymmetricEigen::try_new(a.clone_owned(), F::EPSILON, max_sweeps(a.nrows()))
        .ok_or(LinalgError::EigenNoConvergence)
}

/// Computes the smallest eigenvalue of a symmetric matrix and the
/// corresponding (unit) eigenvector.
pub fn min_eig_symm<F: RealField>(
    a: &OMatrix<F, Dyn, Dyn>,
) -> Result<(F, OVector<F, Dyn>), LinalgError> {
    let eig = all_eig_symm(a)?;

    let (imin, min) = eig
        .eigenvalues
        .iter()
        .copied()
        .enumerate()
        .fold((0, eig.eigenvalues[0]), |(imin, min), (i, ew)| {
            if ew < min {
                (i, ew)
            } else {
                (imin, min)
            }
        });

    Ok((min, eig.eigenvectors.column(imin).clone_owned()))
}

/// Computes the largest and the smallest singular value of a matrix.
pub fn svd_extremes<F: RealField>(jac: &OMatrix<F, Dyn, Dyn>) -> Result<(F, F), LinalgError> {
    let svd = SVD::try_new(
        jac.clone_owned(),
        false,
        false,
        F::EPSILON,
        max_sweeps(jac.ncols()),
    )
    .ok_or(LinalgError::SvdNoConvergence)?;

    let s = &svd.singular_values;
    Ok((s.max(), s.min()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn spd_solve() {
        let a = dmatrix![4.0, 1.0; 1.0, 3.0];
        let b = dvector![1.0, 2.0];
        let mut x = dvector![0.0, 0.0];

        assert!(solve_spd(&a, &b, &mut x).is_some());
        assert_relative_eq!(&a * &x, b, epsilon = 1e-12);
    }

    #[test]
    fn spd_solve_rejects_indefinite() {
        let a = dmatrix![1.0, 2.0; 2.0, 1.0];
        let b = dvector![1.0, 2.0];
        let mut x = dvector![7.0, 7.0];

        assert!(solve_spd(&a, &b, &mut x).is_none());
        assert_eq!(x, dvector![7.0, 7.0]);
    }

    #[test]
    fn spd_solve_rejects_singular() {
        let a = dmatrix![1.0, 1.0; 1.0, 1.0];
        let b = dvector![1.0, 2.0];
        let mut x = dvector![0.0, 0.0];

        assert!(solve_spd(&a, &b, &mut x).is_none());
    }

    #[test]
    fn smallest_eigenpair() {
        let a = dmatrix![2.0f64, 0.0, 0.0; 0.0, -3.0, 0.0; 0.0, 0.0, 5.0];
        let (ew, ev) = min_eig_symm(&a).unwrap();

        assert_relative_eq!(ew, -3.0, epsilon = 1e-12);
        assert_relative_eq!(ev[1].abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(&a * &ev, &ev * ew, epsilon = 1e-12);
    }

    #[test]
    fn rank_one_outer_product() {
        let mut a = dmatrix![1.0, 0.0; 0.0, 1.0];
        outer_product_update(&mut a, 2.0, &dvector![1.0, 2.0], &dvector![3.0, 4.0]);

        assert_eq!(a, dmatrix![7.0, 8.0; 12.0, 17.0]);
    }

    #[test]
    fn singular_values() {
        let jac = dmatrix![3.0, 0.0; 0.0, 0.5; 0.0, 0.0];
        let (s1, sn) = svd_extremes(&jac).unwrap();

        assert_relative_eq!(s1, 3.0, epsilon = 1e-12);
        assert_relative_eq!(sn, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn shifted_matrix() {
        let a = dmatrix![1.0, 2.0; 2.0, 1.0];
        let mut out = a.clone();
        shift_matrix(&a, 0.5, &mut out);

        assert_eq!(out, dmatrix![1.5, 2.0; 2.0, 1.5]);
    }
}
