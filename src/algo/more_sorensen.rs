//! More-Sorensen method for the trust-region subproblem.
//!
//! Solves
//!
//! ```text
//! min v^T d + 0.5 d^T A d  s.t.  || d || <= radius
//! ```
//!
//! for symmetric `A` by finding a shift `sigma >= 0` such that `A + sigma I` is
//! positive definite and the solution `d` of `(A + sigma I) d = -v` lies on
//! the boundary (or `sigma = 0` and `d` is inside). The shift is updated by
//! Newton method applied to `1 / || d(sigma) || = 1 / radius`, which needs
//! only the Cholesky factor of the shifted matrix.
//!
//! # References
//!
//! \[1\] [Computing a Trust Region Step](https://epubs.siam.org/doi/10.1137/0904038)
//!
//! \[2\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)

use log::debug;
use nalgebra::{
    convert, Cholesky, ComplexField, DimName, Dyn, OMatrix, OVector, RealField as _, U1,
};
use thiserror::Error;

use crate::{core::RealField, linalg, linalg::LinalgError, options::NllsOptions};

/// Maximum number of attempts to find a positive definite shift.
const MAX_SHIFTS: u32 = 10;

/// Error returned from [`solve`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MoreSorensenError {
    /// Maximum number of iterations reached.
    #[error("maximum number of iterations reached")]
    MaxIts,
    /// Positive definite shift not found.
    #[error("too many shifts")]
    TooManyShifts,
    /// The shift stagnates.
    #[error("cannot make progress")]
    NoProgress,
    /// The step cannot be moved to the trust region boundary.
    #[error("boundary step does not exist")]
    FindBeta,
    /// Linear algebra routine failed.
    #[error("{0}")]
    Linalg(#[from] LinalgError),
}

/// Result of [`solve`].
#[derive(Debug, Clone, Copy)]
pub struct MsSolution<F> {
    /// Norm of the step.
    pub norm_d: F,
    /// The shift, i.e., the Lagrange multiplier of the constraint.
    pub sigma: F,
    /// Number of iterations.
    pub iterations: usize,
}

/// Preallocated buffers for [`solve`].
pub struct MoreSorensenWork<F: RealField> {
    a_shifted: OMatrix<F, Dyn, Dyn>,
    neg_v: OVector<F, Dyn>,
    q: OVector<F, Dyn>,
}

impl<F: RealField> MoreSorensenWork<F> {
    /// Allocates buffers for problem with `n` variables.
    pub fn new(n: usize) -> Self {
        Self {
            a_shifted: OMatrix::zeros_generic(Dyn(n), Dyn(n)),
            neg_v: OVector::zeros_generic(Dyn(n), U1::name()),
            q: OVector::zeros_generic(Dyn(n), U1::name()),
        }
    }
}

/// Solves the trust-region subproblem. The step is stored in `d`.
///
/// Relevant options are `more_sorensen_maxits`, `more_sorensen_shift`,
/// `more_sorensen_tiny` and `more_sorensen_tol`.
pub fn solve<F: RealField>(
    a: &OMatrix<F, Dyn, Dyn>,
    v: &OVector<F, Dyn>,
    radius: F,
    options: &NllsOptions<F>,
    work: &mut MoreSorensenWork<F>,
    d: &mut OVector<F, Dyn>,
) -> Result<MsSolution<F>, MoreSorensenError> {
    let MoreSorensenWork {
        a_shifted,
        neg_v,
        q,
    } = work;

    let maxits = options.more_sorensen_maxits();
    let shift = options.more_sorensen_shift();
    let tiny = options.more_sorensen_tiny();

    neg_v.copy_from(v);
    neg_v.neg_mut();

    // Leftmost eigenvector, computed only when needed.
    let mut y1 = None;

    let (mut sigma, mut chol) = match linalg::solve_spd(a, neg_v, d) {
        Some(chol) => (convert(0.0), chol),
        None => {
            let (ew_min, ev_min) = linalg::min_eig_symm(a)?;
            y1 = Some(ev_min);

            let mut sigma = -(ew_min - shift);
            let chol = get_pd_shift(a, neg_v, &mut sigma, shift, a_shifted, d)?;
            debug!(
                "matrix is not positive definite (min eigenvalue = {}), shift = {}",
                ew_min, sigma
            );
            (sigma, chol)
        }
    };

    let mut nd = d.norm();
    let eps = (options.more_sorensen_tol() * radius).max(tiny);
    let mut no_restarts = 0;

    for iteration in 1..=maxits {
        if nd <= radius + eps {
            // Inside the trust region. Either the unshifted solution is
            // interior or the step is on the boundary.
            if sigma.abs() < tiny || (nd - radius).abs() < eps {
                return Ok(MsSolution {
                    norm_d: nd,
                    sigma,
                    iterations: iteration,
                });
            }

            // Move the step to the boundary along the leftmost eigenvector.
            if y1.is_none() {
                y1 = Some(linalg::min_eig_symm(a)?.1);
            }
            if let Some(y1) = &y1 {
                let alpha = find_beta(d, y1, radius)?;
                d.axpy(alpha, y1, convert(1.0));
                debug!("move step to the boundary, alpha = {}", alpha);
            }

            return Ok(MsSolution {
                norm_d: d.norm(),
                sigma,
                iterations: iteration,
            });
        }

        // q = L^{-1} d
        q.copy_from(d);
        if !chol.l_dirty().solve_lower_triangular_mut(q) {
            return Err(LinalgError::NotPositiveDefinite.into());
        }
        let nq = q.norm();

        let sigma_shift = (nd / nq).powi(2) * ((nd - radius) / radius);

        chol = if sigma_shift.abs() < tiny * sigma.abs() {
            if no_restarts < 1 {
                // Find a new positive definite shift.
                let chol = get_pd_shift(a, neg_v, &mut sigma, shift, a_shifted, d)?;
                no_restarts += 1;
                debug!("shift stagnates, restarting with sigma = {}", sigma);
                chol
            } else {
                debug!("shift stagnates at sigma = {}", sigma);
                return Err(MoreSorensenError::NoProgress);
            }
        } else {
            sigma += sigma_shift;
            linalg::shift_matrix(a, sigma, a_shifted);
            linalg::solve_spd(a_shifted, neg_v, d).ok_or(LinalgError::NotPositiveDefinite)?
        };

        nd = d.norm();
    }

    debug!("More-Sorensen did not converge in {} iterations", maxits);
    Err(MoreSorensenError::MaxIts)
}

/// Increases `sigma` until `A + sigma I` is positive definite and solves the
/// shifted system.
fn get_pd_shift<F: RealField>(
    a: &OMatrix<F, Dyn, Dyn>,
    neg_v: &OVector<F, Dyn>,
    sigma: &mut F,
    shift: F,
    a_shifted: &mut OMatrix<F, Dyn, Dyn>,
    d: &mut OVector<F, Dyn>,
) -> Result<Cholesky<F, Dyn>, MoreSorensenError> {
    let ten: F = convert(10.0);
    let mut no_shifts = 0;

    loop {
        linalg::shift_matrix(a, *sigma, a_shifted);

        match linalg::solve_spd(a_shifted, neg_v, d) {
            Some(chol) => return Ok(chol),
            None => {
                no_shifts += 1;
                if no_shifts == MAX_SHIFTS {
                    return Err(MoreSorensenError::TooManyShifts);
                }
                *sigma += ten.powi(no_shifts as i32) * shift;
            }
        }
    }
}

/// Finds `beta` such that `|| a + beta b || = radius`, taking the larger of
/// the two solutions.
pub fn find_beta<F: RealField>(
    a: &OVector<F, Dyn>,
    b: &OVector<F, Dyn>,
    radius: F,
) -> Result<F, MoreSorensenError> {
    let zero: F = convert(0.0);

    let c = a.dot(b);
    let nrm2_a = a.norm_squared();
    let nrm2_b = b.norm_squared();
    let gap = radius * radius - nrm2_a;

    let discrim = c * c + nrm2_b * gap;
    if discrim < zero {
        return Err(MoreSorensenError::FindBeta);
    }

    // Avoid cancellation in the quadratic formula.
    let beta = if c <= zero {
        (-c + discrim.sqrt()) / nrm2_b
    } else {
        gap / (c + discrim.sqrt())
    };

    if beta.is_finite() {
        Ok(beta)
    } else {
        Err(MoreSorensenError::FindBeta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector, DVector};

    use crate::{
        error::NllsError,
        testing::{random_spd, random_symmetric, random_vector},
    };

    fn check_optimality(
        a: &OMatrix<f64, Dyn, Dyn>,
        v: &OVector<f64, Dyn>,
        radius: f64,
        d: &OVector<f64, Dyn>,
        sol: &MsSolution<f64>,
        options: &NllsOptions<f64>,
    ) {
        let eps = (options.more_sorensen_tol() * radius).max(options.more_sorensen_tiny());

        assert!(sol.sigma >= 0.0);
        assert_relative_eq!(sol.norm_d, d.norm(), epsilon = 1e-12);

        // Interior or boundary.
        if sol.sigma.abs() < options.more_sorensen_tiny() {
            assert!(sol.norm_d <= radius + eps);
        } else {
            assert!((sol.norm_d - radius).abs() <= eps);
        }

        // Stationarity (A + sigma I) d = -v.
        let mut residual = a * d + d * sol.sigma;
        residual += v;
        assert!(
            residual.norm() <= 1e-6 * (1.0 + v.norm()),
            "residual = {}",
            residual.norm()
        );

        // Complementarity.
        assert!((sol.sigma * (sol.norm_d - radius)).abs() <= sol.sigma * eps + 1e-10);
    }

    #[test]
    fn positive_definite_interior() {
        let a = dmatrix![4.0, 1.0; 1.0, 3.0];
        let v = dvector![1.0, 2.0];
        let options = NllsOptions::default();
        let mut work = MoreSorensenWork::new(2);
        let mut d = DVector::zeros(2);

        let sol = solve(&a, &v, 10.0, &options, &mut work, &mut d).unwrap();

        assert_eq!(sol.sigma, 0.0);
        assert_relative_eq!(&a * &d, -&v, epsilon = 1e-12);
    }

    #[test]
    fn positive_definite_boundary() {
        let a = dmatrix![4.0, 1.0; 1.0, 3.0];
        let v = dvector![1.0, 2.0];
        let options = NllsOptions::default();
        let mut work = MoreSorensenWork::new(2);
        let mut d = DVector::zeros(2);

        let sol = solve(&a, &v, 0.1, &options, &mut work, &mut d).unwrap();

        assert!(sol.sigma > 0.0);
        check_optimality(&a, &v, 0.1, &d, &sol, &options);
    }

    #[test]
    fn random_positive_definite() {
        let options = NllsOptions::default();

        for seed in 0..10 {
            let n = 6;
            let a = random_spd(n, seed);
            let v = random_vector(n, seed + 1000);
            let mut work = MoreSorensenWork::new(n);
            let mut d = DVector::zeros(n);

            for radius in [0.01, 0.5, 100.0] {
                let sol = solve(&a, &v, radius, &options, &mut work, &mut d).unwrap();
                check_optimality(&a, &v, radius, &d, &sol, &options);
            }
        }
    }

    #[test]
    fn random_indefinite() {
        let options = NllsOptions::default();

        for seed in 0..10 {
            let n = 6;
            let a = random_symmetric(n, seed);
            let v = random_vector(n, seed + 1000);
            let mut work = MoreSorensenWork::new(n);
            let mut d = DVector::zeros(n);

            for radius in [0.1, 1.0, 10.0] {
                let sol = solve(&a, &v, radius, &options, &mut work, &mut d).unwrap();
                check_optimality(&a, &v, radius, &d, &sol, &options);
            }
        }
    }

    #[test]
    fn maximum_iterations() {
        let a = dmatrix![1.0, 0.0; 0.0, 1.0];
        let v = dvector![-3.0, -4.0];
        let mut options = NllsOptions::default();
        options.set_more_sorensen_maxits(1);
        let mut work = MoreSorensenWork::new(2);
        let mut d = DVector::zeros(2);

        // The unshifted step has norm 5 and one shift update is not enough.
        let error = solve(&a, &v, 1.0, &options, &mut work, &mut d).unwrap_err();

        assert_eq!(error, MoreSorensenError::MaxIts);
        assert_eq!(NllsError::from(error).status().code(), -301);
    }

    #[test]
    fn too_many_shifts() {
        // The shift increments are below the precision of the magnitude of the
        // matrix, so that the shifted matrix remains singular.
        let a = dmatrix![-1e20];
        let v = dvector![1.0];
        let options = NllsOptions::default();
        let mut work = MoreSorensenWork::new(1);
        let mut d = DVector::zeros(1);

        let error = solve(&a, &v, 1.0, &options, &mut work, &mut d).unwrap_err();

        assert_eq!(error, MoreSorensenError::TooManyShifts);
        assert_eq!(NllsError::from(error).status().code(), -302);
    }

    #[test]
    fn no_progress() {
        // The shift is exactly one unit in the last place of 1e20 and the
        // Newton corrections are too small relative to it to be applied.
        let a = dmatrix![-1e20];
        let v = dvector![1.0];
        let mut options = NllsOptions::default();
        options.set_more_sorensen_shift(16384.0);
        let mut work = MoreSorensenWork::new(1);
        let mut d = DVector::zeros(1);

        let error = solve(&a, &v, 1e-5, &options, &mut work, &mut d).unwrap_err();

        assert_eq!(error, MoreSorensenError::NoProgress);
        assert_eq!(NllsError::from(error).status().code(), -303);
    }

    #[test]
    fn boundary_step() {
        let a = dvector![3.0, 0.0];
        let b = dvector![0.0, 1.0];

        let beta = find_beta(&a, &b, 5.0).unwrap();
        assert_relative_eq!(beta, 4.0, epsilon = 1e-12);

        let a = dvector![1.0, 1.0];
        let b = dvector![1.0, 1.0];

        let beta = find_beta(&a, &b, 2.0_f64.sqrt() * 3.0).unwrap();
        assert_relative_eq!((&a + &b * beta).norm(), 2.0_f64.sqrt() * 3.0, epsilon = 1e-12);
    }

    #[test]
    fn boundary_step_does_not_exist() {
        let a = dvector![3.0, 0.0];
        let b = dvector![1.0, 0.0];

        // Zero direction cannot reach the boundary from outside.
        assert_eq!(
            find_beta(&a, &dvector![0.0, 0.0], 1.0),
            Err(MoreSorensenError::FindBeta)
        );
        assert!(find_beta(&a, &b, 1.0).is_ok());
    }
}
