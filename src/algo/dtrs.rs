//! Trust-region subproblem with diagonal Hessian.
//!
//! Solves
//!
//! ```text
//! min f + c^T x + 0.5 x^T H x  s.t.  || x || <= radius  (or = radius)
//! ```
//!
//! where `H` is diagonal. The solution satisfies `(H + lambda I) x = -c` for
//! a multiplier `lambda >= max(0, -min H_i)`. The multiplier is found by
//! solving the secular equation `|| x(lambda) || = radius` using Newton method
//! on `1 / || x(lambda) ||` accelerated by Taylor models of
//! `|| x(lambda) ||^beta` for other values of beta. The so-called hard case,
//! when `c` is orthogonal to the eigenspace of the leftmost eigenvalue of `H`,
//! is detected and resolved explicitly.
//!
//! A general symmetric subproblem is reduced to the diagonal one by the
//! eigendecomposition of its matrix in [`solve_eig`].
//!
//! # References
//!
//! \[1\] [Solving the Trust-Region Subproblem using the Lanczos
//! Method](https://epubs.siam.org/doi/10.1137/S1052623497322735)
//!
//! \[2\] [Trust Region Methods](https://epubs.siam.org/doi/book/10.1137/1.9780898719857)

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{
    convert, ComplexField, DimName, Dyn, OMatrix, OVector, RealField as _, SymmetricEigen, U1,
};
use thiserror::Error;

use crate::{core::RealField, error::NllsError, linalg, roots};

/// Options for [`solve`].
#[derive(Debug, Clone, Copy, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct DtrsControl<F: RealField> {
    /// Relative tolerance on `|| x || - radius` for a boundary solution.
    /// Default: `EPSILON^0.75`.
    stop_normal: F,
    /// Absolute tolerance on `|| x || - radius` for a boundary solution.
    /// Default: `EPSILON^0.75`.
    stop_absolute_normal: F,
    /// Maximal degree of Taylor models used to accelerate Newton iteration.
    /// Value 1 means pure Newton. Default: `3`.
    taylor_max_degree: usize,
    /// Solve the problem with constraint `|| x || = radius`. Default: `false`.
    equality_problem: bool,
    /// Maximum number of iterations of the secular equation solver.
    /// Default: `100`.
    max_iterations: usize,
    /// Entries of `H` and `c` smaller than this (relative to the largest
    /// entry) are treated as zeros. Default: `EPSILON`.
    h_min: F,
}

impl<F: RealField> Default for DtrsControl<F> {
    fn default() -> Self {
        let stop: F = F::EPSILON.powf(convert(0.75));

        Self {
            stop_normal: stop,
            stop_absolute_normal: stop,
            taylor_max_degree: 3,
            equality_problem: false,
            max_iterations: 100,
            h_min: F::EPSILON,
        }
    }
}

/// Solution of the diagonal subproblem.
#[derive(Debug, Clone)]
pub struct DtrsSolution<F: RealField> {
    /// The minimizer.
    pub x: OVector<F, Dyn>,
    /// Norm of the minimizer.
    pub x_norm: F,
    /// The Lagrange multiplier of the constraint.
    pub multiplier: F,
    /// Value of the objective at the minimizer.
    pub obj: F,
    /// Whether the hard case was encountered.
    pub hard_case: bool,
    /// Number of iterations of the secular equation solver.
    pub iterations: usize,
}

/// Error returned from [`solve`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DtrsError {
    /// The radius is not positive or the dimensions do not match.
    #[error("invalid arguments")]
    BadArguments,
    /// The interval of possible multipliers collapsed.
    #[error("problem is ill-conditioned")]
    IllConditioned,
    /// Maximum number of iterations reached.
    #[error("maximum number of iterations reached")]
    MaxIterations,
}

impl DtrsError {
    /// Numeric code of the error.
    pub fn code(&self) -> i32 {
        match self {
            DtrsError::BadArguments => -3,
            DtrsError::IllConditioned => -16,
            DtrsError::MaxIterations => -18,
        }
    }
}

/// Solves the diagonal trust-region subproblem.
///
/// `h` are the diagonal entries of the Hessian and `c` is the linear term.
pub fn solve<F: RealField>(
    radius: F,
    f: F,
    c: &OVector<F, Dyn>,
    h: &OVector<F, Dyn>,
    control: &DtrsControl<F>,
) -> Result<DtrsSolution<F>, DtrsError> {
    let zero: F = convert(0.0);
    let one: F = convert(1.0);

    if c.len() != h.len() || !(radius > zero) {
        return Err(DtrsError::BadArguments);
    }

    // Scale the problem so that the largest entries of H and c have unit
    // magnitude. Negligible entries are replaced by zeros.
    let h_min = control.h_min;
    let largest = |w: &OVector<F, Dyn>| {
        let largest = w.iter().fold(zero, |acc, wi| acc.max(wi.abs()));
        if largest > zero {
            largest
        } else {
            one
        }
    };
    let snap = |w: &OVector<F, Dyn>, scale: F| {
        w.map(|wi| {
            if wi.abs() < h_min * scale {
                zero
            } else {
                wi / scale
            }
        })
    };

    let scale_h = largest(h);
    let scale_c = largest(c);

    let h_scaled = snap(h, scale_h);
    let c_scaled = snap(c, scale_c);

    let radius_scaled = (scale_h / scale_c) * radius;
    let f_scaled = (scale_h / (scale_c * scale_c)) * f;

    let mut solution = solve_main(radius_scaled, f_scaled, &c_scaled, &h_scaled, control)?;

    // Unscale the solution.
    let x_factor = scale_c / scale_h;
    solution.x *= x_factor;
    solution.x_norm *= x_factor;
    solution.obj *= scale_c * scale_c / scale_h;
    solution.multiplier *= scale_h;

    Ok(solution)
}

fn solve_main<F: RealField>(
    radius: F,
    f: F,
    c: &OVector<F, Dyn>,
    h: &OVector<F, Dyn>,
    control: &DtrsControl<F>,
) -> Result<DtrsSolution<F>, DtrsError> {
    let zero: F = convert(0.0);
    let one: F = convert(1.0);
    let half: F = convert(0.5);

    let n = h.len();
    let equality = control.equality_problem;

    let mut x = OVector::zeros_generic(Dyn(n), U1::name());

    let finish = |x: OVector<F, Dyn>, lambda: F, hard_case: bool, iterations: usize| {
        let x_norm = x.norm();
        let obj = f + half * (c.dot(&x) - lambda * x_norm * x_norm);
        DtrsSolution {
            x,
            x_norm,
            multiplier: lambda,
            obj,
            hard_case,
            iterations,
        }
    };

    if n == 0 {
        return Ok(finish(x, zero, false, 0));
    }

    let c_norm = c.norm();
    let (lambda_min, lambda_max) = h
        .iter()
        .fold((h[0], h[0]), |(lo, up), &hi| (lo.min(hi), up.max(hi)));

    // Trivial case: no linear term and positive semidefinite Hessian.
    if c_norm == zero && lambda_min >= zero {
        if equality {
            // Move to the boundary along the leftmost eigenvector.
            let i_hard = h.iter().position(|hi| *hi == lambda_min).unwrap_or(0);
            x[i_hard] = radius;
            return Ok(finish(x, -lambda_min, false, 0));
        } else {
            return Ok(finish(x, zero, false, 0));
        }
    }

    // Bracket the multiplier.
    let (mut lambda_l, mut lambda_u) = if equality {
        (
            (-lambda_min).max(c_norm / radius - lambda_max),
            c_norm / radius - lambda_min,
        )
    } else {
        (
            zero.max(-lambda_min).max(c_norm / radius - lambda_max),
            zero.max(c_norm / radius - lambda_min),
        )
    };

    let mut lambda = lambda_l;

    if lambda == -lambda_min {
        // Check for the hard case. That is when c has no component in the
        // subspace of eigenvectors corresponding to the leftmost eigenvalue.
        let mut c2 = zero;
        let mut i_hard = 0;
        let mut hard_case = true;

        for i in 0..n {
            if h[i] == lambda_min {
                if c[i].abs() > F::EPSILON * c_norm {
                    hard_case = false;
                    c2 += c[i] * c[i];
                } else {
                    i_hard = i;
                }
            }
        }

        if hard_case {
            for i in 0..n {
                x[i] = if h[i] != lambda_min {
                    -c[i] / (h[i] + lambda)
                } else {
                    zero
                };
            }
            let x_norm = x.norm();

            if x_norm <= radius {
                if x_norm < radius {
                    // Reach the boundary by moving along the leftmost
                    // eigenvector, taking the smaller of the two possible
                    // steps.
                    let utx = x[i_hard] / radius;
                    let distx = (radius - x_norm) * ((radius + x_norm) / radius);
                    let alpha = (distx / (utx.abs() + (utx * utx + distx / radius).sqrt()))
                        .copysign(if utx < zero { -one } else { one });
                    x[i_hard] += alpha;
                }

                debug!(
                    "hard case, lambda = {}, moving along e_{} to the boundary",
                    lambda, i_hard
                );
                return Ok(finish(x, lambda, true, 0));
            }

            // The hard case does not apply, the step is too long. Take the
            // Newton step for || x(lambda) ||^2 = radius^2 which is safe from
            // the left.
            let mut w_norm2 = zero;
            for i in 0..n {
                if h[i] != lambda_min {
                    let hi_lambda = h[i] + lambda;
                    w_norm2 += c[i] * c[i] / (hi_lambda * hi_lambda * hi_lambda);
                }
            }
            lambda += (x_norm * x_norm - radius * radius) / (convert::<_, F>(2.0) * w_norm2);
            lambda_l = lambda_l.max(lambda);
        } else {
            // The leftmost coordinates alone require at least this much to fit
            // into the trust region.
            lambda += (c2.sqrt() / radius).max(lambda.abs() * F::EPSILON);
            lambda_l = lambda_l.max(lambda);
        }
    }

    let tol = (control.stop_normal * radius).max(control.stop_absolute_normal);
    let roots_tol = F::EPSILON * convert(10.0);
    let degree = control.taylor_max_degree.min(3);
    let newton_target = one / radius;

    for iteration in 1..=control.max_iterations {
        for i in 0..n {
            x[i] = -c[i] / (h[i] + lambda);
        }
        let x_norm = x.norm();

        // Interior solution.
        if !equality && lambda == zero && x_norm <= radius {
            return Ok(finish(x, zero, false, iteration));
        }

        if (x_norm - radius).abs() <= tol {
            return Ok(finish(x, lambda, false, iteration));
        }

        if x_norm > radius {
            lambda_l = lambda_l.max(lambda);
        } else {
            lambda_u = lambda_u.min(lambda);
        }

        if lambda_l > lambda_u {
            debug!(
                "multiplier interval collapsed: [{}, {}]",
                lambda_l, lambda_u
            );
            return Err(DtrsError::IllConditioned);
        }

        // Derivatives of || x(lambda) ||^2 with respect to lambda.
        let mut x_norm2 = [x_norm * x_norm, zero, zero, zero];
        for i in 0..n {
            let inv = one / (h[i] + lambda);
            let w = x[i] * x[i] * inv;
            x_norm2[1] -= convert::<_, F>(2.0) * w;
            x_norm2[2] += convert::<_, F>(6.0) * w * inv;
            x_norm2[3] -= convert::<_, F>(24.0) * w * inv * inv;
        }

        // Newton step on 1 / || x(lambda) || = 1 / radius.
        let pi = pi_derivs(1, -one, &x_norm2);
        let lambda_newton = lambda - (pi[0] - newton_target) / pi[1];

        let in_bracket = |l: F| l.is_finite() && l > lambda_l && l <= lambda_u;

        let mut lambda_new = if in_bracket(lambda_newton) {
            lambda_newton
        } else {
            half * (lambda_l + lambda_u)
        };

        // From the left, the Taylor models provide lower bounds on the
        // multiplier and the best of them is taken.
        if x_norm > radius && degree >= 2 {
            for beta in [2.0, -0.4] {
                let beta: F = convert(beta);
                let pi = pi_derivs(degree, beta, &x_norm2);

                let mut a = [
                    pi[0] - radius.powf(beta),
                    pi[1],
                    pi[2] / convert(2.0),
                    if degree >= 3 {
                        pi[3] / convert(6.0)
                    } else {
                        zero
                    },
                ];

                let a_max = a.iter().fold(zero, |acc, ai| acc.max(ai.abs()));
                if a_max > zero {
                    a.iter_mut().for_each(|ai| *ai /= a_max);
                }

                let roots = roots::cubic(a[0], a[1], a[2], a[3], roots_tol);
                let root = match roots.as_slice() {
                    [_, _, root3] => Some(*root3),
                    [root1, ..] => Some(*root1),
                    [] => None,
                };

                if let Some(root) = root {
                    let candidate = lambda + root;
                    if in_bracket(candidate) && candidate > lambda_new {
                        lambda_new = candidate;
                    }
                }
            }
        }

        if (lambda_new - lambda).abs() <= F::EPSILON * one.max(lambda.abs()) {
            return Ok(finish(x, lambda, false, iteration));
        }

        lambda = lambda_new;
    }

    debug!(
        "secular equation not solved in {} iterations",
        control.max_iterations
    );
    Err(DtrsError::MaxIterations)
}

/// Computes the derivatives (up to `max_order`) of `pi(lambda) = phi(lambda)^(beta
/// / 2)` given the derivatives of `phi(lambda) = || x(lambda) ||^2`.
fn pi_derivs<F: RealField>(max_order: usize, beta: F, phi: &[F; 4]) -> [F; 4] {
    let zero: F = convert(0.0);
    let one: F = convert(1.0);
    let two: F = convert(2.0);
    let three: F = convert(3.0);

    let hb = beta / two;
    let [p0, p1, p2, p3] = *phi;

    let mut pi = [p0.powf(hb), zero, zero, zero];

    if max_order >= 1 {
        pi[1] = hb * p0.powf(hb - one) * p1;
    }
    if max_order >= 2 {
        pi[2] = hb * p0.powf(hb - two) * ((hb - one) * p1 * p1 + p0 * p2);
    }
    if max_order >= 3 {
        pi[3] = hb
            * p0.powf(hb - three)
            * (p3 * p0 * p0 + (hb - one) * (three * p0 * p1 * p2 + (hb - two) * p1 * p1 * p1));
    }

    pi
}

/// Solves the trust-region subproblem
///
/// ```text
/// min v^T d + 0.5 d^T A d  s.t.  || d || <= radius
/// ```
///
/// for symmetric `A` by transforming it to the diagonal form using the
/// eigendecomposition `A = V D V^T` and calling [`solve`].
///
/// Returns the norm of the step stored in `d`. A failure in the
/// eigendecomposition or the diagonal solver is reported as
/// [`NllsError::FromExternal`].
pub fn solve_eig<F: RealField>(
    a: &OMatrix<F, Dyn, Dyn>,
    v: &OVector<F, Dyn>,
    radius: F,
    control: &DtrsControl<F>,
    d: &mut OVector<F, Dyn>,
) -> Result<F, NllsError> {
    let zero: F = convert(0.0);

    let SymmetricEigen {
        eigenvalues: mut ew,
        eigenvectors: ev,
    } = linalg::all_eig_symm(a)?;

    // Transform the linear term.
    let mut c = ev.tr_mul(v);

    // Remove the noise from the decomposition.
    c.apply(|ci| {
        if ci.abs() < F::EPSILON {
            *ci = zero;
        }
    });
    ew.apply(|ewi| {
        if ewi.abs() < F::EPSILON {
            *ewi = zero;
        }
    });

    let solution =
        solve(radius, zero, &c, &ew, control).map_err(|error| NllsError::FromExternal {
            name: "dtrs",
            code: error.code(),
        })?;

    ev.mul_to(&solution.x, d);
    Ok(solution.x_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector, DVector};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rand_distr::StandardNormal;

    use crate::testing::{random_symmetric, random_vector};

    fn assert_optimal(radius: f64, c: &DVector<f64>, h: &DVector<f64>, sol: &DtrsSolution<f64>) {
        let h_min = h.iter().copied().fold(f64::INFINITY, f64::min);

        // Dual feasibility.
        assert!(sol.multiplier >= 0.0);
        assert!(sol.multiplier + h_min >= -1e-10);

        // Stationarity.
        for i in 0..c.len() {
            assert_relative_eq!(
                (h[i] + sol.multiplier) * sol.x[i],
                -c[i],
                epsilon = 1e-8 * (1.0 + c[i].abs())
            );
        }

        // Interior or boundary.
        if sol.multiplier == 0.0 {
            assert!(sol.x_norm <= radius * (1.0 + 1e-10));
        } else {
            assert_relative_eq!(sol.x_norm, radius, max_relative = 1e-8);
        }

        // Reported objective.
        let obj = c.dot(&sol.x) + 0.5 * sol.x.dot(&h.component_mul(&sol.x));
        assert_relative_eq!(sol.obj, obj, epsilon = 1e-8 * (1.0 + obj.abs()));
    }

    #[test]
    fn interior_solution() {
        let h = dvector![2.0, 4.0];
        let c = dvector![-2.0, -4.0];

        let sol = solve(10.0, 0.0, &c, &h, &DtrsControl::default()).unwrap();

        assert_eq!(sol.multiplier, 0.0);
        assert_relative_eq!(sol.x, dvector![1.0, 1.0], epsilon = 1e-14);
        assert_relative_eq!(sol.obj, -3.0, epsilon = 1e-14);
    }

    #[test]
    fn boundary_solution() {
        let h = dvector![2.0, 4.0];
        let c = dvector![-2.0, -4.0];

        let sol = solve(0.5, 0.0, &c, &h, &DtrsControl::default()).unwrap();

        assert!(sol.multiplier > 0.0);
        assert_optimal(0.5, &c, &h, &sol);
    }

    #[test]
    fn indefinite() {
        let h = dvector![-3.0, 1.0, 5.0];
        let c = dvector![1.0, -1.0, 2.0];

        let sol = solve(2.0, 0.0, &c, &h, &DtrsControl::default()).unwrap();

        assert!(!sol.hard_case);
        assert_optimal(2.0, &c, &h, &sol);
    }

    #[test]
    fn hard_case() {
        let h = dvector![-1.0, 2.0];
        let c = dvector![0.0, 2.0];

        let sol = solve(2.0, 0.0, &c, &h, &DtrsControl::default()).unwrap();

        assert!(sol.hard_case);
        assert_relative_eq!(sol.multiplier, 1.0, epsilon = 1e-12);
        assert_relative_eq!(sol.x_norm, 2.0, epsilon = 1e-12);
        assert_relative_eq!(sol.x[1], -2.0 / 3.0, epsilon = 1e-12);
        assert_optimal(2.0, &c, &h, &sol);
    }

    #[test]
    fn zero_linear_term() {
        let h = dvector![1.0, 2.0];
        let c = dvector![0.0, 0.0];

        let sol = solve(1.0, 3.0, &c, &h, &DtrsControl::default()).unwrap();

        assert_eq!(sol.x, dvector![0.0, 0.0]);
        assert_eq!(sol.obj, 3.0);
    }

    #[test]
    fn equality_constraint() {
        let h = dvector![2.0, 4.0];
        let c = dvector![-2.0, -4.0];

        let mut control = DtrsControl::default();
        control.set_equality_problem(true);

        // The unconstrained minimizer is inside, but the step must be on the
        // boundary.
        let sol = solve(10.0, 0.0, &c, &h, &control).unwrap();
        assert_relative_eq!(sol.x_norm, 10.0, max_relative = 1e-8);
    }

    #[test]
    fn random_problems() {
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..50 {
            let n = rng.gen_range(1..8);
            let h = DVector::from_fn(n, |_, _| rng.sample::<f64, _>(StandardNormal) * 10.0);
            let c = DVector::from_fn(n, |_, _| rng.sample::<f64, _>(StandardNormal));
            let radius = rng.gen_range(0.01..10.0);

            let sol = solve(radius, 0.0, &c, &h, &DtrsControl::default()).unwrap();
            assert_optimal(radius, &c, &h, &sol);
        }
    }

    #[test]
    fn bad_arguments() {
        let h = dvector![1.0, 2.0];
        let c = dvector![1.0];

        assert_eq!(
            solve(1.0, 0.0, &c, &h, &DtrsControl::default()).unwrap_err(),
            DtrsError::BadArguments
        );
        assert_eq!(
            solve(-1.0, 0.0, &h, &h, &DtrsControl::default()).unwrap_err(),
            DtrsError::BadArguments
        );
    }

    #[test]
    fn maximum_iterations() {
        let h = dvector![1.0, 2.0];
        let c = dvector![3.0, 4.0];

        let mut control = DtrsControl::default();
        control.set_max_iterations(1);

        // The initial multiplier from the bracket does not put the solution
        // on the boundary.
        assert_eq!(
            solve(0.1, 0.0, &c, &h, &control).unwrap_err(),
            DtrsError::MaxIterations
        );
        assert!(solve(0.1, 0.0, &c, &h, &DtrsControl::default()).is_ok());

        let a = dmatrix![1.0, 0.0; 0.0, 2.0];
        let mut d = DVector::zeros(2);

        let error = solve_eig(&a, &c, 0.1, &control, &mut d).unwrap_err();
        assert!(matches!(
            error,
            NllsError::FromExternal {
                name: "dtrs",
                code: -18
            }
        ));
        assert_eq!(error.status().code(), -4);
    }

    #[test]
    fn error_codes() {
        assert_eq!(DtrsError::BadArguments.code(), -3);
        assert_eq!(DtrsError::IllConditioned.code(), -16);
        assert_eq!(DtrsError::MaxIterations.code(), -18);
    }

    #[test]
    fn eigen_reduction_interior() {
        let a = dmatrix![4.0, 1.0; 1.0, 3.0];
        let v = dvector![1.0, 2.0];
        let mut d = dvector![0.0, 0.0];

        let norm = solve_eig(&a, &v, 100.0, &DtrsControl::default(), &mut d).unwrap();

        assert_relative_eq!(&a * &d, -&v, epsilon = 1e-10);
        assert_relative_eq!(norm, d.norm(), epsilon = 1e-12);
    }

    #[test]
    fn eigen_reduction_boundary() {
        for seed in 0..10 {
            let a = random_symmetric(5, seed);
            let v = random_vector(5, seed + 100);
            let mut d = DVector::zeros(5);

            let norm = solve_eig(&a, &v, 0.3, &DtrsControl::default(), &mut d).unwrap();
            assert_relative_eq!(norm, d.norm(), epsilon = 1e-12);

            if norm < 0.3 * (1.0 - 1e-8) {
                assert_relative_eq!(&a * &d, -&v, epsilon = 1e-8);
            } else {
                assert_relative_eq!(norm, 0.3, max_relative = 1e-8);
            }
        }
    }
}
