//! Computation of the trust-region step.
//!
//! The subproblem
//!
//! ```text
//! min 0.5 || f + J d ||^2 + 0.5 d^T hf d  s.t.  || d || <= delta
//! ```
//!
//! is equivalent to minimizing `v^T d + 0.5 d^T A d` with `A = J^T J + hf` and
//! `v = J^T f`. Before passing it to the subproblem solver, the variables can
//! be scaled by a diagonal matrix `W` (see [`Scaling`]), in which case the
//! solver works with `W^{-1} A W^{-1}` and `W^{-1} v` and the resulting step is
//! transformed back.

use log::debug;
use nalgebra::{convert, ComplexField, DimName, Dyn, OMatrix, OVector, RealField as _, U1};

use crate::{
    algo::{dtrs, more_sorensen, more_sorensen::MoreSorensenWork},
    core::RealField,
    error::NllsError,
    linalg,
    options::{Method, NllsOptions, Scaling},
};

/// Preallocated buffers for step computation.
pub struct StepWork<F: RealField> {
    a: OMatrix<F, Dyn, Dyn>,
    v: OVector<F, Dyn>,
    diag: OVector<F, Dyn>,
    jd: OVector<F, Dyn>,
    hd: OVector<F, Dyn>,
    more_sorensen: MoreSorensenWork<F>,
}

impl<F: RealField> StepWork<F> {
    /// Allocates buffers for problem with `n` variables and `m` residuals.
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            a: OMatrix::zeros_generic(Dyn(n), Dyn(n)),
            v: OVector::zeros_generic(Dyn(n), U1::name()),
            diag: OVector::from_element_generic(Dyn(n), U1::name(), convert(1.0)),
            jd: OVector::zeros_generic(Dyn(m), U1::name()),
            hd: OVector::zeros_generic(Dyn(n), U1::name()),
            more_sorensen: MoreSorensenWork::new(n),
        }
    }

    /// Current scaling factors of the variables.
    pub fn diag(&self) -> &OVector<F, Dyn> {
        &self.diag
    }
}

/// Computes the trust-region step `d` for the model given by the residuals
/// `f`, the Jacobian `jac` and the second-order term `hf`.
///
/// Returns the norm of the step in the scaled variables, which is the norm
/// that is compared with `delta`.
pub fn calculate_step<F: RealField>(
    jac: &OMatrix<F, Dyn, Dyn>,
    f: &OVector<F, Dyn>,
    hf: &OMatrix<F, Dyn, Dyn>,
    delta: F,
    options: &NllsOptions<F>,
    work: &mut StepWork<F>,
    d: &mut OVector<F, Dyn>,
) -> Result<F, NllsError> {
    let method = options.nlls_method();
    if matches!(method, Method::Dogleg | Method::Aint) {
        return Err(NllsError::UnsupportedMethod(method as u32));
    }

    let StepWork {
        a,
        v,
        diag,
        more_sorensen,
        ..
    } = work;

    // A = J^T J + hf, v = J^T f
    linalg::matmult_inner(jac, a);
    *a += hf;
    linalg::mult_jt(jac, f, v);

    let scaled = options.scale() != Scaling::None;
    if scaled {
        apply_scaling(jac, a, v, diag, options);
    }

    let normd = match method {
        Method::MoreSorensen => {
            let solution = more_sorensen::solve(a, v, delta, options, more_sorensen, d)?;
            debug!(
                "More-Sorensen step, || d || = {}, sigma = {} ({} iterations)",
                solution.norm_d, solution.sigma, solution.iterations
            );
            solution.norm_d
        }
        Method::Dtrs => {
            let normd = dtrs::solve_eig(a, v, delta, &options.dtrs(), d)?;
            debug!("DTRS step, || d || = {}", normd);
            normd
        }
        Method::Dogleg | Method::Aint => return Err(NllsError::UnsupportedMethod(method as u32)),
    };

    if scaled {
        d.component_div_assign(diag);
    }

    Ok(normd)
}

/// Computes the scaling factors `W` and applies them to `A` and `v`.
///
/// The factors are the norms of the Jacobian columns (or the rows of `A`),
/// kept within `[scale_min, scale_max]`.
pub fn apply_scaling<F: RealField>(
    jac: &OMatrix<F, Dyn, Dyn>,
    a: &mut OMatrix<F, Dyn, Dyn>,
    v: &mut OVector<F, Dyn>,
    diag: &mut OVector<F, Dyn>,
    options: &NllsOptions<F>,
) {
    let one: F = convert(1.0);

    let scale_min = options.scale_min();
    let scale_max = options.scale_max();

    for i in 0..diag.len() {
        let mut temp = match options.scale() {
            Scaling::None => return,
            Scaling::Jacobian => jac.column(i).norm_squared(),
            Scaling::Hessian => a.row(i).norm_squared(),
        };

        if temp < scale_min {
            temp = if options.scale_trim_min() {
                scale_min
            } else {
                one
            };
        } else if temp > scale_max {
            temp = if options.scale_trim_max() {
                scale_max
            } else {
                one
            };
        }

        let temp = temp.sqrt();
        diag[i] = if options.scale_require_increase() {
            temp.max(diag[i])
        } else {
            temp
        };
    }

    // A <- W^{-1} A W^{-1}, v <- W^{-1} v
    v.component_div_assign(diag);
    for (j, mut col) in a.column_iter_mut().enumerate() {
        col.component_div_assign(diag);
        col /= diag[j];
    }
}

/// Evaluates the model `0.5 || f + J d ||^2 (+ 0.5 d^T hf d)` of the objective
/// function for the step `d`.
pub fn evaluate_model<F: RealField>(
    f: &OVector<F, Dyn>,
    jac: &OMatrix<F, Dyn, Dyn>,
    hf: &OMatrix<F, Dyn, Dyn>,
    d: &OVector<F, Dyn>,
    second_order: bool,
    work: &mut StepWork<F>,
) -> F {
    let half: F = convert(0.5);

    let StepWork { jd, hd, .. } = work;

    linalg::mult_j(jac, d, jd);
    *jd += f;
    let mut md = half * jd.norm_squared();

    if second_order {
        hf.mul_to(d, hd);
        md += half * d.dot(hd);
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector, DMatrix, DVector};

    use crate::options::DeltaInit;

    #[test]
    fn model_value() {
        let f = dvector![1.0, -2.0, 0.5];
        let jac = dmatrix![1.0, 0.0; 0.0, 2.0; 1.0, 1.0];
        let hf = dmatrix![2.0, 0.0; 0.0, 4.0];
        let d = dvector![0.5, 1.0];
        let mut work = StepWork::new(2, 3);

        // f + J d = [1.5, 0, 2]
        let md = evaluate_model(&f, &jac, &hf, &d, false, &mut work);
        assert_relative_eq!(md, 0.5 * (2.25 + 4.0), epsilon = 1e-14);

        // d^T hf d = 0.5 + 4
        let md = evaluate_model(&f, &jac, &hf, &d, true, &mut work);
        assert_relative_eq!(md, 0.5 * (2.25 + 4.0) + 0.5 * 4.5, epsilon = 1e-14);

        // Repeated evaluation gives the same value and does not modify inputs.
        let again = evaluate_model(&f, &jac, &hf, &d, true, &mut work);
        assert_eq!(md, again);
        assert_eq!(f, dvector![1.0, -2.0, 0.5]);
        assert_eq!(d, dvector![0.5, 1.0]);
    }

    #[test]
    fn jacobian_scaling() {
        let jac = dmatrix![3.0, 0.0; 4.0, 0.0; 0.0, 1e-8];
        let mut a = jac.transpose() * &jac;
        let mut v = dvector![5.0, 1.0];
        let mut diag = DVector::from_element(2, 1.0);
        let options = NllsOptions::default();

        apply_scaling(&jac, &mut a, &mut v, &mut diag, &options);

        // The second column norm squared (1e-16) is trimmed to scale_min.
        assert_relative_eq!(diag, dvector![5.0, 1e-11_f64.sqrt()], epsilon = 1e-14);
        assert_relative_eq!(v[0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(a[(0, 0)], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn scaling_reset_without_trimming() {
        let jac = dmatrix![0.0, 2.0; 0.0, 0.0];
        let mut a = jac.transpose() * &jac;
        let mut v = dvector![0.0, 4.0];
        let mut diag = DVector::from_element(2, 1.0);
        let mut options = NllsOptions::default();
        options.set_scale_trim_min(false);

        apply_scaling(&jac, &mut a, &mut v, &mut diag, &options);

        assert_eq!(diag, dvector![1.0, 2.0]);
        assert_eq!(v, dvector![0.0, 2.0]);
        assert_eq!(a, dmatrix![0.0, 0.0; 0.0, 1.0]);
    }

    #[test]
    fn gauss_newton_step_interior() {
        // Linear model with the minimizer within the trust region.
        let jac = dmatrix![2.0, 0.0; 0.0, 1.0; 1.0, 1.0];
        let f = dvector![-2.0, -1.0, -2.0];
        let hf = DMatrix::zeros(2, 2);

        for method in [Method::Dtrs, Method::MoreSorensen] {
            for scale in [Scaling::None, Scaling::Jacobian, Scaling::Hessian] {
                let mut options = NllsOptions::default();
                options
                    .set_nlls_method(method)
                    .set_scale(scale)
                    .set_delta_init(DeltaInit::Fixed(100.0));

                let mut work = StepWork::new(2, 3);
                let mut d = DVector::zeros(2);

                calculate_step(&jac, &f, &hf, 100.0, &options, &mut work, &mut d).unwrap();

                // Normal equations J^T J d = -J^T f.
                let expected = (jac.transpose() * &jac)
                    .lu()
                    .solve(&(-jac.transpose() * &f))
                    .unwrap();
                assert_relative_eq!(d, expected, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn step_on_boundary() {
        let jac = dmatrix![1.0, 0.0; 0.0, 1.0];
        let f = dvector![-3.0, -4.0];
        let hf = DMatrix::zeros(2, 2);

        for method in [Method::Dtrs, Method::MoreSorensen] {
            let mut options = NllsOptions::default();
            options.set_nlls_method(method).set_scale(Scaling::None);

            let mut work = StepWork::new(2, 2);
            let mut d = DVector::zeros(2);

            let normd = calculate_step(&jac, &f, &hf, 1.0, &options, &mut work, &mut d).unwrap();

            assert_relative_eq!(normd, 1.0, max_relative = 1e-3);
            assert_relative_eq!(d, dvector![0.6, 0.8], max_relative = 1e-3);
        }
    }

    #[test]
    fn unsupported_methods() {
        let jac = dmatrix![1.0];
        let f = dvector![1.0];
        let hf = dmatrix![0.0];

        for method in [Method::Dogleg, Method::Aint] {
            let mut options = NllsOptions::default();
            options.set_nlls_method(method);

            let mut work = StepWork::new(1, 1);
            let mut d = DVector::zeros(1);

            assert!(matches!(
                calculate_step(&jac, &f, &hf, 1.0, &options, &mut work, &mut d),
                Err(NllsError::UnsupportedMethod(code)) if code == method as u32
            ));
        }
    }
}
