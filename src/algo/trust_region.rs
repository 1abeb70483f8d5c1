//! Trust-region iteration for nonlinear least squares.
//!
//! Each call of [`TrustRegion::iterate`] performs one *accepted* step of the
//! method. A step `d` is computed by minimizing the quadratic model
//!
//! ```text
//! m(d) = 0.5 || f + J d ||^2 + 0.5 d^T hf d
//! ```
//!
//! within the ball `|| d || <= delta` (see [`step`](crate::step)). The step is
//! accepted if the *gain ratio* of the actual and predicted reduction of the
//! objective is large enough, otherwise the trust region is shrunk and the
//! step recomputed. The term `hf` is zero for Gauss-Newton model, the exact
//! sum of residual Hessians (or its quasi-Newton approximation) for Newton
//! model, and hybrid model switches between the two based on the progress.
//!
//! # References
//!
//! \[1\] [A Gauss-Newton Hybrid method for Nonlinear Least
//! Squares](https://arxiv.org/abs/1807.07094)
//!
//! \[2\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[3\] [Damping Parameter in Marquardt's
//! Method](https://www2.imm.dtu.dk/documents/ftp/tr99/tr05_99.pdf)
//!
//! \[4\] [An Adaptive Nonlinear Least-Squares
//! Algorithm](https://dl.acm.org/doi/10.1145/355958.355965)

use log::debug;
use nalgebra::{
    convert,
    storage::{Storage, StorageMut},
    ComplexField, DimName, Dyn, IsContiguous, OMatrix, OVector, RealField as _, Vector, U1,
};

use crate::{
    core::{EvalError, LeastSquares, Problem, RealField},
    error::NllsError,
    hessian::{rank_one_update, RankOneWork},
    inform::Inform,
    linalg,
    options::{DeltaInit, Model, NllsOptions, TrUpdateStrategy},
    step::{self, StepWork},
};

/// Exponent in the continuous trust region update.
const TR_P: i32 = 7;

/// Trust-region solver for nonlinear least-squares problems.
///
/// Holds all the state and buffers needed during the solving. The buffers are
/// allocated once for the dimensions of the problem.
pub struct TrustRegion<P: Problem> {
    options: NllsOptions<P::Field>,
    weights: Option<OVector<P::Field, Dyn>>,
    first_call: bool,
    delta: P::Field,
    tr_nu: P::Field,
    normf: P::Field,
    normf0: P::Field,
    normjf: P::Field,
    normjf0: P::Field,
    normjfold: P::Field,
    use_second_derivatives: bool,
    hybrid_count: usize,
    f: OVector<P::Field, Dyn>,
    f_new: OVector<P::Field, Dyn>,
    wf: OVector<P::Field, Dyn>,
    jac: OMatrix<P::Field, Dyn, Dyn>,
    hf: OMatrix<P::Field, Dyn, Dyn>,
    hf_temp: OMatrix<P::Field, Dyn, Dyn>,
    g: OVector<P::Field, Dyn>,
    g_old: OVector<P::Field, Dyn>,
    g_mixed: OVector<P::Field, Dyn>,
    y: OVector<P::Field, Dyn>,
    y_sharp: OVector<P::Field, Dyn>,
    d: OVector<P::Field, Dyn>,
    x_new: OVector<P::Field, Dyn>,
    step: StepWork<P::Field>,
    rank_one: RankOneWork<P::Field>,
}

impl<P: LeastSquares> TrustRegion<P> {
    /// Initializes the solver for given problem with given options.
    ///
    /// The `weights`, if given, multiply the residuals and rows of the
    /// Jacobian matrix.
    pub fn new(
        p: &P,
        options: NllsOptions<P::Field>,
        weights: Option<OVector<P::Field, Dyn>>,
    ) -> Self {
        let n = p.n_params();
        let m = p.n_residuals();
        let zero = convert(0.0);

        Self {
            tr_nu: options.radius_reduce(),
            options,
            weights,
            first_call: true,
            delta: zero,
            normf: zero,
            normf0: zero,
            normjf: zero,
            normjf0: zero,
            normjfold: zero,
            use_second_derivatives: false,
            hybrid_count: 0,
            f: OVector::zeros_generic(Dyn(m), U1::name()),
            f_new: OVector::zeros_generic(Dyn(m), U1::name()),
            wf: OVector::zeros_generic(Dyn(m), U1::name()),
            jac: OMatrix::zeros_generic(Dyn(m), Dyn(n)),
            hf: OMatrix::zeros_generic(Dyn(n), Dyn(n)),
            hf_temp: OMatrix::zeros_generic(Dyn(n), Dyn(n)),
            g: OVector::zeros_generic(Dyn(n), U1::name()),
            g_old: OVector::zeros_generic(Dyn(n), U1::name()),
            g_mixed: OVector::zeros_generic(Dyn(n), U1::name()),
            y: OVector::zeros_generic(Dyn(n), U1::name()),
            y_sharp: OVector::zeros_generic(Dyn(n), U1::name()),
            d: OVector::zeros_generic(Dyn(n), U1::name()),
            x_new: OVector::zeros_generic(Dyn(n), U1::name()),
            step: StepWork::new(n, m),
            rank_one: RankOneWork::new(n),
        }
    }

    /// Options of the solver.
    pub fn options(&self) -> &NllsOptions<P::Field> {
        &self.options
    }

    /// Current trust region size.
    pub fn delta(&self) -> P::Field {
        self.delta
    }

    /// Whether the current model uses second-order information.
    pub fn use_second_derivatives(&self) -> bool {
        self.use_second_derivatives
    }

    /// Residuals (weighted, if weights are given) in the current point.
    pub fn residuals(&self) -> &OVector<P::Field, Dyn> {
        &self.f
    }

    /// Performs one iteration of the method, moving `x` to the next accepted
    /// point and updating `inform`.
    ///
    /// The first call evaluates the problem in the initial point and returns
    /// without taking a step if the point already satisfies the convergence
    /// tests.
    pub fn iterate<Sx>(
        &mut self,
        p: &P,
        x: &mut Vector<P::Field, Dyn, Sx>,
        inform: &mut Inform<P::Field>,
    ) -> Result<(), NllsError>
    where
        Sx: StorageMut<P::Field, Dyn> + IsContiguous,
    {
        if self.first_call {
            self.first_call = false;
            self.initialize(p, x, inform)?;

            if inform.converged() {
                return Ok(());
            }
        }

        let Self {
            options,
            weights,
            delta,
            tr_nu,
            normf,
            normf0,
            normjf,
            normjf0,
            normjfold,
            use_second_derivatives,
            hybrid_count,
            f,
            f_new,
            wf,
            jac,
            hf,
            hf_temp,
            g,
            g_old,
            g_mixed,
            y,
            y_sharp,
            d,
            x_new,
            step,
            rank_one,
            ..
        } = self;

        let half: P::Field = convert(0.5);
        let exact = options.exact_second_derivatives();

        inform.iter += 1;
        debug!(
            "iteration {}: objective = {}, delta = {}",
            inform.iter,
            half * *normf * *normf,
            delta
        );

        let mut attempts = 0;

        let normfnew = loop {
            attempts += 1;
            if attempts > options.max_tr_decrease() + 1 {
                debug!("trust region reduced {} times without success", attempts - 1);
                return Err(NllsError::MaxTrReductions);
            }

            let normd = step::calculate_step(jac, f, hf, *delta, options, step, d)?;

            x.add_to(&*d, x_new);
            eval_residuals(p, x_new, weights.as_ref(), f_new)?;
            inform.f_eval += 1;
            let normfnew = f_new.norm();

            let md = step::evaluate_model(f, jac, hf, d, *use_second_derivatives, step);
            let rho = calculate_rho(*normf, normfnew, md);
            debug!(
                "gain ratio = {}, || f || = {} -> {}, model = {}",
                rho, normf, normfnew, md
            );

            let success = rho > options.eta_successful();
            update_radius(rho, normd, options, delta, tr_nu);

            if success {
                break normfnew;
            }

            debug!("step rejected, delta = {}", delta);

            if d.norm() < P::Field::EPSILON * x_new.norm() {
                debug!("step is below numerical precision of the point");
                return Err(NllsError::XNoProgress);
            }
        };

        // Commit the step.
        x.copy_from(x_new);
        std::mem::swap(f, f_new);
        *normf = normfnew;
        *normjfold = *normjf;

        if !exact {
            // J_old^T f_new, needed for y#.
            g_old.copy_from(g);
            linalg::mult_jt(jac, f, g_mixed);
            g_mixed.neg_mut();
        }

        eval_jacobian(p, x, weights.as_ref(), jac)?;
        inform.g_eval += 1;

        linalg::mult_jt(jac, f, g);
        g.neg_mut();
        *normjf = g.norm();

        if !exact {
            // y = J_new^T f_new - J_old^T f_old, y# = J_new^T f_new - J_old^T f_new
            g_old.sub_to(g, y);
            g_mixed.sub_to(g, y_sharp);
        }

        if options.model() == Model::Hybrid {
            if *use_second_derivatives {
                if *normjf > *normjfold {
                    debug!("gradient norm increased, switching to Gauss-Newton model");
                    *use_second_derivatives = false;
                    hf_temp.copy_from(hf);
                    hf.fill(convert(0.0));
                }
            } else if *normjf / (half * *normf * *normf) < options.hybrid_tol() {
                *hybrid_count += 1;
                if *hybrid_count == options.hybrid_switch_its() {
                    debug!("switching to second-order model");
                    *use_second_derivatives = true;
                    *hybrid_count = 0;
                    if !exact {
                        hf.copy_from(hf_temp);
                    }
                }
            } else {
                *hybrid_count = 0;
            }

            if !*use_second_derivatives && !exact {
                // Keep the cached approximation current for a later switch.
                rank_one_update(hf_temp, d, y, y_sharp, rank_one);
            }
        }

        if *use_second_derivatives {
            if exact {
                eval_hessian(p, x, f, weights.as_ref(), wf, hf)?;
                inform.h_eval += 1;
            } else {
                rank_one_update(hf, d, y, y_sharp, rank_one);
            }
        }

        update_inform(*normf, *normjf, options, inform);
        test_convergence(*normf, *normjf, *normf0, *normjf0, options, inform);

        if inform.converged() {
            debug!(
                "converged in iteration {} (residual test: {}, gradient test: {})",
                inform.iter, inform.convergence_normf, inform.convergence_normg
            );
        }

        Ok(())
    }

    fn initialize<Sx>(
        &mut self,
        p: &P,
        x: &Vector<P::Field, Dyn, Sx>,
        inform: &mut Inform<P::Field>,
    ) -> Result<(), NllsError>
    where
        Sx: Storage<P::Field, Dyn> + IsContiguous,
    {
        let n = p.n_params();
        let m = p.n_residuals();

        if n > m {
            return Err(NllsError::NGtM { n, m });
        }

        if x.len() != n || self.weights.as_ref().map_or(false, |w| w.len() != m) {
            return Err(NllsError::residuals(EvalError::InvalidDimensionality));
        }

        let Self {
            options,
            weights,
            delta,
            tr_nu,
            normf,
            normf0,
            normjf,
            normjf0,
            normjfold,
            use_second_derivatives,
            f,
            wf,
            jac,
            hf,
            hf_temp,
            g,
            ..
        } = self;

        let zero: P::Field = convert(0.0);

        eval_residuals(p, x, weights.as_ref(), f)?;
        inform.f_eval += 1;
        eval_jacobian(p, x, weights.as_ref(), jac)?;
        inform.g_eval += 1;

        *delta = match options.delta_init() {
            DeltaInit::Fixed(radius) => radius,
            DeltaInit::Estimated(scale) => {
                let jmax = jac
                    .column_iter()
                    .map(|col| col.norm_squared())
                    .fold(zero, |max, norm| max.max(norm));
                scale * jmax
            }
        };

        if !(*delta > zero) {
            debug!("invalid initial trust region size {}, using 1", delta);
            *delta = convert(1.0);
        }

        *delta = delta.min(options.maximum_radius());
        *tr_nu = options.radius_reduce();

        if options.calculate_svd_j() {
            let (s1, sn) = linalg::svd_extremes(jac)?;
            debug!(
                "singular values of J: largest = {}, smallest = {}, condition number = {}",
                s1,
                sn,
                s1 / sn
            );
        }

        *normf = f.norm();
        *normf0 = *normf;

        linalg::mult_jt(jac, f, g);
        g.neg_mut();
        *normjf = g.norm();
        *normjf0 = *normjf;
        *normjfold = *normjf;

        debug!(
            "initial point: || f || = {}, || J^T f || = {}, delta = {}",
            normf, normjf, delta
        );

        update_inform(*normf, *normjf, options, inform);
        if test_convergence(*normf, *normjf, *normf0, *normjf0, options, inform) {
            debug!("initial point satisfies convergence tests");
            return Ok(());
        }

        hf.fill(zero);
        match options.model() {
            Model::GaussNewton => {
                *use_second_derivatives = false;
            }
            Model::Newton => {
                *use_second_derivatives = true;
                if options.exact_second_derivatives() {
                    eval_hessian(p, x, f, weights.as_ref(), wf, hf)?;
                    inform.h_eval += 1;
                }
            }
            Model::Hybrid => {
                *use_second_derivatives = false;
                hf_temp.fill(zero);
            }
        }

        Ok(())
    }
}

fn eval_residuals<P, Sx>(
    p: &P,
    x: &Vector<P::Field, Dyn, Sx>,
    weights: Option<&OVector<P::Field, Dyn>>,
    f: &mut OVector<P::Field, Dyn>,
) -> Result<(), NllsError>
where
    P: LeastSquares,
    Sx: Storage<P::Field, Dyn> + IsContiguous,
{
    p.eval_f(x, f).map_err(NllsError::residuals)?;

    if let Some(weights) = weights {
        f.component_mul_assign(weights);
    }

    Ok(())
}

fn eval_jacobian<P, Sx>(
    p: &P,
    x: &Vector<P::Field, Dyn, Sx>,
    weights: Option<&OVector<P::Field, Dyn>>,
    jac: &mut OMatrix<P::Field, Dyn, Dyn>,
) -> Result<(), NllsError>
where
    P: LeastSquares,
    Sx: Storage<P::Field, Dyn> + IsContiguous,
{
    p.eval_j(x, jac).map_err(NllsError::jacobian)?;

    if let Some(weights) = weights {
        for (mut row, w) in jac.row_iter_mut().zip(weights.iter()) {
            row *= *w;
        }
    }

    Ok(())
}

// The weighted objective is 0.5 || W f ||^2, whose second-order term is
// sum_i w_i^2 f_i Hess(f_i). The residuals in `f` are already weighted once.
fn eval_hessian<P, Sx>(
    p: &P,
    x: &Vector<P::Field, Dyn, Sx>,
    f: &OVector<P::Field, Dyn>,
    weights: Option<&OVector<P::Field, Dyn>>,
    wf: &mut OVector<P::Field, Dyn>,
    hf: &mut OMatrix<P::Field, Dyn, Dyn>,
) -> Result<(), NllsError>
where
    P: LeastSquares,
    Sx: Storage<P::Field, Dyn> + IsContiguous,
{
    match weights {
        Some(weights) => {
            wf.copy_from(f);
            wf.component_mul_assign(weights);
            p.eval_hf(x, wf, hf)
        }
        None => p.eval_hf(x, f, hf),
    }
    .map_err(NllsError::hessian)
}

/// Computes the gain ratio of the actual and predicted reduction of the
/// objective function.
///
/// Reductions below `10 * EPSILON` are considered to be noise and the ratio is
/// set to 1. Invalid trial residuals give a non-finite ratio.
pub fn calculate_rho<F: RealField>(normf: F, normfnew: F, md: F) -> F {
    let half: F = convert(0.5);
    let one: F = convert(1.0);
    let tol = F::EPSILON * convert(10.0);

    let actual_reduction = half * normf * normf - half * normfnew * normfnew;
    let predicted_reduction = half * normf * normf - md;

    if !actual_reduction.is_finite() {
        actual_reduction
    } else if actual_reduction.abs() < tol || predicted_reduction.abs() < tol {
        one
    } else {
        actual_reduction / predicted_reduction
    }
}

/// Updates the trust region size `delta` given the gain ratio `rho` and the
/// (scaled) norm of the step.
///
/// A non-finite gain ratio always shrinks the trust region.
pub fn update_radius<F: RealField>(
    rho: F,
    normd: F,
    options: &NllsOptions<F>,
    delta: &mut F,
    tr_nu: &mut F,
) {
    let half: F = convert(0.5);
    let one: F = convert(1.0);
    let two: F = convert(2.0);

    let reduce = options.radius_reduce().max(options.radius_reduce_max());

    if !rho.is_finite() {
        *delta *= reduce;
        debug!("invalid gain ratio, delta reduced to {}", delta);
        return;
    }

    match options.tr_update_strategy() {
        TrUpdateStrategy::StepFunction => {
            if rho < options.eta_success_but_reduce() {
                *delta = reduce * normd;
                debug!("delta reduced to {}", delta);
            } else if rho < options.eta_very_successful() {
                // Keep the size.
            } else if rho < options.eta_too_successful() {
                *delta = delta.max(options.radius_increase() * normd);
                debug!("delta increased to {}", delta);
            }
            // Too successful steps do not increase the trust, the model is
            // probably not accurate.
        }
        TrUpdateStrategy::Continuous => {
            if rho >= options.eta_too_successful() {
                // Keep the size.
            } else if rho > options.eta_successful() {
                let increase = options.radius_increase();
                let factor = one - (increase - one) * (one - two * rho).powi(TR_P);
                *delta *= increase.min(options.radius_reduce().max(factor));
                *tr_nu = options.radius_reduce();
                debug!("delta updated to {}", delta);
            } else {
                *delta *= *tr_nu;
                *tr_nu *= half;
                debug!("delta reduced to {}", delta);
            }
        }
    }

    *delta = delta.min(options.maximum_radius());
}

fn update_inform<F: RealField>(normf: F, normjf: F, options: &NllsOptions<F>, inform: &mut Inform<F>) {
    let zero: F = convert(0.0);
    let half: F = convert(0.5);

    inform.obj = half * normf * normf;
    inform.norm_g = normjf;
    inform.scaled_g = if normf > zero { normjf / normf } else { zero };

    if options.output_progress_vectors() {
        inform.resvec.push(normf);
        inform.gradvec.push(normjf);
    }
}

/// Tests the residual norm and the scaled gradient norm for convergence and
/// records the results in `inform`. Returns `true` if any of the tests
/// succeeded.
pub fn test_convergence<F: RealField>(
    normf: F,
    normjf: F,
    normf0: F,
    normjf0: F,
    options: &NllsOptions<F>,
    inform: &mut Inform<F>,
) -> bool {
    let zero: F = convert(0.0);
    let absolute = options.stop_g_absolute();
    let relative = options.stop_g_relative();

    if normf <= absolute.max(relative * normf0) {
        inform.convergence_normf = true;
    }

    if normf > zero {
        let scaled_g0 = if normf0 > zero { normjf0 / normf0 } else { zero };
        if normjf / normf <= absolute.max(relative * scaled_g0) {
            inform.convergence_normg = true;
        }
    }

    inform.converged()
}
