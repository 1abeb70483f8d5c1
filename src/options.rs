//! Options of the solver.
//!
//! The enumerations can be created from the integer codes used in the
//! literature with [`TryFrom<u32>`]. An unknown code is reported with the
//! corresponding error.

use getset::{CopyGetters, Setters};
use nalgebra::convert;

use crate::{algo::dtrs::DtrsControl, core::RealField, error::NllsError};

/// Order of the model of the objective function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// First-order (Gauss-Newton) model, `hf = 0`.
    GaussNewton = 1,
    /// Second-order (Newton) model, `hf` is the exact Hessian of the
    /// residuals or its quasi-Newton approximation.
    Newton = 2,
    /// Starts with Gauss-Newton and switches to Newton (and back) based on the
    /// progress.
    Hybrid = 3,
}

impl TryFrom<u32> for Model {
    type Error = NllsError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Model::GaussNewton),
            2 => Ok(Model::Newton),
            3 => Ok(Model::Hybrid),
            _ => Err(NllsError::UnsupportedModel(code)),
        }
    }
}

/// Method for solving the trust-region subproblem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Powell's dogleg. Not supported.
    Dogleg = 1,
    /// Adaptive interpolation. Not supported.
    Aint = 2,
    /// More-Sorensen shift-and-factor iteration.
    MoreSorensen = 3,
    /// Eigendecomposition followed by the diagonal subproblem solver.
    Dtrs = 4,
}

impl TryFrom<u32> for Method {
    type Error = NllsError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Method::Dogleg),
            2 => Ok(Method::Aint),
            3 => Ok(Method::MoreSorensen),
            4 => Ok(Method::Dtrs),
            _ => Err(NllsError::UnsupportedMethod(code)),
        }
    }
}

/// Strategy for updating the trust-region radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrUpdateStrategy {
    /// Piecewise constant factors based on thresholds of the gain ratio.
    StepFunction = 1,
    /// Continuous update by Nielsen.
    Continuous = 2,
}

impl TryFrom<u32> for TrUpdateStrategy {
    type Error = NllsError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TrUpdateStrategy::StepFunction),
            2 => Ok(TrUpdateStrategy::Continuous),
            _ => Err(NllsError::BadTrStrategy(code)),
        }
    }
}

/// Diagonal scaling of the variables in the subproblem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    /// No scaling.
    None = 0,
    /// Scale by the norms of the Jacobian columns.
    Jacobian = 1,
    /// Scale by the norms of the rows of the model Hessian.
    Hessian = 2,
}

impl TryFrom<u32> for Scaling {
    type Error = NllsError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Scaling::None),
            1 => Ok(Scaling::Jacobian),
            2 => Ok(Scaling::Hessian),
            _ => Err(NllsError::BadScaling(code)),
        }
    }
}

/// Specification for initial value of trust region size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeltaInit<F> {
    /// Fixed value.
    Fixed(F),
    /// Estimated from Jacobian matrix in the initial point as the given factor
    /// times the largest squared norm of its columns.
    Estimated(F),
}

/// Options for the [`NllsSolver`](crate::NllsSolver).
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct NllsOptions<F: RealField> {
    /// Order of the model. Default: [`Model::Hybrid`].
    model: Model,
    /// Subproblem solver. Default: [`Method::Dtrs`].
    nlls_method: Method,
    /// Trust region update strategy. Default: [`TrUpdateStrategy::StepFunction`].
    tr_update_strategy: TrUpdateStrategy,
    /// Scaling of the subproblem. Default: [`Scaling::Jacobian`].
    scale: Scaling,
    /// Maximum number of iterations. Default: `100`.
    maxit: usize,
    /// Maximum number of consecutive trust region reductions within one
    /// iteration. Default: `100`.
    max_tr_decrease: usize,
    /// Maximum allowed trust region size. Default: `1e8`.
    maximum_radius: F,
    /// Initial trust region size. Default: `Fixed(100)`.
    delta_init: DeltaInit<F>,
    /// Threshold for gain ratio that needs to be exceeded to accept the
    /// calculated step. Default: `1e-8`.
    eta_successful: F,
    /// Threshold for gain ratio to shrink trust region size if lower. Default:
    /// `1e-8`.
    eta_success_but_reduce: F,
    /// Threshold for gain ratio to expand trust region size if higher.
    /// Default: `0.9`.
    eta_very_successful: F,
    /// Threshold for gain ratio above which the model is considered
    /// unreliable and the trust region is kept. Default: `2`.
    eta_too_successful: F,
    /// Expansion factor of trust region size. Default: `2`.
    radius_increase: F,
    /// Shrinking factor of trust region size. Default: `0.5`.
    radius_reduce: F,
    /// Lower bound of the shrinking factor. Default: `1e-6`.
    radius_reduce_max: F,
    /// Absolute tolerance for the residual and gradient norms. Default: `1e-5`.
    stop_g_absolute: F,
    /// Relative tolerance for the residual and gradient norms. Default:
    /// `1e-8`.
    stop_g_relative: F,
    /// Threshold of `|| g || / (0.5 || f ||^2)` for switching to second-order
    /// model in hybrid mode. Default: `2`.
    hybrid_tol: F,
    /// Number of consecutive iterations below `hybrid_tol` needed for the
    /// switch. Default: `1`.
    hybrid_switch_its: usize,
    /// Maximum number of More-Sorensen iterations. Default: `500`.
    more_sorensen_maxits: usize,
    /// Initial shift for making the matrix positive definite. Default:
    /// `1e-13`.
    more_sorensen_shift: F,
    /// Threshold for negligible values in More-Sorensen. Default: `10 *
    /// EPSILON`.
    more_sorensen_tiny: F,
    /// Relative tolerance for the step reaching the trust region boundary.
    /// Default: `1e-3`.
    more_sorensen_tol: F,
    /// Lower bound of scaling factors. Default: `1e-11`.
    scale_min: F,
    /// Upper bound of scaling factors. Default: `1e11`.
    scale_max: F,
    /// Trim scaling factors below `scale_min` to it (instead of resetting to
    /// 1). Default: `true`.
    scale_trim_min: bool,
    /// Trim scaling factors above `scale_max` to it (instead of resetting to
    /// 1). Default: `true`.
    scale_trim_max: bool,
    /// Allow only increases of the scaling factors over iterations. Default:
    /// `false`.
    scale_require_increase: bool,
    /// Use exact Hessians of the residuals (see
    /// [`LeastSquares::eval_hf`](crate::LeastSquares::eval_hf)) instead of
    /// their quasi-Newton approximation. Default: `false`.
    exact_second_derivatives: bool,
    /// Log the condition number of the Jacobian in the initial point.
    /// Default: `false`.
    calculate_svd_j: bool,
    /// Record the residual and gradient norms in each iteration. Default:
    /// `false`.
    output_progress_vectors: bool,
    /// Options for the diagonal subproblem solver.
    dtrs: DtrsControl<F>,
}

impl<F: RealField> Default for NllsOptions<F> {
    fn default() -> Self {
        Self {
            model: Model::Hybrid,
            nlls_method: Method::Dtrs,
            tr_update_strategy: TrUpdateStrategy::StepFunction,
            scale: Scaling::Jacobian,
            maxit: 100,
            max_tr_decrease: 100,
            maximum_radius: convert(1e8),
            delta_init: DeltaInit::Fixed(convert(100.0)),
            eta_successful: convert(1e-8),
            eta_success_but_reduce: convert(1e-8),
            eta_very_successful: convert(0.9),
            eta_too_successful: convert(2.0),
            radius_increase: convert(2.0),
            radius_reduce: convert(0.5),
            radius_reduce_max: convert(1e-6),
            stop_g_absolute: convert(1e-5),
            stop_g_relative: convert(1e-8),
            hybrid_tol: convert(2.0),
            hybrid_switch_its: 1,
            more_sorensen_maxits: 500,
            more_sorensen_shift: convert(1e-13),
            more_sorensen_tiny: F::EPSILON * convert(10.0),
            more_sorensen_tol: convert(1e-3),
            scale_min: convert(1e-11),
            scale_max: convert(1e11),
            scale_trim_min: true,
            scale_trim_max: true,
            scale_require_increase: false,
            exact_second_derivatives: false,
            calculate_svd_j: false,
            output_progress_vectors: false,
            dtrs: DtrsControl::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_codes() {
        assert_eq!(Model::try_from(1).unwrap(), Model::GaussNewton);
        assert_eq!(Method::try_from(4).unwrap(), Method::Dtrs);
        assert_eq!(
            TrUpdateStrategy::try_from(2).unwrap(),
            TrUpdateStrategy::Continuous
        );
        assert_eq!(Scaling::try_from(0).unwrap(), Scaling::None);

        assert!(matches!(
            Model::try_from(4),
            Err(NllsError::UnsupportedModel(4))
        ));
        assert!(matches!(
            Method::try_from(7),
            Err(NllsError::UnsupportedMethod(7))
        ));
        assert!(matches!(
            TrUpdateStrategy::try_from(0),
            Err(NllsError::BadTrStrategy(0))
        ));
        assert!(matches!(
            Scaling::try_from(3),
            Err(NllsError::BadScaling(3))
        ));
    }

    #[test]
    fn builder_style_setters() {
        let mut options = NllsOptions::<f64>::default();
        options
            .set_model(Model::GaussNewton)
            .set_nlls_method(Method::MoreSorensen)
            .set_maxit(10);

        assert_eq!(options.model(), Model::GaussNewton);
        assert_eq!(options.nlls_method(), Method::MoreSorensen);
        assert_eq!(options.maxit(), 10);
        assert_eq!(options.delta_init(), DeltaInit::Fixed(100.0));
    }
}
