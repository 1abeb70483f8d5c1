//! Information about the progress and the result of solving.

use getset::{CopyGetters, Getters};
use nalgebra::convert;

use crate::core::RealField;

/// Status of the solver.
///
/// Every variant except [`Status::Success`] and [`Status::MaxIts`]
/// corresponds to an [`NllsError`](crate::NllsError).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No error occurred.
    Success,
    /// Maximum number of iterations reached.
    MaxIts,
    /// Evaluation of the residuals or their derivatives failed.
    Evaluation,
    /// Unsupported model.
    UnsupportedModel,
    /// An external routine failed.
    FromExternal,
    /// Unsupported subproblem method.
    UnsupportedMethod,
    /// Allocation failed.
    Allocation,
    /// Too many reductions of the trust region.
    MaxTrReductions,
    /// The step is negligible.
    XNoProgress,
    /// More parameters than residuals.
    NGtM,
    /// Unsupported trust region update strategy.
    BadTrStrategy,
    /// The boundary step could not be computed.
    FindBeta,
    /// Unsupported scaling.
    BadScaling,
    /// Maximum number of More-Sorensen iterations reached.
    MsMaxIts,
    /// Too many shifts in More-Sorensen.
    MsTooManyShifts,
    /// More-Sorensen does not make progress.
    MsNoProgress,
}

impl Status {
    /// Integer code of the status. Zero for success, negative otherwise.
    pub fn code(&self) -> i32 {
        match self {
            Status::Success => 0,
            Status::MaxIts => -1,
            Status::Evaluation => -2,
            Status::UnsupportedModel => -3,
            Status::FromExternal => -4,
            Status::UnsupportedMethod => -5,
            Status::Allocation => -6,
            Status::MaxTrReductions => -7,
            Status::XNoProgress => -8,
            Status::NGtM => -9,
            Status::BadTrStrategy => -10,
            Status::FindBeta => -11,
            Status::BadScaling => -12,
            Status::MsMaxIts => -301,
            Status::MsTooManyShifts => -302,
            Status::MsNoProgress => -303,
        }
    }
}

/// Counters, objective information and status of the solving.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Inform<F: RealField> {
    /// Status of the solver.
    #[getset(get_copy = "pub")]
    pub(crate) status: Status,
    /// Number of iterations.
    #[getset(get_copy = "pub")]
    pub(crate) iter: usize,
    /// Number of residual evaluations.
    #[getset(get_copy = "pub")]
    pub(crate) f_eval: usize,
    /// Number of Jacobian evaluations.
    #[getset(get_copy = "pub")]
    pub(crate) g_eval: usize,
    /// Number of evaluations of the Hessians of the residuals.
    #[getset(get_copy = "pub")]
    pub(crate) h_eval: usize,
    /// Objective value `0.5 || f ||^2` in the current point.
    #[getset(get_copy = "pub")]
    pub(crate) obj: F,
    /// Norm of the gradient `|| J^T f ||` in the current point.
    #[getset(get_copy = "pub")]
    pub(crate) norm_g: F,
    /// Scaled gradient norm `|| J^T f || / || f ||`.
    #[getset(get_copy = "pub")]
    pub(crate) scaled_g: F,
    /// Converged by the residual norm test.
    #[getset(get_copy = "pub")]
    pub(crate) convergence_normf: bool,
    /// Converged by the scaled gradient norm test.
    #[getset(get_copy = "pub")]
    pub(crate) convergence_normg: bool,
    /// Residual norms in each iteration (if requested).
    #[getset(get = "pub")]
    pub(crate) resvec: Vec<F>,
    /// Gradient norms in each iteration (if requested).
    #[getset(get = "pub")]
    pub(crate) gradvec: Vec<F>,
    /// Code returned by the failed external routine.
    #[getset(get_copy = "pub")]
    pub(crate) external_return: i32,
    /// Name of the failed external routine.
    #[getset(get_copy = "pub")]
    pub(crate) external_name: Option<&'static str>,
}

impl<F: RealField> Inform<F> {
    pub(crate) fn new() -> Self {
        Self {
            status: Status::Success,
            iter: 0,
            f_eval: 0,
            g_eval: 0,
            h_eval: 0,
            obj: convert(0.0),
            norm_g: convert(0.0),
            scaled_g: convert(0.0),
            convergence_normf: false,
            convergence_normg: false,
            resvec: Vec::new(),
            gradvec: Vec::new(),
            external_return: 0,
            external_name: None,
        }
    }

    /// Returns `true` if any of the convergence tests succeeded.
    pub fn converged(&self) -> bool {
        self.convergence_normf || self.convergence_normg
    }
}

impl<F: RealField> Default for Inform<F> {
    fn default() -> Self {
        Self::new()
    }
}
