//! Errors that terminate the solving.

use thiserror::Error;

use crate::{
    algo::more_sorensen::MoreSorensenError, core::EvalError, inform::Status, linalg::LinalgError,
};

/// Error returned from [`NllsSolver`](crate::NllsSolver).
#[derive(Debug, Error)]
pub enum NllsError {
    /// Evaluation of the residuals or their derivatives failed.
    #[error("evaluation of {name} failed: {source}")]
    Evaluation {
        /// Name of the callback that failed (`eval_F`, `eval_J` or `eval_HF`).
        name: &'static str,
        /// Error returned by the callback.
        source: EvalError,
    },
    /// Model code is not recognized.
    #[error("unsupported model {0}")]
    UnsupportedModel(u32),
    /// An external routine (linear algebra, diagonal subproblem solver) failed.
    #[error("{name} failed with code {code}")]
    FromExternal {
        /// Name of the routine.
        name: &'static str,
        /// Code returned by the routine.
        code: i32,
    },
    /// Subproblem method is not recognized or not supported.
    #[error("unsupported method {0}")]
    UnsupportedMethod(u32),
    /// Memory allocation failed.
    #[error("allocation failed")]
    Allocation,
    /// Trust region was reduced too many times without success.
    #[error("maximum number of trust region reductions reached")]
    MaxTrReductions,
    /// The step is below the numerical precision of the current point.
    #[error("no progress in the variables")]
    XNoProgress,
    /// There are more parameters than residuals.
    #[error("more parameters ({n}) than residuals ({m})")]
    NGtM {
        /// Number of parameters.
        n: usize,
        /// Number of residuals.
        m: usize,
    },
    /// Trust region update strategy code is not recognized.
    #[error("unsupported trust region update strategy {0}")]
    BadTrStrategy(u32),
    /// No step to the trust region boundary exists.
    #[error("boundary step does not exist")]
    FindBeta,
    /// Scaling code is not recognized.
    #[error("unsupported scaling {0}")]
    BadScaling(u32),
    /// More-Sorensen iteration limit reached.
    #[error("maximum number of More-Sorensen iterations reached")]
    MsMaxIts,
    /// More-Sorensen failed to find a positive definite shift.
    #[error("too many shifts in More-Sorensen")]
    MsTooManyShifts,
    /// More-Sorensen stopped making progress.
    #[error("More-Sorensen does not make progress")]
    MsNoProgress,
}

impl NllsError {
    /// The status label of the error.
    pub fn status(&self) -> Status {
        match self {
            NllsError::Evaluation { .. } => Status::Evaluation,
            NllsError::UnsupportedModel(_) => Status::UnsupportedModel,
            NllsError::FromExternal { .. } => Status::FromExternal,
            NllsError::UnsupportedMethod(_) => Status::UnsupportedMethod,
            NllsError::Allocation => Status::Allocation,
            NllsError::MaxTrReductions => Status::MaxTrReductions,
            NllsError::XNoProgress => Status::XNoProgress,
            NllsError::NGtM { .. } => Status::NGtM,
            NllsError::BadTrStrategy(_) => Status::BadTrStrategy,
            NllsError::FindBeta => Status::FindBeta,
            NllsError::BadScaling(_) => Status::BadScaling,
            NllsError::MsMaxIts => Status::MsMaxIts,
            NllsError::MsTooManyShifts => Status::MsTooManyShifts,
            NllsError::MsNoProgress => Status::MsNoProgress,
        }
    }
}

impl NllsError {
    pub(crate) fn residuals(source: EvalError) -> Self {
        NllsError::Evaluation {
            name: "eval_F",
            source,
        }
    }

    pub(crate) fn jacobian(source: EvalError) -> Self {
        NllsError::Evaluation {
            name: "eval_J",
            source,
        }
    }

    pub(crate) fn hessian(source: EvalError) -> Self {
        NllsError::Evaluation {
            name: "eval_HF",
            source,
        }
    }
}

impl From<LinalgError> for NllsError {
    fn from(error: LinalgError) -> Self {
        NllsError::FromExternal {
            name: error.name(),
            code: error.code(),
        }
    }
}

impl From<MoreSorensenError> for NllsError {
    fn from(error: MoreSorensenError) -> Self {
        match error {
            MoreSorensenError::MaxIts => NllsError::MsMaxIts,
            MoreSorensenError::TooManyShifts => NllsError::MsTooManyShifts,
            MoreSorensenError::NoProgress => NllsError::MsNoProgress,
            MoreSorensenError::FindBeta => NllsError::FindBeta,
            MoreSorensenError::Linalg(error) => error.into(),
        }
    }
}
