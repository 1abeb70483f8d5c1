use nalgebra::{
    storage::{Storage, StorageMut},
    Dyn, IsContiguous, OMatrix, Vector,
};
use thiserror::Error;

use super::base::Problem;
use crate::derivatives;

/// Error encountered while evaluating the residuals or their derivatives.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The number of variables or residuals does not match the dimensions
    /// ([`Problem::n_params`], [`Problem::n_residuals`]) of the problem.
    #[error("invalid dimensionality")]
    InvalidDimensionality,
    /// An invalid value (NaN, positive or negative infinity) was produced.
    #[error("invalid value encountered")]
    InvalidValue,
    /// The problem does not provide the requested derivatives.
    #[error("derivatives are not available")]
    Unavailable,
    /// A custom error specific to the problem.
    #[error("{0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

/// Definition of a nonlinear least-squares problem.
///
/// The solver minimizes `0.5 || f(x) ||^2` where `f` are the residuals
/// computed by [`eval_f`](LeastSquares::eval_f). Only the residuals are
/// required; the Jacobian matrix is approximated by forward differences unless
/// [`eval_j`](LeastSquares::eval_j) is overridden. The Hessians of the
/// residuals are needed only when exact second derivatives are requested in
/// the options.
///
/// ## Defining a problem
///
/// ```rust
/// use ral_nlls::nalgebra as na;
/// use ral_nlls::{EvalError, LeastSquares, Problem};
/// use na::{Dyn, IsContiguous};
///
/// // Fit y = a * exp(b * t) to the data.
/// struct Exponential {
///     t: Vec<f64>,
///     y: Vec<f64>,
/// }
///
/// impl Problem for Exponential {
///     type Field = f64;
///
///     fn n_params(&self) -> usize {
///         2
///     }
///
///     fn n_residuals(&self) -> usize {
///         self.t.len()
///     }
/// }
///
/// impl LeastSquares for Exponential {
///     fn eval_f<Sx, Sfx>(
///         &self,
///         x: &na::Vector<Self::Field, Dyn, Sx>,
///         fx: &mut na::Vector<Self::Field, Dyn, Sfx>,
///     ) -> Result<(), EvalError>
///     where
///         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
///         Sfx: na::storage::StorageMut<Self::Field, Dyn>,
///     {
///         for (i, (t, y)) in self.t.iter().zip(self.y.iter()).enumerate() {
///             fx[i] = x[0] * (x[1] * t).exp() - y;
///         }
///
///         Ok(())
///     }
/// }
/// ```
pub trait LeastSquares: Problem {
    /// Calculates the residuals in given point.
    fn eval_f<Sx, Sfx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        fx: &mut Vector<Self::Field, Dyn, Sfx>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: StorageMut<Self::Field, Dyn>;

    /// Calculates the Jacobian matrix (_m x n_) of the residuals in given
    /// point.
    ///
    /// The default implementation approximates the matrix by forward
    /// differences, see [`derivatives::jacobian`].
    fn eval_j<Sx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        jac: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        derivatives::jacobian(self, x, jac)
    }

    /// Calculates the sum of residual Hessians weighted by the residuals, that
    /// is `hf = sum_i f_i * Hess(f_i)` (_n x n_), in given point.
    ///
    /// When the residuals are weighted by `W`, the solver passes `W^2 f` as
    /// `fx` so that `hf` is the second-order term of the weighted objective.
    /// The default implementation returns [`EvalError::Unavailable`].
    fn eval_hf<Sx, Sfx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        fx: &Vector<Self::Field, Dyn, Sfx>,
        hf: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: Storage<Self::Field, Dyn>,
    {
        let _ = (x, fx, hf);
        Err(EvalError::Unavailable)
    }
}
