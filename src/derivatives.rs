//! Finite-difference approximation of derivatives.
//!
//! Used as the default for [`LeastSquares::eval_j`] when the problem does not
//! provide the analytical Jacobian matrix.

use nalgebra::{
    convert, storage::Storage, ComplexField, DimName, Dyn, IsContiguous, OMatrix, OVector,
    RealField as _, Vector, U1,
};

use crate::core::{EvalError, LeastSquares, RealField};

/// Computes the forward-difference approximation of the Jacobian matrix of
/// the residuals in given point.
///
/// The output matrix must have dimensions _m x n_.
pub fn jacobian<P, Sx>(
    p: &P,
    x: &Vector<P::Field, Dyn, Sx>,
    jac: &mut OMatrix<P::Field, Dyn, Dyn>,
) -> Result<(), EvalError>
where
    P: LeastSquares + ?Sized,
    Sx: Storage<P::Field, Dyn> + IsContiguous,
{
    let n = p.n_params();
    let m = p.n_residuals();

    if x.nrows() != n || jac.nrows() != m || jac.ncols() != n {
        return Err(EvalError::InvalidDimensionality);
    }

    let one: P::Field = convert(1.0);
    let eps = P::Field::EPSILON_SQRT;

    let mut x = x.clone_owned();
    let mut fx = OVector::zeros_generic(Dyn(m), U1::name());
    p.eval_f(&x, &mut fx)?;

    for (j, mut col) in jac.column_iter_mut().enumerate() {
        let xj = x[j];

        // Compute the step size. We would like to have the step as small as
        // possible (to be as close to the real derivative as possible). But
        // at the same time, very small step could cause f(x + e_j * step_j)
        // ~= f(x) with very small number of good digits.
        //
        // A reasonable way to balance these competing needs is to scale each
        // component by x_j itself. To avoid problems when x_j is close to
        // zero, it is modified to take the unit magnitude instead.
        let step = eps * xj.abs().max(one) * one.copysign(xj);

        // Update the point.
        x[j] = xj + step;
        p.eval_f(&x, &mut col)?;

        // J[i, j] = (f_i(x + e_j * step_j) - f_i(x)) / step_j.
        col -= &fx;
        col /= step;

        // Restore the original value.
        x[j] = xj;
    }

    if jac.iter().all(|jij| jij.is_finite()) {
        Ok(())
    } else {
        Err(EvalError::InvalidValue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::{dvector, DMatrix};

    use crate::core::Problem;
    use crate::testing::*;

    #[test]
    fn rosenbrock_jacobian() {
        let f = ExtendedRosenbrock::new(4);

        for x in f.initials() {
            let mut approx = DMatrix::zeros(4, 4);
            let mut exact = DMatrix::zeros(4, 4);

            jacobian(&f, &x, &mut approx).unwrap();
            f.eval_j(&x, &mut exact).unwrap();

            assert_relative_eq!(approx, exact, epsilon = 1e-5, max_relative = 1e-6);
        }
    }

    #[test]
    fn rectangular_jacobian() {
        let f = ExponentialDecay::new();
        let x = dvector![1.5, 0.2];

        let mut approx = DMatrix::zeros(f.n_residuals(), 2);
        let mut exact = DMatrix::zeros(f.n_residuals(), 2);

        jacobian(&f, &x, &mut approx).unwrap();
        f.eval_j(&x, &mut exact).unwrap();

        assert_relative_eq!(approx, exact, epsilon = 1e-6);
    }

    #[test]
    fn invalid_dimensions() {
        let f = ExtendedRosenbrock::new(2);
        let x = dvector![0.0, 0.0];
        let mut jac = DMatrix::zeros(3, 2);

        assert!(matches!(
            jacobian(&f, &x, &mut jac),
            Err(EvalError::InvalidDimensionality)
        ));
    }
}
