/// Extension of the [`nalgebra::RealField`] trait with a few constants used
/// throughout the solver.
pub trait RealField: nalgebra::RealField + Copy {
    /// Machine epsilon.
    const EPSILON: Self;

    /// Square root of machine epsilon. This value is a standard constant for
    /// epsilons in approximating first-order derivative-based concepts.
    const EPSILON_SQRT: Self;

    /// Cubic root of machine epsilon. This value is a standard constant for
    /// epsilons in approximating second-order derivative-based concepts.
    const EPSILON_CBRT: Self;
}

impl RealField for f32 {
    const EPSILON: Self = f32::EPSILON;
    const EPSILON_SQRT: Self = 0.00034526698;
    const EPSILON_CBRT: Self = 0.0049215667;
}

impl RealField for f64 {
    const EPSILON: Self = f64::EPSILON;
    const EPSILON_SQRT: Self = 0.000000014901161193847656;
    const EPSILON_CBRT: Self = 0.0000060554544523933395;
}

/// The base trait for [`LeastSquares`](super::least_squares::LeastSquares).
pub trait Problem {
    /// Type of the field, usually f64 or f32.
    type Field: RealField;

    /// Number of parameters _n_ being fitted.
    fn n_params(&self) -> usize;

    /// Number of residuals _m_. The solver requires _n <= m_.
    fn n_residuals(&self) -> usize;
}
