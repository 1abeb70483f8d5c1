//! Collection of least-squares problems and helpers for testing the solver.
//!
//! [`ExtendedRosenbrock`] and [`LinearFit`] are recommended for first tests.
//! Others can be used for specific conditions (e.g., singular Jacobian matrix
//! in [`SquareAndShift`], failing evaluation in [`FailingProblem`]).
//!
//! # References
//!
//! \[1\] [Testing Unconstrained Optimization
//! Software](https://dl.acm.org/doi/10.1145/355934.355936)
//!
//! \[2\] [Numerical Methods for Unconstrained Optimization and Nonlinear
//! Equations](https://epubs.siam.org/doi/book/10.1137/1.9781611971200)

#![allow(unused)]

use std::cell::Cell;

use nalgebra::{
    dvector,
    storage::{Storage, StorageMut},
    Cholesky, DMatrix, DVector, Dyn, IsContiguous, OMatrix, OVector, Vector,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::{
    core::{EvalError, LeastSquares, Problem},
    driver::NllsSolver,
    error::NllsError,
    inform::Inform,
    options::NllsOptions,
};

/// Extension of the [`LeastSquares`] trait that provides additional
/// information that is useful for testing the solver.
pub trait TestProblem: LeastSquares {
    /// Standard initial values for the problem. Using the same initial values is
    /// essential for fair comparison of methods.
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>>;

    /// A set of global minima (if known and finite). This is mostly just for
    /// information.
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        Vec::new()
    }
}

/// Linear least-squares problem `f(x) = A x - b`.
///
/// The Gauss-Newton model is exact for this problem.
#[derive(Debug, Clone)]
pub struct LinearFit {
    a: DMatrix<f64>,
    b: DVector<f64>,
}

impl LinearFit {
    /// Initializes the problem with given matrix and right-hand side.
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Self {
        assert_eq!(a.nrows(), b.len(), "dimensions of A and b do not match");
        Self { a, b }
    }

    /// Initializes the problem with _m x n_ matrix and right-hand side drawn
    /// from standard normal distribution.
    pub fn random(m: usize, n: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let a = DMatrix::from_fn(m, n, |_, _| rng.sample(StandardNormal));
        let b = DVector::from_fn(m, |_, _| rng.sample(StandardNormal));
        Self { a, b }
    }

    /// Solution of the normal equations `A^T A x = A^T b`.
    pub fn normal_solution(&self) -> DVector<f64> {
        self.weighted_solution(&DVector::from_element(self.b.len(), 1.0))
    }

    /// Solution of the weighted normal equations `(W A)^T (W A) x = (W A)^T W
    /// b`.
    pub fn weighted_solution(&self, weights: &DVector<f64>) -> DVector<f64> {
        let mut wa = self.a.clone();
        for (mut row, w) in wa.row_iter_mut().zip(weights.iter()) {
            row *= *w;
        }
        let wb = self.b.component_mul(weights);

        let ata = wa.transpose() * &wa;
        let atb = wa.transpose() * wb;

        match Cholesky::new(ata) {
            Some(chol) => chol.solve(&atb),
            None => panic!("matrix does not have full column rank"),
        }
    }
}

impl Problem for LinearFit {
    type Field = f64;

    fn n_params(&self) -> usize {
        self.a.ncols()
    }

    fn n_residuals(&self) -> usize {
        self.a.nrows()
    }
}

impl LeastSquares for LinearFit {
    fn eval_f<Sx, Sfx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        fx: &mut Vector<Self::Field, Dyn, Sfx>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: StorageMut<Self::Field, Dyn>,
    {
        self.a.mul_to(x, fx);
        *fx -= &self.b;
        Ok(())
    }

    fn eval_j<Sx>(
        &self,
        _x: &Vector<Self::Field, Dyn, Sx>,
        jac: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        jac.copy_from(&self.a);
        Ok(())
    }

    fn eval_hf<Sx, Sfx>(
        &self,
        _x: &Vector<Self::Field, Dyn, Sx>,
        _fx: &Vector<Self::Field, Dyn, Sfx>,
        hf: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: Storage<Self::Field, Dyn>,
    {
        hf.fill(0.0);
        Ok(())
    }
}

impl TestProblem for LinearFit {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let n = self.a.ncols();
        vec![DVector::zeros(n), DVector::from_element(n, 10.0)]
    }

    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![self.normal_solution()]
    }
}

/// Residuals `f(x) = [x1 - 3, x2^2 - 4]`.
///
/// The Jacobian matrix is singular whenever `x2 = 0`, the minima are at `(3,
/// 2)` and `(3, -2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquareAndShift(());

impl SquareAndShift {
    /// Initializes the problem.
    pub fn new() -> Self {
        Self(())
    }
}

impl Problem for SquareAndShift {
    type Field = f64;

    fn n_params(&self) -> usize {
        2
    }

    fn n_residuals(&self) -> usize {
        2
    }
}

impl LeastSquares for SquareAndShift {
    fn eval_f<Sx, Sfx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        fx: &mut Vector<Self::Field, Dyn, Sfx>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: StorageMut<Self::Field, Dyn>,
    {
        fx[0] = x[0] - 3.0;
        fx[1] = x[1] * x[1] - 4.0;
        Ok(())
    }

    fn eval_j<Sx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        jac: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        jac.fill(0.0);
        jac[(0, 0)] = 1.0;
        jac[(1, 1)] = 2.0 * x[1];
        Ok(())
    }

    fn eval_hf<Sx, Sfx>(
        &self,
        _x: &Vector<Self::Field, Dyn, Sx>,
        fx: &Vector<Self::Field, Dyn, Sfx>,
        hf: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: Storage<Self::Field, Dyn>,
    {
        hf.fill(0.0);
        hf[(1, 1)] = 2.0 * fx[1];
        Ok(())
    }
}

impl TestProblem for SquareAndShift {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![dvector![0.0, 1.0], dvector![10.0, -5.0]]
    }

    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![dvector![3.0, 2.0], dvector![3.0, -2.0]]
    }
}

/// [Extended Rosenbrock
/// function](https://en.wikipedia.org/wiki/Rosenbrock_function) \[1,2\] in the
/// residual form.
///
/// The global minimum is inside a long, narrow, parabolic shaped flat valley.
/// The challenge is to find the solution inside the valley.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedRosenbrock {
    n: usize,
    alpha: f64,
}

impl ExtendedRosenbrock {
    /// Initializes the problem with given dimension.
    ///
    /// The dimension **must** be a multiplier of 2.
    pub fn new(n: usize) -> Self {
        Self::with_scaling(n, 1.0)
    }

    /// Initializes the problem with given dimension and scaling factor.
    ///
    /// The dimension **must** be a multiplier of 2. The higher the scaling
    /// factor is, the more difficult the problem is.
    pub fn with_scaling(n: usize, alpha: f64) -> Self {
        assert!(n > 0, "n must be greater than zero");
        assert!(n % 2 == 0, "n must be a multiple of 2");
        assert!(alpha > 0.0, "alpha must be greater than zero");
        Self { n, alpha }
    }
}

impl Default for ExtendedRosenbrock {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for ExtendedRosenbrock {
    type Field = f64;

    fn n_params(&self) -> usize {
        self.n
    }

    fn n_residuals(&self) -> usize {
        self.n
    }
}

impl LeastSquares for ExtendedRosenbrock {
    fn eval_f<Sx, Sfx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        fx: &mut Vector<Self::Field, Dyn, Sfx>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: StorageMut<Self::Field, Dyn>,
    {
        for i in 0..(self.n / 2) {
            let i1 = 2 * i;
            let i2 = 2 * i + 1;

            let x1 = x[i1] * self.alpha;
            let x2 = x[i2] / self.alpha;

            fx[i1] = 10.0 * (x2 - x1 * x1);
            fx[i2] = 1.0 - x1;
        }

        Ok(())
    }

    fn eval_j<Sx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        jac: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        jac.fill(0.0);

        for i in 0..(self.n / 2) {
            let i1 = 2 * i;
            let i2 = 2 * i + 1;

            let x1 = x[i1] * self.alpha;

            jac[(i1, i1)] = -20.0 * x1 * self.alpha;
            jac[(i1, i2)] = 10.0 / self.alpha;
            jac[(i2, i1)] = -self.alpha;
        }

        Ok(())
    }

    fn eval_hf<Sx, Sfx>(
        &self,
        _x: &Vector<Self::Field, Dyn, Sx>,
        fx: &Vector<Self::Field, Dyn, Sfx>,
        hf: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: Storage<Self::Field, Dyn>,
    {
        hf.fill(0.0);

        for i in 0..(self.n / 2) {
            let i1 = 2 * i;
            hf[(i1, i1)] = -20.0 * self.alpha * self.alpha * fx[i1];
        }

        Ok(())
    }
}

impl TestProblem for ExtendedRosenbrock {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let init1 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { -1.2 } else { 1.0 }),
        );

        let init2 = DVector::zeros(self.n);

        vec![init1, init2]
    }

    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let alpha = self.alpha;
        let optimum = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 1.0 / alpha } else { alpha }),
        );

        vec![optimum]
    }
}

/// Fit of exponential decay `y = a exp(-b t)` to data generated with `a = 2`
/// and `b = 0.5`.
///
/// The problem has more residuals than parameters and, unless created by
/// [`ExponentialDecay::with_offsets`], zero residual in the optimum. The
/// Hessians of the residuals are available.
#[derive(Debug, Clone)]
pub struct ExponentialDecay {
    t: Vec<f64>,
    y: Vec<f64>,
}

impl ExponentialDecay {
    /// Initializes the problem.
    pub fn new() -> Self {
        let t = (0..20).map(|i| 0.5 * i as f64).collect::<Vec<_>>();
        let y = t.iter().map(|t| 2.0 * (-0.5 * t).exp()).collect();
        Self { t, y }
    }

    /// Initializes the problem with data perturbed by alternating offsets of
    /// given magnitude, so that the residuals do not vanish in the solution.
    pub fn with_offsets(offset: f64) -> Self {
        let mut problem = Self::new();
        for (i, y) in problem.y.iter_mut().enumerate() {
            *y += if i % 2 == 0 { offset } else { -offset };
        }
        problem
    }
}

impl Default for ExponentialDecay {
    fn default() -> Self {
        Self::new()
    }
}

impl Problem for ExponentialDecay {
    type Field = f64;

    fn n_params(&self) -> usize {
        2
    }

    fn n_residuals(&self) -> usize {
        self.t.len()
    }
}

impl LeastSquares for ExponentialDecay {
    fn eval_f<Sx, Sfx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        fx: &mut Vector<Self::Field, Dyn, Sfx>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: StorageMut<Self::Field, Dyn>,
    {
        for (i, (t, y)) in self.t.iter().zip(self.y.iter()).enumerate() {
            fx[i] = x[0] * (-x[1] * t).exp() - y;
        }

        Ok(())
    }

    fn eval_j<Sx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        jac: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        for (i, t) in self.t.iter().enumerate() {
            let e = (-x[1] * t).exp();
            jac[(i, 0)] = e;
            jac[(i, 1)] = -x[0] * t * e;
        }

        Ok(())
    }

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
        hf.fill(0.0);

        for (i, t) in self.t.iter().enumerate() {
            let e = (-x[1] * t).exp();
            let cross = -fx[i] * t * e;
            hf[(0, 1)] += cross;
            hf[(1, 0)] += cross;
            hf[(1, 1)] += fx[i] * x[0] * t * t * e;
        }

        Ok(())
    }
}

impl TestProblem for ExponentialDecay {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![dvector![1.0, 0.1], dvector![3.0, 1.0]]
    }

    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![dvector![2.0, 0.5]]
    }
}

/// Problem whose evaluation of residuals fails after given number of
/// successful evaluations.
#[derive(Debug, Default)]
pub struct FailingProblem {
    remaining: Cell<usize>,
}

impl FailingProblem {
    /// Initializes the problem that fails on the first evaluation.
    pub fn new() -> Self {
        Self::after(0)
    }

    /// Initializes the problem that fails after `evals` successful
    /// evaluations.
    pub fn after(evals: usize) -> Self {
        Self {
            remaining: Cell::new(evals),
        }
    }
}

impl Problem for FailingProblem {
    type Field = f64;

    fn n_params(&self) -> usize {
        2
    }

    fn n_residuals(&self) -> usize {
        2
    }
}

impl LeastSquares for FailingProblem {
    fn eval_f<Sx, Sfx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        fx: &mut Vector<Self::Field, Dyn, Sfx>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sfx: StorageMut<Self::Field, Dyn>,
    {
        match self.remaining.get() {
            0 => Err(EvalError::Custom("evaluation refused".into())),
            remaining => {
                self.remaining.set(remaining - 1);
                fx[0] = x[0] - 1.0;
                fx[1] = x[1] + 1.0;
                Ok(())
            }
        }
    }

    fn eval_j<Sx>(
        &self,
        _x: &Vector<Self::Field, Dyn, Sx>,
        jac: &mut OMatrix<Self::Field, Dyn, Dyn>,
    ) -> Result<(), EvalError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        jac.fill_with_identity();
        Ok(())
    }
}

impl TestProblem for FailingProblem {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![dvector![0.0, 0.0]]
    }
}

/// Random symmetric matrix with entries from standard normal distribution.
pub fn random_symmetric(n: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = DMatrix::<f64>::from_fn(n, n, |_, _| rng.sample(StandardNormal));
    (&a + a.transpose()) * 0.5
}

/// Random symmetric positive definite matrix.
pub fn random_spd(n: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = DMatrix::<f64>::from_fn(n, n, |_, _| rng.sample(StandardNormal));
    a.transpose() * &a + DMatrix::identity(n, n) * 0.1
}

/// Random vector with entries from standard normal distribution.
pub fn random_vector(n: usize, seed: u64) -> DVector<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    DVector::from_fn(n, |_, _| rng.sample(StandardNormal))
}

/// A simple solver driver that can be used in tests.
///
/// Returns the final point and the information about the solving.
pub fn solve<P: LeastSquares>(
    p: &P,
    x: OVector<P::Field, Dyn>,
    options: NllsOptions<P::Field>,
) -> Result<(OVector<P::Field, Dyn>, Inform<P::Field>), NllsError> {
    let mut solver = NllsSolver::builder(p)
        .with_initial(x.as_slice().to_vec())
        .with_options(options)
        .build();

    let inform = solver.solve()?.clone();
    Ok((DVector::from_column_slice(solver.x()), inform))
}
