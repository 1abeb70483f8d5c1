//! High-level API for solving.
//!
//! The [`NllsSolver`] encapsulates all internal state and provides a simple
//! API to run the iterative process. The simplest way of using the driver is
//! to initialize it with the defaults:
//!
//! ```rust
//! use ral_nlls::NllsSolver;
//! # use ral_nlls::nalgebra as na;
//! # use ral_nlls::{EvalError, LeastSquares, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct MyModel;
//! #
//! # impl MyModel {
//! #     fn new() -> Self {
//! #         Self
//! #     }
//! # }
//! #
//! # impl Problem for MyModel {
//! #     type Field = f64;
//! #
//! #     fn n_params(&self) -> usize {
//! #         2
//! #     }
//! #
//! #     fn n_residuals(&self) -> usize {
//! #         3
//! #     }
//! # }
//! #
//! # impl LeastSquares for MyModel {
//! #     fn eval_f<Sx, Sfx>(
//! #         &self,
//! #         x: &na::Vector<Self::Field, Dyn, Sx>,
//! #         fx: &mut na::Vector<Self::Field, Dyn, Sfx>,
//! #     ) -> Result<(), EvalError>
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #         Sfx: na::storage::StorageMut<Self::Field, Dyn>,
//! #     {
//! #         fx[0] = x[0] - 1.0;
//! #         fx[1] = x[1] + 2.0;
//! #         fx[2] = x[0] * x[1] + 2.0;
//! #         Ok(())
//! #     }
//! # }
//!
//! let f = MyModel::new();
//!
//! let mut solver = NllsSolver::new(&f);
//! ```
//!
//! If you need to specify additional settings, use the builder:
//!
//! ```rust
//! use ral_nlls::{Model, NllsOptions, NllsSolver};
//! # use ral_nlls::nalgebra as na;
//! # use ral_nlls::{EvalError, LeastSquares, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct MyModel;
//! #
//! # impl MyModel {
//! #     fn new() -> Self {
//! #         Self
//! #     }
//! # }
//! #
//! # impl Problem for MyModel {
//! #     type Field = f64;
//! #
//! #     fn n_params(&self) -> usize {
//! #         2
//! #     }
//! #
//! #     fn n_residuals(&self) -> usize {
//! #         3
//! #     }
//! # }
//! #
//! # impl LeastSquares for MyModel {
//! #     fn eval_f<Sx, Sfx>(
//! #         &self,
//! #         x: &na::Vector<Self::Field, Dyn, Sx>,
//! #         fx: &mut na::Vector<Self::Field, Dyn, Sfx>,
//! #     ) -> Result<(), EvalError>
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #         Sfx: na::storage::StorageMut<Self::Field, Dyn>,
//! #     {
//! #         fx[0] = x[0] - 1.0;
//! #         fx[1] = x[1] + 2.0;
//! #         fx[2] = x[0] * x[1] + 2.0;
//! #         Ok(())
//! #     }
//! # }
//!
//! let f = MyModel::new();
//!
//! let mut options = NllsOptions::default();
//! options.set_model(Model::GaussNewton).set_maxit(50);
//!
//! let mut solver = NllsSolver::builder(&f)
//!     .with_initial(vec![10.0, -10.0])
//!     .with_weights(vec![1.0, 1.0, 0.5])
//!     .with_options(options)
//!     .build();
//!
//! let inform = solver.solve().expect("solver encountered an error");
//! println!("status = {:?}, objective = {}", inform.status(), inform.obj());
//! ```
//!
//! If you need more control over the iteration process, you can use
//! [`NllsSolver::find`] with a custom stopping criterion or do the iterations
//! manually with [`NllsSolver::next`]. Note that the convergence tests given
//! by the options are still evaluated and reported in
//! [`NllsSolver::inform`].

use nalgebra::{convert, DimName, Dyn, OVector, U1};

use crate::{
    algo::TrustRegion,
    core::{LeastSquares, Problem},
    error::NllsError,
    inform::{Inform, Status},
    options::NllsOptions,
};

/// Builder for the [`NllsSolver`].
pub struct NllsBuilder<'a, P: Problem> {
    p: &'a P,
    x0: OVector<P::Field, Dyn>,
    weights: Option<OVector<P::Field, Dyn>>,
    options: NllsOptions<P::Field>,
}

impl<'a, P: LeastSquares> NllsBuilder<'a, P> {
    fn new(p: &'a P) -> Self {
        let x0 = OVector::from_element_generic(Dyn(p.n_params()), U1::name(), convert(0.0));

        Self {
            p,
            x0,
            weights: None,
            options: NllsOptions::default(),
        }
    }

    /// Sets the initial point from which the iterative process starts.
    pub fn with_initial(mut self, x0: Vec<P::Field>) -> Self {
        self.x0 = OVector::from_vec_generic(Dyn(x0.len()), U1::name(), x0);
        self
    }

    /// Sets the weights of the residuals. The solver then minimizes `0.5 || W
    /// f(x) ||^2` with `W = diag(weights)`.
    pub fn with_weights(mut self, weights: Vec<P::Field>) -> Self {
        self.weights = Some(OVector::from_vec_generic(Dyn(weights.len()), U1::name(), weights));
        self
    }

    /// Sets the options of the solver.
    pub fn with_options(mut self, options: NllsOptions<P::Field>) -> Self {
        self.options = options;
        self
    }

    /// Builds the [`NllsSolver`].
    ///
    /// The dimensions of the initial point and the weights are validated on
    /// the first iteration.
    pub fn build(self) -> NllsSolver<'a, P> {
        let Self {
            p,
            x0,
            weights,
            options,
        } = self;

        NllsSolver {
            p,
            algo: TrustRegion::new(p, options, weights),
            x: x0,
            inform: Inform::new(),
        }
    }
}

/// The driver for the process of solving a nonlinear least-squares problem.
///
/// For default settings, use [`NllsSolver::new`]. For more flexibility, use
/// [`NllsSolver::builder`]. For the usage of the driver, see [module](self)
/// documentation.
pub struct NllsSolver<'a, P: Problem> {
    p: &'a P,
    algo: TrustRegion<P>,
    x: OVector<P::Field, Dyn>,
    inform: Inform<P::Field>,
}

impl<'a, P: LeastSquares> NllsSolver<'a, P> {
    /// Returns the builder for specifying additional settings.
    pub fn builder(p: &'a P) -> NllsBuilder<'a, P> {
        NllsBuilder::new(p)
    }

    /// Initializes the driver with the default settings.
    pub fn new(p: &'a P) -> Self {
        NllsSolver::builder(p).build()
    }

    /// Returns reference to the current point.
    pub fn x(&self) -> &[P::Field] {
        self.x.as_slice()
    }

    /// Returns reference to the current (weighted) residuals.
    pub fn fx(&self) -> &[P::Field] {
        self.algo.residuals().as_slice()
    }

    /// Returns norm of the (weighted) residuals.
    pub fn norm(&self) -> P::Field {
        self.algo.residuals().norm()
    }

    /// Returns the information about the solving so far.
    pub fn inform(&self) -> &Inform<P::Field> {
        &self.inform
    }

    /// Does one iteration of the process, returning the current point and the
    /// norm of the residuals in case of no error.
    ///
    /// On error, the status in [`inform`](NllsSolver::inform) is set
    /// accordingly.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<(&[P::Field], P::Field), NllsError> {
        if let Err(error) = self.algo.iterate(self.p, &mut self.x, &mut self.inform) {
            self.inform.status = error.status();

            match &error {
                NllsError::FromExternal { name, code } => {
                    self.inform.external_name = Some(*name);
                    self.inform.external_return = *code;
                }
                NllsError::Evaluation { name, .. } => {
                    self.inform.external_name = Some(*name);
                }
                _ => {}
            }

            return Err(error);
        }

        Ok((self.x.as_slice(), self.algo.residuals().norm()))
    }

    /// Runs the iterative process until convergence or until the maximum
    /// number of iterations is reached.
    ///
    /// Exceeding the maximum number of iterations is not an error, the status
    /// is set to [`Status::MaxIts`] and the last point is kept.
    pub fn solve(&mut self) -> Result<&Inform<P::Field>, NllsError> {
        let maxit = self.algo.options().maxit();

        loop {
            if self.inform.converged() {
                self.inform.status = Status::Success;
                return Ok(&self.inform);
            }

            if self.inform.iter >= maxit {
                self.inform.status = Status::MaxIts;
                return Ok(&self.inform);
            }

            self.next()?;
        }
    }

    /// Runs the iterative process until given stopping criterion is satisfied.
    pub fn find<C>(&mut self, stop: C) -> Result<(&[P::Field], P::Field), NllsError>
    where
        C: Fn(NllsIterState<'_, P>) -> bool,
    {
        loop {
            self.next()?;

            let state = NllsIterState {
                x: &self.x,
                fx: self.algo.residuals(),
                inform: &self.inform,
            };

            if stop(state) {
                return Ok((self.x.as_slice(), self.algo.residuals().norm()));
            }
        }
    }
}

/// State of the current iteration.
pub struct NllsIterState<'a, P: Problem> {
    x: &'a OVector<P::Field, Dyn>,
    fx: &'a OVector<P::Field, Dyn>,
    inform: &'a Inform<P::Field>,
}

impl<'a, P: Problem> NllsIterState<'a, P> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[P::Field] {
        self.x.as_slice()
    }

    /// Returns reference to the current residuals.
    pub fn fx(&self) -> &[P::Field] {
        self.fx.as_slice()
    }

    /// Returns norm of the residuals.
    pub fn norm(&self) -> P::Field {
        self.fx.norm()
    }

    /// Returns the current iteration number.
    pub fn iter(&self) -> usize {
        self.inform.iter()
    }

    /// Returns `true` if the convergence tests given by the options succeeded.
    pub fn converged(&self) -> bool {
        self.inform.converged()
    }
}
