#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

//! # RAL NLLS
//!
//! A pure Rust trust-region solver for nonlinear least-squares problems.
//!
//! Given residuals `f: R^n -> R^m` with _n <= m_, the solver minimizes
//!
//! ```text
//! 0.5 || f(x) ||^2
//! ```
//!
//! using a trust-region method. In each iteration, the quadratic model of the
//! objective is minimized within the trust region by one of the subproblem
//! solvers:
//!
//! * [DTRS](algo::dtrs) -- The model Hessian is eigen-decomposed and the
//!   resulting diagonal subproblem is solved by a safeguarded secular equation
//!   iteration. Recommended as a default.
//! * [More-Sorensen](algo::more_sorensen) -- Shifted Cholesky factorizations
//!   with a Newton iteration on the shift.
//!
//! The model can be of first order (Gauss-Newton), second order (Newton, with
//! exact Hessians of the residuals or their [quasi-Newton
//! approximation](hessian)), or a hybrid of the two that switches based on
//! the progress. See [`NllsOptions`] for all settings.
//!
//! ## Problem
//!
//! The problem is any type that implements the [`LeastSquares`] and
//! [`Problem`] traits. Only the residuals are required, the Jacobian matrix is
//! approximated by [finite differences](derivatives) unless provided.
//!
//! ```rust
//! // RAL NLLS is based on `nalgebra` crate.
//! use ral_nlls::nalgebra as na;
//! use ral_nlls::{EvalError, LeastSquares, Problem};
//! use na::{Dyn, IsContiguous};
//!
//! // A problem is represented by a type.
//! struct Circle {
//!     points: Vec<(f64, f64)>,
//! }
//!
//! impl Problem for Circle {
//!     // The numeric type. Usually f64 or f32.
//!     type Field = f64;
//!
//!     // Center and radius.
//!     fn n_params(&self) -> usize {
//!         3
//!     }
//!
//!     fn n_residuals(&self) -> usize {
//!         self.points.len()
//!     }
//! }
//!
//! impl LeastSquares for Circle {
//!     // Distances of the points from the circle.
//!     fn eval_f<Sx, Sfx>(
//!         &self,
//!         x: &na::Vector<Self::Field, Dyn, Sx>,
//!         fx: &mut na::Vector<Self::Field, Dyn, Sfx>,
//!     ) -> Result<(), EvalError>
//!     where
//!         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//!         Sfx: na::storage::StorageMut<Self::Field, Dyn>,
//!     {
//!         for (i, (px, py)) in self.points.iter().enumerate() {
//!             fx[i] = ((px - x[0]).powi(2) + (py - x[1]).powi(2)).sqrt() - x[2];
//!         }
//!
//!         Ok(())
//!     }
//! }
//! ```
//!
//! ## Solving
//!
//! When you have your problem available, you can use the [`NllsSolver`] to
//! run the iteration process until convergence.
//!
//! ```rust
//! use ral_nlls::{NllsSolver, Status};
//! # use ral_nlls::nalgebra as na;
//! # use ral_nlls::{EvalError, LeastSquares, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct Circle {
//! #     points: Vec<(f64, f64)>,
//! # }
//! #
//! # impl Problem for Circle {
//! #     type Field = f64;
//! #
//! #     fn n_params(&self) -> usize {
//! #         3
//! #     }
//! #
//! #     fn n_residuals(&self) -> usize {
//! #         self.points.len()
//! #     }
//! # }
//! #
//! # impl LeastSquares for Circle {
//! #     fn eval_f<Sx, Sfx>(
//! #         &self,
//! #         x: &na::Vector<Self::Field, Dyn, Sx>,
//! #         fx: &mut na::Vector<Self::Field, Dyn, Sfx>,
//! #     ) -> Result<(), EvalError>
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #         Sfx: na::storage::StorageMut<Self::Field, Dyn>,
//! #     {
//! #         for (i, (px, py)) in self.points.iter().enumerate() {
//! #             fx[i] = ((px - x[0]).powi(2) + (py - x[1]).powi(2)).sqrt() - x[2];
//! #         }
//! #
//! #         Ok(())
//! #     }
//! # }
//!
//! let f = Circle {
//!     points: vec![(3.0, 1.0), (1.0, 3.0), (-1.0, 1.0), (1.0, -1.0), (2.4, 2.4)],
//! };
//!
//! let mut solver = NllsSolver::builder(&f)
//!     .with_initial(vec![0.0, 0.0, 1.0])
//!     .build();
//!
//! let inform = solver.solve().expect("solver encountered an error");
//!
//! if inform.status() == Status::Success {
//!     println!("solved in {} iterations: {:?}", inform.iter(), solver.x());
//! } else {
//!     println!("maximum number of iteration exceeded");
//! }
//! ```
//!
//! ## License
//!
//! Licensed under MIT.

pub mod algo;
mod core;
pub mod derivatives;
pub mod driver;
pub mod error;
pub mod hessian;
pub mod inform;
pub mod linalg;
pub mod options;
pub mod roots;
pub mod step;

pub use core::*;
pub use driver::NllsSolver;
pub use error::NllsError;
pub use inform::{Inform, Status};
pub use options::{DeltaInit, Method, Model, NllsOptions, Scaling, TrUpdateStrategy};

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
