//! Core abstractions and types for the solver.
//!
//! *Users* are mainly interested in implementing the [`LeastSquares`] trait
//! for their model. Only the residuals are required, the Jacobian matrix is
//! approximated by forward differences if not provided.

mod base;
mod least_squares;

pub use base::*;
pub use least_squares::*;
