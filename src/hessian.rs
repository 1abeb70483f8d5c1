//! Quasi-Newton approximation of the second-order term of the Hessian.
//!
//! The Hessian of `0.5 || f(x) ||^2` is `J^T J + sum_i f_i Hess(f_i)`. When the
//! Hessians of the residuals are not available, the second term is
//! approximated by the update of Dennis, Gay and Welsch (the NL2SOL update),
//! which uses the difference of gradients `y` and the difference `y#` of the
//! new residuals multiplied by the new and old Jacobian matrices.
//!
//! # References
//!
//! \[1\] [An Adaptive Nonlinear Least-Squares
//! Algorithm](https://dl.acm.org/doi/10.1145/355958.355965)
//!
//! \[2\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)

use log::debug;
use nalgebra::{convert, ComplexField, DimName, Dyn, OMatrix, OVector, RealField as _, U1};

use crate::{core::RealField, linalg};

/// Preallocated buffers for [`rank_one_update`].
pub struct RankOneWork<F: RealField> {
    sks: OVector<F, Dyn>,
    ysharp_sks: OVector<F, Dyn>,
}

impl<F: RealField> RankOneWork<F> {
    /// Allocates buffers for problem with `n` variables.
    pub fn new(n: usize) -> Self {
        Self {
            sks: OVector::zeros_generic(Dyn(n), U1::name()),
            ysharp_sks: OVector::zeros_generic(Dyn(n), U1::name()),
        }
    }
}

/// Updates the approximation `hf` given the step `d`, the gradient difference
/// `y` and `y_sharp`.
///
/// The update is skipped when `|d^T y|` is negligible. Returns whether the
/// update was applied.
pub fn rank_one_update<F: RealField>(
    hf: &mut OMatrix<F, Dyn, Dyn>,
    d: &OVector<F, Dyn>,
    y: &OVector<F, Dyn>,
    y_sharp: &OVector<F, Dyn>,
    work: &mut RankOneWork<F>,
) -> bool {
    let RankOneWork { sks, ysharp_sks } = work;

    let zero: F = convert(0.0);
    let one: F = convert(1.0);

    let yts = d.dot(y);
    if yts.abs() < F::EPSILON * convert(10.0) {
        debug!("skip rank-one update, d^T y = {}", yts);
        return false;
    }

    // Compute (y# - S d) with S being the current approximation.
    hf.mul_to(d, sks);
    ysharp_sks.copy_from(y_sharp);
    *ysharp_sks -= &*sks;

    // Scale the current approximation so that it is not too large.
    let denom = d.dot(sks);
    let alpha = if denom == zero {
        one
    } else {
        one.min((d.dot(y_sharp) / denom).abs())
    };
    *hf *= alpha;

    // S += ((y# - S d) y^T + y (y# - S d)^T) / (y^T d)
    //      - ((y# - S d)^T d) / (y^T d)^2 y y^T
    let yts_inv = one / yts;
    linalg::outer_product_update(hf, yts_inv, ysharp_sks, y);
    linalg::outer_product_update(hf, yts_inv, y, ysharp_sks);
    linalg::outer_product_update(hf, -ysharp_sks.dot(d) / (yts * yts), y, y);

    true
}
