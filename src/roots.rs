//! Real roots of low-degree polynomials.
//!
//! Polynomials are given by their coefficients in increasing order of degree,
//! that is, `a0 + a1 x + a2 x^2 (+ a3 x^3)`. The roots are returned in
//! increasing order and every root is refined by one step of Newton method.

use nalgebra::{convert, ComplexField, RealField as _};

use crate::core::RealField;

/// Real roots of a polynomial, sorted in increasing order. A double root is
/// reported twice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roots<F> {
    len: usize,
    values: [F; 3],
}

impl<F: RealField> Roots<F> {
    fn new() -> Self {
        Self {
            len: 0,
            values: [convert(0.0); 3],
        }
    }

    fn push(&mut self, root: F) {
        self.values[self.len] = root;
        self.len += 1;
    }

    fn sort(&mut self) {
        let values = &mut self.values[..self.len];
        values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Number of real roots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no real roots.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The roots in increasing order.
    pub fn as_slice(&self) -> &[F] {
        &self.values[..self.len]
    }
}

/// Finds the real roots of `a0 + a1 x + a2 x^2`.
///
/// When `|a0 a2| <= tol a1^2`, the polynomial is treated as nearly linear
/// and its roots are approximated without forming the discriminant.
pub fn quadratic<F: RealField>(a0: F, a1: F, a2: F, tol: F) -> Roots<F> {
    let zero: F = convert(0.0);
    let half: F = convert(0.5);
    let four: F = convert(4.0);

    let mut roots = Roots::new();

    if (a0 * a2).abs() > tol * a1 * a1 {
        let disc = a1 * a1 - four * a2 * a0;
        let eps_a1 = F::EPSILON * a1;

        if disc.abs() <= eps_a1 * eps_a1 {
            // Double root.
            let root = -half * a1 / a2;
            roots.push(root);
            roots.push(root);
        } else if disc < zero {
            // Complex roots.
        } else {
            // Avoid cancellation by computing the larger root in magnitude
            // first and the other from the product of the roots.
            let d = -half * (a1 + disc.sqrt().copysign(a1));
            roots.push(d / a2);
            roots.push(a0 / d);
            roots.sort();
        }
    } else if a2 == zero {
        if a1 == zero {
            if a0 == zero {
                roots.push(zero);
            }
        } else {
            roots.push(-a0 / a1);
        }
    } else {
        // The constant term is negligible, so one root is (close to) zero.
        let other = -a1 / a2;
        if other > zero {
            roots.push(zero);
            roots.push(other);
        } else {
            roots.push(other);
            roots.push(zero);
        }
    }

    for root in roots.values[..roots.len].iter_mut() {
        let p = (a2 * *root + a1) * *root + a0;
        let pprime = convert::<_, F>(2.0) * a2 * *root + a1;
        if pprime != zero {
            *root -= p / pprime;
        }
    }

    roots
}

/// Finds the real roots of `a0 + a1 x + a2 x^2 + a3 x^3`.
///
/// Degenerates to [`quadratic`] when `a3` is zero.
pub fn cubic<F: RealField>(a0: F, a1: F, a2: F, a3: F, tol: F) -> Roots<F> {
    let zero: F = convert(0.0);
    let one: F = convert(1.0);
    let two: F = convert(2.0);
    let three: F = convert(3.0);

    if a3 == zero {
        return quadratic(a0, a1, a2, tol);
    }

    let mut roots = Roots::new();

    if a0 == zero {
        // Zero is a root and the rest are roots of a3 x^2 + a2 x + a1.
        roots.push(zero);
        for &root in quadratic(a1, a2, a3, tol).as_slice() {
            roots.push(root);
        }
        roots.sort();
        return roots;
    }

    // Transform to the depressed cubic t^3 + p t + q with x = t - b / 3.
    let b = a2 / a3;
    let c = a1 / a3;
    let d = a0 / a3;

    let p = c - b * b / three;
    let q = two * b * b * b / convert(27.0) - b * c / three + d;
    let disc = (q / two).powi(2) + (p / three).powi(3);
    let shift = -b / three;

    if disc > zero {
        // One real root by Cardano formula, with the sign chosen to avoid
        // cancellation.
        let big = -(q.abs() / two + disc.sqrt()).cbrt().copysign(q);
        let small = if big != zero { -p / (three * big) } else { zero };
        roots.push(big + small + shift);
    } else if p == zero {
        // Triple root.
        roots.push(shift);
        roots.push(shift);
        roots.push(shift);
    } else {
        // Three real roots by the trigonometric method.
        let m = two * (-p / three).sqrt();
        let cos = (three * q / (two * p) * (-three / p).sqrt())
            .max(-one)
            .min(one);
        let theta = cos.acos() / three;
        let sector = two * F::pi() / three;

        for k in 0..3 {
            let k: F = convert(k as f64);
            roots.push(m * (theta - k * sector).cos() + shift);
        }
        roots.sort();
    }

    for root in roots.values[..roots.len].iter_mut() {
        let p = ((a3 * *root + a2) * *root + a1) * *root + a0;
        let pprime = (three * a3 * *root + two * a2) * *root + a1;
        if pprime != zero {
            *root -= p / pprime;
        }
    }

    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    const TOL: f64 = 10.0 * f64::EPSILON;

    #[test]
    fn quadratic_two_roots() {
        // (x - 1)(x - 2)
        let roots = quadratic(2.0, -3.0, 1.0, TOL);
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots.as_slice()[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(roots.as_slice()[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn quadratic_double_root() {
        // (x + 3)^2
        let roots = quadratic(9.0, 6.0, 1.0, TOL);
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots.as_slice()[0], -3.0, epsilon = 1e-12);
        assert_relative_eq!(roots.as_slice()[1], -3.0, epsilon = 1e-12);
    }

    #[test]
    fn quadratic_complex_roots() {
        let roots = quadratic(1.0, 0.0, 1.0, TOL);
        assert!(roots.is_empty());
    }

    #[test]
    fn quadratic_degenerate() {
        assert_eq!(quadratic(0.0, 0.0, 0.0, TOL).as_slice(), &[0.0]);
        assert!(quadratic(1.0, 0.0, 0.0, TOL).is_empty());
        assert_eq!(quadratic(-4.0, 2.0, 0.0, TOL).as_slice(), &[2.0]);
    }

    #[test]
    fn quadratic_negligible_constant() {
        // x (x - 4) with a tiny perturbation in the constant term.
        let roots = quadratic(1e-20, -4.0, 1.0, TOL);
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots.as_slice()[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(roots.as_slice()[1], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn cubic_three_roots() {
        // (x + 2)(x + 1)(x - 3)
        let roots = cubic(-6.0, -7.0, 0.0, 1.0, TOL);
        assert_eq!(roots.len(), 3);
        assert_relative_eq!(roots.as_slice()[0], -2.0, epsilon = 1e-10);
        assert_relative_eq!(roots.as_slice()[1], -1.0, epsilon = 1e-10);
        assert_relative_eq!(roots.as_slice()[2], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn cubic_one_root() {
        // (x - 1)(x^2 + 1)
        let roots = cubic(-1.0, 1.0, -1.0, 1.0, TOL);
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots.as_slice()[0], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn cubic_zero_root() {
        // x (x - 1)(x - 2), scaled
        let roots = cubic(0.0, 4.0, -6.0, 2.0, TOL);
        assert_eq!(roots.len(), 3);
        assert_relative_eq!(roots.as_slice()[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(roots.as_slice()[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(roots.as_slice()[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn cubic_triple_root() {
        // (x - 2)^3
        let roots = cubic(-8.0, 12.0, -6.0, 1.0, TOL);
        assert!(!roots.is_empty());
        for &root in roots.as_slice() {
            assert_relative_eq!(root, 2.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn cubic_falls_back_to_quadratic() {
        assert_eq!(
            cubic(2.0, -3.0, 1.0, 0.0, TOL),
            quadratic(2.0, -3.0, 1.0, TOL)
        );
    }
}
