//! The trust-region method and the solvers of its subproblem.

pub mod dtrs;
pub mod more_sorensen;
pub mod trust_region;

pub use trust_region::TrustRegion;
