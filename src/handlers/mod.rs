//! HTTP handlers for brand-scoped requests and operator endpoints.

pub mod brand;
pub use brand::*;
