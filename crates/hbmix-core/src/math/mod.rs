//! Mathematical helpers module
//!
//! Dense linear algebra (nalgebra backed) and ndarray matrix utilities.

pub mod linalg;
pub mod matrix_ops;

pub use linalg::{inv_complex, solve_complex, solve_real};
pub use matrix_ops::*;
