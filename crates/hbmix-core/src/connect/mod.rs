//! Network connection module
//!
//! Connection kernels on [`ScatteringData`](crate::sdata::ScatteringData)
//! and the [`Circuit`] composition engine built on them.

pub mod algebra;
mod circuit;

pub use algebra::{block_union, interconnect, intraconnect};
pub use circuit::Circuit;
