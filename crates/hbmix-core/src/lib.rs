//! hbmix-core: Linear network composition and harmonic-balance mixer analysis
//!
//! Noisy, source-carrying scattering networks are composed into circuits by
//! pairwise port connections, and nonlinear junctions embedded in such
//! networks are solved by multi-harmonic balance to yield the converted
//! small-signal scattering and noise matrices of a mixer.
//!
//! ## Modules
//!
//! - `sdata` - Scattering data record (S, noise correlation C, sources B)
//! - `connect` - Connection algebra and the `Circuit` composition engine
//! - `device` - `Device` contract and epoch-keyed data cache
//! - `elements` - Primitive devices (branches, impedances, loads, sources)
//! - `context` - Evaluation context and shadowable parameters
//! - `mixer` - Harmonic balance and small-signal mixer analysis
//! - `math` - Linear algebra helpers

pub mod connect;
pub mod constants;
pub mod context;
pub mod device;
pub mod elements;
pub mod error;
pub mod math;
pub mod mixer;
pub mod port;
pub mod sdata;

pub use connect::Circuit;
pub use context::{EvalContext, Parameter};
pub use device::{AsDevice, ComputeMode, Device, DeviceFlags, DeviceRef};
pub use error::{Error, Result};
pub use mixer::{BalanceOptions, BalanceReport, BalanceStart, Junction, JunctionRef, Mixer};
pub use port::{DeviceId, Port};
pub use sdata::ScatteringData;
