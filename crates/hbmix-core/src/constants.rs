//! Physical and numerical constants
//!
//! Provides the physical constants used by the noise calculations and the
//! tolerances shared by the connection algebra and the harmonic balance.

/// Planck constant (J·s)
pub const PLANCK: f64 = 6.626_070_15e-34;

/// Boltzmann constant (J/K)
pub const BOLTZMANN: f64 = 1.380_649e-23;

/// Smallest magnitude allowed for a connection denominator.
/// Smaller denominators are clamped to this magnitude, keeping their phase.
pub const DENOM_EPSILON: f64 = 1e-12;

/// Default tolerance for property checks (hermiticity, reciprocity).
pub const PROPERTY_TOL: f64 = 1e-12;

/// Default reference impedance (Ohms)
pub const DEFAULT_Z_NORMAL: f64 = 50.0;

/// Default ambient temperature (K)
pub const DEFAULT_TEMPERATURE: f64 = 290.0;

/// Maximum number of links followed when resolving a shadowed parameter.
pub const MAX_SHADOW_DEPTH: usize = 32;

/// Relative tolerance used to decide whether a source is active at a frequency.
pub const SOURCE_FREQ_TOL: f64 = 1e-9;
