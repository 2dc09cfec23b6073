//! Error types for hbmix-core.
//!
//! Every variant is a structural or usage fault: malformed circuit topology,
//! an incomplete mixer, out-of-range frequencies. Harmonic-balance
//! non-convergence is not an error; it is reported through
//! [`BalanceReport`](crate::mixer::BalanceReport).

use thiserror::Error;

use crate::port::Port;

#[derive(Debug, Error)]
pub enum Error {
    #[error("port {0} is already connected or does not belong to the circuit")]
    PortInUse(Port),

    #[error("port {0} cannot be connected to itself")]
    SelfConnection(Port),

    #[error("exposed port {0} is not an open port of the circuit")]
    UnknownPort(Port),

    #[error("circuit evaluates to {actual} ports but {expected} are exposed")]
    PortCountMismatch { expected: usize, actual: usize },

    #[error("mixer is incomplete: {0}")]
    IncompleteMixer(String),

    #[error("LO frequency must be positive, got {0} Hz")]
    InvalidLoFrequency(f64),

    #[error("IF frequency {if_freq} Hz is outside [0, {lo_freq}) Hz")]
    InvalidIfFrequency { if_freq: f64, lo_freq: f64 },

    #[error("mixer has no valid balanced operating point")]
    NotBalanced,

    #[error("singular matrix in {0}")]
    SingularMatrix(&'static str),

    #[error("shadow parameter chain exceeds {0} links")]
    ShadowDepth(usize),

    #[error("invalid matrix dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
