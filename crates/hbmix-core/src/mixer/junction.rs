//! Nonlinear junction contract
//!
//! Junction models live outside this crate. The mixer drives them through
//! [`Junction`] using the two-sided harmonic convention
//!
//! v(t) = sum_{h=-H..H} V_h exp(j h w_LO t),  V_{-h} = conj(V_h)
//!
//! so that large-signal vectors hold `V_0..=V_H` (V_0 real) and small-signal
//! matrices are indexed by sideband offsets `m + H`, `m` in `-H..=H`.

use std::cell::RefCell;
use std::rc::Rc;

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::error::Result;

/// A nonlinear frequency-converting element
pub trait Junction {
    /// Set the large-signal state to `voltages` (length H + 1) pumped at
    /// `lo_frequency` and return the resulting harmonic currents (length
    /// H + 1, flowing into the junction).
    fn large_signal(
        &mut self,
        voltages: &Array1<Complex64>,
        lo_frequency: f64,
        harmonics: usize,
    ) -> Result<Array1<Complex64>>;

    /// Small-signal admittance at the current state, (2H+1) x (2H+1):
    /// `i_m = sum_n Y[m+H][n+H] v_n` for sideband frequencies `if + m*lo`.
    fn small_signal(&self, if_frequency: f64, harmonics: usize) -> Result<Array2<Complex64>>;

    /// Correlation matrix of the junction's noise currents, (2H+1) x (2H+1),
    /// scaled so that `Z0 * C` is a noise wave correlation in W/Hz.
    fn noise(&self, if_frequency: f64, temperature: f64, harmonics: usize)
        -> Result<Array2<Complex64>>;

    /// Harmonic voltages of the current large-signal state
    fn operating_voltage(&self) -> Array1<Complex64>;

    /// Harmonic currents of the current large-signal state
    fn operating_current(&self) -> Array1<Complex64>;

    /// False until a large-signal state has been set
    fn is_state_valid(&self) -> bool;
}

/// Shared, mutable handle to a junction
pub type JunctionRef = Rc<RefCell<dyn Junction>>;
