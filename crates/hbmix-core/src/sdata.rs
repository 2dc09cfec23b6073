//! Scattering data record
//!
//! [`ScatteringData`] carries everything a linear network contributes at one
//! frequency: the S-matrix, the noise wave correlation matrix C, the embedded
//! source wave vector B, and the impedance they are normalized to.

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::constants::{BOLTZMANN, PLANCK, PROPERTY_TOL};
use crate::error::{Error, Result};
use crate::math::linalg::inv_complex;
use crate::math::matrix_ops::{block_diag, hermitian, identity, make_hermitian, max_abs, sandwich};

/// S, C and B of an N-port at a single frequency
#[derive(Debug, Clone, PartialEq)]
pub struct ScatteringData {
    /// Scattering matrix [N, N]
    pub s: Array2<Complex64>,
    /// Noise wave correlation matrix [N, N] (W/Hz)
    pub c: Array2<Complex64>,
    /// Source wave amplitudes [N] (sqrt(W))
    pub b: Array1<Complex64>,
    /// Normalizing impedance (Ohms); 0 means "don't care"
    pub z_norm: f64,
}

impl ScatteringData {
    /// All-zero record of `n` ports with an unspecified normalization
    pub fn new(n: usize) -> Self {
        Self {
            s: Array2::zeros((n, n)),
            c: Array2::zeros((n, n)),
            b: Array1::zeros(n),
            z_norm: 0.0,
        }
    }

    /// Record from an S-matrix; C and B are zero
    pub fn from_s(s: Array2<Complex64>, z_norm: f64) -> Self {
        let n = s.nrows();
        Self {
            s,
            c: Array2::zeros((n, n)),
            b: Array1::zeros(n),
            z_norm,
        }
    }

    /// Number of ports
    pub fn size(&self) -> usize {
        self.s.nrows()
    }

    /// Resize to `n` ports, zeroing all data but keeping the normalization
    pub fn resize(&mut self, n: usize) {
        self.s = Array2::zeros((n, n));
        self.c = Array2::zeros((n, n));
        self.b = Array1::zeros(n);
    }

    /// Change the normalizing impedance without changing the network.
    ///
    /// With rho = sqrt(new/old), sigma = (rho + 1/rho)/2, delta = (rho - 1/rho)/2
    /// and M = sigma*I - delta*S:
    ///
    /// S' = (sigma*S - delta*I) M^-1, B' = M^-1 B, C' = M^-1 C M^-H
    ///
    /// A record normalized to 0 simply adopts the new impedance.
    pub fn renormalize(&mut self, new_z: f64) -> Result<()> {
        if new_z == self.z_norm {
            return Ok(());
        }
        if self.z_norm == 0.0 {
            self.z_norm = new_z;
            return Ok(());
        }
        if new_z <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "normalizing impedance must be positive, got {}",
                new_z
            )));
        }

        let n = self.size();
        let rho = (new_z / self.z_norm).sqrt();
        let sigma = 0.5 * (rho + 1.0 / rho);
        let delta = 0.5 * (rho - 1.0 / rho);
        let eye = identity(n);

        let m = &eye * sigma - &self.s * delta;
        let m_inv = inv_complex(&m).ok_or(Error::SingularMatrix("renormalization"))?;

        self.s = (&self.s * sigma - &eye * delta).dot(&m_inv);
        self.b = m_inv.dot(&self.b);
        self.c = sandwich(&m_inv, &self.c);
        self.z_norm = new_z;
        Ok(())
    }

    /// Copy of this record normalized to `new_z`
    pub fn renormalized(&self, new_z: f64) -> Result<Self> {
        let mut copy = self.clone();
        copy.renormalize(new_z)?;
        Ok(copy)
    }

    /// Fill C from the fluctuation-dissipation relation for a passive
    /// network at a uniform physical temperature:
    ///
    /// C = d (I - S S^H), d = (hf/2) / tanh(hf/2kT)
    pub fn passive_noise(&mut self, frequency: f64, temperature: f64) {
        let n = self.size();
        let d = thermal_noise_power(frequency, temperature);
        if d == 0.0 {
            self.c = Array2::zeros((n, n));
            return;
        }
        let ssh = self.s.dot(&hermitian(&self.s.view()));
        self.c = (identity(n) - ssh) * d;
        make_hermitian(&mut self.c);
    }

    /// True if C is Hermitian within `tol` (relative to its largest element)
    pub fn is_hermitian_noise(&self, tol: Option<f64>) -> bool {
        let tol = tol.unwrap_or(PROPERTY_TOL);
        let scale = max_abs(&self.c);
        if scale == 0.0 {
            return true;
        }
        let n = self.size();
        for i in 0..n {
            for j in i..n {
                if (self.c[[i, j]] - self.c[[j, i]].conj()).norm() > tol * scale {
                    return false;
                }
            }
        }
        true
    }

    /// Disjoint union: block-diagonal S and C, concatenated B
    pub fn block_union(a: &ScatteringData, b: &ScatteringData) -> ScatteringData {
        let mut src = Array1::<Complex64>::zeros(a.size() + b.size());
        for (i, v) in a.b.iter().chain(b.b.iter()).enumerate() {
            src[i] = *v;
        }
        ScatteringData {
            s: block_diag(&a.s, &b.s),
            c: block_diag(&a.c, &b.c),
            b: src,
            z_norm: if a.z_norm != 0.0 { a.z_norm } else { b.z_norm },
        }
    }

    /// Reorder ports: port `i` of the result is port `order[i]` of `self`
    pub fn permuted(&self, order: &[usize]) -> ScatteringData {
        let n = order.len();
        ScatteringData {
            s: Array2::from_shape_fn((n, n), |(i, j)| self.s[[order[i], order[j]]]),
            c: Array2::from_shape_fn((n, n), |(i, j)| self.c[[order[i], order[j]]]),
            b: Array1::from_shape_fn(n, |i| self.b[order[i]]),
            z_norm: self.z_norm,
        }
    }
}

/// Noise power per unit bandwidth of a thermal source, including zero-point
/// fluctuations: (hf/2) coth(hf/2kT). Tends to kT as f -> 0 and to hf/2 as
/// T -> 0.
pub fn thermal_noise_power(frequency: f64, temperature: f64) -> f64 {
    let f = frequency.abs();
    if temperature <= 0.0 {
        return 0.5 * PLANCK * f;
    }
    let kt = BOLTZMANN * temperature;
    let x = PLANCK * f / (2.0 * kt);
    if x < 1e-6 {
        // x coth(x) = 1 + x^2/3 + O(x^4)
        kt * (1.0 + x * x / 3.0)
    } else {
        0.5 * PLANCK * f / x.tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_port() -> ScatteringData {
        let mut s = Array2::<Complex64>::zeros((2, 2));
        s[[0, 0]] = Complex64::new(0.2, -0.1);
        s[[0, 1]] = Complex64::new(0.7, 0.3);
        s[[1, 0]] = Complex64::new(0.7, 0.3);
        s[[1, 1]] = Complex64::new(-0.15, 0.05);
        let mut d = ScatteringData::from_s(s, 50.0);
        d.b[0] = Complex64::new(1e-3, 2e-3);
        d.passive_noise(5e9, 100.0);
        d
    }

    #[test]
    fn test_resize() {
        let mut d = two_port();
        d.resize(3);
        assert_eq!(d.size(), 3);
        assert_eq!(d.b.len(), 3);
        assert_eq!(d.c.dim(), (3, 3));
        assert_eq!(d.z_norm, 50.0);
    }

    #[test]
    fn test_renormalize_round_trip() {
        let original = two_port();
        let mut d = original.clone();
        d.renormalize(75.0).unwrap();
        assert_eq!(d.z_norm, 75.0);
        assert!((d.s[[0, 0]] - original.s[[0, 0]]).norm() > 1e-3);
        d.renormalize(50.0).unwrap();
        for i in 0..2 {
            assert_relative_eq!(d.b[i].re, original.b[i].re, epsilon = 1e-14);
            assert_relative_eq!(d.b[i].im, original.b[i].im, epsilon = 1e-14);
            for j in 0..2 {
                assert_relative_eq!(d.s[[i, j]].re, original.s[[i, j]].re, epsilon = 1e-12);
                assert_relative_eq!(d.s[[i, j]].im, original.s[[i, j]].im, epsilon = 1e-12);
                let scale = original.c[[0, 0]].norm();
                assert!((d.c[[i, j]] - original.c[[i, j]]).norm() < 1e-10 * scale);
            }
        }
    }

    #[test]
    fn test_renormalize_matched_load() {
        // A 75 Ohm load seen from 50 Ohm: S = 0.2; renormalized to 75 Ohm it is matched
        let mut s = Array2::<Complex64>::zeros((1, 1));
        s[[0, 0]] = Complex64::new(0.2, 0.0);
        let mut d = ScatteringData::from_s(s, 50.0);
        d.renormalize(75.0).unwrap();
        assert_relative_eq!(d.s[[0, 0]].norm(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_renormalize_noop_cases() {
        let mut d = two_port();
        let before = d.clone();
        d.renormalize(50.0).unwrap();
        assert_eq!(d, before);

        d.z_norm = 0.0;
        d.renormalize(25.0).unwrap();
        assert_eq!(d.s, before.s);
        assert_eq!(d.z_norm, 25.0);
    }

    #[test]
    fn test_passive_noise_classical_limit() {
        let mut d = ScatteringData::from_s(Array2::zeros((2, 2)), 50.0);
        d.passive_noise(0.0, 100.0);
        let kt = BOLTZMANN * 100.0;
        assert_relative_eq!(d.c[[0, 0]].re, kt, max_relative = 1e-12);
        assert_relative_eq!(d.c[[1, 1]].re, kt, max_relative = 1e-12);
        assert_eq!(d.c[[0, 1]], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_passive_noise_quantum() {
        let f = 500e9;
        let t = 4.2;
        let mut d = ScatteringData::from_s(Array2::zeros((1, 1)), 50.0);
        d.passive_noise(f, t);
        let x = PLANCK * f / (2.0 * BOLTZMANN * t);
        let expected = 0.5 * PLANCK * f * x.cosh() / x.sinh();
        assert_relative_eq!(d.c[[0, 0]].re, expected, max_relative = 1e-12);

        d.passive_noise(f, 0.0);
        assert_relative_eq!(d.c[[0, 0]].re, 0.5 * PLANCK * f, max_relative = 1e-12);
    }

    #[test]
    fn test_passive_noise_lossless_is_quiet() {
        // Ideal thru: S S^H = I
        let mut s = Array2::<Complex64>::zeros((2, 2));
        s[[0, 1]] = Complex64::new(0.0, 1.0);
        s[[1, 0]] = Complex64::new(0.0, 1.0);
        let mut d = ScatteringData::from_s(s, 50.0);
        d.passive_noise(1e9, 300.0);
        assert!(d.c.iter().all(|c| c.norm() < 1e-35));
    }

    #[test]
    fn test_passive_noise_off_diagonal() {
        let d = two_port();
        let dn = thermal_noise_power(5e9, 100.0);
        let expected = -(d.s[[1, 0]] * d.s[[0, 0]].conj() + d.s[[1, 1]] * d.s[[0, 1]].conj()) * dn;
        assert_relative_eq!(d.c[[1, 0]].re, expected.re, max_relative = 1e-12);
        assert_relative_eq!(d.c[[1, 0]].im, expected.im, max_relative = 1e-12);
        assert!(d.is_hermitian_noise(None));
    }

    #[test]
    fn test_block_union_and_permute() {
        let a = two_port();
        let mut b = ScatteringData::from_s(Array2::from_elem((1, 1), Complex64::new(0.5, 0.0)), 50.0);
        b.b[0] = Complex64::new(3.0, 0.0);
        let u = ScatteringData::block_union(&a, &b);
        assert_eq!(u.size(), 3);
        assert_eq!(u.s[[2, 2]], Complex64::new(0.5, 0.0));
        assert_eq!(u.s[[0, 2]], Complex64::new(0.0, 0.0));
        assert_eq!(u.b[2], Complex64::new(3.0, 0.0));

        let p = u.permuted(&[2, 0, 1]);
        assert_eq!(p.s[[0, 0]], Complex64::new(0.5, 0.0));
        assert_eq!(p.s[[1, 2]], a.s[[0, 1]]);
        assert_eq!(p.b[0], Complex64::new(3.0, 0.0));
    }
}
