//! Junction models shared by the integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use hbmix_core::{Junction, Result};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Ohmic junction: i = G v at every sideband, noiseless
pub struct LinearJunction {
    pub conductance: f64,
    voltages: Array1<Complex64>,
}

impl LinearJunction {
    pub fn shared(conductance: f64) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            conductance,
            voltages: Array1::zeros(0),
        }))
    }
}

impl Junction for LinearJunction {
    fn large_signal(
        &mut self,
        voltages: &Array1<Complex64>,
        _lo_frequency: f64,
        _harmonics: usize,
    ) -> Result<Array1<Complex64>> {
        self.voltages = voltages.clone();
        Ok(self.operating_current())
    }

    fn small_signal(&self, _if_frequency: f64, harmonics: usize) -> Result<Array2<Complex64>> {
        let n = 2 * harmonics + 1;
        Ok(Array2::from_diag_elem(n, Complex64::new(self.conductance, 0.0)))
    }

    fn noise(&self, _if_frequency: f64, _temperature: f64, harmonics: usize) -> Result<Array2<Complex64>> {
        let n = 2 * harmonics + 1;
        Ok(Array2::zeros((n, n)))
    }

    fn operating_voltage(&self) -> Array1<Complex64> {
        self.voltages.clone()
    }

    fn operating_current(&self) -> Array1<Complex64> {
        self.voltages.mapv(|v| v * self.conductance)
    }

    fn is_state_valid(&self) -> bool {
        !self.voltages.is_empty()
    }
}

/// Memoryless polynomial junction: i(t) = g1 v(t) + g3 v(t)^3, noiseless.
/// Harmonics are evaluated on an oversampled time grid.
pub struct CubicJunction {
    pub g1: f64,
    pub g3: f64,
    voltages: Array1<Complex64>,
    currents: Array1<Complex64>,
}

impl CubicJunction {
    pub fn shared(g1: f64, g3: f64) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            g1,
            g3,
            voltages: Array1::zeros(0),
            currents: Array1::zeros(0),
        }))
    }

    fn samples(harmonics: usize) -> usize {
        8 * (harmonics + 1)
    }

    /// Conductance waveform g1 + 3 g3 v(t)^2 as two-sided Fourier coefficients
    fn conductance_spectrum(&self, n: usize) -> Vec<Complex64> {
        let v = waveform(&self.voltages, n);
        let g: Vec<f64> = v.iter().map(|x| self.g1 + 3.0 * self.g3 * x * x).collect();
        spectrum(&g)
    }
}

/// Real waveform with one-sided harmonics `spectrum`, sampled `n` times
fn waveform(spectrum: &Array1<Complex64>, n: usize) -> Vec<f64> {
    let mut buf = vec![Complex64::new(0.0, 0.0); n];
    for (h, v) in spectrum.iter().enumerate() {
        if h == 0 {
            buf[0] = Complex64::new(v.re, 0.0);
        } else {
            buf[h] = *v;
            buf[n - h] = v.conj();
        }
    }
    FftPlanner::<f64>::new().plan_fft_inverse(n).process(&mut buf);
    buf.iter().map(|c| c.re).collect()
}

/// Two-sided Fourier coefficients of real samples
fn spectrum(samples: &[f64]) -> Vec<Complex64> {
    let n = samples.len();
    let mut buf: Vec<Complex64> = samples.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buf);
    buf.iter().map(|c| *c / n as f64).collect()
}

impl Junction for CubicJunction {
    fn large_signal(
        &mut self,
        voltages: &Array1<Complex64>,
        _lo_frequency: f64,
        harmonics: usize,
    ) -> Result<Array1<Complex64>> {
        self.voltages = voltages.clone();
        let n = Self::samples(harmonics);
        let v = waveform(voltages, n);
        let i: Vec<f64> = v.iter().map(|x| self.g1 * x + self.g3 * x * x * x).collect();
        let coeffs = spectrum(&i);
        self.currents = Array1::from_shape_fn(harmonics + 1, |h| {
            if h == 0 {
                Complex64::new(coeffs[0].re, 0.0)
            } else {
                coeffs[h]
            }
        });
        Ok(self.currents.clone())
    }

    fn small_signal(&self, _if_frequency: f64, harmonics: usize) -> Result<Array2<Complex64>> {
        let n = Self::samples(harmonics);
        let g = self.conductance_spectrum(n);
        let size = 2 * harmonics + 1;
        Ok(Array2::from_shape_fn((size, size), |(r, c)| {
            let k = r as i64 - c as i64;
            g[k.rem_euclid(n as i64) as usize]
        }))
    }

    fn noise(&self, _if_frequency: f64, _temperature: f64, harmonics: usize) -> Result<Array2<Complex64>> {
        let n = 2 * harmonics + 1;
        Ok(Array2::zeros((n, n)))
    }

    fn operating_voltage(&self) -> Array1<Complex64> {
        self.voltages.clone()
    }

    fn operating_current(&self) -> Array1<Complex64> {
        self.currents.clone()
    }

    fn is_state_valid(&self) -> bool {
        !self.voltages.is_empty()
    }
}
