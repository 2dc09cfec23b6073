//! Network connection kernels
//!
//! Closed-form merges of scattering data at one frequency: two ports of one
//! network tied together (intra), one port of each of two networks tied
//! together (inter), and the disjoint union of two networks.
//!
//! Based on the "sub-network growth" algorithm described in:
//! - Filipsson, Gunnar, "A New General Computer Algorithm for S-Matrix Calculation
//!   of Interconnected Multiports", 11th European Microwave Conference, 1981.
//!
//! Noise and source waves propagate through the same linear map as the
//! scattered waves. Every output wave is a combination of its own input wave
//! and the waves of the (at most two) consumed ports, so C' and B' are built
//! from sparse [`WaveMix`] rows instead of dense products.

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::constants::DENOM_EPSILON;
use crate::device::ComputeMode;
use crate::sdata::ScatteringData;

const ONE: Complex64 = Complex64 { re: 1.0, im: 0.0 };
const ZERO: Complex64 = Complex64 { re: 0.0, im: 0.0 };

/// Clamp a connection denominator to magnitude >= [`DENOM_EPSILON`]
fn clamp_denominator(denom: Complex64) -> Complex64 {
    let mag = denom.norm();
    if mag >= DENOM_EPSILON {
        return denom;
    }
    log::debug!("connection denominator {} clamped to {}", denom, DENOM_EPSILON);
    if mag == 0.0 {
        Complex64::new(DENOM_EPSILON, 0.0)
    } else {
        denom * (DENOM_EPSILON / mag)
    }
}

/// One output wave as a weighted sum of at most three input waves
#[derive(Debug, Clone, Copy)]
struct WaveMix {
    terms: [(usize, Complex64); 3],
    len: usize,
}

impl WaveMix {
    fn empty() -> Self {
        Self {
            terms: [(0, ZERO); 3],
            len: 0,
        }
    }

    fn push(mut self, index: usize, weight: Complex64) -> Self {
        self.terms[self.len] = (index, weight);
        self.len += 1;
        self
    }

    fn terms(&self) -> &[(usize, Complex64)] {
        &self.terms[..self.len]
    }
}

/// Source vector image: b'_i = sum_p w_ip b_p
fn mix_sources(rows: &[WaveMix], b: &Array1<Complex64>) -> Array1<Complex64> {
    Array1::from_shape_fn(rows.len(), |i| {
        rows[i].terms().iter().map(|&(p, w)| w * b[p]).sum()
    })
}

/// Correlation image: C'_ij = sum_pq w_ip C_pq conj(w_jq)
fn mix_correlation(rows: &[WaveMix], c: &Array2<Complex64>) -> Array2<Complex64> {
    let n = rows.len();
    let mut out = Array2::<Complex64>::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let mut sum = ZERO;
            for &(p, x) in rows[i].terms() {
                for &(q, y) in rows[j].terms() {
                    sum += x * c[[p, q]] * y.conj();
                }
            }
            if i == j {
                out[[i, i]] = Complex64::new(sum.re, 0.0);
            } else {
                out[[i, j]] = sum;
                out[[j, i]] = sum.conj();
            }
        }
    }
    out
}

/// Connect port `k` to port `l` of the same network.
///
/// The result has the ports of `d` except `k` and `l`, in their original
/// order. `noisy` says whether `d.c` may be nonzero.
pub fn intraconnect(
    d: &ScatteringData,
    k: usize,
    l: usize,
    noisy: bool,
    mode: ComputeMode,
) -> ScatteringData {
    let n = d.size();
    debug_assert!(k < n && l < n && k != l);
    let s = &d.s;

    let denom = clamp_denominator((ONE - s[[k, l]]) * (ONE - s[[l, k]]) - s[[k, k]] * s[[l, l]]);
    let outer: Vec<usize> = (0..n).filter(|&i| i != k && i != l).collect();
    let m = outer.len();

    // Coefficients of the consumed waves k and l in each surviving row
    let t1: Vec<Complex64> = outer
        .iter()
        .map(|&i| (s[[i, l]] * (ONE - s[[l, k]]) + s[[l, l]] * s[[i, k]]) / denom)
        .collect();
    let t2: Vec<Complex64> = outer
        .iter()
        .map(|&i| (s[[i, k]] * (ONE - s[[k, l]]) + s[[k, k]] * s[[i, l]]) / denom)
        .collect();

    let mut result = ScatteringData::new(m);
    result.z_norm = d.z_norm;
    for (a, &i) in outer.iter().enumerate() {
        for (b, &j) in outer.iter().enumerate() {
            result.s[[a, b]] = s[[i, j]] + t1[a] * s[[k, j]] + t2[a] * s[[l, j]];
        }
    }

    let rows: Vec<WaveMix> = outer
        .iter()
        .enumerate()
        .map(|(a, &i)| WaveMix::empty().push(i, ONE).push(k, t1[a]).push(l, t2[a]))
        .collect();
    result.b = mix_sources(&rows, &d.b);
    if noisy && mode.wants_noise() {
        result.c = mix_correlation(&rows, &d.c);
    }
    result
}

/// Connect port `k` of network `a` to port `l` of network `b`.
///
/// The result has the ports of `a` except `k`, followed by the ports of `b`
/// except `l`. `noisy` flags which inputs may carry noise; each of the four
/// combinations skips the work for quiet inputs.
pub fn interconnect(
    a: &ScatteringData,
    k: usize,
    b: &ScatteringData,
    l: usize,
    noisy: (bool, bool),
    mode: ComputeMode,
) -> ScatteringData {
    let na = a.size();
    let nb = b.size();
    debug_assert!(k < na && l < nb);
    let sa = &a.s;
    let sb = &b.s;

    let denom = clamp_denominator(ONE - sa[[k, k]] * sb[[l, l]]);
    let outer_a: Vec<usize> = (0..na).filter(|&i| i != k).collect();
    let outer_b: Vec<usize> = (0..nb).filter(|&i| i != l).collect();
    let ma = outer_a.len();
    let m = ma + outer_b.len();

    // Column factors: A_ik / denom and B_il / denom
    let ak: Vec<Complex64> = outer_a.iter().map(|&i| sa[[i, k]] / denom).collect();
    let bl: Vec<Complex64> = outer_b.iter().map(|&i| sb[[i, l]] / denom).collect();

    let mut result = ScatteringData::new(m);
    result.z_norm = a.z_norm;
    for (p, &i) in outer_a.iter().enumerate() {
        for (q, &j) in outer_a.iter().enumerate() {
            result.s[[p, q]] = sa[[i, j]] + ak[p] * sb[[l, l]] * sa[[k, j]];
        }
        for (q, &j) in outer_b.iter().enumerate() {
            result.s[[p, ma + q]] = ak[p] * sb[[l, j]];
        }
    }
    for (p, &i) in outer_b.iter().enumerate() {
        for (q, &j) in outer_b.iter().enumerate() {
            result.s[[ma + p, ma + q]] = sb[[i, j]] + bl[p] * sa[[k, k]] * sb[[l, j]];
        }
        for (q, &j) in outer_a.iter().enumerate() {
            result.s[[ma + p, q]] = bl[p] * sa[[k, j]];
        }
    }

    // Rows of the maps taking A's and B's waves to the output waves
    let mut rows_a = Vec::with_capacity(m);
    let mut rows_b = Vec::with_capacity(m);
    for (p, &i) in outer_a.iter().enumerate() {
        rows_a.push(WaveMix::empty().push(i, ONE).push(k, ak[p] * sb[[l, l]]));
        rows_b.push(WaveMix::empty().push(l, ak[p]));
    }
    for (p, &i) in outer_b.iter().enumerate() {
        rows_a.push(WaveMix::empty().push(k, bl[p]));
        rows_b.push(WaveMix::empty().push(i, ONE).push(l, bl[p] * sa[[k, k]]));
    }

    result.b = mix_sources(&rows_a, &a.b) + mix_sources(&rows_b, &b.b);
    if mode.wants_noise() {
        result.c = match noisy {
            (true, true) => mix_correlation(&rows_a, &a.c) + mix_correlation(&rows_b, &b.c),
            (true, false) => mix_correlation(&rows_a, &a.c),
            (false, true) => mix_correlation(&rows_b, &b.c),
            (false, false) => Array2::zeros((m, m)),
        };
    }
    result
}

/// Disjoint union of two networks: ports of `a` followed by ports of `b`
pub fn block_union(a: &ScatteringData, b: &ScatteringData, mode: ComputeMode) -> ScatteringData {
    let mut result = ScatteringData::block_union(a, b);
    if !mode.wants_noise() {
        result.c.fill(ZERO);
    }
    result
}
