//! Matrix operation helpers
//!
//! Provides utility functions for common matrix operations to reduce
//! boilerplate nested loops in the network and mixer code.

use ndarray::{s, Array2, ArrayView2};
use num_complex::Complex64;

/// Identity matrix of given size
#[inline]
pub fn identity(n: usize) -> Array2<Complex64> {
    Array2::<Complex64>::eye(n)
}

/// Conjugate transpose
#[inline]
pub fn hermitian(a: &ArrayView2<Complex64>) -> Array2<Complex64> {
    a.t().mapv(|c| c.conj())
}

/// `m * c * m^H`
pub fn sandwich(m: &Array2<Complex64>, c: &Array2<Complex64>) -> Array2<Complex64> {
    m.dot(c).dot(&hermitian(&m.view()))
}

/// Replace `c` by its Hermitian part `(c + c^H) / 2`
pub fn make_hermitian(c: &mut Array2<Complex64>) {
    let n = c.nrows();
    for i in 0..n {
        c[[i, i]].im = 0.0;
        for j in (i + 1)..n {
            let avg = (c[[i, j]] + c[[j, i]].conj()) * 0.5;
            c[[i, j]] = avg;
            c[[j, i]] = avg.conj();
        }
    }
}

/// Largest element magnitude
pub fn max_abs(a: &Array2<Complex64>) -> f64 {
    a.iter().fold(0.0_f64, |acc, c| acc.max(c.norm()))
}

/// Copy `block` into `target` with its top-left corner at (row, col)
#[inline]
pub fn place_block(target: &mut Array2<Complex64>, row: usize, col: usize, block: &Array2<Complex64>) {
    let (m, n) = block.dim();
    target
        .slice_mut(s![row..row + m, col..col + n])
        .assign(block);
}

/// Block-diagonal concatenation of two square matrices
pub fn block_diag(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    let na = a.nrows();
    let nb = b.nrows();
    let mut result = Array2::<Complex64>::zeros((na + nb, na + nb));
    place_block(&mut result, 0, 0, a);
    place_block(&mut result, na, na, b);
    result
}
