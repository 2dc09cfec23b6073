//! Dense solves for renormalization, connection and harmonic balance
//!
//! Scattering data is stored as ndarray; the factorizations come from
//! nalgebra's LU. `num_complex::Complex64` is the scalar type of both, so
//! matrices cross over element by element.

use nalgebra::{DMatrix, DVector, Scalar};
use ndarray::{Array1, Array2};
use num_complex::Complex64;

fn to_dmatrix<T: Scalar>(a: &Array2<T>) -> DMatrix<T> {
    let (m, n) = a.dim();
    DMatrix::from_fn(m, n, |i, j| a[[i, j]].clone())
}

fn to_dvector<T: Scalar>(b: &Array1<T>) -> DVector<T> {
    DVector::from_fn(b.len(), |i, _| b[i].clone())
}

/// True when `a` is n x n and `b`, if given, has n entries
fn is_square_system<A, B>(a: &Array2<A>, b: Option<&Array1<B>>) -> bool {
    let (m, n) = a.dim();
    m == n && b.map_or(true, |b| b.len() == m)
}

/// Inverse of a complex matrix.
///
/// `None` if the matrix is singular or not square. The empty matrix is its
/// own inverse.
pub fn inv_complex(a: &Array2<Complex64>) -> Option<Array2<Complex64>> {
    if !is_square_system::<_, Complex64>(a, None) {
        return None;
    }
    let n = a.nrows();
    if n == 0 {
        return Some(Array2::zeros((0, 0)));
    }
    let inv = to_dmatrix(a).try_inverse()?;
    Some(Array2::from_shape_fn((n, n), |(i, j)| inv[(i, j)]))
}

/// Solve the Newton system J dx = r. `None` if J is singular or the step
/// is not finite.
pub fn solve_real(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    if !is_square_system(a, Some(b)) {
        return None;
    }
    if b.is_empty() {
        return Some(Array1::zeros(0));
    }
    let x = to_dmatrix(a).lu().solve(&to_dvector(b))?;
    if x.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Array1::from_iter(x.iter().copied()))
}

/// Solve A x = b over the complex numbers
pub fn solve_complex(a: &Array2<Complex64>, b: &Array1<Complex64>) -> Option<Array1<Complex64>> {
    if !is_square_system(a, Some(b)) {
        return None;
    }
    if b.is_empty() {
        return Some(Array1::zeros(0));
    }
    let x = to_dmatrix(a).lu().solve(&to_dvector(b))?;
    Some(Array1::from_iter(x.iter().copied()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inv_complex() {
        // Renormalization matrix sigma I - delta S of a lossy 2-port
        let s = Array2::from_shape_vec(
            (2, 2),
            vec![
                Complex64::new(0.2, -0.1),
                Complex64::new(0.7, 0.3),
                Complex64::new(0.7, 0.3),
                Complex64::new(-0.4, 0.2),
            ],
        )
        .unwrap();
        let m = Array2::<Complex64>::eye(2).mapv(|v| v * 1.25) - s.mapv(|v| v * 0.75);

        let product = m.dot(&inv_complex(&m).unwrap());
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[[i, j]].re, expected, epsilon = 1e-12);
                assert_relative_eq!(product[[i, j]].im, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_inv_complex_singular() {
        let a = Array2::<Complex64>::from_elem((2, 2), Complex64::new(1.0, 1.0));
        assert!(inv_complex(&a).is_none());
        assert_eq!(inv_complex(&Array2::zeros((0, 0))).unwrap().dim(), (0, 0));
    }

    #[test]
    fn test_solve_real() {
        // [2 1; 1 3] x = [3; 5] -> x = [0.8, 1.4]
        let a = Array2::from_shape_vec((2, 2), vec![2.0, 1.0, 1.0, 3.0]).unwrap();
        let b = Array1::from_vec(vec![3.0, 5.0]);
        let x = solve_real(&a, &b).unwrap();
        assert_relative_eq!(x[0], 0.8, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_real_singular() {
        let a = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 2.0, 4.0]).unwrap();
        let b = Array1::from_vec(vec![1.0, 1.0]);
        assert!(solve_real(&a, &b).is_none());
    }

    #[test]
    fn test_solve_complex() {
        let mut a = Array2::<Complex64>::zeros((2, 2));
        a[[0, 0]] = Complex64::new(0.0, 1.0);
        a[[1, 1]] = Complex64::new(2.0, 0.0);
        let b = Array1::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(4.0, 2.0)]);
        let x = solve_complex(&a, &b).unwrap();
        assert_relative_eq!(x[0].im, -1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1].re, 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1].im, 1.0, epsilon = 1e-12);
    }
}
