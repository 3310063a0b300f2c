use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use std::cmp::Ordering;
use std::fmt;

/// Failure of a dense decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct LinalgError {
    pub message: String,
}

impl LinalgError {
    fn new(message: &str) -> Self {
        LinalgError {
            message: String::from(message),
        }
    }
}

impl fmt::Display for LinalgError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "linear algebra failure: {}", self.message)
    }
}

impl std::error::Error for LinalgError {}

fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Eigenvalues (ascending) and eigenvectors (columns) of a real symmetric matrix.
/// The input is symmetrized before the decomposition, ties in the eigenvalues keep the
/// order of the underlying solver.
pub fn eigh(a: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>), LinalgError> {
    if a.nrows() != a.ncols() {
        return Err(LinalgError::new("matrix is not square"));
    }
    let n: usize = a.nrows();
    if n == 0 {
        return Ok((Array1::zeros(0), Array2::zeros((0, 0))));
    }
    if a.iter().any(|x| !x.is_finite()) {
        return Err(LinalgError::new("matrix contains non-finite elements"));
    }
    let sym: DMatrix<f64> = DMatrix::from_fn(n, n, |i, j| 0.5 * (a[[i, j]] + a[[j, i]]));
    let eig = SymmetricEigen::new(sym);
    if eig.eigenvalues.iter().any(|x| !x.is_finite()) {
        return Err(LinalgError::new("eigenvalues are not finite"));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        eig.eigenvalues[i]
            .partial_cmp(&eig.eigenvalues[j])
            .unwrap_or(Ordering::Equal)
            .then(i.cmp(&j))
    });
    let values: Array1<f64> = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    let vectors: Array2<f64> =
        Array2::from_shape_fn((n, n), |(r, c)| eig.eigenvectors[(r, order[c])]);
    Ok((values, vectors))
}

/// Symmetric inverse square root S^{-1/2} of a positive definite matrix.
pub fn inv_sqrt(s: ArrayView2<f64>, threshold: f64) -> Result<Array2<f64>, LinalgError> {
    let (values, vectors): (Array1<f64>, Array2<f64>) = eigh(s)?;
    if values.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }
    let smallest: f64 = *values.min().map_err(|_| LinalgError::new("empty spectrum"))?;
    if smallest <= threshold {
        return Err(LinalgError::new("matrix is not positive definite"));
    }
    let scaled: Array2<f64> = &vectors * &values.mapv(|x| 1.0 / x.sqrt());
    Ok(scaled.dot(&vectors.t()))
}

/// Solves the linear system A x = b by LU decomposition.
pub fn solve(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Option<Array1<f64>> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        return None;
    }
    let rhs: DVector<f64> = DVector::from_iterator(b.len(), b.iter().cloned());
    let x: DVector<f64> = to_dmatrix(a).lu().solve(&rhs)?;
    if x.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(x.iter().cloned().collect())
}

/// Inverse of a square matrix, None if it is singular.
pub fn inv(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    if a.nrows() != a.ncols() {
        return None;
    }
    let inverse: DMatrix<f64> = to_dmatrix(a).try_inverse()?;
    Some(Array2::from_shape_fn((a.nrows(), a.ncols()), |(i, j)| {
        inverse[(i, j)]
    }))
}

/// Largest absolute element of `a - b`.
pub fn max_abs_deviation(a: ArrayView2<f64>, b: ArrayView2<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0, |acc: f64, (x, y)| acc.max((x - y).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;

    #[test]
    fn eigh_sorts_ascending_and_reconstructs() {
        let a: Array2<f64> = array![[2.0, -1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, -1.0, 2.0]];
        let (values, vectors) = eigh(a.view()).unwrap();
        assert!(values[0] <= values[1] && values[1] <= values[2]);
        let rebuilt: Array2<f64> = (&vectors * &values).dot(&vectors.t());
        assert!(rebuilt.abs_diff_eq(&a, 1e-12));
    }

    #[test]
    fn inverse_square_root_of_overlap() {
        let s: Array2<f64> = array![[1.0, 0.2], [0.2, 1.0]];
        let x: Array2<f64> = inv_sqrt(s.view(), 1e-10).unwrap();
        let unit: Array2<f64> = x.dot(&s).dot(&x);
        assert!(unit.abs_diff_eq(&Array2::eye(2), 1e-12));
    }

    #[test]
    fn singular_overlap_is_rejected() {
        let s: Array2<f64> = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(inv_sqrt(s.view(), 1e-10).is_err());
        assert!(inv(s.view()).is_none());
    }

    #[test]
    fn lu_solve() {
        let a: Array2<f64> = array![[3.0, 1.0], [1.0, 2.0]];
        let b: Array1<f64> = array![9.0, 8.0];
        let x: Array1<f64> = solve(a.view(), b.view()).unwrap();
        assert!(x.abs_diff_eq(&array![2.0, 3.0], 1e-12));
    }
}
