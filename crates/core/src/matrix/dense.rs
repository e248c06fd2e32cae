use nalgebra::{DMatrix, DVector};

/// Solve a symmetric positive-definite system A*x = b via Cholesky decomposition.
/// Returns x, or None if Cholesky fails (matrix not SPD).
pub fn solve_spd(a: &DMatrix<f64>, b: &[f64]) -> Option<Vec<f64>> {
    let chol = a.clone().cholesky()?;
    let b_vec = DVector::from_column_slice(b);
    let x = chol.solve(&b_vec);
    Some(x.as_slice().to_vec())
}

/// Compute the Cholesky factorization of a symmetric positive-definite matrix.
/// Returns the lower-triangular factor L such that A = L * L^T.
pub fn cholesky_lower(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let chol = a.clone().cholesky()?;
    Some(chol.l())
}

/// Compute the log-determinant of an SPD matrix via Cholesky: log|A| = 2 * sum(log(diag(L))).
pub fn log_determinant_spd(a: &DMatrix<f64>) -> Option<f64> {
    let l = cholesky_lower(a)?;
    let logdet = 2.0 * (0..l.nrows()).map(|i| l[(i, i)].ln()).sum::<f64>();
    Some(logdet)
}

/// Compute the inverse of an SPD matrix via Cholesky.
pub fn inverse_spd(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let chol = a.clone().cholesky()?;
    Some(chol.inverse())
}

/// Compute the trace of a matrix.
pub fn trace(a: &DMatrix<f64>) -> f64 {
    (0..a.nrows().min(a.ncols())).map(|i| a[(i, i)]).sum()
}

/// Quadratic form c' A c.
pub fn quadratic_form(c: &DVector<f64>, a: &DMatrix<f64>) -> f64 {
    (c.transpose() * a * c)[(0, 0)]
}

/// Numerical rank of a symmetric matrix: eigenvalues above
/// `max|λ| · n · ε` count.
pub fn symmetric_rank(a: &DMatrix<f64>) -> usize {
    let n = a.nrows();
    if n == 0 {
        return 0;
    }
    let eigenvalues = a.clone().symmetric_eigenvalues();
    let largest = eigenvalues.iter().fold(0.0f64, |m, l| m.max(l.abs()));
    let tol = largest * n as f64 * f64::EPSILON;
    eigenvalues.iter().filter(|l| l.abs() > tol).count()
}

/// Principal submatrix of `a` over the given row/column indices, in order.
pub fn principal_submatrix(a: &DMatrix<f64>, indices: &[usize]) -> DMatrix<f64> {
    let k = indices.len();
    DMatrix::from_fn(k, k, |i, j| a[(indices[i], indices[j])])
}
