use sprs::{CsMat, TriMat};

/// Incidence matrix mapping each observation to its group: `Z[i, codes[i]] = 1`.
pub fn incidence_matrix(codes: &[usize], n_groups: usize) -> CsMat<f64> {
    let mut tri = TriMat::new((codes.len(), n_groups));
    for (i, &code) in codes.iter().enumerate() {
        tri.add_triplet(i, code, 1.0);
    }
    tri.to_csc()
}

/// Multiply a sparse matrix by a dense vector: result = A * x.
pub fn spmv(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    assert_eq!(a.cols(), x.len());
    let mut result = vec![0.0; a.rows()];
    for (val, (row, col)) in a.iter() {
        result[row] += val * x[col];
    }
    result
}

/// Compute X' * y for a sparse matrix X and dense vector y.
pub fn xt_y(x: &CsMat<f64>, y: &[f64]) -> Vec<f64> {
    let ncol = x.cols();
    let mut result = vec![0.0; ncol];

    for (val, (row, col)) in x.iter() {
        result[col] += val * y[row];
    }

    result
}

/// Compute y'Py = y'R_inv*y - sol'*rhs (from MME solution).
/// This is more numerically stable than computing Py first.
pub fn quadratic_form(y_r_inv_y: f64, sol: &[f64], rhs: &[f64]) -> f64 {
    let sol_rhs: f64 = sol.iter().zip(rhs.iter()).map(|(s, r)| s * r).sum();
    y_r_inv_y - sol_rhs
}
