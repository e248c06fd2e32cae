use nalgebra::{DMatrix, DVector};
use sprs::CsMat;

use crate::error::{AnalysisError, Result};
use crate::matrix::dense::{inverse_spd, log_determinant_spd, principal_submatrix, trace};
use crate::matrix::sparse::{quadratic_form, xt_y};

/// Henderson's Mixed Model Equations for a single random intercept.
///
/// ```text
/// [X'X/σ²e        X'Z/σ²e          ] [b]   [X'y/σ²e]
/// [Z'X/σ²e        Z'Z/σ²e + I/σ²u  ] [u] = [Z'y/σ²e]
/// ```
///
/// The coefficient matrix C is symmetric positive definite whenever X has
/// full column rank and both variances are positive.
#[derive(Debug)]
pub struct MixedModelEquations {
    /// The full coefficient matrix C.
    pub coeff_matrix: DMatrix<f64>,
    /// The right-hand side vector.
    pub rhs: Vec<f64>,
    /// y'R⁻¹y = y'y/σ²e.
    pub y_r_inv_y: f64,
    /// Number of fixed effect parameters (p).
    pub n_fixed: usize,
    /// Number of groups (q).
    pub n_random: usize,
    /// Total dimension of the system.
    pub dim: usize,
}

impl MixedModelEquations {
    /// Assemble the MME for residual variance `sigma2_e` and random-intercept
    /// variance `sigma2_u`.
    pub fn assemble(
        x: &CsMat<f64>,
        z: &CsMat<f64>,
        y: &[f64],
        sigma2_e: f64,
        sigma2_u: f64,
    ) -> Self {
        let p = x.cols();
        let q = z.cols();
        let dim = p + q;
        let r_inv = 1.0 / sigma2_e;

        let mut c = DMatrix::zeros(dim, dim);

        let xtx = compute_xtx_scaled(x, r_inv);
        c.view_mut((0, 0), (p, p)).copy_from(&xtx);

        let xtz = compute_xtz_scaled(x, z, r_inv);
        c.view_mut((0, p), (p, q)).copy_from(&xtz);
        c.view_mut((p, 0), (q, p)).copy_from(&xtz.transpose());

        let ztz = compute_xtx_scaled(z, r_inv);
        c.view_mut((p, p), (q, q)).copy_from(&ztz);
        for j in 0..q {
            c[(p + j, p + j)] += 1.0 / sigma2_u;
        }

        let mut rhs: Vec<f64> = xt_y(x, y).iter().map(|v| v * r_inv).collect();
        rhs.extend(xt_y(z, y).iter().map(|v| v * r_inv));

        let y_r_inv_y = y.iter().map(|v| v * v).sum::<f64>() * r_inv;

        Self {
            coeff_matrix: c,
            rhs,
            y_r_inv_y,
            n_fixed: p,
            n_random: q,
            dim,
        }
    }

    /// Solve `C · sol = rhs` by dense Cholesky and collect the pieces the
    /// fitters and likelihoods need.
    ///
    /// # Errors
    /// [`AnalysisError::NotPositiveDefinite`] when C (or its random block)
    /// is not positive definite, typically a rank-deficient fixed design.
    pub fn solve(&self) -> Result<MmeSolution> {
        let chol = self
            .coeff_matrix
            .clone()
            .cholesky()
            .ok_or(AnalysisError::NotPositiveDefinite)?;

        let rhs_vec = DVector::from_column_slice(&self.rhs);
        let sol = chol.solve(&rhs_vec);
        let solution: Vec<f64> = sol.as_slice().to_vec();

        let fixed_effects = solution[..self.n_fixed].to_vec();
        let random_effects = solution[self.n_fixed..].to_vec();

        let l = chol.l();
        let log_det_c = 2.0 * (0..self.dim).map(|i| l[(i, i)].ln()).sum::<f64>();
        let c_inv = chol.inverse();

        let random_idx: Vec<usize> = (self.n_fixed..self.dim).collect();
        let c_uu = principal_submatrix(&self.coeff_matrix, &random_idx);
        let log_det_c_uu = log_determinant_spd(&c_uu).ok_or(AnalysisError::NotPositiveDefinite)?;
        let c_uu_inv_trace = trace(&inverse_spd(&c_uu).ok_or(AnalysisError::NotPositiveDefinite)?);

        let y_py = quadratic_form(self.y_r_inv_y, &solution, &self.rhs);

        Ok(MmeSolution {
            solution,
            fixed_effects,
            random_effects,
            log_det_c,
            log_det_c_uu,
            c_uu_inv_trace,
            y_py,
            c_inv,
        })
    }
}

/// Solution of the Mixed Model Equations.
#[derive(Debug)]
pub struct MmeSolution {
    /// Full solution vector [b; u].
    pub solution: Vec<f64>,
    /// Fixed effects (BLUE): b-hat.
    pub fixed_effects: Vec<f64>,
    /// Random intercepts (BLUP): u-hat, one per group.
    pub random_effects: Vec<f64>,
    /// log|C|.
    pub log_det_c: f64,
    /// log|C_uu| of the random-effects block alone.
    pub log_det_c_uu: f64,
    /// tr((C_uu)⁻¹).
    pub c_uu_inv_trace: f64,
    /// y'Py = y'R⁻¹y - sol'rhs.
    pub y_py: f64,
    /// Full C⁻¹.
    pub c_inv: DMatrix<f64>,
}

impl MmeSolution {
    /// u'u.
    pub fn u_squared(&self) -> f64 {
        self.random_effects.iter().map(|u| u * u).sum()
    }

    /// Trace of the random-effects block of C⁻¹.
    pub fn c_inv_uu_trace(&self, n_fixed: usize) -> f64 {
        (n_fixed..self.c_inv.nrows())
            .map(|i| self.c_inv[(i, i)])
            .sum()
    }

    /// The fixed-effects block of C⁻¹, i.e. Cov(b-hat).
    pub fn fixed_covariance(&self, n_fixed: usize) -> DMatrix<f64> {
        self.c_inv.view((0, 0), (n_fixed, n_fixed)).into_owned()
    }
}

/// Compute X'X scaled by a scalar, via column iteration.
fn compute_xtx_scaled(x: &CsMat<f64>, scale: f64) -> DMatrix<f64> {
    let p = x.cols();
    let mut result = DMatrix::zeros(p, p);

    let x_csc = if x.is_csc() { x.clone() } else { x.to_csc() };

    for j in 0..p {
        if let Some(col_j) = x_csc.outer_view(j) {
            for i in j..p {
                if let Some(col_i) = x_csc.outer_view(i) {
                    let dot: f64 = col_j.dot(&col_i);
                    result[(i, j)] = dot * scale;
                    if i != j {
                        result[(j, i)] = dot * scale;
                    }
                }
            }
        }
    }

    result
}

/// Compute X'Z scaled by a scalar.
fn compute_xtz_scaled(x: &CsMat<f64>, z: &CsMat<f64>, scale: f64) -> DMatrix<f64> {
    let p = x.cols();
    let q = z.cols();
    let mut result = DMatrix::zeros(p, q);

    let x_csc = if x.is_csc() { x.clone() } else { x.to_csc() };
    let z_csc = if z.is_csc() { z.clone() } else { z.to_csc() };

    for i in 0..p {
        if let Some(col_x) = x_csc.outer_view(i) {
            for j in 0..q {
                if let Some(col_z) = z_csc.outer_view(j) {
                    result[(i, j)] = col_x.dot(&col_z) * scale;
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::sparse::incidence_matrix;
    use approx::assert_relative_eq;

    fn ones(n: usize) -> CsMat<f64> {
        incidence_matrix(&vec![0; n], 1)
    }

    #[test]
    fn test_mme_one_fixed_one_random() {
        let x = ones(4);
        let z = incidence_matrix(&[0, 0, 1, 1], 2);
        let y = vec![10.0, 12.0, 6.0, 8.0];

        let mme = MixedModelEquations::assemble(&x, &z, &y, 2.0, 4.0);
        assert_eq!(mme.dim, 3);
        assert_relative_eq!(mme.coeff_matrix[(0, 0)], 2.0);
        assert_relative_eq!(mme.coeff_matrix[(1, 1)], 1.0 + 0.25);
        assert_relative_eq!(mme.coeff_matrix[(0, 2)], 1.0);
        assert_relative_eq!(mme.rhs[0], 18.0);

        let sol = mme.solve().unwrap();
        // balanced: mu is the grand mean, BLUPs shrink group deviations
        assert_relative_eq!(sol.fixed_effects[0], 9.0, epsilon = 1e-10);
        let shrink = 4.0 / (4.0 + 2.0 / 2.0);
        assert_relative_eq!(sol.random_effects[0], 2.0 * shrink, epsilon = 1e-10);
        assert_relative_eq!(sol.random_effects[1], -2.0 * shrink, epsilon = 1e-10);
    }

    #[test]
    fn test_random_block_pieces() {
        let x = ones(5);
        let z = incidence_matrix(&[0, 0, 0, 1, 1], 2);
        let y = vec![1.0, 2.0, 3.0, 4.0, 6.0];
        let (s2e, s2u) = (1.5, 0.5);

        let sol = MixedModelEquations::assemble(&x, &z, &y, s2e, s2u)
            .solve()
            .unwrap();

        // C_uu is diagonal: n_j/σ²e + 1/σ²u
        let d = [3.0 / s2e + 1.0 / s2u, 2.0 / s2e + 1.0 / s2u];
        assert_relative_eq!(sol.log_det_c_uu, d[0].ln() + d[1].ln(), epsilon = 1e-10);
        assert_relative_eq!(sol.c_uu_inv_trace, 1.0 / d[0] + 1.0 / d[1], epsilon = 1e-10);
        assert_relative_eq!(sol.u_squared(), sol.random_effects.iter().map(|u| u * u).sum::<f64>());
    }

    #[test]
    fn test_y_py_matches_dense_projection() {
        let x = ones(4);
        let z = incidence_matrix(&[0, 0, 1, 1], 2);
        let y = vec![10.0, 12.0, 6.0, 8.0];
        let (s2e, s2u) = (2.0, 4.0);

        let sol = MixedModelEquations::assemble(&x, &z, &y, s2e, s2u)
            .solve()
            .unwrap();

        // V = σ²u ZZ' + σ²e I ; P = V⁻¹ - V⁻¹X(X'V⁻¹X)⁻¹X'V⁻¹
        let zd = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
        let xd = DMatrix::from_element(4, 1, 1.0);
        let v = &zd * zd.transpose() * s2u + DMatrix::identity(4, 4) * s2e;
        let vi = v.try_inverse().unwrap();
        let xtvix = (xd.transpose() * &vi * &xd).try_inverse().unwrap();
        let p = &vi - &vi * &xd * xtvix * xd.transpose() * &vi;
        let yv = DVector::from_column_slice(&y);
        let expected = (yv.transpose() * p * &yv)[(0, 0)];

        assert_relative_eq!(sol.y_py, expected, epsilon = 1e-10);
    }

    #[test]
    fn test_mme_coefficient_matrix_symmetry() {
        let x = incidence_matrix(&[0, 0, 1, 1], 2);
        let z = incidence_matrix(&[0, 1, 2, 0], 3);
        let y = vec![1.0, 2.0, 3.0, 4.0];

        let mme = MixedModelEquations::assemble(&x, &z, &y, 1.0, 2.0);
        assert_relative_eq!(mme.coeff_matrix, mme.coeff_matrix.transpose());
    }

    #[test]
    fn test_rank_deficient_design_fails() {
        // two identical fixed columns
        let x = incidence_matrix(&[0, 0, 0, 0], 1);
        let mut tri = sprs::TriMat::new((4, 2));
        for (val, (r, _)) in x.iter() {
            tri.add_triplet(r, 0, *val);
            tri.add_triplet(r, 1, *val);
        }
        let x2: CsMat<f64> = tri.to_csc();
        let z = incidence_matrix(&[0, 0, 1, 1], 2);
        let mme = MixedModelEquations::assemble(&x2, &z, &[1.0, 2.0, 3.0, 4.0], 1.0, 1.0);
        assert!(matches!(mme.solve(), Err(AnalysisError::NotPositiveDefinite)));
    }
}
