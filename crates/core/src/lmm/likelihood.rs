//! Log-likelihoods of the random-intercept model through MME determinant
//! identities:
//!
//! ```text
//! log|V|              = n·log σ²e + q·log σ²u + log|C_uu|
//! log|V| + log|X'V⁻¹X| = n·log σ²e + q·log σ²u + log|C|
//! r'V⁻¹r              = y'Py
//! ```

use std::f64::consts::PI;

use super::mme::MmeSolution;

/// Problem dimensions: observations, fixed effects, groups.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dims {
    pub n: usize,
    pub p: usize,
    pub q: usize,
}

impl Dims {
    /// Degrees of freedom for the residual variance.
    pub fn residual_df(&self, reml: bool) -> f64 {
        if reml {
            (self.n - self.p) as f64
        } else {
            self.n as f64
        }
    }
}

/// ML or REML log-likelihood at `(σ²e, σ²u)`, given the MME solved at
/// those same variances.
pub(crate) fn log_likelihood(
    sol: &MmeSolution,
    dims: Dims,
    sigma2_e: f64,
    sigma2_u: f64,
    reml: bool,
) -> f64 {
    let n = dims.n as f64;
    let q = dims.q as f64;
    let log_2pi = (2.0 * PI).ln();
    let log_r_g = n * sigma2_e.ln() + q * sigma2_u.ln();

    if reml {
        -0.5 * (dims.residual_df(true) * log_2pi + log_r_g + sol.log_det_c + sol.y_py)
    } else {
        -0.5 * (n * log_2pi + log_r_g + sol.log_det_c_uu + sol.y_py)
    }
}

/// Log-likelihood profiled over the residual variance, as a function of
/// `t = log(σ²u/σ²e)`. `sol` must come from the MME at `σ²e = 1`,
/// `σ²u = exp(t)`. Returns the log-likelihood and the maximising σ²e.
pub(crate) fn profile_log_likelihood(
    sol: &MmeSolution,
    dims: Dims,
    log_ratio: f64,
    reml: bool,
) -> (f64, f64) {
    let df = dims.residual_df(reml);
    let sigma2 = sol.y_py / df;
    let log_2pi = (2.0 * PI).ln();
    let log_g = dims.q as f64 * log_ratio;
    let log_det = if reml { sol.log_det_c } else { sol.log_det_c_uu };

    let ll = -0.5 * (df * (log_2pi + sigma2.ln() + 1.0) + log_g + log_det);
    (ll, sigma2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmm::mme::MixedModelEquations;
    use crate::matrix::sparse::incidence_matrix;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    const Y: [f64; 7] = [3.1, 4.0, 2.2, 6.5, 7.1, 5.9, 4.4];
    const G: [usize; 7] = [0, 0, 0, 1, 1, 2, 2];

    fn dense_loglik(s2e: f64, s2u: f64, reml: bool) -> f64 {
        let n = Y.len();
        let mut v = DMatrix::identity(n, n) * s2e;
        for i in 0..n {
            for j in 0..n {
                if G[i] == G[j] {
                    v[(i, j)] += s2u;
                }
            }
        }
        let x = DMatrix::from_element(n, 1, 1.0);
        let y = DVector::from_column_slice(&Y);
        let vi = v.clone().try_inverse().unwrap();
        let xtvix = (x.transpose() * &vi * &x)[(0, 0)];
        let b = (x.transpose() * &vi * &y)[(0, 0)] / xtvix;
        let r = y.map(|v| v - b);
        let rvr = (r.transpose() * &vi * &r)[(0, 0)];
        let log_det_v = v.determinant().ln();
        let log_2pi = (2.0 * PI).ln();
        if reml {
            -0.5 * ((n - 1) as f64 * log_2pi + log_det_v + xtvix.ln() + rvr)
        } else {
            -0.5 * (n as f64 * log_2pi + log_det_v + rvr)
        }
    }

    fn solve(s2e: f64, s2u: f64) -> MmeSolution {
        let x = incidence_matrix(&[0; 7], 1);
        let z = incidence_matrix(&G, 3);
        MixedModelEquations::assemble(&x, &z, &Y, s2e, s2u)
            .solve()
            .unwrap()
    }

    const DIMS: Dims = Dims { n: 7, p: 1, q: 3 };

    #[test]
    fn test_ml_matches_dense() {
        let ll = log_likelihood(&solve(1.3, 0.7), DIMS, 1.3, 0.7, false);
        assert_relative_eq!(ll, dense_loglik(1.3, 0.7, false), epsilon = 1e-9);
    }

    #[test]
    fn test_reml_matches_dense() {
        let ll = log_likelihood(&solve(0.9, 2.5), DIMS, 0.9, 2.5, true);
        assert_relative_eq!(ll, dense_loglik(0.9, 2.5, true), epsilon = 1e-9);
    }

    #[test]
    fn test_profile_equals_full_at_profiled_scale() {
        for &reml in &[false, true] {
            let t = 0.4f64;
            let (ll, s2) = profile_log_likelihood(&solve(1.0, t.exp()), DIMS, t, reml);
            let full = dense_loglik(s2, s2 * t.exp(), reml);
            assert_relative_eq!(ll, full, epsilon = 1e-9);
        }
    }
}
