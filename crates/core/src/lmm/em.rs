use super::convergence::ConvergenceMonitor;
use super::fit::{finish, response_variance};
use super::fitted::FittedModel;
use super::likelihood::log_likelihood;
use super::mme::MixedModelEquations;
use crate::error::{AnalysisError, Result};
use crate::model::MixedModel;

/// Variances are kept above this fraction of the response variance.
const VARIANCE_FLOOR: f64 = 1e-10;

/// EM fitter for the random-intercept model.
///
/// Each iteration solves the MME at the current `(σ²e, σ²u)` and updates
///
/// ```text
/// σ²e ← y'ê / (n − p)          (REML)     y'ê / n        (ML)
/// σ²u ← (u'u + tr(T)) / q
/// ```
///
/// where `y'ê = y'y − b'X'y − u'Z'y`, and `T` is the random block of `C⁻¹`
/// for REML or `(C_uu)⁻¹` for ML.
pub struct EmFitter {
    max_iter: usize,
    tol: f64,
}

impl EmFitter {
    pub fn new(max_iter: usize, tol: f64) -> Self {
        Self { max_iter, tol }
    }

    pub fn fit(&self, model: &MixedModel) -> Result<FittedModel> {
        let dims = model.dims();
        let q = dims.q as f64;
        let resid_df = dims.residual_df(model.reml);
        if resid_df <= 0.0 {
            return Err(AnalysisError::ModelSpec(format!(
                "{} observations cannot support {} fixed effects",
                dims.n, dims.p
            )));
        }

        let var_y = response_variance(&model.y);
        let floor = VARIANCE_FLOOR * var_y.max(f64::MIN_POSITIVE);
        let mut sigma2_e = (var_y / 2.0).max(floor);
        let mut sigma2_u = (var_y / 2.0).max(floor);

        let mut monitor = ConvergenceMonitor::new(self.tol, self.max_iter);

        loop {
            let sol =
                MixedModelEquations::assemble(&model.x, &model.z, &model.y, sigma2_e, sigma2_u)
                    .solve()?;
            let logl = log_likelihood(&sol, dims, sigma2_e, sigma2_u, model.reml);

            // y'ê = σ²e · y'Py
            let y_e = sigma2_e * sol.y_py;
            let trace_t = if model.reml {
                sol.c_inv_uu_trace(dims.p)
            } else {
                sol.c_uu_inv_trace
            };

            let new_e = (y_e / resid_df).max(floor);
            let new_u = ((sol.u_squared() + trace_t) / q).max(floor);

            let change = ((new_e - sigma2_e).powi(2) + (new_u - sigma2_u).powi(2)).sqrt()
                / (sigma2_e.powi(2) + sigma2_u.powi(2)).sqrt();

            log::debug!(
                "EM iter {}: logL = {:.6}, σ²e = {:.6}, σ²u = {:.6}, change = {:.2e}",
                monitor.n_iterations() + 1,
                logl,
                new_e,
                new_u,
                change
            );

            monitor.record(logl, change);
            sigma2_e = new_e;
            sigma2_u = new_u;

            if monitor.is_converged() {
                return finish(model, sigma2_e, sigma2_u, monitor.n_iterations());
            }
            if monitor.max_reached() {
                break;
            }
        }

        log::warn!(
            "EM did not converge in {} iterations (last change {:.2e}, logL = {:.4})",
            self.max_iter,
            monitor.last_change(),
            monitor.last_logl().unwrap_or(f64::NAN)
        );
        Err(AnalysisError::NotConverged {
            iterations: self.max_iter,
            change: monitor.last_change(),
        })
    }
}
