use super::fit::finish;
use super::fitted::FittedModel;
use super::likelihood::profile_log_likelihood;
use super::mme::MixedModelEquations;
use crate::error::{AnalysisError, Result};
use crate::model::MixedModel;

/// Search range for t = log(σ²u/σ²e).
const LOG_RATIO_MIN: f64 = -20.0;
const LOG_RATIO_MAX: f64 = 10.0;
/// Spacing of the coarse grid that brackets the maximum.
const GRID_STEP: f64 = 0.5;

/// Profile-likelihood fitter.
///
/// The residual variance is profiled out analytically, leaving a
/// one-dimensional problem in `t = log(σ²u/σ²e)`. A coarse grid brackets
/// the maximum and golden-section search refines it until the bracket is
/// narrower than `tol`. `max_iter` caps the golden-section steps.
pub struct ProfileFitter {
    max_iter: usize,
    tol: f64,
}

impl ProfileFitter {
    pub fn new(max_iter: usize, tol: f64) -> Self {
        Self { max_iter, tol }
    }

    pub fn fit(&self, model: &MixedModel) -> Result<FittedModel> {
        let dims = model.dims();
        if dims.residual_df(model.reml) <= 0.0 {
            return Err(AnalysisError::ModelSpec(format!(
                "{} observations cannot support {} fixed effects",
                dims.n, dims.p
            )));
        }

        let objective = |t: f64| -> Result<(f64, f64)> {
            let sol = MixedModelEquations::assemble(&model.x, &model.z, &model.y, 1.0, t.exp())
                .solve()?;
            Ok(profile_log_likelihood(&sol, dims, t, model.reml))
        };

        let n_grid = ((LOG_RATIO_MAX - LOG_RATIO_MIN) / GRID_STEP).round() as usize;
        let mut best = (0usize, f64::NEG_INFINITY);
        for k in 0..=n_grid {
            let (ll, _) = objective(LOG_RATIO_MIN + k as f64 * GRID_STEP)?;
            if ll > best.1 {
                best = (k, ll);
            }
        }

        let center = LOG_RATIO_MIN + best.0 as f64 * GRID_STEP;
        let mut a = (center - GRID_STEP).max(LOG_RATIO_MIN);
        let mut b = (center + GRID_STEP).min(LOG_RATIO_MAX);

        let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
        let mut c = b - inv_phi * (b - a);
        let mut d = a + inv_phi * (b - a);
        let mut fc = objective(c)?.0;
        let mut fd = objective(d)?.0;
        let mut iterations = 0usize;

        while b - a > self.tol {
            if iterations >= self.max_iter {
                log::warn!(
                    "Profile search did not converge in {} iterations (bracket width {:.2e})",
                    self.max_iter,
                    b - a
                );
                return Err(AnalysisError::NotConverged {
                    iterations,
                    change: b - a,
                });
            }
            iterations += 1;

            if fc > fd {
                b = d;
                d = c;
                fd = fc;
                c = b - inv_phi * (b - a);
                fc = objective(c)?.0;
            } else {
                a = c;
                c = d;
                fc = fd;
                d = a + inv_phi * (b - a);
                fd = objective(d)?.0;
            }

            log::debug!(
                "profile iter {}: t in [{:.6}, {:.6}], logL = {:.6}",
                iterations,
                a,
                b,
                fc.max(fd)
            );
        }

        let t = 0.5 * (a + b);
        if t <= LOG_RATIO_MIN + GRID_STEP {
            log::warn!("random-intercept variance is at the lower search boundary");
        }

        let (_, sigma2_e) = objective(t)?;
        finish(model, sigma2_e, sigma2_e * t.exp(), iterations)
    }
}
