use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use nalgebra::DMatrix;

use super::fitted::{FitInfo, FittedModel, FittedModelBuilder, StatKind};
use super::likelihood::{log_likelihood, Dims};
use super::mme::MixedModelEquations;
use crate::diagnostics::distribution::{normal_two_sided_p, Z_975};
use crate::error::{AnalysisError, Result};
use crate::model::MixedModel;

/// Name of the random-intercept row of the random-effect covariance.
pub const RANDOM_INTERCEPT: &str = "Intercept";

/// Variance-component optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimizer {
    /// EM iterations on the mixed-model equations.
    Em,
    /// Golden-section search of the profiled likelihood over log(σ²u/σ²e).
    #[default]
    Profile,
}

impl fmt::Display for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Optimizer::Em => write!(f, "em"),
            Optimizer::Profile => write!(f, "profile"),
        }
    }
}

impl FromStr for Optimizer {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "em" => Ok(Optimizer::Em),
            "profile" | "golden" => Ok(Optimizer::Profile),
            other => Err(AnalysisError::ModelSpec(format!(
                "unknown optimizer '{}' (expected 'em' or 'profile')",
                other
            ))),
        }
    }
}

impl MixedModel {
    /// Fit the model with its configured optimizer.
    ///
    /// # Errors
    /// [`AnalysisError::NotConverged`] when the optimizer exhausts its
    /// iteration cap, [`AnalysisError::NotPositiveDefinite`] for a
    /// rank-deficient fixed design.
    pub fn fit(&self) -> Result<FittedModel> {
        match self.optimizer {
            Optimizer::Em => super::EmFitter::new(self.max_iter, self.convergence_tol).fit(self),
            Optimizer::Profile => {
                super::ProfileFitter::new(self.max_iter, self.convergence_tol).fit(self)
            }
        }
    }

    pub(crate) fn dims(&self) -> Dims {
        Dims {
            n: self.n_obs,
            p: self.x.cols(),
            q: self.z.cols(),
        }
    }
}

/// Build the fitted model at the final variance components.
pub(crate) fn finish(
    model: &MixedModel,
    sigma2_e: f64,
    sigma2_u: f64,
    iterations: usize,
) -> Result<FittedModel> {
    let dims = model.dims();
    let sol = MixedModelEquations::assemble(&model.x, &model.z, &model.y, sigma2_e, sigma2_u)
        .solve()?;
    let ll = log_likelihood(&sol, dims, sigma2_e, sigma2_u, model.reml);

    let cov = sol.fixed_covariance(dims.p);
    let bse: Vec<f64> = (0..dims.p).map(|i| cov[(i, i)].max(0.0).sqrt()).collect();
    let z: Vec<f64> = sol
        .fixed_effects
        .iter()
        .zip(&bse)
        .map(|(b, se)| if *se > 0.0 { b / se } else { f64::NAN })
        .collect();
    let pvalues = z.iter().map(|&z| normal_two_sided_p(z)).collect();
    let conf_int = sol
        .fixed_effects
        .iter()
        .zip(&bse)
        .map(|(b, se)| (b - Z_975 * se, b + Z_975 * se))
        .collect();

    let params: IndexMap<String, f64> = model
        .fixed_names
        .iter()
        .cloned()
        .zip(sol.fixed_effects.iter().copied())
        .collect();

    log::info!(
        "{} fit converged after {} iterations: logL = {:.4}, σ²e = {:.6}, σ²u = {:.6}",
        if model.reml { "REML" } else { "ML" },
        iterations,
        ll,
        sigma2_e,
        sigma2_u
    );

    FittedModelBuilder::new(params)
        .cov_params(cov)
        .bse(bse)
        .statistics(z, StatKind::Z)
        .pvalues(pvalues)
        .conf_int(conf_int)
        .log_likelihood(ll)
        .n_params(dims.p + 1)
        .scale(sigma2_e)
        .random_effects(
            vec![RANDOM_INTERCEPT.to_string()],
            DMatrix::from_element(1, 1, sigma2_u),
        )
        .formula(&model.formula.to_string())
        .response(&model.formula.response)
        .exog_names(model.fixed_names.clone())
        .n_obs(dims.n)
        .reml(model.reml)
        .fit_info(FitInfo {
            optimizer: model.optimizer,
            iterations,
            group_column: model.group_column.clone(),
            group_names: model.group_names.clone(),
            blups: sol.random_effects,
        })
        .build()
}

/// Sample variance of the response, used for starting values.
pub(crate) fn response_variance(y: &[f64]) -> f64 {
    let n = y.len() as f64;
    if y.len() < 2 {
        return 1.0;
    }
    let mean = y.iter().sum::<f64>() / n;
    y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}
