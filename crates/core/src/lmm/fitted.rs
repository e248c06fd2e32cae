use nalgebra::DMatrix;
use serde::Serialize;

use super::Optimizer;
use crate::error::{AnalysisError, Result};
use crate::types::{CovarianceMatrix, ParameterVector};

/// Which reference distribution the reported test statistics follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatKind {
    Z,
    T,
    /// Statistics were not reported, or their kind is not known.
    Unknown,
}

impl StatKind {
    /// Column header used in result tables.
    pub fn header(&self) -> &'static str {
        match self {
            StatKind::Z => "z-value",
            StatKind::T => "t-value",
            StatKind::Unknown => "t/z-value",
        }
    }
}

/// Random-effect covariance with the names of its rows.
#[derive(Debug, Clone)]
pub struct RandomEffects {
    pub names: Vec<String>,
    pub cov: DMatrix<f64>,
}

/// Details only available for models fitted by this crate.
#[derive(Debug, Clone)]
pub struct FitInfo {
    pub optimizer: Optimizer,
    pub iterations: usize,
    pub group_column: String,
    /// Group labels, in the order of `blups`.
    pub group_names: Vec<String>,
    /// Predicted random intercept of every group.
    pub blups: Vec<f64>,
}

/// A fitted fixed-effects model with optional inference attributes.
///
/// Only the coefficients are required. Every other attribute is an explicit
/// `Option`; consumers fall back to computing what they need (see
/// [`crate::diagnostics::fixed_effects_summary`]).
#[derive(Debug, Clone)]
pub struct FittedModel {
    params: ParameterVector,
    cov_params: Option<CovarianceMatrix>,
    bse: Option<Vec<f64>>,
    statistics: Option<Vec<f64>>,
    stat_kind: StatKind,
    pvalues: Option<Vec<f64>>,
    conf_int: Option<Vec<(f64, f64)>>,
    log_likelihood: Option<f64>,
    n_params: Option<usize>,
    scale: Option<f64>,
    random_effects: Option<RandomEffects>,
    formula: Option<String>,
    response: Option<String>,
    exog_names: Option<Vec<String>>,
    n_obs: Option<usize>,
    reml: Option<bool>,
    fit_info: Option<FitInfo>,
}

impl FittedModel {
    /// Coefficients in covariance order.
    pub fn params(&self) -> &ParameterVector {
        &self.params
    }

    /// Coefficient by name.
    pub fn coef(&self, name: &str) -> Option<f64> {
        self.params.get(name).copied()
    }

    /// Number of fixed-effect coefficients.
    pub fn n_coef(&self) -> usize {
        self.params.len()
    }

    pub fn cov_params(&self) -> Option<&CovarianceMatrix> {
        self.cov_params.as_ref()
    }

    pub fn bse(&self) -> Option<&[f64]> {
        self.bse.as_deref()
    }

    pub fn statistics(&self) -> Option<&[f64]> {
        self.statistics.as_deref()
    }

    pub fn stat_kind(&self) -> StatKind {
        self.stat_kind
    }

    pub fn pvalues(&self) -> Option<&[f64]> {
        self.pvalues.as_deref()
    }

    pub fn conf_int(&self) -> Option<&[(f64, f64)]> {
        self.conf_int.as_deref()
    }

    pub fn log_likelihood(&self) -> Option<f64> {
        self.log_likelihood
    }

    /// Number of estimated parameters counted for likelihood-ratio tests
    /// (fixed effects plus random-effect variances, residual excluded).
    pub fn n_params(&self) -> Option<usize> {
        self.n_params
    }

    /// Residual variance.
    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    pub fn random_effects(&self) -> Option<&RandomEffects> {
        self.random_effects.as_ref()
    }

    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Names of the design columns, falling back to the coefficient names.
    pub fn exog_names(&self) -> Vec<&str> {
        match &self.exog_names {
            Some(names) => names.iter().map(|s| s.as_str()).collect(),
            None => self.params.keys().map(|s| s.as_str()).collect(),
        }
    }

    pub fn n_obs(&self) -> Option<usize> {
        self.n_obs
    }

    /// `Some(true)` for restricted likelihood fits.
    pub fn is_reml(&self) -> Option<bool> {
        self.reml
    }

    pub fn fit_info(&self) -> Option<&FitInfo> {
        self.fit_info.as_ref()
    }

    /// Akaike information criterion, counting the residual variance.
    /// Undefined for REML fits.
    pub fn aic(&self) -> Option<f64> {
        if self.reml == Some(true) {
            return None;
        }
        let ll = self.log_likelihood?;
        let k = self.n_params? as f64 + 1.0;
        Some(-2.0 * ll + 2.0 * k)
    }

    /// Bayesian information criterion. Undefined for REML fits.
    pub fn bic(&self) -> Option<f64> {
        if self.reml == Some(true) {
            return None;
        }
        let ll = self.log_likelihood?;
        let k = self.n_params? as f64 + 1.0;
        let n = self.n_obs? as f64;
        Some(-2.0 * ll + k * n.ln())
    }

    /// Plain-text summary of the fit.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        let method = match self.reml {
            Some(true) => "REML",
            Some(false) => "ML",
            None => "external",
        };
        s.push_str(&format!("=== Linear Mixed Model ({}) ===\n\n", method));
        if let Some(formula) = &self.formula {
            s.push_str(&format!("Formula: {}\n", formula));
        }
        if let Some(n) = self.n_obs {
            s.push_str(&format!("Observations: {}", n));
            if let Some(info) = &self.fit_info {
                s.push_str(&format!(
                    "   Groups ({}): {}",
                    info.group_column,
                    info.group_names.len()
                ));
            }
            s.push('\n');
        }
        if let Some(info) = &self.fit_info {
            s.push_str(&format!(
                "Optimizer: {}   Iterations: {}\n",
                info.optimizer, info.iterations
            ));
        }
        if let Some(ll) = self.log_likelihood {
            s.push_str(&format!("\nLog-likelihood: {:.4}\n", ll));
        }
        if let (Some(aic), Some(bic)) = (self.aic(), self.bic()) {
            s.push_str(&format!("AIC: {:.4}\nBIC: {:.4}\n", aic, bic));
        }

        s.push_str("\n--- Variance Components ---\n");
        if let Some(re) = &self.random_effects {
            for (i, name) in re.names.iter().enumerate() {
                s.push_str(&format!("  {:<20} var = {:.6}\n", name, re.cov[(i, i)]));
            }
        }
        if let Some(scale) = self.scale {
            s.push_str(&format!("  {:<20} var = {:.6}\n", "Residual", scale));
        }

        s.push_str(&format!(
            "\n--- Fixed Effects ---\n  {:<36} {:>12} {:>10} {:>10} {:>12}\n",
            "Term",
            "Estimate",
            "SE",
            self.stat_kind.header(),
            "p-value"
        ));
        for row in crate::diagnostics::fixed_effects_summary(self) {
            s.push_str(&format!(
                "  {:<36} {:>12.6} {:>10} {:>10.3} {:>12} {}\n",
                row.term,
                row.beta,
                row.se.map(|se| format!("{:.6}", se)).unwrap_or_default(),
                row.stat,
                crate::diagnostics::format_p_value(row.p),
                crate::diagnostics::significance_stars(row.p)
            ));
        }

        if let Some(info) = &self.fit_info {
            s.push_str(&format!("\n--- Random Intercepts: {} (BLUP) ---\n", info.group_column));
            let mut sorted: Vec<(&String, f64)> =
                info.group_names.iter().zip(info.blups.iter().copied()).collect();
            sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
            for (level, blup) in sorted.iter().take(10) {
                s.push_str(&format!("  {}: {:.6}\n", level, blup));
            }
            if sorted.len() > 10 {
                s.push_str(&format!("  ... and {} more\n", sorted.len() - 10));
            }
        }

        s
    }
}

/// Builder for [`FittedModel`], also used to wrap results computed
/// elsewhere.
///
/// # Examples
/// ```
/// use indexmap::IndexMap;
/// use lmmreport_core::lmm::FittedModelBuilder;
///
/// let mut params = IndexMap::new();
/// params.insert("Intercept".to_string(), 1.5);
/// params.insert("x".to_string(), 0.2);
/// let model = FittedModelBuilder::new(params)
///     .bse(vec![0.1, 0.05])
///     .build()
///     .unwrap();
/// assert_eq!(model.coef("x"), Some(0.2));
/// assert!(model.cov_params().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct FittedModelBuilder {
    model: FittedModel,
}

impl FittedModelBuilder {
    pub fn new(params: ParameterVector) -> Self {
        Self {
            model: FittedModel {
                params,
                cov_params: None,
                bse: None,
                statistics: None,
                stat_kind: StatKind::Unknown,
                pvalues: None,
                conf_int: None,
                log_likelihood: None,
                n_params: None,
                scale: None,
                random_effects: None,
                formula: None,
                response: None,
                exog_names: None,
                n_obs: None,
                reml: None,
                fit_info: None,
            },
        }
    }

    pub fn cov_params(mut self, cov: CovarianceMatrix) -> Self {
        self.model.cov_params = Some(cov);
        self
    }

    pub fn bse(mut self, bse: Vec<f64>) -> Self {
        self.model.bse = Some(bse);
        self
    }

    pub fn statistics(mut self, stats: Vec<f64>, kind: StatKind) -> Self {
        self.model.statistics = Some(stats);
        self.model.stat_kind = kind;
        self
    }

    pub fn pvalues(mut self, pvalues: Vec<f64>) -> Self {
        self.model.pvalues = Some(pvalues);
        self
    }

    pub fn conf_int(mut self, ci: Vec<(f64, f64)>) -> Self {
        self.model.conf_int = Some(ci);
        self
    }

    pub fn log_likelihood(mut self, ll: f64) -> Self {
        self.model.log_likelihood = Some(ll);
        self
    }

    pub fn n_params(mut self, k: usize) -> Self {
        self.model.n_params = Some(k);
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.model.scale = Some(scale);
        self
    }

    pub fn random_effects(mut self, names: Vec<String>, cov: DMatrix<f64>) -> Self {
        self.model.random_effects = Some(RandomEffects { names, cov });
        self
    }

    pub fn formula(mut self, formula: &str) -> Self {
        self.model.formula = Some(formula.to_string());
        self
    }

    pub fn response(mut self, response: &str) -> Self {
        self.model.response = Some(response.to_string());
        self
    }

    pub fn exog_names(mut self, names: Vec<String>) -> Self {
        self.model.exog_names = Some(names);
        self
    }

    pub fn n_obs(mut self, n: usize) -> Self {
        self.model.n_obs = Some(n);
        self
    }

    pub fn reml(mut self, reml: bool) -> Self {
        self.model.reml = Some(reml);
        self
    }

    pub fn fit_info(mut self, info: FitInfo) -> Self {
        self.model.fit_info = Some(info);
        self
    }

    /// Validate dimensions and build.
    ///
    /// # Errors
    /// [`AnalysisError::DimensionMismatch`] if the covariance is not k×k or
    /// a per-coefficient vector is not of length k, or if the random-effect
    /// names do not match their covariance.
    pub fn build(self) -> Result<FittedModel> {
        let m = self.model;
        let k = m.params.len();

        if let Some(cov) = &m.cov_params {
            if cov.nrows() != k || cov.ncols() != k {
                return Err(AnalysisError::DimensionMismatch {
                    expected: k,
                    got: if cov.nrows() != k { cov.nrows() } else { cov.ncols() },
                    context: format!(
                        "covariance matrix is {}x{} for {} coefficients",
                        cov.nrows(),
                        cov.ncols(),
                        k
                    ),
                });
            }
        }

        let per_coef = [
            ("standard errors", m.bse.as_ref().map(|v| v.len())),
            ("statistics", m.statistics.as_ref().map(|v| v.len())),
            ("p-values", m.pvalues.as_ref().map(|v| v.len())),
            ("confidence intervals", m.conf_int.as_ref().map(|v| v.len())),
            ("exog names", m.exog_names.as_ref().map(|v| v.len())),
        ];
        for (what, len) in per_coef {
            if let Some(len) = len {
                if len != k {
                    return Err(AnalysisError::DimensionMismatch {
                        expected: k,
                        got: len,
                        context: format!("{} per coefficient", what),
                    });
                }
            }
        }

        if let Some(re) = &m.random_effects {
            let r = re.names.len();
            if re.cov.nrows() != r || re.cov.ncols() != r {
                return Err(AnalysisError::DimensionMismatch {
                    expected: r,
                    got: re.cov.nrows(),
                    context: "random-effect covariance vs names".into(),
                });
            }
        }

        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn params() -> ParameterVector {
        let mut p = IndexMap::new();
        p.insert("Intercept".to_string(), 2.0);
        p.insert("x".to_string(), -0.5);
        p
    }

    #[test]
    fn test_only_params_required() {
        let m = FittedModelBuilder::new(params()).build().unwrap();
        assert_eq!(m.n_coef(), 2);
        assert_eq!(m.coef("Intercept"), Some(2.0));
        assert_eq!(m.coef("z"), None);
        assert!(m.bse().is_none());
        assert!(m.log_likelihood().is_none());
        assert_eq!(m.stat_kind(), StatKind::Unknown);
        assert_eq!(m.exog_names(), vec!["Intercept", "x"]);
        assert!(m.aic().is_none());
    }

    #[test]
    fn test_dimension_checks() {
        let bad_cov = FittedModelBuilder::new(params())
            .cov_params(DMatrix::identity(3, 3))
            .build();
        assert!(matches!(bad_cov, Err(AnalysisError::DimensionMismatch { .. })));

        let bad_se = FittedModelBuilder::new(params()).bse(vec![1.0]).build();
        assert!(matches!(bad_se, Err(AnalysisError::DimensionMismatch { .. })));

        let bad_re = FittedModelBuilder::new(params())
            .random_effects(vec!["a".into(), "b".into()], DMatrix::identity(1, 1))
            .build();
        assert!(bad_re.is_err());
    }

    #[test]
    fn test_information_criteria() {
        let m = FittedModelBuilder::new(params())
            .log_likelihood(-10.0)
            .n_params(3)
            .n_obs(20)
            .reml(false)
            .build()
            .unwrap();
        assert_eq!(m.aic(), Some(28.0));
        assert!((m.bic().unwrap() - (20.0 + 4.0 * 20f64.ln())).abs() < 1e-12);

        let reml = FittedModelBuilder::new(params())
            .log_likelihood(-10.0)
            .n_params(3)
            .reml(true)
            .build()
            .unwrap();
        assert!(reml.aic().is_none());
    }

    #[test]
    fn test_stat_headers() {
        assert_eq!(StatKind::Z.header(), "z-value");
        assert_eq!(StatKind::T.header(), "t-value");
        assert_eq!(StatKind::Unknown.header(), "t/z-value");
    }

    #[test]
    fn test_summary_text() {
        let m = FittedModelBuilder::new(params())
            .cov_params(DMatrix::identity(2, 2) * 0.01)
            .scale(1.5)
            .random_effects(vec!["Intercept".into()], DMatrix::from_element(1, 1, 0.7))
            .log_likelihood(-42.0)
            .reml(true)
            .formula("y ~ x")
            .n_obs(30)
            .build()
            .unwrap();
        let text = m.summary();
        assert!(text.contains("(REML)"));
        assert!(text.contains("Formula: y ~ x"));
        assert!(text.contains("Residual"));
        assert!(text.contains("--- Fixed Effects ---"));
        assert!(!text.contains("AIC"));
        assert!(!text.contains("BLUP"));
    }
}
