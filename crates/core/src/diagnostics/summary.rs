//! Fixed-effect summary rows and the formatting helpers shared by the
//! text, CSV and document outputs.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::distribution::normal_two_sided_p;
use crate::lmm::FittedModel;

/// Multiplier of the fallback normal confidence interval.
pub const CI_FALLBACK_Z: f64 = 1.96;

/// One fixed-effect coefficient with its inference.
#[derive(Debug, Clone, Serialize)]
pub struct FixedEffectRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_label: Option<String>,
    /// Coefficient name as stored in the model.
    pub term: String,
    pub beta: f64,
    /// Missing when the model reports neither SEs nor a covariance.
    pub se: Option<f64>,
    /// `NaN` when it cannot be computed.
    pub stat: f64,
    pub p: f64,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

/// Annotation columns added to tidy fixed-effect tables.
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    pub task: Option<String>,
    pub dv: Option<String>,
    pub model_label: Option<String>,
}

/// One row per coefficient, filling what the model does not report:
///
/// - SE: reported, else `sqrt(diag(cov))`, else missing
/// - statistic: reported, else `coef / SE`
/// - p: reported, else two-sided normal from the statistic
/// - CI: reported, else `coef ± 1.96·SE`
pub fn fixed_effects_summary(model: &FittedModel) -> Vec<FixedEffectRow> {
    let cov = model.cov_params();

    model
        .params()
        .iter()
        .enumerate()
        .map(|(i, (name, &beta))| {
            let se = match (model.bse(), cov) {
                (Some(bse), _) => Some(bse[i]),
                (None, Some(cov)) => Some(cov[(i, i)].sqrt()),
                (None, None) => None,
            };

            let stat = match (model.statistics(), se) {
                (Some(stats), _) => stats[i],
                (None, Some(se)) if se > 0.0 => beta / se,
                _ => f64::NAN,
            };

            let p = match model.pvalues() {
                Some(p) => p[i],
                None => normal_two_sided_p(stat),
            };

            let (ci_low, ci_high) = match (model.conf_int(), se) {
                (Some(ci), _) => (Some(ci[i].0), Some(ci[i].1)),
                (None, Some(se)) => (
                    Some(beta - CI_FALLBACK_Z * se),
                    Some(beta + CI_FALLBACK_Z * se),
                ),
                (None, None) => (None, None),
            };

            FixedEffectRow {
                task: None,
                dv: None,
                model_label: None,
                term: name.clone(),
                beta,
                se,
                stat,
                p,
                ci_low,
                ci_high,
            }
        })
        .collect()
}

/// [`fixed_effects_summary`] with annotation columns.
pub fn fixed_effects_table(model: &FittedModel, options: &TableOptions) -> Vec<FixedEffectRow> {
    fixed_effects_summary(model)
        .into_iter()
        .map(|row| FixedEffectRow {
            task: options.task.clone(),
            dv: options.dv.clone(),
            model_label: options.model_label.clone(),
            ..row
        })
        .collect()
}

static CATEGORICAL_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"C\(([^)]+)\)\[T\.([^\]]+)\]").expect("valid regex")
});

static TREATMENT_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\[T\.([^\]]+)\]").expect("valid regex")
});

static SQUARED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:np\.)?power\(([^,]+),\s*2\)").expect("valid regex")
});

/// Human-readable coefficient name.
///
/// ```
/// use lmmreport_core::diagnostics::prettify_term;
///
/// assert_eq!(prettify_term("const"), "Intercept");
/// assert_eq!(prettify_term("Gaze_c:C(Condition)[T.task]"), "Gaze_c * Condition [task]");
/// assert_eq!(prettify_term("np.power(Gaze_c, 2)"), "Gaze_c^2");
/// ```
pub fn prettify_term(term: &str) -> String {
    let term = term.replace(':', " * ");
    if matches!(
        term.as_str(),
        "Intercept" | "const" | "(Intercept)" | "Intercept[0]"
    ) {
        return "Intercept".to_string();
    }
    let term = CATEGORICAL_CALL.replace_all(&term, "$1 [$2]");
    let term = TREATMENT_LEVEL.replace_all(&term, "$1 [$2]");
    SQUARED.replace_all(&term, "${1}^2").into_owned()
}

/// p-value text: scientific with two mantissa decimals at or below 0.001,
/// three fixed decimals above, empty when missing or infinite.
pub fn format_p_value(p: f64) -> String {
    if !p.is_finite() {
        return String::new();
    }
    if p <= 0.001 {
        return scientific(p, 2);
    }
    format!("{:.3}", p)
}

/// `{:.Ne}` with a signed two-digit exponent, e.g. `4.00e-04`.
fn scientific(x: f64, decimals: usize) -> String {
    let s = format!("{:.*e}", decimals, x);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => s,
    }
}

/// `***` below 0.001, `**` below 0.01, `*` below 0.05, else empty.
pub fn significance_stars(p: f64) -> &'static str {
    if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else if p < 0.05 {
        "*"
    } else {
        ""
    }
}

/// Like [`significance_stars`] but `n.s.` when not significant, for plot
/// annotations.
pub fn significance_label(p: f64) -> &'static str {
    match significance_stars(p) {
        "" => "n.s.",
        stars => stars,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmm::{FittedModelBuilder, StatKind};
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use nalgebra::DMatrix;

    fn params() -> IndexMap<String, f64> {
        let mut p = IndexMap::new();
        p.insert("Intercept".to_string(), 2.0);
        p.insert("x".to_string(), 0.5);
        p
    }

    #[test]
    fn test_p_value_format() {
        assert_eq!(format_p_value(0.0004), "4.00e-04");
        assert_eq!(format_p_value(0.001), "1.00e-03");
        assert_eq!(format_p_value(0.02), "0.020");
        assert_eq!(format_p_value(0.5), "0.500");
        assert_eq!(format_p_value(0.0), "0.00e+00");
        assert_eq!(format_p_value(f64::NAN), "");
        assert_eq!(format_p_value(f64::INFINITY), "");
    }

    #[test]
    fn test_stars() {
        assert_eq!(significance_stars(0.0009), "***");
        assert_eq!(significance_stars(0.005), "**");
        assert_eq!(significance_stars(0.03), "*");
        assert_eq!(significance_stars(0.5), "");
        assert_eq!(significance_stars(f64::NAN), "");
        assert_eq!(significance_label(0.5), "n.s.");
        assert_eq!(significance_label(0.03), "*");
    }

    #[test]
    fn test_prettify() {
        assert_eq!(prettify_term("Intercept"), "Intercept");
        assert_eq!(prettify_term("(Intercept)"), "Intercept");
        assert_eq!(prettify_term("Intercept[0]"), "Intercept");
        assert_eq!(prettify_term("Condition[T.task]"), "Condition [task]");
        assert_eq!(prettify_term("C(Condition)[T.task]"), "Condition [task]");
        assert_eq!(prettify_term("Gaze_c:Condition[T.b]"), "Gaze_c * Condition [b]");
        assert_eq!(prettify_term("power(x, 2)"), "x^2");
        assert_eq!(prettify_term("Gaze_c"), "Gaze_c");
    }

    #[test]
    fn test_fallback_from_covariance() {
        let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.0625]);
        let m = FittedModelBuilder::new(params()).cov_params(cov).build().unwrap();
        let rows = fixed_effects_summary(&m);

        assert_relative_eq!(rows[0].se.unwrap(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(rows[0].stat, 10.0, epsilon = 1e-12);
        assert_relative_eq!(rows[1].stat, 2.0, epsilon = 1e-12);
        assert_relative_eq!(rows[1].p, 0.04550026389635842, epsilon = 1e-10);
        assert_relative_eq!(rows[1].ci_low.unwrap(), 0.5 - 1.96 * 0.25, epsilon = 1e-12);
        assert_relative_eq!(rows[1].ci_high.unwrap(), 0.5 + 1.96 * 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_reported_values_win() {
        let m = FittedModelBuilder::new(params())
            .bse(vec![1.0, 1.0])
            .statistics(vec![3.0, 4.0], StatKind::T)
            .pvalues(vec![0.01, 0.02])
            .conf_int(vec![(0.0, 1.0), (2.0, 3.0)])
            .build()
            .unwrap();
        let rows = fixed_effects_summary(&m);
        assert_eq!(rows[1].stat, 4.0);
        assert_eq!(rows[1].p, 0.02);
        assert_eq!(rows[1].ci_low, Some(2.0));
    }

    #[test]
    fn test_missing_se_fails_soft() {
        let m = FittedModelBuilder::new(params()).build().unwrap();
        let rows = fixed_effects_summary(&m);
        assert!(rows[0].se.is_none());
        assert!(rows[0].stat.is_nan());
        assert!(rows[0].p.is_nan());
        assert!(rows[0].ci_low.is_none());
    }

    #[test]
    fn test_table_annotations() {
        let m = FittedModelBuilder::new(params()).build().unwrap();
        let opts = TableOptions {
            task: Some("Sternberg".into()),
            dv: Some("AlphaPower".into()),
            model_label: None,
        };
        let rows = fixed_effects_table(&m, &opts);
        assert_eq!(rows[1].task.as_deref(), Some("Sternberg"));
        assert_eq!(rows[1].dv.as_deref(), Some("AlphaPower"));
        assert!(rows[1].model_label.is_none());
        assert_eq!(rows[1].term, "x");
    }
}
