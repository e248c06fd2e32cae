//! Display-ready model tables, independent of the output format.

use crate::diagnostics::{fixed_effects_summary, format_p_value, prettify_term, significance_stars};
use crate::lmm::FittedModel;
use crate::model::INTERCEPT;

/// Header of the fixed-effect table, minus the statistic column.
pub const FIXED_HEADERS: [&str; 5] = ["Variable", "β", "SE", "CI", "p-value"];

/// Header of the variance-component table.
pub const VARIANCE_HEADERS: [&str; 3] = ["Variance", "SD", "Goodness of fit"];

/// One formatted fixed-effect row. Missing numbers are empty strings.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedTableRow {
    pub variable: String,
    pub beta: String,
    pub se: String,
    pub ci: String,
    pub stat: String,
    pub p: String,
    /// Rendered as a separate, bold run after `p`.
    pub stars: String,
}

/// One formatted variance-component row.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceRow {
    pub label: String,
    pub sd: String,
    pub fit: String,
}

/// Everything needed to render a model as two tables under a title.
#[derive(Debug, Clone)]
pub struct ModelReport {
    pub title: String,
    /// `z-value`, `t-value` or `t/z-value`.
    pub stat_header: String,
    pub fixed: Vec<FixedTableRow>,
    pub variance: Vec<VarianceRow>,
}

impl ModelReport {
    pub fn from_model(model: &FittedModel) -> Self {
        let fixed = fixed_effects_summary(model)
            .into_iter()
            .map(|row| FixedTableRow {
                variable: prettify_term(&row.term),
                beta: fixed3(row.beta),
                se: row.se.map(fixed3).unwrap_or_default(),
                ci: match (row.ci_low, row.ci_high) {
                    (Some(lo), Some(hi)) => format!("{} – {}", fixed3(lo), fixed3(hi)),
                    _ => String::new(),
                },
                stat: fixed3(row.stat),
                p: format_p_value(row.p),
                stars: significance_stars(row.p).to_string(),
            })
            .collect();

        Self {
            title: title(model),
            stat_header: model.stat_kind().header().to_string(),
            fixed,
            variance: variance_rows(model),
        }
    }

    /// Full fixed-effect header, statistic column included.
    pub fn fixed_headers(&self) -> Vec<&str> {
        let mut headers: Vec<&str> = FIXED_HEADERS.to_vec();
        headers.insert(4, &self.stat_header);
        headers
    }
}

/// The formula if attached, else `response ~ a + b` rebuilt from the
/// design column names.
fn title(model: &FittedModel) -> String {
    if let Some(formula) = model.formula() {
        return formula.to_string();
    }
    let response = model.response().unwrap_or("y");
    let rhs: Vec<&str> = model
        .exog_names()
        .into_iter()
        .filter(|name| !matches!(*name, "Intercept" | "const"))
        .collect();
    if rhs.is_empty() {
        response.to_string()
    } else {
        format!("{} ~ {}", response, rhs.join(" + "))
    }
}

fn variance_rows(model: &FittedModel) -> Vec<VarianceRow> {
    let mut rows = Vec::new();

    if let Some(re) = model.random_effects() {
        for (i, name) in re.names.iter().enumerate() {
            let label = if name == INTERCEPT || name == "(Intercept)" {
                "Random intercept".to_string()
            } else {
                name.clone()
            };
            rows.push(VarianceRow {
                label,
                sd: fixed2(re.cov[(i, i)].sqrt()),
                fit: String::new(),
            });
        }
    }

    if let Some(scale) = model.scale().filter(|s| !s.is_nan()) {
        rows.push(VarianceRow {
            label: "Residual".to_string(),
            sd: fixed2(scale.sqrt()),
            fit: String::new(),
        });
    }

    if rows.is_empty() {
        rows.push(VarianceRow {
            label: "Residual".to_string(),
            sd: String::new(),
            fit: String::new(),
        });
    }

    let ll = model
        .log_likelihood()
        .filter(|ll| !ll.is_nan())
        .map(|ll| format!("{:.1}", ll))
        .unwrap_or_default();
    rows[0].fit = format!("Log likelihood  {}", ll);
    rows
}

fn fixed3(x: f64) -> String {
    if x.is_nan() {
        String::new()
    } else {
        format!("{:.3}", x)
    }
}

fn fixed2(x: f64) -> String {
    if x.is_nan() {
        String::new()
    } else {
        format!("{:.2}", x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmm::{FittedModelBuilder, StatKind};
    use indexmap::IndexMap;
    use nalgebra::DMatrix;

    fn params() -> IndexMap<String, f64> {
        let mut p = IndexMap::new();
        p.insert("Intercept".to_string(), 10.12345);
        p.insert("Gaze_c:C(Condition)[T.task]".to_string(), -0.5);
        p
    }

    #[test]
    fn test_full_report() {
        let cov = DMatrix::from_row_slice(2, 2, &[0.01, 0.0, 0.0, 0.04]);
        let m = FittedModelBuilder::new(params())
            .cov_params(cov)
            .statistics(vec![101.2345, -2.5], StatKind::Z)
            .log_likelihood(-123.456)
            .scale(4.0)
            .random_effects(vec!["Intercept".into()], DMatrix::from_element(1, 1, 2.25))
            .formula("AlphaPower ~ Gaze_c*C(Condition)")
            .build()
            .unwrap();
        let report = ModelReport::from_model(&m);

        assert_eq!(report.title, "AlphaPower ~ Gaze_c*C(Condition)");
        assert_eq!(report.stat_header, "z-value");
        assert_eq!(
            report.fixed_headers(),
            vec!["Variable", "β", "SE", "CI", "z-value", "p-value"]
        );

        let row = &report.fixed[1];
        assert_eq!(row.variable, "Gaze_c * Condition [task]");
        assert_eq!(row.beta, "-0.500");
        assert_eq!(row.se, "0.200");
        assert_eq!(row.ci, "-0.892 – -0.108");
        assert_eq!(row.stat, "-2.500");
        assert_eq!(row.stars, "*");
        assert_eq!(report.fixed[0].beta, "10.123");

        assert_eq!(report.variance.len(), 2);
        assert_eq!(report.variance[0].label, "Random intercept");
        assert_eq!(report.variance[0].sd, "1.50");
        assert_eq!(report.variance[0].fit, "Log likelihood  -123.5");
        assert_eq!(report.variance[1].label, "Residual");
        assert_eq!(report.variance[1].sd, "2.00");
        assert_eq!(report.variance[1].fit, "");
    }

    #[test]
    fn test_minimal_model() {
        let m = FittedModelBuilder::new(params()).response("y").build().unwrap();
        let report = ModelReport::from_model(&m);

        assert_eq!(report.title, "y ~ Gaze_c:C(Condition)[T.task]");
        assert_eq!(report.stat_header, "t/z-value");
        assert_eq!(report.fixed[0].se, "");
        assert_eq!(report.fixed[0].ci, "");
        assert_eq!(report.fixed[0].p, "");
        assert_eq!(report.fixed[0].stars, "");

        assert_eq!(report.variance.len(), 1);
        assert_eq!(report.variance[0].label, "Residual");
        assert_eq!(report.variance[0].sd, "");
        assert_eq!(report.variance[0].fit, "Log likelihood  ");
    }

    #[test]
    fn test_other_random_effect_names_kept() {
        let m = FittedModelBuilder::new(params())
            .random_effects(vec!["Slope".into()], DMatrix::from_element(1, 1, 0.25))
            .build()
            .unwrap();
        let report = ModelReport::from_model(&m);
        assert_eq!(report.variance[0].label, "Slope");
        assert_eq!(report.variance[0].sd, "0.50");
    }
}
