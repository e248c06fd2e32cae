use nalgebra::DVector;
use serde::Serialize;

use super::distribution::chi2_sf;
use super::summary::significance_stars;
use crate::error::{AnalysisError, Result};
use crate::lmm::FittedModel;
use crate::matrix::dense::{principal_submatrix, solve_spd, symmetric_rank};

/// A named group of coefficients, matched by substring.
#[derive(Debug, Clone)]
pub struct WaldGroup {
    pub name: String,
    pub patterns: Vec<String>,
}

impl WaldGroup {
    pub fn new(name: &str, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Whether a coefficient name contains any of the patterns.
    pub fn matches(&self, coefficient: &str) -> bool {
        self.patterns.iter().any(|p| coefficient.contains(p.as_str()))
    }
}

/// Result of a joint Wald chi-square test for one coefficient group.
#[derive(Debug, Clone, Serialize)]
pub struct WaldRow {
    pub term: String,
    /// Matched coefficients, in model order.
    #[serde(skip)]
    pub coefficients: Vec<String>,
    /// Missing when nothing matched.
    pub df: Option<usize>,
    /// `χ² = b'V⁻¹b`; `NaN` when V is singular.
    pub chi2: Option<f64>,
    pub p: Option<f64>,
}

/// Joint Wald tests of `H0: b = 0` for each coefficient group.
///
/// ```text
/// χ² = b' V⁻¹ b,   df = number of matched coefficients
/// ```
///
/// where `b` are the matched coefficients and `V` the matching principal
/// submatrix of the coefficient covariance. An empty group yields a row
/// with missing df, statistic and p; a singular `V` yields `NaN` statistic
/// and p with df still reported.
///
/// # Errors
/// [`AnalysisError::MissingAttribute`] if the model has no covariance.
pub fn joint_wald_tests(model: &FittedModel, groups: &[WaldGroup]) -> Result<Vec<WaldRow>> {
    let cov = model
        .cov_params()
        .ok_or(AnalysisError::MissingAttribute("a coefficient covariance matrix"))?;
    let names: Vec<&String> = model.params().keys().collect();
    let beta: Vec<f64> = model.params().values().copied().collect();

    let rows = groups
        .iter()
        .map(|group| {
            let indices: Vec<usize> = names
                .iter()
                .enumerate()
                .filter(|(_, name)| group.matches(name))
                .map(|(i, _)| i)
                .collect();
            let coefficients: Vec<String> = indices.iter().map(|&i| names[i].clone()).collect();

            if indices.is_empty() {
                return WaldRow {
                    term: group.name.clone(),
                    coefficients,
                    df: None,
                    chi2: None,
                    p: None,
                };
            }

            let b: Vec<f64> = indices.iter().map(|&i| beta[i]).collect();
            let v = principal_submatrix(cov, &indices);
            let df = indices.len();

            let solved = if symmetric_rank(&v) < df {
                None
            } else {
                solve_spd(&v, &b)
            };
            let chi2 = match solved {
                Some(v_inv_b) => DVector::from_vec(b).dot(&DVector::from_vec(v_inv_b)),
                None => {
                    log::warn!(
                        "Covariance block for Wald group '{}' is singular",
                        group.name
                    );
                    f64::NAN
                }
            };

            WaldRow {
                term: group.name.clone(),
                coefficients,
                df: Some(df),
                chi2: Some(chi2),
                p: Some(chi2_sf(chi2, df as f64)),
            }
        })
        .collect();

    Ok(rows)
}

/// Format Wald test results as a table string.
pub fn format_wald_tests(tests: &[WaldRow]) -> String {
    let mut s = String::new();
    s.push_str("--- Joint Wald Tests ---\n");
    s.push_str(&format!(
        "{:<24} {:>6} {:>12} {:>12}\n",
        "Term", "df", "Chi2", "Pr(>Chi2)"
    ));
    s.push_str(&format!("{}\n", "-".repeat(56)));

    for test in tests {
        let df = test.df.map(|d| d.to_string()).unwrap_or_default();
        let chi2 = test.chi2.map(|c| format!("{:.4}", c)).unwrap_or_default();
        let (p, stars) = match test.p {
            Some(p) => (format!("{:.4e}", p), significance_stars(p)),
            None => (String::new(), ""),
        };
        s.push_str(&format!(
            "{:<24} {:>6} {:>12} {:>12} {}\n",
            test.term, df, chi2, p, stars
        ));
    }

    s.push_str("---\nSignif. codes:  0 '***' 0.001 '**' 0.01 '*' 0.05 ' ' 1\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmm::FittedModelBuilder;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use nalgebra::DMatrix;

    fn model(cov: DMatrix<f64>) -> FittedModel {
        let names = [
            ("Intercept", 5.0),
            ("Gaze_c", 0.4),
            ("C(Condition)[T.b]", 1.0),
            ("Gaze_c:C(Condition)[T.b]", 0.6),
        ];
        let params: IndexMap<String, f64> =
            names.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        FittedModelBuilder::new(params).cov_params(cov).build().unwrap()
    }

    #[test]
    fn test_single_coefficient_is_squared_z() {
        let m = model(DMatrix::identity(4, 4) * 0.04);
        let rows = joint_wald_tests(&m, &[WaldGroup::new("Condition", &["C(Condition)[T.b]"])])
            .unwrap();
        // the interaction also contains the pattern
        assert_eq!(rows[0].df, Some(2));

        let rows = joint_wald_tests(&m, &[WaldGroup::new("Gaze", &["Gaze_c"])]).unwrap();
        assert_eq!(
            rows[0].coefficients,
            vec!["Gaze_c".to_string(), "Gaze_c:C(Condition)[T.b]".to_string()]
        );
        // (0.4² + 0.6²) / 0.04
        assert_relative_eq!(rows[0].chi2.unwrap(), 13.0, epsilon = 1e-10);
        assert_relative_eq!(rows[0].p.unwrap(), (-6.5f64).exp(), epsilon = 1e-10);
    }

    #[test]
    fn test_correlated_block() {
        let mut cov = DMatrix::identity(4, 4);
        cov[(1, 3)] = 0.5;
        cov[(3, 1)] = 0.5;
        let m = model(cov);
        let rows = joint_wald_tests(&m, &[WaldGroup::new("Gaze", &["Gaze"])]).unwrap();
        // b'V⁻¹b with V = [[1, .5], [.5, 1]], b = [.4, .6]
        let expected = (0.16 + 0.36 - 2.0 * 0.5 * 0.24) / 0.75;
        assert_relative_eq!(rows[0].chi2.unwrap(), expected, epsilon = 1e-10);
    }

    #[test]
    fn test_empty_group_is_missing_not_error() {
        let m = model(DMatrix::identity(4, 4));
        let rows = joint_wald_tests(&m, &[WaldGroup::new("Pupil", &["Pupil"])]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].df.is_none());
        assert!(rows[0].chi2.is_none());
        assert!(rows[0].p.is_none());
    }

    #[test]
    fn test_singular_block_reports_nan() {
        let mut cov = DMatrix::identity(4, 4);
        cov[(1, 1)] = 0.0;
        cov[(3, 3)] = 0.0;
        let m = model(cov);
        let rows = joint_wald_tests(&m, &[WaldGroup::new("Gaze", &["Gaze"])]).unwrap();
        assert_eq!(rows[0].df, Some(2));
        assert!(rows[0].chi2.unwrap().is_nan());
        assert!(rows[0].p.unwrap().is_nan());
    }

    #[test]
    fn test_rank_deficient_block_reports_nan() {
        // [[0.1, 0.3], [0.3, 0.9]] is rank one yet factors without a zero pivot
        let mut cov = DMatrix::identity(4, 4);
        cov[(1, 1)] = 0.1;
        cov[(1, 3)] = 0.3;
        cov[(3, 1)] = 0.3;
        cov[(3, 3)] = 0.9;
        let m = model(cov);
        let rows = joint_wald_tests(&m, &[WaldGroup::new("Gaze", &["Gaze"])]).unwrap();
        assert_eq!(rows[0].df, Some(2));
        assert!(rows[0].chi2.unwrap().is_nan());
        assert!(rows[0].p.unwrap().is_nan());
    }

    #[test]
    fn test_requires_covariance() {
        let mut params = IndexMap::new();
        params.insert("x".to_string(), 1.0);
        let m = FittedModelBuilder::new(params).build().unwrap();
        assert!(joint_wald_tests(&m, &[]).is_err());
    }

    #[test]
    fn test_format_wald_tests() {
        let rows = vec![
            WaldRow {
                term: "Gaze".into(),
                coefficients: vec![],
                df: Some(2),
                chi2: Some(13.0),
                p: Some(0.0015),
            },
            WaldRow {
                term: "Pupil".into(),
                coefficients: vec![],
                df: None,
                chi2: None,
                p: None,
            },
        ];
        let output = format_wald_tests(&rows);
        assert!(output.contains("Joint Wald Tests"));
        assert!(output.contains("Gaze"));
        assert!(output.contains("**"));
        assert!(output.contains("Pupil"));
    }
}
