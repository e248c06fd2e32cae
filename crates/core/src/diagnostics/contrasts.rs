use nalgebra::DVector;
use serde::Serialize;

use super::correction::{adjust, PAdjust};
use super::distribution::normal_two_sided_p;
use crate::data::{Column, DataFrame};
use crate::error::{AnalysisError, Result};
use crate::lmm::FittedModel;
use crate::matrix::dense::quadratic_form;
use crate::model::{observed_levels, MixedModelBuilder, INTERCEPT};

/// One pairwise comparison `mean(group2) − mean(group1)`.
#[derive(Debug, Clone, Serialize)]
pub struct ContrastRow {
    pub group1: String,
    pub group2: String,
    pub estimate: f64,
    pub se: f64,
    pub z: f64,
    pub p: f64,
    pub p_adj: f64,
}

/// Contrast vector selecting the predicted mean of `level` at the reference
/// point of any continuous covariate: the intercept plus the level's
/// treatment dummy `prefix[T.level]` when the model has one.
///
/// # Errors
/// [`AnalysisError::MissingCoefficient`] if the model has no intercept.
pub fn level_contrast_vector(model: &FittedModel, level: &str, prefix: &str) -> Result<DVector<f64>> {
    let params = model.params();
    let mut c = DVector::zeros(params.len());

    let intercept = params
        .get_index_of(INTERCEPT)
        .ok_or_else(|| AnalysisError::MissingCoefficient(INTERCEPT.to_string()))?;
    c[intercept] = 1.0;

    if let Some(j) = params.get_index_of(&format!("{}[T.{}]", prefix, level)) {
        c[j] = 1.0;
    }
    Ok(c)
}

/// Estimate, SE, z and p of the linear combination `c'β`.
///
/// SE is `NaN` if `c'Vc` is negative; z is `NaN` if SE is not positive.
fn contrast_test(c: &DVector<f64>, model: &FittedModel) -> Result<(f64, f64, f64, f64)> {
    let cov = model
        .cov_params()
        .ok_or(AnalysisError::MissingAttribute("a coefficient covariance matrix"))?;
    let beta = DVector::from_iterator(model.n_coef(), model.params().values().copied());

    let estimate = c.dot(&beta);
    let variance = quadratic_form(c, cov);
    let se = if variance >= 0.0 { variance.sqrt() } else { f64::NAN };
    let z = if se > 0.0 { estimate / se } else { f64::NAN };
    Ok((estimate, se, z, normal_two_sided_p(z)))
}

/// Pairwise differences between `levels` of a treatment-coded factor, with
/// continuous covariates held at zero (their centring value).
///
/// Pairs are `(levels[i], levels[j])` for `i < j` in the given order; the
/// estimate is `mean(levels[j]) − mean(levels[i])`. Interaction
/// coefficients do not enter the contrast. `prefix` is the coefficient
/// prefix of the factor, e.g. `C(Condition)`.
///
/// # Errors
/// Fails without an `Intercept` coefficient or without a covariance matrix.
pub fn pairwise_contrasts_at_reference(
    model: &FittedModel,
    levels: &[&str],
    prefix: &str,
    p_adjust: PAdjust,
) -> Result<Vec<ContrastRow>> {
    let vectors = levels
        .iter()
        .map(|lvl| level_contrast_vector(model, lvl, prefix))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for i in 0..levels.len() {
        for j in (i + 1)..levels.len() {
            let c = &vectors[j] - &vectors[i];
            let (estimate, se, z, p) = contrast_test(&c, model)?;
            rows.push(ContrastRow {
                group1: levels[i].to_string(),
                group2: levels[j].to_string(),
                estimate,
                se,
                z,
                p,
                p_adj: p,
            });
        }
    }

    let raw: Vec<f64> = rows.iter().map(|r| r.p).collect();
    for (row, p_adj) in rows.iter_mut().zip(adjust(&raw, p_adjust)) {
        row.p_adj = p_adj;
    }
    Ok(rows)
}

/// Fit `value ~ C(group)` by REML with a random intercept per `id` and
/// return all pairwise level contrasts.
///
/// Levels follow the order of the group factor (see
/// [`DataFrame::set_factor_levels`]); numeric group columns are ordered
/// numerically. The first level is the baseline.
pub fn level_contrasts(
    df: &DataFrame,
    value_col: &str,
    group_col: &str,
    id_col: &str,
    p_adjust: PAdjust,
) -> Result<Vec<ContrastRow>> {
    let mut data = df.clone();
    if !matches!(data.get_column(group_col)?, Column::Factor(_)) {
        data.as_factor(group_col)?;
    }

    let model = MixedModelBuilder::new()
        .data(&data)
        .formula(&format!("{} ~ C({})", value_col, group_col))
        .groups(id_col)
        .reml(true)
        .build()?;

    let levels = observed_levels(&data, group_col, &model.rows)?;
    let levels: Vec<&str> = levels.iter().map(|s| s.as_str()).collect();

    let fit = model.fit()?;
    pairwise_contrasts_at_reference(&fit, &levels, &format!("C({})", group_col), p_adjust)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmm::FittedModelBuilder;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use nalgebra::DMatrix;

    /// Intercept, Gaze_c, C(Condition)[T.b], C(Condition)[T.c], Gaze_c:C(Condition)[T.b]
    fn model() -> FittedModel {
        let names = [
            ("Intercept", 1.0),
            ("Gaze_c", 0.3),
            ("C(Condition)[T.b]", 0.5),
            ("C(Condition)[T.c]", -0.2),
            ("Gaze_c:C(Condition)[T.b]", 9.0),
        ];
        let params: IndexMap<String, f64> =
            names.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        let mut cov = DMatrix::identity(5, 5) * 0.01;
        cov[(2, 3)] = 0.004;
        cov[(3, 2)] = 0.004;
        cov[(0, 2)] = -0.002;
        cov[(2, 0)] = -0.002;
        FittedModelBuilder::new(params).cov_params(cov).build().unwrap()
    }

    #[test]
    fn test_contrast_vectors() {
        let m = model();
        let a = level_contrast_vector(&m, "a", "C(Condition)").unwrap();
        assert_eq!(a.as_slice(), &[1.0, 0.0, 0.0, 0.0, 0.0]);
        let b = level_contrast_vector(&m, "b", "C(Condition)").unwrap();
        // interaction is not selected
        assert_eq!(b.as_slice(), &[1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pairwise_estimates() {
        let rows =
            pairwise_contrasts_at_reference(&model(), &["a", "b", "c"], "C(Condition)", PAdjust::Bonferroni)
                .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[0].group1.as_str(), rows[0].group2.as_str()), ("a", "b"));
        assert_eq!((rows[2].group1.as_str(), rows[2].group2.as_str()), ("b", "c"));

        assert_relative_eq!(rows[0].estimate, 0.5, epsilon = 1e-12);
        assert_relative_eq!(rows[0].se, 0.1, epsilon = 1e-12);
        assert_relative_eq!(rows[2].estimate, -0.7, epsilon = 1e-12);
        // Var(c - b) = 0.01 + 0.01 - 2·0.004
        assert_relative_eq!(rows[2].se, 0.012f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(rows[0].z, 5.0, epsilon = 1e-12);

        for r in &rows {
            assert!(r.se >= 0.0);
            assert!(r.p_adj >= r.p);
            assert!(r.p_adj <= 1.0);
            assert_relative_eq!(r.p_adj, (r.p * 3.0).min(1.0), epsilon = 1e-15);
        }
    }

    #[test]
    fn test_zero_se_gives_nan() {
        let mut params = IndexMap::new();
        params.insert("Intercept".to_string(), 1.0);
        params.insert("g[T.b]".to_string(), 0.5);
        let m = FittedModelBuilder::new(params)
            .cov_params(DMatrix::zeros(2, 2))
            .build()
            .unwrap();
        let rows = pairwise_contrasts_at_reference(&m, &["a", "b"], "g", PAdjust::Bonferroni).unwrap();
        assert_eq!(rows[0].se, 0.0);
        assert!(rows[0].z.is_nan());
        assert!(rows[0].p.is_nan());
        assert!(rows[0].p_adj.is_nan());
    }

    #[test]
    fn test_absent_level_dummy_contributes_zero() {
        let rows = pairwise_contrasts_at_reference(&model(), &["a", "zzz"], "C(Condition)", PAdjust::None)
            .unwrap();
        assert_eq!(rows[0].estimate, 0.0);
    }

    #[test]
    fn test_errors() {
        let mut params = IndexMap::new();
        params.insert("x".to_string(), 1.0);
        let no_intercept = FittedModelBuilder::new(params)
            .cov_params(DMatrix::identity(1, 1))
            .build()
            .unwrap();
        let err = pairwise_contrasts_at_reference(&no_intercept, &["a", "b"], "g", PAdjust::None);
        assert!(matches!(err, Err(AnalysisError::MissingCoefficient(_))));

        let mut params = IndexMap::new();
        params.insert("Intercept".to_string(), 1.0);
        let no_cov = FittedModelBuilder::new(params).build().unwrap();
        let err = pairwise_contrasts_at_reference(&no_cov, &["a", "b"], "g", PAdjust::None);
        assert!(matches!(err, Err(AnalysisError::MissingAttribute(_))));
    }
}
