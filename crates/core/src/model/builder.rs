use crate::data::DataFrame;
use crate::error::{AnalysisError, Result};
use crate::lmm::Optimizer;
use crate::types::SparseMat;

use super::design::{build_fixed_design, build_random_design, complete_rows};
use super::formula::Formula;

/// A fully specified random-intercept model, ready for fitting.
pub struct MixedModel {
    /// The parsed model formula.
    pub formula: Formula,
    /// Column holding the grouping factor.
    pub group_column: String,
    /// Number of observations after listwise deletion.
    pub n_obs: usize,
    /// Rows of the source data used by the model.
    pub rows: Vec<usize>,
    /// Response vector (y).
    pub y: Vec<f64>,
    /// Fixed effects design matrix (X).
    pub x: SparseMat,
    /// Names of the fixed-effect columns.
    pub fixed_names: Vec<String>,
    /// Random-intercept incidence matrix (Z).
    pub z: SparseMat,
    /// Group labels, one per column of Z.
    pub group_names: Vec<String>,
    /// Restricted (true) or full maximum likelihood.
    pub reml: bool,
    pub optimizer: Optimizer,
    pub max_iter: usize,
    pub convergence_tol: f64,
}

/// Builder for constructing a [`MixedModel`].
///
/// # Examples
/// ```no_run
/// use lmmreport_core::data::DataFrame;
/// use lmmreport_core::model::MixedModelBuilder;
///
/// let df = DataFrame::from_csv("alpha_power.csv").unwrap();
/// let fit = MixedModelBuilder::new()
///     .data(&df)
///     .formula("AlphaPower ~ Gaze_c * C(Condition)")
///     .groups("ID")
///     .reml(false)
///     .build()
///     .unwrap()
///     .fit()
///     .unwrap();
/// println!("logL = {:?}", fit.log_likelihood());
/// ```
pub struct MixedModelBuilder<'a> {
    data: Option<&'a DataFrame>,
    formula: Option<String>,
    groups: Option<String>,
    reml: bool,
    optimizer: Optimizer,
    max_iter: usize,
    convergence_tol: f64,
}

impl<'a> MixedModelBuilder<'a> {
    /// Create a new builder with the defaults: full ML, profile optimizer,
    /// 500 iterations, tolerance 1e-8.
    pub fn new() -> Self {
        Self {
            data: None,
            formula: None,
            groups: None,
            reml: false,
            optimizer: Optimizer::default(),
            max_iter: 500,
            convergence_tol: 1e-8,
        }
    }

    /// Set the data source.
    pub fn data(mut self, df: &'a DataFrame) -> Self {
        self.data = Some(df);
        self
    }

    /// Set the model formula, e.g. `"y ~ x * C(group)"`.
    pub fn formula(mut self, formula: &str) -> Self {
        self.formula = Some(formula.to_string());
        self
    }

    /// Set the grouping column of the random intercept.
    pub fn groups(mut self, column: &str) -> Self {
        self.groups = Some(column.to_string());
        self
    }

    /// Fit by restricted maximum likelihood (default: full ML).
    pub fn reml(mut self, reml: bool) -> Self {
        self.reml = reml;
        self
    }

    pub fn optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Set the iteration cap (default: 500).
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iter = n;
        self
    }

    /// Set convergence tolerance (default: 1e-8).
    pub fn convergence(mut self, tol: f64) -> Self {
        self.convergence_tol = tol;
        self
    }

    /// Build the model. Validates all inputs and constructs design matrices.
    pub fn build(self) -> Result<MixedModel> {
        let df = self
            .data
            .ok_or_else(|| AnalysisError::ModelSpec("No data provided".into()))?;
        let text = self
            .formula
            .ok_or_else(|| AnalysisError::ModelSpec("No formula specified".into()))?;
        let group_column = self
            .groups
            .ok_or_else(|| AnalysisError::ModelSpec("No grouping column specified".into()))?;

        let formula = Formula::parse(&text)?;
        df.get_column(&group_column)?;

        let rows = complete_rows(df, &formula, &group_column)?;
        let dropped = df.nrows() - rows.len();
        if dropped > 0 {
            log::debug!(
                "Dropped {} of {} rows with missing values",
                dropped,
                df.nrows()
            );
        }
        if rows.is_empty() {
            return Err(AnalysisError::ModelSpec(
                "No complete observations for the model".into(),
            ));
        }

        let response = df.get_numeric(&formula.response)?;
        let y: Vec<f64> = rows.iter().map(|&r| response[r]).collect();

        let (x, fixed_names) = build_fixed_design(df, &formula, &rows)?;
        let (z, group_names) = build_random_design(df, &group_column, &rows)?;

        if rows.len() <= fixed_names.len() {
            return Err(AnalysisError::ModelSpec(format!(
                "{} observations cannot support {} fixed effects",
                rows.len(),
                fixed_names.len()
            )));
        }

        log::debug!(
            "Model '{}': n = {}, p = {}, groups = {}",
            formula,
            rows.len(),
            fixed_names.len(),
            group_names.len()
        );

        Ok(MixedModel {
            formula,
            group_column,
            n_obs: rows.len(),
            rows,
            y,
            x,
            fixed_names,
            z,
            group_names,
            reml: self.reml,
            optimizer: self.optimizer,
            max_iter: self.max_iter,
            convergence_tol: self.convergence_tol,
        })
    }
}

impl<'a> Default for MixedModelBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataFrame;

    fn sample_df() -> DataFrame {
        let mut df = DataFrame::new();
        df.add_float_column("power", vec![5.0, 3.0, 7.0, 4.0, 6.0, 2.0, f64::NAN])
            .unwrap();
        df.add_float_column("gaze", vec![0.1, -0.2, 0.3, 0.0, -0.1, 0.2, 0.5])
            .unwrap();
        df.add_factor_column("cond", &["a", "b", "a", "b", "a", "b", "a"])
            .unwrap();
        df.add_factor_column("id", &["s1", "s1", "s2", "s2", "s3", "s3", "s4"])
            .unwrap();
        df
    }

    #[test]
    fn test_builder_basic() {
        let df = sample_df();
        let model = MixedModelBuilder::new()
            .data(&df)
            .formula("power ~ gaze * C(cond)")
            .groups("id")
            .build()
            .unwrap();

        assert_eq!(model.n_obs, 6);
        assert_eq!(model.y.len(), 6);
        assert_eq!(model.x.rows(), 6);
        assert_eq!(model.x.cols(), 4);
        // s4 only appears on the dropped row
        assert_eq!(model.group_names, vec!["s1", "s2", "s3"]);
        assert_eq!(model.z.cols(), 3);
        assert!(!model.reml);
        assert_eq!(model.optimizer, Optimizer::Profile);
    }

    #[test]
    fn test_builder_missing_pieces() {
        let df = sample_df();
        assert!(MixedModelBuilder::new().formula("power ~ gaze").groups("id").build().is_err());
        assert!(MixedModelBuilder::new().data(&df).groups("id").build().is_err());
        assert!(MixedModelBuilder::new().data(&df).formula("power ~ gaze").build().is_err());
    }

    #[test]
    fn test_builder_unknown_columns() {
        let df = sample_df();
        let missing_group = MixedModelBuilder::new()
            .data(&df)
            .formula("power ~ gaze")
            .groups("subject")
            .build();
        assert!(matches!(missing_group, Err(AnalysisError::ColumnNotFound(_))));

        let missing_term = MixedModelBuilder::new()
            .data(&df)
            .formula("power ~ pupil")
            .groups("id")
            .build();
        assert!(matches!(missing_term, Err(AnalysisError::ColumnNotFound(_))));
    }

    #[test]
    fn test_builder_too_many_effects() {
        let mut df = DataFrame::new();
        df.add_float_column("y", vec![1.0, 2.0]).unwrap();
        df.add_float_column("x", vec![0.0, 1.0]).unwrap();
        df.add_factor_column("g", &["a", "b"]).unwrap();
        let result = MixedModelBuilder::new()
            .data(&df)
            .formula("y ~ x")
            .groups("g")
            .build();
        assert!(matches!(result, Err(AnalysisError::ModelSpec(_))));
    }
}
