use sprs::TriMat;

use super::formula::{FactorExpr, Formula, Term};
use crate::data::{is_missing_token, Column, DataFrame, FactorColumn};
use crate::error::{AnalysisError, Result};
use crate::matrix::sparse::incidence_matrix;
use crate::types::SparseMat;

/// Name of the intercept column in the fixed-effects design.
pub const INTERCEPT: &str = "Intercept";

/// Indices of the rows with no missing value in any column the model uses.
///
/// Numeric values are missing when `NaN`; categorical values when their
/// label is a missing token (`""`, `NA`, ...).
pub fn complete_rows(df: &DataFrame, formula: &Formula, groups: &str) -> Result<Vec<usize>> {
    let mut columns = formula.columns();
    if !columns.contains(&groups) {
        columns.push(groups);
    }

    let mut keep = vec![true; df.nrows()];
    for name in columns {
        match df.get_column(name)? {
            Column::Float(values) => {
                for (k, v) in keep.iter_mut().zip(values) {
                    *k &= !v.is_nan();
                }
            }
            Column::Factor(f) => {
                for (k, label) in keep.iter_mut().zip(f.labels()) {
                    *k &= !is_missing_token(label);
                }
            }
        }
    }

    Ok(keep
        .iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect())
}

/// One expanded design column: coefficient name and values over the used rows.
type DesignColumn = (String, Vec<f64>);

/// Build the fixed-effects design matrix (X) over `rows`.
///
/// Columns follow the formula term order (intercept first, then terms by
/// interaction order). Categorical factors use treatment coding against
/// their first observed level and are named `label[T.level]`; without an
/// intercept the first purely categorical term is coded in full and named
/// `label[level]`. Interaction columns multiply the expanded columns of
/// their factors and join the names with `:`.
pub fn build_fixed_design(
    df: &DataFrame,
    formula: &Formula,
    rows: &[usize],
) -> Result<(SparseMat, Vec<String>)> {
    let n = rows.len();
    if n == 0 {
        return Err(AnalysisError::Data(
            "No complete observations left for the model".into(),
        ));
    }

    let mut columns: Vec<DesignColumn> = Vec::new();
    if formula.intercept {
        columns.push((INTERCEPT.to_string(), vec![1.0; n]));
    }

    let mut full_coding_available = !formula.intercept;
    for term in &formula.terms {
        columns.extend(expand_term(df, term, rows, &mut full_coding_available)?);
    }

    let mut tri = TriMat::new((n, columns.len()));
    for (j, (_, values)) in columns.iter().enumerate() {
        for (i, &v) in values.iter().enumerate() {
            if v != 0.0 {
                tri.add_triplet(i, j, v);
            }
        }
    }

    let names = columns.into_iter().map(|(name, _)| name).collect();
    Ok((tri.to_csc(), names))
}

/// Build the random-intercept incidence matrix (Z) over `rows`.
///
/// Groups are the distinct labels of `column` in order of first appearance.
pub fn build_random_design(
    df: &DataFrame,
    column: &str,
    rows: &[usize],
) -> Result<(SparseMat, Vec<String>)> {
    let all = df.labels(column)?;
    let used: Vec<&str> = rows.iter().map(|&r| all[r].as_str()).collect();
    let groups = FactorColumn::new(&used);

    let z = incidence_matrix(groups.codes(), groups.n_levels());
    let names = groups.level_names().iter().map(|s| s.to_string()).collect();
    Ok((z, names))
}

fn expand_term(
    df: &DataFrame,
    term: &Term,
    rows: &[usize],
    full_coding_available: &mut bool,
) -> Result<Vec<DesignColumn>> {
    let single = term.order() == 1;
    let mut product: Vec<DesignColumn> = vec![(String::new(), vec![1.0; rows.len()])];

    for factor in &term.factors {
        let expanded = match categorical_levels(df, factor, rows)? {
            Some((labels, levels)) => {
                let full = single && *full_coding_available;
                if single {
                    *full_coding_available = false;
                }
                indicator_columns(&factor.label(), &labels, &levels, full)
            }
            None => vec![(factor.label(), numeric_values(df, factor, rows)?)],
        };

        // first factor varies fastest
        let mut next = Vec::with_capacity(product.len() * expanded.len());
        for (right_name, right) in &expanded {
            for (left_name, left) in &product {
                let name = if left_name.is_empty() {
                    right_name.clone()
                } else {
                    format!("{}:{}", left_name, right_name)
                };
                let values = left.iter().zip(right).map(|(a, b)| a * b).collect();
                next.push((name, values));
            }
        }
        product = next;
    }

    Ok(product)
}

/// Levels of `column` present in `rows`, in the order treatment coding uses.
///
/// Factor columns keep their level order and skip missing-value labels;
/// numeric columns are treated as `C(column)` and ordered numerically.
pub fn observed_levels(df: &DataFrame, column: &str, rows: &[usize]) -> Result<Vec<String>> {
    let expr = FactorExpr::Categorical(column.to_string());
    let rows: Vec<usize> = match df.get_column(column)? {
        Column::Float(values) => rows.iter().copied().filter(|&r| !values[r].is_nan()).collect(),
        Column::Factor(f) => rows
            .iter()
            .copied()
            .filter(|&r| !f.level_name(f.codes()[r]).map_or(true, is_missing_token))
            .collect(),
    };
    Ok(categorical_levels(df, &expr, &rows)?
        .map(|(_, levels)| levels)
        .unwrap_or_default())
}

/// Row labels and ordered observed levels when `factor` is categorical.
fn categorical_levels(
    df: &DataFrame,
    factor: &FactorExpr,
    rows: &[usize],
) -> Result<Option<(Vec<String>, Vec<String>)>> {
    let column = df.get_column(factor.column())?;
    let forced = matches!(factor, FactorExpr::Categorical(_));

    match (column, factor) {
        (Column::Factor(_), FactorExpr::Power { .. }) => Err(AnalysisError::Formula(format!(
            "power() applied to categorical column '{}'",
            factor.column()
        ))),
        (Column::Factor(f), _) => {
            let labels: Vec<String> = rows
                .iter()
                .map(|&r| f.level_name(f.codes()[r]).unwrap_or("").to_string())
                .collect();
            let levels = f
                .level_names()
                .into_iter()
                .filter(|lvl| labels.iter().any(|l| l == lvl))
                .map(|s| s.to_string())
                .collect();
            Ok(Some((labels, levels)))
        }
        (_, _) if forced => {
            let values = df.get_numeric(factor.column())?;
            let used: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
            let mut unique = used.clone();
            unique.sort_by(|a, b| a.total_cmp(b));
            unique.dedup();
            let labels = used.iter().map(|v| v.to_string()).collect();
            let levels = unique.iter().map(|v| v.to_string()).collect();
            Ok(Some((labels, levels)))
        }
        _ => Ok(None),
    }
}

fn numeric_values(df: &DataFrame, factor: &FactorExpr, rows: &[usize]) -> Result<Vec<f64>> {
    let values = df.get_numeric(factor.column())?;
    let used = rows.iter().map(|&r| values[r]);
    Ok(match factor {
        FactorExpr::Power { exponent, .. } => used.map(|v| v.powi(*exponent)).collect(),
        _ => used.collect(),
    })
}

fn indicator_columns(
    label: &str,
    row_labels: &[String],
    levels: &[String],
    full: bool,
) -> Vec<DesignColumn> {
    let skip = if full { 0 } else { 1 };
    levels
        .iter()
        .skip(skip)
        .map(|level| {
            let name = if full {
                format!("{}[{}]", label, level)
            } else {
                format!("{}[T.{}]", label, level)
            };
            let values = row_labels
                .iter()
                .map(|l| if l == level { 1.0 } else { 0.0 })
                .collect();
            (name, values)
        })
        .collect()
}
