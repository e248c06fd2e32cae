use indexmap::IndexMap;

use super::factor::FactorColumn;
use crate::error::{AnalysisError, Result};

/// A single column in a [`DataFrame`]: floating-point numbers or categorical
/// (factor) data.
///
/// Missing numeric values are stored as `NaN` in `Float` columns.
#[derive(Debug, Clone)]
pub enum Column {
    /// A column of 64-bit floating-point values (`NaN` = missing).
    Float(Vec<f64>),
    /// A categorical column with string levels mapped to integer codes.
    Factor(FactorColumn),
}

impl Column {
    /// Returns the number of elements in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Factor(f) => f.len(),
        }
    }

    /// Returns `true` if the column is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text label of the value in `row`, as used for grouping and CSV output.
    /// Missing floats render as the empty string.
    pub fn label(&self, row: usize) -> String {
        match self {
            Column::Float(v) => {
                if v[row].is_nan() {
                    String::new()
                } else {
                    v[row].to_string()
                }
            }
            Column::Factor(f) => f.level_name(f.codes()[row]).unwrap_or("").to_string(),
        }
    }
}

/// A lightweight columnar DataFrame for repeated-measures data.
///
/// Columns are stored in insertion order using an [`IndexMap`]. All columns
/// must have the same number of rows.
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// Ordered map of column name -> column data.
    pub(crate) columns: IndexMap<String, Column>,
    /// Number of rows (observations). Zero when the DataFrame is empty.
    pub(crate) nrows: usize,
}

impl DataFrame {
    /// Create an empty DataFrame with no columns and no rows.
    pub fn new() -> Self {
        DataFrame {
            columns: IndexMap::new(),
            nrows: 0,
        }
    }

    /// Add a floating-point column. Use `f64::NAN` for missing values.
    ///
    /// # Errors
    /// Returns an error if the column length does not match existing rows,
    /// or if a column with the same name already exists.
    pub fn add_float_column(&mut self, name: &str, data: Vec<f64>) -> Result<()> {
        self.validate_and_insert(name, Column::Float(data))
    }

    /// Add a factor (categorical) column from a slice of string values.
    ///
    /// Levels are auto-discovered in order of first appearance.
    pub fn add_factor_column(&mut self, name: &str, data: &[&str]) -> Result<()> {
        let factor = FactorColumn::new(data);
        self.validate_and_insert(name, Column::Factor(factor))
    }

    /// Replace the data of an existing float column.
    ///
    /// # Errors
    /// Fails if the column is absent, is not a `Float` column, or the new
    /// data has a different length.
    pub fn replace_float_column(&mut self, name: &str, data: Vec<f64>) -> Result<()> {
        if data.len() != self.nrows {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.nrows,
                got: data.len(),
                context: format!("replacing column '{}'", name),
            });
        }
        match self.columns.get_mut(name) {
            Some(Column::Float(v)) => {
                *v = data;
                Ok(())
            }
            Some(_) => Err(AnalysisError::Data(format!(
                "Column '{}' is not a Float column",
                name
            ))),
            None => Err(AnalysisError::ColumnNotFound(name.to_string())),
        }
    }

    /// Retrieve a column by name.
    ///
    /// # Errors
    /// Returns [`AnalysisError::ColumnNotFound`] if no column with the given name exists.
    pub fn get_column(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| AnalysisError::ColumnNotFound(name.to_string()))
    }

    /// Retrieve a float column's data as a slice.
    pub fn get_float(&self, name: &str) -> Result<&[f64]> {
        match self.get_column(name)? {
            Column::Float(v) => Ok(v.as_slice()),
            _ => Err(AnalysisError::Data(format!(
                "Column '{}' is not a Float column",
                name
            ))),
        }
    }

    /// Retrieve a numeric column as owned `f64` values.
    pub fn get_numeric(&self, name: &str) -> Result<Vec<f64>> {
        match self.get_column(name)? {
            Column::Float(v) => Ok(v.clone()),
            Column::Factor(_) => Err(AnalysisError::Data(format!(
                "Column '{}' is categorical, not numeric",
                name
            ))),
        }
    }

    /// Retrieve a factor column reference.
    pub fn get_factor(&self, name: &str) -> Result<&FactorColumn> {
        match self.get_column(name)? {
            Column::Factor(f) => Ok(f),
            _ => Err(AnalysisError::Data(format!(
                "Column '{}' is not a Factor column",
                name
            ))),
        }
    }

    /// Text labels of every row of a column, whatever its type.
    pub fn labels(&self, name: &str) -> Result<Vec<String>> {
        let col = self.get_column(name)?;
        Ok((0..self.nrows).map(|i| col.label(i)).collect())
    }

    /// Composite group key of every row over the `by` columns.
    pub fn group_keys(&self, by: &[&str]) -> Result<Vec<Vec<String>>> {
        let cols = by
            .iter()
            .map(|name| self.get_column(name))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..self.nrows)
            .map(|i| cols.iter().map(|c| c.label(i)).collect())
            .collect())
    }

    /// Impose an explicit level order on a factor column. The first level
    /// becomes the treatment-coding baseline.
    pub fn set_factor_levels(&mut self, name: &str, levels: &[&str]) -> Result<()> {
        match self.columns.get_mut(name) {
            Some(Column::Factor(f)) => f.reorder(levels),
            Some(_) => Err(AnalysisError::Data(format!(
                "Column '{}' is not a Factor column",
                name
            ))),
            None => Err(AnalysisError::ColumnNotFound(name.to_string())),
        }
    }

    /// Returns the number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns.
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Returns a vector of column names in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|s| s.as_str()).collect()
    }

    /// Coerce an existing column to a `Factor` column in-place.
    ///
    /// - If the column is already a `Factor`, this is a no-op.
    /// - `Float` columns become factors whose levels are the
    ///   distinct values sorted numerically, so the baseline is the smallest
    ///   code. Missing floats are not allowed.
    pub fn as_factor(&mut self, name: &str) -> Result<()> {
        let col = self
            .columns
            .get(name)
            .ok_or_else(|| AnalysisError::ColumnNotFound(name.to_string()))?;

        let values: Vec<f64> = match col {
            Column::Factor(_) => return Ok(()),
            Column::Float(vals) => {
                if vals.iter().any(|v| v.is_nan()) {
                    return Err(AnalysisError::Data(format!(
                        "Cannot coerce column '{}' with missing values to Factor",
                        name
                    )));
                }
                vals.clone()
            }
        };

        let mut unique = values.clone();
        unique.sort_by(|a, b| a.total_cmp(b));
        unique.dedup();

        let mut levels = IndexMap::new();
        for (i, val) in unique.iter().enumerate() {
            levels.insert(val.to_string(), i);
        }
        let codes: Vec<usize> = values.iter().map(|v| levels[&v.to_string()]).collect();

        self.columns.insert(
            name.to_string(),
            Column::Factor(FactorColumn::from_parts(levels, codes)),
        );
        Ok(())
    }

    // ---- internal helpers ----

    /// Validate column length and name uniqueness, then insert.
    pub(crate) fn validate_and_insert(&mut self, name: &str, column: Column) -> Result<()> {
        if self.columns.contains_key(name) {
            return Err(AnalysisError::Data(format!(
                "Column '{}' already exists in DataFrame",
                name
            )));
        }

        let col_len = column.len();

        if self.columns.is_empty() {
            self.nrows = col_len;
        } else if col_len != self.nrows {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.nrows,
                got: col_len,
                context: format!("adding column '{}'", name),
            });
        }

        self.columns.insert(name.to_string(), column);
        Ok(())
    }
}

impl Default for DataFrame {
    fn default() -> Self {
        Self::new()
    }
}
