use indexmap::IndexMap;

use crate::error::{AnalysisError, Result};

/// A categorical (factor) column that maps string levels to integer codes.
///
/// Levels are discovered in order of first appearance and assigned 0-based
/// codes. The first level is the baseline under treatment coding, so
/// [`FactorColumn::reorder`] is how callers choose the reference category.
#[derive(Debug, Clone)]
pub struct FactorColumn {
    /// Maps level string -> integer code (0-based), in level order.
    levels: IndexMap<String, usize>,
    /// The integer codes for each observation.
    codes: Vec<usize>,
}

impl FactorColumn {
    /// Create a new `FactorColumn` from a slice of string values.
    ///
    /// # Examples
    /// ```
    /// use lmmreport_core::data::FactorColumn;
    ///
    /// let col = FactorColumn::new(&["A", "B", "A", "C", "B"]);
    /// assert_eq!(col.n_levels(), 3);
    /// assert_eq!(col.codes(), &[0, 1, 0, 2, 1]);
    /// ```
    pub fn new(values: &[&str]) -> Self {
        let mut levels = IndexMap::new();
        let mut codes = Vec::with_capacity(values.len());

        for &val in values {
            let next_code = levels.len();
            let code = *levels.entry(val.to_string()).or_insert(next_code);
            codes.push(code);
        }

        FactorColumn { levels, codes }
    }

    /// Create a `FactorColumn` from a pre-built level map and codes.
    pub(crate) fn from_parts(levels: IndexMap<String, usize>, codes: Vec<usize>) -> Self {
        FactorColumn { levels, codes }
    }

    /// Returns the number of distinct levels.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns a slice of the integer codes for each observation.
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Returns a reference to the ordered level map (level name -> code).
    pub fn levels(&self) -> &IndexMap<String, usize> {
        &self.levels
    }

    /// Level names in level order.
    pub fn level_names(&self) -> Vec<&str> {
        self.levels.keys().map(|s| s.as_str()).collect()
    }

    /// Returns the level name for a given integer code, or `None` if the code
    /// is out of range.
    pub fn level_name(&self, code: usize) -> Option<&str> {
        self.levels
            .get_index(code)
            .map(|(name, _)| name.as_str())
    }

    /// The level label of every observation.
    pub fn labels(&self) -> Vec<&str> {
        self.codes
            .iter()
            .map(|&c| self.level_name(c).unwrap_or(""))
            .collect()
    }

    /// Impose an explicit level order. Codes are remapped so that the
    /// observation labels are unchanged.
    ///
    /// # Errors
    /// Fails if `order` repeats a level or omits a level present in the data.
    pub fn reorder(&mut self, order: &[&str]) -> Result<()> {
        let mut new_levels: IndexMap<String, usize> = IndexMap::new();
        for (i, &level) in order.iter().enumerate() {
            if new_levels.insert(level.to_string(), i).is_some() {
                return Err(AnalysisError::Data(format!(
                    "Level '{}' listed twice in level order",
                    level
                )));
            }
        }

        let mut remap = vec![0usize; self.levels.len()];
        for (name, &old_code) in &self.levels {
            match new_levels.get(name) {
                Some(&new_code) => remap[old_code] = new_code,
                None => {
                    return Err(AnalysisError::Data(format!(
                        "Level '{}' is present in the data but missing from the level order",
                        name
                    )))
                }
            }
        }

        for code in &mut self.codes {
            *code = remap[*code];
        }
        self.levels = new_levels;
        Ok(())
    }

    /// Returns the number of observations (rows).
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` if the column has no observations.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
