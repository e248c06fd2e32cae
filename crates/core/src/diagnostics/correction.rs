//! Multiple testing correction.
//!
//! Missing (`NaN`) p-values pass through unchanged and are not counted as
//! tests by Benjamini-Hochberg.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AnalysisError;

/// Multiple testing correction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PAdjust {
    /// Raw p-values.
    None,
    /// Bonferroni correction: controls family-wise error rate (FWER).
    #[default]
    Bonferroni,
    /// Benjamini-Hochberg procedure: controls false discovery rate (FDR).
    BenjaminiHochberg,
}

impl fmt::Display for PAdjust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PAdjust::None => "none",
            PAdjust::Bonferroni => "bonferroni",
            PAdjust::BenjaminiHochberg => "fdr_bh",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PAdjust {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PAdjust::None),
            "bonferroni" => Ok(PAdjust::Bonferroni),
            "fdr_bh" | "bh" | "benjamini-hochberg" => Ok(PAdjust::BenjaminiHochberg),
            other => Err(AnalysisError::ModelSpec(format!(
                "unknown p-value adjustment '{}'",
                other
            ))),
        }
    }
}

/// Apply a multiple testing correction to `p_values`.
///
/// Returns a new `Vec<f64>` of adjusted p-values in the same order as the
/// input.
pub fn adjust(p_values: &[f64], method: PAdjust) -> Vec<f64> {
    match method {
        PAdjust::None => p_values.to_vec(),
        PAdjust::Bonferroni => bonferroni(p_values),
        PAdjust::BenjaminiHochberg => benjamini_hochberg(p_values),
    }
}

/// Bonferroni correction: `p_adj = min(p * m, 1.0)` with `m` the number of
/// comparisons.
pub fn bonferroni(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len() as f64;
    p_values
        .iter()
        .map(|&p| if p.is_nan() { p } else { (p * m).min(1.0) })
        .collect()
}

/// Benjamini-Hochberg procedure for controlling the false discovery rate.
///
/// Sorts p-values, adjusts as `p * n / rank`, enforces monotonicity
/// from right to left, and clamps to [0, 1].
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let mut adjusted = p_values.to_vec();

    let mut indices: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    let n = indices.len();
    if n == 0 {
        return adjusted;
    }
    indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let n_f = n as f64;
    let mut prev = f64::INFINITY;
    for i in (0..n).rev() {
        let rank = (i + 1) as f64;
        let adj = (p_values[indices[i]] * n_f / rank).min(1.0).min(prev);
        adjusted[indices[i]] = adj;
        prev = adj;
    }

    adjusted
}
