//! Per-group interquartile-range outlier masking.
//!
//! A value is an outlier when it lies outside `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]`
//! of the non-missing values of its own group. Outliers are replaced by
//! `NaN`; everything else, including existing missing values and row
//! order, is left untouched.

use indexmap::IndexMap;

use super::dataframe::DataFrame;
use crate::error::Result;

/// Fence multiplier applied to the interquartile range.
pub const IQR_FENCE: f64 = 1.5;

/// Groups with fewer non-missing values than this are never filtered.
pub const MIN_GROUP_SIZE: usize = 3;

/// Quantile of sorted, non-missing data by linear interpolation between
/// order statistics (`h = (n - 1)·q`).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// The `[lower, upper]` IQR fence of a group, or `None` when the group is
/// too small or its IQR is zero or not finite.
pub fn iqr_fence(values: &[f64]) -> Option<(f64, f64)> {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.len() < MIN_GROUP_SIZE {
        return None;
    }
    present.sort_by(|a, b| a.total_cmp(b));

    let q1 = quantile_sorted(&present, 0.25);
    let q3 = quantile_sorted(&present, 0.75);
    let iqr = q3 - q1;
    if !iqr.is_finite() || iqr == 0.0 {
        return None;
    }
    Some((q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr))
}

/// Mask the outliers of a single group, returning a new vector of the same
/// length.
pub fn iqr_mask(values: &[f64]) -> Vec<f64> {
    match iqr_fence(values) {
        None => values.to_vec(),
        Some((lower, upper)) => values
            .iter()
            .map(|&v| {
                if v.is_nan() || (lower..=upper).contains(&v) {
                    v
                } else {
                    f64::NAN
                }
            })
            .collect(),
    }
}

/// Replace per-group outliers with `NaN` in each of `variables`.
///
/// Groups are the distinct combinations of the `by` columns; rows whose key
/// is missing form their own group. Returns a filtered copy of `df`.
///
/// # Errors
/// Fails if a grouping column is absent or a variable is not a float column.
pub fn iqr_outlier_filter(df: &DataFrame, variables: &[&str], by: &[&str]) -> Result<DataFrame> {
    let keys = df.group_keys(by)?;

    let mut groups: IndexMap<&[String], Vec<usize>> = IndexMap::new();
    for (row, key) in keys.iter().enumerate() {
        groups.entry(key.as_slice()).or_default().push(row);
    }

    let mut out = df.clone();
    for &var in variables {
        let values = df.get_float(var)?;
        let mut filtered = values.to_vec();
        let mut n_masked = 0usize;

        for rows in groups.values() {
            let group_values: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
            let masked = iqr_mask(&group_values);
            for (&row, value) in rows.iter().zip(masked) {
                if value.is_nan() && !values[row].is_nan() {
                    n_masked += 1;
                }
                filtered[row] = value;
            }
        }

        log::debug!(
            "IQR filter on '{}': {} of {} values masked across {} groups",
            var,
            n_masked,
            values.len(),
            groups.len()
        );
        out.replace_float_column(var, filtered)?;
    }

    Ok(out)
}
