use serde::Serialize;

use super::distribution::chi2_sf;
use crate::error::{AnalysisError, Result};
use crate::lmm::FittedModel;

/// Likelihood-ratio test of a reduced model nested in a full model.
#[derive(Debug, Clone, Serialize)]
pub struct LrtResult {
    pub ll_full: f64,
    pub ll_reduced: f64,
    pub df_full: usize,
    pub df_reduced: usize,
    /// `df_full − df_reduced` as computed, possibly non-positive.
    pub df_diff: i64,
    /// Degrees of freedom of the chi-square reference.
    pub df_used: usize,
    /// `2·(ll_full − ll_reduced)`.
    pub lr: f64,
    pub p: f64,
    /// Set when `df_diff` was not positive and 1 was used instead. The
    /// models are then not nested as given.
    pub df_fallback: bool,
}

/// `LR = 2·(logLik_full − logLik_reduced)` against a chi-square with the
/// difference in parameter counts as degrees of freedom.
///
/// A non-positive parameter-count difference is replaced by 1 and flagged
/// in [`LrtResult::df_fallback`]. Comparing REML fits that differ in their
/// fixed effects is not meaningful; this is logged, not rejected.
///
/// # Errors
/// [`AnalysisError::MissingAttribute`] if either model lacks a
/// log-likelihood or a parameter count.
pub fn likelihood_ratio_test(full: &FittedModel, reduced: &FittedModel) -> Result<LrtResult> {
    let ll_full = full
        .log_likelihood()
        .ok_or(AnalysisError::MissingAttribute("a log-likelihood"))?;
    let ll_reduced = reduced
        .log_likelihood()
        .ok_or(AnalysisError::MissingAttribute("a log-likelihood"))?;
    let df_full = full
        .n_params()
        .ok_or(AnalysisError::MissingAttribute("a parameter count"))?;
    let df_reduced = reduced
        .n_params()
        .ok_or(AnalysisError::MissingAttribute("a parameter count"))?;

    if full.is_reml() == Some(true) || reduced.is_reml() == Some(true) {
        log::warn!("Likelihood-ratio test on REML fits; refit with ML to compare fixed effects");
    }

    let df_diff = df_full as i64 - df_reduced as i64;
    let df_fallback = df_diff <= 0;
    let df_used = if df_fallback {
        log::warn!(
            "Parameter count difference is {} (full {}, reduced {}); using 1 degree of freedom",
            df_diff,
            df_full,
            df_reduced
        );
        1
    } else {
        df_diff as usize
    };

    let lr = 2.0 * (ll_full - ll_reduced);
    let p = chi2_sf(lr, df_used as f64);

    Ok(LrtResult {
        ll_full,
        ll_reduced,
        df_full,
        df_reduced,
        df_diff,
        df_used,
        lr,
        p,
        df_fallback,
    })
}
