/// Likelihood-ratio effect sizes `(R², f²)`.
///
/// ```text
/// R² = 1 − exp(−LR / n),   f² = R² / (1 − R²)
/// ```
///
/// Returns `(NaN, NaN)` when `lr` or `n` is not a positive finite number, or
/// when `R²` reaches 1. `df_diff` is accepted for the call signature of the
/// test it accompanies and does not enter the formula.
pub fn lr_effect_sizes(lr: f64, _df_diff: f64, n: f64) -> (f64, f64) {
    if !(lr.is_finite() && lr > 0.0 && n.is_finite() && n > 0.0) {
        return (f64::NAN, f64::NAN);
    }
    let r2 = 1.0 - (-lr / n).exp();
    if r2 >= 1.0 {
        return (f64::NAN, f64::NAN);
    }
    (r2, r2 / (1.0 - r2))
}
