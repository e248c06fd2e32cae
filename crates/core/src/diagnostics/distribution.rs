//! Reference distributions for p-values.

use std::f64::consts::SQRT_2;

use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::erf::erfc;

/// 97.5% quantile of the standard normal, for 95% confidence intervals.
pub const Z_975: f64 = 1.959963984540054;

/// Two-sided standard-normal p-value, `2·(1 − Φ(|z|))`. `NaN` in, `NaN` out.
pub fn normal_two_sided_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    erfc(z.abs() / SQRT_2)
}

/// Chi-squared survival function `P(X > x)` with `df` degrees of freedom.
///
/// Returns `NaN` for a `NaN` statistic or a non-positive/non-finite `df`.
pub fn chi2_sf(x: f64, df: f64) -> f64 {
    if x.is_nan() || !df.is_finite() || df <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    if x.is_infinite() {
        return 0.0;
    }
    ChiSquared::new(df).map(|d| d.sf(x)).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normal_p_values() {
        assert_relative_eq!(normal_two_sided_p(0.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(normal_two_sided_p(Z_975), 0.05, epsilon = 1e-10);
        assert_relative_eq!(normal_two_sided_p(-Z_975), 0.05, epsilon = 1e-10);
        assert_relative_eq!(normal_two_sided_p(2.0), 0.04550026389635842, epsilon = 1e-10);
        assert!(normal_two_sided_p(f64::NAN).is_nan());
        assert_eq!(normal_two_sided_p(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_chi2_sf() {
        assert_relative_eq!(chi2_sf(3.841458820694124, 1.0), 0.05, epsilon = 1e-9);
        // df = 2 has a closed form exp(-x/2)
        assert_relative_eq!(chi2_sf(4.0, 2.0), (-2.0f64).exp(), epsilon = 1e-12);
        assert_eq!(chi2_sf(0.0, 3.0), 1.0);
        assert_eq!(chi2_sf(f64::INFINITY, 3.0), 0.0);
        assert!(chi2_sf(f64::NAN, 1.0).is_nan());
        assert!(chi2_sf(1.0, 0.0).is_nan());
    }
}
