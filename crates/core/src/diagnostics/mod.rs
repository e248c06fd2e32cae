//! Inference on fitted models: coefficient summaries, contrasts, Wald and
//! likelihood-ratio tests, effect sizes.

pub mod contrasts;
pub mod correction;
pub mod distribution;
pub mod effect_size;
pub mod lrt;
pub mod summary;
pub mod wald;

pub use contrasts::{level_contrast_vector, level_contrasts, pairwise_contrasts_at_reference, ContrastRow};
pub use correction::PAdjust;
pub use distribution::{chi2_sf, normal_two_sided_p};
pub use effect_size::lr_effect_sizes;
pub use lrt::{likelihood_ratio_test, LrtResult};
pub use summary::{
    fixed_effects_summary, fixed_effects_table, format_p_value, prettify_term, significance_label,
    significance_stars, FixedEffectRow, TableOptions,
};
pub use wald::{format_wald_tests, joint_wald_tests, WaldGroup, WaldRow};
