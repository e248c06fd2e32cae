mod builder;
mod design;
pub mod formula;

pub use builder::{MixedModel, MixedModelBuilder};
pub use design::{build_fixed_design, build_random_design, complete_rows, observed_levels, INTERCEPT};
pub use formula::{FactorExpr, Formula, Term};
