mod convergence;
mod em;
mod fit;
mod fitted;
mod likelihood;
mod mme;
mod profile;

pub use convergence::ConvergenceMonitor;
pub use em::EmFitter;
pub use fit::{Optimizer, RANDOM_INTERCEPT};
pub use fitted::{FitInfo, FittedModel, FittedModelBuilder, RandomEffects, StatKind};
pub use mme::{MixedModelEquations, MmeSolution};
pub use profile::ProfileFitter;
