pub mod data;
pub mod diagnostics;
pub mod error;
pub mod lmm;
pub mod matrix;
pub mod model;
pub mod plot;
pub mod report;
pub mod types;

pub use error::{AnalysisError, Result};
