use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Column '{0}' not found in DataFrame")]
    ColumnNotFound(String),

    #[error("Formula error: {0}")]
    Formula(String),

    #[error("Model specification error: {0}")]
    ModelSpec(String),

    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Model did not converge after {iterations} iterations (change = {change:.2e})")]
    NotConverged { iterations: usize, change: f64 },

    #[error("Dimension mismatch: expected {expected}, got {got} in {context}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    #[error("Coefficient '{0}' not present in the fitted model")]
    MissingCoefficient(String),

    #[error("Fitted model does not provide {0}")]
    MissingAttribute(&'static str),

    #[error("Category '{category}' not found among {available:?}")]
    CategoryNotFound {
        category: String,
        available: Vec<String>,
    },

    #[error("Document export failed: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
