use indexmap::IndexMap;

/// The scalar type used throughout the library.
pub type Scalar = f64;

/// Dense matrix type (column-major).
pub type DenseMatrix = nalgebra::DMatrix<Scalar>;

/// Dense vector type.
pub type DenseVector = nalgebra::DVector<Scalar>;

/// Sparse matrix type (CSC format).
pub type SparseMat = sprs::CsMat<Scalar>;

/// Fixed-effect coefficients keyed by parameter name.
///
/// Insertion order is the row/column order of the matching
/// [`CovarianceMatrix`].
pub type ParameterVector = IndexMap<String, Scalar>;

/// Covariance of the fixed-effect estimates, indexed like the
/// [`ParameterVector`] it belongs to.
pub type CovarianceMatrix = DenseMatrix;
