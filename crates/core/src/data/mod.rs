mod dataframe;
mod factor;
mod io;
pub mod outliers;

pub use dataframe::{Column, DataFrame};
pub use factor::FactorColumn;
pub use outliers::iqr_outlier_filter;

pub(crate) use io::is_missing_token;
