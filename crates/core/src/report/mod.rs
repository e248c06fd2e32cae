//! Result export: formatted model tables as Word documents, tidy rows as CSV.

mod docx;
mod table;

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

pub use self::docx::{export_model_table, write_docx};
pub use table::{FixedTableRow, ModelReport, VarianceRow, FIXED_HEADERS, VARIANCE_HEADERS};

/// Write serializable rows as CSV with a header taken from the field names.
pub fn write_rows_csv<T: Serialize, P: AsRef<Path>>(rows: &[T], path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
