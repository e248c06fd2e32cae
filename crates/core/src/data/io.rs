use std::path::Path;

use crate::error::{AnalysisError, Result};

use super::dataframe::{Column, DataFrame};
use super::factor::FactorColumn;

/// Tokens that denote a missing numeric value in CSV input.
const MISSING_TOKENS: [&str; 5] = ["", "NA", "NaN", "nan", "null"];

pub(crate) fn is_missing_token(s: &str) -> bool {
    MISSING_TOKENS.contains(&s)
}

impl DataFrame {
    /// Read a CSV file into a DataFrame.
    ///
    /// The first row is treated as a header. Each column is auto-detected:
    /// - If every non-missing value parses as `f64`, it becomes a `Float`
    ///   column and missing tokens (`""`, `NA`, `NaN`, `nan`, `null`) become `NaN`.
    /// - Otherwise it becomes a `Factor` column (categorical) with the raw
    ///   strings as levels.
    ///
    /// # Examples
    /// ```no_run
    /// use lmmreport_core::data::DataFrame;
    ///
    /// let df = DataFrame::from_csv("alpha_power.csv").unwrap();
    /// println!("rows = {}, cols = {}", df.nrows(), df.ncols());
    /// ```
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;
        Self::from_csv_reader(reader)
    }

    /// Read CSV data from any reader (used by [`DataFrame::from_csv`] and tests).
    pub fn from_csv_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if headers.is_empty() {
            return Ok(DataFrame::new());
        }

        let ncols = headers.len();
        let mut string_columns: Vec<Vec<String>> = vec![Vec::new(); ncols];

        for result in reader.records() {
            let record = result?;
            if record.len() != ncols {
                return Err(AnalysisError::Data(format!(
                    "Row has {} fields but header has {} columns",
                    record.len(),
                    ncols
                )));
            }
            for (i, field) in record.iter().enumerate() {
                string_columns[i].push(field.to_string());
            }
        }

        if string_columns[0].is_empty() {
            return Ok(DataFrame::new());
        }

        let mut df = DataFrame::new();

        for (header, raw) in headers.iter().zip(string_columns.iter()) {
            let float_values: std::result::Result<Vec<f64>, _> = raw
                .iter()
                .map(|s| {
                    if is_missing_token(s) {
                        Ok(f64::NAN)
                    } else {
                        s.parse::<f64>()
                    }
                })
                .collect();

            match float_values {
                Ok(values) => df.add_float_column(header, values)?,
                Err(_) => {
                    let str_refs: Vec<&str> = raw.iter().map(|s| s.as_str()).collect();
                    let factor = FactorColumn::new(&str_refs);
                    df.validate_and_insert(header, Column::Factor(factor))?;
                }
            }
        }

        log::debug!(
            "Read CSV with {} rows and {} columns",
            df.nrows(),
            df.ncols()
        );
        Ok(df)
    }

    /// Write the DataFrame as CSV with a header row. Missing floats are
    /// written as empty fields.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = csv::Writer::from_path(path.as_ref())?;
        self.to_csv_writer(writer)
    }

    /// Write CSV to any writer.
    pub fn to_csv_writer<W: std::io::Write>(&self, mut writer: csv::Writer<W>) -> Result<()> {
        writer.write_record(self.columns.keys())?;
        for row in 0..self.nrows {
            let record: Vec<String> = self.columns.values().map(|c| c.label(row)).collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_str(content: &str) -> Result<DataFrame> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        DataFrame::from_csv_reader(reader)
    }

    #[test]
    fn test_from_csv_basic() {
        let df = read_str("ID,Condition,AlphaPower\n1,rest,5.2\n2,task,3.1\n1,task,4.7\n").unwrap();

        assert_eq!(df.nrows(), 3);
        assert_eq!(df.ncols(), 3);

        let cond = df.get_factor("Condition").unwrap();
        assert_eq!(cond.n_levels(), 2);
        assert_eq!(cond.codes(), &[0, 1, 1]);

        assert_eq!(df.get_float("ID").unwrap(), &[1.0, 2.0, 1.0]);
        assert_eq!(df.get_float("AlphaPower").unwrap(), &[5.2, 3.1, 4.7]);
    }

    #[test]
    fn test_from_csv_missing_tokens_become_nan() {
        let df = read_str("id,value\n1,10.5\n2,NA\n3,\n4,7.3\n").unwrap();
        let v = df.get_float("value").unwrap();
        assert_eq!(v[0], 10.5);
        assert!(v[1].is_nan());
        assert!(v[2].is_nan());
        assert_eq!(v[3], 7.3);
    }

    #[test]
    fn test_from_csv_non_numeric_makes_factor() {
        let df = read_str("id,value\n1,10.5\n2,high\n").unwrap();
        let val = df.get_factor("value").unwrap();
        assert_eq!(val.level_names(), vec!["10.5", "high"]);
    }

    #[test]
    fn test_from_csv_empty_body() {
        let df = read_str("a,b,c\n").unwrap();
        assert_eq!(df.nrows(), 0);
        assert_eq!(df.ncols(), 0);
    }

    #[test]
    fn test_from_csv_file_not_found() {
        assert!(DataFrame::from_csv("/nonexistent/path/data.csv").is_err());
    }

    #[test]
    fn test_from_csv_whitespace_trimmed() {
        let df = read_str("name , score\n  Alice , 95 \n  Bob , 88 \n").unwrap();
        assert_eq!(df.column_names(), vec!["name", "score"]);
        assert_eq!(df.get_float("score").unwrap(), &[95.0, 88.0]);
    }

    #[test]
    fn test_to_csv_writes_missing_as_empty() {
        let mut df = DataFrame::new();
        df.add_factor_column("g", &["a", "b"]).unwrap();
        df.add_float_column("x", vec![1.5, f64::NAN]).unwrap();

        let mut buf = Vec::new();
        df.to_csv_writer(csv::Writer::from_writer(&mut buf)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "g,x\na,1.5\nb,\n");
    }
}
