use std::fs::File;
use std::path::Path;

use docx_rs::{AlignmentType, Docx, Paragraph, Run, RunFonts, Table, TableCell, TableRow};

use super::table::{ModelReport, VARIANCE_HEADERS};
use crate::error::{AnalysisError, Result};
use crate::lmm::FittedModel;

const FONT: &str = "Calibri";

// Sizes are in half-points.
const BODY_SIZE: usize = 22;
const TITLE_SIZE: usize = 30;
const HEADING_SIZE: usize = 24;

/// Write `report` as a Word document: bold title, fixed-effect table,
/// then the variance-component table under its own heading.
pub fn write_docx<P: AsRef<Path>>(report: &ModelReport, path: P) -> Result<()> {
    let path = path.as_ref();

    let fixed_rows = std::iter::once(header_row(&report.fixed_headers()))
        .chain(report.fixed.iter().map(|row| {
            let mut p_cell = Paragraph::new().add_run(Run::new().add_text(&row.p));
            if !row.stars.is_empty() {
                p_cell = p_cell.add_run(Run::new().add_text(&row.stars).bold());
            }
            TableRow::new(vec![
                text_cell(&row.variable),
                text_cell(&row.beta),
                text_cell(&row.se),
                text_cell(&row.ci),
                text_cell(&row.stat),
                TableCell::new().add_paragraph(p_cell),
            ])
        }))
        .collect();

    let variance_rows = std::iter::once(header_row(&VARIANCE_HEADERS))
        .chain(report.variance.iter().map(|row| {
            TableRow::new(vec![
                text_cell(&row.label),
                text_cell(&row.sd),
                text_cell(&row.fit),
            ])
        }))
        .collect();

    let docx = Docx::new()
        .default_fonts(RunFonts::new().ascii(FONT).hi_ansi(FONT).east_asia(FONT).cs(FONT))
        .default_size(BODY_SIZE)
        .add_paragraph(
            Paragraph::new().add_run(
                Run::new()
                    .add_text(&report.title)
                    .bold()
                    .size(TITLE_SIZE),
            ),
        )
        .add_paragraph(Paragraph::new())
        .add_table(Table::new(fixed_rows))
        .add_paragraph(Paragraph::new())
        .add_paragraph(
            Paragraph::new().add_run(
                Run::new()
                    .add_text("Variance components")
                    .bold()
                    .size(HEADING_SIZE),
            ),
        )
        .add_paragraph(Paragraph::new())
        .add_table(Table::new(variance_rows));

    let file = File::create(path)?;
    docx.build()
        .pack(file)
        .map_err(|e| AnalysisError::Export(format!("{}: {}", path.display(), e)))?;

    log::info!("Wrote model table to {}", path.display());
    Ok(())
}

/// Build the report for `model` and write it to `path`.
pub fn export_model_table<P: AsRef<Path>>(model: &FittedModel, path: P) -> Result<()> {
    write_docx(&ModelReport::from_model(model), path)
}

fn text_cell(text: &str) -> TableCell {
    TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
}

fn header_row(headers: &[&str]) -> TableRow {
    TableRow::new(
        headers
            .iter()
            .map(|h| {
                TableCell::new().add_paragraph(
                    Paragraph::new()
                        .align(AlignmentType::Left)
                        .add_run(Run::new().add_text(*h).bold()),
                )
            })
            .collect(),
    )
}
