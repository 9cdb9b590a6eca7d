//! Presentation and export of an [`ExtractionResult`].
//!
//! Three views of the same aggregate:
//!
//! * [`Metrics`] - the numbers an operator checks first
//! * [`table_view`] - a column-aligned plain-text preview
//! * [`to_xlsx_bytes`] - the spreadsheet artifact, one sheet named
//!   [`SHEET_NAME`], bold header row, one row per record, null as blank
//!
//! Column width in the spreadsheet is `max(longest cell, header) + 2`
//! characters, computed over every record.

use crate::error::Pdf2SheetError;
use crate::output::{ExtractionResult, Record, RecordField};
use crate::pipeline::postprocess::has_well_formed_codes;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use tracing::info;

/// Name of the single worksheet.
pub const SHEET_NAME: &str = "Extracao_IA";

/// Rows shown by [`render`] in the preview.
pub const DEFAULT_PREVIEW_ROWS: usize = 20;

/// Extra characters added to every column width.
const COLUMN_PADDING: usize = 2;

/// Summary numbers for one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub record_count: usize,
    pub page_count: usize,
    pub failed_pages: usize,
    /// Records whose tracking code or process number is present but
    /// doesn't match its pattern. They are kept; this is a sanity signal.
    pub malformed_records: usize,
}

impl Metrics {
    pub fn of(result: &ExtractionResult) -> Self {
        Self {
            record_count: result.record_count(),
            page_count: result.page_count,
            failed_pages: result.failed_pages().count(),
            malformed_records: result
                .records
                .iter()
                .filter(|r| !has_well_formed_codes(r))
                .count(),
        }
    }
}

/// Everything the operator surface shows for one result.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub table_view: String,
    pub metrics: Metrics,
    pub spreadsheet_bytes: Vec<u8>,
}

/// Render `result` with the default preview length.
pub fn render(result: &ExtractionResult) -> Result<Rendered, Pdf2SheetError> {
    render_with_preview(result, DEFAULT_PREVIEW_ROWS)
}

/// Render `result`, showing at most `preview_rows` rows in the table view.
pub fn render_with_preview(
    result: &ExtractionResult,
    preview_rows: usize,
) -> Result<Rendered, Pdf2SheetError> {
    Ok(Rendered {
        table_view: table_view(result, preview_rows),
        metrics: Metrics::of(result),
        spreadsheet_bytes: to_xlsx_bytes(result)?,
    })
}

/// Width of each exported column, in characters.
pub fn column_widths(records: &[Record], columns: &[RecordField]) -> Vec<usize> {
    columns
        .iter()
        .map(|&field| {
            let longest = records
                .iter()
                .filter_map(|r| r.get(field))
                .map(|v| v.chars().count())
                .max()
                .unwrap_or(0);
            longest.max(field.name().len()) + COLUMN_PADDING
        })
        .collect()
}

/// Serialise `result` to an `.xlsx` workbook held in memory.
pub fn to_xlsx_bytes(result: &ExtractionResult) -> Result<Vec<u8>, Pdf2SheetError> {
    build_workbook(result).map_err(|e| Pdf2SheetError::Export(e.to_string()))
}

fn build_workbook(result: &ExtractionResult) -> Result<Vec<u8>, XlsxError> {
    let columns = result.columns();
    let widths = column_widths(&result.records, columns);
    let header = Format::new().set_bold();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, (field, width)) in columns.iter().zip(&widths).enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, field.name(), &header)?;
        sheet.set_column_width(col, *width as f64)?;
    }

    for (i, record) in result.records.iter().enumerate() {
        let row = i as u32 + 1;
        for (col, &field) in columns.iter().enumerate() {
            if let Some(value) = record.get(field) {
                sheet.write_string(row, col as u16, value)?;
            }
        }
    }

    workbook.save_to_buffer()
}

/// Write the spreadsheet for `result` to `path`.
pub fn write_xlsx(result: &ExtractionResult, path: &Path) -> Result<(), Pdf2SheetError> {
    let bytes = to_xlsx_bytes(result)?;
    save_bytes(&bytes, path)?;
    info!(
        "Wrote {} records to {} ({} bytes)",
        result.record_count(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

/// Write already rendered spreadsheet bytes to `path`.
///
/// Uses atomic write (temp file in the same directory + rename) so a reader
/// never sees a partial file.
pub fn save_bytes(bytes: &[u8], path: &Path) -> Result<(), Pdf2SheetError> {
    let write_err = |source| Pdf2SheetError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// A column-aligned plain-text table of the first `max_rows` records.
pub fn table_view(result: &ExtractionResult, max_rows: usize) -> String {
    let columns = result.columns();
    let shown = &result.records[..result.records.len().min(max_rows)];
    let widths: Vec<usize> = column_widths(shown, columns)
        .into_iter()
        .map(|w| w - COLUMN_PADDING)
        .collect();

    let mut out = String::new();
    let header: Vec<&str> = columns.iter().map(|f| f.name()).collect();
    push_row(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let rule: Vec<&str> = rule.iter().map(String::as_str).collect();
    push_row(&mut out, &rule, &widths);

    for record in shown {
        let cells: Vec<&str> = columns
            .iter()
            .map(|&f| record.get(f).unwrap_or(""))
            .collect();
        push_row(&mut out, &cells, &widths);
    }

    let hidden = result.records.len() - shown.len();
    if hidden > 0 {
        let _ = writeln!(out, "... {} more rows", hidden);
    }
    out
}

fn push_row(out: &mut String, cells: &[&str], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}
