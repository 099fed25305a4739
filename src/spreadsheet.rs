//! Excel workbook reading and writing for import/export.

use crate::error::{AppError, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook};
use std::collections::HashMap;
use std::io::Cursor;

pub type SheetRow = HashMap<String, String>;

/// First worksheet of an uploaded workbook, header names lower-cased.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub columns: Vec<String>,
    pub rows: Vec<SheetRow>,
}

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn ensure_xlsx_filename(name: &str) -> Result<()> {
    let is_xlsx = std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    if is_xlsx {
        Ok(())
    } else {
        Err(AppError::InvalidUpload(format!(
            "{name}; please upload a .xlsx Excel file"
        )))
    }
}

pub fn read_workbook(bytes: &[u8]) -> Result<Sheet> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Spreadsheet("workbook has no worksheets".into()))??;

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| cell_text(cell).to_lowercase())
            .collect(),
        None => return Ok(Sheet::default()),
    };

    let rows: Vec<SheetRow> = rows
        .filter(|cells| cells.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|cells| {
            columns
                .iter()
                .zip(cells)
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, cell)| (name.clone(), cell_text(cell)))
                .collect::<SheetRow>()
        })
        .collect();

    Ok(Sheet { columns, rows })
}

pub fn write_workbook(headers: &[&str], rows: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    {
        let sheet = workbook.add_worksheet();
        for (col, header) in (0u16..).zip(headers) {
            sheet.write_string_with_format(0, col, *header, &bold)?;
        }
        for (row_idx, row) in (1u32..).zip(rows) {
            for (col, value) in (0u16..).zip(row) {
                if !value.is_empty() {
                    sheet.write_string(row_idx, col, value)?;
                }
            }
        }
    }
    Ok(workbook.save_to_buffer()?)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // Codes typed as numbers come back as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workbook_with(rows: &[&[&str]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        {
            let sheet = workbook.add_worksheet();
            for (r, row) in (0u32..).zip(rows) {
                for (c, value) in (0u16..).zip(row.iter()) {
                    if !value.is_empty() {
                        sheet.write_string(r, c, *value).unwrap();
                    }
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn reads_header_case_insensitively() {
        let bytes = workbook_with(&[
            &["FileName", "File_Code", "Cabinet"],
            &["Invoice.pdf", " A1 ", "C1"],
        ]);
        let sheet = read_workbook(&bytes).unwrap();
        assert_eq!(sheet.columns, vec!["filename", "file_code", "cabinet"]);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0]["filename"], "Invoice.pdf");
        assert_eq!(sheet.rows[0]["file_code"], "A1");
    }

    #[test]
    fn integral_numbers_lose_the_fraction() {
        let mut workbook = Workbook::new();
        {
            let sheet = workbook.add_worksheet();
            sheet.write_string(0, 0, "file_code").unwrap();
            sheet.write_number(1, 0, 1042.0).unwrap();
            sheet.write_number(2, 0, 3.5).unwrap();
        }
        let sheet = read_workbook(&workbook.save_to_buffer().unwrap()).unwrap();
        assert_eq!(sheet.rows[0]["file_code"], "1042");
        assert_eq!(sheet.rows[1]["file_code"], "3.5");
    }

    #[test]
    fn writes_header_then_rows() {
        let bytes = write_workbook(
            &["filename", "file_code"],
            &[vec!["Invoice.pdf".into(), "A1".into()]],
        )
        .unwrap();
        let sheet = read_workbook(&bytes).unwrap();
        assert_eq!(sheet.columns, vec!["filename", "file_code"]);
        assert_eq!(sheet.rows[0]["file_code"], "A1");
    }

    #[test]
    fn rejects_non_xlsx_uploads() {
        assert!(ensure_xlsx_filename("records.XLSX").is_ok());
        assert!(matches!(
            ensure_xlsx_filename("records.csv"),
            Err(AppError::InvalidUpload(_))
        ));
    }

    #[test]
    fn garbage_bytes_are_a_spreadsheet_error() {
        assert!(matches!(
            read_workbook(b"not a workbook"),
            Err(AppError::Spreadsheet(_))
        ));
    }
}
