//! Bulk reconciliation between spreadsheets and the record store.
//!
//! Import merges a parsed sheet into the active store, first-seen-wins on
//! file code; existing records are never overwritten. The whole batch runs in
//! one transaction. Export snapshots every active record.

use crate::error::{AppError, Result};
use crate::models::{now_timestamp, UserId};
use crate::records;
use crate::spreadsheet::{Sheet, SheetRow};
use rusqlite::{params, Connection};
use tracing::{debug, info};

pub const REQUIRED_COLUMNS: [&str; 5] = ["filename", "file_code", "cabinet", "box", "shelf"];

pub const EXPORT_COLUMNS: [&str; 6] = ["filename", "file_code", "tags", "cabinet", "shelf", "box"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped_blank: usize,
    pub skipped_duplicate: usize,
}

pub fn check_schema(sheet: &Sheet) -> Result<()> {
    let missing: Vec<&'static str> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|required| !sheet.columns.iter().any(|c| c.eq_ignore_ascii_case(required)))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Schema(missing))
    }
}

pub fn import_rows(conn: &mut Connection, sheet: &Sheet, owner: UserId) -> Result<ImportSummary> {
    check_schema(sheet)?;

    let tx = conn.transaction()?;
    let mut summary = ImportSummary::default();

    for row in &sheet.rows {
        let code = field(row, "file_code").trim();
        if code.is_empty() {
            summary.skipped_blank += 1;
            continue;
        }
        if records::exists(&tx, code)? {
            debug!(file_code = code, "import skipped existing code");
            summary.skipped_duplicate += 1;
            continue;
        }

        tx.execute(
            "INSERT INTO files (file_code, filename, filepath, tags, cabinet, shelf, box, user_id, created_at)
             VALUES (?, ?, '', ?, ?, ?, ?, ?, ?)",
            params![
                code,
                field(row, "filename"),
                field(row, "tags"),
                field(row, "cabinet"),
                field(row, "shelf"),
                field(row, "box"),
                owner,
                now_timestamp(),
            ],
        )?;
        summary.inserted += 1;
    }

    tx.commit()?;
    info!(
        owner,
        inserted = summary.inserted,
        skipped_blank = summary.skipped_blank,
        skipped_duplicate = summary.skipped_duplicate,
        "spreadsheet import committed"
    );
    Ok(summary)
}

/// Active records as export rows, in [`EXPORT_COLUMNS`] order.
pub fn export_rows(conn: &Connection) -> Result<Vec<Vec<String>>> {
    let rows = records::list_all(conn)?
        .into_iter()
        .map(|r| vec![r.filename, r.file_code, r.tags, r.cabinet, r.shelf, r.r#box])
        .collect();
    Ok(rows)
}

fn field<'a>(row: &'a SheetRow, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or("")
}
