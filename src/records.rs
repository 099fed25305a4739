//! The active record store: one row per file code.

use crate::error::{AppError, Result};
use crate::models::{FileChanges, FileRecord, NewFile, UserId, now_timestamp, FILE_COLUMNS};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};

pub fn create(conn: &Connection, new: &NewFile, owner: UserId) -> Result<FileRecord> {
    let code = new.file_code.trim();
    let filename = new.filename.trim();
    if code.is_empty() {
        return Err(AppError::Validation("File code is required".into()));
    }
    if filename.is_empty() {
        return Err(AppError::Validation("Filename is required".into()));
    }
    if exists(conn, code)? {
        return Err(AppError::DuplicateCode(code.to_string()));
    }

    let result = conn.execute(
        "INSERT INTO files (file_code, filename, filepath, tags, cabinet, shelf, box, user_id, created_at)
         VALUES (?, ?, '', ?, ?, ?, ?, ?, ?)",
        params![
            code,
            filename,
            new.tags.as_deref().unwrap_or(""),
            new.cabinet.as_deref().unwrap_or(""),
            new.shelf.as_deref().unwrap_or(""),
            new.r#box.as_deref().unwrap_or(""),
            owner,
            now_timestamp(),
        ],
    );

    match result {
        Ok(_) => {}
        // Another writer got there between the check and the insert.
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            return Err(AppError::DuplicateCode(code.to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    info!(file_code = code, owner, "file record created");
    find(conn, code)
}

pub fn update(conn: &Connection, code: &str, changes: &FileChanges) -> Result<FileRecord> {
    let current = find(conn, code)?;

    let filename = match changes.filename.as_deref().map(str::trim) {
        Some("") => return Err(AppError::Validation("Filename is required".into())),
        Some(name) => name,
        None => current.filename.as_str(),
    };

    conn.execute(
        "UPDATE files SET filename = ?, tags = ?, cabinet = ?, shelf = ?, box = ? WHERE id = ?",
        params![
            filename,
            changes.tags.as_deref().unwrap_or(&current.tags),
            changes.cabinet.as_deref().unwrap_or(&current.cabinet),
            changes.shelf.as_deref().unwrap_or(&current.shelf),
            changes.r#box.as_deref().unwrap_or(&current.r#box),
            current.id,
        ],
    )?;

    info!(file_code = code, "file record updated");
    find(conn, code)
}

pub fn find(conn: &Connection, code: &str) -> Result<FileRecord> {
    conn.query_row(
        &format!("SELECT {FILE_COLUMNS} FROM files WHERE file_code = ?"),
        [code],
        FileRecord::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(code.to_string()))
}

pub fn exists(conn: &Connection, code: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM files WHERE file_code = ?", [code], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Case-insensitive substring match on filename or file code.
///
/// SQLite's `lower()` only folds ASCII, so matching happens here with
/// Unicode case folding on both sides.
pub fn search(conn: &Connection, query: &str) -> Result<Vec<FileRecord>> {
    let needle = query.to_lowercase();
    let hits: Vec<FileRecord> = list_all(conn)?
        .into_iter()
        .filter(|record| {
            record.filename.to_lowercase().contains(&needle)
                || record.file_code.to_lowercase().contains(&needle)
        })
        .collect();
    debug!(query, hits = hits.len(), "file search");
    Ok(hits)
}

pub fn list_all(conn: &Connection) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {FILE_COLUMNS} FROM files ORDER BY id"))?;
    let records = stmt
        .query_map([], FileRecord::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}
