use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// A tracked physical file in the active store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub file_code: String,
    pub filename: String,
    pub filepath: String,
    pub tags: String,
    pub cabinet: String,
    pub shelf: String,
    pub r#box: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A soft-deleted snapshot of a [`FileRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecycledRecord {
    pub id: i64,
    pub file_code: String,
    pub filename: String,
    pub filepath: String,
    pub tags: String,
    pub cabinet: String,
    pub shelf: String,
    pub r#box: String,
    pub owner_id: UserId,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFile {
    pub file_code: String,
    pub filename: String,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub cabinet: Option<String>,
    #[serde(default)]
    pub shelf: Option<String>,
    #[serde(default)]
    pub r#box: Option<String>,
}

/// Partial update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileChanges {
    pub filename: Option<String>,
    pub tags: Option<String>,
    pub cabinet: Option<String>,
    pub shelf: Option<String>,
    pub r#box: Option<String>,
}

/// The identity the auth layer hands to every gated handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
}

pub(crate) const FILE_COLUMNS: &str =
    "id, file_code, filename, filepath, tags, cabinet, shelf, box, user_id, created_at";

pub(crate) const RECYCLED_COLUMNS: &str =
    "id, file_code, filename, filepath, tags, cabinet, shelf, box, user_id, deleted_at";

impl FileRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(FileRecord {
            id: row.get(0)?,
            file_code: row.get(1)?,
            filename: row.get(2)?,
            filepath: row.get(3)?,
            tags: row.get(4)?,
            cabinet: row.get(5)?,
            shelf: row.get(6)?,
            r#box: row.get(7)?,
            owner_id: row.get(8)?,
            created_at: timestamp(row, 9)?,
        })
    }

    pub fn location(&self) -> String {
        format!("{} > {} > {}", self.cabinet, self.shelf, self.r#box)
    }
}

impl RecycledRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RecycledRecord {
            id: row.get(0)?,
            file_code: row.get(1)?,
            filename: row.get(2)?,
            filepath: row.get(3)?,
            tags: row.get(4)?,
            cabinet: row.get(5)?,
            shelf: row.get(6)?,
            r#box: row.get(7)?,
            owner_id: row.get(8)?,
            deleted_at: timestamp(row, 9)?,
        })
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
