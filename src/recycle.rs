//! Soft-delete lifecycle: active store <-> recycle bin -> purged.

use crate::error::{AppError, Result};
use crate::models::{FileRecord, RecycledRecord, UserId, now_timestamp, FILE_COLUMNS, RECYCLED_COLUMNS};
use crate::records;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

/// Result of a purge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// Rows removed for a single file code; zero means nothing matched.
    Code(usize),
    /// Rows removed by emptying the whole bin.
    All(usize),
}

/// Moves the active record into the bin, keeping its original owner.
pub fn delete(conn: &mut Connection, code: &str, caller: UserId) -> Result<RecycledRecord> {
    let tx = conn.transaction()?;

    let record = tx
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM files WHERE file_code = ?"),
            [code],
            FileRecord::from_row,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(code.to_string()))?;

    tx.execute(
        "INSERT INTO recycle_bin (file_code, filename, filepath, tags, cabinet, shelf, box, user_id, deleted_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            record.file_code,
            record.filename,
            record.filepath,
            record.tags,
            record.cabinet,
            record.shelf,
            record.r#box,
            record.owner_id,
            now_timestamp(),
        ],
    )?;
    let bin_id = tx.last_insert_rowid();
    tx.execute("DELETE FROM files WHERE id = ?", [record.id])?;

    let recycled = tx.query_row(
        &format!("SELECT {RECYCLED_COLUMNS} FROM recycle_bin WHERE id = ?"),
        [bin_id],
        RecycledRecord::from_row,
    )?;
    tx.commit()?;

    info!(file_code = code, caller, owner = record.owner_id, "file moved to recycle bin");
    Ok(recycled)
}

/// Moves the owner's most recently deleted entry for `code` back to the store.
pub fn restore(conn: &mut Connection, code: &str, owner: UserId) -> Result<FileRecord> {
    let tx = conn.transaction()?;

    let item = tx
        .query_row(
            &format!(
                "SELECT {RECYCLED_COLUMNS} FROM recycle_bin
                 WHERE file_code = ? AND user_id = ?
                 ORDER BY deleted_at DESC, id DESC LIMIT 1"
            ),
            params![code, owner],
            RecycledRecord::from_row,
        )
        .optional()?;

    let item = match item {
        Some(item) => item,
        None if held_by_other_owner(&tx, code, owner)? => {
            return Err(AppError::Ownership(code.to_string()))
        }
        None => return Err(AppError::NotFound(code.to_string())),
    };

    if records::exists(&tx, code)? {
        return Err(AppError::Conflict(code.to_string()));
    }

    tx.execute(
        "INSERT INTO files (file_code, filename, filepath, tags, cabinet, shelf, box, user_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            item.file_code,
            item.filename,
            item.filepath,
            item.tags,
            item.cabinet,
            item.shelf,
            item.r#box,
            item.owner_id,
            now_timestamp(),
        ],
    )?;
    tx.execute("DELETE FROM recycle_bin WHERE id = ?", [item.id])?;

    let restored = records::find(&tx, code)?;
    tx.commit()?;

    info!(file_code = code, owner, "file restored from recycle bin");
    Ok(restored)
}

/// Permanently removes bin entries owned by `owner`; all of them when `code` is `None`.
pub fn purge(conn: &Connection, code: Option<&str>, owner: UserId) -> Result<PurgeOutcome> {
    match code {
        Some(code) => {
            let removed = conn.execute(
                "DELETE FROM recycle_bin WHERE file_code = ? AND user_id = ?",
                params![code, owner],
            )?;
            if removed == 0 && held_by_other_owner(conn, code, owner)? {
                return Err(AppError::Ownership(code.to_string()));
            }
            info!(file_code = code, owner, removed, "recycle bin entry purged");
            Ok(PurgeOutcome::Code(removed))
        }
        None => {
            let removed = conn.execute("DELETE FROM recycle_bin WHERE user_id = ?", [owner])?;
            info!(owner, removed, "recycle bin emptied");
            Ok(PurgeOutcome::All(removed))
        }
    }
}

pub fn list(conn: &Connection, owner: UserId) -> Result<Vec<RecycledRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECYCLED_COLUMNS} FROM recycle_bin WHERE user_id = ?
         ORDER BY deleted_at DESC, id DESC"
    ))?;
    let items = stmt
        .query_map([owner], RecycledRecord::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    debug!(owner, count = items.len(), "recycle bin listed");
    Ok(items)
}

fn held_by_other_owner(conn: &Connection, code: &str, owner: UserId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM recycle_bin WHERE file_code = ? AND user_id != ? LIMIT 1",
            params![code, owner],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::models::NewFile;

    fn seed(conn: &Connection, code: &str, filename: &str, owner: UserId) -> FileRecord {
        let new = NewFile {
            file_code: code.into(),
            filename: filename.into(),
            tags: Some("finance".into()),
            cabinet: Some("C1".into()),
            shelf: Some("S1".into()),
            r#box: Some("B1".into()),
        };
        records::create(conn, &new, owner).unwrap()
    }

    #[test]
    fn delete_moves_record_into_owners_bin() {
        let mut conn = test_connection();
        let original = seed(&conn, "A1", "Invoice.pdf", 1);

        let recycled = delete(&mut conn, "A1", 2).unwrap();
        assert!(matches!(records::find(&conn, "A1"), Err(AppError::NotFound(_))));
        assert_eq!(recycled.owner_id, 1);
        assert!(recycled.deleted_at >= original.created_at);

        let bin = list(&conn, 1).unwrap();
        assert_eq!(bin.len(), 1);
        assert_eq!(bin[0].filename, original.filename);
        assert_eq!(bin[0].tags, original.tags);
        assert_eq!(bin[0].r#box, original.r#box);
        assert!(list(&conn, 2).unwrap().is_empty());
    }

    #[test]
    fn delete_does_not_look_in_the_bin() {
        let mut conn = test_connection();
        seed(&conn, "A1", "x", 1);
        delete(&mut conn, "A1", 1).unwrap();
        assert!(matches!(delete(&mut conn, "A1", 1), Err(AppError::NotFound(_))));
    }

    #[test]
    fn restore_reverses_delete() {
        let mut conn = test_connection();
        let original = seed(&conn, "A1", "Invoice.pdf", 1);
        let recycled = delete(&mut conn, "A1", 1).unwrap();

        let restored = restore(&mut conn, "A1", 1).unwrap();
        assert_eq!(restored.file_code, original.file_code);
        assert_eq!(restored.filename, original.filename);
        assert_eq!(restored.tags, original.tags);
        assert_eq!(restored.cabinet, original.cabinet);
        assert_eq!(restored.shelf, original.shelf);
        assert_eq!(restored.r#box, original.r#box);
        assert_eq!(restored.owner_id, original.owner_id);
        // created_at is reset to the restore time
        assert!(restored.created_at >= recycled.deleted_at);
        assert!(list(&conn, 1).unwrap().is_empty());
    }

    #[test]
    fn restore_by_another_owner_is_forbidden() {
        let mut conn = test_connection();
        seed(&conn, "A1", "x", 1);
        delete(&mut conn, "A1", 1).unwrap();

        assert!(matches!(restore(&mut conn, "A1", 2), Err(AppError::Ownership(_))));
        assert!(matches!(restore(&mut conn, "ZZ", 2), Err(AppError::NotFound(_))));
        assert_eq!(list(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn restore_conflicts_with_recreated_code() {
        let mut conn = test_connection();
        seed(&conn, "A1", "old", 1);
        delete(&mut conn, "A1", 1).unwrap();
        seed(&conn, "A1", "new", 2);

        assert!(matches!(restore(&mut conn, "A1", 1), Err(AppError::Conflict(_))));
        assert_eq!(records::find(&conn, "A1").unwrap().filename, "new");
        assert_eq!(list(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn bin_keeps_history_and_restores_latest() {
        let mut conn = test_connection();
        seed(&conn, "A1", "first", 1);
        delete(&mut conn, "A1", 1).unwrap();
        seed(&conn, "A1", "second", 1);
        delete(&mut conn, "A1", 1).unwrap();

        let bin = list(&conn, 1).unwrap();
        assert_eq!(bin.len(), 2);
        assert_eq!(bin[0].filename, "second");

        assert_eq!(restore(&mut conn, "A1", 1).unwrap().filename, "second");
        assert_eq!(list(&conn, 1).unwrap()[0].filename, "first");
    }

    #[test]
    fn purge_single_code() {
        let mut conn = test_connection();
        seed(&conn, "A1", "x", 1);
        seed(&conn, "A2", "y", 1);
        delete(&mut conn, "A1", 1).unwrap();
        delete(&mut conn, "A2", 1).unwrap();

        assert_eq!(purge(&conn, Some("A1"), 1).unwrap(), PurgeOutcome::Code(1));
        assert_eq!(purge(&conn, Some("A1"), 1).unwrap(), PurgeOutcome::Code(0));
        assert!(matches!(purge(&conn, Some("A2"), 2), Err(AppError::Ownership(_))));
        assert_eq!(list(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn purge_all_leaves_other_owners_alone() {
        let mut conn = test_connection();
        seed(&conn, "A1", "x", 1);
        seed(&conn, "A2", "y", 1);
        seed(&conn, "B1", "z", 2);
        for code in ["A1", "A2", "B1"] {
            delete(&mut conn, code, 1).unwrap();
        }

        assert_eq!(purge(&conn, None, 1).unwrap(), PurgeOutcome::All(2));
        assert!(list(&conn, 1).unwrap().is_empty());
        assert_eq!(list(&conn, 2).unwrap().len(), 1);
    }

    #[test]
    fn search_delete_restore_scenario() {
        let mut conn = test_connection();
        seed(&conn, "A1", "Invoice.pdf", 1);

        let hits = records::search(&conn, "invoice").unwrap();
        assert_eq!(hits.iter().map(|r| r.file_code.as_str()).collect::<Vec<_>>(), ["A1"]);

        delete(&mut conn, "A1", 1).unwrap();
        assert!(records::list_all(&conn).unwrap().is_empty());
        assert_eq!(list(&conn, 1).unwrap().len(), 1);

        restore(&mut conn, "A1", 1).unwrap();
        assert_eq!(records::list_all(&conn).unwrap().len(), 1);
        assert!(list(&conn, 1).unwrap().is_empty());
    }
}
