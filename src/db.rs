use rusqlite::{Connection, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub type DbConnection = Arc<Mutex<Connection>>;

pub fn establish_connection(path: &str) -> Result<DbConnection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Opens the database, retrying while the backing volume is not ready yet.
pub async fn connect_with_retry(
    path: &str,
    attempts: u32,
    delay: Duration,
) -> Result<DbConnection> {
    let mut attempt = 1;
    loop {
        match establish_connection(path) {
            Ok(conn) => {
                info!(attempt, "database connection established");
                return Ok(conn);
            }
            Err(err) if attempt < attempts => {
                warn!(attempt, error = %err, "database not ready, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_code TEXT NOT NULL UNIQUE,
            filename TEXT NOT NULL,
            filepath TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '',
            cabinet TEXT NOT NULL DEFAULT '',
            shelf TEXT NOT NULL DEFAULT '',
            box TEXT NOT NULL DEFAULT '',
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        );

        CREATE TABLE IF NOT EXISTS recycle_bin (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_code TEXT NOT NULL,
            filename TEXT NOT NULL,
            filepath TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '',
            cabinet TEXT NOT NULL DEFAULT '',
            shelf TEXT NOT NULL DEFAULT '',
            box TEXT NOT NULL DEFAULT '',
            user_id INTEGER NOT NULL,
            deleted_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        );

        CREATE INDEX IF NOT EXISTS idx_recycle_bin_owner_code
            ON recycle_bin (user_id, file_code);

        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        );

        CREATE TABLE IF NOT EXISTS reset_tokens (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        );",
    )
}

/// Storage probe used by the health endpoint; reads the record table so a
/// missing or unreadable schema counts as down.
pub async fn ping(conn: &DbConnection) -> Result<()> {
    conn.lock()
        .await
        .query_row("SELECT COUNT(*) FROM files", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
}

#[cfg(test)]
pub(crate) fn test_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn.execute_batch(
        "INSERT INTO users (id, username, password_hash, created_at) VALUES
            (1, 'alice', 'x', '2024-01-01T00:00:00+00:00'),
            (2, 'bob', 'x', '2024-01-01T00:00:00+00:00');",
    )
    .unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_is_idempotent_and_pingable() {
        let conn = establish_connection(":memory:").unwrap();
        init_schema(&*conn.lock().await).unwrap();
        assert!(ping(&conn).await.is_ok());
    }

    #[tokio::test]
    async fn ping_fails_without_the_record_table() {
        let conn = establish_connection(":memory:").unwrap();
        conn.lock().await.execute_batch("DROP TABLE files").unwrap();
        assert!(ping(&conn).await.is_err());
    }

    #[test]
    fn file_code_is_unique_in_store_but_not_in_bin() {
        let conn = test_connection();
        let insert_file = "INSERT INTO files (file_code, filename, user_id, created_at)
            VALUES ('A1', 'a', 1, 'now')";
        conn.execute(insert_file, []).unwrap();
        assert!(conn.execute(insert_file, []).is_err());

        let insert_bin = "INSERT INTO recycle_bin (file_code, filename, user_id, deleted_at)
            VALUES ('A1', 'a', 1, 'now')";
        conn.execute(insert_bin, []).unwrap();
        conn.execute(insert_bin, []).unwrap();
    }
}
