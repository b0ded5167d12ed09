use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use super::KvBackend;
use crate::capabilities::{KvError, KvResult, StorageErrorCode, MAX_VALUE_SIZE};
use crate::get_current_time_ms;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS kv_entries (
        key TEXT PRIMARY KEY,
        data BLOB NOT NULL,
        updated_at INTEGER NOT NULL
    );
";

/// Durable store for native hosts. One row per key; writes run in a
/// transaction so a crash leaves either the old or the new record.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let conn = Connection::open(path).map_err(storage_error)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, KvError> {
        conn.execute_batch(SCHEMA).map_err(storage_error)?;
        debug!("sqlite kv store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, KvError> {
        self.conn
            .lock()
            .map_err(|_| KvError::storage(StorageErrorCode::Locked, "connection mutex poisoned"))
    }

    fn read(conn: &Connection, key: &str) -> KvResult {
        conn.query_row(
            "SELECT data FROM kv_entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_error)
    }

    fn commit(tx: Transaction<'_>, previous: Option<Vec<u8>>) -> KvResult {
        tx.commit().map_err(storage_error)?;
        Ok(previous)
    }
}

impl KvBackend for SqliteKvStore {
    fn get(&self, key: &str) -> KvResult {
        let conn = self.lock()?;
        Self::read(&conn, key)
    }

    fn set(&self, key: &str, value: Vec<u8>) -> KvResult {
        if value.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        let now = i64::try_from(get_current_time_ms()).unwrap_or(i64::MAX);

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage_error)?;
        let previous = Self::read(&tx, key)?;
        tx.execute(
            "INSERT INTO kv_entries (key, data, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 data = excluded.data,
                 updated_at = excluded.updated_at",
            params![key, value, now],
        )
        .map_err(storage_error)?;
        Self::commit(tx, previous)
    }

    fn delete(&self, key: &str) -> KvResult {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage_error)?;
        let previous = Self::read(&tx, key)?;
        tx.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .map_err(storage_error)?;
        Self::commit(tx, previous)
    }
}

fn storage_error(e: rusqlite::Error) -> KvError {
    use rusqlite::ErrorCode;

    let code = match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) => StorageErrorCode::Busy,
        Some(ErrorCode::DatabaseLocked) => StorageErrorCode::Locked,
        Some(ErrorCode::DiskFull) => StorageErrorCode::DiskFull,
        Some(ErrorCode::PermissionDenied | ErrorCode::ReadOnly) => {
            StorageErrorCode::PermissionDenied
        }
        Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => StorageErrorCode::Corrupted,
        Some(ErrorCode::SystemIoFailure | ErrorCode::CannotOpen) => StorageErrorCode::IoError,
        _ => StorageErrorCode::Unknown,
    };
    KvError::storage(code, e.to_string())
}
