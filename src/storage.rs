//! Durable elapsed-time store.
//!
//! A single SQLite table maps runnable names to cumulative seconds. Values are kept
//! as base-10 text so a corrupt entry can be detected and read back as zero instead
//! of failing the run.

use crate::error::RandRunError;
use crate::model::ElapsedRecord;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Table holding one row per runnable.
pub const BUCKET: &str = "rand_run_bucket";

/// How long a writer waits for another writer's lock before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

pub struct ElapsedStore {
    conn: Connection,
    path: PathBuf,
}

impl ElapsedStore {
    /// Open (creating if needed) the store for writing.
    pub fn open(path: &Path) -> Result<Self, RandRunError> {
        let conn = Connection::open(path).map_err(|e| RandRunError::store("open", path, e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| RandRunError::store("open", path, e))?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {BUCKET} (key TEXT PRIMARY KEY, seconds TEXT NOT NULL)"
            ),
            [],
        )
        .map_err(|e| RandRunError::store("create bucket", path, e))?;
        debug!(path = %path.display(), "opened elapsed store");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store for reading. Returns `None` when the file does not exist.
    pub fn open_read_only(path: &Path) -> Result<Option<Self>, RandRunError> {
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RandRunError::store("open", path, e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| RandRunError::store("open", path, e))?;
        Ok(Some(Self {
            conn,
            path: path.to_path_buf(),
        }))
    }

    /// Start a write transaction, taking the store's single writer lock.
    pub fn begin_write(&mut self) -> Result<WriteTxn<'_>, RandRunError> {
        let Self { conn, path } = self;
        let path: &Path = path;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RandRunError::store("begin", path, e))?;
        Ok(WriteTxn { tx, path })
    }

    /// Stored seconds for `key`, or 0 when absent or unparsable.
    pub fn get_seconds(&self, key: &str) -> Result<u64, RandRunError> {
        if !bucket_exists(&self.conn).map_err(|e| RandRunError::store("read", &self.path, e))? {
            return Ok(0);
        }
        read_seconds(&self.conn, key).map_err(|e| RandRunError::store("read", &self.path, e))
    }

    /// Every record, in key order.
    pub fn list_all(&self) -> Result<Vec<ElapsedRecord>, RandRunError> {
        let map_err = |e| RandRunError::store("list", &self.path, e);
        if !bucket_exists(&self.conn).map_err(map_err)? {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT key, CAST(seconds AS TEXT) FROM {BUCKET} ORDER BY key"
            ))
            .map_err(map_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(map_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (key, raw) = row.map_err(map_err)?;
            let seconds = parse_seconds(&key, raw.as_deref());
            records.push(ElapsedRecord { key, seconds });
        }
        Ok(records)
    }

    /// Close the underlying connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<(), RandRunError> {
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, e)| RandRunError::store("close", path, e))
    }
}

/// An open write transaction. Dropping it without [`WriteTxn::commit`] rolls back.
pub struct WriteTxn<'a> {
    tx: Transaction<'a>,
    path: &'a Path,
}

impl WriteTxn<'_> {
    pub fn get_seconds(&self, key: &str) -> Result<u64, RandRunError> {
        read_seconds(&self.tx, key).map_err(|e| RandRunError::store("read", self.path, e))
    }

    pub fn put_seconds(&self, key: &str, seconds: u64) -> Result<(), RandRunError> {
        self.tx
            .execute(
                &format!("INSERT OR REPLACE INTO {BUCKET} (key, seconds) VALUES (?1, ?2)"),
                params![key, seconds.to_string()],
            )
            .map_err(|e| RandRunError::store("write", self.path, e))?;
        Ok(())
    }

    pub fn commit(self) -> Result<(), RandRunError> {
        let path = self.path;
        self.tx
            .commit()
            .map_err(|e| RandRunError::store("commit", path, e))
    }
}

fn bucket_exists(conn: &Connection) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![BUCKET],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn read_seconds(conn: &Connection, key: &str) -> rusqlite::Result<u64> {
    let raw: Option<Option<String>> = conn
        .query_row(
            &format!("SELECT CAST(seconds AS TEXT) FROM {BUCKET} WHERE key = ?1"),
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match raw {
        Some(value) => parse_seconds(key, value.as_deref()),
        None => 0,
    })
}

fn parse_seconds(key: &str, raw: Option<&str>) -> u64 {
    match raw.map(str::parse::<u64>) {
        Some(Ok(seconds)) => seconds,
        Some(Err(e)) => {
            warn!(key, value = raw, error = %e, "stored seconds are not an integer, using 0");
            0
        }
        None => {
            warn!(key, "stored seconds are null, using 0");
            0
        }
    }
}
