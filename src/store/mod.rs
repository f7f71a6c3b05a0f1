//! Embedded SQLite persistence.
//!
//! A single connection lives behind a mutex; every call runs on the tokio
//! blocking pool so handlers suspend instead of blocking a worker thread.
//! Table-specific SQL lives in the submodules as plain functions over a
//! `Connection`, and services compose them inside [`Store::call`].

pub mod catalog;
pub mod orders;
pub mod users;

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, ffi};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task;

use crate::log_slow_operation;

/// Calls slower than this are logged at WARN.
const SLOW_CALL_THRESHOLD_MS: u64 = 250;

/// Path that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL,
    phone TEXT,
    password TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'customer',
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    price REAL NOT NULL,
    category TEXT,
    image TEXT,
    info TEXT,
    description TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    customer_name TEXT NOT NULL,
    customer_email TEXT NOT NULL,
    customer_phone TEXT,
    customer_address TEXT,
    delivery_option TEXT,
    status TEXT NOT NULL DEFAULT 'Pending',
    total REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_email ON orders (customer_email);
CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders (created_at);
CREATE TABLE IF NOT EXISTS order_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
    product_id TEXT NOT NULL REFERENCES products (id),
    quantity INTEGER NOT NULL,
    price REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items (order_id);
";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique or primary key already holds the value
    #[error("{0}")]
    Conflict(String),
    /// SQLite reported a failure
    #[error("database error: {0}")]
    Db(String),
    /// A stored value could not be interpreted
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// The blocking task running the call failed
    #[error("store task failed: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::Db(error.to_string())
    }
}

/// Converts a unique-key violation into [`StoreError::Conflict`].
pub(crate) fn conflict_or_db(error: rusqlite::Error, message: impl FnOnce() -> String) -> StoreError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::Conflict(message())
        }
        _ => StoreError::from(error),
    }
}

/// Reads a numeric column leniently: non-numeric values become `0.0`.
pub(crate) fn lenient_f64(value: ValueRef<'_>, column: &'static str) -> f64 {
    match value {
        ValueRef::Real(number) => number,
        ValueRef::Integer(number) => number as f64,
        ValueRef::Text(raw) => std::str::from_utf8(raw)
            .ok()
            .and_then(|text| text.trim().parse::<f64>().ok())
            .filter(|number| number.is_finite())
            .unwrap_or_else(|| {
                tracing::warn!(column, "non-numeric value coerced to 0");
                0.0
            }),
        ValueRef::Null | ValueRef::Blob(_) => {
            tracing::warn!(column, "non-numeric value coerced to 0");
            0.0
        }
    }
}

/// Integer counterpart of [`lenient_f64`]; fractional values are truncated.
pub(crate) fn lenient_i64(value: ValueRef<'_>, column: &'static str) -> i64 {
    match value {
        ValueRef::Integer(number) => number,
        ValueRef::Real(number) if number.is_finite() => number.trunc() as i64,
        ValueRef::Text(raw) => {
            let parsed = std::str::from_utf8(raw).ok().and_then(|text| {
                let text = text.trim();
                text.parse::<i64>().ok().or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .filter(|number| number.is_finite())
                        .map(|number| number.trunc() as i64)
                })
            });
            parsed.unwrap_or_else(|| {
                tracing::warn!(column, "non-numeric value coerced to 0");
                0
            })
        }
        _ => {
            tracing::warn!(column, "non-numeric value coerced to 0");
            0
        }
    }
}

/// Connection settings for [`Store::open`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(5_000),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == Path::new(IN_MEMORY_PATH)
    }
}

/// Shared handle to the database; clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Opens (creating if needed) the database and bootstraps the schema.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|err| {
                    StoreError::Io(format!("failed to create {}: {err}", parent.display()))
                })?;
            }
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
            Connection::open_with_flags(&config.path, flags)?
        };

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if !config.is_in_memory() {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!(path = %config.path.display(), "store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: config.path.clone(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(&StoreConfig::in_memory())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` against the connection on the blocking pool.
    pub async fn call<F, T>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let started = Instant::now();
        let result = task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Io(err.to_string()))?;

        log_slow_operation!(
            started.elapsed(),
            SLOW_CALL_THRESHOLD_MS,
            store.operation = operation,
            "store call finished"
        );
        result
    }

    /// Readiness probe
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.call("ping", |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    /// Folds the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        self.call("checkpoint", |conn| {
            // Returns (busy, log frames, checkpointed frames); not in WAL mode it is a no-op.
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}
