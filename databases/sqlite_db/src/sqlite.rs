// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # SQLite database backend.
//!
//! Stores encoded server states in a SQLite table with the schema
//! `(key TEXT PRIMARY KEY, value BLOB)`. Tables opened from the same backend
//! share one connection.
//!

use store::{Error, backend::Backend};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::info;

use std::{fs, path::Path, sync::Arc};

/// SQLite table of encoded states.
#[derive(Clone)]
pub struct SqliteBackend {
    /// Thread-safe shared SQLite connection.
    conn: Arc<Mutex<Connection>>,
    /// Table name in the database.
    table: String,
}

impl SqliteBackend {
    /// Opens or creates the database `database.db` inside `path` and the
    /// table `table` in it.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory holding the database file. Created if missing.
    /// * `table` - Table name. Only ASCII letters, digits and underscores
    ///   are accepted.
    ///
    /// # Errors
    ///
    /// Returns Error::CreateStore if:
    /// - The directory cannot be created
    /// - The SQLite connection cannot be opened
    /// - The table name is invalid or the table cannot be created
    ///
    pub fn new(path: &str, table: &str) -> Result<Self, Error> {
        info!("Creating SQLite backend");
        if !Path::new(&path).exists() {
            info!("Path does not exist, creating it");
            fs::create_dir_all(path).map_err(|e| {
                Error::CreateStore(format!(
                    "fail SQLite create directory: {}",
                    e
                ))
            })?;
        }

        info!("Opening SQLite connection");
        let conn = open(format!("{}/database.db", path)).map_err(|e| {
            Error::CreateStore(format!("fail SQLite open connection: {}", e))
        })?;

        Self::create_table(Arc::new(Mutex::new(conn)), table)
    }

    /// Opens or creates another table on the same connection.
    pub fn with_table(&self, table: &str) -> Result<Self, Error> {
        Self::create_table(self.conn.clone(), table)
    }

    fn create_table(
        conn: Arc<Mutex<Connection>>,
        table: &str,
    ) -> Result<Self, Error> {
        if table.is_empty()
            || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::CreateStore(format!(
                "invalid SQLite table name `{}`",
                table
            )));
        }

        let stmt = format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT NOT NULL, value \
            BLOB NOT NULL, PRIMARY KEY (key))",
            table
        );
        conn.lock().execute(stmt.as_str(), ()).map_err(|e| {
            Error::CreateStore(format!("fail SQLite create table: {}", e))
        })?;

        Ok(Self {
            conn,
            table: table.to_owned(),
        })
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        self.table.as_str()
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        let conn = self.conn.lock();
        let query = format!("SELECT value FROM {} WHERE key = ?1", &self.table);
        let row: Vec<u8> = conn
            .query_row(&query, params![key], |row| row.get(0))
            .map_err(|e| Error::EntryNotFound(e.to_string()))?;

        Ok(row)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), Error> {
        let conn = self.conn.lock();
        let stmt = format!(
            "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
            &self.table
        );
        conn.execute(&stmt, params![key, data])
            .map_err(|e| Error::Store(format!("sqlite insert error: {}", e)))?;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool, Error> {
        let conn = self.conn.lock();
        let query = format!("SELECT 1 FROM {} WHERE key = ?1", &self.table);
        let found: Option<i64> = conn
            .query_row(&query, params![key], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Get(format!("sqlite query error: {}", e)))?;
        Ok(found.is_some())
    }

    fn values(&self) -> Result<Vec<Vec<u8>>, Error> {
        let conn = self.conn.lock();
        let query = format!("SELECT value FROM {} ORDER BY key ASC", &self.table);
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| Error::Get(format!("sqlite query error: {}", e)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| Error::Get(format!("sqlite query error: {}", e)))?;

        let mut values = Vec::new();
        for row in rows {
            values.push(
                row.map_err(|e| Error::Get(format!("sqlite row error: {}", e)))?,
            );
        }
        Ok(values)
    }
}

/// Opens a connection in WAL mode.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    let path = path.as_ref();
    let flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        Error::Store(format!("SQLite failed to open connection: {}", e))
    })?;

    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        ",
    )
    .map_err(|e| {
        Error::Store(format!("SQLite failed to execute batch: {}", e))
    })?;

    Ok(conn)
}
