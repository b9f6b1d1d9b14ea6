//! SQLite storage implementation
//!
//! Items are buffered and written in batches. Each task gets its own table, created the
//! first time one of its items is flushed; fields a later rule introduces are added as
//! new columns. A flush writes each table in its own transaction; items of a table
//! that fails stay buffered for the next flush.

use crate::storage::schema::{add_column_sql, column_name, create_table_sql, insert_sql, quote_ident};
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::Item;
use rusqlite::{params_from_iter, Connection};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of buffered items that triggers a flush
pub const DEFAULT_BATCH_COUNT: usize = 100;

struct Inner {
    conn: Connection,
    buffer: Vec<Item>,
    columns: HashMap<String, HashSet<String>>,
    batch_count: usize,
}

/// SQLite storage backend
pub struct SqliteStorage {
    inner: Mutex<Inner>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `batch_count` - Number of buffered items that triggers a flush
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, batch_count: usize) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Ok(Self::with_connection(conn, batch_count))
    }

    /// Creates an in-memory database
    pub fn in_memory(batch_count: usize) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn, batch_count))
    }

    fn with_connection(conn: Connection, batch_count: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                conn,
                buffer: Vec::new(),
                columns: HashMap::new(),
                batch_count: batch_count.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of items waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Counts the rows stored for a task; a missing table counts as zero
    pub fn row_count(&self, table: &str) -> StorageResult<u64> {
        let inner = self.lock();
        let exists: bool = inner.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(0);
        }

        let count: i64 = inner.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Reads one column of a task table, in insertion order
    pub fn column_values(&self, table: &str, column: &str) -> StorageResult<Vec<String>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY \"id\"",
            quote_ident(column),
            quote_ident(table)
        ))?;

        let values = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        Ok(values)
    }
}

impl Inner {
    /// Creates the task table or adds columns for fields it does not have yet
    fn ensure_table(&mut self, table: &str, fields: &[String]) -> StorageResult<()> {
        match self.columns.get_mut(table) {
            None => {
                self.conn.execute(&create_table_sql(table, fields), [])?;

                let mut known: HashSet<String> = HashSet::new();
                let mut stmt = self
                    .conn
                    .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
                for name in stmt.query_map([], |row| row.get::<_, String>(1))? {
                    known.insert(name?);
                }
                drop(stmt);

                for field in fields {
                    let column = column_name(field);
                    if !known.contains(column.as_ref()) {
                        self.conn.execute(&add_column_sql(table, field), [])?;
                        known.insert(column.into_owned());
                    }
                }
                self.columns.insert(table.to_string(), known);
            }
            Some(known) => {
                for field in fields {
                    let column = column_name(field);
                    if !known.contains(column.as_ref()) {
                        self.conn.execute(&add_column_sql(table, field), [])?;
                        known.insert(column.into_owned());
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes one table's items in a single transaction
    fn write_table(&mut self, table: &str, items: &[Item]) -> StorageResult<()> {
        for item in items {
            self.ensure_table(table, &item.fields)?;
        }

        let tx = self.conn.transaction()?;
        for item in items {
            let values: Vec<String> = item
                .fields
                .iter()
                .map(|field| item.text(field))
                .chain([item.url.clone(), item.time.to_rfc3339()])
                .collect();

            let mut stmt = tx.prepare_cached(&insert_sql(table, &item.fields))?;
            stmt.execute(params_from_iter(values.iter()))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut groups: Vec<(String, Vec<Item>)> = Vec::new();
        for item in std::mem::take(&mut self.buffer) {
            match groups.iter_mut().find(|(table, _)| table == item.table_name()) {
                Some((_, items)) => items.push(item),
                None => groups.push((item.table_name().to_string(), vec![item])),
            }
        }

        let mut written = 0;
        let mut first_error = None;
        for (table, items) in groups {
            match self.write_table(&table, &items) {
                Ok(()) => written += items.len(),
                Err(e) => {
                    tracing::error!(table = %table, "Failed to flush {} items: {}", items.len(), e);
                    self.buffer.extend(items);
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::debug!("Flushed {} items to SQLite", written);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Storage for SqliteStorage {
    fn save(&self, items: &[Item]) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.buffer.extend_from_slice(items);

        if inner.buffer.len() >= inner.batch_count {
            inner.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        self.lock().flush()
    }
}
