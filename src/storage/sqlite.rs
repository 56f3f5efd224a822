//! SQLite-backed key-value store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::KvStore;

/// A key-value store living in one table of a SQLite database.
///
/// Several stores may share a database file as long as their table names
/// differ. An optional per-item ceiling makes the store behave like a
/// size-limited secure keychain: oversized writes are rejected.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  table: &'static str,
  max_value_len: Option<usize>,
}

impl SqliteStore {
  /// Open (or create) a store in `table` of the database at `path`.
  pub fn open(path: &Path, table: &'static str) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open storage database at {}: {}", path.display(), e))?;

    Self::with_connection(conn, table)
  }

  /// Create a store backed by a private in-memory database.
  pub fn open_in_memory(table: &'static str) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn, table)
  }

  fn with_connection(conn: Connection, table: &'static str) -> Result<Self> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
      return Err(eyre!("Invalid table name: {:?}", table));
    }

    let store = Self {
      conn: Mutex::new(conn),
      table,
      max_value_len: None,
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Reject values longer than `max` bytes.
  pub fn with_max_value_len(mut self, max: usize) -> Self {
    self.max_value_len = Some(max);
    self
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let schema = format!(
      "CREATE TABLE IF NOT EXISTS {table} (
           key TEXT PRIMARY KEY,
           value TEXT NOT NULL,
           updated_at TEXT NOT NULL DEFAULT (datetime('now'))
       );",
      table = self.table
    );

    conn
      .execute_batch(&schema)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(())
  }
}

impl KvStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let sql = format!("SELECT value FROM {} WHERE key = ?", self.table);
    conn
      .query_row(&sql, params![key], |row| row.get(0))
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    if let Some(max) = self.max_value_len {
      if value.len() > max {
        return Err(eyre!(
          "Value for {} is {} bytes, store limit is {}",
          key,
          value.len(),
          max
        ));
      }
    }

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let sql = format!(
      "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?, ?, datetime('now'))",
      self.table
    );
    conn
      .execute(&sql, params![key, value])
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let sql = format!("DELETE FROM {} WHERE key = ?", self.table);
    conn
      .execute(&sql, params![key])
      .map_err(|e| eyre!("Failed to delete {}: {}", key, e))?;

    Ok(())
  }
}
