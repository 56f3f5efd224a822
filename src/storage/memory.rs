//! In-process key-value store.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::KvStore;

/// A `HashMap`-backed store. Nothing survives the process.
///
/// Used by tests and by `--ephemeral` runs. Honors the same optional
/// per-item ceiling as [`super::SqliteStore`].
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
  max_value_len: Option<usize>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reject values longer than `max` bytes.
  pub fn with_max_value_len(mut self, max: usize) -> Self {
    self.max_value_len = Some(max);
    self
  }

  #[cfg(test)]
  pub fn keys(&self) -> Vec<String> {
    let entries = self.entries.lock().unwrap();
    entries.keys().cloned().collect()
  }
}

impl KvStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
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

    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }
}
