//! Core storage trait.

use color_eyre::Result;

/// A string-keyed store of string values.
///
/// Implementations are synchronous; callers in async code hold no locks
/// across `.await` points while using them.
pub trait KvStore: Send + Sync {
  /// Read the value stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any existing value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn delete(&self, key: &str) -> Result<()>;
}
