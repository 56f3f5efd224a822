//! Cache layer that routes values between the secure and bulk stores.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::KvStore;

/// Serialized values longer than this many bytes go to the bulk store.
pub const DEFAULT_SIZE_THRESHOLD: usize = 2048;

/// Which backing store holds a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
  /// Fast, size-limited store
  Secure,
  /// Large-capacity store
  Bulk,
}

/// Best-effort JSON cache over two key-value stores.
///
/// Small values live in the secure store and large ones in the bulk store,
/// under the same logical key. Reads check the secure store first. Nothing
/// here returns an error: storage problems are logged and degrade to a miss
/// or a dropped write.
#[derive(Clone)]
pub struct Cache {
  secure: Arc<dyn KvStore>,
  bulk: Arc<dyn KvStore>,
  size_threshold: usize,
}

impl Cache {
  /// Create a cache over the given stores with the default threshold.
  pub fn new(secure: Arc<dyn KvStore>, bulk: Arc<dyn KvStore>) -> Self {
    Self {
      secure,
      bulk,
      size_threshold: DEFAULT_SIZE_THRESHOLD,
    }
  }

  /// Set the serialized size above which values go to the bulk store.
  pub fn with_size_threshold(mut self, size_threshold: usize) -> Self {
    self.size_threshold = size_threshold;
    self
  }

  /// Which store a serialized value of `len` bytes is routed to.
  pub fn tier_for(&self, len: usize) -> Tier {
    if len > self.size_threshold {
      Tier::Bulk
    } else {
      Tier::Secure
    }
  }

  fn store(&self, tier: Tier) -> &dyn KvStore {
    match tier {
      Tier::Secure => self.secure.as_ref(),
      Tier::Bulk => self.bulk.as_ref(),
    }
  }

  /// Store `value` under `key`. Failures are logged and dropped.
  pub fn set_cache<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
    let serialized = match serde_json::to_string(value) {
      Ok(s) => s,
      Err(e) => {
        warn!(key, error = %e, "Failed to serialize cache value");
        return;
      }
    };

    let tier = self.tier_for(serialized.len());
    if let Err(e) = self.store(tier).set(key, &serialized) {
      warn!(key, ?tier, error = %e, "Failed to write cache entry");
      return;
    }
    debug!(key, ?tier, bytes = serialized.len(), "Cached value");

    // A value that changed size class must not leave an older copy behind,
    // the secure store would shadow a fresh bulk entry on read.
    let other = match tier {
      Tier::Secure => Tier::Bulk,
      Tier::Bulk => Tier::Secure,
    };
    if let Err(e) = self.store(other).delete(key) {
      warn!(key, tier = ?other, error = %e, "Failed to evict stale cache entry");
    }
  }

  /// Read the value under `key`. Misses and errors both yield `None`.
  pub fn get_cache(&self, key: &str) -> Option<Value> {
    let raw = match self.read_raw(key) {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(key, error = %e, "Failed to read cache entry");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key, error = %e, "Failed to parse cache entry");
        None
      }
    }
  }

  /// Read and deserialize the value under `key` into `T`.
  pub fn get_cache_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let value = self.get_cache(key)?;
    match serde_json::from_value(value) {
      Ok(typed) => Some(typed),
      Err(e) => {
        warn!(key, error = %e, "Cache entry has unexpected shape");
        None
      }
    }
  }

  fn read_raw(&self, key: &str) -> color_eyre::Result<Option<String>> {
    if let Some(raw) = self.secure.get(key)? {
      return Ok(Some(raw));
    }
    self.bulk.get(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStore;
  use color_eyre::{eyre::eyre, Result};
  use serde_json::json;

  fn stores() -> (Arc<MemoryStore>, Arc<MemoryStore>) {
    (
      Arc::new(MemoryStore::new().with_max_value_len(DEFAULT_SIZE_THRESHOLD)),
      Arc::new(MemoryStore::new()),
    )
  }

  fn cache_over(secure: &Arc<MemoryStore>, bulk: &Arc<MemoryStore>) -> Cache {
    Cache::new(secure.clone(), bulk.clone())
  }

  fn big_list() -> Value {
    let rows: Vec<Value> = (0..200)
      .map(|i| json!({"name": format!("CUST-{:05}", i), "customer_name": "Someone"}))
      .collect();
    Value::Array(rows)
  }

  #[test]
  fn test_small_value_round_trip_uses_secure() {
    let (secure, bulk) = stores();
    let cache = cache_over(&secure, &bulk);
    let value = json!(["Alice", "Bob"]);

    cache.set_cache("names", &value);

    assert_eq!(cache.get_cache("names"), Some(value));
    assert!(secure.get("names").unwrap().is_some());
    assert!(bulk.get("names").unwrap().is_none());
  }

  #[test]
  fn test_large_value_round_trip_uses_bulk() {
    let (secure, bulk) = stores();
    let cache = cache_over(&secure, &bulk);
    let value = big_list();
    assert!(serde_json::to_string(&value).unwrap().len() > DEFAULT_SIZE_THRESHOLD);

    cache.set_cache("customers", &value);

    assert_eq!(cache.get_cache("customers"), Some(value));
    assert!(secure.get("customers").unwrap().is_none());
    assert!(bulk.get("customers").unwrap().is_some());
  }

  #[test]
  fn test_threshold_boundary() {
    let (secure, bulk) = stores();
    let cache = cache_over(&secure, &bulk);
    assert_eq!(cache.tier_for(DEFAULT_SIZE_THRESHOLD), Tier::Secure);
    assert_eq!(cache.tier_for(DEFAULT_SIZE_THRESHOLD + 1), Tier::Bulk);
  }

  #[test]
  fn test_value_changing_size_class_round_trips() {
    let (secure, bulk) = stores();
    let cache = cache_over(&secure, &bulk);

    cache.set_cache("k", &json!(["short"]));
    cache.set_cache("k", &big_list());
    assert_eq!(cache.get_cache("k"), Some(big_list()));
    assert!(secure.get("k").unwrap().is_none());

    cache.set_cache("k", &json!(["short again"]));
    assert_eq!(cache.get_cache("k"), Some(json!(["short again"])));
    assert!(bulk.get("k").unwrap().is_none());
  }

  #[test]
  fn test_miss_returns_none() {
    let (secure, bulk) = stores();
    let cache = cache_over(&secure, &bulk);
    assert_eq!(cache.get_cache("nothing"), None);
  }

  #[test]
  fn test_unparseable_entry_is_a_miss() {
    let (secure, bulk) = stores();
    secure.set("broken", "{not json").unwrap();
    let cache = cache_over(&secure, &bulk);
    assert_eq!(cache.get_cache("broken"), None);
  }

  #[test]
  fn test_get_cache_as_typed() {
    let (secure, bulk) = stores();
    let cache = cache_over(&secure, &bulk);
    cache.set_cache("names", &vec!["a".to_string(), "b".to_string()]);

    let names: Option<Vec<String>> = cache.get_cache_as("names");
    assert_eq!(names, Some(vec!["a".to_string(), "b".to_string()]));

    let wrong: Option<u32> = cache.get_cache_as("names");
    assert_eq!(wrong, None);
  }

  struct FailingStore;

  impl KvStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Err(eyre!("disk unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Err(eyre!("disk unavailable"))
    }

    fn delete(&self, _key: &str) -> Result<()> {
      Err(eyre!("disk unavailable"))
    }
  }

  #[test]
  fn test_storage_failures_are_swallowed() {
    let cache = Cache::new(Arc::new(FailingStore), Arc::new(FailingStore));

    cache.set_cache("k", &json!({"a": 1}));
    assert_eq!(cache.get_cache("k"), None);
  }
}
