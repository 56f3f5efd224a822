//! Wires config into stores, clients and the sync engine.

use color_eyre::Result;
use std::sync::Arc;
use tracing::debug;

use crate::cache::Cache;
use crate::config::Config;
use crate::erp::ErpClient;
use crate::offline::OfflineClient;
use crate::queue::PersistentQueue;
use crate::storage::{KvStore, MemoryStore, SqliteStore};
use crate::sync::SyncEngine;

/// Everything a host (CLI, UI shell) needs to talk to the core.
pub struct App {
  pub config: Config,
  pub remote: Arc<ErpClient>,
  pub queue: Arc<PersistentQueue>,
  pub client: OfflineClient<ErpClient, PersistentQueue>,
  pub engine: SyncEngine<ErpClient, PersistentQueue>,
}

/// The three stores the core persists to.
struct Stores {
  secure: Arc<dyn KvStore>,
  bulk: Arc<dyn KvStore>,
  queue: Arc<dyn KvStore>,
}

impl App {
  /// Open the on-disk stores, or in-memory ones when `ephemeral`.
  pub fn open(config: Config, ephemeral: bool) -> Result<Self> {
    let stores = if ephemeral {
      Self::memory_stores(&config)
    } else {
      Self::sqlite_stores(&config)?
    };

    let remote = Arc::new(ErpClient::from_config(&config)?);
    let queue = Arc::new(PersistentQueue::new(stores.queue));
    let cache =
      Cache::new(stores.secure, stores.bulk).with_size_threshold(config.cache.size_threshold);

    let client = OfflineClient::new(remote.clone(), queue.clone(), cache);
    let engine = SyncEngine::new(remote.clone(), queue.clone());

    Ok(Self {
      config,
      remote,
      queue,
      client,
      engine,
    })
  }

  fn sqlite_stores(config: &Config) -> Result<Stores> {
    let data_dir = config.data_dir()?;
    let secure_path = data_dir.join("secure.db");
    let bulk_path = data_dir.join("bulk.db");
    debug!(dir = %data_dir.display(), "Opening stores");

    let secure = SqliteStore::open(&secure_path, "secure_kv")?
      .with_max_value_len(config.cache.secure_max_value_len);
    // The queue shares the secure database without the per-item ceiling,
    // a long queue must never be rejected
    let queue = SqliteStore::open(&secure_path, "queue_kv")?;
    let bulk = SqliteStore::open(&bulk_path, "bulk_kv")?;

    Ok(Stores {
      secure: Arc::new(secure),
      bulk: Arc::new(bulk),
      queue: Arc::new(queue),
    })
  }

  fn memory_stores(config: &Config) -> Stores {
    Stores {
      secure: Arc::new(MemoryStore::new().with_max_value_len(config.cache.secure_max_value_len)),
      bulk: Arc::new(MemoryStore::new()),
      queue: Arc::new(MemoryStore::new()),
    }
  }
}
