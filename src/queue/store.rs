use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::storage::{KvStore, MemoryStore};

use super::entry::QueueEntry;

/// Storage key of the persisted queue array.
pub const QUEUE_KEY: &str = "offline_queue";

/// Durable FIFO of pending mutations.
///
/// None of these methods fail: storage problems are logged, reads fall back
/// to an empty queue and writes are dropped.
pub trait QueueStore: Send + Sync {
  /// All pending entries, oldest first.
  fn get_queue(&self) -> Vec<QueueEntry>;

  /// Append `entry` at the tail.
  fn add_to_queue(&self, entry: QueueEntry);

  /// Drop every pending entry.
  fn clear_queue(&self);

  /// Finish a replay of `batch`, a snapshot previously taken with
  /// [`QueueStore::get_queue`].
  ///
  /// Removes the batch from the head of the queue and puts `failed` in its
  /// place, keeping anything appended since the snapshot behind them. If the
  /// head no longer matches the batch, the queue was cleared or rewritten in
  /// the meantime and `failed` is put in front of whatever is there now.
  fn settle(&self, batch: &[QueueEntry], failed: Vec<QueueEntry>);
}

enum Stored {
  Entries(Vec<QueueEntry>),
  /// Present but not a JSON array
  Unreadable(String),
  /// The store itself failed
  Unavailable,
}

/// Queue persisted as one JSON array under [`QUEUE_KEY`].
///
/// A blob that is not an array is never written over: the next update moves
/// it to `offline_queue_unreadable_<millis>` first.
pub struct PersistentQueue {
  store: Arc<dyn KvStore>,
  lock: Mutex<()>,
}

impl PersistentQueue {
  pub fn new(store: Arc<dyn KvStore>) -> Self {
    Self {
      store,
      lock: Mutex::new(()),
    }
  }

  /// Queue that lives only as long as the process.
  pub fn in_memory() -> Self {
    Self::new(Arc::new(MemoryStore::new()))
  }

  fn guard(&self) -> MutexGuard<'_, ()> {
    // The guarded data is (), a panic mid-update leaves nothing inconsistent
    self.lock.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn load(&self) -> Stored {
    let raw = match self.store.get(QUEUE_KEY) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Stored::Entries(Vec::new()),
      Err(e) => {
        warn!(error = %e, "Failed to read offline queue");
        return Stored::Unavailable;
      }
    };

    // Entries are interpreted one by one, see QueueEntry::from_value
    match serde_json::from_str(&raw) {
      Ok(entries) => Stored::Entries(entries),
      Err(e) => {
        warn!(error = %e, "Offline queue is unreadable, treating as empty");
        Stored::Unreadable(raw)
      }
    }
  }

  fn read(&self) -> Vec<QueueEntry> {
    match self.load() {
      Stored::Entries(entries) => entries,
      Stored::Unreadable(_) | Stored::Unavailable => Vec::new(),
    }
  }

  /// Current entries, ready to be rewritten. `None` when the stored queue
  /// could not be read and must not be written over.
  fn read_for_update(&self) -> Option<Vec<QueueEntry>> {
    match self.load() {
      Stored::Entries(entries) => Some(entries),
      Stored::Unavailable => None,
      Stored::Unreadable(raw) => {
        let backup = format!("{}_unreadable_{}", QUEUE_KEY, Utc::now().timestamp_millis());
        match self.store.set(&backup, &raw) {
          Ok(()) => {
            warn!(key = %backup, "Moved unreadable offline queue aside");
            Some(Vec::new())
          }
          Err(e) => {
            warn!(error = %e, "Failed to back up unreadable offline queue");
            None
          }
        }
      }
    }
  }

  fn write(&self, entries: &[QueueEntry]) {
    if entries.is_empty() {
      self.remove();
      return;
    }

    let serialized = match serde_json::to_string(entries) {
      Ok(s) => s,
      Err(e) => {
        warn!(error = %e, "Failed to serialize offline queue");
        return;
      }
    };

    if let Err(e) = self.store.set(QUEUE_KEY, &serialized) {
      warn!(error = %e, len = entries.len(), "Failed to persist offline queue");
    }
  }

  fn remove(&self) {
    if let Err(e) = self.store.delete(QUEUE_KEY) {
      warn!(error = %e, "Failed to clear offline queue");
    }
  }
}

impl QueueStore for PersistentQueue {
  fn get_queue(&self) -> Vec<QueueEntry> {
    let _guard = self.guard();
    self.read()
  }

  fn add_to_queue(&self, entry: QueueEntry) {
    let _guard = self.guard();
    let Some(mut entries) = self.read_for_update() else {
      warn!(kind = entry.kind(), "Dropping offline mutation, queue is not writable");
      return;
    };
    debug!(kind = entry.kind(), position = entries.len(), "Queueing offline mutation");
    entries.push(entry);
    self.write(&entries);
  }

  fn clear_queue(&self) {
    let _guard = self.guard();
    self.remove();
  }

  fn settle(&self, batch: &[QueueEntry], failed: Vec<QueueEntry>) {
    let _guard = self.guard();
    let Some(current) = self.read_for_update() else {
      warn!(batch = batch.len(), "Offline queue is not writable, replayed entries stay queued");
      return;
    };

    let rest = if current.len() >= batch.len() && current[..batch.len()] == *batch {
      current[batch.len()..].to_vec()
    } else {
      warn!(
        batch = batch.len(),
        present = current.len(),
        "Offline queue changed during sync, keeping current contents"
      );
      current
    };

    let mut next = failed;
    next.extend(rest);
    self.write(&next);
  }
}
