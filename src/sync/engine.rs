use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::erp::RemoteClient;
use crate::queue::QueueStore;

use super::dispatch::replay;

/// Outcome of one [`SyncEngine::sync_queue`] call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
  /// Entries replayed
  pub attempted: usize,
  /// Entries the server accepted and that left the queue
  pub succeeded: usize,
  /// Entries put back for the next run
  pub failed: usize,
  /// Another sync was already running, nothing was done
  pub skipped: bool,
  pub finished_at: Option<DateTime<Utc>>,
}

impl SyncReport {
  fn skipped() -> Self {
    Self {
      skipped: true,
      ..Self::default()
    }
  }
}

/// Replays the offline queue against the server.
pub struct SyncEngine<R: RemoteClient, Q: QueueStore> {
  remote: Arc<R>,
  queue: Arc<Q>,
  running: Arc<Mutex<()>>,
}

impl<R: RemoteClient, Q: QueueStore> SyncEngine<R, Q> {
  pub fn new(remote: Arc<R>, queue: Arc<Q>) -> Self {
    Self {
      remote,
      queue,
      running: Arc::new(Mutex::new(())),
    }
  }

  /// Replay every queued entry once, in order.
  ///
  /// A failing entry is logged and kept; the rest still run. Entries that
  /// succeeded leave the queue, failed ones stay ahead of anything queued
  /// while the replay was in flight. Never fails, and never runs twice at
  /// the same time: a call made while another is in progress is skipped.
  pub async fn sync_queue(&self) -> SyncReport {
    let Ok(_running) = self.running.try_lock() else {
      debug!("Sync already in progress, skipping");
      return SyncReport::skipped();
    };

    let batch = self.queue.get_queue();
    if batch.is_empty() {
      debug!("Offline queue empty, nothing to sync");
      return SyncReport {
        finished_at: Some(Utc::now()),
        ..SyncReport::default()
      };
    }

    info!(pending = batch.len(), "Replaying offline queue");

    let mut failed = Vec::new();
    for (position, entry) in batch.iter().enumerate() {
      match replay(self.remote.as_ref(), entry).await {
        Ok(_) => debug!(position, kind = entry.kind(), "Replayed queued mutation"),
        Err(e) => {
          warn!(position, kind = entry.kind(), error = %e, "Replay failed, keeping entry");
          failed.push(entry.clone());
        }
      }
    }

    let report = SyncReport {
      attempted: batch.len(),
      succeeded: batch.len() - failed.len(),
      failed: failed.len(),
      skipped: false,
      finished_at: Some(Utc::now()),
    };

    self.queue.settle(&batch, failed);

    info!(
      attempted = report.attempted,
      succeeded = report.succeeded,
      failed = report.failed,
      "Sync finished"
    );
    report
  }
}

impl<R: RemoteClient, Q: QueueStore> Clone for SyncEngine<R, Q> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      queue: Arc::clone(&self.queue),
      running: Arc::clone(&self.running),
    }
  }
}
