use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::connectivity::ConnectivityStatus;
use crate::erp::RemoteClient;
use crate::queue::QueueStore;

use super::engine::{SyncEngine, SyncReport};

/// Drives the sync engine from a periodic timer and reconnect events.
pub struct SyncService<R: RemoteClient, Q: QueueStore> {
  engine: SyncEngine<R, Q>,
  interval: Duration,
  reports: Option<mpsc::UnboundedSender<SyncReport>>,
}

impl<R: RemoteClient, Q: QueueStore> SyncService<R, Q> {
  pub fn new(engine: SyncEngine<R, Q>, interval: Duration) -> Self {
    Self {
      engine,
      interval,
      reports: None,
    }
  }

  /// Send every non-skipped report to `tx`.
  pub fn with_reports(mut self, tx: mpsc::UnboundedSender<SyncReport>) -> Self {
    self.reports = Some(tx);
    self
  }

  /// Run until `shutdown` resolves.
  ///
  /// Syncs every `interval` regardless of connectivity (the first run is one
  /// interval after start), and after every offline-to-online transition
  /// counted on `connectivity`. Reconnects that happen while a sync is
  /// running are caught up with one more sync when it finishes.
  pub async fn run<F>(self, mut connectivity: watch::Receiver<ConnectivityStatus>, shutdown: F)
  where
    F: Future<Output = ()>,
  {
    let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut seen = connectivity.borrow_and_update().reconnects;
    let mut watching = true;

    tokio::pin!(shutdown);

    loop {
      tokio::select! {
        _ = &mut shutdown => {
          debug!("Sync service shutting down");
          break;
        }
        _ = ticker.tick() => {
          debug!("Periodic sync");
          self.sync().await;
        }
        changed = connectivity.changed(), if watching => {
          if changed.is_err() {
            // Publisher is gone, only the timer is left
            watching = false;
            continue;
          }
          let reconnects = connectivity.borrow_and_update().reconnects;
          if reconnects != seen {
            seen = reconnects;
            info!(reconnects, "Back online, syncing offline queue");
            self.sync().await;
          }
        }
      }
    }
  }

  async fn sync(&self) {
    let report = self.engine.sync_queue().await;
    if report.skipped {
      return;
    }
    if let Some(tx) = &self.reports {
      let _ = tx.send(report);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connectivity::{self, Connectivity, ConnectivityPublisher};
  use crate::erp::Entity;
  use crate::queue::{PersistentQueue, QueueEntry};
  use crate::testing::MockRemote;
  use serde_json::json;
  use std::sync::Arc;
  use tokio::sync::oneshot;

  struct Harness {
    remote: Arc<MockRemote>,
    queue: Arc<PersistentQueue>,
    connectivity: Arc<ConnectivityPublisher>,
    reports: mpsc::UnboundedReceiver<SyncReport>,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
  }

  fn start(initial: Connectivity) -> Harness {
    let remote = Arc::new(MockRemote::new());
    let queue = Arc::new(PersistentQueue::in_memory());
    let (conn_tx, conn_rx) = connectivity::channel(initial);
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let service = SyncService::new(
      SyncEngine::new(remote.clone(), queue.clone()),
      Duration::from_secs(300),
    )
    .with_reports(report_tx);

    let task = tokio::spawn(service.run(conn_rx, async move {
      let _ = stop_rx.await;
    }));

    Harness {
      remote,
      queue,
      connectivity: Arc::new(conn_tx),
      reports: report_rx,
      stop: Some(stop_tx),
      task,
    }
  }

  async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
  }

  fn queue_item(h: &Harness, code: &str) {
    h.queue
      .add_to_queue(QueueEntry::create(Entity::Item, json!({ "item_code": code })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnect_triggers_one_sync() {
    let mut h = start(Connectivity::Online);
    queue_item(&h, "A");

    // Online -> Online is not a reconnect
    h.connectivity.publish(Connectivity::Online);
    settle().await;
    assert!(h.remote.calls().is_empty());

    h.connectivity.publish(Connectivity::Offline);
    settle().await;
    h.connectivity.publish(Connectivity::Online);
    settle().await;

    let report = h.reports.recv().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(h.queue.get_queue().is_empty());

    // Repeated online notifications do not re-trigger
    queue_item(&h, "B");
    h.connectivity.publish(Connectivity::Online);
    settle().await;
    assert_eq!(h.remote.calls().len(), 1);
    assert!(h.reports.try_recv().is_err());

    h.stop.take().unwrap().send(()).unwrap();
    h.task.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn test_starting_offline_then_connecting_syncs() {
    let mut h = start(Connectivity::Offline);
    queue_item(&h, "A");

    h.connectivity.publish(Connectivity::Online);
    settle().await;

    assert_eq!(h.reports.recv().await.unwrap().attempted, 1);
    assert_eq!(h.remote.calls().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timer_syncs_periodically() {
    let mut h = start(Connectivity::Unknown);
    queue_item(&h, "A");

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert!(h.remote.calls().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.reports.recv().await.unwrap().succeeded, 1);

    // Next tick runs even with an empty queue
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.reports.recv().await.unwrap().attempted, 0);
    assert_eq!(h.remote.calls().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnect_during_replay_is_not_lost() {
    let mut h = start(Connectivity::Online);
    queue_item(&h, "A");

    // While the timer sync replays A the link drops, B is queued offline and
    // the link comes back, all before the service looks at the channel again
    let publisher = h.connectivity.clone();
    let queue = h.queue.clone();
    let flipped = std::sync::atomic::AtomicBool::new(false);
    h.remote.on_call(move || {
      if !flipped.swap(true, std::sync::atomic::Ordering::SeqCst) {
        publisher.publish(Connectivity::Offline);
        queue.add_to_queue(QueueEntry::create(Entity::Item, json!({ "item_code": "B" })));
        publisher.publish(Connectivity::Online);
      }
    });

    tokio::time::sleep(Duration::from_secs(301)).await;

    assert_eq!(h.reports.recv().await.unwrap().succeeded, 1);
    assert_eq!(h.reports.recv().await.unwrap().succeeded, 1);
    assert!(h.queue.get_queue().is_empty());
    assert_eq!(h.remote.calls().len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timer_keeps_running_without_publisher() {
    let mut h = start(Connectivity::Unknown);
    queue_item(&h, "A");
    drop(h.connectivity);

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(h.reports.recv().await.unwrap().succeeded, 1);
  }
}
