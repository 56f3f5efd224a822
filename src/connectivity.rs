//! Connectivity signal consumed by the offline layer and the sync triggers.

use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::erp::ErpClient;

/// What we currently know about the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
  Online,
  Offline,
  /// Not determined yet. Treated as online by reads and writes.
  #[default]
  Unknown,
}

impl Connectivity {
  /// Only a confirmed offline state takes the offline paths.
  pub fn is_offline(self) -> bool {
    self == Connectivity::Offline
  }
}

impl From<bool> for Connectivity {
  fn from(connected: bool) -> Self {
    if connected {
      Connectivity::Online
    } else {
      Connectivity::Offline
    }
  }
}

impl From<Option<bool>> for Connectivity {
  fn from(connected: Option<bool>) -> Self {
    connected.map_or(Connectivity::Unknown, Connectivity::from)
  }
}

/// Detects the offline-to-online edge.
///
/// Fires once per reconnect: repeated `Online` observations without an
/// `Offline` in between do not fire again, and `Unknown` neither arms nor
/// fires.
#[derive(Debug, Default)]
pub struct ReconnectDetector {
  was_offline: bool,
}

impl ReconnectDetector {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record `state`; returns true if this observation is a reconnect.
  pub fn observe(&mut self, state: Connectivity) -> bool {
    match state {
      Connectivity::Offline => {
        self.was_offline = true;
        false
      }
      Connectivity::Online => std::mem::replace(&mut self.was_offline, false),
      Connectivity::Unknown => false,
    }
  }
}

/// Something that can tell whether the server is reachable right now.
pub trait Probe: Send + Sync {
  fn probe(&self) -> BoxFuture<'_, bool>;
}

impl Probe for ErpClient {
  fn probe(&self) -> BoxFuture<'_, bool> {
    async move { self.ping().await.is_ok() }.boxed()
  }
}

/// Connectivity as seen by subscribers.
///
/// `reconnects` counts offline-to-online edges since the channel was
/// created. A receiver only sees the latest value, so comparing counters is
/// how it learns about edges that happened while it was busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectivityStatus {
  pub state: Connectivity,
  pub reconnects: u64,
}

/// Sending half of a connectivity channel. Detects reconnects as states are
/// published.
pub struct ConnectivityPublisher {
  tx: watch::Sender<ConnectivityStatus>,
  detector: Mutex<ReconnectDetector>,
}

/// Create a connectivity channel starting at `initial`.
pub fn channel(
  initial: Connectivity,
) -> (ConnectivityPublisher, watch::Receiver<ConnectivityStatus>) {
  let mut detector = ReconnectDetector::new();
  detector.observe(initial);

  let (tx, rx) = watch::channel(ConnectivityStatus {
    state: initial,
    reconnects: 0,
  });
  let publisher = ConnectivityPublisher {
    tx,
    detector: Mutex::new(detector),
  };
  (publisher, rx)
}

impl ConnectivityPublisher {
  /// Publish `state`. Receivers are notified if the state changed.
  pub fn publish(&self, state: Connectivity) {
    let reconnected = self
      .detector
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .observe(state);

    self.tx.send_if_modified(|status| {
      if status.state == state {
        return false;
      }
      info!(from = ?status.state, to = ?state, reconnected, "Connectivity changed");
      status.state = state;
      if reconnected {
        status.reconnects += 1;
      }
      true
    });
  }

  /// True once every receiver is gone.
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }
}

/// Publishes connectivity by probing the server on a fixed interval.
pub struct ConnectivityMonitor {
  rx: watch::Receiver<ConnectivityStatus>,
  task: JoinHandle<()>,
}

impl ConnectivityMonitor {
  /// Spawn the probe loop. The first probe runs immediately.
  pub fn spawn<P: Probe + 'static>(probe: Arc<P>, interval: Duration) -> Self {
    let (publisher, rx) = channel(Connectivity::Unknown);

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

      loop {
        ticker.tick().await;
        publisher.publish(Connectivity::from(probe.probe().await));

        if publisher.is_closed() {
          break;
        }
      }
    });

    Self { rx, task }
  }

  /// Latest known state.
  pub fn current(&self) -> Connectivity {
    self.rx.borrow().state
  }

  /// Receiver that is notified on every change.
  pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
    self.rx.clone()
  }
}

impl Drop for ConnectivityMonitor {
  fn drop(&mut self) {
    self.task.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};

  #[test]
  fn test_from_tri_state() {
    assert_eq!(Connectivity::from(Some(true)), Connectivity::Online);
    assert_eq!(Connectivity::from(Some(false)), Connectivity::Offline);
    assert_eq!(Connectivity::from(None), Connectivity::Unknown);
    assert!(Connectivity::Offline.is_offline());
    assert!(!Connectivity::Unknown.is_offline());
  }

  #[test]
  fn test_reconnect_fires_once_per_edge() {
    let mut detector = ReconnectDetector::new();

    // Starting online is not a reconnect
    assert!(!detector.observe(Connectivity::Online));

    assert!(!detector.observe(Connectivity::Offline));
    assert!(!detector.observe(Connectivity::Offline));
    assert!(detector.observe(Connectivity::Online));
    assert!(!detector.observe(Connectivity::Online));

    // Unknown in between neither arms nor disarms
    assert!(!detector.observe(Connectivity::Offline));
    assert!(!detector.observe(Connectivity::Unknown));
    assert!(detector.observe(Connectivity::Online));

    assert!(!detector.observe(Connectivity::Unknown));
    assert!(!detector.observe(Connectivity::Online));
  }

  struct Switch(AtomicBool);

  impl Probe for Switch {
    fn probe(&self) -> BoxFuture<'_, bool> {
      let up = self.0.load(Ordering::SeqCst);
      async move { up }.boxed()
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_monitor_publishes_changes() {
    let switch = Arc::new(Switch(AtomicBool::new(false)));
    let monitor = ConnectivityMonitor::spawn(switch.clone(), Duration::from_secs(1));
    let mut rx = monitor.subscribe();

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().state, Connectivity::Offline);

    switch.0.store(true, Ordering::SeqCst);
    rx.changed().await.unwrap();
    assert_eq!(
      *rx.borrow_and_update(),
      ConnectivityStatus {
        state: Connectivity::Online,
        reconnects: 1,
      }
    );
    assert_eq!(monitor.current(), Connectivity::Online);
  }

  #[test]
  fn test_publisher_counts_every_reconnect() {
    let (publisher, mut rx) = channel(Connectivity::Online);

    // Nobody reads in between, the receiver only sees the last value
    publisher.publish(Connectivity::Offline);
    publisher.publish(Connectivity::Online);
    publisher.publish(Connectivity::Offline);
    publisher.publish(Connectivity::Unknown);
    publisher.publish(Connectivity::Online);

    assert!(rx.has_changed().unwrap());
    assert_eq!(
      *rx.borrow_and_update(),
      ConnectivityStatus {
        state: Connectivity::Online,
        reconnects: 2,
      }
    );

    // Same state again is not a change
    publisher.publish(Connectivity::Online);
    assert!(!rx.has_changed().unwrap());
  }

  #[test]
  fn test_starting_offline_arms_the_first_reconnect() {
    let (publisher, rx) = channel(Connectivity::Offline);
    publisher.publish(Connectivity::Online);
    assert_eq!(rx.borrow().reconnects, 1);
  }
}
