//! Replays queued mutations when the server is reachable again.
//!
//! - [`SyncEngine`] drains the queue once, keeping the entries that fail
//! - [`SyncService`] runs the engine on a fixed timer and on every reconnect

mod dispatch;
mod engine;
mod service;

pub use dispatch::replay;
pub use engine::{SyncEngine, SyncReport};
pub use service::SyncService;
