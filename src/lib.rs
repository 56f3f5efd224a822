//! Offline-first data layer for ERPNext clients.
//!
//! UI code reads and writes through [`offline::OfflineClient`], which serves
//! cached lists while offline and queues writes for later. The
//! [`sync::SyncEngine`] replays that queue, driven by [`sync::SyncService`]
//! on a timer and on reconnect.

pub mod app;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod erp;
pub mod logging;
pub mod offline;
pub mod queue;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod testing;
