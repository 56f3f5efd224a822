//! Durable FIFO of mutations waiting to be replayed against the server.
//!
//! The whole queue is one JSON array under one storage key. Every change is
//! a read-modify-write of that array, serialized by an in-process lock.

mod entry;
mod store;

pub use entry::QueueEntry;
pub use store::{PersistentQueue, QueueStore, QUEUE_KEY};
