//! Key-value storage primitives backing the cache and the mutation queue.
//!
//! Two stores are used side by side:
//! - a *secure* store with a small per-item ceiling (mirrors platform keychains)
//! - a *bulk* store with no practical size limit
//!
//! The split is about capacity, not sensitivity. Both stores address values by
//! the same logical key.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::KvStore;
