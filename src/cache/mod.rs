//! JSON value cache over the secure and bulk stores.
//!
//! This module provides:
//! - size-based routing of values between the two backing stores
//! - a read path that checks both stores in a fixed priority order
//! - deterministic, storage-safe keys for list queries
//!
//! Cache failures never surface to callers: a failed read is a miss and a
//! failed write is dropped.

mod key;
mod layer;

pub use key::ListQuery;
pub use layer::{Cache, Tier, DEFAULT_SIZE_THRESHOLD};
