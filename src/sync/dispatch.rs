use color_eyre::{eyre::eyre, Result};
use serde_json::Value;

use crate::erp::RemoteClient;
use crate::queue::QueueEntry;

/// Send the mutation described by `entry` to the server.
pub async fn replay<R: RemoteClient + ?Sized>(remote: &R, entry: &QueueEntry) -> Result<Value> {
  match entry {
    QueueEntry::Create { entity, payload } => remote.create(*entity, payload).await,
    QueueEntry::LocationUpdate { payload } => remote.post_location_data(payload).await,
    QueueEntry::Post { url, data, .. } => remote.post(url, data).await,
    QueueEntry::Unreadable { raw } => Err(eyre!("Don't know how to replay queue entry {}", raw)),
  }
}
