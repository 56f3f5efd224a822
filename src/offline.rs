//! Offline-aware access to ERP data.
//!
//! Reads are served from the cache when confirmed offline and refresh the
//! cache otherwise. Writes go straight to the server when online and are
//! queued for the sync engine when offline.

use color_eyre::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::cache::{Cache, ListQuery};
use crate::connectivity::Connectivity;
use crate::erp::{Entity, RemoteClient};
use crate::queue::{QueueEntry, QueueStore};
use crate::sync::replay;

/// Entry point UI code uses for every domain read and write.
pub struct OfflineClient<R: RemoteClient, Q: QueueStore> {
  remote: Arc<R>,
  queue: Arc<Q>,
  cache: Cache,
}

impl<R: RemoteClient, Q: QueueStore> OfflineClient<R, Q> {
  pub fn new(remote: Arc<R>, queue: Arc<Q>, cache: Cache) -> Self {
    Self {
      remote,
      queue,
      cache,
    }
  }

  pub fn cache(&self) -> &Cache {
    &self.cache
  }

  /// List documents of `entity`.
  ///
  /// 1. Offline with a cached result: return it without touching the network
  /// 2. Offline without one: try the server anyway, its error is the answer
  /// 3. Online or unknown: fetch, cache, return
  pub async fn get_list(
    &self,
    entity: Entity,
    connectivity: Connectivity,
    query: &ListQuery,
  ) -> Result<Vec<Value>> {
    let key = query.cache_key(entity.list_op());

    if connectivity.is_offline() {
      let description = query.description(entity.list_op());
      if let Some(cached) = self.cache.get_cache_as::<Vec<Value>>(&key) {
        debug!(query = %description, rows = cached.len(), "Serving cached list");
        return Ok(cached);
      }
      debug!(query = %description, "No cached list, trying server");
    }

    let rows = self.remote.get_list(entity, query).await?;
    self.cache.set_cache(&key, &rows);
    Ok(rows)
  }

  /// Create a document of `entity`.
  ///
  /// Online (or unknown) returns the saved document. Offline queues the
  /// create and returns `data` with `"offline": true`.
  pub async fn create(
    &self,
    entity: Entity,
    connectivity: Connectivity,
    data: Value,
  ) -> Result<Value> {
    self.write(connectivity, QueueEntry::create(entity, data)).await
  }

  /// Report a device location, queued as `location-update` when offline.
  pub async fn post_location(&self, connectivity: Connectivity, payload: Value) -> Result<Value> {
    self.write(connectivity, QueueEntry::location_update(payload)).await
  }

  /// POST to an arbitrary endpoint, queued as a generic entry when offline.
  pub async fn post(&self, connectivity: Connectivity, url: &str, data: Value) -> Result<Value> {
    self.write(connectivity, QueueEntry::post(url, data)).await
  }

  async fn write(&self, connectivity: Connectivity, entry: QueueEntry) -> Result<Value> {
    if connectivity.is_offline() {
      let deferred = deferred_result(entry.body());
      debug!(kind = entry.kind(), "Offline, deferring write");
      self.queue.add_to_queue(entry);
      return Ok(deferred);
    }

    replay(self.remote.as_ref(), &entry).await
  }
}

impl<R: RemoteClient, Q: QueueStore> Clone for OfflineClient<R, Q> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      queue: Arc::clone(&self.queue),
      cache: self.cache.clone(),
    }
  }
}

/// What a deferred write reports back: the input plus `"offline": true`.
fn deferred_result(body: &Value) -> Value {
  match body {
    Value::Object(map) => {
      let mut echoed = map.clone();
      echoed.insert("offline".to_string(), Value::Bool(true));
      Value::Object(echoed)
    }
    other => json!({ "payload": other, "offline": true }),
  }
}

macro_rules! entity_accessors {
  ($($entity:ident => $get:ident, $create:ident;)*) => {
    impl<R: RemoteClient, Q: QueueStore> OfflineClient<R, Q> {
      $(
        #[doc = concat!(
          "List `", stringify!($entity), "` documents. See [`OfflineClient::get_list`]."
        )]
        pub async fn $get(
          &self,
          connectivity: Connectivity,
          filters: Value,
          fields: &[&str],
        ) -> Result<Vec<Value>> {
          let query = ListQuery::new(filters, fields.iter().map(|f| f.to_string()).collect());
          self.get_list(Entity::$entity, connectivity, &query).await
        }

        #[doc = concat!("Create a `", stringify!($entity), "`. See [`OfflineClient::create`].")]
        pub async fn $create(&self, connectivity: Connectivity, data: Value) -> Result<Value> {
          self.create(Entity::$entity, connectivity, data).await
        }
      )*
    }
  };
}

entity_accessors! {
  Customer => get_customers, create_customer;
  Item => get_items, create_item;
  Quotation => get_quotations, create_quotation;
  SalesOrder => get_sales_orders, create_sales_order;
  Task => get_tasks, create_task;
  LeaveApplication => get_leave_applications, create_leave_application;
  ExpenseClaim => get_expense_claims, create_expense_claim;
  Attendance => get_attendance, create_attendance;
}
