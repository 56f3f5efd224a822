//! Test doubles shared by the offline layer and sync engine tests.

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::sync::Mutex;

use crate::cache::ListQuery;
use crate::erp::{Entity, RemoteClient};

/// A remote call as seen by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
  GetList(Entity, ListQuery),
  Create(Entity, Value),
  Post(String, Value),
  Location(Value),
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// In-memory [`RemoteClient`] that records calls and fails on demand.
#[derive(Default)]
pub struct MockRemote {
  calls: Mutex<Vec<Call>>,
  rows: Mutex<Vec<Value>>,
  failing_bodies: Mutex<Vec<Value>>,
  unreachable: Mutex<bool>,
  on_call: Mutex<Option<Hook>>,
}

impl MockRemote {
  pub fn new() -> Self {
    Self::default()
  }

  /// Rows returned by every list read.
  pub fn with_rows(self, rows: Vec<Value>) -> Self {
    *self.rows.lock().unwrap() = rows;
    self
  }

  /// Make every call fail as if the network were down.
  pub fn set_unreachable(&self, unreachable: bool) {
    *self.unreachable.lock().unwrap() = unreachable;
  }

  /// Fail any write whose body equals `body`.
  pub fn fail_on(&self, body: Value) {
    self.failing_bodies.lock().unwrap().push(body);
  }

  /// Run `hook` at the start of every call.
  pub fn on_call(&self, hook: impl Fn() + Send + Sync + 'static) {
    *self.on_call.lock().unwrap() = Some(Box::new(hook));
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  fn record(&self, call: Call) -> Result<()> {
    if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
      hook();
    }

    let body = match &call {
      Call::GetList(..) => None,
      Call::Create(_, body) | Call::Post(_, body) | Call::Location(body) => Some(body.clone()),
    };
    self.calls.lock().unwrap().push(call);

    if *self.unreachable.lock().unwrap() {
      return Err(eyre!("Request failed: network unreachable"));
    }
    if let Some(body) = body {
      if self.failing_bodies.lock().unwrap().contains(&body) {
        return Err(eyre!("ERP /api/resource returned 417 Expectation Failed"));
      }
    }
    Ok(())
  }
}

impl RemoteClient for MockRemote {
  fn get_list<'a>(
    &'a self,
    entity: Entity,
    query: &'a ListQuery,
  ) -> BoxFuture<'a, Result<Vec<Value>>> {
    async move {
      self.record(Call::GetList(entity, query.clone()))?;
      Ok(self.rows.lock().unwrap().clone())
    }
    .boxed()
  }

  fn create<'a>(&'a self, entity: Entity, data: &'a Value) -> BoxFuture<'a, Result<Value>> {
    async move {
      self.record(Call::Create(entity, data.clone()))?;
      let mut saved = data.clone();
      if let Value::Object(map) = &mut saved {
        map.insert("name".to_string(), json!(format!("{}-0001", entity.doctype())));
        map.insert("docstatus".to_string(), json!(0));
      }
      Ok(saved)
    }
    .boxed()
  }

  fn post<'a>(&'a self, url: &'a str, data: &'a Value) -> BoxFuture<'a, Result<Value>> {
    async move {
      self.record(Call::Post(url.to_string(), data.clone()))?;
      Ok(json!({"ok": true}))
    }
    .boxed()
  }

  fn post_location_data<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<Value>> {
    async move {
      self.record(Call::Location(payload.clone()))?;
      Ok(json!({"ok": true}))
    }
    .boxed()
  }
}
