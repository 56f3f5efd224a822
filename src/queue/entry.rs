use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::erp::Entity;

/// Tag of location updates on the wire.
const LOCATION_UPDATE: &str = "location-update";
/// Tag written for generic posts created by this crate.
const GENERIC_POST: &str = "post";

/// A mutation recorded while offline.
///
/// Serialized as `{"type": "createCustomer", "payload": {...}}`,
/// `{"type": "location-update", "payload": {...}}`, or for anything else
/// `{"type": "<tag>", "url": "...", "data": {...}}`.
///
/// Deserializing never fails: anything that does not match one of those
/// shapes is kept verbatim as [`QueueEntry::Unreadable`] and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEntry {
  /// Create a document of `entity`
  Create { entity: Entity, payload: Value },
  /// Report a device location
  LocationUpdate { payload: Value },
  /// POST `data` to `url`; `kind` keeps the original tag
  Post {
    kind: String,
    url: String,
    data: Value,
  },
  /// Stored value this version cannot interpret
  Unreadable { raw: Value },
}

impl QueueEntry {
  pub fn create(entity: Entity, payload: Value) -> Self {
    QueueEntry::Create { entity, payload }
  }

  pub fn location_update(payload: Value) -> Self {
    QueueEntry::LocationUpdate { payload }
  }

  pub fn post(url: impl Into<String>, data: Value) -> Self {
    QueueEntry::Post {
      kind: GENERIC_POST.to_string(),
      url: url.into(),
      data,
    }
  }

  /// The `type` tag of this entry.
  pub fn kind(&self) -> &str {
    match self {
      QueueEntry::Create { entity, .. } => entity.create_op(),
      QueueEntry::LocationUpdate { .. } => LOCATION_UPDATE,
      QueueEntry::Post { kind, .. } => kind.as_str(),
      QueueEntry::Unreadable { raw } => raw_kind(raw),
    }
  }

  /// The body that will be sent on replay.
  pub fn body(&self) -> &Value {
    match self {
      QueueEntry::Create { payload, .. } | QueueEntry::LocationUpdate { payload } => payload,
      QueueEntry::Post { data, .. } => data,
      QueueEntry::Unreadable { raw } => raw,
    }
  }
}

impl Serialize for QueueEntry {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let (kind, payload, url, data) = match self {
      QueueEntry::Create { entity, payload } => (entity.create_op(), Some(payload), None, None),
      QueueEntry::LocationUpdate { payload } => (LOCATION_UPDATE, Some(payload), None, None),
      QueueEntry::Post { kind, url, data } => (kind.as_str(), None, Some(url.as_str()), Some(data)),
      QueueEntry::Unreadable { raw } => return raw.serialize(serializer),
    };

    RawEntryRef {
      kind,
      payload,
      url,
      data,
    }
    .serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for QueueEntry {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(QueueEntry::from_value(raw))
  }
}

impl QueueEntry {
  /// Interpret one stored value, keeping it as-is when it makes no sense.
  pub fn from_value(raw: Value) -> Self {
    let parsed = serde_json::from_value::<RawEntry>(raw.clone())
      .map_err(|e| e.to_string())
      .and_then(QueueEntry::try_from);

    match parsed {
      Ok(entry) => entry,
      Err(e) => {
        warn!(error = %e, "Keeping unreadable queue entry as-is");
        QueueEntry::Unreadable { raw }
      }
    }
  }
}

fn raw_kind(raw: &Value) -> &str {
  raw.get("type").and_then(Value::as_str).unwrap_or("unknown")
}

/// On-disk shape shared by every readable variant.
#[derive(Deserialize)]
struct RawEntry {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  payload: Option<Value>,
  #[serde(default)]
  url: Option<String>,
  #[serde(default)]
  data: Option<Value>,
}

#[derive(Serialize)]
struct RawEntryRef<'a> {
  #[serde(rename = "type")]
  kind: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  payload: Option<&'a Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  url: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  data: Option<&'a Value>,
}

impl TryFrom<RawEntry> for QueueEntry {
  type Error = String;

  fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
    if let Some(entity) = Entity::from_create_op(&raw.kind) {
      return Ok(QueueEntry::Create {
        entity,
        payload: raw.payload.unwrap_or(Value::Null),
      });
    }

    if raw.kind == LOCATION_UPDATE {
      return Ok(QueueEntry::LocationUpdate {
        payload: raw.payload.unwrap_or(Value::Null),
      });
    }

    match raw.url {
      Some(url) => Ok(QueueEntry::Post {
        kind: raw.kind,
        url,
        data: raw.data.or(raw.payload).unwrap_or(Value::Null),
      }),
      None => Err(format!("queue entry of type {:?} has no url", raw.kind)),
    }
  }
}
