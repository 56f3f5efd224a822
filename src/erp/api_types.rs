//! Serde-deserializable types matching Frappe REST responses.

use serde::Deserialize;
use serde_json::Value;

/// `GET /api/resource/<DocType>` response.
#[derive(Debug, Deserialize)]
pub struct ApiListResponse {
  #[serde(default)]
  pub data: Vec<Value>,
}

/// `POST /api/resource/<DocType>` response.
#[derive(Debug, Deserialize)]
pub struct ApiDocResponse {
  pub data: Value,
}

/// Error body returned by Frappe on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  pub exc_type: Option<String>,
  pub exception: Option<String>,
  pub message: Option<Value>,
  /// JSON-encoded list of JSON-encoded `{"message": ...}` objects
  #[serde(rename = "_server_messages")]
  pub server_messages: Option<String>,
}

impl ApiErrorBody {
  /// Best single-line description of what went wrong.
  pub fn summary(&self) -> Option<String> {
    if let Some(msg) = self.server_messages.as_deref().and_then(first_server_message) {
      return Some(msg);
    }
    if let Some(exception) = &self.exception {
      return Some(exception.clone());
    }
    if let Some(message) = &self.message {
      return Some(match message {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      });
    }
    self.exc_type.clone()
  }
}

fn first_server_message(raw: &str) -> Option<String> {
  let encoded: Vec<String> = serde_json::from_str(raw).ok()?;
  let first = encoded.first()?;
  let parsed: Value = serde_json::from_str(first).ok()?;
  parsed
    .get("message")
    .and_then(Value::as_str)
    .map(String::from)
}

/// Unwrap the useful part of a generic POST response.
///
/// `/api/method/*` answers `{"message": ...}`, `/api/resource/*` answers
/// `{"data": ...}`; anything else is returned whole.
pub fn unwrap_envelope(body: Value) -> Value {
  match body {
    Value::Object(mut map) => {
      if let Some(data) = map.remove("data") {
        data
      } else if let Some(message) = map.remove("message") {
        message
      } else {
        Value::Object(map)
      }
    }
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_server_message_preferred() {
    let body: ApiErrorBody = serde_json::from_value(json!({
      "exc_type": "ValidationError",
      "_server_messages": "[\"{\\\"message\\\": \\\"Customer Name is required\\\"}\"]"
    }))
    .unwrap();
    assert_eq!(body.summary().as_deref(), Some("Customer Name is required"));
  }

  #[test]
  fn test_falls_back_to_exc_type() {
    let body: ApiErrorBody =
      serde_json::from_value(json!({"exc_type": "PermissionError"})).unwrap();
    assert_eq!(body.summary().as_deref(), Some("PermissionError"));
  }

  #[test]
  fn test_unwrap_envelope() {
    assert_eq!(unwrap_envelope(json!({"data": {"name": "X"}})), json!({"name": "X"}));
    assert_eq!(unwrap_envelope(json!({"message": "pong"})), json!("pong"));
    assert_eq!(unwrap_envelope(json!({"ok": true})), json!({"ok": true}));
    assert_eq!(unwrap_envelope(json!([1, 2])), json!([1, 2]));
  }
}
