//! Cache keys for list queries.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// The arguments of a list read: ERPNext filters plus the requested fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
  /// Filters in any shape ERPNext accepts (list of triples or an object).
  pub filters: Value,
  /// Field names to return. Empty means the server default.
  pub fields: Vec<String>,
}

impl ListQuery {
  pub fn new(filters: Value, fields: Vec<String>) -> Self {
    Self { filters, fields }
  }

  /// Deterministic cache key for this query under operation `op`.
  ///
  /// Arguments are stringified canonically (object keys sorted, `null`
  /// filters equal to `[]`) and hashed, so the key only contains
  /// `[A-Za-z0-9_]` and distinct queries do not collide.
  pub fn cache_key(&self, op: &str) -> String {
    let mut input = String::new();
    input.push_str(op);
    input.push('\n');
    match &self.filters {
      Value::Null => input.push_str("[]"),
      filters => write_canonical(filters, &mut input),
    }
    input.push('\n');
    write_canonical(
      &Value::Array(self.fields.iter().cloned().map(Value::String).collect()),
      &mut input,
    );

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}_{}", sanitize(op), digest)
  }

  /// Human-readable summary for logs.
  pub fn description(&self, op: &str) -> String {
    if self.fields.is_empty() {
      format!("{} filters={}", op, self.filters)
    } else {
      format!("{} filters={} fields={}", op, self.filters, self.fields.join(","))
    }
  }
}

/// Serialize `value` with object keys in sorted order.
fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key], out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    scalar => {
      let _ = write!(out, "{}", scalar);
    }
  }
}

/// Keep only characters every backing store accepts in a key.
fn sanitize(s: &str) -> String {
  s.chars()
    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
    .collect()
}
