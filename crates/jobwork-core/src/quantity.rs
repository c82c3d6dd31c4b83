//! Lenient decoding of piece counts.
//!
//! Voucher documents written by older clients carry quantities as numbers,
//! numeric strings, `null`, or junk. Aggregation must stay total over all of
//! them, so every count decodes to `Option<u64>` and anything unusable becomes
//! `None`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Serde `deserialize_with` hook for optional piece counts.
pub fn lenient<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(value.as_ref().and_then(from_json))
}

/// Interpret a JSON value as a non-negative piece count.
///
/// Fractional values are truncated; negative, non-finite and non-numeric
/// values yield `None`.
pub fn from_json(value: &Value) -> Option<u64> {
  match value {
    Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(from_float)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<u64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(from_float))
    }
    _ => None,
  }
}

fn from_float(f: f64) -> Option<u64> {
  (f.is_finite() && f >= 0.0).then(|| f.trunc() as u64)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn accepts_plain_and_string_counts() {
    assert_eq!(from_json(&json!(90)), Some(90));
    assert_eq!(from_json(&json!("90")), Some(90));
    assert_eq!(from_json(&json!(" 12 ")), Some(12));
    assert_eq!(from_json(&json!(7.9)), Some(7));
    assert_eq!(from_json(&json!("7.9")), Some(7));
  }

  #[test]
  fn rejects_unusable_values() {
    assert_eq!(from_json(&json!(-3)), None);
    assert_eq!(from_json(&json!("-3")), None);
    assert_eq!(from_json(&json!("lots")), None);
    assert_eq!(from_json(&json!(null)), None);
    assert_eq!(from_json(&json!([1, 2])), None);
    assert_eq!(from_json(&json!({ "n": 1 })), None);
  }
}
