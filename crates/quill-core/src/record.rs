//! Wire format of a channel store record.
//!
//! A record is a JSON object with exactly one entry, the application key,
//! sent as the text body of a message in the database channel:
//!
//! ```text
//! {"note": "buy milk"}
//! ```

use serde_json::{Map, Value};

/// A single `(key, value)` entry of the channel store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Application key.
    pub key: String,
    /// Application value.
    pub value: Value,
}

impl Record {
    /// Creates a record.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Encodes the record as a message body.
    pub fn encode(&self) -> String {
        let mut object = Map::with_capacity(1);
        object.insert(self.key.clone(), self.value.clone());
        Value::Object(object).to_string()
    }

    /// Decodes a message body.
    ///
    /// Returns `None` unless the body is a JSON object with exactly one entry.
    pub fn decode(body: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(body).ok()? {
            Value::Object(object) if object.len() == 1 => {
                let (key, value) = object.into_iter().next()?;
                Some(Self { key, value })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_single_key_object() {
        let body = Record::new("note", json!("buy milk")).encode();
        assert_eq!(body, r#"{"note":"buy milk"}"#);
    }

    #[test]
    fn test_decode_structured_value() {
        let record = Record::decode(r#"{"score": {"user": "x", "points": 3}}"#).unwrap();
        assert_eq!(record.key, "score");
        assert_eq!(record.value, json!({ "user": "x", "points": 3 }));
    }

    #[test]
    fn test_decode_rejects_non_records() {
        assert!(Record::decode("plain chat text").is_none());
        assert!(Record::decode(r#"["note", "x"]"#).is_none());
        assert!(Record::decode("{}").is_none());
        assert!(Record::decode(r#"{"a": 1, "b": 2}"#).is_none());
    }
}
