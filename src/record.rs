//! Tagged representation of source data
//!
//! Every decoded payload is converted into a [`Record`] once, at ingestion.
//! Object keys are folded to lower case at that point so the rest of the
//! crate never has to think about key case again.

use crate::error::ShapeError;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Number, Value};

/// Ordered, lower-cased field map
pub type RecordMap = IndexMap<String, Record>;

// Same grammar PHP's is_numeric() accepts, which is what the legacy feeds were
// classified with: surrounding whitespace, sign, fraction and exponent.
static NUMERIC_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\s*$").unwrap()
});

/// Returns true if `s` reads as a number
pub fn looks_numeric(s: &str) -> bool {
    NUMERIC_REGEX.is_match(s)
}

/// A leaf value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Text form used by the row sink and filters. `None` for null.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(true) => Some("1".to_string()),
            Scalar::Bool(false) => Some(String::new()),
            Scalar::Number(n) => Some(n.to_string()),
            Scalar::String(s) => Some(s.clone()),
        }
    }
}

/// A source value: scalar, ordered list, or case-insensitive object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Scalar(Scalar),
    List(Vec<Record>),
    Object(RecordMap),
}

impl Record {
    pub fn null() -> Self {
        Record::Scalar(Scalar::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Record::Scalar(Scalar::String(s.into()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Record::Scalar(_) => "scalar",
            Record::List(_) => "list",
            Record::Object(_) => "object",
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, Record::Scalar(_))
    }

    pub fn as_object(&self) -> Result<&RecordMap, ShapeError> {
        match self {
            Record::Object(map) => Ok(map),
            other => Err(ShapeError::new("object", other.kind())),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Record::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Case-insensitive field lookup
    pub fn get(&self, name: &str) -> Option<&Record> {
        match self {
            Record::Object(map) => get_field(map, name),
            _ => None,
        }
    }

    /// True when the value represents one row rather than a sequence of rows.
    ///
    /// Lists are never record-shaped. An object is list-shaped when its keys,
    /// concatenated, read as a number (`{"0": .., "1": ..}`). An empty object
    /// is record-shaped.
    pub fn is_record_shaped(&self) -> bool {
        match self {
            Record::List(_) => false,
            Record::Object(map) => {
                let joined: String = map.keys().map(String::as_str).collect();
                !looks_numeric(&joined)
            }
            Record::Scalar(_) => false,
        }
    }

    /// Items to explode when the value is used as an array child
    pub fn elements(&self) -> Result<Vec<&Record>, ShapeError> {
        match self {
            Record::List(items) => Ok(items.iter().collect()),
            Record::Object(map) if !map.is_empty() && !self.is_record_shaped() => {
                Ok(map.values().collect())
            }
            other => Err(ShapeError::new("list", other.kind())),
        }
    }

    /// Null, `""`, `false` and empty containers contribute nothing to a row.
    pub fn is_empty(&self) -> bool {
        match self {
            Record::Scalar(Scalar::Null) => true,
            Record::Scalar(Scalar::Bool(b)) => !b,
            Record::Scalar(Scalar::String(s)) => s.is_empty(),
            Record::Scalar(Scalar::Number(_)) => false,
            Record::List(items) => items.is_empty(),
            Record::Object(map) => map.is_empty(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Record::Scalar(Scalar::Null) => Value::Null,
            Record::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            Record::Scalar(Scalar::Number(n)) => Value::Number(n.clone()),
            Record::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            Record::List(items) => Value::Array(items.iter().map(Record::to_json).collect()),
            Record::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Look up `name` in a lower-cased map
pub fn get_field<'a>(map: &'a RecordMap, name: &str) -> Option<&'a Record> {
    match map.get(name) {
        Some(v) => Some(v),
        None => map.get(&name.to_lowercase()),
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Record::Scalar(Scalar::Null),
            Value::Bool(b) => Record::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Record::Scalar(Scalar::Number(n)),
            Value::String(s) => Record::Scalar(Scalar::String(s)),
            Value::Array(items) => Record::List(items.into_iter().map(Record::from).collect()),
            Value::Object(obj) => {
                let mut map = RecordMap::with_capacity(obj.len());
                for (key, value) in obj.into_iter() {
                    map.insert(key.to_lowercase(), Record::from(value));
                }
                Record::Object(map)
            }
        }
    }
}

impl From<Scalar> for Record {
    fn from(scalar: Scalar) -> Self {
        Record::Scalar(scalar)
    }
}
