use crate::record::{get_field, Record, RecordMap};
use serde::Serialize;
use serde_json::Value;

/// One output row: field name to value, in emission order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(RecordMap);

impl Row {
    pub fn new() -> Self {
        Row(RecordMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Record) {
        self.0.insert(name.into(), value);
    }

    /// Exact lookup, falling back to the lower-cased name
    pub fn get(&self, name: &str) -> Option<&Record> {
        get_field(&self.0, name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Record)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Right-biased merge: fields of `other` overwrite fields of `self`
    pub fn merge(&mut self, other: &Row) {
        for (key, value) in other.0.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn merged(&self, other: &Row) -> Row {
        let mut row = self.clone();
        row.merge(other);
        row
    }

    /// Append `rows` to the list stored under `name`
    pub fn nest(&mut self, name: &str, rows: Vec<Row>) {
        let incoming = rows.into_iter().map(|r| Record::Object(r.0));
        match self.0.get_mut(name) {
            Some(Record::List(items)) => items.extend(incoming),
            Some(existing) => {
                let mut items = vec![existing.clone()];
                items.extend(incoming);
                *existing = Record::List(items);
            }
            None => {
                self.0.insert(name.to_string(), Record::List(incoming.collect()));
            }
        }
    }

    /// Store a single row under `name`, merging into an object already there.
    /// Several rows fall back to [`Row::nest`].
    pub fn nest_merge(&mut self, name: &str, mut rows: Vec<Row>) {
        if rows.len() != 1 {
            self.nest(name, rows);
            return;
        }
        let row = rows.remove(0);
        if let Some(Record::Object(existing)) = self.0.get_mut(name) {
            for (key, value) in row.0.into_iter() {
                existing.insert(key, value);
            }
        } else if self.0.contains_key(name) {
            self.nest(name, vec![row]);
        } else {
            self.0.insert(name.to_string(), Record::Object(row.0));
        }
    }

    /// True when no value is a list or object
    pub fn is_flat(&self) -> bool {
        self.0.values().all(|v| !v.is_container())
    }

    pub fn into_inner(self) -> RecordMap {
        self.0
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl From<RecordMap> for Row {
    fn from(map: RecordMap) -> Self {
        Row(map)
    }
}

impl FromIterator<(String, Record)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Record)>>(iter: I) -> Self {
        Row(iter.into_iter().collect())
    }
}

/// Result of flattening one record: one row, or several after explosion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlatRow {
    Single(Row),
    Many(Vec<Row>),
}

impl FlatRow {
    pub fn is_record_shaped(&self) -> bool {
        matches!(self, FlatRow::Single(_))
    }

    pub fn len(&self) -> usize {
        match self {
            FlatRow::Single(_) => 1,
            FlatRow::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Vec<&Row> {
        match self {
            FlatRow::Single(row) => vec![row],
            FlatRow::Many(rows) => rows.iter().collect(),
        }
    }

    pub fn rows_mut(&mut self) -> Vec<&mut Row> {
        match self {
            FlatRow::Single(row) => vec![row],
            FlatRow::Many(rows) => rows.iter_mut().collect(),
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            FlatRow::Single(row) => vec![row],
            FlatRow::Many(rows) => rows,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.rows().iter().all(|r| r.is_flat())
    }
}

/// Configuration for the flattening process
#[derive(Debug, Clone)]
pub struct FlattenConfig {
    /// Maximum record nesting the engine descends into
    pub max_depth: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig { max_depth: 64 }
    }
}
