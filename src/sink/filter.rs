//! Post-hoc row filtering by column value

use crate::flatten::Row;
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;

/// Keeps rows whose field values are listed in `keep`, then drops rows whose
/// values are listed in `exclude`.
///
/// Values that pass `exclude` are added to it, so a later row with the same
/// value is dropped: `exclude` doubles as in-batch de-duplication seeded with
/// values already present downstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowFilter {
    #[serde(default)]
    pub keep: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub exclude: IndexMap<String, IndexSet<String>>,
}

impl RowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.keep.insert(field.into(), values);
        self
    }

    pub fn exclude<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude
            .insert(field.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keep.is_empty() && self.exclude.is_empty()
    }

    pub fn apply(&mut self, rows: Vec<Row>) -> Vec<Row> {
        let mut rows = rows;

        for (field, allowed) in self.keep.iter() {
            rows.retain(|row| {
                field_text(row, field).is_some_and(|v| allowed.iter().any(|a| *a == v))
            });
        }

        for (field, seen) in self.exclude.iter_mut() {
            rows.retain(|row| match field_text(row, field) {
                Some(value) => seen.insert(value),
                None => true,
            });
        }

        rows
    }
}

fn field_text(row: &Row, field: &str) -> Option<String> {
    row.get(field)
        .and_then(|v| v.as_scalar())
        .and_then(|s| s.as_text())
}
