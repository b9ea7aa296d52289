//! Bulk insert statements from flat rows
//!
//! Column values are coerced per column: numeric columns become bare numbers
//! (or `null`), everything else becomes a quoted literal. Empty values are
//! `null`; a `null` in a not-null column rejects the whole row.

use crate::error::SinkError;
use crate::flatten::Row;
use crate::record::{looks_numeric, Record};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Binds a target column to the row field it is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub column: String,
    /// `None` suppresses the column
    pub field: Option<String>,
}

/// Ordered column bindings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns(Vec<ColumnBinding>);

impl Columns {
    /// Columns read from fields of the same name
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Columns(
            names
                .into_iter()
                .map(|n| {
                    let name = n.into();
                    ColumnBinding {
                        column: name.clone(),
                        field: Some(name),
                    }
                })
                .collect(),
        )
    }

    /// Parse either a list of names or a `{column: field | false}` map
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::from_names(
                items.iter().filter_map(|v| v.as_str().map(str::to_string)),
            )),
            Value::Object(map) => Some(Columns(
                map.iter()
                    .map(|(column, field)| ColumnBinding {
                        column: column.clone(),
                        field: field.as_str().map(str::to_string),
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    /// Replace bindings for the overridden columns and append the overrides
    pub fn merge(&mut self, overrides: &Columns) {
        self.0
            .retain(|b| !overrides.0.iter().any(|o| o.column == b.column));
        self.0.extend(overrides.0.iter().cloned());
    }

    /// Bindings that are not suppressed
    pub fn active(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|b| b.field.as_deref().map(|f| (b.column.as_str(), f)))
    }

    pub fn names(&self) -> Vec<String> {
        self.active().map(|(c, _)| c.to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }
}

impl<'de> Deserialize<'de> for Columns {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Columns::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a list of columns or a column map"))
    }
}

/// Per-column coercion rules
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinkOptions {
    /// Columns (or fields) written as numbers
    #[serde(default, alias = "__nums")]
    pub nums: Vec<String>,
    /// Columns (or fields) that must not be null
    #[serde(default, alias = "__notnull")]
    pub notnull: Vec<String>,
    /// Quote literals with `"` instead of `'`
    #[serde(default, alias = "dquotes")]
    pub double_quotes: bool,
}

impl SinkOptions {
    fn is_numeric(&self, column: &str, field: &str) -> bool {
        self.nums.iter().any(|n| n == column || n == field)
    }

    fn is_not_null(&self, column: &str, field: &str) -> bool {
        self.notnull.iter().any(|n| n == column || n == field)
    }
}

/// Formats rows into `INSERT` statements
#[derive(Debug, Clone)]
pub struct RowSink {
    columns: Columns,
    options: SinkOptions,
}

impl RowSink {
    pub fn new(columns: Columns, options: SinkOptions) -> Self {
        RowSink { columns, options }
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// SQL literals for one row, in column order.
    ///
    /// `Ok(None)` when a not-null column would be null.
    pub fn format_row(&self, row: &Row) -> Result<Option<Vec<String>>, SinkError> {
        if self.columns.is_empty() {
            return Err(SinkError::NoColumns);
        }

        let mut values = Vec::new();
        for (column, field) in self.columns.active() {
            let literal = match row.get(field) {
                None => "null".to_string(),
                Some(Record::Scalar(scalar)) => {
                    let text = scalar.as_text();
                    if self.options.is_numeric(column, field) {
                        numeric_literal(text)
                    } else {
                        self.quoted_literal(text)
                    }
                }
                Some(_) => {
                    return Err(SinkError::NotFlat {
                        field: field.to_string(),
                    })
                }
            };

            if literal == "null" && self.options.is_not_null(column, field) {
                debug!(column, "row rejected: null in not-null column");
                return Ok(None);
            }
            values.push(literal);
        }

        Ok(Some(values))
    }

    /// One statement for all accepted rows; `Ok(None)` if every row was rejected
    pub fn insert(&self, table: &str, rows: &[Row]) -> Result<Option<String>, SinkError> {
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(v) = self.format_row(row)? {
                values.push(v);
            }
        }
        if values.is_empty() {
            return Ok(None);
        }
        build_insert(table, &self.columns.names(), &values).map(Some)
    }

    fn quoted_literal(&self, text: Option<String>) -> String {
        let Some(text) = text else {
            return "null".to_string();
        };
        let text = text.replace('\'', "\"");
        let text = text.trim();
        if text.is_empty() {
            return "null".to_string();
        }
        if self.options.double_quotes {
            format!("\"{}\"", text.replace('"', "'"))
        } else {
            format!("'{}'", text)
        }
    }
}

fn numeric_literal(text: Option<String>) -> String {
    let Some(text) = text else {
        return "null".to_string();
    };
    let cleaned = text.replace(' ', "").replace(',', ".");
    if looks_numeric(&cleaned) {
        cleaned
    } else {
        "null".to_string()
    }
}

/// `INSERT INTO table(c1, c2) VALUES (..), (..)`
pub fn build_insert(table: &str, columns: &[String], rows: &[Vec<String>]) -> Result<String, SinkError> {
    if table.trim().is_empty() {
        return Err(SinkError::NoTable);
    }
    if columns.is_empty() {
        return Err(SinkError::NoColumns);
    }
    if rows.is_empty() {
        return Err(SinkError::NoRows);
    }

    let values: Vec<String> = rows
        .iter()
        .map(|r| format!("({})", r.join(", ")))
        .collect();

    Ok(format!(
        "INSERT INTO {}({}) VALUES {}",
        table,
        columns.join(", "),
        values.join(", ")
    ))
}

/// Column bindings keyed by column name, for quick inspection
pub fn column_map(columns: &Columns) -> IndexMap<String, String> {
    columns
        .active()
        .map(|(c, f)| (c.to_string(), f.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match Record::from(value) {
            Record::Object(map) => Row::from(map),
            other => panic!("expected object, got {}", other.kind()),
        }
    }

    fn sink(columns: Value, options: Value) -> RowSink {
        RowSink::new(
            Columns::from_json(&columns).unwrap(),
            serde_json::from_value(options).unwrap(),
        )
    }

    #[test]
    fn test_format_row_coercion() {
        let sink = sink(
            json!(["id", "amount", "name", "note", "missing"]),
            json!({"__nums": ["id", "amount"]}),
        );
        let values = sink
            .format_row(&row(json!({
                "id": 7,
                "amount": "1 234,50",
                "name": "  O'Brien ",
                "note": ""
            })))
            .unwrap()
            .unwrap();

        assert_eq!(values, vec!["7", "1234.50", "'O\"Brien'", "null", "null"]);
    }

    #[test]
    fn test_non_numeric_in_numeric_column_is_null() {
        let sink = sink(json!(["qty"]), json!({"nums": ["qty"]}));
        let values = sink.format_row(&row(json!({"qty": "n/a"}))).unwrap().unwrap();
        assert_eq!(values, vec!["null"]);
    }

    #[test]
    fn test_not_null_rejects_row() {
        let sink = sink(json!(["id", "name"]), json!({"notnull": ["name"]}));
        assert_eq!(sink.format_row(&row(json!({"id": 1}))).unwrap(), None);
        assert!(sink.format_row(&row(json!({"id": 1, "name": "x"}))).unwrap().is_some());
    }

    #[test]
    fn test_double_quotes() {
        let sink = sink(json!(["name"]), json!({"dquotes": true}));
        let values = sink.format_row(&row(json!({"name": "Acme"}))).unwrap().unwrap();
        assert_eq!(values, vec!["\"Acme\""]);
    }

    #[test]
    fn test_renamed_columns() {
        let sink = sink(json!({"account_id": "id", "legacy": false}), json!({}));
        assert_eq!(sink.columns().names(), vec!["account_id"]);
        let values = sink.format_row(&row(json!({"id": 3}))).unwrap().unwrap();
        assert_eq!(values, vec!["'3'"]);
    }

    #[test]
    fn test_nested_value_is_rejected() {
        let sink = sink(json!(["items"]), json!({}));
        let err = sink.format_row(&row(json!({"items": [{"a": 1}]}))).unwrap_err();
        assert_eq!(err, SinkError::NotFlat { field: "items".to_string() });
    }

    #[test]
    fn test_insert_statement() {
        let sink = sink(json!(["id", "name"]), json!({"nums": ["id"], "notnull": ["name"]}));
        let statement = sink
            .insert(
                "accounts",
                &[
                    row(json!({"id": 1, "name": "Acme"})),
                    row(json!({"id": 2})),
                    row(json!({"id": 3, "name": "Beta"})),
                ],
            )
            .unwrap()
            .unwrap();

        assert_eq!(
            statement,
            "INSERT INTO accounts(id, name) VALUES (1, 'Acme'), (3, 'Beta')"
        );
        assert_eq!(sink.insert("accounts", &[row(json!({"id": 2}))]).unwrap(), None);
    }

    #[test]
    fn test_build_insert_errors() {
        assert_eq!(build_insert("", &["a".to_string()], &[vec!["1".to_string()]]), Err(SinkError::NoTable));
        assert_eq!(build_insert("t", &[], &[vec!["1".to_string()]]), Err(SinkError::NoColumns));
        assert_eq!(build_insert("t", &["a".to_string()], &[]), Err(SinkError::NoRows));
    }

    #[test]
    fn test_merge_columns() {
        let mut columns = Columns::from_names(["id", "name", "created"]);
        columns.merge(&Columns::from_json(&json!({"name": "title", "created": false})).unwrap());

        let map = column_map(&columns);
        assert_eq!(map.keys().cloned().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(map["name"], "title");
    }
}
