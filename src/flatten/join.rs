//! Deferred merges
//!
//! Array children are not merged into their parent while the parent is still
//! being built. They are collected into groups and expanded once the node is
//! complete. Join fragments travel further: they ride along with every
//! intermediate result and are applied to the final rows exactly once, at the
//! top-level call.

use crate::flatten::types::{FlatRow, Row};

/// Intermediate result of one recursive call
#[derive(Debug, Clone, PartialEq)]
pub struct Flattened {
    pub rows: FlatRow,
    /// Fragments to merge into every final row, in accumulation order
    pub joins: Vec<Row>,
}

impl Flattened {
    pub fn single(row: Row) -> Self {
        Flattened {
            rows: FlatRow::Single(row),
            joins: Vec::new(),
        }
    }
}

/// Expand a node's base fields against its array groups.
///
/// Each group multiplies the rows built so far: every existing row is merged
/// with every row of the group (right-biased, group fields win). With no
/// groups the base row comes back as a single row.
pub fn expand(base: Row, groups: Vec<Vec<Row>>) -> FlatRow {
    if groups.is_empty() {
        return FlatRow::Single(base);
    }

    let mut rows = vec![base];
    for group in groups.iter() {
        let mut next = Vec::with_capacity(rows.len() * group.len());
        for row in rows.iter() {
            for element in group.iter() {
                next.push(row.merged(element));
            }
        }
        rows = next;
    }

    FlatRow::Many(rows)
}

/// Merge literal fields into every row
pub fn broadcast(rows: &mut FlatRow, fields: &Row) {
    if fields.is_empty() {
        return;
    }
    for row in rows.rows_mut() {
        row.merge(fields);
    }
}

/// Apply every pending join fragment to every row and drop the fragments
pub fn resolve_joins(flattened: Flattened) -> FlatRow {
    let Flattened { mut rows, joins } = flattened;
    for fragment in joins.iter() {
        broadcast(&mut rows, fragment);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use serde_json::{json, Value};

    fn row(value: Value) -> Row {
        match Record::from(value) {
            Record::Object(map) => Row::from(map),
            other => panic!("expected object, got {}", other.kind()),
        }
    }

    fn to_json(rows: &FlatRow) -> Value {
        serde_json::to_value(rows).unwrap()
    }

    #[test]
    fn test_expand_without_groups() {
        let rows = expand(row(json!({"id": 1})), vec![]);
        assert!(rows.is_record_shaped());
    }

    #[test]
    fn test_expand_single_group() {
        let rows = expand(
            row(json!({"id": 1})),
            vec![vec![row(json!({"tag": "a"})), row(json!({"tag": "b"}))]],
        );
        assert_eq!(
            to_json(&rows),
            json!([{"id": 1, "tag": "a"}, {"id": 1, "tag": "b"}])
        );
    }

    #[test]
    fn test_expand_is_cartesian() {
        let rows = expand(
            row(json!({"id": 1})),
            vec![
                vec![row(json!({"color": "red"})), row(json!({"color": "blue"}))],
                vec![row(json!({"size": "s"})), row(json!({"size": "m"})), row(json!({"size": "l"}))],
            ],
        );
        assert_eq!(rows.len(), 6);
        assert_eq!(
            rows.rows()[0].to_json(),
            json!({"id": 1, "color": "red", "size": "s"})
        );
        assert_eq!(
            rows.rows()[5].to_json(),
            json!({"id": 1, "color": "blue", "size": "l"})
        );
    }

    #[test]
    fn test_resolve_joins_broadcasts_in_order() {
        let flattened = Flattened {
            rows: FlatRow::Many(vec![row(json!({"a": 1})), row(json!({"a": 2}))]),
            joins: vec![row(json!({"parent_id": 7, "x": 1})), row(json!({"x": 2}))],
        };

        let rows = resolve_joins(flattened);
        assert_eq!(
            to_json(&rows),
            json!([
                {"a": 1, "parent_id": 7, "x": 2},
                {"a": 2, "parent_id": 7, "x": 2}
            ])
        );
    }

    #[test]
    fn test_resolve_without_joins_is_identity() {
        let rows = FlatRow::Single(row(json!({"a": 1})));
        let resolved = resolve_joins(Flattened {
            rows: rows.clone(),
            joins: vec![],
        });
        assert_eq!(resolved, rows);
    }
}
