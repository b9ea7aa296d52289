//! # Denest - declarative flattening of nested API records
//!
//! Turns hierarchically nested records (as returned by HTTP/JSON APIs) into
//! flat rows for a relational table. What is kept, how it is renamed, and how
//! child collections are exploded is described by a mapping tree instead of
//! per-source code.
//!
//! ## Modules
//!
//! - **record**: tagged source values with case-insensitive objects
//! - **mapping**: the mapping tree and its loader
//! - **flatten**: the engine that walks records and mappings together
//! - **sink**: insert statements and row filters for the flattened rows
//! - **source**: record providers feeding the engine
//!
//! ## Quick Start
//!
//! ```rust
//! use denest::{flatten_record, MappingNode};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let spec = MappingNode::from_json(&json!({
//!     "main": ["id", "name"],
//!     "children": {
//!         "contacts": {"isArray": true, "main": ["email"], "prefix": "contact_"}
//!     }
//! }))?;
//!
//! let data = json!({
//!     "id": 1,
//!     "name": "Acme",
//!     "contacts": [{"email": "a@x"}, {"email": "b@x"}]
//! });
//!
//! let rows = flatten_record(data, &spec)?;
//! assert_eq!(rows.len(), 2);
//! assert_eq!(
//!     serde_json::to_value(&rows)?,
//!     json!([
//!         {"id": 1, "name": "Acme", "contact_email": "a@x"},
//!         {"id": 1, "name": "Acme", "contact_email": "b@x"}
//!     ])
//! );
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, Write};

pub mod error;
pub mod record;
pub mod mapping;
pub mod flatten;
pub mod sink;
pub mod source;

// Re-export commonly used types for convenience
pub use error::{FetchError, FlattenError, ShapeError, SinkError, SpecError};
pub use record::{Record, Scalar};
pub use mapping::{ChildNode, Job, JobSet, Main, MappingNode};
pub use flatten::{FlatRow, FlattenConfig, Flattener, Row, SingleWriter, TableWriter};
pub use sink::{Columns, RowFilter, RowSink, SinkOptions};
pub use source::{FileSource, RecordSource};

/// Flatten one decoded JSON value with the default configuration
pub fn flatten_record(data: Value, spec: &MappingNode) -> Result<FlatRow, FlattenError> {
    Flattener::default().flatten(&Record::from(data), spec)
}

/// Main entry point for streams: flatten newline-delimited JSON records and
/// write the rows as JSON Lines. Returns the number of rows written.
pub fn flatten_ndjson<R: BufRead, W: Write>(
    reader: R,
    writer: &mut SingleWriter<W>,
    spec: &MappingNode,
    config: FlattenConfig,
) -> Result<usize> {
    let flattener = Flattener::new(config);
    let mut written = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse JSON on line {}", idx + 1))?;

        let rows = flattener
            .flatten(&Record::from(value), spec)
            .with_context(|| format!("Failed to flatten record on line {}", idx + 1))?
            .into_rows();
        writer.write_rows(None, &rows)?;
        written += rows.len();
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_flattening() {
        let spec = MappingNode::from_json(&json!({
            "main": ["id", "name"],
            "children": {"posts": {"isArray": true, "main": ["title"], "prefix": "post_"}}
        }))
        .unwrap();

        let rows = flatten_record(
            json!({"id": 1, "Name": "Alice", "posts": [{"title": "P1"}, {"title": "P2"}]}),
            &spec,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.is_flat());
    }

    #[test]
    fn test_ndjson_stream() {
        let spec = MappingNode::fields(["id"]);
        let input = "{\"id\": 1}\n\n{\"ID\": 2, \"x\": 3}\n";

        let mut buffer = Vec::new();
        let mut writer = SingleWriter::new(&mut buffer);
        let written = flatten_ndjson(input.as_bytes(), &mut writer, &spec, FlattenConfig::default()).unwrap();

        assert_eq!(written, 2);
        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(output, "{\"id\":1}\n{\"id\":2}\n");
    }

    #[test]
    fn test_ndjson_reports_bad_line() {
        let spec = MappingNode::fields(["id"]);
        let mut buffer = Vec::new();
        let mut writer = SingleWriter::new(&mut buffer);
        let err = flatten_ndjson("{\"id\": 1}\nnot json\n".as_bytes(), &mut writer, &spec, FlattenConfig::default())
            .unwrap_err();

        assert!(err.to_string().contains("line 2"));
    }
}
