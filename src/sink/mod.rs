//! Row sink: turning flat rows into statements for a relational table
//!
//! Executing the statements is left to the caller.

pub mod insert;
pub mod filter;

pub use insert::{build_insert, ColumnBinding, Columns, RowSink, SinkOptions};
pub use filter::RowFilter;
