//! Declarative flattening of nested records into table rows
//!
//! The engine walks a [`Record`](crate::record::Record) together with a
//! [`MappingNode`](crate::mapping::MappingNode) tree. Each level copies its
//! main fields, recurses into the children the mapping names, and folds the
//! results back together:
//!
//! - plain children merge flat into the parent row
//! - array children explode the parent into one row per element (sibling
//!   arrays multiply)
//! - `outputName` children nest their rows under a key
//! - `joinWithAll` children are deferred and merged into every final row

pub mod types;
pub mod engine;
pub mod join;
pub mod writer;

pub use types::{FlatRow, FlattenConfig, Row};
pub use engine::Flattener;
pub use join::{resolve_joins, Flattened};
pub use writer::{SingleWriter, TableWriter};
