//! Mapping specs: the declarative option tree that drives flattening

pub mod node;
pub mod loader;
pub mod job;

pub use node::{ChildNode, ChildSpec, Children, Main, MappingNode, PARENT_PLACEHOLDER};
pub use loader::MAX_MAPPING_DEPTH;
pub use job::{Job, JobSet};
