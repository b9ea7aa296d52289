//! Record providers
//!
//! The engine only ever sees decoded [`Record`]s. Where they come from is up
//! to a [`RecordSource`]; this crate ships one that reads local JSON files.
//! Network retrieval, authentication and retries belong to other
//! implementations.

use crate::error::FetchError;
use crate::record::Record;
use serde_json::Value;
use std::path::PathBuf;

/// Supplies a decoded record for a source descriptor
pub trait RecordSource {
    fn fetch(&self, descriptor: &str) -> Result<Record, FetchError>;
}

/// Reads descriptors as paths, optionally relative to a base directory
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    base: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        FileSource { base: Some(base.into()) }
    }
}

impl RecordSource for FileSource {
    fn fetch(&self, descriptor: &str) -> Result<Record, FetchError> {
        if descriptor.contains("://") {
            return Err(FetchError::Unsupported(descriptor.to_string()));
        }

        let path = match &self.base {
            Some(base) => base.join(descriptor),
            None => PathBuf::from(descriptor),
        };
        let text = std::fs::read_to_string(&path).map_err(|source| FetchError::Io {
            descriptor: descriptor.to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| FetchError::Decode {
            descriptor: descriptor.to_string(),
            source,
        })?;
        Ok(Record::from(value))
    }
}
