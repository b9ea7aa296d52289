//! Job documents
//!
//! A job file maps job names to a source, target tables, column bindings and
//! the mapping (`controls`) used to flatten the source's records:
//!
//! ```json
//! {
//!   "deals": {
//!     "links": "https://crm.example/api/deals",
//!     "tables": ["deals"],
//!     "controls": {"__default": {"main": "__all", "second": {"__all": true, "__prefix": "%parent%_"}}},
//!     "columns": ["id", "title"],
//!     "__nums": ["id"]
//!   }
//! }
//! ```

use crate::error::SpecError;
use crate::mapping::MappingNode;
use crate::sink::{Columns, RowFilter, SinkOptions};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;

const DEFAULT_CONTROLS_KEY: &str = "__default";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLinks {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(default)]
    links: Option<RawLinks>,
    #[serde(default)]
    tables: Vec<String>,
    #[serde(default)]
    controls: Option<Value>,
    #[serde(default)]
    columns: Option<Columns>,
    #[serde(flatten)]
    options: SinkOptions,
    #[serde(default)]
    filter: Option<RowFilter>,
}

/// One configured source-to-table flattening job
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    /// Source descriptors handed to the record provider
    pub links: Vec<String>,
    pub tables: Vec<String>,
    pub controls: MappingNode,
    pub columns: Option<Columns>,
    pub options: SinkOptions,
    pub filter: RowFilter,
}

impl Job {
    /// First configured table, if any
    pub fn table(&self) -> Option<&str> {
        self.tables.first().map(String::as_str)
    }
}

/// All jobs of a document, in document order
#[derive(Debug, Clone, Default)]
pub struct JobSet {
    jobs: IndexMap<String, Job>,
}

impl JobSet {
    pub fn from_json(value: &Value) -> Result<Self, SpecError> {
        let Value::Object(doc) = value else {
            return Err(SpecError::Parse {
                path: "$".to_string(),
                message: "expected an object of jobs".to_string(),
            });
        };

        let mut jobs = IndexMap::new();
        for (name, job_value) in doc.iter() {
            let path = format!("$.{}", name);
            let raw = RawJob::deserialize(job_value).map_err(|e| SpecError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;

            let controls = raw.controls.ok_or_else(|| SpecError::MissingControls { job: name.clone() })?;
            let root = match controls.get(DEFAULT_CONTROLS_KEY) {
                Some(node) => node,
                None => &controls,
            };

            let links = match raw.links {
                Some(RawLinks::One(link)) => vec![link],
                Some(RawLinks::Many(links)) => links,
                None => Vec::new(),
            };

            jobs.insert(
                name.clone(),
                Job {
                    name: name.clone(),
                    links,
                    tables: raw.tables,
                    controls: MappingNode::from_json(root)?,
                    columns: raw.columns,
                    options: raw.options,
                    filter: raw.filter.unwrap_or_default(),
                },
            );
        }

        Ok(JobSet { jobs })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SpecError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        text.parse()
    }

    pub fn get(&self, name: &str) -> Result<&Job, SpecError> {
        self.jobs
            .get(name)
            .ok_or_else(|| SpecError::UnknownJob(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl FromStr for JobSet {
    type Err = SpecError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(text).map_err(|e| SpecError::Parse {
            path: "$".to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&value)
    }
}
