use thiserror::Error;

/// A value did not have the shape (object, list, scalar) a caller expected.
///
/// Inside the engine this is always recovered by treating the field as absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct ShapeError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl ShapeError {
    pub fn new(expected: &'static str, found: &'static str) -> Self {
        ShapeError { expected, found }
    }
}

/// A mapping document is malformed. Raised at load time only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("{path}: invalid mapping document: {message}")]
    Parse { path: String, message: String },

    #[error("{path}: `main` mixes the ALL sentinel with explicit fields")]
    MainAllInList { path: String },

    #[error("{path}: empty field name")]
    EmptyName { path: String },

    #[error("{path}: `{first}` and `{second}` are mutually exclusive")]
    Conflict {
        path: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("{path}: `{flag}` is only valid on a child node")]
    RootFlag { path: String, flag: &'static str },

    #[error("{path}: `{key}` must be a scalar")]
    NonScalarParam { path: String, key: String },

    #[error("{path}: `__all` must be a boolean")]
    MatchAllNotBool { path: String },

    #[error("{path}: mapping nested deeper than {limit} levels")]
    TooDeep { path: String, limit: usize },

    #[error("job `{0}` not found")]
    UnknownJob(String),

    #[error("job `{job}` has no `controls` mapping")]
    MissingControls { job: String },
}

/// Errors returned by the public flattening entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    #[error("record nesting exceeds the configured depth of {limit}")]
    DepthLimit { limit: usize },

    #[error("top-level record: {0}")]
    Shape(#[from] ShapeError),
}

/// Errors raised while turning rows into insert statements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("field `{field}` holds a nested value and cannot be written to a column")]
    NotFlat { field: String },

    #[error("no columns to write")]
    NoColumns,

    #[error("no rows to write")]
    NoRows,

    #[error("table name is empty")]
    NoTable,
}

/// A record provider could not supply a record.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{descriptor}: {source}")]
    Io {
        descriptor: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{descriptor}: invalid JSON: {source}")]
    Decode {
        descriptor: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}: unsupported source")]
    Unsupported(String),
}
