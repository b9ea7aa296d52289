//! Closed, validated mapping tree
//!
//! A [`MappingNode`] is the per-level instruction for turning one object into
//! output fields. Nodes are built either programmatically (see the builder
//! methods) or by the loader, which rejects malformed documents before any
//! data is touched.

use crate::record::Scalar;
use indexmap::IndexMap;

/// Placeholder in a prefix that is replaced with the child's field name
pub const PARENT_PLACEHOLDER: &str = "%parent%";

/// Which fields of the current level are copied into the row
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Main {
    /// Copy nothing from this level
    #[default]
    None,
    /// Copy every scalar field, lower-cased
    All,
    /// Copy the named fields verbatim; missing ones are omitted
    Fields(Vec<String>),
    /// Copy one field if it is present and non-empty
    Field(String),
}

/// How child containers are visited
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Children {
    #[default]
    None,
    /// Every container field is flattened with `Main::All` under a prefix
    /// template (usually containing `%parent%`)
    MatchAll { prefix: String },
    /// Explicit children, keyed by lower-cased source field name
    Named(IndexMap<String, ChildNode>),
}

/// Which mapping a child is flattened with
#[derive(Debug, Clone, PartialEq)]
pub enum ChildSpec {
    Own(MappingNode),
    /// Reuse the enclosing node's mapping on the child's value
    Parent,
}

/// A child entry with its merge flags
#[derive(Debug, Clone, PartialEq)]
pub struct ChildNode {
    pub spec: ChildSpec,
    /// The source field holds a list; each element is flattened separately
    pub is_array: bool,
    /// Nest the child's rows under this key instead of merging them flat
    pub output_name: Option<String>,
    /// Defer the child's rows and merge them into every final row
    pub join_with_all: bool,
}

impl ChildNode {
    pub fn new(node: MappingNode) -> Self {
        ChildNode {
            spec: ChildSpec::Own(node),
            is_array: false,
            output_name: None,
            join_with_all: false,
        }
    }

    pub fn parent() -> Self {
        ChildNode {
            spec: ChildSpec::Parent,
            is_array: false,
            output_name: None,
            join_with_all: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn join_with_all(mut self) -> Self {
        self.join_with_all = true;
        self
    }

    /// The node to recurse with and the prefix it emits under `key`
    pub fn resolve<'a>(&'a self, key: &str, parent: &'a MappingNode, parent_prefix: &str) -> (&'a MappingNode, String) {
        match &self.spec {
            ChildSpec::Own(node) => (node, node.prefix.replace(PARENT_PLACEHOLDER, key)),
            ChildSpec::Parent => (parent, parent_prefix.to_string()),
        }
    }
}

/// One level of the mapping tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappingNode {
    pub prefix: String,
    pub main: Main,
    pub children: Children,
    /// Literal fields merged into every produced row
    pub param: IndexMap<String, Scalar>,
}

impl MappingNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node that copies every scalar field under `prefix`
    pub fn all(prefix: impl Into<String>) -> Self {
        MappingNode {
            prefix: prefix.into(),
            main: Main::All,
            ..Self::default()
        }
    }

    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MappingNode {
            main: Main::Fields(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_main(mut self, main: Main) -> Self {
        self.main = main;
        self
    }

    pub fn with_child(mut self, key: impl Into<String>, child: ChildNode) -> Self {
        let key = key.into().to_lowercase();
        match &mut self.children {
            Children::Named(children) => {
                children.insert(key, child);
            }
            _ => {
                let mut children = IndexMap::new();
                children.insert(key, child);
                self.children = Children::Named(children);
            }
        }
        self
    }

    pub fn with_match_all(mut self, prefix: impl Into<String>) -> Self {
        self.children = Children::MatchAll { prefix: prefix.into() };
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Scalar) -> Self {
        self.param.insert(key.into(), value);
        self
    }

    /// A node that declares no fields, children or params
    pub fn is_empty(&self) -> bool {
        self.main == Main::None && self.children == Children::None && self.param.is_empty()
    }
}
