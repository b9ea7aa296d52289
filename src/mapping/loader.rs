//! Loading mapping documents
//!
//! Accepts both the current field names and the legacy ones
//! (`second`, `array`, `parentOption`, `name`, `joinMainArray`), validates the
//! whole tree and produces a [`MappingNode`].

use crate::error::SpecError;
use crate::mapping::node::{ChildNode, ChildSpec, Children, Main, MappingNode};
use crate::record::Scalar;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Deepest mapping tree the loader accepts
pub const MAX_MAPPING_DEPTH: usize = 64;

// `__all` in any case, or the upper-case legacy spelling. A lower-case `all`
// stays an ordinary field name.
const ALL_SENTINEL: &str = "__all";
const LEGACY_ALL_SENTINEL: &str = "ALL";
const MATCH_ALL_KEY: &str = "__all";
const MATCH_ALL_PREFIX_KEY: &str = "__prefix";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMain {
    List(Vec<String>),
    One(String),
    Off(bool),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    main: Option<RawMain>,
    #[serde(default)]
    children: Option<Value>,
    #[serde(default)]
    second: Option<Value>,
    #[serde(default)]
    param: Option<Value>,
    #[serde(default, rename = "isArray", alias = "array")]
    is_array: Option<bool>,
    #[serde(default, rename = "useParentSpec", alias = "parentOption")]
    use_parent_spec: Option<bool>,
    #[serde(default, rename = "outputName", alias = "name")]
    output_name: Option<Value>,
    #[serde(default, rename = "joinWithAll", alias = "joinMainArray")]
    join_with_all: Option<bool>,
}

impl RawNode {
    fn has_child_flags(&self) -> Option<&'static str> {
        if self.is_array.unwrap_or(false) {
            Some("isArray")
        } else if self.use_parent_spec.unwrap_or(false) {
            Some("useParentSpec")
        } else if self.join_with_all.unwrap_or(false) {
            Some("joinWithAll")
        } else if output_name(&self.output_name).is_some() {
            Some("outputName")
        } else {
            None
        }
    }
}

// Legacy documents write `false` for "unset".
fn output_name(value: &Option<Value>) -> Option<&str> {
    match value {
        Some(Value::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

impl MappingNode {
    /// Parse and validate a mapping document
    pub fn from_json(value: &Value) -> Result<Self, SpecError> {
        let raw = parse_raw(value, "$")?;
        if let Some(flag) = raw.has_child_flags() {
            return Err(SpecError::RootFlag { path: "$".to_string(), flag });
        }
        build_node(raw, "$", 0)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SpecError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        text.parse()
    }
}

impl FromStr for MappingNode {
    type Err = SpecError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(text).map_err(|e| SpecError::Parse {
            path: "$".to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&value)
    }
}

fn parse_raw(value: &Value, path: &str) -> Result<RawNode, SpecError> {
    if value.is_null() || value == &Value::Bool(false) {
        return Ok(RawNode::default());
    }
    RawNode::deserialize(value).map_err(|e| SpecError::Parse {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn build_node(raw: RawNode, path: &str, depth: usize) -> Result<MappingNode, SpecError> {
    if depth > MAX_MAPPING_DEPTH {
        return Err(SpecError::TooDeep {
            path: path.to_string(),
            limit: MAX_MAPPING_DEPTH,
        });
    }

    let main = build_main(raw.main, path)?;

    let children_value = match (raw.children, raw.second) {
        (Some(_), Some(_)) => {
            return Err(SpecError::Conflict {
                path: path.to_string(),
                first: "children",
                second: "second",
            })
        }
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    };
    let children = build_children(children_value, path, depth)?;
    let param = build_param(raw.param, path)?;

    Ok(MappingNode {
        prefix: raw.prefix.unwrap_or_default(),
        main,
        children,
        param,
    })
}

fn is_all_sentinel(name: &str) -> bool {
    name.eq_ignore_ascii_case(ALL_SENTINEL) || name == LEGACY_ALL_SENTINEL
}

fn build_main(raw: Option<RawMain>, path: &str) -> Result<Main, SpecError> {
    match raw {
        None | Some(RawMain::Off(false)) => Ok(Main::None),
        Some(RawMain::Off(true)) => Err(SpecError::Parse {
            path: format!("{}.main", path),
            message: "expected a field name, a list of names, or the ALL sentinel".to_string(),
        }),
        Some(RawMain::One(name)) => {
            if is_all_sentinel(&name) {
                Ok(Main::All)
            } else if name.trim().is_empty() {
                Err(SpecError::EmptyName { path: format!("{}.main", path) })
            } else {
                Ok(Main::Field(name))
            }
        }
        Some(RawMain::List(names)) => {
            for name in &names {
                if is_all_sentinel(name) {
                    return Err(SpecError::MainAllInList { path: format!("{}.main", path) });
                }
                if name.trim().is_empty() {
                    return Err(SpecError::EmptyName { path: format!("{}.main", path) });
                }
            }
            Ok(Main::Fields(names))
        }
    }
}

fn build_children(value: Option<Value>, path: &str, depth: usize) -> Result<Children, SpecError> {
    let Some(value) = value else {
        return Ok(Children::None);
    };
    let obj = match value {
        Value::Object(obj) => obj,
        Value::Null | Value::Bool(false) => return Ok(Children::None),
        _ => {
            return Err(SpecError::Parse {
                path: format!("{}.children", path),
                message: "expected an object".to_string(),
            })
        }
    };

    let match_all = match obj.get(MATCH_ALL_KEY) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(SpecError::MatchAllNotBool {
                path: format!("{}.children", path),
            })
        }
    };

    if match_all {
        if obj.keys().any(|k| !k.starts_with("__")) {
            return Err(SpecError::Conflict {
                path: format!("{}.children", path),
                first: MATCH_ALL_KEY,
                second: "named children",
            });
        }
        let prefix = match obj.get(MATCH_ALL_PREFIX_KEY) {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        return Ok(Children::MatchAll { prefix });
    }

    let mut named = IndexMap::new();
    for (key, child_value) in obj.into_iter() {
        if key.starts_with("__") {
            if key == MATCH_ALL_PREFIX_KEY {
                warn!(path, "`__prefix` without `__all: true` is ignored");
            } else if key != MATCH_ALL_KEY {
                warn!(path, key = %key, "skipping reserved child key");
            }
            continue;
        }
        let child_path = format!("{}.children.{}", path, key);
        if key.trim().is_empty() {
            return Err(SpecError::EmptyName { path: child_path });
        }
        let child = build_child(&child_value, &child_path, depth)?;
        named.insert(key.to_lowercase(), child);
    }

    if named.is_empty() {
        Ok(Children::None)
    } else {
        Ok(Children::Named(named))
    }
}

fn build_child(value: &Value, path: &str, depth: usize) -> Result<ChildNode, SpecError> {
    let raw = parse_raw(value, path)?;

    let output = output_name(&raw.output_name).map(str::to_string);
    let join_with_all = raw.join_with_all.unwrap_or(false);
    if output.is_some() && join_with_all {
        return Err(SpecError::Conflict {
            path: path.to_string(),
            first: "outputName",
            second: "joinWithAll",
        });
    }
    if output.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(SpecError::EmptyName { path: format!("{}.outputName", path) });
    }

    let is_array = raw.is_array.unwrap_or(false);
    let spec = if raw.use_parent_spec.unwrap_or(false) {
        if raw.main.is_some() || raw.children.is_some() || raw.second.is_some() {
            return Err(SpecError::Conflict {
                path: path.to_string(),
                first: "useParentSpec",
                second: "main/children",
            });
        }
        ChildSpec::Parent
    } else {
        ChildSpec::Own(build_node(raw, path, depth + 1)?)
    };

    Ok(ChildNode {
        spec,
        is_array,
        output_name: output,
        join_with_all,
    })
}

fn build_param(value: Option<Value>, path: &str) -> Result<IndexMap<String, Scalar>, SpecError> {
    let mut param = IndexMap::new();
    let obj = match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(param),
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            return Err(SpecError::Parse {
                path: format!("{}.param", path),
                message: "expected an object".to_string(),
            })
        }
    };

    for (key, value) in obj.into_iter() {
        let scalar = match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(b),
            Value::Number(n) => Scalar::Number(n),
            Value::String(s) => Scalar::String(s),
            Value::Array(_) | Value::Object(_) => {
                return Err(SpecError::NonScalarParam {
                    path: format!("{}.param", path),
                    key,
                })
            }
        };
        param.insert(key, scalar);
    }
    Ok(param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_modern_document() {
        let node = MappingNode::from_json(&json!({
            "main": ["id", "name"],
            "children": {
                "Contacts": {"isArray": true, "main": ["email"], "prefix": "contact_"}
            },
            "param": {"source": "crm"}
        }))
        .unwrap();

        assert_eq!(node.main, Main::Fields(vec!["id".to_string(), "name".to_string()]));
        let Children::Named(children) = &node.children else {
            panic!("expected named children");
        };
        let contacts = &children["contacts"];
        assert!(contacts.is_array);
        let ChildSpec::Own(contact_node) = &contacts.spec else {
            panic!("expected own spec");
        };
        assert_eq!(contact_node.prefix, "contact_");
        assert_eq!(node.param["source"], Scalar::String("crm".to_string()));
    }

    #[test]
    fn test_legacy_document() {
        let node = MappingNode::from_json(&json!({
            "main": "__all",
            "second": {
                "items": {"array": true, "parentOption": true, "name": false, "prefix": ""},
                "owner": {"main": ["id"], "prefix": "%parent%_", "joinMainArray": true},
                "__comment": "ignored"
            }
        }))
        .unwrap();

        assert_eq!(node.main, Main::All);
        let Children::Named(children) = &node.children else {
            panic!("expected named children");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children["items"].spec, ChildSpec::Parent);
        assert!(children["items"].is_array);
        assert_eq!(children["items"].output_name, None);
        assert!(children["owner"].join_with_all);
    }

    #[test]
    fn test_match_all_children() {
        let node = MappingNode::from_json(&json!({
            "main": "ALL",
            "second": {"__all": true, "__prefix": "%parent%_"}
        }))
        .unwrap();

        assert_eq!(node.children, Children::MatchAll { prefix: "%parent%_".to_string() });
    }

    #[test]
    fn test_rejects_all_inside_main_list() {
        let err = MappingNode::from_json(&json!({"main": ["id", "__all"]})).unwrap_err();
        assert!(matches!(err, SpecError::MainAllInList { .. }));
    }

    #[test]
    fn test_rejects_conflicting_child_flags() {
        let err = MappingNode::from_json(&json!({
            "children": {"x": {"outputName": "xs", "joinWithAll": true}}
        }))
        .unwrap_err();
        assert!(matches!(err, SpecError::Conflict { first: "outputName", .. }));

        let err = MappingNode::from_json(&json!({
            "children": {"x": {"useParentSpec": true, "main": ["a"]}}
        }))
        .unwrap_err();
        assert!(matches!(err, SpecError::Conflict { first: "useParentSpec", .. }));
    }

    #[test]
    fn test_rejects_root_flags_and_bad_params() {
        let err = MappingNode::from_json(&json!({"isArray": true, "main": ["a"]})).unwrap_err();
        assert_eq!(err, SpecError::RootFlag { path: "$".to_string(), flag: "isArray" });

        let err = MappingNode::from_json(&json!({"param": {"nested": {"a": 1}}})).unwrap_err();
        assert!(matches!(err, SpecError::NonScalarParam { .. }));

        let err = MappingNode::from_json(&json!({"second": {"__all": "yes"}})).unwrap_err();
        assert!(matches!(err, SpecError::MatchAllNotBool { .. }));
    }

    #[test]
    fn test_rejects_match_all_mixed_with_named() {
        let err = MappingNode::from_json(&json!({
            "children": {"__all": true, "orders": {"main": "__ALL"}}
        }))
        .unwrap_err();
        assert!(matches!(err, SpecError::Conflict { first: "__all", .. }));
    }

    #[test]
    fn test_lower_case_all_is_a_field() {
        let node = MappingNode::from_json(&json!({"main": "all"})).unwrap();
        assert_eq!(node.main, Main::Field("all".to_string()));

        let node = MappingNode::from_json(&json!({"main": "__All"})).unwrap();
        assert_eq!(node.main, Main::All);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = MappingNode::from_json(&json!({
            "main": ["id"],
            "children": {"items": {"IsArray": true, "main": ["sku"]}}
        }))
        .unwrap_err();
        let SpecError::Parse { path, message } = err else {
            panic!("expected parse error, got {:?}", err);
        };
        assert_eq!(path, "$.children.items");
        assert!(message.contains("IsArray"));

        let err = MappingNode::from_json(&json!({"main": ["id"], "chldren": {"x": {}}})).unwrap_err();
        assert!(matches!(err, SpecError::Parse { .. }));
    }

    #[test]
    fn test_rejects_empty_names() {
        let err = MappingNode::from_json(&json!({"main": ["id", " "]})).unwrap_err();
        assert_eq!(err, SpecError::EmptyName { path: "$.main".to_string() });

        let err = MappingNode::from_json(&json!({"main": ""})).unwrap_err();
        assert_eq!(err, SpecError::EmptyName { path: "$.main".to_string() });

        let err = MappingNode::from_json(&json!({"children": {"": {"main": ["a"]}}})).unwrap_err();
        assert!(matches!(err, SpecError::EmptyName { .. }));

        let err = MappingNode::from_json(&json!({
            "children": {"owner": {"main": ["a"], "outputName": ""}}
        }))
        .unwrap_err();
        assert_eq!(
            err,
            SpecError::EmptyName { path: "$.children.owner.outputName".to_string() }
        );
    }

    #[test]
    fn test_rejects_children_and_second() {
        let err = MappingNode::from_json(&json!({
            "children": {"a": {"main": ["x"]}},
            "second": {"b": {"main": ["y"]}}
        }))
        .unwrap_err();
        assert_eq!(
            err,
            SpecError::Conflict { path: "$".to_string(), first: "children", second: "second" }
        );
    }

    #[test]
    fn test_main_flag_values() {
        let node = MappingNode::from_json(&json!({"main": false, "param": {"a": 1}})).unwrap();
        assert_eq!(node.main, Main::None);

        let err = MappingNode::from_json(&json!({"main": true})).unwrap_err();
        assert!(matches!(err, SpecError::Parse { ref path, .. } if path == "$.main"));
    }

    #[test]
    fn test_orphan_prefix_is_ignored() {
        let node = MappingNode::from_json(&json!({
            "main": ["id"],
            "children": {"__prefix": "%parent%_", "orders": {"main": ["no"]}}
        }))
        .unwrap();
        let Children::Named(children) = &node.children else {
            panic!("expected named children");
        };
        assert_eq!(children.keys().collect::<Vec<_>>(), vec!["orders"]);
    }

    #[test]
    fn test_rejects_too_deep() {
        let mut doc = json!({"main": "__all"});
        for _ in 0..(MAX_MAPPING_DEPTH + 2) {
            doc = json!({"children": {"c": doc}});
        }
        let err = MappingNode::from_json(&doc).unwrap_err();
        assert!(matches!(err, SpecError::TooDeep { .. }));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"main": ["id"], "prefix": "x_"}}"#).unwrap();

        let node = MappingNode::from_path(file.path()).unwrap();
        assert_eq!(node.prefix, "x_");

        let err = "{not json".parse::<MappingNode>().unwrap_err();
        assert!(matches!(err, SpecError::Parse { .. }));
    }
}
