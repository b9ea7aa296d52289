use crate::error::{FlattenError, ShapeError};
use crate::flatten::join::{broadcast, expand, resolve_joins, Flattened};
use crate::flatten::types::{FlatRow, FlattenConfig, Row};
use crate::mapping::{ChildNode, Children, Main, MappingNode, PARENT_PLACEHOLDER};
use crate::record::{get_field, Record, RecordMap};
use tracing::debug;

/// Walks a record and a mapping tree in lockstep and produces flat rows
pub struct Flattener {
    config: FlattenConfig,
}

impl Flattener {
    pub fn new(config: FlattenConfig) -> Self {
        Flattener { config }
    }

    /// Flatten a record according to `spec` and resolve pending joins.
    ///
    /// An empty record or an empty mapping returns the record untouched. A
    /// top-level list is flattened element by element and the rows are
    /// concatenated; scalar elements are skipped.
    pub fn flatten(&self, data: &Record, spec: &MappingNode) -> Result<FlatRow, FlattenError> {
        match data {
            Record::Object(map) if spec.is_empty() || map.is_empty() => {
                Ok(FlatRow::Single(Row::from(map.clone())))
            }
            Record::Object(map) => {
                let flattened = self.flatten_object(map, spec, &spec.prefix, 0)?;
                Ok(resolve_joins(flattened))
            }
            Record::List(items) => {
                let mut rows = Vec::new();
                for (idx, item) in items.iter().enumerate() {
                    if let Record::Scalar(_) = item {
                        debug!(index = idx, "skipping scalar list element");
                        continue;
                    }
                    rows.extend(self.flatten(item, spec)?.into_rows());
                }
                Ok(FlatRow::Many(rows))
            }
            Record::Scalar(_) => Err(ShapeError::new("object", data.kind()).into()),
        }
    }

    /// Flatten one object without resolving joins
    fn flatten_object(
        &self,
        data: &RecordMap,
        spec: &MappingNode,
        prefix: &str,
        depth: usize,
    ) -> Result<Flattened, FlattenError> {
        if depth > self.config.max_depth {
            return Err(FlattenError::DepthLimit {
                limit: self.config.max_depth,
            });
        }

        // Below the entry point a node contributes only what it declares.
        if spec.is_empty() || data.is_empty() {
            return Ok(Flattened::single(Row::new()));
        }

        let mut base = Self::main_fields(data, &spec.main, prefix);
        let mut groups: Vec<Vec<Row>> = Vec::new();
        let mut joins: Vec<Row> = Vec::new();

        match &spec.children {
            Children::None => {}
            Children::MatchAll { prefix: template } => {
                for (key, value) in data.iter() {
                    let indexed: RecordMap;
                    let child_data = match value {
                        Record::Object(map) => map,
                        Record::List(items) => {
                            indexed = items
                                .iter()
                                .enumerate()
                                .map(|(idx, item)| (idx.to_string(), item.clone()))
                                .collect();
                            &indexed
                        }
                        Record::Scalar(_) => continue,
                    };
                    let child_prefix = template.replace(PARENT_PLACEHOLDER, key);
                    let node = MappingNode::all(child_prefix.as_str());
                    let child = self.flatten_object(child_data, &node, &child_prefix, depth + 1)?;
                    joins.extend(child.joins);
                    Self::absorb(&mut base, &mut groups, child.rows);
                }
            }
            Children::Named(children) => {
                for (key, child) in children.iter() {
                    let Some(value) = get_field(data, key) else {
                        continue;
                    };
                    if value.is_empty() || !value.is_container() {
                        continue;
                    }

                    let (node, child_prefix) = child.resolve(key, spec, prefix);
                    if child.is_array {
                        let group = self.flatten_array(
                            key,
                            value,
                            child,
                            node,
                            &child_prefix,
                            depth,
                            &mut base,
                            &mut joins,
                        )?;
                        if !group.is_empty() {
                            groups.push(group);
                        }
                    } else {
                        let child_data = match value.as_object() {
                            Ok(map) => map,
                            Err(e) => {
                                debug!(field = %key, error = %e, "skipping child");
                                continue;
                            }
                        };
                        let flattened = self.flatten_object(child_data, node, &child_prefix, depth + 1)?;
                        joins.extend(flattened.joins);

                        if let Some(name) = &child.output_name {
                            base.nest_merge(name, flattened.rows.into_rows());
                        } else if child.join_with_all {
                            joins.extend(flattened.rows.into_rows());
                        } else {
                            Self::absorb(&mut base, &mut groups, flattened.rows);
                        }
                    }
                }
            }
        }

        let mut rows = expand(base, groups);
        if !spec.param.is_empty() {
            let param: Row = spec
                .param
                .iter()
                .map(|(k, v)| (k.clone(), Record::Scalar(v.clone())))
                .collect();
            broadcast(&mut rows, &param);
        }

        Ok(Flattened { rows, joins })
    }

    /// Flatten every element of an array child.
    ///
    /// Returns the rows to explode the parent with; elements routed to an
    /// output name or to the join bucket are placed there directly.
    #[allow(clippy::too_many_arguments)]
    fn flatten_array(
        &self,
        key: &str,
        value: &Record,
        child: &ChildNode,
        node: &MappingNode,
        prefix: &str,
        depth: usize,
        base: &mut Row,
        joins: &mut Vec<Row>,
    ) -> Result<Vec<Row>, FlattenError> {
        let elements = match value.elements() {
            Ok(elements) => elements,
            Err(e) => {
                debug!(field = %key, error = %e, "array child is not a list");
                return Ok(Vec::new());
            }
        };

        let mut group = Vec::new();
        for (idx, element) in elements.into_iter().enumerate() {
            let element_data = match element.as_object() {
                Ok(map) => map,
                Err(e) => {
                    debug!(field = %key, index = idx, error = %e, "skipping array element");
                    continue;
                }
            };

            let flattened = self.flatten_object(element_data, node, prefix, depth + 1)?;
            joins.extend(flattened.joins);

            if let Some(name) = &child.output_name {
                base.nest(name, flattened.rows.into_rows());
            } else if child.join_with_all {
                joins.extend(flattened.rows.into_rows());
            } else {
                group.extend(flattened.rows.into_rows());
            }
        }

        Ok(group)
    }

    /// Copy this level's own fields
    fn main_fields(data: &RecordMap, main: &Main, prefix: &str) -> Row {
        let mut row = Row::new();
        match main {
            Main::None => {}
            Main::Fields(names) => {
                for name in names.iter() {
                    if let Some(value) = get_field(data, name) {
                        row.insert(format!("{}{}", prefix, name), value.clone());
                    }
                }
            }
            Main::All => {
                for (key, value) in data.iter() {
                    if !value.is_container() {
                        row.insert(format!("{}{}", prefix, key).to_lowercase(), value.clone());
                    }
                }
            }
            Main::Field(name) => {
                if let Some(value) = get_field(data, name) {
                    if !value.is_empty() {
                        row.insert(format!("{}{}", prefix, name).to_lowercase(), value.clone());
                    }
                }
            }
        }
        row
    }

    /// Merge a flat child result into the parent: one row merges into the
    /// base, several rows explode the parent like an array child.
    fn absorb(base: &mut Row, groups: &mut Vec<Vec<Row>>, rows: FlatRow) {
        match rows {
            FlatRow::Single(row) => base.merge(&row),
            FlatRow::Many(rows) if rows.is_empty() => {}
            FlatRow::Many(rows) => groups.push(rows),
        }
    }
}

impl Default for Flattener {
    fn default() -> Self {
        Flattener::new(FlattenConfig::default())
    }
}
