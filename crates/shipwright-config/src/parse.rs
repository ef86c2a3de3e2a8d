//! KDL blueprint parsing.
//!
//! Mapping from KDL onto [`Value`]:
//! - `name "x"` is a scalar; `name "a" "b"` is a list of scalars.
//! - A node whose children are all named `-` is a list of the children's values.
//! - Any other node with children, properties, or nothing at all is a map.
//! - `name (env:int)"PORT" default=8080` is an attribute leaf.

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use std::collections::BTreeMap;

use crate::value::{Attribute, Value};
use crate::{ConfigError, ConfigResult};

const LIST_ITEM: &str = "-";

/// Parse blueprint text into a document value.
pub fn parse_document(source: &str) -> ConfigResult<Value> {
    let doc: KdlDocument = source.parse()?;
    document_to_map(&doc, "")
}

fn document_to_map(doc: &KdlDocument, parent: &str) -> ConfigResult<Value> {
    let mut map = BTreeMap::new();
    for node in doc.nodes() {
        let name = node.name().value();
        map.insert(name.to_string(), node_value(node, &join(parent, name))?);
    }
    Ok(Value::Map(map))
}

fn node_value(node: &KdlNode, path: &str) -> ConfigResult<Value> {
    let args: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_none()).collect();
    let props: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_some()).collect();
    let children = node.children().filter(|c| !c.nodes().is_empty());

    if let Some(children) = children {
        if children.nodes().iter().all(|c| c.name().value() == LIST_ITEM) {
            if !node.entries().is_empty() {
                return Err(syntax(path, "a list block cannot also have arguments or properties"));
            }
            return children
                .nodes()
                .iter()
                .enumerate()
                .map(|(i, child)| node_value(child, &join(path, &i.to_string())))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::List);
        }
    }

    match args.as_slice() {
        [] => {
            let mut map = BTreeMap::new();
            for prop in &props {
                if let Some(key) = prop.name() {
                    map.insert(key.value().to_string(), scalar(prop.value(), path)?);
                }
            }
            if let Some(children) = children {
                if let Value::Map(nested) = document_to_map(children, path)? {
                    map.extend(nested);
                }
            }
            Ok(Value::Map(map))
        }
        [arg] => {
            if children.is_some() {
                return Err(syntax(path, "a value node cannot also have children"));
            }
            let attr = match (arg.ty(), arg.value().as_string()) {
                (Some(ty), Some(name)) => Attribute::from_annotation(ty.value(), name),
                _ => None,
            };
            match attr {
                Some(attr) => {
                    let mut attr = attr?;
                    for prop in &props {
                        match prop.name().map(|n| n.value()) {
                            Some("default") => {
                                attr = attr.with_default(scalar(prop.value(), path)?);
                            }
                            Some(other) => {
                                return Err(syntax(
                                    path,
                                    &format!("unknown attribute property '{}'", other),
                                ));
                            }
                            None => {}
                        }
                    }
                    Ok(Value::Attr(attr))
                }
                None if props.is_empty() => scalar(arg.value(), path),
                None => Err(syntax(path, "a value node cannot also have properties")),
            }
        }
        many => {
            if children.is_some() || !props.is_empty() {
                return Err(syntax(path, "a list node cannot also have properties or children"));
            }
            many.iter()
                .map(|e| scalar(e.value(), path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::List)
        }
    }
}

fn scalar(value: &KdlValue, path: &str) -> ConfigResult<Value> {
    if let Some(s) = value.as_string() {
        return Ok(Value::String(s.to_string()));
    }
    if let Some(i) = value.as_integer() {
        return i64::try_from(i)
            .map(Value::Int)
            .map_err(|_| ConfigError::InvalidValue {
                field: path.to_string(),
                message: format!("integer {} out of range", i),
            });
    }
    if let Some(f) = value.as_float() {
        return Ok(Value::Float(f));
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    Ok(Value::Null)
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn syntax(path: &str, message: &str) -> ConfigError {
    ConfigError::Syntax {
        node: path.to_string(),
        message: message.to_string(),
    }
}
