//! Dynamic document values.
//!
//! A blueprint is held as a [`Value`] tree until every attribute has been
//! injected, then decoded into the typed schema. Maps are ordered so walks,
//! validation and error paths are deterministic.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;

use crate::{ConfigError, ConfigResult};

/// Source an attribute is resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Env,
    Global,
    Runtime,
}

impl AttrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttrKind::Env => "env",
            AttrKind::Global => "global",
            AttrKind::Runtime => "runtime",
        }
    }
}

/// Type an `env` attribute is cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrType {
    #[default]
    String,
    Int,
    Bool,
}

/// A typed placeholder leaf, e.g. `(env:int)"PORT"` or `(global)"repo.name"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub kind: AttrKind,
    pub name: String,
    pub ty: AttrType,
    /// Used when the injector has no value for `name`.
    pub default: Option<Box<Value>>,
}

impl Attribute {
    pub fn new(kind: AttrKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            ty: AttrType::String,
            default: None,
        }
    }

    pub fn with_type(mut self, ty: AttrType) -> Self {
        self.ty = ty;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(Box::new(default));
        self
    }

    /// Parse a KDL type annotation (`env`, `env:int`, `global`, `runtime`).
    /// Returns `None` for annotations that are not attributes.
    pub fn from_annotation(annotation: &str, name: &str) -> Option<ConfigResult<Self>> {
        let (kind, ty) = match annotation.split_once(':') {
            Some((kind, ty)) => (kind, Some(ty)),
            None => (annotation, None),
        };
        let kind = match kind {
            "env" => AttrKind::Env,
            "global" => AttrKind::Global,
            "runtime" => AttrKind::Runtime,
            _ => return None,
        };
        let ty = match ty {
            None | Some("string") => AttrType::String,
            Some("int") => AttrType::Int,
            Some("bool") => AttrType::Bool,
            Some(other) => {
                return Some(Err(ConfigError::InvalidValue {
                    field: format!("({}) attribute {}", annotation, name),
                    message: format!("unsupported attribute type '{}'", other),
                }));
            }
        };
        Some(Ok(Self::new(kind, name).with_type(ty)))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}({})", self.kind.as_str(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Attr(Attribute),
}

/// One step of a path into a value tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Render a path as `a.b.0.c`.
pub fn render_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(|seg| match seg {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

impl Value {
    pub fn empty_map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_attr(&self) -> bool {
        matches!(self, Value::Attr(_))
    }

    /// Right-biased unification: maps merge key by key, anything else is
    /// replaced by `other`. Lists are replaced wholesale.
    pub fn unify(self, other: Value) -> Value {
        match (self, other) {
            (Value::Map(mut left), Value::Map(right)) => {
                for (key, value) in right {
                    let merged = match left.remove(&key) {
                        Some(existing) => existing.unify(value),
                        None => value,
                    };
                    left.insert(key, merged);
                }
                Value::Map(left)
            }
            (_, other) => other,
        }
    }

    /// Look up a dotted path. Numeric segments index into lists.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |current, segment| match current {
            Value::Map(map) => map.get(segment),
            Value::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Set the value at a dotted path, creating intermediate maps.
    pub fn set(&mut self, path: &str, value: Value) -> ConfigResult<()> {
        let segments: Vec<PathSegment> = path
            .split('.')
            .map(|s| PathSegment::Key(s.to_string()))
            .collect();
        self.set_at(&segments, value)
    }

    /// Set the value at a path, creating intermediate maps for missing keys.
    pub fn set_at(&mut self, path: &[PathSegment], value: Value) -> ConfigResult<()> {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return Ok(());
        };

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            current = match (current, segment) {
                (Value::Map(map), PathSegment::Key(key)) => {
                    map.entry(key.clone()).or_insert_with(Value::empty_map)
                }
                (Value::List(items), PathSegment::Index(i)) if *i < items.len() => &mut items[*i],
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: render_path(&path[..=depth]),
                        message: "cannot descend into a non-container value".to_string(),
                    });
                }
            };
        }

        match (current, last) {
            (Value::Map(map), PathSegment::Key(key)) => {
                map.insert(key.clone(), value);
                Ok(())
            }
            (Value::List(items), PathSegment::Index(i)) if *i < items.len() => {
                items[*i] = value;
                Ok(())
            }
            _ => Err(ConfigError::InvalidValue {
                field: render_path(path),
                message: "cannot set a field on a non-container value".to_string(),
            }),
        }
    }

    /// Whether the tree contains no attribute leaves.
    pub fn is_concrete(&self) -> bool {
        self.first_incomplete().is_none()
    }

    /// Path of the first attribute leaf, walking maps in key order.
    pub fn first_incomplete(&self) -> Option<String> {
        let mut path = Vec::new();
        self.find_attr(&mut path).then(|| render_path(&path))
    }

    fn find_attr(&self, path: &mut Vec<PathSegment>) -> bool {
        match self {
            Value::Attr(_) => true,
            Value::Map(map) => {
                for (key, value) in map {
                    path.push(PathSegment::Key(key.clone()));
                    if value.find_attr(path) {
                        return true;
                    }
                    path.pop();
                }
                false
            }
            Value::List(items) => {
                for (i, value) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    if value.find_attr(path) {
                        return true;
                    }
                    path.pop();
                }
                false
            }
            _ => false,
        }
    }

    /// Every attribute leaf of the given kind with its path.
    pub fn attributes(&self, kind: AttrKind) -> Vec<(Vec<PathSegment>, Attribute)> {
        let mut found = Vec::new();
        self.collect_attrs(kind, &mut Vec::new(), &mut found);
        found
    }

    fn collect_attrs(
        &self,
        kind: AttrKind,
        path: &mut Vec<PathSegment>,
        found: &mut Vec<(Vec<PathSegment>, Attribute)>,
    ) {
        match self {
            Value::Attr(attr) if attr.kind == kind => found.push((path.clone(), attr.clone())),
            Value::Map(map) => {
                for (key, value) in map {
                    path.push(PathSegment::Key(key.clone()));
                    value.collect_attrs(kind, path, found);
                    path.pop();
                }
            }
            Value::List(items) => {
                for (i, value) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    value.collect_attrs(kind, path, found);
                    path.pop();
                }
            }
            _ => {}
        }
    }

    /// Convert a concrete tree to JSON.
    pub fn to_json(&self) -> ConfigResult<serde_json::Value> {
        self.to_json_at(&mut Vec::new())
    }

    fn to_json_at(&self, path: &mut Vec<PathSegment>) -> ConfigResult<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: render_path(path),
                    message: format!("{} is not a finite number", f),
                })?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    out.push(item.to_json_at(path)?);
                    path.pop();
                }
                serde_json::Value::Array(out)
            }
            Value::Map(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    path.push(PathSegment::Key(key.clone()));
                    out.insert(key.clone(), value.to_json_at(path)?);
                    path.pop();
                }
                serde_json::Value::Object(out)
            }
            Value::Attr(_) => return Err(ConfigError::Incomplete(render_path(path))),
        })
    }

    /// Build a value from JSON.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Decode a concrete tree into a typed structure.
    pub fn decode<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        if let Some(path) = self.first_incomplete() {
            return Err(ConfigError::Incomplete(path));
        }
        Ok(serde_json::from_value(self.to_json()?)?)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
