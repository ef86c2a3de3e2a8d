//! Attribute injection.
//!
//! Injectors replace attribute leaves with concrete values:
//! - `(env:type)"NAME"` - environment variable cast to string, int or bool
//! - `(global)"a.b"` - the value at `global.a.b` in the merged document
//! - `(runtime)"KEY"` - a runtime-data value such as `GIT_IMAGE_TAG`
//!
//! An attribute the injector cannot resolve keeps its `default` if it has one
//! and is otherwise left in place for validation to report.

use shipwright_core::Environment;
use std::collections::BTreeMap;
use tracing::debug;

use crate::value::{AttrKind, AttrType, Attribute, Value, render_path};
use crate::{ConfigError, ConfigResult};

pub trait Injector {
    fn kind(&self) -> AttrKind;

    /// Value for `attr`, or `None` when this injector has nothing for it.
    fn resolve(&self, attr: &Attribute, doc: &Value, path: &str) -> ConfigResult<Option<Value>>;
}

/// Resolves `env` attributes.
pub struct EnvInjector<'a> {
    env: &'a dyn Environment,
}

impl<'a> EnvInjector<'a> {
    pub fn new(env: &'a dyn Environment) -> Self {
        Self { env }
    }
}

impl Injector for EnvInjector<'_> {
    fn kind(&self) -> AttrKind {
        AttrKind::Env
    }

    fn resolve(&self, attr: &Attribute, _doc: &Value, path: &str) -> ConfigResult<Option<Value>> {
        let Some(raw) = self.env.var(&attr.name) else {
            return Ok(None);
        };
        let value = match attr.ty {
            AttrType::String => Value::String(raw),
            AttrType::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ConfigError::InvalidValue {
                    field: path.to_string(),
                    message: format!("invalid int value '{}' in ${}", raw, attr.name),
                })?,
            AttrType::Bool => Value::Bool(!matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "" | "0" | "false" | "no" | "off"
            )),
        };
        Ok(Some(value))
    }
}

/// Resolves `global` attributes against the document itself.
pub struct GlobalInjector;

impl Injector for GlobalInjector {
    fn kind(&self) -> AttrKind {
        AttrKind::Global
    }

    fn resolve(&self, attr: &Attribute, doc: &Value, _path: &str) -> ConfigResult<Option<Value>> {
        let target = format!("global.{}", attr.name);
        Ok(doc
            .lookup(&target)
            .filter(|v| v.is_concrete())
            .cloned())
    }
}

/// Resolves `runtime` attributes from gathered runtime data.
pub struct RuntimeInjector<'a> {
    data: &'a BTreeMap<String, String>,
}

impl<'a> RuntimeInjector<'a> {
    pub fn new(data: &'a BTreeMap<String, String>) -> Self {
        Self { data }
    }
}

impl Injector for RuntimeInjector<'_> {
    fn kind(&self) -> AttrKind {
        AttrKind::Runtime
    }

    fn resolve(&self, attr: &Attribute, _doc: &Value, _path: &str) -> ConfigResult<Option<Value>> {
        Ok(self.data.get(&attr.name).cloned().map(Value::String))
    }
}

/// Apply one injector to every matching attribute. Returns how many were replaced.
pub fn inject(doc: &mut Value, injector: &dyn Injector) -> ConfigResult<usize> {
    let mut replaced = 0;
    for (path, attr) in doc.attributes(injector.kind()) {
        let rendered = render_path(&path);
        let value = match injector.resolve(&attr, doc, &rendered)? {
            Some(value) => value,
            None => match attr.default {
                Some(default) => *default,
                None => {
                    debug!(path = %rendered, attribute = %attr, "Attribute left unresolved");
                    continue;
                }
            },
        };
        doc.set_at(&path, value)?;
        replaced += 1;
    }
    Ok(replaced)
}
