//! Blueprint loading and merging.

use std::path::Path;
use tracing::debug;

use crate::parse::parse_document;
use crate::schema::Blueprint;
use crate::value::Value;
use crate::{ConfigError, ConfigResult};

/// File name of a blueprint in a project or repository root.
pub const BLUEPRINT_FILE: &str = "blueprint.kdl";

const SCHEMA_DEFAULTS: &str = include_str!("defaults.kdl");

/// The embedded schema defaults.
pub fn schema_defaults() -> ConfigResult<Value> {
    parse_document(SCHEMA_DEFAULTS)
}

/// Read and parse `dir/blueprint.kdl`, or `None` if there is no such file.
pub fn read_blueprint(dir: &Path) -> ConfigResult<Option<Value>> {
    let path = dir.join(BLUEPRINT_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    debug!(path = %path.display(), "Reading blueprint");
    let content = std::fs::read_to_string(&path)?;
    parse_document(&content)
        .map(Some)
        .map_err(|e| match e {
            ConfigError::Parse(err) => ConfigError::InvalidValue {
                field: path.display().to_string(),
                message: err.to_string(),
            },
            other => other,
        })
}

/// Unify schema defaults, the repository-root document and the project
/// document, in increasing precedence.
pub fn merge_documents(root: Option<Value>, project: Option<Value>) -> ConfigResult<Value> {
    let merged = [root, project]
        .into_iter()
        .flatten()
        .fold(Value::empty_map(), Value::unify);
    Ok(schema_defaults()?.unify(merged))
}

/// Fill fields whose defaults depend on other parts of the document:
/// a release without `target` targets its own key, and a deployment module
/// without `instance` is named after the project.
pub fn apply_default_setters(doc: &mut Value) -> ConfigResult<()> {
    let releases: Vec<String> = doc
        .lookup("project.release")
        .and_then(Value::as_map)
        .map(|m| {
            m.iter()
                .filter(|(_, release)| release.lookup("target").is_none())
                .map(|(key, _)| key.clone())
                .collect()
        })
        .unwrap_or_default();
    for key in releases {
        doc.set(&format!("project.release.{}.target", key), Value::String(key.clone()))?;
    }

    let Some(project_name) = doc.lookup("project.name").and_then(Value::as_str).map(String::from)
    else {
        return Ok(());
    };
    let modules: Vec<String> = doc
        .lookup("project.deployment.modules")
        .and_then(Value::as_map)
        .map(|m| {
            m.iter()
                .filter(|(_, module)| module.lookup("instance").is_none())
                .map(|(key, _)| key.clone())
                .collect()
        })
        .unwrap_or_default();
    for key in modules {
        doc.set(
            &format!("project.deployment.modules.{}.instance", key),
            Value::String(project_name.clone()),
        )?;
    }
    Ok(())
}

/// Validate completeness and decode into the typed blueprint.
pub fn decode_blueprint(doc: &Value) -> ConfigResult<Blueprint> {
    doc.decode()
}
