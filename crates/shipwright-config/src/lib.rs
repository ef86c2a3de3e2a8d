//! KDL blueprint documents for shipwright.
//!
//! This crate handles:
//! - Parsing blueprints (blueprint.kdl) into a dynamic document
//! - Merging schema defaults, repository and project documents
//! - Attribute injection (`env`, `global`, `runtime`)
//! - Decoding into the typed schema

pub mod blueprint;
pub mod error;
pub mod inject;
pub mod parse;
pub mod schema;
pub mod value;

pub use blueprint::{BLUEPRINT_FILE, apply_default_setters, decode_blueprint, merge_documents, read_blueprint};
pub use error::{ConfigError, ConfigResult};
pub use inject::{EnvInjector, GlobalInjector, Injector, RuntimeInjector, inject};
pub use parse::parse_document;
pub use schema::Blueprint;
pub use value::{AttrKind, AttrType, Attribute, Value};
