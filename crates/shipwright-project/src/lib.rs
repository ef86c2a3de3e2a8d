//! Project discovery and loading for shipwright.
//!
//! This crate handles:
//! - Repository and git state discovery
//! - The GitHub Actions environment
//! - Release tags and runtime data
//! - Resolving a project's blueprint into a [`Project`]

pub mod buildfile;
pub mod ci;
pub mod error;
pub mod git;
pub mod loader;
pub mod project;
pub mod runtime;
pub mod scan;
pub mod tag;

#[cfg(test)]
pub(crate) mod testing;

pub use buildfile::BuildFile;
pub use ci::CiContext;
pub use error::{ProjectError, ProjectResult};
pub use git::GitState;
pub use loader::ProjectLoader;
pub use project::Project;
pub use scan::{DiscoveredProject, scan_projects};
pub use tag::ProjectTag;
