//! Release orchestration for shipwright.
//!
//! A release binds a project target to a publishing provider and a set of
//! events. The [`ReleaseDispatcher`] evaluates the events, runs the target
//! through the build driver and hands the outputs to the provider:
//! - `container`: tag and push images, with multi-platform manifest lists
//! - `oci-module-kcl`, `oci-module-timoni`, `oci-module-cue`: push OCI modules
//! - `forge-release`: attach per-platform archives to a forge release,
//!   optionally followed by a Homebrew formula in a tap repository
//! - `docs`: mirror static docs to a bucket and link previews on pull requests

pub mod archive;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod providers;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{ReleaseContext, cancellable};
pub use dispatcher::ReleaseDispatcher;
pub use error::{ReleaseError, ReleaseResult, ReleaseState};
pub use events::{EventEvaluator, ReleaseEvent};
pub use providers::{ReleaseProvider, resolve_provider};
