//! Process execution and build driver for shipwright.
//!
//! Provides:
//! - [`LocalExecutor`], running commands as child processes
//! - [`EarthlyDriver`], running project targets with retries and secrets

pub mod earthly;
pub mod error;
pub mod local;
pub mod secrets;

pub use earthly::{BuildDriver, BuildOptions, EarthlyDriver};
pub use error::{BuildError, BuildResult};
pub use local::LocalExecutor;
pub use secrets::{ResolvedSecret, resolve_secrets};
